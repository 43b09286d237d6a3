//! Tidy3D backend (cloud solver)
//!
//! Mode indices are 0-based for this solver.

use super::{Backend, BackendKind};
use crate::params::keys;
use crate::spectrum::{ModeMonitorReader, SpectrumReader};

const TIDY3D_DRIVER: &str = r##"#!/usr/bin/env python3
"""
Tidy3D driver - generated by waveguide-sim

Job: {{ file_name }}
Task: {{ task_name }}
Generated: {{ timestamp }}
Mode: {{ run_mode }}
"""

import json
import sys

sys.path.append(r"{{ project_root }}")
import tidy3d as td

PARAMS = json.loads(r'''{{ params_json }}''')
ARTIFACT = r"{{ artifact_path }}"
EXPORT = r"{{ export_path }}"


def build_and_run():
    from helper_functions.tidy3d.initiate_fdtd import fdtd_from_gds
    return fdtd_from_gds(parameters=PARAMS)


def encode(c):
    return {"real": float(c.real), "imag": float(c.imag)}


def export_monitors(fname, out):
    """Dump mode amplitudes as {"monitors": {name: {"f", "amps": {"+", "-"}}}}."""
    sim_data = td.SimulationData.from_file(fname)
    monitors = {}
    for monitor in sim_data.simulation.monitors:
        data = sim_data[monitor.name]
        if not hasattr(data, "amps"):
            continue
        amps = data.amps
        monitors[monitor.name] = {
            "f": amps.f.values.tolist(),
            "amps": {
                d: [[encode(c) for c in row] for row in amps.sel(direction=d).values]
                for d in ("+", "-")
            },
        }
    with open(out, "w") as f:
        json.dump({"monitors": monitors}, f)
    print(f"Exported {len(monitors)} mode monitors to {out}")


if __name__ == "__main__":
{% if reuse_existing %}
    print(f"Reusing existing results file {ARTIFACT}")
{% else %}
    build_and_run()
{% endif %}
    export_monitors(ARTIFACT, EXPORT)
"##;

#[derive(Debug, Clone, Copy, Default)]
pub struct Tidy3d;

impl Backend for Tidy3d {
    fn kind(&self) -> BackendKind {
        BackendKind::Tidy3d
    }

    fn artifact_suffix(&self) -> &'static str {
        "_results.hdf5"
    }

    fn export_suffix(&self) -> &'static str {
        "_monitors.json"
    }

    fn driver_suffix(&self) -> &'static str {
        "_tidy3d_driver.py"
    }

    fn extra_required(&self) -> &'static [&'static str] {
        &[keys::TASK_NAME]
    }

    fn default_monitor(&self) -> &'static str {
        "o2 mode"
    }

    fn driver_template(&self) -> &'static str {
        TIDY3D_DRIVER
    }

    fn spectrum_reader(&self, mode: usize) -> Box<dyn SpectrumReader> {
        Box::new(ModeMonitorReader { mode })
    }
}
