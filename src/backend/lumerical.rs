//! Lumerical FDTD backend (local solver driven through `lumapi`)
//!
//! Mode indices are 1-based for this solver.

use super::{Backend, BackendKind};
use crate::params::keys;
use crate::spectrum::{PortTableReader, SpectrumReader};

const LUMERICAL_DRIVER: &str = r##"#!/usr/bin/env python3
"""
Lumerical FDTD driver - generated by waveguide-sim

Job: {{ file_name }}
Generated: {{ timestamp }}
Mode: {{ run_mode }}
"""

import json
import sys

sys.path.append(r"{{ project_root }}")
sys.path.append(r"{{ lumapi_path }}")
import lumapi

PARAMS = json.loads(r'''{{ params_json }}''')
ARTIFACT = r"{{ artifact_path }}"
EXPORT = r"{{ export_path }}"
MAX_PORTS = {{ max_ports }}


def build_and_run():
    from helper_functions.lumerical.initiate_fdtd import fdtd_from_gds
    return fdtd_from_gds(parameters=PARAMS)


def export_ports(fname, out):
    """Dump port expansion results as {"ports": {name: {"lambda", "T_net"}}}."""
    fdtd = lumapi.FDTD(hide=True)
    fdtd.load(fname)
    ports = {}
    for idx in range(1, MAX_PORTS + 1):
        name = f"o{idx}"
        try:
            res = fdtd.getresult(f"FDTD::ports::{name}", "expansion for port monitor")
        except Exception:
            continue
        ports[name] = {
            "lambda": res["lambda"][:, 0].tolist(),
            "T_net": res["T_net"].tolist(),
        }
    fdtd.close()
    with open(out, "w") as f:
        json.dump({"ports": ports}, f)
    print(f"Exported {len(ports)} ports to {out}")


if __name__ == "__main__":
{% if reuse_existing %}
    print(f"Reusing existing simulation file {ARTIFACT}")
{% else %}
    build_and_run()
{% endif %}
    export_ports(ARTIFACT, EXPORT)
"##;

#[derive(Debug, Clone, Copy, Default)]
pub struct Lumerical;

impl Backend for Lumerical {
    fn kind(&self) -> BackendKind {
        BackendKind::Lumerical
    }

    fn artifact_suffix(&self) -> &'static str {
        "_FDTD.fsp"
    }

    fn export_suffix(&self) -> &'static str {
        "_FDTD_ports.json"
    }

    fn driver_suffix(&self) -> &'static str {
        "_FDTD_driver.py"
    }

    fn extra_required(&self) -> &'static [&'static str] {
        &[keys::WAV_STEP, keys::LUMAPI_PATH]
    }

    fn default_monitor(&self) -> &'static str {
        "o2"
    }

    fn driver_template(&self) -> &'static str {
        LUMERICAL_DRIVER
    }

    fn spectrum_reader(&self, mode: usize) -> Box<dyn SpectrumReader> {
        Box::new(PortTableReader { mode })
    }
}
