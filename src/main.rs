//! waveguide-sim: run FDTD jobs and characterize their resonances
//!
//! ```sh
//! waveguide-sim simulate --backend tidy3d --set file_name=out/res6 --set resolution=20
//! waveguide-sim analyze --backend lumerical --file out/res6_FDTD_ports.json --monitor o2
//! waveguide-sim defaults --backend lumerical
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use waveguide_fdtd::params::materialize_defaults;
use waveguide_fdtd::resolver::DEFAULT_CONFIG_FILE;
use waveguide_fdtd::resonance::ResonanceTrace;
use waveguide_fdtd::spectrum::MICROMETERS_TO_NANOMETERS;
use waveguide_fdtd::{
    ArtifactGate, BackendKind, ParamMap, ParamValue, ParameterResolver, ResonanceAnalyzer,
    ResonanceConfig, ScriptEngine,
};

#[derive(Parser, Debug)]
#[command(name = "waveguide-sim")]
#[command(about = "Orchestrate FDTD waveguide simulations and extract FWHM / Q")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve parameters, confirm overwrite and run one job
    Simulate {
        /// Simulation backend (lumerical, tidy3d)
        #[arg(short, long)]
        backend: BackendKind,

        /// Persisted parameter file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Parameter override as key=value; values parse as JSON when possible
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_override)]
        overrides: Vec<(String, ParamValue)>,

        /// Python interpreter used to run the driver script
        #[arg(long, default_value = "python")]
        python: PathBuf,

        /// Directory holding the solver helper package
        #[arg(long, default_value = ".")]
        project_root: PathBuf,
    },
    /// Characterize the first resonance of an exported spectrum
    ///
    /// Reads the JSON export written by the driver script
    /// (`*_FDTD_ports.json` or `*_monitors.json`), not the native `.fsp` or
    /// `.hdf5` result. To analyze an existing native result without its
    /// export, run `simulate` again and answer `y` to reuse it; the driver
    /// then only exports.
    Analyze {
        #[arg(short, long)]
        backend: BackendKind,

        /// JSON export written by the driver script
        #[arg(short, long)]
        file: PathBuf,

        /// Monitor or port name (defaults to the backend's output port)
        #[arg(short, long)]
        monitor: Option<String>,

        /// Mode column to read
        #[arg(long, default_value = "0")]
        mode: usize,

        /// Use the asymmetric edge margins of the reference analysis
        #[arg(long)]
        reference_margins: bool,

        /// Write the resampled curve and half level as CSV
        #[arg(long)]
        curve_out: Option<PathBuf>,
    },
    /// Print the backend's default parameters as JSON
    Defaults {
        #[arg(short, long)]
        backend: BackendKind,
    },
}

fn parse_override(raw: &str) -> Result<(String, ParamValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    Ok((key.to_string(), ParamValue::parse_cli(value)))
}

fn write_curve_csv(trace: &ResonanceTrace, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {:?}", dir))?;
    }

    let mut csv = String::from("wavelength_um,transmission,half_level\n");
    for (w, t) in trace.grid.iter().zip(&trace.curve) {
        csv.push_str(&format!("{w:.8},{t:.8},{:.8}\n", trace.half_level));
    }
    fs::write(path, csv).with_context(|| format!("Failed to write curve file: {:?}", path))?;
    eprintln!("Resampled curve written to {:?}", path);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            backend,
            config,
            overrides,
            python,
            project_root,
        } => {
            let overrides: ParamMap = overrides.into_iter().collect();
            let resolver = ParameterResolver::new(backend).with_config_path(config);
            let mut gate = ArtifactGate::interactive();
            let mut engine = ScriptEngine {
                python,
                project_root,
            };

            let (job, output) =
                waveguide_fdtd::simulate(&resolver, &overrides, &mut gate, &mut engine)
                    .with_context(|| format!("{backend} job failed"))?;

            match output {
                Some(out) => {
                    println!("Simulation artifact: {:?}", out.artifact_path);
                    println!("Spectrum export:     {:?}", out.export_path);
                }
                None => println!("No simulation run for {:?}", job.output_base()?),
            }
            Ok(())
        }
        Commands::Analyze {
            backend,
            file,
            monitor,
            mode,
            reference_margins,
            curve_out,
        } => {
            let adapter = backend.adapter();
            let monitor = monitor.unwrap_or_else(|| adapter.default_monitor().to_string());
            let spectrum = adapter
                .spectrum_reader(mode)
                .read(&file, &monitor)
                .with_context(|| format!("Failed to read {monitor} from {:?}", file))?;

            let config = if reference_margins {
                ResonanceConfig::reference()
            } else {
                ResonanceConfig::default()
            };
            let trace = ResonanceAnalyzer::new(config)
                .trace(&spectrum)
                .context("Resonance analysis failed")?;

            let nm = MICROMETERS_TO_NANOMETERS;
            println!("FWHM:      {:.4} nm", trace.result.fwhm * nm);
            println!("Resonance: {:.4} nm", trace.result.peak_wavelength * nm);
            println!("Q-factor:  {:.1}", trace.result.q_factor);

            let (sample, index) = spectrum.nearest(trace.result.peak_wavelength);
            println!(
                "Nearest sample: {:.4} nm (#{index}, T = {:.4})",
                sample * nm,
                spectrum.power()[index]
            );

            if let Some(path) = curve_out {
                write_curve_csv(&trace, &path)?;
            }
            Ok(())
        }
        Commands::Defaults { backend } => {
            let defaults = materialize_defaults(backend.defaults());
            println!("{}", serde_json::to_string_pretty(&defaults)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_analyze_help_names_export_files() {
        let mut cmd = Cli::command();
        let analyze = cmd.find_subcommand_mut("analyze").unwrap();
        let help = analyze.render_long_help().to_string();
        assert!(help.contains("_monitors.json"));
        assert!(help.contains(".hdf5"));
    }

    #[test]
    fn test_parse_override() {
        let (k, v) = parse_override("resolution=20").unwrap();
        assert_eq!(k, "resolution");
        assert_eq!(v, ParamValue::Int(20));

        let (_, v) = parse_override("guiding_material=Si3N4").unwrap();
        assert_eq!(v, ParamValue::Text("Si3N4".into()));

        let (_, v) = parse_override("z_bounds=[-1, 1]").unwrap();
        assert_eq!(v, ParamValue::List(vec![ParamValue::Int(-1), ParamValue::Int(1)]));

        let (_, v) = parse_override("expr=a=b").unwrap();
        assert_eq!(v, ParamValue::Text("a=b".into()));

        assert!(parse_override("resolution").is_err());
        assert!(parse_override("=3").is_err());
    }

    #[test]
    fn test_cli_parses_repeated_overrides() {
        let cli = Cli::try_parse_from([
            "waveguide-sim",
            "simulate",
            "--backend",
            "tidy3d",
            "--set",
            "wavelength=1.31",
            "--set",
            "flag_run_simulation=0",
        ])
        .unwrap();
        match cli.command {
            Commands::Simulate {
                backend, overrides, ..
            } => {
                assert_eq!(backend, BackendKind::Tidy3d);
                assert_eq!(overrides.len(), 2);
                assert_eq!(overrides[0].1, ParamValue::Float(1.31));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
