//! Python driver generation for the solver backends

use std::path::Path;

use minijinja::{context, Environment};

use crate::engine::{EngineRequest, RunMode};
use crate::error::Result;
use crate::params::keys;

/// Upper bound on port names `o1..oN` probed by the Lumerical export
const MAX_PORTS: usize = 16;

/// Render the request's driver template
pub fn render_driver(request: &EngineRequest<'_>, project_root: &Path) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("driver", request.driver_template)?;
    let template = env.get_template("driver")?;

    let job = request.job;
    let text = |key: &str| job.text(key).unwrap_or_default().to_string();

    let output = template.render(context! {
        file_name => text(keys::FILE_NAME),
        task_name => text(keys::TASK_NAME),
        lumapi_path => text(keys::LUMAPI_PATH),
        timestamp => chrono::Utc::now().to_rfc3339(),
        run_mode => format!("{:?}", request.mode),
        reuse_existing => request.mode == RunMode::ReuseExisting,
        project_root => project_root.to_string_lossy(),
        params_json => serde_json::to_string(job)?,
        artifact_path => request.artifact_path.to_string_lossy(),
        export_path => request.export_path.to_string_lossy(),
        max_ports => MAX_PORTS,
    })?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use crate::params::{materialize_defaults, JobDescriptor};
    use std::path::PathBuf;

    fn request_for<'a>(
        kind: BackendKind,
        job: &'a JobDescriptor,
        mode: RunMode,
        paths: &'a [PathBuf; 3],
    ) -> EngineRequest<'a> {
        EngineRequest {
            job,
            backend: kind,
            mode,
            artifact_path: &paths[0],
            export_path: &paths[1],
            driver_path: &paths[2],
            driver_template: kind.adapter().driver_template(),
        }
    }

    fn job(kind: BackendKind) -> JobDescriptor {
        let mut map = materialize_defaults(kind.defaults());
        map.insert(keys::FILE_NAME.into(), "out/ring".into());
        map.insert(keys::TASK_NAME.into(), "DC_res6_span20".into());
        JobDescriptor::from_map(map)
    }

    #[test]
    fn test_lumerical_driver_renders() {
        let job = job(BackendKind::Lumerical);
        let paths = [
            PathBuf::from("out/ring_FDTD.fsp"),
            PathBuf::from("out/ring_FDTD_ports.json"),
            PathBuf::from("out/ring_FDTD_driver.py"),
        ];
        let req = request_for(BackendKind::Lumerical, &job, RunMode::Fresh, &paths);
        let script = render_driver(&req, Path::new("/proj")).unwrap();

        assert!(script.contains("import lumapi"));
        assert!(script.contains(r#"ARTIFACT = r"out/ring_FDTD.fsp""#));
        assert!(script.contains("MAX_PORTS = 16"));
        assert!(script.contains("    build_and_run()"));
        assert!(script.contains(r"v251\api\python"));
    }

    #[test]
    fn test_reuse_skips_solver() {
        let job = job(BackendKind::Tidy3d);
        let paths = [
            PathBuf::from("out/ring_results.hdf5"),
            PathBuf::from("out/ring_monitors.json"),
            PathBuf::from("out/ring_tidy3d_driver.py"),
        ];
        let req = request_for(BackendKind::Tidy3d, &job, RunMode::ReuseExisting, &paths);
        let script = render_driver(&req, Path::new("/proj")).unwrap();

        assert!(script.contains("Task: DC_res6_span20"));
        assert!(script.contains("Reusing existing results file"));
        assert!(!script.contains("    build_and_run()"));
        assert!(script.contains("export_monitors(ARTIFACT, EXPORT)"));
    }

    #[test]
    fn test_params_embedded_as_json() {
        let job = job(BackendKind::Tidy3d);
        let paths = [PathBuf::new(), PathBuf::new(), PathBuf::new()];
        let req = request_for(BackendKind::Tidy3d, &job, RunMode::Fresh, &paths);
        let script = render_driver(&req, Path::new(".")).unwrap();

        let start = script.find("r'''").unwrap() + 4;
        let end = script[start..].find("'''").unwrap() + start;
        let embedded: JobDescriptor = serde_json::from_str(&script[start..end]).unwrap();
        assert_eq!(embedded, job);
    }
}
