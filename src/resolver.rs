//! Layered parameter resolution: defaults, persisted config, caller overrides

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::backend::BackendKind;
use crate::error::{Error, Result};
use crate::params::{keys, materialize_defaults, JobDescriptor, ParamMap, ParamValue};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Extension appended to `file_name` for the copied geometry
pub const GEOMETRY_EXTENSION: &str = ".gds";
/// Extension appended to `file_name` for the parameter sidecar
pub const SIDECAR_EXTENSION: &str = ".json";

/// Merges the three parameter layers into a [`JobDescriptor`]
#[derive(Debug, Clone)]
pub struct ParameterResolver {
    backend: BackendKind,
    config_path: PathBuf,
}

impl ParameterResolver {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Resolve `overrides` against the persisted config and backend defaults.
    ///
    /// Writes `<file_name>.json` with the merged result before returning.
    pub fn resolve(&self, overrides: &ParamMap) -> Result<JobDescriptor> {
        let mut params = materialize_defaults(self.backend.defaults());

        if let Some(config) = self.load_config()? {
            params.extend(config);
        }
        params.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        validate(&params)?;

        let base = params
            .get(keys::FILE_NAME)
            .and_then(ParamValue::as_str)
            .unwrap_or_default()
            .to_string();
        params.insert(
            keys::GDS_FILE.to_string(),
            ParamValue::Text(format!("{base}{GEOMETRY_EXTENSION}")),
        );
        let sidecar = PathBuf::from(format!("{base}{SIDECAR_EXTENSION}"));
        params.insert(
            keys::PARAMS_FILE.to_string(),
            ParamValue::Text(sidecar.to_string_lossy().into_owned()),
        );

        let job = JobDescriptor::from_map(params);
        write_sidecar(&job, &sidecar)?;
        Ok(job)
    }

    /// `Ok(None)` when the config file does not exist
    fn load_config(&self) -> Result<Option<ParamMap>> {
        let text = match fs::read_to_string(&self.config_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "{:?} not found, using default parameters",
                    self.config_path
                );
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::Config {
                    path: self.config_path.clone(),
                    reason: e.to_string(),
                })
            }
        };

        let config: ParamMap = serde_json::from_str(&text).map_err(|e| Error::Config {
            path: self.config_path.clone(),
            reason: e.to_string(),
        })?;
        info!("Loaded {} parameters from {:?}", config.len(), self.config_path);
        Ok(Some(config))
    }
}

fn validate(params: &ParamMap) -> Result<()> {
    // JSON has no NaN or infinity; serde_json would write them as null
    if let Some((key, _)) = params.iter().find(|(_, v)| !v.is_finite()) {
        return Err(Error::validation(key, "must be a finite number"));
    }

    let gds = match params.get(keys::PREDEFINED_GDS) {
        None | Some(ParamValue::Null) => "",
        Some(value) => value
            .as_str()
            .ok_or_else(|| Error::validation(keys::PREDEFINED_GDS, "expected a path string"))?,
    };
    if gds.is_empty() {
        return Err(Error::validation(
            keys::PREDEFINED_GDS,
            "GDS file path must be specified",
        ));
    }
    check_readable(Path::new(gds), "GDS")?;

    let base = params
        .get(keys::FILE_NAME)
        .and_then(ParamValue::as_str)
        .unwrap_or_default();
    if base.is_empty() {
        return Err(Error::validation(
            keys::FILE_NAME,
            "output base name must be a non-empty string",
        ));
    }

    if let Some(span) = params.get(keys::WAV_SPAN) {
        match span.as_f64() {
            Some(v) if v > 0.0 => {}
            _ => return Err(Error::validation(keys::WAV_SPAN, "must be a number > 0")),
        }
    }
    if let Some(res) = params.get(keys::RESOLUTION) {
        match res.as_f64() {
            Some(v) if v >= 1.0 => {}
            _ => return Err(Error::validation(keys::RESOLUTION, "must be a number >= 1")),
        }
    }
    Ok(())
}

/// Existence and read permission, as two distinct failures of the same kind
pub fn check_readable(path: &Path, what: &'static str) -> Result<()> {
    if !path.exists() {
        return Err(Error::FileNotFound {
            what,
            path: path.to_path_buf(),
        });
    }
    File::open(path).map_err(|source| Error::FileUnreadable {
        what,
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Write the resolved parameters as pretty JSON, creating parent directories
pub fn write_sidecar(job: &JobDescriptor, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(job)?;
    fs::write(path, json)?;
    info!("Parameters saved to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use num_complex::Complex64;
    use tempfile::TempDir;

    const GDS_HEADER: [u8; 6] = [0x00, 0x06, 0x00, 0x02, 0x02, 0x58];

    fn fixture() -> (TempDir, ParamMap) {
        let dir = TempDir::new().unwrap();
        let gds = dir.path().join("ring.gds");
        fs::write(&gds, GDS_HEADER).unwrap();

        let mut overrides = ParamMap::new();
        overrides.insert(
            keys::PREDEFINED_GDS.into(),
            gds.to_string_lossy().into_owned().into(),
        );
        overrides.insert(
            keys::FILE_NAME.into(),
            dir.path().join("out/res6").to_string_lossy().into_owned().into(),
        );
        (dir, overrides)
    }

    fn resolver(dir: &TempDir, backend: BackendKind) -> ParameterResolver {
        ParameterResolver::new(backend).with_config_path(dir.path().join("config.json"))
    }

    #[test]
    fn test_missing_config_falls_back_to_defaults() {
        let (dir, overrides) = fixture();
        let job = resolver(&dir, BackendKind::Lumerical).resolve(&overrides).unwrap();

        assert_eq!(job.f64(keys::WAVELENGTH).unwrap(), 0.85);
        assert_eq!(job.f64(keys::WAV_STEP).unwrap(), 0.01);
        assert!(job.contains(keys::LUMAPI_PATH));
    }

    #[test]
    fn test_layers_override_in_order() {
        let (dir, mut overrides) = fixture();
        fs::write(
            dir.path().join("config.json"),
            r#"{"wavelength": 1.31, "resolution": 12, "guiding_material": "Si"}"#,
        )
        .unwrap();
        overrides.insert(keys::RESOLUTION.into(), ParamValue::Int(25));

        let job = resolver(&dir, BackendKind::Tidy3d).resolve(&overrides).unwrap();

        assert_eq!(job.f64(keys::WAVELENGTH).unwrap(), 1.31);
        assert_eq!(job.text(keys::GUIDING_MATERIAL).unwrap(), "Si");
        assert_eq!(job.get(keys::RESOLUTION), Some(&ParamValue::Int(25)));
        assert_eq!(job.f64(keys::WAV_SPAN).unwrap(), 0.05);
    }

    #[test]
    fn test_malformed_config_is_fatal() {
        let (dir, overrides) = fixture();
        fs::write(dir.path().join("config.json"), "{ \"wavelength\": ").unwrap();

        let err = resolver(&dir, BackendKind::Lumerical)
            .resolve(&overrides)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_non_object_config_is_fatal() {
        let (dir, overrides) = fixture();
        fs::write(dir.path().join("config.json"), "[1, 2, 3]").unwrap();

        let err = resolver(&dir, BackendKind::Lumerical)
            .resolve(&overrides)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_missing_geometry_is_file_not_found() {
        let (dir, mut overrides) = fixture();
        overrides.insert(
            keys::PREDEFINED_GDS.into(),
            dir.path().join("nope.gds").to_string_lossy().into_owned().into(),
        );

        let err = resolver(&dir, BackendKind::Tidy3d)
            .resolve(&overrides)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }

    #[test]
    fn test_empty_geometry_path_is_validation_error() {
        let (dir, mut overrides) = fixture();
        overrides.insert(keys::PREDEFINED_GDS.into(), "".into());

        let err = resolver(&dir, BackendKind::Lumerical)
            .resolve(&overrides)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_invariants_rejected() {
        let (dir, base) = fixture();
        let r = resolver(&dir, BackendKind::Lumerical);

        for (key, value) in [
            (keys::WAV_SPAN, ParamValue::Float(0.0)),
            (keys::RESOLUTION, ParamValue::Int(0)),
            (keys::FILE_NAME, ParamValue::Text(String::new())),
        ] {
            let mut overrides = base.clone();
            overrides.insert(key.into(), value);
            let err = r.resolve(&overrides).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{key}");
        }
    }

    #[test]
    fn test_non_finite_numbers_rejected() {
        let (dir, base) = fixture();
        let r = resolver(&dir, BackendKind::Tidy3d);

        for value in [
            ParamValue::Float(f64::NAN),
            ParamValue::List(vec![ParamValue::Float(1.0), ParamValue::Float(f64::INFINITY)]),
            ParamValue::from(Complex64::new(0.0, f64::NEG_INFINITY)),
        ] {
            let mut overrides = base.clone();
            overrides.insert("coupling".into(), value);
            let err = r.resolve(&overrides).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
            assert!(err.to_string().contains("coupling"));
        }
    }

    #[test]
    fn test_numeric_arrays_round_trip_through_sidecar() {
        let (dir, overrides) = fixture();
        fs::write(
            dir.path().join("config.json"),
            r#"{"z_bounds": [-1.0, 1.0], "span": [1.0, 2.0, 3.0]}"#,
        )
        .unwrap();

        let job = resolver(&dir, BackendKind::Lumerical).resolve(&overrides).unwrap();
        let pair = ParamValue::List(vec![ParamValue::Float(-1.0), ParamValue::Float(1.0)]);
        assert_eq!(job.get("z_bounds"), Some(&pair));

        let sidecar = PathBuf::from(job.text(keys::PARAMS_FILE).unwrap());
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&sidecar).unwrap()).unwrap();
        assert_eq!(raw["z_bounds"], serde_json::json!([-1.0, 1.0]));

        let reread = JobDescriptor::from_sidecar(&sidecar).unwrap();
        assert_eq!(reread.get("z_bounds"), Some(&pair));
        assert_eq!(reread, job);
    }

    #[test]
    fn test_derived_keys_and_sidecar() {
        let (dir, mut overrides) = fixture();
        overrides.insert(
            "coupling".into(),
            ParamValue::from(Complex64::new(0.125, -0.5)),
        );

        let job = resolver(&dir, BackendKind::Lumerical).resolve(&overrides).unwrap();
        let base = dir.path().join("out/res6").to_string_lossy().into_owned();

        assert_eq!(job.text(keys::GDS_FILE).unwrap(), format!("{base}.gds"));
        let sidecar = PathBuf::from(job.text(keys::PARAMS_FILE).unwrap());
        assert!(sidecar.exists(), "sidecar directory should be created");

        let reread = JobDescriptor::from_sidecar(&sidecar).unwrap();
        assert_eq!(reread, job);
        assert_eq!(
            reread.get("coupling").and_then(ParamValue::as_complex),
            Some(Complex64::new(0.125, -0.5))
        );
    }
}
