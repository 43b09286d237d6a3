//! Job parameters: value model, resolved descriptor and backend default tables

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Parameter names understood by the resolver and the backends
pub mod keys {
    pub const WAVELENGTH: &str = "wavelength";
    pub const WAV_SPAN: &str = "wav_span";
    pub const WAV_STEP: &str = "wav_step";
    pub const RESOLUTION: &str = "resolution";
    pub const TEMPERATURE: &str = "temperature";
    pub const PREDEFINED_GDS: &str = "predefined_gds";
    pub const MATERIAL_TYPE: &str = "material_type";
    pub const GUIDING_MATERIAL: &str = "guiding_material";
    pub const LUMAPI_PATH: &str = "lumapi_path";
    pub const FILE_NAME: &str = "file_name";
    pub const TASK_NAME: &str = "task_name";
    pub const MODE_NUM: &str = "mode_num";
    pub const MODE_IDX: &str = "mode_idx";
    pub const FLAG_EXTEND: &str = "flag_extend";
    pub const EXTENSION: &str = "extension";
    pub const FLAG_RUN_SIMULATION: &str = "flag_run_simulation";
    pub const FLAG_BOOLEAN: &str = "flag_boolean";
    pub const SOLVER_Z_MIN: &str = "solver_z_min";
    pub const SOLVER_Z_MAX: &str = "solver_z_max";
    pub const CHANGE_CLADDING: &str = "change_cladding";

    // Derived during resolution
    pub const GDS_FILE: &str = "gds_file";
    pub const PARAMS_FILE: &str = "params_file";

    /// Keys every backend needs before it may touch the filesystem
    pub const COMMON_REQUIRED: &[&str] = &[
        WAVELENGTH,
        WAV_SPAN,
        RESOLUTION,
        TEMPERATURE,
        PREDEFINED_GDS,
        MATERIAL_TYPE,
        GUIDING_MATERIAL,
        FILE_NAME,
        MODE_NUM,
        MODE_IDX,
        FLAG_EXTEND,
        EXTENSION,
        FLAG_RUN_SIMULATION,
        FLAG_BOOLEAN,
        SOLVER_Z_MIN,
        SOLVER_Z_MAX,
        CHANGE_CLADDING,
        GDS_FILE,
    ];
}

pub type ParamMap = BTreeMap<String, ParamValue>;

/// Complex parameter, serialized as `{"real": r, "imag": i}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComplexValue {
    pub real: f64,
    pub imag: f64,
}

impl From<Complex64> for ComplexValue {
    fn from(c: Complex64) -> Self {
        Self { real: c.re, imag: c.im }
    }
}

impl From<ComplexValue> for Complex64 {
    fn from(c: ComplexValue) -> Self {
        Complex64::new(c.real, c.imag)
    }
}

/// A single JSON-shaped parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    // Ahead of `Complex`: derived struct impls also accept `[re, im]`
    List(Vec<ParamValue>),
    Complex(ComplexValue),
    Map(ParamMap),
}

impl ParamValue {
    /// Parse a command-line value: JSON if it parses, plain text otherwise
    pub fn parse_cli(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|_| ParamValue::Text(raw.to_string()))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Booleans, or 0/1 integers as written in existing config files
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            ParamValue::Int(0) => Some(false),
            ParamValue::Int(1) => Some(true),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// False if any number inside is NaN or infinite
    pub fn is_finite(&self) -> bool {
        match self {
            ParamValue::Float(v) => v.is_finite(),
            ParamValue::Complex(c) => c.real.is_finite() && c.imag.is_finite(),
            ParamValue::List(items) => items.iter().all(ParamValue::is_finite),
            ParamValue::Map(map) => map.values().all(ParamValue::is_finite),
            _ => true,
        }
    }

    pub fn as_complex(&self) -> Option<Complex64> {
        match self {
            ParamValue::Complex(c) => Some((*c).into()),
            other => other.as_f64().map(|re| Complex64::new(re, 0.0)),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

impl From<Complex64> for ParamValue {
    fn from(v: Complex64) -> Self {
        ParamValue::Complex(v.into())
    }
}

/// Fully resolved job parameters.
///
/// Only the resolver can build one; after that it is read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobDescriptor {
    params: ParamMap,
}

impl JobDescriptor {
    pub(crate) fn from_map(params: ParamMap) -> Self {
        Self { params }
    }

    /// Re-read a descriptor from its JSON sidecar
    pub fn from_sidecar(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound {
                what: "parameter sidecar",
                path: path.to_path_buf(),
            },
            _ => Error::Io(e),
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn as_map(&self) -> &ParamMap {
        &self.params
    }

    /// Keys from `required` that are absent
    pub fn missing_keys(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|k| !self.params.contains_key(**k))
            .map(|k| k.to_string())
            .collect()
    }

    pub fn require(&self, key: &str) -> Result<&ParamValue> {
        self.params
            .get(key)
            .ok_or_else(|| Error::MissingParameters(vec![key.to_string()]))
    }

    pub fn f64(&self, key: &str) -> Result<f64> {
        self.require(key)?
            .as_f64()
            .ok_or_else(|| Error::validation(key, "expected a number"))
    }

    pub fn integer(&self, key: &str) -> Result<i64> {
        self.require(key)?
            .as_i64()
            .ok_or_else(|| Error::validation(key, "expected an integer"))
    }

    pub fn text(&self, key: &str) -> Result<&str> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| Error::validation(key, "expected a string"))
    }

    pub fn flag(&self, key: &str) -> Result<bool> {
        self.require(key)?
            .as_flag()
            .ok_or_else(|| Error::validation(key, "expected a boolean or 0/1"))
    }

    /// Base name all per-job output paths derive from
    pub fn output_base(&self) -> Result<&str> {
        self.text(keys::FILE_NAME)
    }

    pub fn source_geometry(&self) -> Result<PathBuf> {
        self.text(keys::PREDEFINED_GDS).map(PathBuf::from)
    }

    pub fn output_geometry(&self) -> Result<PathBuf> {
        self.text(keys::GDS_FILE).map(PathBuf::from)
    }

    /// `<file_name><suffix>`
    pub fn derived_path(&self, suffix: &str) -> Result<PathBuf> {
        Ok(PathBuf::from(format!("{}{}", self.output_base()?, suffix)))
    }
}

/// Entry in a backend default table
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(&'static str),
    /// `<prefix><YYYYmmddHHMMSS>` evaluated at resolution time
    Timestamped(&'static str),
}

impl DefaultValue {
    pub fn materialize(&self) -> ParamValue {
        match self {
            DefaultValue::Float(v) => ParamValue::Float(*v),
            DefaultValue::Int(v) => ParamValue::Int(*v),
            DefaultValue::Bool(v) => ParamValue::Bool(*v),
            DefaultValue::Text(v) => ParamValue::Text(v.to_string()),
            DefaultValue::Timestamped(prefix) => ParamValue::Text(format!(
                "{}{}",
                prefix,
                chrono::Local::now().format("%Y%m%d%H%M%S")
            )),
        }
    }
}

/// Lumerical defaults; wavelengths in µm, temperature in K
pub const LUMERICAL_DEFAULTS: &[(&str, DefaultValue)] = &[
    (keys::WAVELENGTH, DefaultValue::Float(0.85)),
    (keys::WAV_SPAN, DefaultValue::Float(0.02)),
    (keys::WAV_STEP, DefaultValue::Float(0.01)),
    (keys::RESOLUTION, DefaultValue::Int(6)),
    (keys::TEMPERATURE, DefaultValue::Int(300)),
    (keys::PREDEFINED_GDS, DefaultValue::Text("mmi_1x2_450_VISPIC2.gds")),
    (keys::MATERIAL_TYPE, DefaultValue::Text("universal")),
    (keys::GUIDING_MATERIAL, DefaultValue::Text("SiN")),
    (keys::LUMAPI_PATH, DefaultValue::Text(r"C:\Program Files\Lumerical\v251\api\python")),
    (keys::FILE_NAME, DefaultValue::Timestamped("test_")),
    (keys::MODE_NUM, DefaultValue::Int(5)),
    (keys::MODE_IDX, DefaultValue::Int(1)),
    (keys::FLAG_EXTEND, DefaultValue::Int(1)),
    (keys::EXTENSION, DefaultValue::Int(10)),
    (keys::FLAG_RUN_SIMULATION, DefaultValue::Int(0)),
    (keys::FLAG_BOOLEAN, DefaultValue::Int(0)),
    (keys::SOLVER_Z_MIN, DefaultValue::Int(-1)),
    (keys::SOLVER_Z_MAX, DefaultValue::Int(1)),
    (keys::CHANGE_CLADDING, DefaultValue::Bool(false)),
];

/// Tidy3D defaults; no wavelength step, cloud task name instead of an API path
pub const TIDY3D_DEFAULTS: &[(&str, DefaultValue)] = &[
    (keys::WAVELENGTH, DefaultValue::Float(1.55)),
    (keys::WAV_SPAN, DefaultValue::Float(0.05)),
    (keys::RESOLUTION, DefaultValue::Int(6)),
    (keys::TEMPERATURE, DefaultValue::Int(300)),
    (keys::PREDEFINED_GDS, DefaultValue::Text("mmi_1x2_450_VISPIC2.gds")),
    (keys::MATERIAL_TYPE, DefaultValue::Text("universal")),
    (keys::GUIDING_MATERIAL, DefaultValue::Text("SiN")),
    (keys::FILE_NAME, DefaultValue::Timestamped("test_")),
    (keys::TASK_NAME, DefaultValue::Timestamped("test_")),
    (keys::MODE_NUM, DefaultValue::Int(5)),
    (keys::MODE_IDX, DefaultValue::Int(1)),
    (keys::FLAG_EXTEND, DefaultValue::Int(1)),
    (keys::EXTENSION, DefaultValue::Int(10)),
    (keys::FLAG_RUN_SIMULATION, DefaultValue::Int(0)),
    (keys::FLAG_BOOLEAN, DefaultValue::Int(0)),
    (keys::SOLVER_Z_MIN, DefaultValue::Int(-1)),
    (keys::SOLVER_Z_MAX, DefaultValue::Int(1)),
    (keys::CHANGE_CLADDING, DefaultValue::Bool(false)),
];

pub fn materialize_defaults(table: &[(&str, DefaultValue)]) -> ParamMap {
    table
        .iter()
        .map(|(k, v)| (k.to_string(), v.materialize()))
        .collect()
}
