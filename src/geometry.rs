//! Geometry file handling: GDSII stream check and verbatim copy

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Error, Result};

/// GDSII HEADER record: record type 0x00, data type 0x02 (two-byte integer)
const GDS_HEADER_RECORD: [u8; 2] = [0x00, 0x02];

/// Check that `path` starts with a GDSII HEADER record and return its version
pub fn read_gds_version(path: &Path) -> io::Result<u16> {
    let mut head = [0u8; 6];
    File::open(path)?.read_exact(&mut head).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => invalid_data("file is too short to be a GDSII stream"),
        _ => e,
    })?;

    let record_len = u16::from_be_bytes([head[0], head[1]]);
    if record_len < 6 || head[2..4] != GDS_HEADER_RECORD {
        return Err(invalid_data("missing GDSII HEADER record"));
    }
    Ok(u16::from_be_bytes([head[4], head[5]]))
}

/// Copy the source geometry to `destination`.
///
/// The stream is copied byte for byte so layer, datatype and property
/// records all come along. Copying a file onto itself is a no-op.
pub fn copy_geometry(source: &Path, destination: &Path) -> Result<()> {
    let wrap = |source_err: io::Error| Error::GeometryProcessing {
        path: source.to_path_buf(),
        source: source_err,
    };

    let version = read_gds_version(source).map_err(wrap)?;
    debug!("GDSII stream version {} in {:?}", version, source);

    if same_file(source, destination) {
        info!("GDS file already at {:?}", destination);
        return Ok(());
    }

    if let Some(dir) = destination.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(wrap)?;
    }
    fs::copy(source, destination).map_err(wrap)?;
    info!("GDS file copied to {:?}", destination);
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}
