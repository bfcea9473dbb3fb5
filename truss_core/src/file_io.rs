//! # File I/O Module
//!
//! Reading and writing stage artifacts in a working directory:
//! - **Atomic saves**: write to `.tmp`, fsync, rename over the target
//! - **Version validation**: artifacts from an incompatible schema are rejected
//!
//! A missing or malformed upstream artifact is a [`TrussError::MissingInput`],
//! so a later stage never runs on empty data.
//!
//! ## Example
//!
//! ```rust,no_run
//! use truss_core::artifacts::NetworkArtifact;
//! use truss_core::file_io::{ensure_dir, load_artifact};
//! use std::path::Path;
//!
//! let dir = Path::new("out");
//! ensure_dir(dir)?;
//! let network = load_artifact::<NetworkArtifact>(dir)?.to_network()?;
//! # Ok::<(), truss_core::errors::TrussError>(())
//! ```

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::artifacts::{Artifact, SCHEMA_VERSION};
use crate::errors::{TrussError, TrussResult};

/// Create the working directory (and parents) if it does not exist yet.
pub fn ensure_dir(dir: &Path) -> TrussResult<()> {
    fs::create_dir_all(dir)
        .map_err(|e| TrussError::file_error("create directory", dir.display().to_string(), e.to_string()))
}

fn read_to_string(path: &Path, operation: &str) -> TrussResult<String> {
    let mut file =
        File::open(path).map_err(|e| TrussError::file_error(operation, path.display().to_string(), e.to_string()))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| TrussError::file_error(operation, path.display().to_string(), e.to_string()))?;
    Ok(contents)
}

/// Write any serializable value as pretty JSON with atomic semantics.
///
/// 1. Serialize
/// 2. Write to `<path>.tmp`
/// 3. fsync
/// 4. Rename over `path`
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> TrussResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| TrussError::serialization(e.to_string()))?;

    let tmp_path = path.with_extension("json.tmp");
    let mut tmp_file = File::create(&tmp_path)
        .map_err(|e| TrussError::file_error("create temp file", tmp_path.display().to_string(), e.to_string()))?;
    tmp_file
        .write_all(json.as_bytes())
        .map_err(|e| TrussError::file_error("write temp file", tmp_path.display().to_string(), e.to_string()))?;
    tmp_file
        .sync_all()
        .map_err(|e| TrussError::file_error("sync temp file", tmp_path.display().to_string(), e.to_string()))?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        TrussError::file_error("rename to final", path.display().to_string(), e.to_string())
    })?;

    Ok(())
}

/// Read an input JSON file (lines, loads).
///
/// Absent or malformed files are reported as [`TrussError::MissingInput`].
pub fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> TrussResult<T> {
    if !path.exists() {
        return Err(TrussError::missing_input(what, path.display().to_string(), "File not found"));
    }
    let contents = read_to_string(path, "read")
        .map_err(|e| TrussError::missing_input(what, path.display().to_string(), e.to_string()))?;
    serde_json::from_str(&contents)
        .map_err(|e| TrussError::missing_input(what, path.display().to_string(), format!("Malformed JSON: {}", e)))
}

/// Save an artifact under its standard file name in `dir`.
pub fn save_artifact<A: Artifact>(artifact: &A, dir: &Path) -> TrussResult<PathBuf> {
    let path = dir.join(A::FILE_NAME);
    save_json(artifact, &path)?;
    info!(artifact = A::NAME, path = %path.display(), "Artifact saved");
    Ok(path)
}

/// Load an artifact from `dir`.
///
/// # Returns
///
/// * `Err(TrussError::MissingInput)` - absent or malformed
/// * `Err(TrussError::VersionMismatch)` - written by an incompatible schema
pub fn load_artifact<A: Artifact>(dir: &Path) -> TrussResult<A> {
    let path = dir.join(A::FILE_NAME);
    let artifact: A = read_json(&path, A::NAME)?;
    validate_version(&artifact.meta().schema_version)?;
    debug!(artifact = A::NAME, run_id = %artifact.meta().run_id, "Artifact loaded");
    Ok(artifact)
}

/// Load an artifact if it exists; other failures still propagate.
pub fn load_optional_artifact<A: Artifact>(dir: &Path) -> TrussResult<Option<A>> {
    if dir.join(A::FILE_NAME).exists() {
        load_artifact(dir).map(Some)
    } else {
        Ok(None)
    }
}

/// Major version must match; for 0.x the file may not be newer in minor.
fn validate_version(file_version: &str) -> TrussResult<()> {
    let mismatch = || TrussError::VersionMismatch {
        file_version: file_version.to_string(),
        expected_version: SCHEMA_VERSION.to_string(),
    };

    let file_parts: Vec<u32> = file_version.split('.').filter_map(|p| p.parse().ok()).collect();
    let current_parts: Vec<u32> = SCHEMA_VERSION.split('.').filter_map(|p| p.parse().ok()).collect();

    if file_parts.is_empty() || current_parts.is_empty() {
        return Err(mismatch());
    }
    if file_parts[0] != current_parts[0] {
        return Err(mismatch());
    }
    if current_parts[0] == 0 && file_parts.len() > 1 && current_parts.len() > 1 && file_parts[1] > current_parts[1] {
        return Err(mismatch());
    }

    Ok(())
}
