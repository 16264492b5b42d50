//! Versioned save/load of a test run.
//!
//! A saved run is a directory holding `manifest.json`, `config.yaml`,
//! `specs.json`, `data.json`, `test_cases.json` and, once evaluated,
//! `results.json` and `report.json`. Every file is written atomically (temp file + rename) and
//! its SHA-256 recorded in the manifest, which is written last. Loading
//! verifies the format version and every checksum before parsing anything;
//! any mismatch is fatal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{TestConfig, TransformSpec};
use crate::error::PersistError;
use crate::report::Report;
use crate::types::{EvaluationResult, Sample, Task, TestCase};

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 2;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const CONFIG_FILE: &str = "config.yaml";
pub const SPECS_FILE: &str = "specs.json";
pub const DATA_FILE: &str = "data.json";
pub const TEST_CASES_FILE: &str = "test_cases.json";
pub const RESULTS_FILE: &str = "results.json";
pub const REPORT_FILE: &str = "report.json";

const REQUIRED_FILES: [&str; 4] = [CONFIG_FILE, SPECS_FILE, DATA_FILE, TEST_CASES_FILE];

/// Describes a saved run and pins the content of each file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub run_id: Uuid,
    pub task: Task,
    pub seed: u64,
    pub saved_at: DateTime<Utc>,
    /// Skipped record count per transform at generation time.
    #[serde(default)]
    pub skipped: BTreeMap<String, usize>,
    /// File name -> hex SHA-256.
    pub checksums: BTreeMap<String, String>,
}

/// Everything needed to resume a run without regenerating or re-predicting.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedRun {
    pub run_id: Uuid,
    pub task: Task,
    pub seed: u64,
    pub config: TestConfig,
    /// Transform specs as resolved when the cases were generated.
    pub specs: Vec<TransformSpec>,
    pub data: Vec<Sample>,
    pub test_cases: Vec<TestCase>,
    pub skipped: BTreeMap<String, usize>,
    pub results: Option<Vec<EvaluationResult>>,
    pub report: Option<Report>,
}

/// Atomically write JSON data to a file.
///
/// Creates parent directories if they don't exist.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically write raw bytes to a file.
///
/// Writes to a `.tmp` sibling file, then renames to the target path.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Hex SHA-256 of a byte string.
pub fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn to_json<T: Serialize>(file: &str, data: &T) -> Result<Vec<u8>, PersistError> {
    serde_json::to_vec_pretty(data).map_err(|e| PersistError::Corrupted {
        file: file.to_string(),
        message: e.to_string(),
    })
}

/// Save a run into `dir`, replacing any previous save there.
pub fn save_run(dir: &Path, run: &SavedRun) -> Result<(), PersistError> {
    let config_yaml = run.config.to_yaml().map_err(|e| PersistError::Corrupted {
        file: CONFIG_FILE.to_string(),
        message: e.to_string(),
    })?;

    let mut files: Vec<(&str, Vec<u8>)> = vec![
        (CONFIG_FILE, config_yaml.into_bytes()),
        (SPECS_FILE, to_json(SPECS_FILE, &run.specs)?),
        (DATA_FILE, to_json(DATA_FILE, &run.data)?),
        (TEST_CASES_FILE, to_json(TEST_CASES_FILE, &run.test_cases)?),
    ];
    if let Some(results) = &run.results {
        files.push((RESULTS_FILE, to_json(RESULTS_FILE, results)?));
    }
    if let Some(report) = &run.report {
        files.push((REPORT_FILE, to_json(REPORT_FILE, report)?));
    }

    std::fs::create_dir_all(dir)?;
    // Files from an older save that this one no longer carries would
    // otherwise sit next to a manifest that does not vouch for them.
    for stale in [RESULTS_FILE, REPORT_FILE] {
        let path = dir.join(stale);
        if path.exists() && !files.iter().any(|(name, _)| *name == stale) {
            std::fs::remove_file(path)?;
        }
    }

    let mut checksums = BTreeMap::new();
    for (name, bytes) in &files {
        atomic_write(&dir.join(name), bytes)?;
        checksums.insert(name.to_string(), hex_sha256(bytes));
        debug!(file = name, bytes = bytes.len(), "Wrote run file");
    }

    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        run_id: run.run_id,
        task: run.task,
        seed: run.seed,
        saved_at: Utc::now(),
        skipped: run.skipped.clone(),
        checksums,
    };
    atomic_write_json(&dir.join(MANIFEST_FILE), &manifest)?;
    info!(dir = %dir.display(), files = files.len(), "Saved run");
    Ok(())
}

/// Read one file of a saved run and verify it against the manifest.
fn read_verified(dir: &Path, manifest: &Manifest, file: &str) -> Result<Vec<u8>, PersistError> {
    let path = dir.join(file);
    let expected = manifest.checksums.get(file);
    if !path.exists() || expected.is_none() {
        return Err(PersistError::MissingFile {
            dir: dir.to_path_buf(),
            file: file.to_string(),
        });
    }
    let bytes = std::fs::read(&path)?;
    if Some(&hex_sha256(&bytes)) != expected {
        return Err(PersistError::ChecksumMismatch {
            file: file.to_string(),
        });
    }
    Ok(bytes)
}

fn parse_json<T: serde::de::DeserializeOwned>(file: &str, bytes: &[u8]) -> Result<T, PersistError> {
    serde_json::from_slice(bytes).map_err(|e| PersistError::Corrupted {
        file: file.to_string(),
        message: e.to_string(),
    })
}

/// Load the manifest of a saved run.
pub fn load_manifest(dir: &Path) -> Result<Manifest, PersistError> {
    let path = dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Err(PersistError::MissingFile {
            dir: dir.to_path_buf(),
            file: MANIFEST_FILE.to_string(),
        });
    }
    let bytes = std::fs::read(&path)?;
    let manifest: Manifest = parse_json(MANIFEST_FILE, &bytes)?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(PersistError::IncompatibleVersion {
            found: manifest.format_version,
            expected: FORMAT_VERSION,
        });
    }
    Ok(manifest)
}

/// Load a saved run, verifying version and checksums first.
pub fn load_run(dir: &Path) -> Result<SavedRun, PersistError> {
    let manifest = load_manifest(dir)?;

    // Verify everything before parsing anything: no partial reloads.
    let mut verified: BTreeMap<&str, Vec<u8>> = BTreeMap::new();
    for file in REQUIRED_FILES {
        verified.insert(file, read_verified(dir, &manifest, file)?);
    }
    for file in [RESULTS_FILE, REPORT_FILE] {
        if manifest.checksums.contains_key(file) {
            verified.insert(file, read_verified(dir, &manifest, file)?);
        }
    }

    let config_yaml = String::from_utf8(verified[CONFIG_FILE].clone()).map_err(|e| {
        PersistError::Corrupted {
            file: CONFIG_FILE.to_string(),
            message: e.to_string(),
        }
    })?;
    let config = TestConfig::from_yaml(&config_yaml).map_err(|e| PersistError::Corrupted {
        file: CONFIG_FILE.to_string(),
        message: e.to_string(),
    })?;

    let run = SavedRun {
        run_id: manifest.run_id,
        task: manifest.task,
        seed: manifest.seed,
        config,
        specs: parse_json(SPECS_FILE, &verified[SPECS_FILE])?,
        data: parse_json(DATA_FILE, &verified[DATA_FILE])?,
        test_cases: parse_json(TEST_CASES_FILE, &verified[TEST_CASES_FILE])?,
        skipped: manifest.skipped.clone(),
        results: verified
            .get(RESULTS_FILE)
            .map(|b| parse_json(RESULTS_FILE, b))
            .transpose()?,
        report: verified
            .get(REPORT_FILE)
            .map(|b| parse_json(REPORT_FILE, b))
            .transpose()?,
    };
    info!(
        dir = %dir.display(),
        run_id = %run.run_id,
        test_cases = run.test_cases.len(),
        evaluated = run.results.is_some(),
        "Loaded run"
    );
    Ok(run)
}
