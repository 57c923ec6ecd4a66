//! Suite files in, report files out.

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::HarnessError;
use crate::scenario::SuiteReport;
use crate::suite::Suite;

pub fn load_suite(path: &Path) -> Result<Suite, HarnessError> {
    load_json(path)
}

pub fn load_report(path: &Path) -> Result<SuiteReport, HarnessError> {
    load_json(path)
}

/// Writes `report` as pretty JSON, creating parent directories as needed.
pub fn save_report(path: &Path, report: &SuiteReport) -> Result<(), HarnessError> {
    save_json(path, report)
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, HarnessError> {
    let raw = fs::read_to_string(path).map_err(|source| HarnessError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| HarnessError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), HarnessError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| HarnessError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw).map_err(|source| HarnessError::Io {
        path: path.to_path_buf(),
        source,
    })
}
