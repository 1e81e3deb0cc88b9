//! Reading and writing the activity JSON file.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use stravajson_core::Activity;
use tracing::{debug, warn};

use crate::error::ClientResult;

/// Directory used when `--out` is not given.
pub const DEFAULT_OUTPUT_DIR: &str = "data";

/// `data/activities_<stamp>.json`.
pub fn default_output_path(stamp: &str) -> PathBuf {
    Path::new(DEFAULT_OUTPUT_DIR).join(format!("activities_{}.json", stamp))
}

/// Loads a previously written dataset for append mode.
///
/// Returns `None` when the file does not exist. Unreadable files, invalid
/// JSON and non-array documents all load as an empty dataset; array entries
/// that are not objects are skipped.
pub fn load_existing(path: &Path) -> Option<Vec<Activity>> {
    if !path.is_file() {
        return None;
    }

    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|content| serde_json::from_str::<Value>(&content).map_err(|e| e.to_string()));

    match parsed {
        Ok(Value::Array(items)) => {
            let activities: Vec<Activity> =
                items.into_iter().filter_map(Activity::from_value).collect();
            debug!(path = %path.display(), count = activities.len(), "loaded existing dataset");
            Some(activities)
        }
        Ok(_) => {
            warn!(path = %path.display(), "existing output is not a JSON array, starting fresh");
            Some(Vec::new())
        }
        Err(e) => {
            warn!(path = %path.display(), "cannot read existing output ({}), starting fresh", e);
            Some(Vec::new())
        }
    }
}

/// Writes `activities` as pretty JSON through a temporary sibling file.
pub fn write_json_atomic(path: &Path, activities: &[Activity]) -> ClientResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let mut content = serde_json::to_string_pretty(activities)?;
    content.push('\n');

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "activities.json".to_string());
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&temp_path, content)?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}
