use crate::models::DialectJudgment;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Application settings from `settings.yaml`, overridable through `MODBUILDER_*`
/// environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    /// Game installation root (the folder containing `Stalker2/`)
    pub game_base_path: Option<Utf8PathBuf>,

    /// Working data root (`<data_dir>/extract`, `<data_dir>/build/temp`)
    pub data_dir: Utf8PathBuf,

    /// Artifact root (`<output_dir>/paks`, `<output_dir>/mods`, `<output_dir>/vortex`)
    pub output_dir: Utf8PathBuf,

    /// Location of the repak executable
    pub repak_path: Utf8PathBuf,

    /// AES key for the base game archive
    pub aes_key: Option<String>,

    /// Pak format tag handed to the packer
    pub pak_format_version: String,

    /// Packer/unpacker timeout in seconds, 0 disables it
    pub archive_timeout_secs: u64,

    /// Explicitly pinned extraction snapshot; overrides "most recent"
    pub pinned_extraction: Option<Utf8PathBuf>,

    pub debug_mode: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            game_base_path: None,
            data_dir: Utf8PathBuf::from("data"),
            output_dir: Utf8PathBuf::from("output"),
            repak_path: Utf8PathBuf::from("tools/repak/repak.exe"),
            aes_key: None,
            pak_format_version: "V11".to_string(),
            archive_timeout_secs: 0,
            pinned_extraction: None,
            debug_mode: false,
        }
    }
}

impl AppSettings {
    /// Directory holding timestamped extraction snapshots
    pub fn extract_dir(&self) -> Utf8PathBuf {
        self.data_dir.join("extract")
    }

    /// Directory holding per-build scratch trees
    pub fn build_temp_dir(&self) -> Utf8PathBuf {
        self.data_dir.join("build").join("temp")
    }

    pub fn game_base_path(&self) -> Option<&Utf8Path> {
        self.game_base_path.as_deref()
    }
}

/// Last-known results persisted in `state.yaml`.
///
/// This is a cache only. Anything read from here may be stale; the live snapshot
/// is always inspected again before a build.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CachedState {
    pub last_extraction: Option<String>,
    pub last_extraction_path: Option<Utf8PathBuf>,
    pub judgment: Option<DialectJudgment>,
    pub detected_at: Option<DateTime<Utc>>,
}

impl CachedState {
    /// Record a fresh judgment for the snapshot at `path`
    pub fn record_detection(&mut self, path: &Utf8Path, judgment: &DialectJudgment) {
        self.last_extraction_path = Some(path.to_path_buf());
        self.judgment = Some(judgment.clone());
        self.detected_at = Some(Utc::now());
    }
}
