//! Unpacking the base game archive into snapshots, and installing built paks.

use crate::config::ConfigManager;
use crate::models::{AppSettings, DialectJudgment};
use crate::services::archive::{ArchiveTool, CollaboratorError};
use crate::services::version_detection::VersionDetector;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use std::fs;
use thiserror::Error;

/// Base archive location relative to the game install directory
pub const BASE_ARCHIVE_SUBPATH: &str = "Stalker2/Content/Paks/pakchunk0-Windows.pak";

/// Folder the game loads mod paks from, relative to the install directory
pub const MODS_SUBPATH: &str = "Stalker2/Content/Paks/~mods";

const SNAPSHOT_PREFIX: &str = "pakchunk0-Windows";
const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%d-%m-%Y_%H-%M-%S";

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Game install path is not configured")]
    GameInstallNotConfigured,

    #[error("Base archive not found: {0}")]
    BaseArchiveMissing(Utf8PathBuf),

    #[error("Archive decryption key is not configured")]
    KeyNotConfigured,

    #[error("Mods folder not found under {0}")]
    ModsFolderMissing(Utf8PathBuf),

    #[error("{0} is already installed (use overwrite to replace it)")]
    AlreadyInstalled(Utf8PathBuf),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to update cached state: {0}")]
    Cache(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A freshly unpacked snapshot and its detection result
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub snapshot_dir: Utf8PathBuf,
    pub judgment: DialectJudgment,
}

/// Directory name of a snapshot taken at `taken_at`
pub fn snapshot_dir_name(taken_at: DateTime<Local>) -> String {
    format!(
        "{}_{}",
        SNAPSHOT_PREFIX,
        taken_at.format(SNAPSHOT_TIMESTAMP_FORMAT)
    )
}

/// Unpack the base game archive into a new timestamped snapshot.
///
/// Runs version detection on the result and records both in the cached state.
///
/// # Arguments
/// * `settings` - Supplies the game install path, extraction directory and key
/// * `archive_tool` - Performs the actual unpack
/// * `config_manager` - Receives the updated cached state
pub fn extract_base_archive<A: ArchiveTool>(
    settings: &AppSettings,
    archive_tool: &A,
    config_manager: &ConfigManager,
) -> Result<ExtractionOutcome, ExtractionError> {
    let game_dir = settings
        .game_base_path()
        .ok_or(ExtractionError::GameInstallNotConfigured)?;
    let archive = game_dir.join(BASE_ARCHIVE_SUBPATH);
    if !archive.is_file() {
        return Err(ExtractionError::BaseArchiveMissing(archive));
    }
    let key = settings
        .aes_key
        .as_deref()
        .filter(|key| !key.trim().is_empty())
        .ok_or(ExtractionError::KeyNotConfigured)?;

    let extract_dir = settings.extract_dir();
    fs::create_dir_all(&extract_dir).map_err(|source| ExtractionError::Io {
        path: extract_dir.clone(),
        source,
    })?;

    let snapshot_name = snapshot_dir_name(Local::now());
    let snapshot_dir = extract_dir.join(&snapshot_name);
    tracing::info!("Extracting {} into {}", archive, snapshot_dir);

    if let Err(e) = archive_tool.unpack(&archive, key, &snapshot_dir) {
        discard_partial_snapshot(&snapshot_dir);
        return Err(e.into());
    }

    let judgment = VersionDetector::new()
        .with_game_install(game_dir)
        .detect(&snapshot_dir);
    tracing::info!("{}", judgment.banner());

    let mut state = config_manager
        .load_cached_state()
        .map_err(|e| ExtractionError::Cache(e.into()))?;
    state.last_extraction = Some(snapshot_name);
    state.record_detection(&snapshot_dir, &judgment);
    config_manager
        .save_cached_state(&state)
        .map_err(|e| ExtractionError::Cache(e.into()))?;

    Ok(ExtractionOutcome {
        snapshot_dir,
        judgment,
    })
}

/// Remove whatever a failed unpack left behind so it never becomes the active snapshot
fn discard_partial_snapshot(snapshot_dir: &Utf8Path) {
    if !snapshot_dir.exists() {
        return;
    }
    match fs::remove_dir_all(snapshot_dir) {
        Ok(()) => tracing::info!("Removed incomplete extraction {}", snapshot_dir),
        Err(e) => tracing::warn!(
            "Failed to remove incomplete extraction {}: {}",
            snapshot_dir,
            e
        ),
    }
}

/// Copy a built pak into the game's `~mods` folder.
///
/// # Returns
/// The installed path
pub fn install_to_game(
    pak: &Utf8Path,
    game_dir: &Utf8Path,
    overwrite: bool,
) -> Result<Utf8PathBuf, ExtractionError> {
    let io_error = |path: &Utf8Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| ExtractionError::Io { path, source }
    };

    if !pak.is_file() {
        return Err(ExtractionError::Io {
            path: pak.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "pak file not found"),
        });
    }

    let paks_dir = game_dir.join("Stalker2/Content/Paks");
    if !paks_dir.is_dir() {
        return Err(ExtractionError::ModsFolderMissing(game_dir.to_path_buf()));
    }
    let mods_dir = game_dir.join(MODS_SUBPATH);
    fs::create_dir_all(&mods_dir).map_err(io_error(&mods_dir))?;

    let file_name = pak.file_name().unwrap_or("mod.pak");
    let target = mods_dir.join(file_name);
    if target.exists() && !overwrite {
        return Err(ExtractionError::AlreadyInstalled(target));
    }

    fs::copy(pak, &target).map_err(io_error(&target))?;
    tracing::info!("Installed {} to {}", file_name, mods_dir);
    Ok(target)
}
