//! Extraction snapshots: discovery of the active unpack and per-file dialect queries.
//!
//! A snapshot is one timestamped unpack of the base game archive, e.g.
//! `data/extract/pakchunk0-Windows_14-01-2025_10-30-00/`. Snapshots are never
//! modified here.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::time::SystemTime;
use walkdir::WalkDir;

/// Conventional location of `GameData` inside an extraction root
pub const GAME_DATA_SUBPATH: &str = "Stalker2/Content/GameLite/GameData";

/// Suffix of the binary encoding of a configuration file
pub const BINARY_SUFFIX: &str = ".bin";

/// Marker in the directory names produced by the base archive unpack
const SNAPSHOT_DIR_MARKER: &str = "pakchunk";

/// On-disk encoding of one logical configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Only the plain-text file exists
    Text,
    /// Only the `.bin` sibling exists
    Binary,
    /// Both encodings exist side by side
    Both,
    Missing,
}

/// A located source file and the encoding it was found in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: Utf8PathBuf,
    pub binary: bool,
}

/// One extraction of the base archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSnapshot {
    root: Utf8PathBuf,
    game_data: Option<Utf8PathBuf>,
}

impl ExtractionSnapshot {
    /// Open the snapshot rooted at `root`, discovering its `GameData` directory
    pub fn open(root: impl Into<Utf8PathBuf>) -> Self {
        let root = root.into();
        let game_data = find_game_data(&root);
        Self { root, game_data }
    }

    /// Resolve the active snapshot.
    ///
    /// In order of preference:
    /// 1. `pinned`, when it exists
    /// 2. `last_extraction` (a directory name under `extract_dir`, as recorded by the
    ///    last successful extraction), when it still exists
    /// 3. the most recently modified `pakchunk*` directory under `extract_dir`
    ///
    /// # Returns
    /// `None` if no snapshot is available
    pub fn discover(
        extract_dir: &Utf8Path,
        pinned: Option<&Utf8Path>,
        last_extraction: Option<&str>,
    ) -> Result<Option<Self>> {
        if let Some(pinned) = pinned {
            if pinned.is_dir() {
                tracing::info!("Using pinned extraction: {}", pinned);
                return Ok(Some(Self::open(pinned)));
            }
            tracing::warn!(
                "Pinned extraction {} does not exist, falling back to latest",
                pinned
            );
        }

        if let Some(name) = last_extraction {
            let recorded = extract_dir.join(name);
            if recorded.is_dir() {
                tracing::info!("Using last extraction: {}", recorded);
                return Ok(Some(Self::open(recorded)));
            }
            tracing::debug!("Last extraction {} is gone, falling back to latest", recorded);
        }

        Ok(latest_snapshot_dir(extract_dir)?.map(Self::open))
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// The `GameData` directory, if the snapshot has one
    pub fn game_data(&self) -> Option<&Utf8Path> {
        self.game_data.as_deref()
    }

    pub fn is_usable(&self) -> bool {
        self.root.is_dir() && self.game_data.is_some()
    }

    /// Report which encodings of `logical_path` (relative to `GameData`) exist
    pub fn file_format(&self, logical_path: &str) -> FileFormat {
        let Some(game_data) = self.game_data() else {
            return FileFormat::Missing;
        };
        let text = game_data.join(logical_path);
        let binary = binary_sibling(&text);

        match (text.is_file(), binary.is_file()) {
            (true, true) => FileFormat::Both,
            (true, false) => FileFormat::Text,
            (false, true) => FileFormat::Binary,
            (false, false) => FileFormat::Missing,
        }
    }

    /// Locate the source for `logical_path`, preferring text over binary.
    ///
    /// Looks at the conventional location under `GameData` first, then searches the
    /// whole snapshot by file name.
    pub fn locate(&self, logical_path: &str) -> Option<SourceFile> {
        if let Some(game_data) = self.game_data() {
            let text = game_data.join(logical_path);
            if text.is_file() {
                return Some(SourceFile {
                    path: text,
                    binary: false,
                });
            }
            let binary = binary_sibling(&text);
            if binary.is_file() {
                return Some(SourceFile { path: binary, binary: true });
            }
        }

        let file_name = Utf8Path::new(logical_path).file_name()?;
        if let Some(path) = self.find_by_name(file_name) {
            return Some(SourceFile { path, binary: false });
        }
        self.find_by_name(&format!("{}{}", file_name, BINARY_SUFFIX))
            .map(|path| SourceFile { path, binary: true })
    }

    fn find_by_name(&self, file_name: &str) -> Option<Utf8PathBuf> {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .find(|entry| entry.file_name().to_str() == Some(file_name))
            .and_then(|entry| Utf8PathBuf::from_path_buf(entry.into_path()).ok())
            .inspect(|path| tracing::debug!("Found {} at {}", file_name, path))
    }
}

/// Path of the binary sibling of a text configuration file
pub fn binary_sibling(text_path: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{}{}", text_path, BINARY_SUFFIX))
}

fn find_game_data(root: &Utf8Path) -> Option<Utf8PathBuf> {
    let conventional = root.join(GAME_DATA_SUBPATH);
    if conventional.is_dir() {
        return Some(conventional);
    }

    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir() && entry.file_name() == "GameData")
        .find_map(|entry| Utf8PathBuf::from_path_buf(entry.into_path()).ok())
}

fn latest_snapshot_dir(extract_dir: &Utf8Path) -> Result<Option<Utf8PathBuf>> {
    if !extract_dir.is_dir() {
        tracing::debug!("Extraction directory {} does not exist", extract_dir);
        return Ok(None);
    }

    let mut candidates: Vec<(SystemTime, Utf8PathBuf)> = Vec::new();
    for entry in extract_dir
        .read_dir_utf8()
        .with_context(|| format!("Failed to list extraction directory: {}", extract_dir))?
    {
        let entry = entry.context("Failed to read extraction directory entry")?;
        let is_snapshot = entry.file_type().map(|t| t.is_dir()).unwrap_or(false)
            && entry.file_name().to_lowercase().contains(SNAPSHOT_DIR_MARKER);
        if !is_snapshot {
            continue;
        }

        let modified = fs::metadata(entry.path())
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        candidates.push((modified, entry.path().to_path_buf()));
    }

    let latest = candidates
        .into_iter()
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path);

    if let Some(path) = &latest {
        tracing::info!("Using extraction folder: {}", path);
    }
    Ok(latest)
}
