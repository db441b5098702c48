//! Game version and file-dialect detection for extraction snapshots.
//!
//! Several weak signals are combined, strongest first:
//! - presence of text vs `.bin` signature files
//! - version-specific parameters inside `CoreVariables.cfg`
//! - version resources in the game executable
//! - `*.manifest` / `*.version` files
//! - median modification time of large files vs known release dates
//! - version-specific folders
//!
//! A method only replaces the running verdict when its confidence is higher, so weaker
//! signals never downgrade a stronger one.
//!
//! # Examples
//!
//! ```ignore
//! use modbuilder::services::VersionDetector;
//! use camino::Utf8Path;
//!
//! let detector = VersionDetector::new().with_game_install("C:/Games/Stalker2");
//! let judgment = detector.detect(Utf8Path::new("data/extract/pakchunk0-Windows_01-12-2024_10-00-00"));
//! println!("{}", judgment.banner());
//! ```

use crate::models::{DialectJudgment, Evidence, UNKNOWN_VERSION};
use crate::services::snapshot::{ExtractionSnapshot, FileFormat};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use regex::Regex;
use regex::bytes::Regex as BytesRegex;
use std::fs::File;
use std::io::Read;
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/// Confidence at which a presence verdict can no longer be overridden
pub const SEALED_CONFIDENCE: u8 = 95;

const MODERN_VERSION: &str = "1.8.1+";
const LEGACY_VERSION: &str = "1.5.2 - 1.7.x";

const MARKER_CONFIDENCE: u8 = 80;
const MANIFEST_CONFIDENCE: u8 = 85;
const FILE_DATES_CONFIDENCE: u8 = 70;
const FOLDER_CONFIDENCE: u8 = 60;
const CALIBRATION_CAP: u8 = 85;

const CORE_VARIABLES: &str = "CoreVariables.cfg";
const CORE_VARIABLES_PREFIX: u64 = 16 * 1024;
const EXECUTABLE_PREFIX: u64 = 128 * 1024;
const MANIFEST_PREFIX: u64 = 8 * 1024;
const MAX_MANIFESTS: usize = 5;
const LARGE_FILE_BYTES: u64 = 10_000;
const RELEASE_TOLERANCE_DAYS: i64 = 45;

/// Executable locations relative to the game install directory
const EXECUTABLE_CANDIDATES: &[&str] = &[
    "Stalker2/Binaries/Win64/Stalker2-Win64-Shipping.exe",
    "Stalker2.exe",
    "stalker2.exe",
    "Binaries/Win64/Stalker2-Win64-Shipping.exe",
];

/// Static knowledge the detector matches against
#[derive(Debug, Clone)]
pub struct DetectionTables {
    /// Files whose text/binary presence reveals the dialect
    pub signature_files: Vec<&'static str>,
    /// Version → parameters that first appear in that version's `CoreVariables.cfg`
    pub markers: Vec<(&'static str, Vec<&'static str>)>,
    /// Version → approximate release date
    pub release_dates: Vec<(&'static str, NaiveDate)>,
    /// Version → folders (relative to GameData) introduced by that version
    pub folder_fingerprints: Vec<(&'static str, Vec<&'static str>)>,
}

impl Default for DetectionTables {
    fn default() -> Self {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default();

        Self {
            signature_files: vec![
                "ObjWeightParamsPrototypes.cfg",
                "ObjEffectMaxParamsPrototypes.cfg",
                CORE_VARIABLES,
            ],
            markers: vec![
                (
                    "1.8.1",
                    vec![
                        "StaminaRegenStateCoefs",
                        "GroundClamber",
                        "ClamberCostMultiplier",
                        "StaminaJumpCost",
                        "StaminaVaultCost",
                    ],
                ),
                (
                    "1.7.x",
                    vec!["WeaponDurability", "ArtifactBalance", "EmissionFrequency"],
                ),
                (
                    "1.6.x",
                    vec!["AimAssist", "ControllerBalance", "BloodsuckerInvisibility"],
                ),
                (
                    "1.5.2",
                    vec!["MaxTotalWeight", "InventoryPenalty", "SprintStaminaCost"],
                ),
            ],
            release_dates: vec![
                ("1.5.2", date(2024, 10, 15)),
                ("1.6.0", date(2024, 11, 1)),
                ("1.7.0", date(2024, 11, 15)),
                ("1.8.1", date(2024, 12, 1)),
            ],
            folder_fingerprints: vec![
                (
                    "1.8.1",
                    vec![
                        "Quests/DLC_Quests",
                        "Zones/Icarus",
                        "Artifacts/LegendaryArtifacts",
                    ],
                ),
                ("1.7.x", vec!["Zones/Yaniv", "Quests/FactionQuests"]),
                ("1.6.x", vec!["Zones/Zaton", "Quests/SideQuests"]),
            ],
        }
    }
}

/// A version pattern searched for in the game executable
struct ExePattern {
    method: &'static str,
    regex: BytesRegex,
    confidence: u8,
}

/// Detects game version and configuration dialect from an extraction snapshot.
///
/// Stateless between calls: every [`detect`](Self::detect) re-reads the file system.
pub struct VersionDetector {
    tables: DetectionTables,
    game_install: Option<Utf8PathBuf>,
    exe_patterns: Vec<ExePattern>,
    manifest_pattern: Regex,
}

/// Running verdict while methods are applied
struct Verdict {
    judgment: DialectJudgment,
    sealed: bool,
}

impl Verdict {
    fn new() -> Self {
        Self {
            judgment: DialectJudgment {
                version: UNKNOWN_VERSION.to_string(),
                confidence: 0,
                is_modern_dialect: false,
                evidence: Vec::new(),
                warnings: Vec::new(),
                details: IndexMap::new(),
            },
            sealed: false,
        }
    }

    /// Adopt `version` if `confidence` beats the current verdict
    fn propose(&mut self, method: &str, version: &str, is_modern: bool, confidence: u8) -> bool {
        if self.sealed {
            self.detail(format!("{}_ignored", method), version);
            return false;
        }
        if confidence <= self.judgment.confidence {
            tracing::debug!(
                "{} suggests {} at {}%, keeping {} at {}%",
                method,
                version,
                confidence,
                self.judgment.version,
                self.judgment.confidence
            );
            return false;
        }

        self.judgment.version = version.to_string();
        self.judgment.is_modern_dialect = is_modern;
        self.judgment.confidence = confidence;
        self.judgment.evidence.push(Evidence {
            method: method.to_string(),
            contribution: confidence,
        });
        tracing::debug!("{} set version {} at {}%", method, version, confidence);
        true
    }

    fn detail(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.judgment.details.insert(key.into(), value.into());
    }

    fn warn(&mut self, warning: String) {
        tracing::warn!("{}", warning);
        self.judgment.warnings.push(warning);
    }
}

fn is_modern_version(version: &str) -> bool {
    version.starts_with("1.8")
}

impl VersionDetector {
    /// Create a detector with the built-in tables
    pub fn new() -> Self {
        Self::with_tables(DetectionTables::default())
    }

    pub fn with_tables(tables: DetectionTables) -> Self {
        let pattern = |method, regex: &str, confidence| ExePattern {
            method,
            regex: BytesRegex::new(regex).expect("Invalid executable version regex"),
            confidence,
        };

        Self {
            tables,
            game_install: None,
            exe_patterns: vec![
                pattern(
                    "exe_product_version",
                    r"(?s-u)ProductVersion.{0,20}?(\d+\.\d+\.\d+(?:\.\d+)?)",
                    98,
                ),
                pattern(
                    "exe_file_version",
                    r"(?s-u)FileVersion.{0,20}?(\d+\.\d+\.\d+(?:\.\d+)?)",
                    97,
                ),
                pattern("exe_dotted_quad", r"(?-u)(\d+\.\d+\.\d+\.\d+)", 95),
                pattern("exe_version_tag", r"(?s-u)Version.{0,10}?(\d+\.\d+\.\d+)", 90),
            ],
            manifest_pattern: Regex::new(r"(\d+\.\d+\.\d+(?:\.\d+)?)")
                .expect("Invalid manifest version regex"),
        }
    }

    /// Enable executable scanning under the given game install directory
    pub fn with_game_install(mut self, game_install: impl Into<Utf8PathBuf>) -> Self {
        self.game_install = Some(game_install.into());
        self
    }

    /// Detect version and dialect of the extraction rooted at `extraction_root`
    pub fn detect(&self, extraction_root: &Utf8Path) -> DialectJudgment {
        if !extraction_root.is_dir() {
            return DialectJudgment::unknown(format!(
                "Extraction root not found: {}",
                extraction_root
            ));
        }
        self.detect_snapshot(&ExtractionSnapshot::open(extraction_root))
    }

    /// Detect version and dialect of an already opened snapshot
    pub fn detect_snapshot(&self, snapshot: &ExtractionSnapshot) -> DialectJudgment {
        let Some(game_data) = snapshot.game_data() else {
            return DialectJudgment::unknown(format!(
                "GameData folder not found in {}",
                snapshot.root()
            ));
        };

        let mut verdict = Verdict::new();

        self.check_signature_files(snapshot, &mut verdict);

        if let Err(e) = self.check_markers(game_data, &mut verdict) {
            verdict.detail("core_vars_error", e.to_string());
        }
        if let Err(e) = self.check_executable(&mut verdict) {
            verdict.detail("exe_error", e.to_string());
        }
        if let Err(e) = self.check_manifests(game_data, &mut verdict) {
            verdict.detail("manifest_error", e.to_string());
        }
        if let Err(e) = self.check_file_dates(game_data, &mut verdict) {
            verdict.detail("file_dates_error", e.to_string());
        }
        self.check_folders(game_data, &mut verdict);
        self.calibrate(&mut verdict);

        let judgment = verdict.judgment;
        tracing::info!(
            "Detected game version {} ({}% confidence, modern={}, methods: {})",
            judgment.version,
            judgment.confidence,
            judgment.is_modern_dialect,
            judgment.methods().join(", ")
        );
        judgment
    }

    /// Method 1: text vs `.bin` signature files
    fn check_signature_files(&self, snapshot: &ExtractionSnapshot, verdict: &mut Verdict) {
        let mut text_only = 0usize;
        let mut binary_only = 0usize;

        for file in &self.tables.signature_files {
            let format = snapshot.file_format(file);
            let label = match format {
                FileFormat::Text => {
                    text_only += 1;
                    "text"
                }
                FileFormat::Binary => {
                    binary_only += 1;
                    "binary"
                }
                FileFormat::Both => {
                    verdict.warn(format!("{} exists in both text and binary form", file));
                    "both"
                }
                FileFormat::Missing => "missing",
            };
            verdict.detail(format!("format_{}", file), label);
        }

        if text_only > 0 && binary_only > 0 {
            verdict.warn(format!(
                "Mixed signature file formats: {} text, {} binary",
                text_only, binary_only
            ));
        }

        if binary_only >= 2 && binary_only > text_only {
            verdict.propose("binary_files_detected", MODERN_VERSION, true, 95);
            verdict.sealed = verdict.judgment.confidence >= SEALED_CONFIDENCE;
        } else if text_only >= 2 && text_only > binary_only {
            verdict.propose("text_files_detected", LEGACY_VERSION, false, 90);
        }
    }

    /// Method 2: version-specific parameters in the head of `CoreVariables.cfg`
    fn check_markers(&self, game_data: &Utf8Path, verdict: &mut Verdict) -> Result<()> {
        let core_vars = game_data.join(CORE_VARIABLES);
        if !core_vars.is_file() {
            return Ok(());
        }

        let content = read_prefix(&core_vars, CORE_VARIABLES_PREFIX)?;
        let content = String::from_utf8_lossy(&content);

        let mut best: Option<(&str, usize)> = None;
        for (version, markers) in &self.tables.markers {
            let found: Vec<&str> = markers
                .iter()
                .copied()
                .filter(|marker| content.contains(marker))
                .collect();
            if found.is_empty() {
                continue;
            }

            verdict.detail(format!("indicators_{}", version), found.join(", "));
            verdict.detail(format!("indicator_score_{}", version), (found.len() * 2).to_string());

            if best.is_none_or(|(_, count)| found.len() > count) {
                best = Some((version, found.len()));
            }
        }

        if let Some((version, count)) = best {
            if count >= 2 {
                verdict.propose(
                    "parameter_analysis",
                    version,
                    is_modern_version(version),
                    MARKER_CONFIDENCE,
                );
            }
        }
        Ok(())
    }

    /// Method 3: version resources in the first bytes of the game executable
    fn check_executable(&self, verdict: &mut Verdict) -> Result<()> {
        let Some(game_install) = &self.game_install else {
            return Ok(());
        };
        let Some(exe_path) = EXECUTABLE_CANDIDATES
            .iter()
            .map(|candidate| game_install.join(candidate))
            .find(|path| path.is_file())
        else {
            verdict.detail("exe", "not found");
            return Ok(());
        };

        let data = read_prefix(&exe_path, EXECUTABLE_PREFIX)?;
        for pattern in &self.exe_patterns {
            let Some(found) = pattern
                .regex
                .captures(&data)
                .and_then(|caps| caps.get(1))
                .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
            else {
                continue;
            };

            verdict.detail("exe_version", found.clone());
            verdict.propose(
                pattern.method,
                &found,
                is_modern_version(&found),
                pattern.confidence,
            );
            break;
        }
        Ok(())
    }

    /// Method 4: dotted versions inside a handful of manifest files
    fn check_manifests(&self, game_data: &Utf8Path, verdict: &mut Verdict) -> Result<()> {
        let manifests = WalkDir::new(game_data)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext == "manifest" || ext == "version")
            })
            .take(MAX_MANIFESTS);

        for entry in manifests {
            let content = match read_prefix_std(entry.path(), MANIFEST_PREFIX) {
                Ok(content) => content,
                Err(e) => {
                    tracing::debug!("Skipping unreadable manifest {:?}: {}", entry.path(), e);
                    continue;
                }
            };
            let content = String::from_utf8_lossy(&content);

            if let Some(found) = self.manifest_pattern.captures(&content).and_then(|c| c.get(1)) {
                let name = entry.file_name().to_string_lossy();
                verdict.propose(
                    &format!("manifest_{}", name),
                    found.as_str(),
                    is_modern_version(found.as_str()),
                    MANIFEST_CONFIDENCE,
                );
                break;
            }
        }
        Ok(())
    }

    /// Method 5: median modification date of large files vs release dates
    fn check_file_dates(&self, game_data: &Utf8Path, verdict: &mut Verdict) -> Result<()> {
        let mut mtimes: Vec<i64> = Vec::new();
        for entry in WalkDir::new(game_data).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let metadata = entry
                .metadata()
                .with_context(|| format!("Failed to stat {:?}", entry.path()))?;
            if metadata.len() <= LARGE_FILE_BYTES {
                continue;
            }
            if let Ok(since_epoch) = metadata.modified()?.duration_since(UNIX_EPOCH) {
                mtimes.push(since_epoch.as_secs() as i64);
            }
        }

        let Some(median) = median(&mut mtimes) else {
            return Ok(());
        };
        let Some(median_date) = DateTime::<Utc>::from_timestamp(median, 0).map(|d| d.date_naive())
        else {
            return Ok(());
        };

        let Some((version, days)) = self
            .tables
            .release_dates
            .iter()
            .map(|(version, date)| (*version, (*date - median_date).num_days().abs()))
            .min_by_key(|(_, days)| *days)
        else {
            return Ok(());
        };

        verdict.detail("median_file_date", median_date.to_string());
        verdict.detail("days_from_release", days.to_string());

        if days < RELEASE_TOLERANCE_DAYS {
            verdict.propose(
                "file_dates_analysis",
                version,
                is_modern_version(version),
                FILE_DATES_CONFIDENCE,
            );
        }
        Ok(())
    }

    /// Method 6: folders that only exist in certain versions
    fn check_folders(&self, game_data: &Utf8Path, verdict: &mut Verdict) {
        for (version, folders) in &self.tables.folder_fingerprints {
            let found = folders
                .iter()
                .filter(|folder| game_data.join(folder).is_dir())
                .count();
            if found == 0 {
                continue;
            }

            verdict.detail(format!("{}_folders_found", version), found.to_string());
            if found >= 2 {
                verdict.propose(
                    &format!("folder_structure_{}", version),
                    version,
                    is_modern_version(version),
                    FOLDER_CONFIDENCE,
                );
            }
        }
    }

    /// Method 7: boost mid-confidence verdicts that several indicators call modern.
    ///
    /// Only `is_modern_dialect` and confidence change; `version` keeps whatever the
    /// earlier methods produced, so the two can disagree.
    fn calibrate(&self, verdict: &mut Verdict) {
        let judgment = &verdict.judgment;
        if !(FILE_DATES_CONFIDENCE..90).contains(&judgment.confidence) {
            return;
        }

        let modern_indicators = [
            judgment.is_modern_dialect,
            judgment
                .evidence
                .iter()
                .any(|e| e.method == "binary_files_detected"),
            judgment.evidence.iter().any(|e| e.method.contains("1.8")),
            judgment.version.contains("1.8"),
        ]
        .iter()
        .filter(|indicator| **indicator)
        .count();

        if modern_indicators < 2 {
            return;
        }

        let current = verdict.judgment.confidence;
        let calibrated = current.max(current.saturating_add(10).min(CALIBRATION_CAP));
        verdict.judgment.is_modern_dialect = true;
        verdict.judgment.confidence = calibrated;
        verdict.judgment.evidence.push(Evidence {
            method: "calibration".to_string(),
            contribution: calibrated - current,
        });
        tracing::debug!("Calibrated confidence {} -> {}", current, calibrated);
    }
}

impl Default for VersionDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn read_prefix(path: &Utf8Path, limit: u64) -> Result<Vec<u8>> {
    read_prefix_std(path.as_std_path(), limit)
}

fn read_prefix_std(path: &std::path::Path, limit: u64) -> Result<Vec<u8>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut buffer = Vec::new();
    file.take(limit)
        .read_to_end(&mut buffer)
        .with_context(|| format!("Failed to read {:?}", path))?;
    Ok(buffer)
}

/// Median of the values, averaging the middle pair for even counts
fn median(values: &mut [i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::snapshot::GAME_DATA_SUBPATH;
    use std::fs;
    use tempfile::TempDir;

    fn snapshot_root(temp_dir: &TempDir) -> (Utf8PathBuf, Utf8PathBuf) {
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let game_data = root.join(GAME_DATA_SUBPATH);
        fs::create_dir_all(&game_data).unwrap();
        (root, game_data)
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut []), None);
        assert_eq!(median(&mut [5, 1, 3]), Some(3));
        assert_eq!(median(&mut [4, 1, 3, 2]), Some(2));
    }

    #[test]
    fn test_sealed_verdict_ignores_later_methods() {
        let mut verdict = Verdict::new();
        assert!(verdict.propose("binary_files_detected", MODERN_VERSION, true, 95));
        verdict.sealed = true;

        assert!(!verdict.propose("exe_product_version", "1.5.2.0", false, 98));
        assert_eq!(verdict.judgment.version, MODERN_VERSION);
        assert_eq!(verdict.judgment.confidence, 95);
        assert!(verdict.judgment.is_modern_dialect);
        assert_eq!(
            verdict.judgment.details.get("exe_product_version_ignored"),
            Some(&"1.5.2.0".to_string())
        );
    }

    #[test]
    fn test_lower_confidence_never_overrides() {
        let mut verdict = Verdict::new();
        assert!(verdict.propose("parameter_analysis", "1.7.x", false, 80));
        assert!(!verdict.propose("file_dates_analysis", "1.8.1", true, 70));
        assert!(!verdict.propose("parameter_analysis_again", "1.6.x", false, 80));
        assert_eq!(verdict.judgment.version, "1.7.x");
    }

    #[test]
    fn test_markers_pick_best_bucket() {
        let temp_dir = TempDir::new().unwrap();
        let (root, game_data) = snapshot_root(&temp_dir);
        fs::write(
            game_data.join(CORE_VARIABLES),
            "StaminaRegenStateCoefs = 1\nGroundClamber = true\nWeaponDurability = 1\n",
        )
        .unwrap();

        let judgment = VersionDetector::new().detect(&root);
        assert_eq!(judgment.version, "1.8.1");
        assert!(judgment.confidence >= 80);
        assert!(judgment.is_modern_dialect);
        assert_eq!(
            judgment.details.get("indicator_score_1.8.1"),
            Some(&"4".to_string())
        );
    }

    #[test]
    fn test_single_marker_is_not_enough() {
        let temp_dir = TempDir::new().unwrap();
        let (root, game_data) = snapshot_root(&temp_dir);
        fs::write(game_data.join(CORE_VARIABLES), "AimAssist = 1\n").unwrap();

        let judgment = VersionDetector::new().detect(&root);
        assert_eq!(judgment.version, UNKNOWN_VERSION);
        assert_eq!(judgment.confidence, 0);
    }

    #[test]
    fn test_executable_product_version() {
        let temp_dir = TempDir::new().unwrap();
        let (root, _game_data) = snapshot_root(&temp_dir);

        let install = temp_dir.path().join("install");
        let exe_dir = install.join("Stalker2/Binaries/Win64");
        fs::create_dir_all(&exe_dir).unwrap();
        let mut exe = b"MZ\x90\x00garbage".to_vec();
        exe.extend_from_slice(b"ProductVersion\x00\x00 1.8.1.0\x00");
        fs::write(exe_dir.join("Stalker2-Win64-Shipping.exe"), exe).unwrap();

        let detector = VersionDetector::new()
            .with_game_install(Utf8PathBuf::try_from(install).unwrap());
        let judgment = detector.detect(&root);

        assert_eq!(judgment.version, "1.8.1.0");
        assert_eq!(judgment.confidence, 98);
        assert!(judgment.is_modern_dialect);
        assert_eq!(judgment.methods(), vec!["exe_product_version"]);
    }

    #[test]
    fn test_manifest_version() {
        let temp_dir = TempDir::new().unwrap();
        let (root, game_data) = snapshot_root(&temp_dir);
        fs::write(game_data.join("build.version"), "BuildVersion=1.7.2\n").unwrap();

        let judgment = VersionDetector::new().detect(&root);
        assert_eq!(judgment.version, "1.7.2");
        assert_eq!(judgment.confidence, 85);
        assert!(!judgment.is_modern_dialect);
        assert_eq!(judgment.methods(), vec!["manifest_build.version"]);
    }

    #[test]
    fn test_folder_fingerprints() {
        let temp_dir = TempDir::new().unwrap();
        let (root, game_data) = snapshot_root(&temp_dir);
        fs::create_dir_all(game_data.join("Zones/Yaniv")).unwrap();
        fs::create_dir_all(game_data.join("Quests/FactionQuests")).unwrap();

        let judgment = VersionDetector::new().detect(&root);
        assert_eq!(judgment.version, "1.7.x");
        assert_eq!(judgment.confidence, 60);
    }

    #[test]
    fn test_missing_game_data() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();

        let judgment = VersionDetector::new().detect(&root);
        assert!(judgment.is_unknown());
        assert!(judgment.warnings[0].contains("GameData"));
    }
}
