//! Build orchestration: from a module selection to packaged artifacts.
//!
//! One build walks `Idle → Validating → Patching → Packaging → Finalizing → Done`,
//! dropping to `Failed` on the first fatal error. The per-build tree under
//! `<data>/build/temp/<name>` is only removed once the pak and its unpacked copy
//! exist; a failed build leaves it behind for inspection.

use crate::metrics::BuildMetrics;
use crate::models::{AppSettings, ResolvedConfiguration, ValidationFailure};
use crate::patching::{BuildTree, ConfigPatcher, ModuleRegistry, PatchContext, PatchError, PatchReport};
use crate::services::archive::{ArchiveTool, CollaboratorError};
use crate::services::conflicts::{ConflictReport, detect_conflicts};
use crate::services::extraction::MODS_SUBPATH;
use crate::services::snapshot::ExtractionSnapshot;
use crate::services::version_detection::VersionDetector;
use crate::state::{BuildEvent, BuildPhase, BuildStateMachine, TransitionError};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use std::fs::{self, File};
use std::time::Instant;
use thiserror::Error;

const DEFAULT_NAME_FORMAT: &str = "custom_multi_mod_%d_%m_%Y__%H_%M_%S";
const MAX_NAME_LEN: usize = 100;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Prerequisite missing: {0}")]
    PrerequisiteMissing(String),

    #[error("Invalid build name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Invalid configuration for {module}: {source}")]
    InvalidConfiguration {
        module: String,
        #[source]
        source: ValidationFailure,
    },

    #[error("Module {module} failed: {source}")]
    ModuleFailed {
        module: String,
        #[source]
        source: PatchError,
    },

    #[error("No modules were applied")]
    NoModulesApplied,

    #[error("Packing failed: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Workspace(#[from] PatchError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Where a build puts its files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub output_dir: Utf8PathBuf,
    pub build_temp_dir: Utf8PathBuf,
}

impl OutputLayout {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            output_dir: settings.output_dir.clone(),
            build_temp_dir: settings.build_temp_dir(),
        }
    }

    pub fn build_tree_dir(&self, name: &str) -> Utf8PathBuf {
        self.build_temp_dir.join(name)
    }

    pub fn pak_path(&self, name: &str) -> Utf8PathBuf {
        self.output_dir.join("paks").join(format!("{}.pak", name))
    }

    pub fn unpacked_dir(&self, name: &str) -> Utf8PathBuf {
        self.output_dir.join("mods").join(name)
    }

    pub fn redistribution_zip(&self, name: &str) -> Utf8PathBuf {
        self.output_dir
            .join("vortex")
            .join(format!("{}_Vortex.zip", name))
    }
}

/// One module with the configuration to apply
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSelection {
    pub module: String,
    pub config: ResolvedConfiguration,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildRequest {
    /// Build name; a timestamped default is used when `None`
    pub name: Option<String>,
    /// Modules in application order
    pub selections: Vec<ModuleSelection>,
}

/// Everything a successful build produced
#[derive(Debug, Clone)]
pub struct BuildArtifacts {
    pub name: String,
    pub pak: Utf8PathBuf,
    pub unpacked: Utf8PathBuf,
    /// Missing when the best-effort zip could not be written
    pub redistribution: Option<Utf8PathBuf>,
    pub reports: Vec<PatchReport>,
    pub conflicts: ConflictReport,
}

/// Timestamped default build name
pub fn default_build_name() -> String {
    Local::now().format(DEFAULT_NAME_FORMAT).to_string()
}

/// Reject names that cannot be used as a file name on the game's platform
pub fn validate_build_name(name: &str) -> Result<(), BuildError> {
    let invalid = |reason| {
        Err(BuildError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    if name.trim().is_empty() {
        return invalid("name is empty");
    }
    if name.len() > MAX_NAME_LEN {
        return invalid("name is too long");
    }
    if name
        .chars()
        .any(|c| c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
    {
        return invalid("name contains characters not allowed in file names");
    }
    if name.ends_with('.') || name.ends_with(' ') || name.starts_with('.') {
        return invalid("name cannot start with a dot or end with a dot or space");
    }
    if is_reserved_device_name(name) {
        return invalid("name is reserved by Windows");
    }
    Ok(())
}

/// `CON`, `PRN`, `AUX`, `NUL`, `COM1`-`COM9` and `LPT1`-`LPT9`, with or without an extension
fn is_reserved_device_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name).trim_end();
    let upper = stem.to_ascii_uppercase();
    match upper.as_str() {
        "CON" | "PRN" | "AUX" | "NUL" => true,
        _ => {
            let bytes = upper.as_bytes();
            bytes.len() == 4
                && (upper.starts_with("COM") || upper.starts_with("LPT"))
                && matches!(bytes[3], b'1'..=b'9')
        }
    }
}

/// Runs builds against one registry and archive tool
pub struct BuildOrchestrator<'a, A: ArchiveTool> {
    registry: &'a ModuleRegistry,
    archive_tool: A,
    layout: OutputLayout,
    format_version: String,
    game_install: Option<Utf8PathBuf>,
    metrics: BuildMetrics,
}

impl<'a, A: ArchiveTool> BuildOrchestrator<'a, A> {
    pub fn new(registry: &'a ModuleRegistry, archive_tool: A, settings: &AppSettings) -> Self {
        Self {
            registry,
            archive_tool,
            layout: OutputLayout::from_settings(settings),
            format_version: settings.pak_format_version.clone(),
            game_install: settings.game_base_path.clone(),
            metrics: BuildMetrics::new(),
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn metrics(&self) -> &BuildMetrics {
        &self.metrics
    }

    /// Run one build with a fresh state machine
    pub fn build(
        &self,
        snapshot: Option<&ExtractionSnapshot>,
        request: &BuildRequest,
    ) -> Result<BuildArtifacts, BuildError> {
        let mut machine = BuildStateMachine::new();
        self.build_with_state(snapshot, request, &mut machine)
    }

    /// Run one build, reporting progress through `machine`
    pub fn build_with_state(
        &self,
        snapshot: Option<&ExtractionSnapshot>,
        request: &BuildRequest,
        machine: &mut BuildStateMachine,
    ) -> Result<BuildArtifacts, BuildError> {
        machine.transition(BuildPhase::Validating)?;

        let result = self.run(snapshot, request, machine);
        match &result {
            Ok(artifacts) => {
                self.metrics.record_build_succeeded();
                tracing::info!("Build {} finished: {}", artifacts.name, artifacts.pak);
            }
            Err(e) => {
                machine.fail();
                self.metrics.record_build_failed();
                tracing::error!("Build failed: {}", e);
            }
        }
        self.metrics.log_summary();
        result
    }

    fn run(
        &self,
        snapshot: Option<&ExtractionSnapshot>,
        request: &BuildRequest,
        machine: &mut BuildStateMachine,
    ) -> Result<BuildArtifacts, BuildError> {
        // Validating
        let snapshot = snapshot.ok_or_else(|| {
            BuildError::PrerequisiteMissing(
                "no extraction snapshot found, extract the game files first".to_string(),
            )
        })?;
        if !snapshot.is_usable() {
            return Err(BuildError::PrerequisiteMissing(format!(
                "GameData folder not found in {}",
                snapshot.root()
            )));
        }

        let name = request.name.clone().unwrap_or_else(default_build_name);
        validate_build_name(&name)?;

        let mut selected: Vec<(&dyn ConfigPatcher, &ModuleSelection)> = Vec::new();
        for selection in &request.selections {
            let module = self
                .registry
                .get(&selection.module)
                .ok_or_else(|| BuildError::UnknownModule(selection.module.clone()))?;
            module
                .validate_config(&selection.config)
                .map_err(|source| BuildError::InvalidConfiguration {
                    module: module.descriptor().name.to_string(),
                    source,
                })?;
            selected.push((module, selection));
        }

        let mut detector = VersionDetector::new();
        if let Some(game_install) = &self.game_install {
            detector = detector.with_game_install(game_install.clone());
        }
        let judgment = detector.detect_snapshot(snapshot);
        tracing::info!("{}", judgment.banner());
        for warning in &judgment.warnings {
            tracing::warn!("{}", warning);
        }

        let names: Vec<&str> = selected.iter().map(|(m, _)| m.descriptor().name).collect();
        let conflicts = detect_conflicts(self.registry, &names);
        conflicts.log();

        // Patching
        machine.transition(BuildPhase::Patching)?;
        if selected.is_empty() {
            return Err(BuildError::NoModulesApplied);
        }

        let tree = BuildTree::create(self.layout.build_tree_dir(&name))?;
        let ctx = PatchContext {
            snapshot,
            build_tree: &tree,
        };

        let mut reports = Vec::with_capacity(selected.len());
        for (module, selection) in selected {
            let module_name = module.descriptor().name.to_string();
            tracing::info!("Applying {}", module.descriptor().display_name);

            match module.apply(&selection.config, &ctx) {
                Ok(report) => {
                    self.metrics.record_patch(&report);
                    machine.emit(BuildEvent::ModuleApplied {
                        module: module_name,
                        warnings: report.warnings.len(),
                    });
                    reports.push(report);
                }
                Err(source) => {
                    self.metrics.record_module_failed();
                    machine.emit(BuildEvent::ModuleFailed {
                        module: module_name.clone(),
                        reason: source.to_string(),
                    });
                    tracing::error!(
                        "{} failed, build tree kept at {}",
                        module_name,
                        tree.root()
                    );
                    return Err(BuildError::ModuleFailed {
                        module: module_name,
                        source,
                    });
                }
            }
        }
        if reports.is_empty() {
            return Err(BuildError::NoModulesApplied);
        }

        // Packaging
        machine.transition(BuildPhase::Packaging)?;
        let pak = self.layout.pak_path(&name);
        create_parent(&pak)?;
        let started = Instant::now();
        self.archive_tool
            .pack(tree.root(), &self.format_version, &pak)?;
        self.metrics.record_pack_time(started.elapsed());
        tracing::info!("Packed {}", pak);

        // Finalizing
        machine.transition(BuildPhase::Finalizing)?;
        let unpacked = self.layout.unpacked_dir(&name);
        create_parent(&unpacked)?;
        tree.copy_to(&unpacked)?;

        let zip_path = self.layout.redistribution_zip(&name);
        let redistribution = match write_redistribution_zip(&pak, &zip_path, &name) {
            Ok(()) => {
                tracing::info!("Created {}", zip_path);
                Some(zip_path)
            }
            Err(e) => {
                tracing::warn!("Skipping redistribution zip: {:#}", e);
                None
            }
        };

        let tree_root = tree.root().to_path_buf();
        if let Err(e) = tree.discard() {
            tracing::warn!("Failed to remove build tree {}: {}", tree_root, e);
        }

        machine.transition(BuildPhase::Done)?;
        Ok(BuildArtifacts {
            name,
            pak,
            unpacked,
            redistribution,
            reports,
            conflicts,
        })
    }
}

fn create_parent(path: &Utf8Path) -> Result<(), BuildError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    fs::create_dir_all(parent).map_err(|source| BuildError::Io {
        path: parent.to_path_buf(),
        source,
    })
}

/// Zip the pak at the path mod managers install it to
fn write_redistribution_zip(pak: &Utf8Path, zip_path: &Utf8Path, name: &str) -> anyhow::Result<()> {
    if let Some(parent) = zip_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent))?;
    }
    let mut source =
        File::open(pak).with_context(|| format!("Failed to open pak: {}", pak))?;
    let file = File::create(zip_path)
        .with_context(|| format!("Failed to create zip: {}", zip_path))?;

    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    zip.start_file(format!("{}/{}.pak", MODS_SUBPATH, name), options)
        .context("Failed to start zip entry")?;
    std::io::copy(&mut source, &mut zip).context("Failed to write pak into zip")?;
    zip.finish().context("Failed to finish zip")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_build_name() {
        assert!(validate_build_name("my_mod-1.2").is_ok());
        assert!(validate_build_name("custom multi mod").is_ok());
        for bad in ["", "  ", "a/b", "a:b", "trailing.", ".hidden", "x?"] {
            assert!(
                matches!(validate_build_name(bad), Err(BuildError::InvalidName { .. })),
                "{:?}",
                bad
            );
        }
        assert!(validate_build_name(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_reserved_device_names_rejected() {
        for reserved in ["CON", "nul", "Aux", "prn", "com1", "LPT9", "con.backup", "NUL .x"] {
            assert!(
                matches!(
                    validate_build_name(reserved),
                    Err(BuildError::InvalidName { reason, .. }) if reason == "name is reserved by Windows"
                ),
                "{:?}",
                reserved
            );
        }
        for allowed in ["console", "com0", "COM10", "lpt", "null_mod", "my_aux"] {
            assert!(validate_build_name(allowed).is_ok(), "{:?}", allowed);
        }
    }

    #[test]
    fn test_default_build_name_is_valid() {
        let name = default_build_name();
        assert!(name.starts_with("custom_multi_mod_"));
        assert!(validate_build_name(&name).is_ok());
    }

    #[test]
    fn test_output_layout() {
        let layout = OutputLayout::from_settings(&AppSettings::default());
        assert_eq!(layout.pak_path("m"), Utf8PathBuf::from("output/paks/m.pak"));
        assert_eq!(layout.unpacked_dir("m"), Utf8PathBuf::from("output/mods/m"));
        assert_eq!(
            layout.redistribution_zip("m"),
            Utf8PathBuf::from("output/vortex/m_Vortex.zip")
        );
        assert_eq!(
            layout.build_tree_dir("m"),
            Utf8PathBuf::from("data/build/temp/m")
        );
    }

    #[test]
    fn test_zip_entry_path() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let pak = root.join("m.pak");
        fs::write(&pak, b"pak bytes").unwrap();
        let zip_path = root.join("vortex/m_Vortex.zip");

        write_redistribution_zip(&pak, &zip_path, "m").unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(
            archive.by_index(0).unwrap().name(),
            "Stalker2/Content/Paks/~mods/m.pak"
        );
    }
}
