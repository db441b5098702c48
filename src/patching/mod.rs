//! Module patching: turning a resolved configuration into edited config files.
//!
//! Each feature implements [`ConfigPatcher`]. A patcher reads its files from the
//! [`BuildTree`] when an earlier module in the same build already wrote them, and from
//! the [`ExtractionSnapshot`] otherwise, so several modules can edit one file.
//!
//! - Text sources are edited in place through [`FieldLocator`]s; only the targeted
//!   numeric literals change.
//! - Binary-only sources are replaced by a text file synthesized from the module's
//!   template, which carries only that module's fields.

pub mod locator;
pub mod modules;
pub mod registry;

pub use locator::{ConfigDocument, FieldLocator, LiteralStyle, Scope, format_decimal, scan_records};
pub use registry::ModuleRegistry;

use crate::models::{ModuleDescriptor, Preset, RawInputs, ResolvedConfiguration, ValidationFailure};
use crate::services::snapshot::{ExtractionSnapshot, GAME_DATA_SUBPATH};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fs;
use thiserror::Error;
use walkdir::WalkDir;

/// Fatal failure of one module's `apply`
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("No usable source for {file} in the extraction or build tree")]
    SourceFileMissing { file: String },

    #[error("Configuration is missing required field {field}")]
    IncompleteConfiguration { field: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PatchError {
    fn io(path: &Utf8Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Non-fatal problem found while patching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchWarning {
    /// A field had no occurrence in scope; the file is otherwise written as usual
    FieldPatternNotFound { file: String, field: String },
    /// A positional list did not line up with the values being written
    PositionalListMismatch { file: String, field: String, detail: String },
    /// The source was not valid UTF-8 and was decoded lossily
    LossyDecode { file: String },
}

impl std::fmt::Display for PatchWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FieldPatternNotFound { file, field } => {
                write!(f, "{}: field {} not found", file, field)
            }
            Self::PositionalListMismatch {
                file,
                field,
                detail,
            } => write!(f, "{}: {} list mismatch ({})", file, field, detail),
            Self::LossyDecode { file } => write!(f, "{}: invalid UTF-8 replaced", file),
        }
    }
}

/// How a file ended up in the build tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    /// Text source edited in place
    Merged,
    /// Binary-only source replaced from a template
    Synthesized,
    /// Written from scratch regardless of sources
    Generated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub logical_path: String,
    pub action: FileAction,
}

/// What one `apply` did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    pub module: String,
    pub files: Vec<FileOutcome>,
    pub warnings: Vec<PatchWarning>,
    pub fields_patched: usize,
}

impl PatchReport {
    pub fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
            ..Self::default()
        }
    }

    pub fn warn(&mut self, warning: PatchWarning) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn fields_missing(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, PatchWarning::FieldPatternNotFound { .. }))
            .count()
    }

    pub fn count(&self, action: FileAction) -> usize {
        self.files.iter().filter(|f| f.action == action).count()
    }

    /// Set a field, warning when it is not found
    pub fn set_field(
        &mut self,
        doc: &mut ConfigDocument,
        file: &str,
        locator: &FieldLocator,
        value: f64,
    ) {
        let replaced = doc.set_field(locator, value);
        self.record(file, locator, replaced);
    }

    /// Map a field through `f`, warning when it is not found
    pub fn map_field(
        &mut self,
        doc: &mut ConfigDocument,
        file: &str,
        locator: &FieldLocator,
        f: impl Fn(f64) -> f64,
    ) {
        let replaced = doc.map_field(locator, f);
        self.record(file, locator, replaced);
    }

    /// Positional replacement with mismatches reported as warnings
    pub fn set_positional(
        &mut self,
        doc: &mut ConfigDocument,
        file: &str,
        locator: &FieldLocator,
        values: &[f64],
    ) {
        let mismatch = |detail: String| PatchWarning::PositionalListMismatch {
            file: file.to_string(),
            field: locator.field().to_string(),
            detail,
        };

        match doc.set_positional(locator, values) {
            Ok(outcome) => {
                self.fields_patched += outcome.replaced;
                if outcome.has_extra() {
                    self.warn(mismatch(format!(
                        "{} found, only the first {} replaced",
                        outcome.found, outcome.replaced
                    )));
                }
                if outcome.out_of_order {
                    self.warn(mismatch("original values not in descending order".to_string()));
                }
            }
            Err(e) => self.warn(mismatch(format!("{}, left unchanged", e))),
        }
    }

    fn record(&mut self, file: &str, locator: &FieldLocator, replaced: usize) {
        if replaced == 0 {
            self.warn(PatchWarning::FieldPatternNotFound {
                file: file.to_string(),
                field: locator.field().to_string(),
            });
        } else {
            self.fields_patched += replaced;
        }
    }
}

/// The per-build scratch directory mirroring the game's content layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTree {
    root: Utf8PathBuf,
}

impl BuildTree {
    /// Create an empty tree at `root`, replacing anything left from a previous build
    pub fn create(root: impl Into<Utf8PathBuf>) -> Result<Self, PatchError> {
        let root = root.into();
        if root.exists() {
            fs::remove_dir_all(&root).map_err(PatchError::io(&root))?;
        }
        let tree = Self { root };
        let game_data = tree.game_data_dir();
        fs::create_dir_all(&game_data).map_err(PatchError::io(&game_data))?;
        Ok(tree)
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn game_data_dir(&self) -> Utf8PathBuf {
        self.root.join(GAME_DATA_SUBPATH)
    }

    pub fn path_of(&self, logical_path: &str) -> Utf8PathBuf {
        self.game_data_dir().join(logical_path)
    }

    /// Contents previously written for `logical_path` in this build
    pub fn read_existing(&self, logical_path: &str) -> Result<Option<Vec<u8>>, PatchError> {
        let path = self.path_of(logical_path);
        if !path.is_file() {
            return Ok(None);
        }
        fs::read(&path).map(Some).map_err(PatchError::io(&path))
    }

    pub fn write(&self, logical_path: &str, contents: &str) -> Result<Utf8PathBuf, PatchError> {
        let path = self.path_of(logical_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(PatchError::io(parent))?;
        }
        fs::write(&path, contents).map_err(PatchError::io(&path))?;
        Ok(path)
    }

    /// Logical paths of every file written so far
    pub fn files(&self) -> Vec<Utf8PathBuf> {
        let game_data = self.game_data_dir();
        let mut files: Vec<Utf8PathBuf> = WalkDir::new(&game_data)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| Utf8PathBuf::from_path_buf(e.into_path()).ok())
            .filter_map(|p| p.strip_prefix(&game_data).ok().map(Utf8Path::to_path_buf))
            .collect();
        files.sort();
        files
    }

    /// Recursively copy the tree to `destination`, replacing it if present
    pub fn copy_to(&self, destination: &Utf8Path) -> Result<(), PatchError> {
        if destination.exists() {
            fs::remove_dir_all(destination).map_err(PatchError::io(destination))?;
        }
        for entry in WalkDir::new(&self.root).into_iter() {
            let entry = entry.map_err(|e| PatchError::Io {
                path: self.root.clone(),
                source: e.into(),
            })?;
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let Some(relative) = Utf8Path::from_path(relative) else {
                continue;
            };
            let target = destination.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).map_err(PatchError::io(&target))?;
            } else {
                fs::copy(entry.path(), &target).map_err(PatchError::io(&target))?;
            }
        }
        Ok(())
    }

    pub fn discard(self) -> Result<(), PatchError> {
        fs::remove_dir_all(&self.root).map_err(PatchError::io(&self.root))
    }
}

/// Everything an `apply` may read or write
#[derive(Debug, Clone, Copy)]
pub struct PatchContext<'a> {
    pub snapshot: &'a ExtractionSnapshot,
    pub build_tree: &'a BuildTree,
}

/// A file source after resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Text(String),
    Binary(Utf8PathBuf),
}

impl PatchContext<'_> {
    /// Resolve `logical_path`: build tree first, then the snapshot (text before binary)
    pub fn resolve_source(
        &self,
        logical_path: &str,
        report: &mut PatchReport,
    ) -> Result<Option<Source>, PatchError> {
        if let Some(bytes) = self.build_tree.read_existing(logical_path)? {
            tracing::debug!("Using {} from the build tree", logical_path);
            return Ok(Some(Source::Text(decode(bytes, logical_path, report))));
        }

        let Some(source) = self.snapshot.locate(logical_path) else {
            return Ok(None);
        };
        if source.binary {
            return Ok(Some(Source::Binary(source.path)));
        }

        let bytes = fs::read(&source.path).map_err(PatchError::io(&source.path))?;
        Ok(Some(Source::Text(decode(bytes, logical_path, report))))
    }

    /// Edit a text source with `edit`, or synthesize from `template` when only a binary
    /// source exists (or none at all). Writes the result to the build tree.
    pub fn patch_file(
        &self,
        report: &mut PatchReport,
        logical_path: &str,
        template: Option<&dyn Fn() -> String>,
        edit: impl FnOnce(&mut ConfigDocument, &mut PatchReport),
    ) -> Result<(), PatchError> {
        let source = self.resolve_source(logical_path, report)?;

        let (contents, action) = match (source, template) {
            (Some(Source::Text(text)), _) => {
                let mut doc = ConfigDocument::new(text);
                edit(&mut doc, report);
                (doc.into_string(), FileAction::Merged)
            }
            (Some(Source::Binary(path)), Some(template)) => {
                tracing::warn!(
                    "{} is binary, creating text config from template (other fields are not carried over)",
                    path
                );
                (template(), FileAction::Synthesized)
            }
            (None, Some(template)) => {
                tracing::warn!("{} not found, creating text config from template", logical_path);
                (template(), FileAction::Synthesized)
            }
            (_, None) => {
                return Err(PatchError::SourceFileMissing {
                    file: logical_path.to_string(),
                });
            }
        };

        self.generate_file(report, logical_path, &contents, action)
    }

    /// Write a file to the build tree and record it
    pub fn generate_file(
        &self,
        report: &mut PatchReport,
        logical_path: &str,
        contents: &str,
        action: FileAction,
    ) -> Result<(), PatchError> {
        let path = self.build_tree.write(logical_path, contents)?;
        tracing::info!("{:?} {}", action, path);
        report.files.push(FileOutcome {
            logical_path: logical_path.to_string(),
            action,
        });
        Ok(())
    }
}

fn decode(bytes: Vec<u8>, logical_path: &str, report: &mut PatchReport) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            report.warn(PatchWarning::LossyDecode {
                file: logical_path.to_string(),
            });
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    }
}

/// Fetch a required field from a resolved configuration
pub fn require(config: &ResolvedConfiguration, field: &str) -> Result<f64, PatchError> {
    config
        .get(field)
        .ok_or_else(|| PatchError::IncompleteConfiguration {
            field: field.to_string(),
        })
}

/// One configurable feature.
///
/// Implementations are stateless across builds; everything they need arrives through
/// the configuration and the [`PatchContext`].
pub trait ConfigPatcher {
    fn descriptor(&self) -> &ModuleDescriptor;

    /// Used to swap in presets from a catalog file
    fn descriptor_mut(&mut self) -> &mut ModuleDescriptor;

    fn list_presets(&self) -> &[Preset] {
        &self.descriptor().presets
    }

    /// Pure derivation of the full configuration from validated inputs
    fn derive(&self, inputs: &IndexMap<String, f64>) -> ResolvedConfiguration;

    /// Validate raw inputs and derive the configuration from them
    fn resolve_custom_config(
        &self,
        raw: &RawInputs,
    ) -> Result<ResolvedConfiguration, ValidationFailure> {
        let validated = self.descriptor().validate_inputs(raw)?;
        Ok(self.derive(&validated))
    }

    /// Check a configuration that did not come from [`resolve_custom_config`], such as
    /// a catalog preset.
    ///
    /// Every field the module derives must be present and finite, no other field is
    /// allowed, and fields named after an input must lie within its bounds.
    ///
    /// [`resolve_custom_config`]: ConfigPatcher::resolve_custom_config
    fn validate_config(&self, config: &ResolvedConfiguration) -> Result<(), ValidationFailure> {
        let descriptor = self.descriptor();
        let minimums: IndexMap<String, f64> = descriptor
            .inputs
            .iter()
            .map(|input| (input.name.to_string(), input.min))
            .collect();
        let controlled = self.derive(&minimums);

        for (field, value) in config.fields() {
            if controlled.get(field).is_none() {
                return Err(ValidationFailure::UnknownInput {
                    field: field.to_string(),
                });
            }
            match descriptor.inputs.iter().find(|input| input.name == field) {
                Some(input) => {
                    input.check_bounds(value)?;
                }
                None if !value.is_finite() => {
                    return Err(ValidationFailure::NotNumeric {
                        field: field.to_string(),
                        value: value.to_string(),
                    });
                }
                None => {}
            }
        }

        if let Some((missing, _)) = controlled
            .fields()
            .find(|(field, _)| config.get(field).is_none())
        {
            return Err(ValidationFailure::Missing {
                field: missing.to_string(),
            });
        }
        Ok(())
    }

    fn apply(
        &self,
        config: &ResolvedConfiguration,
        ctx: &PatchContext<'_>,
    ) -> Result<PatchReport, PatchError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn utf8(temp_dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_build_tree_create_replaces_previous() {
        let temp_dir = TempDir::new().unwrap();
        let root = utf8(&temp_dir).join("build");

        let tree = BuildTree::create(&root).unwrap();
        tree.write("CoreVariables.cfg", "x").unwrap();
        assert_eq!(tree.files(), vec![Utf8PathBuf::from("CoreVariables.cfg")]);

        let tree = BuildTree::create(&root).unwrap();
        assert!(tree.files().is_empty());
    }

    #[test]
    fn test_resolve_prefers_build_tree() {
        let temp_dir = TempDir::new().unwrap();
        let root = utf8(&temp_dir);
        let game_data = root.join("snapshot").join(GAME_DATA_SUBPATH);
        fs::create_dir_all(&game_data).unwrap();
        fs::write(game_data.join("CoreVariables.cfg"), "from snapshot").unwrap();

        let snapshot = ExtractionSnapshot::open(root.join("snapshot"));
        let tree = BuildTree::create(root.join("build")).unwrap();
        let ctx = PatchContext {
            snapshot: &snapshot,
            build_tree: &tree,
        };
        let mut report = PatchReport::new("test");

        assert_eq!(
            ctx.resolve_source("CoreVariables.cfg", &mut report).unwrap(),
            Some(Source::Text("from snapshot".to_string()))
        );

        tree.write("CoreVariables.cfg", "from build").unwrap();
        assert_eq!(
            ctx.resolve_source("CoreVariables.cfg", &mut report).unwrap(),
            Some(Source::Text("from build".to_string()))
        );
    }

    #[test]
    fn test_lossy_decode_warns() {
        let mut report = PatchReport::new("test");
        let text = decode(vec![b'a', 0xff, b'b'], "X.cfg", &mut report);
        assert_eq!(text, "a\u{fffd}b");
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_missing_field_is_warning() {
        let mut report = PatchReport::new("test");
        let mut doc = ConfigDocument::new("A = 1\n");
        report.set_field(&mut doc, "X.cfg", &FieldLocator::document("B"), 2.0);
        report.set_field(&mut doc, "X.cfg", &FieldLocator::document("A"), 2.0);

        assert_eq!(report.fields_missing(), 1);
        assert_eq!(report.fields_patched, 1);
        assert_eq!(doc.as_str(), "A = 2\n");
    }
}
