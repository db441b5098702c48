//! Data models for the mod builder.
//!
//! - [`AppSettings`]: user settings loaded from `settings.yaml` (plus environment overrides)
//! - [`CachedState`]: last extraction and detection results from `state.yaml` (a cache, never authoritative)
//! - [`DialectJudgment`]: output of version detection over an extraction snapshot
//! - [`ModuleDescriptor`], [`Preset`], [`ResolvedConfiguration`]: module identity and numeric settings
//! - [`ValidationFailure`]: structured rejection of custom numeric input

pub mod config;
pub mod judgment;
pub mod module;

pub use config::{AppSettings, CachedState};
pub use judgment::{DialectJudgment, Evidence, UNKNOWN_VERSION};
pub use module::{
    InputKind, InputSpec, ModuleDescriptor, Preset, RawInputs, ResolvedConfiguration,
    TouchedFile, ValidationFailure,
};
