// S.T.A.L.K.E.R. 2 mod builder
//
// This is the library crate containing version detection, the patching engine and the
// build pipeline. The binary crate (main.rs) provides the command-line entry point.

pub mod build;
pub mod cli;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod patching;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use build::{BuildArtifacts, BuildError, BuildOrchestrator, BuildRequest, ModuleSelection};
pub use config::{AppContext, ConfigManager};
pub use models::{AppSettings, CachedState, DialectJudgment, ResolvedConfiguration};
pub use patching::{ConfigPatcher, ModuleRegistry};
pub use state::{BuildEvent, BuildPhase, BuildStateMachine};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
