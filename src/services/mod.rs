//! Services module - file-system facing logic around the patching core.
//!
//! # Components
//!
//! - [`ExtractionSnapshot`]: one unpack of the base game archive, with per-file
//!   text/binary queries and source lookup
//! - [`VersionDetector`]: multi-method game version and dialect detection
//! - [`ArchiveTool`] / [`RepakTool`]: pack and unpack through the external `repak` tool
//! - [`extract_base_archive`] / [`install_to_game`]: snapshot creation and mod installation
//! - [`detect_conflicts`]: advisory report of files shared by selected modules
//!
//! Nothing in here keeps state between calls; every operation takes its inputs
//! explicitly and re-reads the file system.

pub mod archive;
pub mod conflicts;
pub mod extraction;
pub mod snapshot;
pub mod version_detection;

pub use archive::{ArchiveTool, CollaboratorError, RepakTool};
pub use conflicts::{ConflictReport, detect_conflicts};
pub use extraction::{
    BASE_ARCHIVE_SUBPATH, ExtractionError, ExtractionOutcome, MODS_SUBPATH, extract_base_archive,
    install_to_game,
};
pub use snapshot::{ExtractionSnapshot, FileFormat, GAME_DATA_SUBPATH, SourceFile};
pub use version_detection::{DetectionTables, VersionDetector};
