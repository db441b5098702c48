use camino::{Utf8Path, Utf8PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Failure reported by the external archive tool
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("Failed to start {exe}: {source}")]
    Spawn {
        exe: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The process could not be waited on, or no runtime was available to drive it
    #[error("{operation} failed: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} exited with code {code}")]
    NonZeroExit { operation: &'static str, code: i32 },

    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },
}

/// Pack/unpack of game archives.
///
/// Implemented by [`RepakTool`] for real builds; tests substitute a mock.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveTool {
    /// Decrypt and unpack `archive` into `output_dir`
    fn unpack(
        &self,
        archive: &Utf8Path,
        key: &str,
        output_dir: &Utf8Path,
    ) -> Result<(), CollaboratorError>;

    /// Pack `input_dir` into `output_file` using the given archive format version
    fn pack(
        &self,
        input_dir: &Utf8Path,
        format_version: &str,
        output_file: &Utf8Path,
    ) -> Result<(), CollaboratorError>;
}

/// Runs the `repak` executable as a child process
#[derive(Debug, Clone)]
pub struct RepakTool {
    exe: Utf8PathBuf,
    timeout: Option<Duration>,
}

impl RepakTool {
    pub fn new(exe: impl Into<Utf8PathBuf>) -> Self {
        Self {
            exe: exe.into(),
            timeout: None,
        }
    }

    /// Abort the child after `timeout`; `None` waits indefinitely
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn exe(&self) -> &Utf8Path {
        &self.exe
    }

    /// Arguments for `repak --aes-key <key> unpack <archive> --output <dir>`
    pub fn build_unpack_args(archive: &Utf8Path, key: &str, output_dir: &Utf8Path) -> Vec<String> {
        vec![
            "--aes-key".to_string(),
            key.to_string(),
            "unpack".to_string(),
            archive.to_string(),
            "--output".to_string(),
            output_dir.to_string(),
        ]
    }

    /// Arguments for `repak pack --version <version> <dir> <file>`
    pub fn build_pack_args(
        input_dir: &Utf8Path,
        format_version: &str,
        output_file: &Utf8Path,
    ) -> Vec<String> {
        vec![
            "pack".to_string(),
            "--version".to_string(),
            format_version.to_string(),
            input_dir.to_string(),
            output_file.to_string(),
        ]
    }

    /// Execute repak with `args`, waiting for completion.
    ///
    /// # Returns
    /// `Ok(())` only on a zero exit code
    pub async fn execute(
        &self,
        operation: &'static str,
        args: &[String],
    ) -> Result<(), CollaboratorError> {
        tracing::info!("Running {} {}", self.exe, redact_key(args).join(" "));
        let start = Instant::now();

        let child = Command::new(self.exe.as_std_path())
            .args(args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CollaboratorError::Spawn {
                exe: self.exe.clone(),
                source,
            })?;

        let waited = match self.timeout {
            Some(limit) => timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    tracing::warn!("{} timed out after {:?}", operation, limit);
                    CollaboratorError::Timeout {
                        operation,
                        elapsed: start.elapsed(),
                    }
                })?,
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|source| CollaboratorError::Io { operation, source })?;

        let code = output.status.code().unwrap_or(-1);
        tracing::info!(
            "{} completed in {:.2}s with exit code {}",
            operation,
            start.elapsed().as_secs_f32(),
            code
        );

        if code != 0 {
            return Err(CollaboratorError::NonZeroExit { operation, code });
        }
        Ok(())
    }

    fn execute_blocking(
        &self,
        operation: &'static str,
        args: Vec<String>,
    ) -> Result<(), CollaboratorError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| CollaboratorError::Io { operation, source })?;
        runtime.block_on(self.execute(operation, &args))
    }
}

impl ArchiveTool for RepakTool {
    fn unpack(
        &self,
        archive: &Utf8Path,
        key: &str,
        output_dir: &Utf8Path,
    ) -> Result<(), CollaboratorError> {
        self.execute_blocking("unpack", Self::build_unpack_args(archive, key, output_dir))
    }

    fn pack(
        &self,
        input_dir: &Utf8Path,
        format_version: &str,
        output_file: &Utf8Path,
    ) -> Result<(), CollaboratorError> {
        self.execute_blocking(
            "pack",
            Self::build_pack_args(input_dir, format_version, output_file),
        )
    }
}

/// Copy of `args` with the value after `--aes-key` masked for logging
fn redact_key(args: &[String]) -> Vec<String> {
    let mut redacted = args.to_vec();
    for i in 1..redacted.len() {
        if args[i - 1] == "--aes-key" {
            redacted[i] = "***".to_string();
        }
    }
    redacted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_args() {
        let args = RepakTool::build_unpack_args(
            Utf8Path::new("C:/Game/Stalker2/Content/Paks/pakchunk0-Windows.pak"),
            "0xABCD",
            Utf8Path::new("data/extract/pakchunk0-Windows_01-01-2025_00-00-00"),
        );
        assert_eq!(args[0], "--aes-key");
        assert_eq!(args[1], "0xABCD");
        assert_eq!(args[2], "unpack");
        assert!(args[3].ends_with("pakchunk0-Windows.pak"));
        assert_eq!(args[4], "--output");
    }

    #[test]
    fn test_pack_args() {
        let args = RepakTool::build_pack_args(
            Utf8Path::new("data/build/temp/my_mod"),
            "V11",
            Utf8Path::new("output/paks/my_mod.pak"),
        );
        assert_eq!(
            args,
            vec![
                "pack",
                "--version",
                "V11",
                "data/build/temp/my_mod",
                "output/paks/my_mod.pak"
            ]
        );
    }

    #[test]
    fn test_key_redacted_in_logs() {
        let args = RepakTool::build_unpack_args(
            Utf8Path::new("a.pak"),
            "secret",
            Utf8Path::new("out"),
        );
        let redacted = redact_key(&args);
        assert!(!redacted.contains(&"secret".to_string()));
        assert_eq!(redacted[1], "***");
    }

    #[test]
    fn test_io_failure_names_operation_not_executable() {
        let err = CollaboratorError::Io {
            operation: "pack",
            source: std::io::Error::other("runtime unavailable"),
        };
        assert_eq!(err.to_string(), "pack failed: runtime unavailable");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_missing_executable_reports_spawn_failure() {
        let tool = RepakTool::new("/nonexistent/dir/repak-missing");
        let result = tool.pack(Utf8Path::new("in"), "V11", Utf8Path::new("out.pak"));
        assert!(matches!(result, Err(CollaboratorError::Spawn { .. })));
    }
}
