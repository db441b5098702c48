use crate::models::{AppSettings, CachedState, Preset};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Prefix for environment overrides, e.g. `MODBUILDER_GAME_BASE_PATH`
pub const ENV_PREFIX: &str = "MODBUILDER";

/// Configuration manager for the YAML files the builder keeps between runs.
///
/// Manages:
/// - Settings (`settings.yaml`): game path, working directories, repak location
/// - Cached state (`state.yaml`): last extraction and detection results
/// - Preset catalogs (`presets/<module>.yaml`): optional replacements for built-in presets
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
    state_path: Utf8PathBuf,
    presets_dir: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing configuration files (e.g., "config")
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join("settings.yaml"),
            state_path: config_dir.join("state.yaml"),
            presets_dir: config_dir.join("presets"),
            config_dir,
        })
    }

    /// Load settings from `settings.yaml` layered with `MODBUILDER_*` environment variables.
    ///
    /// A missing file yields defaults (still subject to environment overrides).
    pub fn load_settings(&self) -> Result<AppSettings> {
        self.load_settings_with_env(None)
    }

    /// Same as [`load_settings`](Self::load_settings), with an explicit environment map
    /// standing in for the process environment when given.
    pub fn load_settings_with_env(
        &self,
        env: Option<config::Map<String, String>>,
    ) -> Result<AppSettings> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let layered = config::Config::builder()
            .add_source(
                config::File::from(self.settings_path.as_std_path())
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        let settings: AppSettings = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(settings)
    }

    /// Save settings to `settings.yaml`.
    pub fn save_settings(&self, settings: &AppSettings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Load the cached state, or an empty cache if none exists.
    ///
    /// A corrupt cache is discarded with a warning rather than failing: the live
    /// snapshot is the source of truth anyway.
    pub fn load_cached_state(&self) -> Result<CachedState> {
        if !self.state_path.exists() {
            tracing::debug!("No cached state at {}", self.state_path);
            return Ok(CachedState::default());
        }

        let file_contents = fs::read_to_string(&self.state_path)
            .with_context(|| format!("Failed to read cached state: {}", self.state_path))?;

        match serde_yaml_ng::from_str(&file_contents) {
            Ok(state) => Ok(state),
            Err(e) => {
                tracing::warn!("Ignoring unreadable cached state {}: {}", self.state_path, e);
                Ok(CachedState::default())
            }
        }
    }

    /// Save the cached state to `state.yaml`.
    pub fn save_cached_state(&self, state: &CachedState) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(state).context("Failed to serialize cached state to YAML")?;

        fs::write(&self.state_path, yaml_string)
            .with_context(|| format!("Failed to write cached state: {}", self.state_path))?;

        tracing::debug!("Saved cached state to {}", self.state_path);
        Ok(())
    }

    /// Load the preset catalog for a module, if one exists.
    ///
    /// # Returns
    /// `None` when `presets/<module>.yaml` is absent
    pub fn load_preset_catalog(&self, module_name: &str) -> Result<Option<Vec<Preset>>> {
        let path = self.preset_catalog_path(module_name);
        if !path.exists() {
            return Ok(None);
        }

        let file_contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read preset catalog: {}", path))?;

        let presets: Vec<Preset> = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse preset catalog: {}", path))?;

        tracing::info!("Loaded {} presets from {}", presets.len(), path);
        Ok(Some(presets))
    }

    /// Save a preset catalog for a module.
    pub fn save_preset_catalog(&self, module_name: &str, presets: &[Preset]) -> Result<()> {
        fs::create_dir_all(&self.presets_dir)
            .with_context(|| format!("Failed to create presets directory: {}", self.presets_dir))?;

        let path = self.preset_catalog_path(module_name);
        let yaml_string =
            serde_yaml_ng::to_string(presets).context("Failed to serialize presets to YAML")?;

        fs::write(&path, yaml_string)
            .with_context(|| format!("Failed to write preset catalog: {}", path))?;

        tracing::info!("Saved preset catalog to {}", path);
        Ok(())
    }

    /// Location of the preset catalog for a module
    pub fn preset_catalog_path(&self, module_name: &str) -> Utf8PathBuf {
        self.presets_dir.join(format!("{}.yaml", module_name))
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}

/// Explicit per-process context threaded through components instead of global state
#[derive(Debug, Clone)]
pub struct AppContext {
    pub settings: AppSettings,
    pub config_manager: ConfigManager,
}

impl AppContext {
    /// Load settings through `config_manager` and bundle both
    pub fn load(config_manager: ConfigManager) -> Result<Self> {
        let settings = config_manager.load_settings()?;
        Ok(Self {
            settings,
            config_manager,
        })
    }
}
