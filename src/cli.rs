//! Command-line surface: argument definitions and module-selection parsing.

use crate::build::ModuleSelection;
use crate::models::RawInputs;
use crate::patching::ModuleRegistry;
use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Build a single S.T.A.L.K.E.R. 2 mod pak from configurable feature modules
#[derive(Parser, Debug)]
#[command(
    name = "modbuilder",
    version,
    about = "Build a single S.T.A.L.K.E.R. 2 mod pak from configurable feature modules",
    long_about = "modbuilder extracts the game's base archive, detects which configuration \
                  dialect it uses, and merges the selected feature modules into one pak.\n\n\
                  Module selections:\n  \
                  day_length                       first preset\n  \
                  day_length:preset=3              third preset\n  \
                  carry_weight:preset=Vanilla      preset by label\n  \
                  carry_weight:max_weight=450      custom inputs"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(
        long,
        global = true,
        value_name = "DIR",
        default_value = "config",
        help = "Directory holding settings.yaml, state.yaml and presets/"
    )]
    pub config_dir: Utf8PathBuf,

    #[arg(long, global = true, help = "Enable debug logging")]
    pub debug: bool,

    #[arg(long, global = true, help = "Write the log file as JSON lines")]
    pub log_json: bool,

    #[arg(
        long,
        global = true,
        value_name = "KEY",
        env = "MODBUILDER_AES_KEY",
        hide_env_values = true,
        help = "AES key of the base game archive"
    )]
    pub aes_key: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "DIR",
        help = "Game installation directory (overrides settings)"
    )]
    pub game_path: Option<Utf8PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Detect the game version of an extraction snapshot
    Detect {
        #[arg(value_name = "PATH", help = "Extraction root (defaults to the current snapshot)")]
        path: Option<Utf8PathBuf>,
    },

    /// Unpack the base game archive into a new snapshot
    Extract,

    /// List modules with their presets and custom inputs
    Modules,

    /// Report files that more than one of the given modules touch
    Conflicts {
        #[arg(required = true, value_name = "MODULE")]
        modules: Vec<String>,
    },

    /// Build a pak from module selections
    Build {
        #[arg(short, long, help = "Build name (defaults to a timestamped name)")]
        name: Option<String>,

        #[arg(long, help = "Copy the pak into the game's ~mods folder")]
        install: bool,

        #[arg(long, requires = "install", help = "Replace an installed pak of the same name")]
        overwrite: bool,

        #[arg(required = true, value_name = "SELECTION")]
        selections: Vec<String>,
    },

    /// Show settings, the current snapshot and the cached detection result
    Status,
}

/// Parse one `name[:preset=<index|label>|:key=value,...]` selection.
///
/// A bare module name picks the module's first preset.
pub fn parse_selection(raw: &str, registry: &ModuleRegistry) -> Result<ModuleSelection> {
    let (module_key, options) = match raw.split_once(':') {
        Some((module_key, options)) => (module_key, Some(options.trim())),
        None => (raw, None),
    };

    let module = registry
        .get(module_key)
        .with_context(|| format!("Unknown module: {}", module_key.trim()))?;
    let descriptor = module.descriptor();

    let config = match options {
        None | Some("") => {
            let Some(preset) = module.list_presets().first() else {
                bail!(
                    "{} has no presets; give custom inputs ({})",
                    descriptor.name,
                    input_names(registry, descriptor.name)
                );
            };
            tracing::debug!("Using default preset {:?} for {}", preset.label, descriptor.name);
            preset.config.clone()
        }
        Some(options) => match options.strip_prefix("preset=") {
            Some(preset_key) => descriptor
                .find_preset(preset_key)
                .with_context(|| format!("{} has no preset {:?}", descriptor.name, preset_key))?
                .config
                .clone(),
            None => {
                let raw_inputs = parse_inputs(options)?;
                module
                    .resolve_custom_config(&raw_inputs)
                    .with_context(|| format!("Invalid inputs for {}", descriptor.name))?
            }
        },
    };

    Ok(ModuleSelection {
        module: descriptor.name.to_string(),
        config,
    })
}

fn parse_inputs(options: &str) -> Result<RawInputs> {
    let mut inputs = RawInputs::new();
    for pair in options.split(',').filter(|p| !p.trim().is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Expected key=value, got {:?}", pair);
        };
        inputs.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(inputs)
}

fn input_names(registry: &ModuleRegistry, module: &str) -> String {
    registry
        .get(module)
        .map(|m| {
            m.descriptor()
                .inputs
                .iter()
                .map(|input| input.name)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ValidationFailure;

    #[test]
    fn test_bare_name_uses_first_preset() {
        let registry = ModuleRegistry::with_defaults();
        let selection = parse_selection("day_length", &registry).unwrap();
        let module = registry.get("day_length").unwrap();

        assert_eq!(selection.module, "day_length");
        assert_eq!(selection.config, module.list_presets()[0].config);
    }

    #[test]
    fn test_preset_by_index_and_label() {
        let registry = ModuleRegistry::with_defaults();
        let presets = registry.get("carry_weight").unwrap().list_presets();

        let by_index = parse_selection("carry_weight:preset=2", &registry).unwrap();
        assert_eq!(by_index.config, presets[1].config);

        let label = presets[0].label.to_lowercase();
        let by_label =
            parse_selection(&format!("Carry_Weight:preset={}", label), &registry).unwrap();
        assert_eq!(by_label.module, "carry_weight");
        assert_eq!(by_label.config, presets[0].config);

        assert!(parse_selection("carry_weight:preset=99", &registry).is_err());
    }

    #[test]
    fn test_custom_inputs_are_validated() {
        let registry = ModuleRegistry::with_defaults();
        let input = registry.get("day_length").unwrap().descriptor().inputs[0].clone();

        let ok = parse_selection(&format!("day_length:{}={}", input.name, input.max), &registry);
        assert!(ok.is_ok());

        let err = parse_selection(
            &format!("day_length:{}={}", input.name, input.max + 1.0),
            &registry,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ValidationFailure>(),
            Some(ValidationFailure::AboveMaximum { .. })
        ));
    }

    #[test]
    fn test_module_without_presets_needs_inputs() {
        let registry = ModuleRegistry::with_defaults();
        let err = parse_selection("stamina", &registry).unwrap_err();
        assert!(err.to_string().contains("no presets"));
    }

    #[test]
    fn test_unknown_module_and_malformed_inputs() {
        let registry = ModuleRegistry::with_defaults();
        assert!(parse_selection("night_vision", &registry).is_err());
        assert!(parse_selection("day_length:fast", &registry).is_err());
    }

    #[test]
    fn test_cli_parses_build_command() {
        let cli = Cli::try_parse_from([
            "modbuilder",
            "build",
            "--name",
            "my_mod",
            "day_length",
            "carry_weight:preset=2",
        ])
        .unwrap();

        match cli.command {
            Command::Build {
                name,
                install,
                selections,
                ..
            } => {
                assert_eq!(name.as_deref(), Some("my_mod"));
                assert!(!install);
                assert_eq!(selections.len(), 2);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.config_dir, Utf8PathBuf::from("config"));
    }
}
