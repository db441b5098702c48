//! S.T.A.L.K.E.R. 2 mod builder
//!
//! Main entry point for the command-line application.
//!
//! # Execution Flow
//!
//! 1. Parse arguments ([`Cli`])
//! 2. Initialize logging → logs/modbuilder.<date>
//! 3. Load `settings.yaml` from the config directory and apply command-line overrides
//! 4. Build the module registry and swap in any preset catalogs
//! 5. Dispatch the subcommand
//!
//! Everything runs on the main thread. The repak adapter drives its child process on
//! its own current-thread runtime, so `main` itself is synchronous.

use anyhow::{Context, Result, bail};
use camino::Utf8Path;
use clap::Parser;
use modbuilder::build::{BuildOrchestrator, BuildRequest};
use modbuilder::cli::{Cli, Command, parse_selection};
use modbuilder::logging::{LogOptions, setup_logging_with_console};
use modbuilder::models::InputKind;
use modbuilder::services::{
    ExtractionSnapshot, RepakTool, VersionDetector, detect_conflicts, extract_base_archive,
    install_to_game,
};
use modbuilder::{APP_NAME, AppContext, ConfigManager, ModuleRegistry, VERSION};
use std::time::Duration;

const LOG_DIR: &str = "logs";

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = setup_logging_with_console(
        Utf8Path::new(LOG_DIR),
        "modbuilder",
        LogOptions {
            debug_mode: cli.debug,
            console_output: true,
            json: cli.log_json,
        },
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let mut ctx = AppContext::load(config_manager)?;
    if let Some(key) = cli.aes_key.clone() {
        ctx.settings.aes_key = Some(key);
    }
    if let Some(game_path) = cli.game_path.clone() {
        ctx.settings.game_base_path = Some(game_path);
    }
    ctx.settings.debug_mode |= cli.debug;

    let mut registry = ModuleRegistry::with_defaults();
    registry
        .apply_catalogs(&ctx.config_manager)
        .context("Failed to load preset catalogs")?;

    let result = run(cli.command, &ctx, &registry);
    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

fn run(command: Command, ctx: &AppContext, registry: &ModuleRegistry) -> Result<()> {
    match command {
        Command::Detect { path } => {
            let root = match path {
                Some(path) => path,
                None => current_snapshot(ctx)?
                    .context("No extraction snapshot found; run `modbuilder extract` first")?
                    .root()
                    .to_path_buf(),
            };
            let mut detector = VersionDetector::new();
            if let Some(game_dir) = ctx.settings.game_base_path() {
                detector = detector.with_game_install(game_dir);
            }
            let judgment = detector.detect(&root);
            println!("{}", judgment.banner());

            let mut state = ctx.config_manager.load_cached_state()?;
            state.record_detection(&root, &judgment);
            ctx.config_manager.save_cached_state(&state)?;
        }

        Command::Extract => {
            let outcome = extract_base_archive(&ctx.settings, &repak(ctx), &ctx.config_manager)?;
            println!("Extracted to {}", outcome.snapshot_dir);
            println!("{}", outcome.judgment.banner());
        }

        Command::Modules => {
            for module in registry.iter() {
                let descriptor = module.descriptor();
                println!("{} ({})", descriptor.name, descriptor.display_name);
                for (index, preset) in module.list_presets().iter().enumerate() {
                    println!("  preset {}: {}", index + 1, preset.label);
                }
                for input in &descriptor.inputs {
                    let kind = match input.kind {
                        InputKind::Integer => "integer",
                        InputKind::Decimal => "decimal",
                    };
                    println!("  input {}: {} [{}]", input.name, input.prompt(), kind);
                }
            }
        }

        Command::Conflicts { modules } => {
            let mut names = Vec::with_capacity(modules.len());
            for key in &modules {
                let module = registry
                    .get(key)
                    .with_context(|| format!("Unknown module: {}", key))?;
                names.push(module.descriptor().name);
            }

            let report = detect_conflicts(registry, &names);
            if report.is_empty() {
                println!("No conflicts");
            }
            for (file, contributors) in report.iter() {
                println!("{}: {}", file, contributors.join(", "));
            }
        }

        Command::Build {
            name,
            install,
            overwrite,
            selections,
        } => {
            let selections = selections
                .iter()
                .map(|raw| parse_selection(raw, registry))
                .collect::<Result<Vec<_>>>()?;
            let request = BuildRequest { name, selections };

            let snapshot = current_snapshot(ctx)?;
            let orchestrator = BuildOrchestrator::new(registry, repak(ctx), &ctx.settings);
            let artifacts = orchestrator.build(snapshot.as_ref(), &request)?;

            for report in &artifacts.reports {
                for warning in &report.warnings {
                    println!("warning [{}]: {}", report.module, warning);
                }
            }
            println!("Pak: {}", artifacts.pak);
            println!("Unpacked: {}", artifacts.unpacked);
            if let Some(zip) = &artifacts.redistribution {
                println!("Zip: {}", zip);
            }

            if install {
                let Some(game_dir) = ctx.settings.game_base_path() else {
                    bail!("Cannot install: game install path is not configured");
                };
                let installed = install_to_game(&artifacts.pak, game_dir, overwrite)?;
                println!("Installed: {}", installed);
            }
        }

        Command::Status => {
            let settings = &ctx.settings;
            println!("Config directory: {}", ctx.config_manager.config_dir());
            match settings.game_base_path() {
                Some(path) => println!("Game install: {}", path),
                None => println!("Game install: not configured"),
            }
            println!("Repak: {}", settings.repak_path);
            println!(
                "AES key: {}",
                if settings.aes_key.is_some() { "configured" } else { "not configured" }
            );
            match current_snapshot(ctx)? {
                Some(snapshot) => println!("Snapshot: {}", snapshot.root()),
                None => println!("Snapshot: none"),
            }

            let state = ctx.config_manager.load_cached_state()?;
            if let Some(judgment) = state.judgment {
                let at = state
                    .detected_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown time".to_string());
                println!(
                    "Last detection: {} ({}%) at {}",
                    judgment.version, judgment.confidence, at
                );
            }
        }
    }

    Ok(())
}

fn current_snapshot(ctx: &AppContext) -> Result<Option<ExtractionSnapshot>> {
    let state = ctx.config_manager.load_cached_state()?;
    ExtractionSnapshot::discover(
        &ctx.settings.extract_dir(),
        ctx.settings.pinned_extraction.as_deref(),
        state.last_extraction.as_deref(),
    )
}

fn repak(ctx: &AppContext) -> RepakTool {
    let timeout = match ctx.settings.archive_timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    RepakTool::new(ctx.settings.repak_path.clone()).with_timeout(timeout)
}
