//! Integration tests for the build pipeline with a mocked archive tool
//!
//! These tests verify:
//! - Builds with nothing to apply fail without producing a pak
//! - A failing module aborts the build and keeps the build tree
//! - A successful build produces the pak, the unpacked copy and the zip
//! - Packer failures surface as collaborator errors

use camino::{Utf8Path, Utf8PathBuf};
use mockall::mock;
use modbuilder::build::{BuildError, BuildOrchestrator, BuildRequest, ModuleSelection};
use modbuilder::models::{AppSettings, ResolvedConfiguration};
use modbuilder::services::{ArchiveTool, CollaboratorError, ExtractionSnapshot, GAME_DATA_SUBPATH};
use modbuilder::{BuildPhase, BuildStateMachine, ModuleRegistry};
use std::fs;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

mock! {
    pub Repak {}

    impl ArchiveTool for Repak {
        fn unpack(
            &self,
            archive: &Utf8Path,
            key: &str,
            output_dir: &Utf8Path,
        ) -> Result<(), CollaboratorError>;

        fn pack(
            &self,
            input_dir: &Utf8Path,
            format_version: &str,
            output_file: &Utf8Path,
        ) -> Result<(), CollaboratorError>;
    }
}

struct Workspace {
    _temp_dir: TempDir,
    root: Utf8PathBuf,
    settings: AppSettings,
}

impl Workspace {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let settings = AppSettings {
            data_dir: root.join("data"),
            output_dir: root.join("output"),
            ..AppSettings::default()
        };
        Self {
            _temp_dir: temp_dir,
            root,
            settings,
        }
    }

    fn snapshot_with(&self, files: &[(&str, &str)]) -> ExtractionSnapshot {
        let snapshot_root = self.settings.extract_dir().join("pakchunk0-Windows_01-12-2024_10-00-00");
        let game_data = snapshot_root.join(GAME_DATA_SUBPATH);
        fs::create_dir_all(&game_data).unwrap();
        for (name, contents) in files {
            let path = game_data.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, contents).unwrap();
        }
        ExtractionSnapshot::open(snapshot_root)
    }
}

fn day_length(coefficient: f64) -> ModuleSelection {
    ModuleSelection {
        module: "day_length".to_string(),
        config: ResolvedConfiguration::new().with("coefficient", coefficient),
    }
}

#[test]
fn test_zero_modules_fails_without_pak() {
    let workspace = Workspace::new();
    let snapshot = workspace.snapshot_with(&[("CoreVariables.cfg", "RealToGameTimeCoef = 24\n")]);
    let registry = ModuleRegistry::with_defaults();

    let mut repak = MockRepak::new();
    repak.expect_pack().never();
    let orchestrator = BuildOrchestrator::new(&registry, repak, &workspace.settings);

    let mut machine = BuildStateMachine::new();
    let request = BuildRequest {
        name: Some("empty".to_string()),
        selections: vec![],
    };
    let err = orchestrator
        .build_with_state(Some(&snapshot), &request, &mut machine)
        .unwrap_err();

    assert!(matches!(err, BuildError::NoModulesApplied));
    assert_eq!(machine.phase(), BuildPhase::Failed);
    assert!(!orchestrator.layout().pak_path("empty").exists());
}

#[test]
fn test_failing_module_aborts_and_keeps_tree() {
    let workspace = Workspace::new();
    // No CoreVariables.cfg anywhere, so carry weight cannot apply
    let snapshot = workspace.snapshot_with(&[]);
    let registry = ModuleRegistry::with_defaults();

    let mut repak = MockRepak::new();
    repak.expect_pack().never();
    let orchestrator = BuildOrchestrator::new(&registry, repak, &workspace.settings);

    let carry_weight = registry.get("carry_weight").unwrap().list_presets()[1].clone();
    let request = BuildRequest {
        name: Some("broken".to_string()),
        selections: vec![ModuleSelection {
            module: "carry_weight".to_string(),
            config: carry_weight.config,
        }],
    };
    let err = orchestrator.build(Some(&snapshot), &request).unwrap_err();

    assert!(matches!(err, BuildError::ModuleFailed { ref module, .. } if module == "carry_weight"));
    assert!(!orchestrator.layout().pak_path("broken").exists());
    assert!(orchestrator.layout().build_tree_dir("broken").exists());
    assert_eq!(orchestrator.metrics().modules_failed.load(Ordering::Relaxed), 1);
    assert_eq!(orchestrator.metrics().builds_failed.load(Ordering::Relaxed), 1);
}

#[test]
fn test_missing_snapshot_is_prerequisite_failure() {
    let workspace = Workspace::new();
    let registry = ModuleRegistry::with_defaults();
    let orchestrator = BuildOrchestrator::new(&registry, MockRepak::new(), &workspace.settings);

    let request = BuildRequest {
        name: None,
        selections: vec![day_length(12.0)],
    };
    let err = orchestrator.build(None, &request).unwrap_err();

    assert!(matches!(err, BuildError::PrerequisiteMissing(_)));
}

#[test]
fn test_unknown_module_rejected() {
    let workspace = Workspace::new();
    let snapshot = workspace.snapshot_with(&[("CoreVariables.cfg", "RealToGameTimeCoef = 24\n")]);
    let registry = ModuleRegistry::with_defaults();
    let orchestrator = BuildOrchestrator::new(&registry, MockRepak::new(), &workspace.settings);

    let request = BuildRequest {
        name: Some("x".to_string()),
        selections: vec![ModuleSelection {
            module: "night_vision".to_string(),
            config: ResolvedConfiguration::new(),
        }],
    };
    let err = orchestrator.build(Some(&snapshot), &request).unwrap_err();

    assert!(matches!(err, BuildError::UnknownModule(ref name) if name == "night_vision"));
}

#[test]
fn test_out_of_range_configuration_rejected_before_patching() {
    let workspace = Workspace::new();
    let snapshot = workspace.snapshot_with(&[(
        "WeaponData/CharacterWeaponSettingsPrototypes/PlayerWeaponSettingsPrototypes.cfg",
        "Pistol : struct.begin\n   DurabilityDamagePerShot = 0.2\nstruct.end\n",
    )]);
    let registry = ModuleRegistry::with_defaults();

    let mut repak = MockRepak::new();
    repak.expect_pack().never();
    let orchestrator = BuildOrchestrator::new(&registry, repak, &workspace.settings);

    let mut machine = BuildStateMachine::new();
    let request = BuildRequest {
        name: Some("zero_factor".to_string()),
        selections: vec![ModuleSelection {
            module: "weapon_durability".to_string(),
            config: ResolvedConfiguration::new().with("reduction_factor", 0.0),
        }],
    };
    let err = orchestrator
        .build_with_state(Some(&snapshot), &request, &mut machine)
        .unwrap_err();

    assert!(matches!(
        err,
        BuildError::InvalidConfiguration { ref module, .. } if module == "weapon_durability"
    ));
    assert!(!machine.history().contains(&BuildPhase::Patching));
    assert!(!orchestrator.layout().build_tree_dir("zero_factor").exists());
}

#[test]
fn test_successful_build_produces_artifacts() {
    let workspace = Workspace::new();
    let snapshot = workspace.snapshot_with(&[(
        "CoreVariables.cfg",
        "CoreVariables : struct.begin\n   RealToGameTimeCoef = 24\nstruct.end\n",
    )]);
    let registry = ModuleRegistry::with_defaults();

    let mut repak = MockRepak::new();
    repak
        .expect_pack()
        .withf(|input_dir, format_version, _| {
            format_version == "V11"
                && input_dir
                    .join(GAME_DATA_SUBPATH)
                    .join("CoreVariables.cfg")
                    .is_file()
        })
        .times(1)
        .returning(|_, _, output_file| {
            fs::write(output_file, b"packed").unwrap();
            Ok(())
        });
    let orchestrator = BuildOrchestrator::new(&registry, repak, &workspace.settings);

    let mut machine = BuildStateMachine::new();
    let request = BuildRequest {
        name: Some("slow_days".to_string()),
        selections: vec![day_length(6.0)],
    };
    let artifacts = orchestrator
        .build_with_state(Some(&snapshot), &request, &mut machine)
        .unwrap();

    assert_eq!(artifacts.name, "slow_days");
    assert_eq!(artifacts.pak, workspace.root.join("output/paks/slow_days.pak"));
    assert_eq!(fs::read(&artifacts.pak).unwrap(), b"packed");

    let unpacked = artifacts
        .unpacked
        .join(GAME_DATA_SUBPATH)
        .join("CoreVariables.cfg");
    assert!(fs::read_to_string(unpacked).unwrap().contains("RealToGameTimeCoef = 6\n"));

    let zip = artifacts.redistribution.expect("zip should be written");
    assert!(zip.is_file());

    assert!(!orchestrator.layout().build_tree_dir("slow_days").exists());
    assert!(artifacts.conflicts.is_empty());
    assert_eq!(
        machine.history(),
        &[
            BuildPhase::Idle,
            BuildPhase::Validating,
            BuildPhase::Patching,
            BuildPhase::Packaging,
            BuildPhase::Finalizing,
            BuildPhase::Done,
        ]
    );
}

#[test]
fn test_packer_failure_is_collaborator_error() {
    let workspace = Workspace::new();
    let snapshot = workspace.snapshot_with(&[("CoreVariables.cfg", "RealToGameTimeCoef = 24\n")]);
    let registry = ModuleRegistry::with_defaults();

    let mut repak = MockRepak::new();
    repak.expect_pack().times(1).returning(|_, _, _| {
        Err(CollaboratorError::NonZeroExit {
            operation: "pack",
            code: 2,
        })
    });
    let orchestrator = BuildOrchestrator::new(&registry, repak, &workspace.settings);

    let request = BuildRequest {
        name: Some("unlucky".to_string()),
        selections: vec![day_length(12.0)],
    };
    let err = orchestrator.build(Some(&snapshot), &request).unwrap_err();

    assert!(matches!(
        err,
        BuildError::Collaborator(CollaboratorError::NonZeroExit { code: 2, .. })
    ));
    assert!(!orchestrator.layout().unpacked_dir("unlucky").exists());
}
