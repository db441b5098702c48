use crate::models::{InputSpec, ModuleDescriptor, Preset, ResolvedConfiguration, TouchedFile};
use crate::patching::{
    ConfigPatcher, FieldLocator, LiteralStyle, PatchContext, PatchError, PatchReport, require,
};
use indexmap::IndexMap;

const CORE_VARIABLES: &str = "CoreVariables.cfg";
const EFFECT_PARAMS: &str = "ObjEffectMaxParamsPrototypes.cfg";
const WEIGHT_PARAMS: &str = "ObjWeightParamsPrototypes.cfg";

const VANILLA_WEIGHT: u32 = 80;
const PRESET_WEIGHTS: &[u32] = &[VANILLA_WEIGHT, 120, 200, 300, 500, 1000];
const EFFECT_MAX: f64 = 99999.0;

pub const MAX_INVENTORY_MASS: &str = "max_inventory_mass";
pub const INVENTORY_PENALTY_LESS_WEIGHT: &str = "inventory_penalty_less_weight";
pub const THRESHOLD_NO_EFFECT: &str = "threshold_no_effect";
pub const THRESHOLD_VELOCITY_CHANGE_3: &str = "threshold_velocity_change_3";
pub const THRESHOLD_VELOCITY_CHANGE_2: &str = "threshold_velocity_change_2";
pub const THRESHOLD_VELOCITY_CHANGE_1: &str = "threshold_velocity_change_1";
pub const CORE_INVENTORY_PENALTY_LESS_WEIGHT: &str = "core_inventory_penalty_less_weight";
pub const MEDIUM_EFFECT_START_UI: &str = "medium_effect_start_ui";
pub const CRITICAL_EFFECT_START_UI: &str = "critical_effect_start_ui";
pub const PENALTY_LESS_WEIGHT_MAX: &str = "penalty_less_weight_max";
pub const ADDITIONAL_INVENTORY_WEIGHT_MAX: &str = "additional_inventory_weight_max";

/// Thresholds in the order they appear in the weight parameters file
const THRESHOLDS: [&str; 4] = [
    THRESHOLD_NO_EFFECT,
    THRESHOLD_VELOCITY_CHANGE_3,
    THRESHOLD_VELOCITY_CHANGE_2,
    THRESHOLD_VELOCITY_CHANGE_1,
];

/// Raises the player's maximum carry weight and moves the overweight thresholds with it.
///
/// The two prototype files are synthesized from templates when only their `.bin` form
/// exists. `CoreVariables.cfg` has no template: without a text copy the module fails
/// with [`PatchError::SourceFileMissing`] instead of producing a mod whose UI
/// thresholds disagree with the new weight limit.
pub struct CarryWeightModule {
    descriptor: ModuleDescriptor,
}

impl CarryWeightModule {
    pub fn new() -> Self {
        let presets = PRESET_WEIGHTS
            .iter()
            .map(|&weight| {
                let label = if weight == VANILLA_WEIGHT {
                    format!("{} kg (Vanilla)", weight)
                } else {
                    format!("{} kg", weight)
                };
                Preset::new(label, derive_for_weight(weight as f64))
            })
            .collect();

        Self {
            descriptor: ModuleDescriptor {
                name: "carry_weight",
                display_name: "Carry Weight Modifier",
                touched_files: vec![
                    TouchedFile {
                        logical_path: CORE_VARIABLES,
                        fields: vec![
                            "InventoryPenaltyLessWeight",
                            "MediumEffectStartUI",
                            "CriticalEffectStartUI",
                        ],
                    },
                    TouchedFile {
                        logical_path: EFFECT_PARAMS,
                        fields: vec!["MaxValue"],
                    },
                    TouchedFile {
                        logical_path: WEIGHT_PARAMS,
                        fields: vec!["MaxInventoryMass", "InventoryPenaltyLessWeight", "Threshold"],
                    },
                ],
                presets,
                inputs: vec![InputSpec::integer(
                    "max_weight",
                    "Max carry weight (kg)",
                    81.0,
                    10000.0,
                )],
            },
        }
    }
}

impl Default for CarryWeightModule {
    fn default() -> Self {
        Self::new()
    }
}

/// Full configuration for a maximum carry weight
pub fn derive_for_weight(max_weight: f64) -> ResolvedConfiguration {
    let penalty = (max_weight * 0.88 / 5.0).floor() * 5.0;
    let critical = (max_weight * 0.96 / 5.0).round_ties_even() * 5.0;
    let velocity_2 = ((penalty + critical) / 2.0).round_ties_even();
    let object_penalty = ((penalty - 0.01) * 100.0).round() / 100.0;

    ResolvedConfiguration::new()
        .with(MAX_INVENTORY_MASS, max_weight)
        .with(INVENTORY_PENALTY_LESS_WEIGHT, object_penalty)
        .with(THRESHOLD_NO_EFFECT, max_weight)
        .with(THRESHOLD_VELOCITY_CHANGE_3, critical)
        .with(THRESHOLD_VELOCITY_CHANGE_2, velocity_2)
        .with(THRESHOLD_VELOCITY_CHANGE_1, penalty)
        .with(CORE_INVENTORY_PENALTY_LESS_WEIGHT, penalty)
        .with(MEDIUM_EFFECT_START_UI, penalty)
        .with(CRITICAL_EFFECT_START_UI, critical)
        .with(PENALTY_LESS_WEIGHT_MAX, EFFECT_MAX)
        .with(ADDITIONAL_INVENTORY_WEIGHT_MAX, EFFECT_MAX)
}

const PLAIN: LiteralStyle = LiteralStyle {
    fraction_digits: None,
    float_marker: false,
};
const FLOAT_POINT: LiteralStyle = LiteralStyle {
    fraction_digits: Some(0),
    float_marker: true,
};

fn effect_params_template(penalty_max: f64, additional_max: f64) -> String {
    format!(
        "[0] : struct.begin
   SID = Empty
struct.end

DefaultEffectMaxParamsSID : struct.begin {{refkey=[0]}}
   SID = DefaultEffectMaxParamsSID
   MaxEffectValues : struct.begin
      [0] : struct.begin
         EffectSID = EEffectType::ProtectionShock
         MaxValue = 90.f
      struct.end
      [1] : struct.begin
         EffectSID = EEffectType::PenaltyLessWeight
         MaxValue = {penalty}
      struct.end
      [2] : struct.begin
         EffectSID = EEffectType::RegenStamina
         MaxValue = 30.f
      struct.end
      [3] : struct.begin
         EffectSID = EEffectType::ProtectionStrike
         MaxValue = 4.5f
      struct.end
      [4] : struct.begin
         EffectSID = EEffectType::DegenBleeding
         MaxValue = 5
      struct.end
      [5] : struct.begin
         EffectSID = EEffectType::ProtectionBurn
         MaxValue = 90.f
      struct.end
      [6] : struct.begin
         EffectSID = EEffectType::ProtectionChemical
         MaxValue = 90.f
      struct.end
      [7] : struct.begin
         EffectSID = EEffectType::ProtectionPSY
         MaxValue = 90.f
      struct.end
      [8] : struct.begin
         EffectSID = EEffectType::ProtectionRadiation
         MaxValue = 85.f
      struct.end
      [9] : struct.begin
         EffectSID = EEffectType::AdditionalInventoryWeight
         MaxValue = {additional}
      struct.end
   struct.end
struct.end
",
        penalty = PLAIN.render(penalty_max),
        additional = PLAIN.render(additional_max),
    )
}

fn weight_params_template(max_weight: f64, penalty: f64, thresholds: [f64; 4]) -> String {
    let [no_effect, velocity_3, velocity_2, velocity_1] = thresholds.map(|t| FLOAT_POINT.render(t));
    format!(
        "[0] : struct.begin
   SID = Empty
   MaxInventoryMass = 0.f
   InventoryPenaltyLessWeight = 0.f
struct.end

DefaultWeightParams : struct.begin {{refkey=[0]}}
   SID = DefaultWeightParams
   MaxInventoryMass = {max_weight}
   InventoryPenaltyLessWeight = {penalty}
   WeightEffectParams : struct.begin
      [0] : struct.begin
         Threshold = {no_effect}
         EffectPrototypeSIDs : struct.begin
         struct.end
      struct.end
      [1] : struct.begin
         Threshold = {velocity_3}
         EffectPrototypeSIDs : struct.begin
            [0] = OverweightMovementVelocityChange_3
         struct.end
      struct.end
      [2] : struct.begin
         Threshold = {velocity_2}
         EffectPrototypeSIDs : struct.begin
            [0] = OverweightMovementVelocityChange_2
         struct.end
      struct.end
      [3] : struct.begin
         Threshold = {velocity_1}
         EffectPrototypeSIDs : struct.begin
            [0] = OverweightMovementVelocityChange_1
         struct.end
      struct.end
   struct.end
struct.end
",
        max_weight = PLAIN.render(max_weight),
        penalty = PLAIN.render(penalty),
    )
}

impl ConfigPatcher for CarryWeightModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn descriptor_mut(&mut self) -> &mut ModuleDescriptor {
        &mut self.descriptor
    }

    fn derive(&self, inputs: &IndexMap<String, f64>) -> ResolvedConfiguration {
        derive_for_weight(inputs.get("max_weight").copied().unwrap_or(VANILLA_WEIGHT as f64))
    }

    fn apply(
        &self,
        config: &ResolvedConfiguration,
        ctx: &PatchContext<'_>,
    ) -> Result<PatchReport, PatchError> {
        let mut report = PatchReport::new(self.descriptor.name);

        let max_weight = require(config, MAX_INVENTORY_MASS)?;
        let object_penalty = require(config, INVENTORY_PENALTY_LESS_WEIGHT)?;
        let core_penalty = require(config, CORE_INVENTORY_PENALTY_LESS_WEIGHT)?;
        let medium = require(config, MEDIUM_EFFECT_START_UI)?;
        let critical = require(config, CRITICAL_EFFECT_START_UI)?;
        let penalty_max = require(config, PENALTY_LESS_WEIGHT_MAX)?;
        let additional_max = require(config, ADDITIONAL_INVENTORY_WEIGHT_MAX)?;
        let mut thresholds = [0.0; 4];
        for (slot, field) in thresholds.iter_mut().zip(THRESHOLDS) {
            *slot = require(config, field)?;
        }

        tracing::info!("Applying carry weight {} kg", max_weight);

        ctx.patch_file(&mut report, CORE_VARIABLES, None, |doc, report| {
            report.set_field(
                doc,
                CORE_VARIABLES,
                &FieldLocator::document("InventoryPenaltyLessWeight"),
                core_penalty,
            );
            report.set_field(
                doc,
                CORE_VARIABLES,
                &FieldLocator::document("MediumEffectStartUI"),
                medium,
            );
            report.set_field(
                doc,
                CORE_VARIABLES,
                &FieldLocator::document("CriticalEffectStartUI"),
                critical,
            );
        })?;

        let effect_template = || effect_params_template(penalty_max, additional_max);
        ctx.patch_file(&mut report, EFFECT_PARAMS, Some(&effect_template), |doc, report| {
            report.set_field(
                doc,
                EFFECT_PARAMS,
                &FieldLocator::after_anchor(
                    "MaxValue",
                    r"EffectSID\s*=\s*EEffectType::PenaltyLessWeight\b",
                ),
                penalty_max,
            );
            report.set_field(
                doc,
                EFFECT_PARAMS,
                &FieldLocator::after_anchor(
                    "MaxValue",
                    r"EffectSID\s*=\s*EEffectType::AdditionalInventoryWeight\b",
                ),
                additional_max,
            );
        })?;

        let weight_template = || weight_params_template(max_weight, object_penalty, thresholds);
        ctx.patch_file(&mut report, WEIGHT_PARAMS, Some(&weight_template), |doc, report| {
            report.set_field(
                doc,
                WEIGHT_PARAMS,
                &FieldLocator::in_record("MaxInventoryMass", "DefaultWeightParams"),
                max_weight,
            );
            report.set_field(
                doc,
                WEIGHT_PARAMS,
                &FieldLocator::in_record("InventoryPenaltyLessWeight", "DefaultWeightParams"),
                object_penalty,
            );
            report.set_positional(
                doc,
                WEIGHT_PARAMS,
                &FieldLocator::in_record("Threshold", "DefaultWeightParams"),
                &thresholds,
            );
        })?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_vanilla() {
        let config = derive_for_weight(80.0);
        assert_eq!(config.get(THRESHOLD_VELOCITY_CHANGE_1), Some(70.0));
        assert_eq!(config.get(THRESHOLD_VELOCITY_CHANGE_3), Some(75.0));
        // 72.5 rounds to even
        assert_eq!(config.get(THRESHOLD_VELOCITY_CHANGE_2), Some(72.0));
        assert_eq!(config.get(INVENTORY_PENALTY_LESS_WEIGHT), Some(69.99));
        assert_eq!(config.get(PENALTY_LESS_WEIGHT_MAX), Some(99999.0));
    }

    #[test]
    fn test_derive_large_weight() {
        let config = derive_for_weight(1000.0);
        assert_eq!(config.get(CORE_INVENTORY_PENALTY_LESS_WEIGHT), Some(880.0));
        assert_eq!(config.get(CRITICAL_EFFECT_START_UI), Some(960.0));
        assert_eq!(config.get(THRESHOLD_VELOCITY_CHANGE_2), Some(920.0));
        assert_eq!(config.get(THRESHOLD_NO_EFFECT), Some(1000.0));
    }

    #[test]
    fn test_presets_sorted_and_labeled() {
        let module = CarryWeightModule::new();
        let labels: Vec<_> = module.list_presets().iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels[0], "80 kg (Vanilla)");
        assert_eq!(labels.last(), Some(&"1000 kg"));
    }

    #[test]
    fn test_resolve_custom_config() {
        let module = CarryWeightModule::new();
        let mut raw = IndexMap::new();
        raw.insert("max_weight".to_string(), "300".to_string());
        let config = module.resolve_custom_config(&raw).unwrap();
        assert_eq!(config.get(MAX_INVENTORY_MASS), Some(300.0));
        assert_eq!(config.get(THRESHOLD_VELOCITY_CHANGE_1), Some(260.0));

        raw.insert("max_weight".to_string(), "80".to_string());
        assert!(module.resolve_custom_config(&raw).is_err());
    }

    #[test]
    fn test_weight_template_values() {
        let text = weight_params_template(300.0, 259.99, [300.0, 290.0, 275.0, 260.0]);
        assert!(text.contains("MaxInventoryMass = 300\n"));
        assert!(text.contains("InventoryPenaltyLessWeight = 259.99\n"));
        assert!(text.contains("Threshold = 275.f"));
    }
}
