use crate::models::{InputSpec, ModuleDescriptor, Preset, ResolvedConfiguration, TouchedFile};
use crate::patching::{ConfigPatcher, FieldLocator, PatchContext, PatchError, PatchReport, require};
use indexmap::IndexMap;

const PLAYER_WEAPON_SETTINGS: &str =
    "WeaponData/CharacterWeaponSettingsPrototypes/PlayerWeaponSettingsPrototypes.cfg";
const REDUCTION_FACTOR: &str = "reduction_factor";

/// Divides per-shot durability loss of player weapons by a factor
pub struct WeaponDurabilityModule {
    descriptor: ModuleDescriptor,
}

impl WeaponDurabilityModule {
    pub fn new() -> Self {
        let presets = [2.0, 3.0, 5.0, 10.0]
            .into_iter()
            .map(|factor: f64| {
                Preset::new(
                    format!("{}x More Durable", factor),
                    ResolvedConfiguration::new().with(REDUCTION_FACTOR, factor),
                )
            })
            .collect();

        Self {
            descriptor: ModuleDescriptor {
                name: "weapon_durability",
                display_name: "Weapon Durability Modifier",
                touched_files: vec![TouchedFile {
                    logical_path: PLAYER_WEAPON_SETTINGS,
                    fields: vec!["DurabilityDamagePerShot"],
                }],
                presets,
                inputs: vec![InputSpec::decimal(
                    REDUCTION_FACTOR,
                    "Durability factor (2 = weapons last twice as long)",
                    1.01,
                    10.0,
                )],
            },
        }
    }
}

impl Default for WeaponDurabilityModule {
    fn default() -> Self {
        Self::new()
    }
}

/// Round to two decimal places
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl ConfigPatcher for WeaponDurabilityModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn descriptor_mut(&mut self) -> &mut ModuleDescriptor {
        &mut self.descriptor
    }

    fn derive(&self, inputs: &IndexMap<String, f64>) -> ResolvedConfiguration {
        ResolvedConfiguration::new().with(
            REDUCTION_FACTOR,
            inputs.get(REDUCTION_FACTOR).copied().unwrap_or(2.0),
        )
    }

    fn apply(
        &self,
        config: &ResolvedConfiguration,
        ctx: &PatchContext<'_>,
    ) -> Result<PatchReport, PatchError> {
        let factor = require(config, REDUCTION_FACTOR)?;
        let mut report = PatchReport::new(self.descriptor.name);
        tracing::info!("Reducing weapon durability damage by factor {}", factor);

        ctx.patch_file(&mut report, PLAYER_WEAPON_SETTINGS, None, |doc, report| {
            report.map_field(
                doc,
                PLAYER_WEAPON_SETTINGS,
                &FieldLocator::in_top_level_records("DurabilityDamagePerShot", None, &[]),
                |damage| round2(damage / factor),
            );
        })?;

        Ok(report)
    }
}
