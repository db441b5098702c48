use crate::models::{InputSpec, ModuleDescriptor, Preset, ResolvedConfiguration, TouchedFile};
use crate::patching::{ConfigPatcher, FieldLocator, PatchContext, PatchError, PatchReport, require};
use indexmap::IndexMap;

const TRADE_PROTOTYPES: &str = "TradePrototypes.cfg";
const MIN_DURABILITY: &str = "min_durability";
const INPUT: &str = "min_durability_percent";

/// Traders whose limits are left alone
const EXCLUDED_TRADERS: &[&str] = &["Trader_Soviet_Rostok_TradePrototype"];
const TRADER_ATTRIBUTE: &str = "refkey=[0]";

/// Lowers the minimum condition traders require before buying weapons and armor
pub struct TraderDurabilityModule {
    descriptor: ModuleDescriptor,
}

impl TraderDurabilityModule {
    pub fn new() -> Self {
        let preset = |label: &str, fraction: f64| {
            Preset::new(label, ResolvedConfiguration::new().with(MIN_DURABILITY, fraction))
        };

        Self {
            descriptor: ModuleDescriptor {
                name: "trader_durability",
                display_name: "Traders Buy Broken Stuff",
                touched_files: vec![TouchedFile {
                    logical_path: TRADE_PROTOTYPES,
                    fields: vec!["WeaponSellMinDurability", "ArmorSellMinDurability"],
                }],
                presets: vec![
                    preset("Accept All (0% minimum)", 0.0),
                    preset("Accept Damaged (25% minimum)", 0.25),
                    preset("Accept Used (50% minimum)", 0.5),
                    preset("Vanilla (70% minimum)", 0.7),
                ],
                inputs: vec![InputSpec::integer(
                    INPUT,
                    "Minimum durability (%)",
                    0.0,
                    100.0,
                )],
            },
        }
    }
}

impl Default for TraderDurabilityModule {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigPatcher for TraderDurabilityModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn descriptor_mut(&mut self) -> &mut ModuleDescriptor {
        &mut self.descriptor
    }

    fn derive(&self, inputs: &IndexMap<String, f64>) -> ResolvedConfiguration {
        let percent = inputs.get(INPUT).copied().unwrap_or(70.0);
        ResolvedConfiguration::new().with(MIN_DURABILITY, percent / 100.0)
    }

    fn apply(
        &self,
        config: &ResolvedConfiguration,
        ctx: &PatchContext<'_>,
    ) -> Result<PatchReport, PatchError> {
        let min_durability = require(config, MIN_DURABILITY)?;
        let mut report = PatchReport::new(self.descriptor.name);
        tracing::info!("Setting trader minimum durability to {}", min_durability);

        ctx.patch_file(&mut report, TRADE_PROTOTYPES, None, |doc, report| {
            for field in ["WeaponSellMinDurability", "ArmorSellMinDurability"] {
                report.set_field(
                    doc,
                    TRADE_PROTOTYPES,
                    &FieldLocator::in_top_level_records(
                        field,
                        Some(TRADER_ATTRIBUTE),
                        EXCLUDED_TRADERS,
                    ),
                    min_durability,
                );
            }
        })?;

        Ok(report)
    }
}
