use crate::models::{InputSpec, ModuleDescriptor, Preset, ResolvedConfiguration, TouchedFile};
use crate::patching::{ConfigPatcher, FieldLocator, PatchContext, PatchError, PatchReport, require};
use indexmap::IndexMap;

const CORE_VARIABLES: &str = "CoreVariables.cfg";
const COEFFICIENT: &str = "coefficient";
const VANILLA_COEFFICIENT: f64 = 24.0;

/// Changes how fast in-game time passes relative to real time
pub struct DayLengthModule {
    descriptor: ModuleDescriptor,
}

impl DayLengthModule {
    pub fn new() -> Self {
        let preset = |label: &str, coefficient: f64| {
            Preset::new(label, ResolvedConfiguration::new().with(COEFFICIENT, coefficient))
        };

        Self {
            descriptor: ModuleDescriptor {
                name: "day_length",
                display_name: "Day Length Modifier",
                touched_files: vec![TouchedFile {
                    logical_path: CORE_VARIABLES,
                    fields: vec!["RealToGameTimeCoef"],
                }],
                presets: vec![
                    preset("Vanilla (x24)", VANILLA_COEFFICIENT),
                    preset("Half speed (x12)", 12.0),
                    preset("Slow (x6)", 6.0),
                    preset("Real time (x1)", 1.0),
                    preset("Fast (x48)", 48.0),
                ],
                inputs: vec![InputSpec::decimal(
                    COEFFICIENT,
                    "Time coefficient (24 = vanilla, 1 = real time)",
                    0.5,
                    100.0,
                )],
            },
        }
    }
}

impl Default for DayLengthModule {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigPatcher for DayLengthModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn descriptor_mut(&mut self) -> &mut ModuleDescriptor {
        &mut self.descriptor
    }

    fn derive(&self, inputs: &IndexMap<String, f64>) -> ResolvedConfiguration {
        ResolvedConfiguration::new().with(
            COEFFICIENT,
            inputs.get(COEFFICIENT).copied().unwrap_or(VANILLA_COEFFICIENT),
        )
    }

    fn apply(
        &self,
        config: &ResolvedConfiguration,
        ctx: &PatchContext<'_>,
    ) -> Result<PatchReport, PatchError> {
        let coefficient = require(config, COEFFICIENT)?;
        let mut report = PatchReport::new(self.descriptor.name);
        tracing::info!("Applying day length coefficient {}", coefficient);

        ctx.patch_file(&mut report, CORE_VARIABLES, None, |doc, report| {
            report.set_field(
                doc,
                CORE_VARIABLES,
                &FieldLocator::document("RealToGameTimeCoef"),
                coefficient,
            );
        })?;

        Ok(report)
    }
}
