use crate::models::{InputSpec, ModuleDescriptor, ResolvedConfiguration, TouchedFile};
use crate::patching::{
    ConfigPatcher, FileAction, PatchContext, PatchError, PatchReport, format_decimal, require,
};
use indexmap::IndexMap;

const BETTER_STAMINA: &str = "ObjPrototypes/BetterStamina.cfg";

/// `(input name, key written to the file)` in file order
const ACTIONS: [(&str, &str); 6] = [
    ("sprint", "Sprint"),
    ("jump", "Jump"),
    ("melee_normal", "MeleeNormal"),
    ("melee_strong", "MeleeStrong"),
    ("melee_butstock", "MeleeButstock"),
    ("vault", "Vault"),
];

/// Per-action stamina costs, written as an override of the player prototype.
///
/// The file is always generated from scratch; nothing is read from the extraction.
/// Presets come only from a preset catalog.
///
/// Only `BetterStamina.cfg` is declared as touched, since that is the only file written.
/// `CoreVariables.cfg` is left alone, so stamina never conflicts with the modules that
/// edit it.
pub struct StaminaModule {
    descriptor: ModuleDescriptor,
}

impl StaminaModule {
    pub fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor {
                name: "stamina",
                display_name: "Stamina Usage Modifier",
                touched_files: vec![TouchedFile {
                    logical_path: BETTER_STAMINA,
                    fields: ACTIONS.iter().map(|(_, key)| *key).collect(),
                }],
                presets: Vec::new(),
                inputs: vec![
                    InputSpec::decimal("sprint", "Sprint", 1.0, 10.0),
                    InputSpec::decimal("jump", "Jump", 2.0, 20.0),
                    InputSpec::decimal("melee_normal", "Melee Normal", 2.0, 20.0),
                    InputSpec::decimal("melee_strong", "Melee Strong", 3.0, 30.0),
                    InputSpec::decimal("melee_butstock", "Melee Butstock", 1.5, 15.0),
                    InputSpec::decimal("vault", "Vault", 1.5, 15.0),
                ],
            },
        }
    }
}

impl Default for StaminaModule {
    fn default() -> Self {
        Self::new()
    }
}

fn render(values: &[(&str, f64)]) -> String {
    let mut content = String::from(
        "BetterStamina : struct.begin {refurl=../ObjPrototypes.cfg;refkey=Player}\n   StaminaPerAction : struct.begin\n",
    );
    for (key, value) in values {
        content.push_str(&format!("      {} = {}\n", key, format_decimal(*value)));
    }
    content.push_str("   struct.end\nstruct.end\n");
    content
}

impl ConfigPatcher for StaminaModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn descriptor_mut(&mut self) -> &mut ModuleDescriptor {
        &mut self.descriptor
    }

    fn derive(&self, inputs: &IndexMap<String, f64>) -> ResolvedConfiguration {
        let mut config = ResolvedConfiguration::new();
        for (name, _) in ACTIONS {
            if let Some(value) = inputs.get(name) {
                config.insert(name, *value);
            }
        }
        config
    }

    fn apply(
        &self,
        config: &ResolvedConfiguration,
        ctx: &PatchContext<'_>,
    ) -> Result<PatchReport, PatchError> {
        let mut values = Vec::with_capacity(ACTIONS.len());
        for (name, key) in ACTIONS {
            values.push((key, require(config, name)?));
        }

        let mut report = PatchReport::new(self.descriptor.name);
        ctx.generate_file(&mut report, BETTER_STAMINA, &render(&values), FileAction::Generated)?;
        report.fields_patched += values.len();
        Ok(report)
    }
}
