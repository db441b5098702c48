use crate::config::ConfigManager;
use crate::models::ModuleDescriptor;
use crate::patching::ConfigPatcher;
use crate::patching::modules::{
    CarryWeightModule, DayLengthModule, StaminaModule, TraderDurabilityModule,
    WeaponDurabilityModule,
};
use anyhow::{Context, Result};

/// Static table of the available modules, in declaration order.
///
/// Declaration order decides how conflicts and module listings are presented.
pub struct ModuleRegistry {
    modules: Vec<Box<dyn ConfigPatcher>>,
}

impl ModuleRegistry {
    /// Registry with every built-in module
    pub fn with_defaults() -> Self {
        Self {
            modules: vec![
                Box::new(CarryWeightModule::new()),
                Box::new(DayLengthModule::new()),
                Box::new(StaminaModule::new()),
                Box::new(TraderDurabilityModule::new()),
                Box::new(WeaponDurabilityModule::new()),
            ],
        }
    }

    pub fn from_modules(modules: Vec<Box<dyn ConfigPatcher>>) -> Self {
        Self { modules }
    }

    /// Look up a module by name or display name, ignoring case
    pub fn get(&self, key: &str) -> Option<&dyn ConfigPatcher> {
        let key = key.trim();
        self.modules
            .iter()
            .find(|m| {
                let descriptor = m.descriptor();
                descriptor.name.eq_ignore_ascii_case(key)
                    || descriptor.display_name.eq_ignore_ascii_case(key)
            })
            .map(|m| m.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn ConfigPatcher> {
        self.modules.iter().map(|m| m.as_ref())
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.iter().map(|m| m.descriptor())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Replace built-in presets with any `presets/<module>.yaml` catalogs present.
    ///
    /// Every catalog preset is checked with [`ConfigPatcher::validate_config`]; one bad
    /// preset rejects the whole catalog and leaves the built-in presets in place.
    ///
    /// # Returns
    /// Names of the modules whose presets were replaced
    pub fn apply_catalogs(&mut self, config_manager: &ConfigManager) -> Result<Vec<String>> {
        let mut replaced = Vec::new();
        for module in &mut self.modules {
            let name = module.descriptor().name;
            if let Some(presets) = config_manager.load_preset_catalog(name)? {
                for preset in &presets {
                    module.validate_config(&preset.config).with_context(|| {
                        format!(
                            "Invalid preset {:?} in {}",
                            preset.label,
                            config_manager.preset_catalog_path(name)
                        )
                    })?;
                }
                tracing::info!("Using {} catalog presets for {}", presets.len(), name);
                module.descriptor_mut().presets = presets;
                replaced.push(name.to_string());
            }
        }
        Ok(replaced)
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
