use crate::patching::ModuleRegistry;
use indexmap::IndexMap;

/// Files written by more than one selected module.
///
/// Conflicts are reported at file granularity even when the modules touch
/// disjoint fields; the report is advisory and never blocks a build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    entries: IndexMap<String, Vec<String>>,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Display names of the modules sharing `logical_path`
    pub fn contributors(&self, logical_path: &str) -> Option<&[String]> {
        self.entries.get(logical_path).map(Vec::as_slice)
    }

    /// `(logical file, module display names)` in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(file, modules)| (file.as_str(), modules.as_slice()))
    }

    /// Emit one warning per conflicting file
    pub fn log(&self) {
        if self.is_empty() {
            tracing::info!("No file conflicts between selected modules");
            return;
        }
        for (file, modules) in self.iter() {
            tracing::warn!(
                "{} is modified by multiple modules: {}",
                file,
                modules.join(", ")
            );
        }
    }
}

/// Find logical files touched by more than one of the `selected` modules.
///
/// # Arguments
/// * `registry` - Supplies descriptors in declaration order
/// * `selected` - Module names or display names; unknown entries are ignored
pub fn detect_conflicts(registry: &ModuleRegistry, selected: &[&str]) -> ConflictReport {
    let mut touched: IndexMap<String, Vec<String>> = IndexMap::new();

    for descriptor in registry.descriptors() {
        let is_selected = selected.iter().any(|key| {
            key.eq_ignore_ascii_case(descriptor.name)
                || key.eq_ignore_ascii_case(descriptor.display_name)
        });
        if !is_selected {
            continue;
        }

        for file in &descriptor.touched_files {
            let modules = touched.entry(file.logical_path.to_string()).or_default();
            if !modules.iter().any(|m| m == descriptor.display_name) {
                modules.push(descriptor.display_name.to_string());
            }
        }
    }

    touched.retain(|_, modules| modules.len() > 1);
    ConflictReport { entries: touched }
}
