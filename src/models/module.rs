use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw user input for a module's custom configuration, keyed by input name
pub type RawInputs = IndexMap<String, String>;

/// Field name → numeric value for one module.
///
/// Produced either by a preset or by a module's pure derivation from validated
/// input. Order is preserved so reports and generated files are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedConfiguration(IndexMap<String, f64>);

impl ResolvedConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, field: &str, value: f64) -> Self {
        self.0.insert(field.to_string(), value);
        self
    }

    pub fn insert(&mut self, field: &str, value: f64) {
        self.0.insert(field.to_string(), value);
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.0.get(field).copied()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A named, fully resolved configuration offered for selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub label: String,
    pub config: ResolvedConfiguration,
}

impl Preset {
    pub fn new(label: impl Into<String>, config: ResolvedConfiguration) -> Self {
        Self {
            label: label.into(),
            config,
        }
    }
}

/// Whether a custom input accepts fractional values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputKind {
    Integer,
    Decimal,
}

/// One numeric input of a module's custom-configuration contract.
///
/// Bounds are inclusive at both ends.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
    pub kind: InputKind,
}

impl InputSpec {
    pub const fn integer(name: &'static str, label: &'static str, min: f64, max: f64) -> Self {
        Self {
            name,
            label,
            min,
            max,
            kind: InputKind::Integer,
        }
    }

    pub const fn decimal(name: &'static str, label: &'static str, min: f64, max: f64) -> Self {
        Self {
            name,
            label,
            min,
            max,
            kind: InputKind::Decimal,
        }
    }

    /// Parse and bound-check a raw value for this input
    pub fn validate(&self, raw: &str) -> Result<f64, ValidationFailure> {
        let trimmed = raw.trim();
        let not_numeric = || ValidationFailure::NotNumeric {
            field: self.name.to_string(),
            value: raw.to_string(),
        };

        let value = match self.kind {
            InputKind::Integer => trimmed.parse::<i64>().map_err(|_| not_numeric())? as f64,
            InputKind::Decimal => {
                let parsed = trimmed.parse::<f64>().map_err(|_| not_numeric())?;
                if !parsed.is_finite() {
                    return Err(not_numeric());
                }
                parsed
            }
        };

        self.check_bounds(value)
    }

    /// Bound-check an already numeric value
    pub fn check_bounds(&self, value: f64) -> Result<f64, ValidationFailure> {
        if !value.is_finite() {
            return Err(ValidationFailure::NotNumeric {
                field: self.name.to_string(),
                value: value.to_string(),
            });
        }
        if value < self.min {
            return Err(ValidationFailure::BelowMinimum {
                field: self.name.to_string(),
                value,
                min: self.min,
            });
        }
        if value > self.max {
            return Err(ValidationFailure::AboveMaximum {
                field: self.name.to_string(),
                value,
                max: self.max,
            });
        }

        Ok(value)
    }

    /// Prompt text shown by interactive front ends
    pub fn prompt(&self) -> String {
        format!("{} ({}-{})", self.label, self.min, self.max)
    }
}

/// Rejected custom input. Recoverable: the caller re-prompts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationFailure {
    #[error("Missing value for {field}")]
    Missing { field: String },

    #[error("Value {value:?} for {field} is not a valid number")]
    NotNumeric { field: String, value: String },

    #[error("{field} must be at least {min} (got {value})")]
    BelowMinimum { field: String, value: f64, min: f64 },

    #[error("{field} must be at most {max} (got {value})")]
    AboveMaximum { field: String, value: f64, max: f64 },

    #[error("Unknown input {field}")]
    UnknownInput { field: String },
}

impl ValidationFailure {
    /// Name of the offending input
    pub fn field(&self) -> &str {
        match self {
            Self::Missing { field }
            | Self::NotNumeric { field, .. }
            | Self::BelowMinimum { field, .. }
            | Self::AboveMaximum { field, .. }
            | Self::UnknownInput { field } => field,
        }
    }
}

/// A logical file (relative to `GameData`) a module may write, with its fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchedFile {
    pub logical_path: &'static str,
    pub fields: Vec<&'static str>,
}

/// Static identity of a configurable feature
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    /// Stable key used on the command line and in catalogs
    pub name: &'static str,
    pub display_name: &'static str,
    pub touched_files: Vec<TouchedFile>,
    pub presets: Vec<Preset>,
    pub inputs: Vec<InputSpec>,
}

impl ModuleDescriptor {
    pub fn touches(&self, logical_path: &str) -> bool {
        self.touched_files
            .iter()
            .any(|f| f.logical_path.eq_ignore_ascii_case(logical_path))
    }

    /// Validate every declared input, rejecting unknown and missing ones
    pub fn validate_inputs(&self, raw: &RawInputs) -> Result<IndexMap<String, f64>, ValidationFailure> {
        if let Some(unknown) = raw
            .keys()
            .find(|key| !self.inputs.iter().any(|input| input.name == key.as_str()))
        {
            return Err(ValidationFailure::UnknownInput {
                field: unknown.clone(),
            });
        }

        let mut validated = IndexMap::new();
        for input in &self.inputs {
            let value = raw.get(input.name).ok_or_else(|| ValidationFailure::Missing {
                field: input.name.to_string(),
            })?;
            validated.insert(input.name.to_string(), input.validate(value)?);
        }
        Ok(validated)
    }

    /// Find a preset by 1-based index or case-insensitive label
    pub fn find_preset(&self, key: &str) -> Option<&Preset> {
        if let Ok(index) = key.trim().parse::<usize>() {
            return index.checked_sub(1).and_then(|i| self.presets.get(i));
        }
        self.presets
            .iter()
            .find(|p| p.label.eq_ignore_ascii_case(key.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight_input() -> InputSpec {
        InputSpec::integer("max_weight", "Max carry weight", 81.0, 10000.0)
    }

    #[test]
    fn test_integer_bounds_inclusive() {
        let input = weight_input();
        assert_eq!(input.validate("81").unwrap(), 81.0);
        assert_eq!(input.validate("10000").unwrap(), 10000.0);
        assert!(matches!(
            input.validate("80"),
            Err(ValidationFailure::BelowMinimum { .. })
        ));
        assert!(matches!(
            input.validate("10001"),
            Err(ValidationFailure::AboveMaximum { .. })
        ));
    }

    #[test]
    fn test_integer_rejects_fraction_and_text() {
        let input = weight_input();
        assert!(matches!(
            input.validate("100.5"),
            Err(ValidationFailure::NotNumeric { .. })
        ));
        assert!(matches!(
            input.validate("heavy"),
            Err(ValidationFailure::NotNumeric { .. })
        ));
    }

    #[test]
    fn test_decimal_rejects_non_finite() {
        let input = InputSpec::decimal("coefficient", "Time coefficient", 0.5, 100.0);
        assert!(input.validate("NaN").is_err());
        assert!(input.validate("inf").is_err());
        assert_eq!(input.validate(" 0.5 ").unwrap(), 0.5);
    }

    #[test]
    fn test_check_bounds_rejects_non_finite() {
        let input = InputSpec::decimal("reduction_factor", "Durability factor", 1.01, 10.0);
        assert!(matches!(
            input.check_bounds(f64::INFINITY),
            Err(ValidationFailure::NotNumeric { .. })
        ));
        assert!(matches!(
            input.check_bounds(0.0),
            Err(ValidationFailure::BelowMinimum { .. })
        ));
        assert_eq!(input.check_bounds(10.0).unwrap(), 10.0);
    }

    #[test]
    fn test_failure_names_field() {
        let err = weight_input().validate("5").unwrap_err();
        assert_eq!(err.field(), "max_weight");
        assert!(err.to_string().contains("at least 81"));
    }

    #[test]
    fn test_find_preset_by_index_and_label() {
        let descriptor = ModuleDescriptor {
            name: "day_length",
            display_name: "Day Length Modifier",
            touched_files: vec![],
            presets: vec![
                Preset::new("Vanilla", ResolvedConfiguration::new().with("coefficient", 24.0)),
                Preset::new("Slow", ResolvedConfiguration::new().with("coefficient", 6.0)),
            ],
            inputs: vec![],
        };

        assert_eq!(descriptor.find_preset("2").unwrap().label, "Slow");
        assert_eq!(descriptor.find_preset("vanilla").unwrap().label, "Vanilla");
        assert!(descriptor.find_preset("0").is_none());
        assert!(descriptor.find_preset("3").is_none());
    }
}
