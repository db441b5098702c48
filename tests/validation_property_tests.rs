//! Property tests for custom-input validation of every built-in module
//!
//! Bounds are inclusive: values in `[min, max]` are accepted, anything outside is
//! rejected with a failure naming the offending input.

use modbuilder::ModuleRegistry;
use modbuilder::models::{InputKind, InputSpec, RawInputs, ValidationFailure};
use proptest::prelude::*;

fn format_value(input: &InputSpec, value: f64) -> String {
    match input.kind {
        InputKind::Integer => (value as i64).to_string(),
        InputKind::Decimal => value.to_string(),
    }
}

/// Every input of the module at its minimum, with `name` set to `raw`
fn inputs_with(inputs: &[InputSpec], name: &str, raw: String) -> RawInputs {
    let mut map = RawInputs::new();
    for input in inputs {
        map.insert(input.name.to_string(), format_value(input, input.min));
    }
    map.insert(name.to_string(), raw);
    map
}

fn all_inputs(registry: &ModuleRegistry) -> Vec<(&'static str, InputSpec)> {
    registry
        .descriptors()
        .flat_map(|d| d.inputs.iter().map(move |input| (d.name, input.clone())))
        .collect()
}

#[test]
fn test_every_module_accepts_its_bounds() {
    let registry = ModuleRegistry::with_defaults();
    for (module_name, input) in all_inputs(&registry) {
        let module = registry.get(module_name).unwrap();
        for bound in [input.min, input.max] {
            let raw = inputs_with(&module.descriptor().inputs, input.name, format_value(&input, bound));
            assert!(
                module.resolve_custom_config(&raw).is_ok(),
                "{}.{} rejected bound {}",
                module_name,
                input.name,
                bound
            );
        }
    }
}

proptest! {
    #[test]
    fn values_inside_bounds_are_accepted(t in 0.0f64..=1.0) {
        let registry = ModuleRegistry::with_defaults();
        for (module_name, input) in all_inputs(&registry) {
            let module = registry.get(module_name).unwrap();
            let value = match input.kind {
                InputKind::Integer => (input.min + (t * (input.max - input.min)).floor()).clamp(input.min, input.max),
                InputKind::Decimal => (input.min + t * (input.max - input.min)).clamp(input.min, input.max),
            };
            let raw = inputs_with(&module.descriptor().inputs, input.name, format_value(&input, value));
            prop_assert!(
                module.resolve_custom_config(&raw).is_ok(),
                "{}.{} rejected {}", module_name, input.name, value
            );
        }
    }

    #[test]
    fn values_below_minimum_are_rejected(delta in 0.01f64..1000.0) {
        let registry = ModuleRegistry::with_defaults();
        for (module_name, input) in all_inputs(&registry) {
            let module = registry.get(module_name).unwrap();
            let value = match input.kind {
                InputKind::Integer => input.min - delta.ceil(),
                InputKind::Decimal => input.min - delta,
            };
            let raw = inputs_with(&module.descriptor().inputs, input.name, format_value(&input, value));
            let err = module.resolve_custom_config(&raw).unwrap_err();
            prop_assert!(matches!(err, ValidationFailure::BelowMinimum { .. }), "{:?}", err);
            prop_assert_eq!(err.field(), input.name);
        }
    }

    #[test]
    fn values_above_maximum_are_rejected(delta in 0.01f64..1000.0) {
        let registry = ModuleRegistry::with_defaults();
        for (module_name, input) in all_inputs(&registry) {
            let module = registry.get(module_name).unwrap();
            let value = match input.kind {
                InputKind::Integer => input.max + delta.ceil(),
                InputKind::Decimal => input.max + delta,
            };
            let raw = inputs_with(&module.descriptor().inputs, input.name, format_value(&input, value));
            let err = module.resolve_custom_config(&raw).unwrap_err();
            prop_assert!(matches!(err, ValidationFailure::AboveMaximum { .. }), "{:?}", err);
            prop_assert_eq!(err.field(), input.name);
        }
    }

    #[test]
    fn non_numeric_input_is_rejected(text in "[a-zA-Z ]{1,12}") {
        let registry = ModuleRegistry::with_defaults();
        for (module_name, input) in all_inputs(&registry) {
            let module = registry.get(module_name).unwrap();
            let raw = inputs_with(&module.descriptor().inputs, input.name, text.clone());
            let err = module.resolve_custom_config(&raw).unwrap_err();
            prop_assert!(
                matches!(err, ValidationFailure::NotNumeric { .. }),
                "{:?}", err
            );
        }
    }
}
