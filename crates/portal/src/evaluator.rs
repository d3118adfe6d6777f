//! Conditional field evaluation.
//!
//! Visibility is a single hop: a field looks at exactly one earlier field
//! and never at that field's own visibility. A chain `a -> b -> c` therefore
//! shows `c` whenever `b` holds a matching value, even if `b` itself is
//! hidden. Hidden fields are skipped entirely by submit-readiness checks.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

use regex::Regex;
use shared_types::{FieldDefinition, PortalError, ServiceDefinition};

/// Current extra-field answers, keyed by field name.
pub type FieldValues = HashMap<String, String>;

static PATTERN_CACHE: LazyLock<Mutex<HashMap<String, Regex>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Compile a validation pattern for full-string matching.
///
/// The pattern is wrapped in `^(?:...)$` so that an unanchored pattern
/// still has to match the whole value.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    if let Ok(cache) = PATTERN_CACHE.lock() {
        if let Some(re) = cache.get(pattern) {
            return Ok(re.clone());
        }
    }
    let re = Regex::new(&format!("^(?:{pattern})$"))?;
    if let Ok(mut cache) = PATTERN_CACHE.lock() {
        cache.insert(pattern.to_string(), re.clone());
    }
    Ok(re)
}

/// A value counts as present when it has non-whitespace content.
pub fn value_present(values: &FieldValues, name: &str) -> bool {
    values.get(name).is_some_and(|v| !v.trim().is_empty())
}

pub fn is_visible(field: &FieldDefinition, values: &FieldValues) -> bool {
    match &field.visibility {
        None => true,
        Some(rule) => values
            .get(&rule.depends_on_field)
            .is_some_and(|current| rule.show_when_value_in.iter().any(|v| v == current)),
    }
}

/// Fields the form should currently render, in schema order.
pub fn visible_fields<'a>(
    service: &'a ServiceDefinition,
    values: &FieldValues,
) -> Vec<&'a FieldDefinition> {
    service
        .fields
        .iter()
        .filter(|f| is_visible(f, values))
        .collect()
}

/// Inline error for one field, or `None` when it passes (or is hidden).
pub fn field_error(field: &FieldDefinition, values: &FieldValues) -> Option<String> {
    if !is_visible(field, values) {
        return None;
    }
    if !value_present(values, &field.name) {
        return field
            .required
            .then(|| format!("{} is required", field.label));
    }
    let pattern = field.validation_pattern.as_deref()?;
    let value = values.get(&field.name).map(|v| v.trim()).unwrap_or_default();
    match compile_pattern(pattern) {
        Ok(re) if re.is_match(value) => None,
        Ok(_) => Some(format!("{} has an invalid format", field.label)),
        Err(e) => {
            tracing::error!(field = %field.name, error = %e, "Unusable validation pattern");
            Some(format!("{} cannot be validated", field.label))
        }
    }
}

/// Check every visible field, collecting inline errors by field name.
pub fn validate(service: &ServiceDefinition, values: &FieldValues) -> Result<(), PortalError> {
    let field_errors: HashMap<String, String> = service
        .fields
        .iter()
        .filter_map(|f| field_error(f, values).map(|msg| (f.name.clone(), msg)))
        .collect();

    if field_errors.is_empty() {
        Ok(())
    } else {
        Err(PortalError::validation("Validation failed", field_errors))
    }
}

pub fn is_submittable(service: &ServiceDefinition, values: &FieldValues) -> bool {
    service
        .fields
        .iter()
        .all(|f| field_error(f, values).is_none())
}
