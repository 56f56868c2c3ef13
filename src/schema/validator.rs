//! Generic validation and recovery of JSON documents against a [`Schema`].
//!
//! Validation never fails with an `Err`: every structural or bounds problem
//! becomes an entry in [`ValidationResult::errors`], and the caller decides
//! whether `valid == false` is fatal.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::descriptor::{FieldKind, FieldSpec, Schema};
use crate::diagnostics::{Diagnostic, DiagnosticsSink};

#[derive(Clone, Copy, Default)]
pub struct ValidateOptions<'a> {
    /// Replace missing or failing fields with their declared defaults.
    pub recover: bool,
    /// Source file, reported with diagnostics.
    pub file_path: Option<&'a Path>,
    /// Receives every error and recovery. `None` keeps validation silent.
    pub diagnostics: Option<&'a dyn DiagnosticsSink>,
}

impl<'a> ValidateOptions<'a> {
    pub fn strict() -> Self {
        Self::default()
    }

    pub fn recovering() -> Self {
        Self {
            recover: true,
            ..Self::default()
        }
    }

    pub fn with_file(self, file_path: &'a Path) -> Self {
        Self {
            file_path: Some(file_path),
            ..self
        }
    }

    pub fn with_diagnostics(self, sink: &'a dyn DiagnosticsSink) -> Self {
        Self {
            diagnostics: Some(sink),
            ..self
        }
    }

    fn report(&self, errors: &[FieldError]) {
        let Some(sink) = self.diagnostics else {
            return;
        };
        for error in errors {
            sink.emit(Diagnostic {
                file_path: self.file_path.map(Path::to_path_buf),
                path: error.path.clone(),
                message: error.message.clone(),
                recovered: error.recovered,
            });
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Dotted field path; array elements are prefixed with `[index]`.
    pub path: String,
    pub message: String,
    pub recovered: bool,
}

impl FieldError {
    fn new(path: impl Into<String>, message: impl Into<String>, recovered: bool) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            recovered,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult<T = Value> {
    pub valid: bool,
    /// Present only when `valid`; holds the document after recovery.
    pub data: Option<T>,
    pub errors: Vec<FieldError>,
    pub has_recoveries: bool,
}

impl<T> ValidationResult<T> {
    fn invalid(errors: Vec<FieldError>) -> Self {
        let has_recoveries = errors.iter().any(|e| e.recovered);
        Self {
            valid: false,
            data: None,
            errors,
            has_recoveries,
        }
    }
}

impl ValidationResult<Value> {
    /// Decode the validated document into a concrete type.
    ///
    /// A document that passes the schema but fails to decode becomes invalid
    /// with one extra top-level error.
    pub fn into_typed<T: DeserializeOwned>(self) -> ValidationResult<T> {
        let ValidationResult {
            valid,
            data,
            mut errors,
            has_recoveries,
        } = self;

        let data = match data.map(serde_json::from_value::<T>) {
            Some(Ok(decoded)) => Some(decoded),
            Some(Err(e)) => {
                errors.push(FieldError::new("", format!("Failed to decode: {}", e), false));
                None
            }
            None => None,
        };

        ValidationResult {
            valid: valid && data.is_some(),
            data,
            errors,
            has_recoveries,
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validate one document.
///
/// Non-object input fails immediately with a single top-level error and no
/// per-field checks.
pub fn validate(data: &Value, schema: &Schema, options: &ValidateOptions<'_>) -> ValidationResult {
    let Value::Object(fields) = data else {
        let errors = vec![FieldError::new(
            "",
            format!("Expected object, got {}", json_type_name(data)),
            false,
        )];
        options.report(&errors);
        return ValidationResult::invalid(errors);
    };

    let mut output = fields.clone();
    let mut errors = Vec::new();
    let mut fatal = false;

    for spec in schema.fields() {
        let problem = match fields.get(spec.name) {
            None | Some(Value::Null) if spec.required => "Required field missing".to_string(),
            None | Some(Value::Null) => continue,
            Some(value) => match check_value(spec, value) {
                Ok(()) => continue,
                Err(message) => message,
            },
        };

        if recover_field(spec, options, &mut output) {
            errors.push(FieldError::new(spec.name, problem, true));
        } else {
            errors.push(FieldError::new(spec.name, problem, false));
            fatal = true;
        }
    }

    options.report(&errors);

    if fatal {
        return ValidationResult::invalid(errors);
    }

    let has_recoveries = errors.iter().any(|e| e.recovered);
    ValidationResult {
        valid: true,
        data: Some(Value::Object(output)),
        errors,
        has_recoveries,
    }
}

/// Validate every element of a JSON array.
///
/// When recovering, elements still invalid after field recovery are dropped
/// and the rest of the array survives.
pub fn validate_array(items: &Value, schema: &Schema, options: &ValidateOptions<'_>) -> ValidationResult {
    let Value::Array(elements) = items else {
        let errors = vec![FieldError::new(
            "",
            format!("Expected array, got {}", json_type_name(items)),
            false,
        )];
        options.report(&errors);
        return ValidationResult::invalid(errors);
    };

    // Element results are reported once, with indexed paths, below.
    let element_options = ValidateOptions {
        diagnostics: None,
        ..*options
    };

    let mut kept = Vec::with_capacity(elements.len());
    let mut errors = Vec::new();
    let mut fatal = false;

    for (index, element) in elements.iter().enumerate() {
        let result = validate(element, schema, &element_options);
        errors.extend(result.errors.into_iter().map(|e| FieldError {
            path: index_path(index, &e.path),
            ..e
        }));

        match result.data {
            Some(data) if result.valid => kept.push(data),
            _ if options.recover => errors.push(FieldError::new(
                index_path(index, ""),
                "Dropped invalid element",
                true,
            )),
            _ => fatal = true,
        }
    }

    options.report(&errors);

    if fatal {
        return ValidationResult::invalid(errors);
    }

    let has_recoveries = errors.iter().any(|e| e.recovered);
    ValidationResult {
        valid: true,
        data: Some(Value::Array(kept)),
        errors,
        has_recoveries,
    }
}

fn index_path(index: usize, path: &str) -> String {
    if path.is_empty() {
        format!("[{}]", index)
    } else {
        format!("[{}].{}", index, path)
    }
}

/// Substitute the default for `spec` if recovery applies. Returns whether it did.
fn recover_field(spec: &FieldSpec, options: &ValidateOptions<'_>, output: &mut Map<String, Value>) -> bool {
    match (&spec.default, options.recover) {
        (Some(default), true) => {
            output.insert(spec.name.to_string(), default.clone());
            true
        }
        _ => false,
    }
}

fn check_value(spec: &FieldSpec, value: &Value) -> Result<(), String> {
    let type_error = || {
        format!(
            "Expected {}, got {}",
            spec.kind.type_name(),
            json_type_name(value)
        )
    };

    match &spec.kind {
        FieldKind::String {
            min_len,
            max_len,
            pattern,
        } => {
            let s = value.as_str().ok_or_else(type_error)?;
            let len = s.chars().count();
            if let Some(min) = min_len {
                if len < *min {
                    return Err(format!("String length {} is below minimum {}", len, min));
                }
            }
            if let Some(max) = max_len {
                if len > *max {
                    return Err(format!("String length {} exceeds maximum {}", len, max));
                }
            }
            if let Some(re) = pattern {
                if !re.is_match(s) {
                    return Err(format!("Value '{}' does not match required format", s));
                }
            }
            Ok(())
        }
        FieldKind::Number { min, max, integer } => {
            let n = value.as_f64().ok_or_else(type_error)?;
            // 5.0 is a float in JSON and will not decode into an integer field.
            if *integer && !(value.is_i64() || value.is_u64()) {
                return Err(format!("Value {} must be an integer", value));
            }
            if let Some(min) = min {
                if n < *min {
                    return Err(format!("Value {} is below minimum {}", value, min));
                }
            }
            if let Some(max) = max {
                if n > *max {
                    return Err(format!("Value {} exceeds maximum {}", value, max));
                }
            }
            Ok(())
        }
        FieldKind::Boolean => value.as_bool().map(|_| ()).ok_or_else(type_error),
        FieldKind::Array => value.as_array().map(|_| ()).ok_or_else(type_error),
        FieldKind::Object => value.as_object().map(|_| ()).ok_or_else(type_error),
        FieldKind::Enum(allowed) => {
            let s = value.as_str().ok_or_else(type_error)?;
            if allowed.iter().any(|a| *a == s) {
                Ok(())
            } else {
                Err(format!("Value '{}' is not one of: {}", s, allowed.join(", ")))
            }
        }
    }
}
