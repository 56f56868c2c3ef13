//! Schema validation and recovery for persisted JSON state.
//!
//! Persisted state is flat JSON rewritten by processes that may crash at any
//! point. Readers validate with `recover: true` so a damaged or older file
//! degrades to defaults instead of stopping the worker.

mod descriptor;
mod registry;
mod validator;

pub use descriptor::{FieldKind, FieldSpec, Schema};
pub use registry::{
    SchemaName, MAX_COST, MAX_DURATION_SECS, MAX_ITERATIONS, MAX_TASK_COUNT, TIMESTAMP_RE,
};
pub use validator::{validate, validate_array, FieldError, ValidateOptions, ValidationResult};

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Validate a single document against a named schema and decode it.
pub fn validate_as<T: DeserializeOwned>(
    data: &Value,
    name: SchemaName,
    options: &ValidateOptions<'_>,
) -> ValidationResult<T> {
    validate(data, name.schema(), options).into_typed()
}

/// Validate an array of records against a named schema and decode it.
pub fn validate_array_as<T: DeserializeOwned>(
    items: &Value,
    name: SchemaName,
    options: &ValidateOptions<'_>,
) -> ValidationResult<Vec<T>> {
    validate_array(items, name.schema(), options).into_typed()
}
