//! Input validation for fields and values.
//!
//! The engine validates every field and value it is asked to write before
//! running access checks, so malformed input fails with `InvalidInput`
//! regardless of who sent it.

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::field::{AccessMode, PropertyField};
use crate::value::PropertyValue;

/// Upper bound for field names.
pub const MAX_NAME_LEN: usize = 255;

/// Upper bound for target ids and target types.
pub const MAX_TARGET_LEN: usize = 255;

/// Upper bound for the number of options on one field.
pub const MAX_OPTIONS: usize = 1000;

fn validate_non_empty(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(ValidationError::MissingField {
            field: field.to_string(),
        });
    }
    if v.len() > max {
        return Err(ValidationError::FieldTooLong {
            field: field.to_string(),
            max_length: max,
        });
    }
    Ok(())
}

fn validate_optional(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.len() > max {
        return Err(ValidationError::FieldTooLong {
            field: field.to_string(),
            max_length: max,
        });
    }
    Ok(())
}

/// Validate a field definition.
pub fn validate_field(field: &PropertyField) -> Result<(), ValidationError> {
    validate_non_empty("name", &field.name, MAX_NAME_LEN)?;
    validate_optional("target_type", &field.target_type, MAX_TARGET_LEN)?;
    validate_optional("target_id", &field.target_id, MAX_TARGET_LEN)?;

    if field.access_mode() == AccessMode::SharedOnly && !field.field_type.has_options() {
        return Err(ValidationError::UnsupportedAccessMode {
            mode: field.access_mode().to_string(),
            field_type: field.field_type.to_string(),
        });
    }

    let options = &field.attrs.options;
    if options.len() > MAX_OPTIONS {
        return Err(ValidationError::FieldTooLong {
            field: "options".to_string(),
            max_length: MAX_OPTIONS,
        });
    }

    let mut seen = HashSet::with_capacity(options.len());
    for opt in options {
        if opt.id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "options.id".to_string(),
            });
        }
        if !seen.insert(opt.id.as_str()) {
            return Err(ValidationError::DuplicateOption {
                option_id: opt.id.clone(),
            });
        }
    }

    Ok(())
}

/// Validate a value before it is written.
pub fn validate_value(value: &PropertyValue) -> Result<(), ValidationError> {
    validate_non_empty("target_id", &value.target_id, MAX_TARGET_LEN)?;
    validate_optional("target_type", &value.target_type, MAX_TARGET_LEN)?;
    Ok(())
}

/// Reject batches over the configured limit.
pub fn validate_batch_len(len: usize, max: usize) -> Result<(), ValidationError> {
    if len > max {
        return Err(ValidationError::BatchTooLarge { actual: len, max });
    }
    Ok(())
}
