//! Internal helpers for model validation and conversion.

use uuid::Uuid;

use crate::{EngineError, Money, ResultEngine};

/// Parse a UUID from storage and return a labeled error on failure.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultEngine<Uuid> {
    Uuid::parse_str(value).map_err(|_| EngineError::InvalidId(format!("invalid {label} id")))
}

/// Allocation values must be strictly positive.
pub(crate) fn ensure_positive_value(value: Money) -> ResultEngine<()> {
    if value.is_positive() {
        Ok(())
    } else {
        Err(EngineError::InvalidAmount(format!(
            "allocation value must be > 0, got {value}"
        )))
    }
}

/// Trims a required free-text field.
pub(crate) fn normalize_required(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidInput(format!("{label} must not be empty")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_required_field_is_invalid_input() {
        assert_eq!(normalize_required("  alice ", "user id").unwrap(), "alice");
        assert_eq!(
            normalize_required("   ", "line code").unwrap_err(),
            EngineError::InvalidInput("line code must not be empty".to_string())
        );
    }
}
