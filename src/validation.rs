use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

/// Smallest amount the payment pipeline accepts.
pub fn minimum_amount() -> BigDecimal {
    BigDecimal::new(1.into(), 8)
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    if amount < &minimum_amount() {
        return Err(ValidationError::new(
            "amount",
            "must be at least 0.00000001",
        ));
    }

    Ok(())
}

pub fn validate_future_date(field: &'static str, value: &DateTime<Utc>) -> ValidationResult {
    if value <= &Utc::now() {
        return Err(ValidationError::new(field, "must be in the future"));
    }

    Ok(())
}
