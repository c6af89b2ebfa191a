use std::fmt;

use bigdecimal::BigDecimal;

use crate::domain::Provider;

pub const PHONE_PREFIX: &str = "+250";
pub const PHONE_LEN: usize = 13;
pub const MIN_AMOUNT_RWF: i64 = 500;
pub const MAX_AMOUNT_RWF: i64 = 100_000;
pub const IDEMPOTENCY_KEY_MAX_LEN: usize = 255;

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

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Rwandan MSISDN in international format: `+250` followed by nine digits.
pub fn validate_phone_number(phone: &str) -> ValidationResult {
    let phone = sanitize_string(phone);
    validate_required("phone_number", &phone)?;

    if !phone.starts_with(PHONE_PREFIX) {
        return Err(ValidationError::new(
            "phone_number",
            format!("must start with {}", PHONE_PREFIX),
        ));
    }

    if phone.len() != PHONE_LEN
        || !phone[PHONE_PREFIX.len()..]
            .chars()
            .all(|ch| ch.is_ascii_digit())
    {
        return Err(ValidationError::new(
            "phone_number",
            format!("must be {} followed by nine digits", PHONE_PREFIX),
        ));
    }

    Ok(())
}

/// Warn when the number's operator prefix does not match the chosen
/// provider. Subscribers port numbers across operators, so this never
/// rejects the request.
pub fn check_provider_prefix(phone: &str, provider: Provider) {
    let expected: &[&str] = match provider {
        Provider::Mtn => &["+25078", "+25079"],
        Provider::Airtel => &["+25072", "+25073"],
        Provider::Cash => return,
    };
    if !expected.iter().any(|prefix| phone.starts_with(prefix)) {
        tracing::warn!(
            phone,
            provider = provider.as_str(),
            "phone prefix does not match the usual range for this provider"
        );
    }
}

/// Fare bounds in RWF, both ends inclusive.
pub fn validate_amount(amount: &BigDecimal) -> ValidationResult {
    if amount < &BigDecimal::from(MIN_AMOUNT_RWF) {
        return Err(ValidationError::new(
            "amount",
            format!("must be at least {} RWF", MIN_AMOUNT_RWF),
        ));
    }

    if amount > &BigDecimal::from(MAX_AMOUNT_RWF) {
        return Err(ValidationError::new(
            "amount",
            format!("must be at most {} RWF", MAX_AMOUNT_RWF),
        ));
    }

    Ok(())
}

pub fn validate_idempotency_key(key: &str) -> ValidationResult {
    validate_required("idempotency_key", key)?;
    validate_max_len("idempotency_key", key, IDEMPOTENCY_KEY_MAX_LEN)?;

    Ok(())
}
