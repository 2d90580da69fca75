use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{WalletError, WalletResult};

static SHARED_VALIDATOR: Lazy<InputValidator> =
    Lazy::new(|| InputValidator::new().expect("validator patterns are statically known"));

/// Input validation for user-supplied values.
///
/// Every check runs before a network call; a rejection causes no state
/// change anywhere else.
pub struct InputValidator {
    // Compiled regex patterns for performance
    amount_pattern: Regex,
    email_pattern: Regex,
}

impl InputValidator {
    pub fn new() -> WalletResult<Self> {
        let amount_pattern = Regex::new(r"^\d+(\.\d{1,6})?$")
            .map_err(|e| WalletError::ValidationError(format!("Invalid amount regex: {}", e)))?;

        let email_pattern = Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
            .map_err(|e| WalletError::ValidationError(format!("Invalid email regex: {}", e)))?;

        Ok(InputValidator {
            amount_pattern,
            email_pattern,
        })
    }

    /// Process-wide instance with pre-compiled patterns.
    pub fn shared() -> &'static InputValidator {
        &SHARED_VALIDATOR
    }

    /// Validate a user-entered amount string.
    pub fn validate_amount(&self, amount: &str) -> WalletResult<()> {
        let amount = amount.trim();

        if amount.is_empty() {
            return Err(WalletError::InvalidAmount(
                "Amount cannot be empty".to_string(),
            ));
        }

        if !self.amount_pattern.is_match(amount) {
            return Err(WalletError::InvalidAmount(
                "Amount format is invalid".to_string(),
            ));
        }

        let parsed: f64 = amount
            .parse()
            .map_err(|_| WalletError::InvalidAmount("Invalid number format".to_string()))?;

        if parsed <= 0.0 {
            return Err(WalletError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }

        if parsed > 1_000_000_000.0 {
            return Err(WalletError::InvalidAmount("Amount too large".to_string()));
        }

        Ok(())
    }

    /// Validate an email address shape.
    pub fn validate_email(&self, email: &str) -> WalletResult<()> {
        if email.is_empty() {
            return Err(WalletError::ValidationError(
                "Email cannot be empty".to_string(),
            ));
        }

        if email.len() > 254 {
            return Err(WalletError::ValidationError("Email too long".to_string()));
        }

        if !self.email_pattern.is_match(email) {
            return Err(WalletError::ValidationError(
                "Email format is invalid".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate a scanned QR payload and return the trimmed offer
    /// identifier.
    ///
    /// The payload must be the bare identifier; structured content is
    /// rejected so amount and currency are always resolved server-side.
    pub fn validate_offer_payload(&self, payload: &str) -> WalletResult<String> {
        let trimmed = payload.trim();

        if trimmed.is_empty() {
            return Err(WalletError::InvalidQrPayload(
                "QR payload is empty".to_string(),
            ));
        }

        if trimmed.len() > 512 {
            return Err(WalletError::InvalidQrPayload(
                "QR payload too long".to_string(),
            ));
        }

        if trimmed
            .chars()
            .any(|c| c.is_control() || c.is_whitespace())
        {
            return Err(WalletError::InvalidQrPayload(
                "QR payload contains unexpected characters".to_string(),
            ));
        }

        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            return Err(WalletError::InvalidQrPayload(
                "QR payload must be a bare offer identifier".to_string(),
            ));
        }

        Ok(trimmed.to_string())
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new().expect("Failed to create InputValidator")
    }
}
