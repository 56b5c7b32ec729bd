//! Key-name-driven policy checks for candidate secret values.
//!
//! Rules are cumulative. Every value must be at least 8 characters; the key
//! name then selects extra rules:
//!
//! | key name contains          | extra rule                                         |
//! |----------------------------|----------------------------------------------------|
//! | `password` or `secret`     | ≥ 12 chars, one upper, one lower, one digit        |
//! | `key` and `encryption`     | entirely hex, or entirely base64 alphabet          |
//! | `url`                      | parses as an absolute URL                          |
//!
//! Callers run this before `set_secret`; the broker only enforces it when
//! configured to.

use thiserror::Error;
use url::Url;

pub const MIN_LENGTH: usize = 8;
pub const MIN_CREDENTIAL_LENGTH: usize = 12;

/// The rule a rejected value failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationRejection {
    #[error("value must be at least {min} characters")]
    TooShort { min: usize },

    #[error("value must contain an uppercase letter, a lowercase letter and a digit")]
    WeakCredential,

    #[error("encryption keys must be hex or base64 encoded")]
    BadKeyEncoding,

    #[error("value must be a well-formed URL")]
    MalformedUrl,
}

/// Applies the policy table above.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretValidator;

impl SecretValidator {
    pub fn new() -> Self {
        Self
    }

    /// True when `value` satisfies every rule selected by `key`.
    pub fn validate(&self, key: &str, value: &str) -> bool {
        self.check(key, value).is_ok()
    }

    /// Like [`validate`](Self::validate) but names the first failed rule.
    pub fn check(&self, key: &str, value: &str) -> Result<(), ValidationRejection> {
        let name = key.to_ascii_lowercase();
        let length = value.chars().count();

        if length < MIN_LENGTH {
            return Err(ValidationRejection::TooShort { min: MIN_LENGTH });
        }

        if name.contains("password") || name.contains("secret") {
            if length < MIN_CREDENTIAL_LENGTH {
                return Err(ValidationRejection::TooShort { min: MIN_CREDENTIAL_LENGTH });
            }
            let upper = value.chars().any(|c| c.is_ascii_uppercase());
            let lower = value.chars().any(|c| c.is_ascii_lowercase());
            let digit = value.chars().any(|c| c.is_ascii_digit());
            if !(upper && lower && digit) {
                return Err(ValidationRejection::WeakCredential);
            }
        }

        if name.contains("key") && name.contains("encryption") && !(is_hex(value) || is_base64(value))
        {
            return Err(ValidationRejection::BadKeyEncoding);
        }

        if name.contains("url") && Url::parse(value).is_err() {
            return Err(ValidationRejection::MalformedUrl);
        }

        Ok(())
    }
}

fn is_hex(value: &str) -> bool {
    value.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_base64(value: &str) -> bool {
    value.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_rules() {
        let v = SecretValidator::new();
        assert!(!v.validate("db-password", "abc"));
        assert!(v.validate("db-password", "Abcdefgh1234"));
        assert_eq!(v.check("db-password", "Abcdefgh123"), Err(ValidationRejection::TooShort { min: 12 }));
        assert_eq!(v.check("jwt-secret", "abcdefgh12345"), Err(ValidationRejection::WeakCredential));
        assert_eq!(v.check("JWT_SECRET", "ABCDEFGH12345"), Err(ValidationRejection::WeakCredential));
    }

    #[test]
    fn test_encryption_key_rules() {
        let v = SecretValidator::new();
        assert!(!v.validate("encryption-key", "zz##"));
        assert!(!v.validate("encryption-key", "zz##zz##zz"));
        assert!(v.validate("encryption-key", "0123456789abcdefABCDEF"));
        assert!(v.validate("encryption-key", "q83vEjRWeJq83vEjRWeJ+/=="));
        assert!(v.validate("signing-key", "zz##zz##zz"));
    }

    #[test]
    fn test_url_rules() {
        let v = SecretValidator::new();
        assert!(!v.validate("api-url", "not a url"));
        assert!(v.validate("api-url", "https://x.test"));
        assert_eq!(v.check("database-url", "localhost:5432/app").err(), None);
        assert_eq!(v.check("database-url", "/var/run/db.sock"), Err(ValidationRejection::MalformedUrl));
    }

    #[test]
    fn test_default_length_rule() {
        let v = SecretValidator::new();
        assert!(!v.validate("feature-flag", "short"));
        assert!(v.validate("feature-flag", "long-enough"));
        assert!(!v.validate("feature-flag", ""));
    }

    #[test]
    fn test_rules_are_cumulative() {
        let v = SecretValidator::new();
        // a "secret url" must satisfy both the credential and the URL rules
        assert_eq!(v.check("secret-url", "https://x.test"), Err(ValidationRejection::WeakCredential));
        assert!(v.validate("secret-url", "https://User1.example.test"));
    }

    #[test]
    fn test_minimum_length_applies_to_url_and_key_names() {
        let v = SecretValidator::new();
        assert_eq!(v.check("api-url", "a://b"), Err(ValidationRejection::TooShort { min: MIN_LENGTH }));
        assert_eq!(v.check("encryption-key", "abcd"), Err(ValidationRejection::TooShort { min: MIN_LENGTH }));
        assert!(v.validate("api-url", "https://api.test"));
    }
}
