//! Secret material generation.
//!
//! All randomness comes from the operating system CSPRNG (`OsRng`).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::distributions::Uniform;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

use super::error::SecretsError;
use super::types::{SecretString, SecretValue};

/// Characters a generated password is drawn from.
pub const PASSWORD_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";

pub const PASSWORD_LENGTH: usize = 32;

/// Random bytes behind `key` and `token` material.
pub const RANDOM_BYTES: usize = 32;

/// What kind of material to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretKind {
    /// 32 characters from [`PASSWORD_ALPHABET`].
    Password,
    /// 32 random bytes, hex encoded.
    Key,
    /// 32 random bytes, standard base64.
    Token,
}

impl SecretKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Key => "key",
            Self::Token => "token",
        }
    }
}

impl FromStr for SecretKind {
    type Err = SecretsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(Self::Password),
            "key" => Ok(Self::Key),
            "token" => Ok(Self::Token),
            other => Err(SecretsError::invalid_value(format!(
                "unknown secret kind '{other}' (expected password, key or token)"
            ))),
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produces new secret material.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretGenerator;

impl SecretGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate material of the requested kind.
    ///
    /// `key` is accepted for audit context only; it never influences the output.
    pub fn generate(&self, key: &str, kind: SecretKind) -> SecretString {
        tracing::debug!(key = %key, kind = %kind, "Generating secret material");
        match kind {
            SecretKind::Password => Self::password(),
            SecretKind::Key => Self::with_random_bytes(|bytes| hex::encode(bytes)),
            SecretKind::Token => Self::with_random_bytes(|bytes| STANDARD.encode(bytes)),
        }
    }

    /// Compute the replacement for a rotated secret.
    ///
    /// Text values become a fresh token. Field maps keep their other fields
    /// and get a fresh token in `password` if present, otherwise in `value`.
    pub fn rotated_value(&self, key: &str, current: Option<&SecretValue>) -> SecretValue {
        let fresh = self.generate(key, SecretKind::Token).expose_secret().to_string();
        match current {
            Some(SecretValue::Fields(map)) => {
                let mut map = map.clone();
                let field = if map.contains_key("password") { "password" } else { "value" };
                map.insert(field.to_string(), serde_json::Value::String(fresh));
                SecretValue::Fields(map)
            }
            _ => SecretValue::Text(fresh),
        }
    }

    fn password() -> SecretString {
        let mut rng = OsRng;
        let dist = Uniform::from(0..PASSWORD_ALPHABET.len());
        let password: String = (0..PASSWORD_LENGTH)
            .map(|_| PASSWORD_ALPHABET[rng.sample(dist)] as char)
            .collect();
        SecretString::new(password)
    }

    fn with_random_bytes(encode: impl FnOnce(&[u8]) -> String) -> SecretString {
        let mut bytes = [0u8; RANDOM_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let encoded = encode(&bytes);
        bytes.zeroize();
        SecretString::new(encoded)
    }
}
