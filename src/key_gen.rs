use std::{fmt, sync::Arc};

use rearch::CapsuleHandle;
use thiserror::Error;

/// Characters a [`ShortKey`] may be made of.
pub const KEY_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Number of characters in every [`ShortKey`].
pub const KEY_LENGTH: usize = 8;

pub fn key_generator_capsule(_: CapsuleHandle) -> Arc<dyn KeyGenerator> {
    Arc::new(RandomKeyGenerator)
}

pub trait KeyGenerator: Send + Sync {
    fn generate_key(&self) -> ShortKey;
}

/// Draws every character uniformly from [`KEY_ALPHABET`] using the
/// thread-local CSPRNG.
pub struct RandomKeyGenerator;

impl KeyGenerator for RandomKeyGenerator {
    fn generate_key(&self) -> ShortKey {
        let key = std::iter::repeat_with(|| {
            char::from(KEY_ALPHABET[rand::random_range(0..KEY_ALPHABET.len())])
        })
        .take(KEY_LENGTH)
        .collect();
        ShortKey(key)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShortKey(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShortKeyValidationError {
    #[error("key must be exactly {} characters long, got {actual}", KEY_LENGTH)]
    InvalidLength { actual: usize },
    #[error("key contains characters outside of A-Z0-9: {invalid_chars}")]
    InvalidCharacters { invalid_chars: String },
}

impl ShortKey {
    /// # Errors
    /// Returns [`Err`] when `key` is not [`KEY_LENGTH`] characters from [`KEY_ALPHABET`].
    pub fn new(key: String) -> Result<Self, ShortKeyValidationError> {
        let invalid_chars: String = key
            .chars()
            .filter(|c| !u8::try_from(*c).is_ok_and(|b| KEY_ALPHABET.contains(&b)))
            .collect();
        if !invalid_chars.is_empty() {
            return Err(ShortKeyValidationError::InvalidCharacters { invalid_chars });
        }

        // all chars are ascii at this point, so byte length == char count
        if key.len() != KEY_LENGTH {
            return Err(ShortKeyValidationError::InvalidLength { actual: key.len() });
        }

        Ok(Self(key))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ShortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
