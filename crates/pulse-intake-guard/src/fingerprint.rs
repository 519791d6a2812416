//! Error fingerprints.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Stack lines kept for hashing and transmission.
pub const MAX_STACK_LINES: usize = 20;

/// Keep the first [`MAX_STACK_LINES`] lines of a stack trace.
pub fn normalize_stack(stack: &str) -> String {
    stack
        .lines()
        .take(MAX_STACK_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Content hash identifying "the same error".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash `(message, stack, source)`.
    ///
    /// The stack is expected to be normalized already. Fields are
    /// length-prefixed so shifting text between them changes the hash.
    pub fn compute(message: &str, stack: Option<&str>, source: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        for part in [Some(message), stack, source] {
            match part {
                Some(text) => {
                    hasher.update((text.len() as u64).to_be_bytes());
                    hasher.update(text.as_bytes());
                }
                None => hasher.update(u64::MAX.to_be_bytes()),
            }
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
