//! Credential verification
//!
//! `login` only ever asks a verifier whether a password matches the stored
//! credential, so the storage format can change without touching callers.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::LedgerError;

/// Pluggable credential check
pub trait CredentialVerifier: Send + Sync {
    /// Scheme name for logging
    fn name(&self) -> &'static str;

    /// Value persisted in the user's `password` field
    fn seal(&self, password: &str) -> Result<String, LedgerError>;

    /// Whether `password` matches the persisted credential
    fn verify(&self, password: &str, stored: &str) -> bool;
}

/// Stores and compares passwords as-is. Compatible with existing documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextVerifier;

impl CredentialVerifier for PlaintextVerifier {
    fn name(&self) -> &'static str {
        "plaintext"
    }

    fn seal(&self, password: &str) -> Result<String, LedgerError> {
        Ok(password.to_string())
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        password == stored
    }
}

/// Argon2id PHC strings
#[derive(Default)]
pub struct Argon2Verifier {
    argon2: Argon2<'static>,
}

impl CredentialVerifier for Argon2Verifier {
    fn name(&self) -> &'static str {
        "argon2"
    }

    fn seal(&self, password: &str) -> Result<String, LedgerError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| LedgerError::Credential(format!("Hashing failed: {}", e)))
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        // Rows that are not PHC strings never verify
        match PasswordHash::new(stored) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

/// Configured credential scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CredentialScheme {
    #[default]
    Plaintext,
    Argon2,
}

impl CredentialScheme {
    pub fn verifier(&self) -> Arc<dyn CredentialVerifier> {
        match self {
            CredentialScheme::Plaintext => Arc::new(PlaintextVerifier),
            CredentialScheme::Argon2 => Arc::new(Argon2Verifier::default()),
        }
    }
}
