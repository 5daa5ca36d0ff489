//! Identity: signup, login and bootstrap accounts
//!
//! The core keeps no session state. `login` hands the caller a `Session`
//! value; every command that needs an actor takes it explicitly.

pub mod credentials;

pub use credentials::{Argon2Verifier, CredentialScheme, CredentialVerifier, PlaintextVerifier};

use std::sync::Arc;
use tracing::{info, warn};

use crate::account::{self, ChipAccount, NewUser, Role, User};
use crate::config::{SeedAccount, SeedConfig};
use crate::core_types::{Timestamp, now_millis};
use crate::error::LedgerError;
use crate::store::{Document, Lookup, RecordStore};

/// Authenticated user plus the account loaded at login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub account: ChipAccount,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.user.is_admin()
    }

    /// Administrator guard for admin-only commands
    pub fn require_admin(&self) -> Result<&User, LedgerError> {
        if self.is_admin() {
            Ok(&self.user)
        } else {
            Err(LedgerError::Forbidden)
        }
    }
}

/// What `seed_if_absent` had to create
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub demo_created: bool,
    pub admin_created: bool,
}

pub struct IdentityService {
    store: Arc<RecordStore>,
    verifier: Arc<dyn CredentialVerifier>,
    seed: SeedConfig,
}

impl IdentityService {
    pub fn new(
        store: Arc<RecordStore>,
        verifier: Arc<dyn CredentialVerifier>,
        seed: SeedConfig,
    ) -> Self {
        Self {
            store,
            verifier,
            seed,
        }
    }

    /// Register a customer together with a zero-balance account
    ///
    /// # Validation
    /// - every field present (username is trimmed first)
    /// - password and confirmation equal
    /// - username without whitespace, not already taken (case-sensitive)
    pub async fn create_account(
        &self,
        username: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<User, LedgerError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() || confirm_password.is_empty() {
            return Err(LedgerError::validation("all fields are required"));
        }
        if password != confirm_password {
            return Err(LedgerError::validation("passwords do not match"));
        }
        if username.chars().any(char::is_whitespace) {
            return Err(LedgerError::validation("username must not contain whitespace"));
        }

        let sealed = self.verifier.seal(password)?;
        let now = now_millis();

        let user = self
            .store
            .transaction(|doc| -> Result<User, LedgerError> {
                if username_taken(doc, username)? {
                    return Err(LedgerError::DuplicateUsername(username.to_string()));
                }
                let user = doc.create::<User>(&NewUser {
                    username,
                    password: &sealed,
                    name: username,
                    role: Role::Customer,
                    created_at: now,
                })?;
                account::ensure_account(doc, &user.id, now)?;
                Ok(user)
            })
            .await?;

        info!(user_id = %user.id, username = %user.username, "Account created");
        Ok(user)
    }

    /// Check credentials and open a session
    ///
    /// Side effect: ensure-account-exists. Users seeded or migrated without a
    /// chip account get a zero-balance one here.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, LedgerError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(LedgerError::validation("username and password are required"));
        }

        let result = self
            .store
            .transaction(|doc| -> Result<(Session, bool), LedgerError> {
                let user = doc
                    .rows::<User>()?
                    .into_iter()
                    .find(|u| u.username == username && self.verifier.verify(password, &u.password))
                    .ok_or(LedgerError::Authentication)?;
                let (account, created) = account::ensure_account(doc, &user.id, now_millis())?;
                Ok((Session { user, account }, created))
            })
            .await;

        match result {
            Ok((session, created)) => {
                if created {
                    info!(user_id = %session.user.id, "Chip account created at login");
                }
                info!(user_id = %session.user.id, role = %session.user.role, "Login");
                Ok(session)
            }
            Err(e) => {
                warn!(username = %username, code = e.code(), "Login rejected");
                Err(e)
            }
        }
    }

    /// End a session. The core holds nothing to release; the value is consumed.
    pub fn logout(&self, session: Session) {
        info!(user_id = %session.user.id, "Logout");
    }

    /// Re-read the session's user and account
    pub async fn refresh(&self, session: &Session) -> Result<Session, LedgerError> {
        let user_id = session.user.id.clone();
        self.store
            .transaction(|doc| -> Result<Session, LedgerError> {
                let user = doc
                    .find::<User>(Lookup::Id(user_id.as_str()))?
                    .ok_or_else(|| LedgerError::not_found("User", &user_id))?;
                let (account, _) = account::ensure_account(doc, &user.id, now_millis())?;
                Ok(Session { user, account })
            })
            .await
    }

    /// Ensure the demo customer and the administrator exist
    ///
    /// Idempotent: presence is checked by username, so calling this on every
    /// start never duplicates either account.
    pub async fn seed_if_absent(&self) -> Result<SeedReport, LedgerError> {
        let demo_password = self.verifier.seal(&self.seed.demo.password)?;
        let admin_password = self.verifier.seal(&self.seed.admin.password)?;
        let now = now_millis();

        let report = self
            .store
            .transaction(|doc| -> Result<SeedReport, LedgerError> {
                let mut report = SeedReport::default();
                if let Some(user) =
                    create_if_absent(doc, &self.seed.demo, &demo_password, Role::Customer, now)?
                {
                    account::ensure_account(doc, &user.id, now)?;
                    report.demo_created = true;
                }
                report.admin_created =
                    create_if_absent(doc, &self.seed.admin, &admin_password, Role::Admin, now)?
                        .is_some();
                Ok(report)
            })
            .await?;

        if report.demo_created {
            info!(username = %self.seed.demo.username, "Demo customer created");
        }
        if report.admin_created {
            info!(username = %self.seed.admin.username, "Administrator created");
        }
        Ok(report)
    }
}

fn username_taken(doc: &Document, username: &str) -> Result<bool, LedgerError> {
    Ok(doc
        .find::<User>(Lookup::Where(&[("username", username)]))?
        .is_some())
}

fn create_if_absent(
    doc: &mut Document,
    seed: &SeedAccount,
    sealed_password: &str,
    role: Role,
    now: Timestamp,
) -> Result<Option<User>, LedgerError> {
    if username_taken(doc, &seed.username)? {
        return Ok(None);
    }
    let user = doc.create::<User>(&NewUser {
        username: &seed.username,
        password: sealed_password,
        name: &seed.name,
        role,
        created_at: now,
    })?;
    Ok(Some(user))
}
