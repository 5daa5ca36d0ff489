//! Users and chip accounts
//!
//! # Invariants (ENFORCED by private fields):
//! - At most one `ChipAccount` per user (`ensure_account` is the only creator)
//! - `balance` is unsigned; debits that would go below zero are refused
//! - All balance mutations go through `credit` / `debit` (checked arithmetic)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::{Chips, RecordId, Timestamp, UserId};
use crate::store::{Document, Entity, Lookup, StoreError, Table};

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// User account row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// Credential as sealed by the configured `CredentialVerifier`
    pub password: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub created_at: Timestamp,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_customer(&self) -> bool {
        self.role == Role::Customer
    }
}

impl Entity for User {
    const TABLE: Table = Table::Users;
}

/// Insert form of `User`
#[derive(Debug, Serialize)]
pub(crate) struct NewUser<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub name: &'a str,
    pub role: Role,
    pub created_at: Timestamp,
}

/// Debit refused: the account holds less than requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub requested: Chips,
    pub available: Chips,
}

/// Chip balance of one user, persisted in the `chips` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipAccount {
    id: RecordId,
    user_id: UserId,
    #[serde(default)]
    balance: Chips, // PRIVATE - ONLY modified through credit/debit
    #[serde(default)]
    created_at: Timestamp,
    #[serde(default)]
    updated_at: Timestamp,
}

impl Entity for ChipAccount {
    const TABLE: Table = Table::Chips;
}

impl ChipAccount {
    // ============================================================
    // READ-ONLY GETTERS
    // ============================================================

    #[inline]
    pub fn id(&self) -> &RecordId {
        &self.id
    }

    #[inline]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[inline]
    pub fn balance(&self) -> Chips {
        self.balance
    }

    #[inline]
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    #[inline]
    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    // ============================================================
    // VALIDATED MUTATIONS
    // ============================================================

    /// Add chips. Returns the new balance, `None` on overflow (nothing changes).
    pub fn credit(&mut self, amount: Chips, at: Timestamp) -> Option<Chips> {
        self.balance = self.balance.checked_add(amount)?;
        self.updated_at = at;
        Some(self.balance)
    }

    /// Remove chips. Refused without any change when the balance is short.
    pub fn debit(&mut self, amount: Chips, at: Timestamp) -> Result<Chips, Shortfall> {
        self.balance = self.balance.checked_sub(amount).ok_or(Shortfall {
            requested: amount,
            available: self.balance,
        })?;
        self.updated_at = at;
        Ok(self.balance)
    }

    /// Write the in-memory balance back to its row
    pub(crate) fn save(&self, doc: &mut Document) -> Result<(), StoreError> {
        #[derive(Serialize)]
        struct BalancePatch {
            balance: Chips,
            updated_at: Timestamp,
        }

        doc.patch::<ChipAccount>(
            &self.id,
            &BalancePatch {
                balance: self.balance,
                updated_at: self.updated_at,
            },
        )?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct NewChipAccount<'a> {
    user_id: &'a UserId,
    balance: Chips,
    created_at: Timestamp,
    updated_at: Timestamp,
}

/// The user's account, if one was ever created
pub(crate) fn find_account(
    doc: &Document,
    user_id: &UserId,
) -> Result<Option<ChipAccount>, StoreError> {
    doc.find::<ChipAccount>(Lookup::Where(&[("user_id", user_id.as_str())]))
}

/// Ensure-account-exists: returns the user's account, creating a zero-balance
/// one when missing. Second element reports whether a row was created.
pub(crate) fn ensure_account(
    doc: &mut Document,
    user_id: &UserId,
    now: Timestamp,
) -> Result<(ChipAccount, bool), StoreError> {
    if let Some(account) = find_account(doc, user_id)? {
        return Ok((account, false));
    }
    let account = doc.create::<ChipAccount>(&NewChipAccount {
        user_id,
        balance: 0,
        created_at: now,
        updated_at: now,
    })?;
    Ok((account, true))
}
