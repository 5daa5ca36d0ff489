//! Request Workflow
//!
//! # State Machine
//!
//! ```text
//! deposit:          PENDING ──▶ APPROVED
//!                      └──────▶ REJECTED
//! withdraw/adjust:  created directly in APPROVED (applied synchronously)
//! ```
//!
//! Only a PENDING row may transition. Any other attempt is refused with
//! `AlreadyProcessed` and changes nothing.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::core_types::{RecordId, Timestamp, UserId};
use crate::error::LedgerError;
use crate::store::{Document, Entity, Lookup, RecordStore, StoreError, Table};

/// Request kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    /// Customer asks for chips; waits for an administrator
    Deposit,
    /// Customer cash-out, applied immediately
    Withdraw,
    /// Administrative correction, signed amount
    Adjust,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Deposit => "deposit",
            RequestType::Withdraw => "withdraw",
            RequestType::Adjust => "adjust",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request status. Terminal: APPROVED, REJECTED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Approved | RequestStatus::Rejected)
    }

    /// Allowed edges of the state machine
    #[inline]
    pub fn can_transition_to(&self, to: RequestStatus) -> bool {
        matches!(
            (self, to),
            (RequestStatus::Pending, RequestStatus::Approved)
                | (RequestStatus::Pending, RequestStatus::Rejected)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request row (also the transaction history shown to customers)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RecordId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: RequestType,
    /// Positive, except adjust rows which carry the sign of the correction
    pub amount: i64,
    pub status: RequestStatus,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl Entity for Request {
    const TABLE: Table = Table::Requests;
}

impl Request {
    /// Guarded transition. Refused rows are left untouched.
    pub fn transition(&mut self, to: RequestStatus, at: Timestamp) -> Result<(), LedgerError> {
        if !self.status.can_transition_to(to) {
            return Err(LedgerError::AlreadyProcessed(self.id.to_string()));
        }
        self.status = to;
        self.updated_at = at;
        Ok(())
    }

    pub(crate) fn save_status(&self, doc: &mut Document) -> Result<(), StoreError> {
        #[derive(Serialize)]
        struct StatusPatch {
            status: RequestStatus,
            updated_at: Timestamp,
        }

        doc.patch::<Request>(
            &self.id,
            &StatusPatch {
                status: self.status,
                updated_at: self.updated_at,
            },
        )?;
        Ok(())
    }
}

/// Insert form of `Request`
#[derive(Debug, Serialize)]
pub(crate) struct NewRequest<'a> {
    user_id: &'a UserId,
    #[serde(rename = "type")]
    kind: RequestType,
    amount: i64,
    status: RequestStatus,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl<'a> NewRequest<'a> {
    /// Deposit intent awaiting approval
    pub fn pending_deposit(user_id: &'a UserId, amount: i64, now: Timestamp) -> Self {
        Self {
            user_id,
            kind: RequestType::Deposit,
            amount,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Audit row for an operation already applied to the balance
    pub fn applied(user_id: &'a UserId, kind: RequestType, amount: i64, now: Timestamp) -> Self {
        Self {
            user_id,
            kind,
            amount,
            status: RequestStatus::Approved,
            created_at: now,
            updated_at: now,
        }
    }
}

pub(crate) fn find_request(doc: &Document, id: &RecordId) -> Result<Request, LedgerError> {
    doc.find::<Request>(Lookup::Id(id.as_str()))?
        .ok_or_else(|| LedgerError::not_found("Request", id))
}

/// Request list filter; `None` fields match everything
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub user_id: Option<UserId>,
    pub kind: Option<RequestType>,
}

impl RequestFilter {
    pub fn status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn kind(mut self, kind: RequestType) -> Self {
        self.kind = Some(kind);
        self
    }

    fn matches(&self, request: &Request) -> bool {
        self.status.is_none_or(|s| request.status == s)
            && self.kind.is_none_or(|k| request.kind == k)
            && self.user_id.as_ref().is_none_or(|u| &request.user_id == u)
    }
}

/// Read side of the request table
pub struct RequestWorkflow {
    store: Arc<RecordStore>,
}

impl RequestWorkflow {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Matching requests in store order
    pub async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, LedgerError> {
        let rows = self.store.read(|doc| doc.rows::<Request>()).await??;
        Ok(rows.into_iter().filter(|r| filter.matches(r)).collect())
    }

    /// Administrator queue: deposits still waiting, oldest first
    pub async fn pending_deposits(&self) -> Result<Vec<Request>, LedgerError> {
        let filter = RequestFilter::default()
            .status(RequestStatus::Pending)
            .kind(RequestType::Deposit);
        let pending = self.list(&filter).await?;
        debug!(count = pending.len(), "Loaded pending deposits");
        Ok(pending)
    }

    /// Customer transaction history, newest first
    pub async fn history_for(&self, user_id: &UserId) -> Result<Vec<Request>, LedgerError> {
        let mut history = self
            .list(&RequestFilter::default().user(user_id.clone()))
            .await?;
        history.sort_by_key(|r| Reverse(r.created_at));
        Ok(history)
    }
}
