//! Ledger - chip balance mutations
//!
//! Every operation touches exactly one `ChipAccount` and runs as one store
//! transaction: the balance change and its history row commit together or
//! not at all.
//!
//! | Operation        | Balance        | History row             |
//! |------------------|----------------|-------------------------|
//! | request_deposit  | unchanged      | deposit, pending        |
//! | approve_deposit  | + amount       | deposit → approved      |
//! | reject_deposit   | unchanged      | deposit → rejected      |
//! | withdraw         | - amount       | withdraw, approved      |
//! | adjust           | ± amount       | adjust (signed), approved |
//! | credit_prize     | + chips_won    | (tournament result row) |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::account::{self, ChipAccount, User};
use crate::core_types::{Chips, RecordId, Timestamp, UserId, now_millis};
use crate::error::LedgerError;
use crate::request::{self, NewRequest, Request, RequestStatus, RequestType};
use crate::store::{Document, Lookup, RecordStore};

/// Direction of an administrative adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustDirection {
    Add,
    Subtract,
}

impl fmt::Display for AdjustDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdjustDirection::Add => write!(f, "add"),
            AdjustDirection::Subtract => write!(f, "subtract"),
        }
    }
}

impl FromStr for AdjustDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(AdjustDirection::Add),
            "subtract" => Ok(AdjustDirection::Subtract),
            _ => Err(format!("Invalid adjust direction: {}", s)),
        }
    }
}

/// A customer with the balance of their account (0 when none exists yet)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerBalance {
    pub user: User,
    pub balance: Chips,
}

pub struct LedgerService {
    store: Arc<RecordStore>,
}

impl LedgerService {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Record a deposit intent. No balance change until approval.
    pub async fn request_deposit(
        &self,
        user_id: &UserId,
        amount: Chips,
    ) -> Result<Request, LedgerError> {
        let signed = positive_amount(amount)?;
        let now = now_millis();

        let request = self
            .store
            .transaction(|doc| -> Result<Request, LedgerError> {
                require_user(doc, user_id)?;
                Ok(doc.create::<Request>(&NewRequest::pending_deposit(user_id, signed, now))?)
            })
            .await?;

        info!(request_id = %request.id, user_id = %user_id, amount, "Deposit requested");
        Ok(request)
    }

    /// Approve a pending deposit and credit the user's account
    ///
    /// # Guards (in order)
    /// 1. request exists (`NotFound`)
    /// 2. request is pending (`AlreadyProcessed`)
    /// 3. request is a deposit (`Validation`)
    pub async fn approve_deposit(&self, request_id: &RecordId) -> Result<Request, LedgerError> {
        let now = now_millis();
        let result = self
            .store
            .transaction(|doc| -> Result<(Request, Chips), LedgerError> {
                let mut request = request::find_request(doc, request_id)?;
                request.transition(RequestStatus::Approved, now)?;
                let amount = deposit_amount(&request)?;
                let balance = credit_in(doc, &request.user_id, amount, now)?;
                request.save_status(doc)?;
                Ok((request, balance))
            })
            .await;

        match result {
            Ok((request, balance)) => {
                info!(
                    request_id = %request.id,
                    user_id = %request.user_id,
                    amount = request.amount,
                    balance_after = balance,
                    "Deposit approved"
                );
                Ok(request)
            }
            Err(e) => {
                warn!(request_id = %request_id, code = e.code(), "Deposit approval refused");
                Err(e)
            }
        }
    }

    /// Reject a pending deposit. Balance untouched.
    pub async fn reject_deposit(&self, request_id: &RecordId) -> Result<Request, LedgerError> {
        let now = now_millis();
        let request = self
            .store
            .transaction(|doc| -> Result<Request, LedgerError> {
                let mut request = request::find_request(doc, request_id)?;
                request.transition(RequestStatus::Rejected, now)?;
                deposit_amount(&request)?;
                request.save_status(doc)?;
                Ok(request)
            })
            .await?;

        info!(request_id = %request.id, user_id = %request.user_id, "Deposit rejected");
        Ok(request)
    }

    /// Instant withdrawal
    ///
    /// Debit first, then the approved audit row; both land in the same
    /// document write.
    pub async fn withdraw(&self, user_id: &UserId, amount: Chips) -> Result<Request, LedgerError> {
        let signed = positive_amount(amount)?;
        let now = now_millis();

        let result = self
            .store
            .transaction(|doc| -> Result<(Request, Chips), LedgerError> {
                require_user(doc, user_id)?;
                let mut account =
                    account::find_account(doc, user_id)?.ok_or(LedgerError::InsufficientBalance {
                        requested: amount,
                        available: 0,
                    })?;
                let balance = account.debit(amount, now).map_err(|s| {
                    LedgerError::InsufficientBalance {
                        requested: s.requested,
                        available: s.available,
                    }
                })?;
                account.save(doc)?;
                let request = doc.create::<Request>(&NewRequest::applied(
                    user_id,
                    RequestType::Withdraw,
                    signed,
                    now,
                ))?;
                Ok((request, balance))
            })
            .await;

        match result {
            Ok((request, balance)) => {
                info!(user_id = %user_id, amount, balance_after = balance, "Withdrawal applied");
                Ok(request)
            }
            Err(e) => {
                warn!(user_id = %user_id, amount, code = e.code(), "Withdrawal refused");
                Err(e)
            }
        }
    }

    /// Administrative balance correction
    ///
    /// Creates the account when missing. A subtraction below zero is refused
    /// and leaves nothing behind (not even the freshly created account).
    pub async fn adjust(
        &self,
        user_id: &UserId,
        amount: Chips,
        direction: AdjustDirection,
    ) -> Result<Request, LedgerError> {
        let signed = positive_amount(amount)?;
        let now = now_millis();

        let (request, balance) = self
            .store
            .transaction(|doc| -> Result<(Request, Chips), LedgerError> {
                require_user(doc, user_id)?;
                let (mut account, _) = account::ensure_account(doc, user_id, now)?;
                let (balance, delta) = match direction {
                    AdjustDirection::Add => (credit(&mut account, amount, now)?, signed),
                    AdjustDirection::Subtract => {
                        let balance = account.debit(amount, now).map_err(|s| {
                            LedgerError::NegativeBalance {
                                requested: s.requested,
                                available: s.available,
                            }
                        })?;
                        (balance, -signed)
                    }
                };
                account.save(doc)?;
                let request = doc.create::<Request>(&NewRequest::applied(
                    user_id,
                    RequestType::Adjust,
                    delta,
                    now,
                ))?;
                Ok((request, balance))
            })
            .await?;

        info!(
            user_id = %user_id,
            %direction,
            amount,
            balance_after = balance,
            "Balance adjusted"
        );
        Ok(request)
    }

    /// Unconditional prize credit (no negative-balance rule applies)
    pub async fn credit_prize(&self, user_id: &UserId, chips_won: Chips) -> Result<Chips, LedgerError> {
        positive_amount(chips_won)?;
        let now = now_millis();
        let balance = self
            .store
            .transaction(|doc| -> Result<Chips, LedgerError> {
                require_user(doc, user_id)?;
                credit_in(doc, user_id, chips_won, now)
            })
            .await?;
        info!(user_id = %user_id, chips_won, balance_after = balance, "Prize credited");
        Ok(balance)
    }

    // ============================================================
    // QUERIES
    // ============================================================

    pub async fn account_of(&self, user_id: &UserId) -> Result<Option<ChipAccount>, LedgerError> {
        Ok(self
            .store
            .read(|doc| account::find_account(doc, user_id))
            .await??)
    }

    /// Current balance; 0 when the user has no account yet
    pub async fn balance_of(&self, user_id: &UserId) -> Result<Chips, LedgerError> {
        Ok(self
            .account_of(user_id)
            .await?
            .map(|a| a.balance())
            .unwrap_or(0))
    }

    /// Explicit ensure-account-exists step
    pub async fn ensure_account(&self, user_id: &UserId) -> Result<ChipAccount, LedgerError> {
        let now = now_millis();
        let (account, created) = self
            .store
            .transaction(|doc| -> Result<(ChipAccount, bool), LedgerError> {
                require_user(doc, user_id)?;
                Ok(account::ensure_account(doc, user_id, now)?)
            })
            .await?;
        if created {
            info!(user_id = %user_id, "Chip account created");
        }
        Ok(account)
    }

    /// Every customer with their balance, in user table order
    pub async fn customer_balances(&self) -> Result<Vec<CustomerBalance>, LedgerError> {
        let balances = self
            .store
            .read(|doc| -> Result<Vec<CustomerBalance>, LedgerError> {
                let accounts = doc.rows::<ChipAccount>()?;
                Ok(doc
                    .rows::<User>()?
                    .into_iter()
                    .filter(User::is_customer)
                    .map(|user| {
                        let balance = accounts
                            .iter()
                            .find(|a| a.user_id() == &user.id)
                            .map(ChipAccount::balance)
                            .unwrap_or(0);
                        CustomerBalance { user, balance }
                    })
                    .collect())
            })
            .await??;
        debug!(customers = balances.len(), "Loaded customer balances");
        Ok(balances)
    }
}

// ============================================================
// DOCUMENT-LEVEL PRIMITIVES (run inside a caller's transaction)
// ============================================================

/// Credit `amount` to the user's account, creating it when absent.
/// Returns the new balance.
pub(crate) fn credit_in(
    doc: &mut Document,
    user_id: &UserId,
    amount: Chips,
    now: Timestamp,
) -> Result<Chips, LedgerError> {
    let (mut account, _) = account::ensure_account(doc, user_id, now)?;
    let balance = credit(&mut account, amount, now)?;
    account.save(doc)?;
    Ok(balance)
}

pub(crate) fn require_user(doc: &Document, user_id: &UserId) -> Result<User, LedgerError> {
    doc.find::<User>(Lookup::Id(user_id.as_str()))?
        .ok_or_else(|| LedgerError::not_found("User", user_id))
}

fn credit(account: &mut ChipAccount, amount: Chips, now: Timestamp) -> Result<Chips, LedgerError> {
    account
        .credit(amount, now)
        .ok_or_else(|| LedgerError::validation("credit would overflow the balance"))
}

fn positive_amount(amount: Chips) -> Result<i64, LedgerError> {
    if amount == 0 {
        return Err(LedgerError::validation("amount must be greater than zero"));
    }
    i64::try_from(amount).map_err(|_| LedgerError::validation("amount is too large"))
}

fn deposit_amount(request: &Request) -> Result<Chips, LedgerError> {
    if request.kind != RequestType::Deposit {
        return Err(LedgerError::validation(format!(
            "request {} is a {}, not a deposit",
            request.id, request.kind
        )));
    }
    Chips::try_from(request.amount)
        .ok()
        .filter(|a| *a > 0)
        .ok_or_else(|| LedgerError::validation("deposit amount must be positive"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{NewUser, Role};
    use crate::store::{StoreError, Table};

    struct Harness {
        store: Arc<RecordStore>,
        ledger: LedgerService,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(RecordStore::in_memory());
            Self {
                ledger: LedgerService::new(store.clone()),
                store,
            }
        }

        async fn user(&self, username: &str, role: Role) -> UserId {
            self.store
                .transaction(|doc| -> Result<UserId, StoreError> {
                    let user = doc.create::<User>(&NewUser {
                        username,
                        password: "pw",
                        name: username,
                        role,
                        created_at: 1,
                    })?;
                    Ok(user.id)
                })
                .await
                .unwrap()
        }

        async fn funded(&self, username: &str, balance: Chips) -> UserId {
            let id = self.user(username, Role::Customer).await;
            if balance > 0 {
                self.ledger
                    .adjust(&id, balance, AdjustDirection::Add)
                    .await
                    .unwrap();
            }
            id
        }

        async fn balance(&self, user_id: &UserId) -> Chips {
            self.ledger.balance_of(user_id).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_deposit_approval_credits_once() {
        let h = Harness::new();
        let alice = h.funded("alice", 0).await;

        let req = h.ledger.request_deposit(&alice, 300).await.unwrap();
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(h.balance(&alice).await, 0);

        let approved = h.ledger.approve_deposit(&req.id).await.unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);
        assert_eq!(h.balance(&alice).await, 300);

        let err = h.ledger.approve_deposit(&req.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyProcessed(_)));
        assert_eq!(h.balance(&alice).await, 300);

        let err = h.ledger.reject_deposit(&req.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyProcessed(_)));
    }

    #[tokio::test]
    async fn test_approve_creates_missing_account() {
        let h = Harness::new();
        let bob = h.user("bob", Role::Customer).await;
        let req = h.ledger.request_deposit(&bob, 50).await.unwrap();
        assert!(h.ledger.account_of(&bob).await.unwrap().is_none());

        h.ledger.approve_deposit(&req.id).await.unwrap();
        assert_eq!(h.balance(&bob).await, 50);
        assert_eq!(h.store.list_all(Table::Chips).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reject_leaves_balance() {
        let h = Harness::new();
        let carol = h.funded("carol", 10).await;
        let req = h.ledger.request_deposit(&carol, 500).await.unwrap();

        let rejected = h.ledger.reject_deposit(&req.id).await.unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(h.balance(&carol).await, 10);

        assert!(matches!(
            h.ledger.approve_deposit(&req.id).await,
            Err(LedgerError::AlreadyProcessed(_))
        ));
    }

    #[tokio::test]
    async fn test_approve_unknown_request() {
        let h = Harness::new();
        let err = h
            .ledger
            .approve_deposit(&RecordId::from("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "Request", .. }));
    }

    #[tokio::test]
    async fn test_withdraw() {
        let h = Harness::new();
        let dave = h.funded("dave", 1_000).await;

        let req = h.ledger.withdraw(&dave, 400).await.unwrap();
        assert_eq!(req.kind, RequestType::Withdraw);
        assert_eq!(req.status, RequestStatus::Approved);
        assert_eq!(req.amount, 400);
        assert_eq!(h.balance(&dave).await, 600);

        let err = h.ledger.withdraw(&dave, 601).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                requested: 601,
                available: 600
            }
        ));
        assert_eq!(h.balance(&dave).await, 600);

        // Withdrawing the exact balance is allowed
        h.ledger.withdraw(&dave, 600).await.unwrap();
        assert_eq!(h.balance(&dave).await, 0);
    }

    #[tokio::test]
    async fn test_withdraw_without_account() {
        let h = Harness::new();
        let erin = h.user("erin", Role::Customer).await;
        assert!(matches!(
            h.ledger.withdraw(&erin, 1).await,
            Err(LedgerError::InsufficientBalance { available: 0, .. })
        ));
        assert!(h.store.list_all(Table::Requests).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_debits_write_nothing() {
        let h = Harness::new();
        let fay = h.funded("fay", 100).await;
        let rows_before = h.store.list_all(Table::Requests).await.unwrap().len();

        assert!(h.ledger.withdraw(&fay, 150).await.is_err());
        assert!(matches!(
            h.ledger.adjust(&fay, 150, AdjustDirection::Subtract).await,
            Err(LedgerError::NegativeBalance {
                requested: 150,
                available: 100
            })
        ));

        assert_eq!(h.balance(&fay).await, 100);
        assert_eq!(
            h.store.list_all(Table::Requests).await.unwrap().len(),
            rows_before
        );
    }

    #[tokio::test]
    async fn test_adjust_records_signed_amount() {
        let h = Harness::new();
        let gus = h.user("gus", Role::Customer).await;

        let add = h.ledger.adjust(&gus, 70, AdjustDirection::Add).await.unwrap();
        assert_eq!(add.amount, 70);
        let sub = h
            .ledger
            .adjust(&gus, 20, AdjustDirection::Subtract)
            .await
            .unwrap();
        assert_eq!(sub.amount, -20);
        assert_eq!(sub.kind, RequestType::Adjust);
        assert_eq!(sub.status, RequestStatus::Approved);
        assert_eq!(h.balance(&gus).await, 50);
    }

    #[tokio::test]
    async fn test_failed_subtract_does_not_create_account() {
        let h = Harness::new();
        let hal = h.user("hal", Role::Customer).await;
        assert!(h
            .ledger
            .adjust(&hal, 5, AdjustDirection::Subtract)
            .await
            .is_err());
        assert!(h.ledger.account_of(&hal).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_amounts_rejected() {
        let h = Harness::new();
        let ivy = h.funded("ivy", 10).await;
        for result in [
            h.ledger.request_deposit(&ivy, 0).await,
            h.ledger.withdraw(&ivy, 0).await,
            h.ledger.adjust(&ivy, 0, AdjustDirection::Add).await,
        ] {
            assert!(matches!(result, Err(LedgerError::Validation(_))));
        }
        assert!(matches!(
            h.ledger.credit_prize(&ivy, 0).await,
            Err(LedgerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let h = Harness::new();
        let ghost = RecordId::from("ghost");
        assert!(matches!(
            h.ledger.request_deposit(&ghost, 10).await,
            Err(LedgerError::NotFound { entity: "User", .. })
        ));
        assert!(matches!(
            h.ledger.adjust(&ghost, 10, AdjustDirection::Add).await,
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_credit_prize_and_overflow() {
        let h = Harness::new();
        let jay = h.user("jay", Role::Customer).await;
        assert_eq!(h.ledger.credit_prize(&jay, 500).await.unwrap(), 500);

        h.ledger
            .adjust(&jay, i64::MAX as u64 - 500, AdjustDirection::Add)
            .await
            .unwrap();
        let before = h.balance(&jay).await;
        // Requests are capped at i64::MAX, so overflow needs repeated credits
        h.ledger.credit_prize(&jay, i64::MAX as u64).await.unwrap();
        h.ledger.credit_prize(&jay, 1).await.unwrap();
        assert!(matches!(
            h.ledger.credit_prize(&jay, i64::MAX as u64).await,
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(h.balance(&jay).await, before + i64::MAX as u64 + 1);
    }

    #[tokio::test]
    async fn test_non_deposit_cannot_be_approved() {
        let h = Harness::new();
        let kim = h.user("kim", Role::Customer).await;
        let pending_adjust = h
            .store
            .transaction(|doc| -> Result<Request, StoreError> {
                doc.create::<Request>(&serde_json::json!({
                    "user_id": kim.as_str(),
                    "type": "adjust",
                    "amount": 10,
                    "status": "pending",
                    "created_at": 1,
                    "updated_at": 1
                }))
            })
            .await
            .unwrap();

        assert!(matches!(
            h.ledger.approve_deposit(&pending_adjust.id).await,
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(h.balance(&kim).await, 0);
        let row = h
            .store
            .get_one(Table::Requests, Lookup::Id(pending_adjust.id.as_str()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["status"], "pending");
    }

    #[tokio::test]
    async fn test_customer_balances() {
        let h = Harness::new();
        let a = h.funded("a", 5).await;
        let b = h.user("b", Role::Customer).await;
        h.user("admin", Role::Admin).await;

        let balances = h.ledger.customer_balances().await.unwrap();
        let summary: Vec<_> = balances.iter().map(|c| (c.user.id.clone(), c.balance)).collect();
        assert_eq!(summary, vec![(a, 5), (b, 0)]);
    }

    #[tokio::test]
    async fn test_balance_never_negative_under_mixed_operations() {
        let h = Harness::new();
        let lee = h.funded("lee", 100).await;
        let ops: [(u8, Chips); 8] = [
            (0, 30),
            (1, 200),
            (2, 50),
            (0, 150),
            (1, 70),
            (3, 25),
            (2, 500),
            (0, 1),
        ];
        let mut expected: i128 = 100;
        for (op, amount) in ops {
            let result = match op {
                0 => h.ledger.withdraw(&lee, amount).await.map(|_| ()),
                1 => h
                    .ledger
                    .adjust(&lee, amount, AdjustDirection::Subtract)
                    .await
                    .map(|_| ()),
                2 => h
                    .ledger
                    .adjust(&lee, amount, AdjustDirection::Add)
                    .await
                    .map(|_| ()),
                _ => h.ledger.credit_prize(&lee, amount).await.map(|_| ()),
            };
            match (op, result) {
                (0 | 1, Ok(())) => expected -= amount as i128,
                (_, Ok(())) => expected += amount as i128,
                (_, Err(_)) => {}
            }
            assert!(expected >= 0);
            assert_eq!(h.balance(&lee).await as i128, expected);
        }
    }
}
