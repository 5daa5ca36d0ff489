//! ChipLedger - the surface the presentation layer talks to
//!
//! Owns the store and every service. Commands take the caller's `Session`;
//! customer commands act on the session user, admin commands are refused
//! with `Forbidden` unless the session belongs to an administrator.

use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::core_types::{Chips, RecordId, Timestamp, UserId};
use crate::error::LedgerError;
use crate::identity::{IdentityService, SeedReport, Session};
use crate::ledger::{AdjustDirection, CustomerBalance, LedgerService};
use crate::rake::{RakeBook, RakeRecord, RakeTotals};
use crate::request::{Request, RequestFilter, RequestWorkflow};
use crate::store::RecordStore;
use crate::tournament::{
    RankingEntry, Tournament, TournamentDraft, TournamentResult, TournamentService, Winner,
};

pub struct ChipLedger {
    store: Arc<RecordStore>,
    identity: IdentityService,
    ledger: LedgerService,
    requests: RequestWorkflow,
    tournaments: TournamentService,
    rake: RakeBook,
}

impl ChipLedger {
    pub fn new(store: Arc<RecordStore>, config: &AppConfig) -> Self {
        Self {
            identity: IdentityService::new(
                store.clone(),
                config.credentials.verifier(),
                config.seed.clone(),
            ),
            ledger: LedgerService::new(store.clone()),
            requests: RequestWorkflow::new(store.clone()),
            tournaments: TournamentService::new(store.clone()),
            rake: RakeBook::new(store.clone()),
            store,
        }
    }

    /// File-backed ledger at `config.store.path`
    pub fn open(config: &AppConfig) -> Self {
        info!(path = %config.store.path, scheme = ?config.credentials, "Opening chip ledger");
        Self::new(Arc::new(RecordStore::open_file(&config.store.path)), config)
    }

    /// Ephemeral ledger with default settings
    pub fn in_memory() -> Self {
        Self::new(Arc::new(RecordStore::in_memory()), &AppConfig::default())
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn identity(&self) -> &IdentityService {
        &self.identity
    }

    pub fn ledger(&self) -> &LedgerService {
        &self.ledger
    }

    pub fn requests(&self) -> &RequestWorkflow {
        &self.requests
    }

    pub fn tournaments(&self) -> &TournamentService {
        &self.tournaments
    }

    pub fn rake(&self) -> &RakeBook {
        &self.rake
    }

    // ============================================================
    // SESSION
    // ============================================================

    pub async fn seed_if_absent(&self) -> Result<SeedReport, LedgerError> {
        self.identity.seed_if_absent().await
    }

    pub async fn create_account(
        &self,
        username: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<Session, LedgerError> {
        self.identity
            .create_account(username, password, confirm_password)
            .await?;
        self.identity.login(username, password).await
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session, LedgerError> {
        self.identity.login(username, password).await
    }

    pub fn logout(&self, session: Session) {
        self.identity.logout(session)
    }

    /// Fresh copy of the session's user and balance
    pub async fn refresh(&self, session: &Session) -> Result<Session, LedgerError> {
        self.identity.refresh(session).await
    }

    // ============================================================
    // CUSTOMER COMMANDS
    // ============================================================

    pub async fn request_deposit(
        &self,
        session: &Session,
        amount: Chips,
    ) -> Result<Request, LedgerError> {
        self.ledger.request_deposit(&session.user.id, amount).await
    }

    pub async fn withdraw(&self, session: &Session, amount: Chips) -> Result<Request, LedgerError> {
        self.ledger.withdraw(&session.user.id, amount).await
    }

    pub async fn my_history(&self, session: &Session) -> Result<Vec<Request>, LedgerError> {
        self.requests.history_for(&session.user.id).await
    }

    // ============================================================
    // ADMIN COMMANDS
    // ============================================================

    pub async fn approve_deposit(
        &self,
        session: &Session,
        request_id: &RecordId,
    ) -> Result<Request, LedgerError> {
        session.require_admin()?;
        self.ledger.approve_deposit(request_id).await
    }

    pub async fn reject_deposit(
        &self,
        session: &Session,
        request_id: &RecordId,
    ) -> Result<Request, LedgerError> {
        session.require_admin()?;
        self.ledger.reject_deposit(request_id).await
    }

    pub async fn adjust(
        &self,
        session: &Session,
        user_id: &UserId,
        amount: Chips,
        direction: AdjustDirection,
    ) -> Result<Request, LedgerError> {
        session.require_admin()?;
        self.ledger.adjust(user_id, amount, direction).await
    }

    pub async fn add_tournament(
        &self,
        session: &Session,
        draft: TournamentDraft,
    ) -> Result<Tournament, LedgerError> {
        let admin = session.require_admin()?;
        self.tournaments.add_tournament(&admin.id, draft).await
    }

    pub async fn delete_tournament(
        &self,
        session: &Session,
        tournament_id: &RecordId,
    ) -> Result<bool, LedgerError> {
        session.require_admin()?;
        self.tournaments.delete_tournament(tournament_id).await
    }

    pub async fn distribute_prizes(
        &self,
        session: &Session,
        tournament_id: &RecordId,
        winners: &[Winner],
    ) -> Result<Vec<TournamentResult>, LedgerError> {
        session.require_admin()?;
        self.tournaments
            .distribute_prizes(tournament_id, winners)
            .await
    }

    pub async fn record_rake(
        &self,
        session: &Session,
        amount: Chips,
        memo: &str,
    ) -> Result<RakeRecord, LedgerError> {
        let admin = session.require_admin()?;
        self.rake.record_rake(&admin.id, amount, memo).await
    }

    // ============================================================
    // QUERIES
    // ============================================================

    pub async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<Request>, LedgerError> {
        self.requests.list(filter).await
    }

    pub async fn pending_deposits(&self) -> Result<Vec<Request>, LedgerError> {
        self.requests.pending_deposits().await
    }

    pub async fn customer_balances(&self) -> Result<Vec<CustomerBalance>, LedgerError> {
        self.ledger.customer_balances().await
    }

    pub async fn list_tournaments(&self) -> Result<Vec<Tournament>, LedgerError> {
        self.tournaments.list_all().await
    }

    pub async fn upcoming_tournaments(&self, now: Timestamp) -> Result<Vec<Tournament>, LedgerError> {
        self.tournaments.upcoming(now).await
    }

    pub async fn past_tournaments(&self, now: Timestamp) -> Result<Vec<Tournament>, LedgerError> {
        self.tournaments.past(now).await
    }

    pub async fn results_for(
        &self,
        tournament_id: &RecordId,
    ) -> Result<Vec<TournamentResult>, LedgerError> {
        self.tournaments.results_for(tournament_id).await
    }

    pub async fn ranking(&self) -> Result<Vec<RankingEntry>, LedgerError> {
        self.tournaments.ranking_by_total_earnings().await
    }

    pub async fn rake_totals(&self) -> Result<RakeTotals, LedgerError> {
        self.rake.totals().await
    }

    pub async fn rake_history(&self) -> Result<Vec<RakeRecord>, LedgerError> {
        self.rake.history().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (ChipLedger, Session, Session) {
        let app = ChipLedger::in_memory();
        app.seed_if_absent().await.unwrap();
        let customer = app.login("testuser1", "test123").await.unwrap();
        let admin = app.login("RR管理者", "rr1106").await.unwrap();
        (app, customer, admin)
    }

    #[tokio::test]
    async fn test_customer_cannot_run_admin_commands() {
        let (app, customer, _) = seeded().await;
        let req = app.request_deposit(&customer, 100).await.unwrap();

        assert!(matches!(
            app.approve_deposit(&customer, &req.id).await,
            Err(LedgerError::Forbidden)
        ));
        assert!(matches!(
            app.adjust(&customer, &customer.user.id, 10, AdjustDirection::Add)
                .await,
            Err(LedgerError::Forbidden)
        ));
        assert!(matches!(
            app.record_rake(&customer, 10, "").await,
            Err(LedgerError::Forbidden)
        ));
        assert!(matches!(
            app.add_tournament(&customer, TournamentDraft::default()).await,
            Err(LedgerError::Forbidden)
        ));
        assert_eq!(app.pending_deposits().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_admin_approval_visible_after_refresh() {
        let (app, customer, admin) = seeded().await;
        let req = app.request_deposit(&customer, 250).await.unwrap();
        app.approve_deposit(&admin, &req.id).await.unwrap();

        assert_eq!(customer.account.balance(), 0);
        let refreshed = app.refresh(&customer).await.unwrap();
        assert_eq!(refreshed.account.balance(), 250);
    }

    #[tokio::test]
    async fn test_record_rake_uses_admin_id() {
        let (app, _, admin) = seeded().await;
        let record = app.record_rake(&admin, 5_000, "cash game").await.unwrap();
        assert_eq!(record.recorded_by, admin.user.id);
        assert_eq!(app.rake_totals().await.unwrap().total, 5_000);
    }

    #[tokio::test]
    async fn test_tournament_schedule_queries() {
        let (app, _, admin) = seeded().await;
        for (name, datetime) in [("late", 3_000), ("early", 1_000)] {
            app.add_tournament(
                &admin,
                TournamentDraft {
                    name: name.into(),
                    datetime: Some(datetime),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let all: Vec<_> = app
            .list_tournaments()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(all, vec!["early", "late"]);
        assert_eq!(app.tournaments().list_all().await.unwrap().len(), 2);
        assert_eq!(app.upcoming_tournaments(2_000).await.unwrap().len(), 1);
        assert_eq!(app.past_tournaments(2_000).await.unwrap()[0].name, "early");
    }

    #[tokio::test]
    async fn test_signup_opens_session() {
        let app = ChipLedger::in_memory();
        let session = app.create_account("newbie", "pw", "pw").await.unwrap();
        assert!(!session.is_admin());
        assert_eq!(session.account.balance(), 0);
        app.logout(session);
    }
}
