//! Tournaments and prize results
//!
//! A tournament row is only a schedule entry. Prizes are paid by appending
//! `TournamentResult` rows, each one paired with a ledger credit in the same
//! transaction as all its siblings.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::account::User;
use crate::core_types::{Chips, RecordId, Timestamp, UserId, now_millis};
use crate::error::LedgerError;
use crate::ledger;
use crate::store::{Document, Entity, Lookup, RecordStore, Table};

/// Tournament status. Never auto-transitioned; expiry is derived from
/// `datetime` at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TournamentStatus {
    #[default]
    Upcoming,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: RecordId,
    pub name: String,
    /// Start time (epoch millis)
    #[serde(default)]
    pub datetime: Timestamp,
    #[serde(default)]
    pub registration_start: Option<Timestamp>,
    #[serde(default)]
    pub registration_end: Option<Timestamp>,
    /// Signed: rows written by older builds may carry negative fees
    #[serde(default)]
    pub entry_fee: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TournamentStatus,
    pub created_by: UserId,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl Entity for Tournament {
    const TABLE: Table = Table::Tournaments;
}

impl Tournament {
    /// Started before `now`. Only expired tournaments are offered for prizes.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.datetime < now
    }

    /// Registration window, when both ends are set
    pub fn registration_window(&self) -> Option<(Timestamp, Timestamp)> {
        Some((self.registration_start?, self.registration_end?))
    }
}

/// Administrator input for `add_tournament`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TournamentDraft {
    pub name: String,
    pub datetime: Option<Timestamp>,
    #[serde(default)]
    pub registration_start: Option<Timestamp>,
    #[serde(default)]
    pub registration_end: Option<Timestamp>,
    #[serde(default)]
    pub entry_fee: Chips,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize)]
struct NewTournament<'a> {
    name: &'a str,
    datetime: Timestamp,
    registration_start: Option<Timestamp>,
    registration_end: Option<Timestamp>,
    entry_fee: i64,
    description: &'a str,
    status: TournamentStatus,
    created_by: &'a UserId,
    created_at: Timestamp,
    updated_at: Timestamp,
}

/// One paid finishing position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentResult {
    pub id: RecordId,
    pub tournament_id: RecordId,
    pub user_id: UserId,
    pub position: u32,
    pub chips_won: Chips,
    #[serde(default)]
    pub created_at: Timestamp,
}

impl Entity for TournamentResult {
    const TABLE: Table = Table::TournamentResults;
}

#[derive(Debug, Serialize)]
struct NewResult<'a> {
    tournament_id: &'a RecordId,
    user_id: &'a UserId,
    position: u32,
    chips_won: Chips,
    created_at: Timestamp,
}

/// Prize distribution input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub user_id: UserId,
    pub position: u32,
    pub chips_won: Chips,
}

impl Winner {
    pub fn new(user_id: impl Into<UserId>, position: u32, chips_won: Chips) -> Self {
        Self {
            user_id: user_id.into(),
            position,
            chips_won,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingEntry {
    pub user: User,
    pub total_earnings: Chips,
}

pub struct TournamentService {
    store: Arc<RecordStore>,
}

impl TournamentService {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    pub async fn add_tournament(
        &self,
        created_by: &UserId,
        draft: TournamentDraft,
    ) -> Result<Tournament, LedgerError> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(LedgerError::validation("tournament name is required"));
        }
        let datetime = draft
            .datetime
            .ok_or_else(|| LedgerError::validation("tournament datetime is required"))?;
        let entry_fee = i64::try_from(draft.entry_fee)
            .map_err(|_| LedgerError::validation("entry fee is too large"))?;
        let now = now_millis();

        let tournament = self
            .store
            .transaction(|doc| -> Result<Tournament, LedgerError> {
                Ok(doc.create::<Tournament>(&NewTournament {
                    name,
                    datetime,
                    registration_start: draft.registration_start,
                    registration_end: draft.registration_end,
                    entry_fee,
                    description: draft.description.trim(),
                    status: TournamentStatus::Upcoming,
                    created_by,
                    created_at: now,
                    updated_at: now,
                })?)
            })
            .await?;

        info!(tournament_id = %tournament.id, name = %tournament.name, "Tournament added");
        Ok(tournament)
    }

    /// Remove a tournament row. Recorded results stay (append-only).
    pub async fn delete_tournament(&self, id: &RecordId) -> Result<bool, LedgerError> {
        let removed = self.store.remove(Table::Tournaments, id.as_str()).await?;
        if removed {
            info!(tournament_id = %id, "Tournament deleted");
        }
        Ok(removed)
    }

    /// Record results and credit every winner
    ///
    /// All-or-nothing: a failure on any winner leaves no result rows and no
    /// credits behind.
    pub async fn distribute_prizes(
        &self,
        tournament_id: &RecordId,
        winners: &[Winner],
    ) -> Result<Vec<TournamentResult>, LedgerError> {
        validate_winners(winners)?;
        let now = now_millis();

        let result = self
            .store
            .transaction(|doc| -> Result<Vec<TournamentResult>, LedgerError> {
                doc.find::<Tournament>(Lookup::Id(tournament_id.as_str()))?
                    .ok_or_else(|| LedgerError::not_found("Tournament", tournament_id))?;

                let taken: HashSet<u32> = results_of(doc, tournament_id)?
                    .into_iter()
                    .map(|r| r.position)
                    .collect();
                if let Some(w) = winners.iter().find(|w| taken.contains(&w.position)) {
                    return Err(LedgerError::validation(format!(
                        "position {} already recorded for this tournament",
                        w.position
                    )));
                }

                let mut recorded = Vec::with_capacity(winners.len());
                for winner in winners {
                    ledger::require_user(doc, &winner.user_id)?;
                    recorded.push(doc.create::<TournamentResult>(&NewResult {
                        tournament_id,
                        user_id: &winner.user_id,
                        position: winner.position,
                        chips_won: winner.chips_won,
                        created_at: now,
                    })?);
                    ledger::credit_in(doc, &winner.user_id, winner.chips_won, now)?;
                }
                Ok(recorded)
            })
            .await;

        match result {
            Ok(recorded) => {
                let total: Chips = recorded.iter().map(|r| r.chips_won).sum();
                info!(
                    tournament_id = %tournament_id,
                    winners = recorded.len(),
                    total,
                    "Prizes distributed"
                );
                Ok(recorded)
            }
            Err(e) => {
                warn!(tournament_id = %tournament_id, code = e.code(), "Prize distribution refused");
                Err(e)
            }
        }
    }

    /// Customers by summed winnings, highest first
    ///
    /// Ties keep the order in which each user first appears in the results
    /// table.
    pub async fn ranking_by_total_earnings(&self) -> Result<Vec<RankingEntry>, LedgerError> {
        let ranking = self
            .store
            .read(|doc| -> Result<Vec<RankingEntry>, LedgerError> {
                let mut index: FxHashMap<UserId, usize> = FxHashMap::default();
                let mut totals: Vec<(UserId, Chips)> = Vec::new();
                for result in doc.rows::<TournamentResult>()? {
                    match index.get(&result.user_id) {
                        Some(&i) => totals[i].1 = totals[i].1.saturating_add(result.chips_won),
                        None => {
                            index.insert(result.user_id.clone(), totals.len());
                            totals.push((result.user_id, result.chips_won));
                        }
                    }
                }

                let mut ranking = Vec::with_capacity(totals.len());
                for (user_id, total_earnings) in totals {
                    if let Some(user) = doc.find::<User>(Lookup::Id(user_id.as_str()))?
                        && user.is_customer()
                    {
                        ranking.push(RankingEntry {
                            user,
                            total_earnings,
                        });
                    }
                }
                // sort_by_key is stable
                ranking.sort_by_key(|e| Reverse(e.total_earnings));
                Ok(ranking)
            })
            .await??;

        debug!(entries = ranking.len(), "Computed earnings ranking");
        Ok(ranking)
    }

    // ============================================================
    // QUERIES
    // ============================================================

    /// Every tournament, earliest first
    pub async fn list_all(&self) -> Result<Vec<Tournament>, LedgerError> {
        let mut tournaments = self.store.read(|doc| doc.rows::<Tournament>()).await??;
        tournaments.sort_by_key(|t| t.datetime);
        Ok(tournaments)
    }

    /// Not yet started at `now`, earliest first
    pub async fn upcoming(&self, now: Timestamp) -> Result<Vec<Tournament>, LedgerError> {
        let mut tournaments = self.list_all().await?;
        tournaments.retain(|t| !t.is_expired(now));
        Ok(tournaments)
    }

    /// Started before `now`; the ones eligible for prize distribution
    pub async fn past(&self, now: Timestamp) -> Result<Vec<Tournament>, LedgerError> {
        let mut tournaments = self.list_all().await?;
        tournaments.retain(|t| t.is_expired(now));
        Ok(tournaments)
    }

    /// Recorded results of one tournament, by position
    pub async fn results_for(
        &self,
        tournament_id: &RecordId,
    ) -> Result<Vec<TournamentResult>, LedgerError> {
        let mut results = self
            .store
            .read(|doc| results_of(doc, tournament_id))
            .await??;
        results.sort_by_key(|r| r.position);
        Ok(results)
    }
}

fn results_of(doc: &Document, tournament_id: &RecordId) -> Result<Vec<TournamentResult>, LedgerError> {
    Ok(doc
        .rows::<TournamentResult>()?
        .into_iter()
        .filter(|r| &r.tournament_id == tournament_id)
        .collect())
}

fn validate_winners(winners: &[Winner]) -> Result<(), LedgerError> {
    if winners.is_empty() {
        return Err(LedgerError::validation("at least one winner is required"));
    }
    let mut positions = HashSet::with_capacity(winners.len());
    for winner in winners {
        if winner.user_id.is_blank() {
            return Err(LedgerError::validation("winner user id is required"));
        }
        if winner.chips_won == 0 {
            return Err(LedgerError::validation("chips won must be greater than zero"));
        }
        if winner.position < 1 {
            return Err(LedgerError::validation("position must be 1 or greater"));
        }
        if !positions.insert(winner.position) {
            return Err(LedgerError::validation(format!(
                "position {} listed twice",
                winner.position
            )));
        }
    }
    Ok(())
}
