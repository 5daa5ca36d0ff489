//! Rake book
//!
//! House commission records. Accounting only: nothing here touches a chip
//! balance.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::info;

use crate::core_types::{Chips, RecordId, Timestamp, UserId, now_millis};
use crate::error::LedgerError;
use crate::store::{Entity, RecordStore, Table};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RakeRecord {
    pub id: RecordId,
    pub collection_date: Timestamp,
    pub rake_amount: Chips,
    #[serde(default)]
    pub memo: String,
    pub recorded_by: UserId,
    #[serde(default)]
    pub created_at: Timestamp,
}

impl Entity for RakeRecord {
    const TABLE: Table = Table::RakeHistory;
}

#[derive(Debug, Serialize)]
struct NewRakeRecord<'a> {
    collection_date: Timestamp,
    rake_amount: Chips,
    memo: &'a str,
    recorded_by: &'a UserId,
    created_at: Timestamp,
}

/// Aggregate over the whole rake history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RakeTotals {
    pub total: Chips,
    pub records: usize,
}

pub struct RakeBook {
    store: Arc<RecordStore>,
}

impl RakeBook {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    pub async fn record_rake(
        &self,
        recorded_by: &UserId,
        amount: Chips,
        memo: &str,
    ) -> Result<RakeRecord, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::validation("rake amount must be greater than zero"));
        }
        let now = now_millis();
        let record = self
            .store
            .transaction(|doc| -> Result<RakeRecord, LedgerError> {
                Ok(doc.create::<RakeRecord>(&NewRakeRecord {
                    collection_date: now,
                    rake_amount: amount,
                    memo: memo.trim(),
                    recorded_by,
                    created_at: now,
                })?)
            })
            .await?;

        info!(rake_id = %record.id, amount, "Rake recorded");
        Ok(record)
    }

    pub async fn totals(&self) -> Result<RakeTotals, LedgerError> {
        let history = self.store.read(|doc| doc.rows::<RakeRecord>()).await??;
        Ok(RakeTotals {
            total: history
                .iter()
                .fold(0, |acc: Chips, r| acc.saturating_add(r.rake_amount)),
            records: history.len(),
        })
    }

    /// Newest collection first
    pub async fn history(&self) -> Result<Vec<RakeRecord>, LedgerError> {
        let mut history = self.store.read(|doc| doc.rows::<RakeRecord>()).await??;
        history.sort_by_key(|r| Reverse(r.collection_date));
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBackend, StoreError};
    use serde_json::json;

    #[tokio::test]
    async fn test_record_and_total() {
        let book = RakeBook::new(Arc::new(RecordStore::in_memory()));
        let admin = RecordId::from("admin");

        assert_eq!(book.totals().await.unwrap(), RakeTotals::default());

        let first = book.record_rake(&admin, 1_200, "  table 3 ").await.unwrap();
        assert_eq!(first.memo, "table 3");
        assert_eq!(first.recorded_by, admin);
        book.record_rake(&admin, 800, "").await.unwrap();

        let totals = book.totals().await.unwrap();
        assert_eq!(totals.total, 2_000);
        assert_eq!(totals.records, 2);
    }

    #[tokio::test]
    async fn test_zero_rake_rejected() {
        let book = RakeBook::new(Arc::new(RecordStore::in_memory()));
        assert!(matches!(
            book.record_rake(&RecordId::from("admin"), 0, "").await,
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(book.totals().await.unwrap().records, 0);
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let store = Arc::new(RecordStore::new(Arc::new(MemoryBackend::new())));
        store
            .transaction(|doc| -> Result<(), StoreError> {
                for (date, amount) in [(100, 1), (300, 3), (200, 2)] {
                    doc.create::<RakeRecord>(&json!({
                        "collection_date": date,
                        "rake_amount": amount,
                        "recorded_by": "admin"
                    }))?;
                }
                Ok(())
            })
            .await
            .unwrap();

        let history = RakeBook::new(store).history().await.unwrap();
        let amounts: Vec<_> = history.iter().map(|r| r.rake_amount).collect();
        assert_eq!(amounts, vec![3, 2, 1]);
    }
}
