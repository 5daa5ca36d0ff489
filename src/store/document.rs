//! In-memory form of the persisted document
//!
//! One field per table. Every table is a plain sequence of JSON objects; the
//! typed layer (`Entity`) converts rows on the way in and out.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::error::StoreError;
use crate::core_types::RecordId;

/// A stored row: a flat JSON object that always carries an `id` field
pub type Record = Map<String, Value>;

/// Named collections of the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Users,
    Chips,
    Requests,
    Tournaments,
    TournamentResults,
    RakeHistory,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Users,
        Table::Chips,
        Table::Requests,
        Table::Tournaments,
        Table::TournamentResults,
        Table::RakeHistory,
    ];

    /// Field name inside the persisted document
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Chips => "chips",
            Table::Requests => "requests",
            Table::Tournaments => "tournaments",
            Table::TournamentResults => "tournament_results",
            Table::RakeHistory => "rake_history",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown table: {}", s))
    }
}

/// How `get_one` picks a row
#[derive(Debug, Clone, Copy)]
pub enum Lookup<'a> {
    /// First row of the table
    First,
    /// Exact id match
    Id(&'a str),
    /// Conjunction of `field = value`, both sides compared as text
    Where(&'a [(&'a str, &'a str)]),
}

/// A typed view of one table's rows
pub trait Entity: Serialize + DeserializeOwned {
    const TABLE: Table;
}

/// The whole persisted state. Missing tables load as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    users: Vec<Record>,
    #[serde(default)]
    chips: Vec<Record>,
    #[serde(default)]
    requests: Vec<Record>,
    #[serde(default)]
    tournaments: Vec<Record>,
    #[serde(default)]
    tournament_results: Vec<Record>,
    #[serde(default)]
    rake_history: Vec<Record>,
    #[serde(skip)]
    dirty: bool,
}

impl Document {
    /// Whether any mutation happened since load
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn table(&self, table: Table) -> &Vec<Record> {
        match table {
            Table::Users => &self.users,
            Table::Chips => &self.chips,
            Table::Requests => &self.requests,
            Table::Tournaments => &self.tournaments,
            Table::TournamentResults => &self.tournament_results,
            Table::RakeHistory => &self.rake_history,
        }
    }

    fn table_mut(&mut self, table: Table) -> &mut Vec<Record> {
        match table {
            Table::Users => &mut self.users,
            Table::Chips => &mut self.chips,
            Table::Requests => &mut self.requests,
            Table::Tournaments => &mut self.tournaments,
            Table::TournamentResults => &mut self.tournament_results,
            Table::RakeHistory => &mut self.rake_history,
        }
    }

    // ============================================================
    // UNTYPED ROW OPERATIONS
    // ============================================================

    pub fn list_all(&self, table: Table) -> &[Record] {
        self.table(table)
    }

    /// Linear scan; first structural match wins
    pub fn get_one(&self, table: Table, lookup: Lookup<'_>) -> Option<&Record> {
        let rows = self.table(table);
        match lookup {
            Lookup::First => rows.first(),
            Lookup::Id(id) => rows.iter().find(|r| row_id(r) == Some(id)),
            Lookup::Where(filters) => rows.iter().find(|r| {
                filters
                    .iter()
                    .all(|(field, expected)| r.get(*field).is_some_and(|v| text_of(v) == *expected))
            }),
        }
    }

    /// Append a row under a freshly generated id. An `id` in `fields` is ignored.
    pub fn insert(&mut self, table: Table, fields: Record) -> Record {
        let mut record = Record::new();
        record.insert(
            "id".to_string(),
            Value::String(RecordId::generate().to_string()),
        );
        for (key, value) in fields {
            if key != "id" {
                record.insert(key, value);
            }
        }
        self.table_mut(table).push(record.clone());
        self.dirty = true;
        record
    }

    /// Shallow merge of `patch` into the row. The id itself never changes.
    pub fn update(&mut self, table: Table, id: &str, patch: Record) -> Result<Record, StoreError> {
        let row = self
            .table_mut(table)
            .iter_mut()
            .find(|r| row_id(r) == Some(id))
            .ok_or_else(|| StoreError::NotFound {
                table,
                id: id.to_string(),
            })?;
        for (key, value) in patch {
            if key != "id" {
                row.insert(key, value);
            }
        }
        let merged = row.clone();
        self.dirty = true;
        Ok(merged)
    }

    /// Returns whether a row was actually removed
    pub fn remove(&mut self, table: Table, id: &str) -> bool {
        let rows = self.table_mut(table);
        let before = rows.len();
        rows.retain(|r| row_id(r) != Some(id));
        let removed = rows.len() != before;
        if removed {
            self.dirty = true;
        }
        removed
    }

    // ============================================================
    // TYPED OPERATIONS
    // ============================================================

    pub fn rows<E: Entity>(&self) -> Result<Vec<E>, StoreError> {
        self.table(E::TABLE).iter().map(decode::<E>).collect()
    }

    pub fn find<E: Entity>(&self, lookup: Lookup<'_>) -> Result<Option<E>, StoreError> {
        self.get_one(E::TABLE, lookup).map(decode::<E>).transpose()
    }

    /// Insert `draft` (any serializable object without an id) and return the typed row
    pub fn create<E: Entity>(&mut self, draft: &impl Serialize) -> Result<E, StoreError> {
        let fields = to_record(E::TABLE, draft)?;
        let record = self.insert(E::TABLE, fields);
        decode::<E>(&record)
    }

    pub fn patch<E: Entity>(&mut self, id: &RecordId, patch: &impl Serialize) -> Result<E, StoreError> {
        let fields = to_record(E::TABLE, patch)?;
        let record = self.update(E::TABLE, id.as_str(), fields)?;
        decode::<E>(&record)
    }
}

fn row_id(record: &Record) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

/// Text form used by equality filters: strings compare by their raw text,
/// everything else by its JSON rendering (`42`, `true`, `null`).
fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn decode<E: Entity>(record: &Record) -> Result<E, StoreError> {
    serde_json::from_value(Value::Object(record.clone())).map_err(|source| StoreError::Decode {
        table: E::TABLE,
        source,
    })
}

fn to_record(table: Table, value: &impl Serialize) -> Result<Record, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotAnObject(table)),
    }
}
