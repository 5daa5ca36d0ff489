//! Chip Ledger - bootstrap binary
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │  Config  │───▶│ Logging  │───▶│  Store   │───▶│   Seed   │
//! │  (YAML)  │    │(tracing) │    │  (JSON)  │    │ + report │
//! └──────────┘    └──────────┘    └──────────┘    └──────────┘
//! ```
//!
//! Usage: `chip_ledger [--env dev] [--data ./data/chip_ledger.json]`

use anyhow::{Context, Result};

use chip_ledger::{AppConfig, ChipLedger, LedgerError, StoreError};

/// Name the data file when the persisted document cannot be read.
/// The store never resets it, so the operator has to repair or move it.
fn startup_context<T>(result: Result<T, LedgerError>, path: &str) -> Result<T> {
    match result {
        Err(e @ LedgerError::Store(StoreError::Corrupt(_))) => {
            Err(e).with_context(|| format!("persisted document at {} is corrupt", path))
        }
        other => Ok(other?),
    }
}

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Store path override from command line (--data argument)
fn get_data_override() -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--data" && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let mut app_config = AppConfig::load(&env)?;
    if let Some(path) = get_data_override() {
        app_config.store.path = path;
    }
    let _log_guard = chip_ledger::logging::init_logging(&app_config);

    tracing::info!(
        "Starting Chip Ledger {} ({}) in {} mode",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env
    );

    let ledger = ChipLedger::open(&app_config);
    let seeded = startup_context(ledger.seed_if_absent().await, &app_config.store.path)?;
    tracing::info!(
        demo_created = seeded.demo_created,
        admin_created = seeded.admin_created,
        "Seed check complete"
    );

    // ============================================================
    // SUMMARY
    // ============================================================

    let pending = ledger.pending_deposits().await?;
    let customers = ledger.customer_balances().await?;
    let in_circulation = customers
        .iter()
        .fold(0u64, |acc, c| acc.saturating_add(c.balance));
    let rake = ledger.rake_totals().await?;
    tracing::info!(
        customers = customers.len(),
        in_circulation,
        pending_deposits = pending.len(),
        rake_total = rake.total,
        rake_records = rake.records,
        "Ledger state"
    );

    for (rank, entry) in ledger.ranking().await?.iter().take(3).enumerate() {
        tracing::info!(
            "#{} {} ({} chips)",
            rank + 1,
            entry.user.name,
            entry.total_earnings
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_document_names_the_path() {
        let corrupt = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = startup_context::<()>(
            Err(LedgerError::Store(StoreError::Corrupt(corrupt))),
            "./data/ledger.json",
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "persisted document at ./data/ledger.json is corrupt"
        );
        assert!(err.downcast_ref::<LedgerError>().is_some());
    }

    #[test]
    fn test_other_errors_pass_through() {
        let err = startup_context::<()>(Err(LedgerError::Forbidden), "x").unwrap_err();
        assert_eq!(err.to_string(), LedgerError::Forbidden.to_string());
        assert_eq!(startup_context(Ok(7), "x").unwrap(), 7);
    }
}
