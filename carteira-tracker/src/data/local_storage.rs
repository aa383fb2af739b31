//! Local portfolio storage using SQLite.
//!
//! Persists, per user id:
//! - Holdings (one row per ticker)
//! - Allocation targets, keeping the order they were defined in

use anyhow::{Context, Result};
use carteira_common::config::StorageConfig;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::portfolio::{AllocationTargets, Holding, HoldingBook};

// ============================================================================
// Database Schema
// ============================================================================

const CREATE_TABLES_SQL: &str = r#"
-- Holdings table
CREATE TABLE IF NOT EXISTS holdings (
    user_id TEXT NOT NULL,
    ticker TEXT NOT NULL,
    quantity REAL NOT NULL,
    avg_cost REAL NOT NULL,
    asset_class TEXT NOT NULL,
    position INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, ticker)
);

CREATE INDEX IF NOT EXISTS idx_holdings_user_position
ON holdings(user_id, position);

-- Allocation targets table
CREATE TABLE IF NOT EXISTS allocation_targets (
    user_id TEXT NOT NULL,
    asset_class TEXT NOT NULL,
    target_pct REAL NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (user_id, asset_class)
);
"#;

// ============================================================================
// Local Storage
// ============================================================================

/// Local SQLite storage for holdings and targets
pub struct LocalStorage {
    /// rusqlite::Connection is Send but not Sync
    db: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl LocalStorage {
    /// Open (or create) the database at `db_path`
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(&db_path).context("Failed to open local storage database")?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to set database pragmas")?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .context("Failed to create database tables")?;

        info!(db_path = %db_path.display(), "Initialized local storage");

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    /// Open from the storage section of the configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        if !config.enabled {
            return Err(anyhow::anyhow!("Local storage is disabled"));
        }
        Self::open(config.resolved_db_path())
    }

    /// Get the database path
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ========================================================================
    // Holdings
    // ========================================================================

    /// Load a user's holdings in insertion order
    pub async fn load_holdings(&self, user_id: &str) -> Result<HoldingBook> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT ticker, quantity, avg_cost, asset_class
             FROM holdings WHERE user_id = ?1 ORDER BY position ASC",
        )?;

        let holdings = stmt
            .query_map(params![user_id], |row| {
                Ok(Holding {
                    ticker: row.get(0)?,
                    quantity: row.get(1)?,
                    avg_cost: row.get(2)?,
                    asset_class: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read holdings")?;

        Ok(HoldingBook::from(holdings))
    }

    /// Add a holding, merging into an existing position of the same ticker.
    ///
    /// Returns the stored holding.
    pub async fn add_holding(&self, user_id: &str, holding: Holding) -> Result<Holding> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;

        let existing = tx
            .query_row(
                "SELECT quantity, avg_cost, asset_class FROM holdings
                 WHERE user_id = ?1 AND ticker = ?2",
                params![user_id, holding.ticker],
                |row| {
                    Ok(Holding {
                        ticker: holding.ticker.clone(),
                        quantity: row.get(0)?,
                        avg_cost: row.get(1)?,
                        asset_class: row.get(2)?,
                    })
                },
            )
            .optional()?;

        let stored = match existing {
            Some(existing) => {
                let mut book = HoldingBook::from(vec![existing]);
                let merged = book.add(holding).clone();
                tx.execute(
                    "UPDATE holdings SET quantity = ?1, avg_cost = ?2, updated_at = ?3
                     WHERE user_id = ?4 AND ticker = ?5",
                    params![
                        merged.quantity,
                        merged.avg_cost,
                        Utc::now().to_rfc3339(),
                        user_id,
                        merged.ticker
                    ],
                )?;
                merged
            }
            None => {
                let position: i64 = tx.query_row(
                    "SELECT COALESCE(MAX(position), -1) + 1 FROM holdings WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )?;
                tx.execute(
                    "INSERT INTO holdings
                     (user_id, ticker, quantity, avg_cost, asset_class, position, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        user_id,
                        holding.ticker,
                        holding.quantity,
                        holding.avg_cost,
                        holding.asset_class,
                        position,
                        Utc::now().to_rfc3339()
                    ],
                )?;
                holding
            }
        };

        tx.commit().context("Failed to save holding")?;
        debug!(user_id, ticker = %stored.ticker, "Saved holding");
        Ok(stored)
    }

    /// Replace an existing holding. Returns false when the ticker is unknown.
    pub async fn update_holding(&self, user_id: &str, holding: &Holding) -> Result<bool> {
        let db = self.db.lock().await;
        let changed = db
            .execute(
                "UPDATE holdings SET quantity = ?1, avg_cost = ?2, asset_class = ?3, updated_at = ?4
                 WHERE user_id = ?5 AND ticker = ?6",
                params![
                    holding.quantity,
                    holding.avg_cost,
                    holding.asset_class,
                    Utc::now().to_rfc3339(),
                    user_id,
                    holding.ticker
                ],
            )
            .context("Failed to update holding")?;
        Ok(changed > 0)
    }

    /// Delete a holding. Returns false when the ticker is unknown.
    pub async fn remove_holding(&self, user_id: &str, ticker: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let changed = db
            .execute(
                "DELETE FROM holdings WHERE user_id = ?1 AND ticker = ?2",
                params![user_id, ticker.trim().to_uppercase()],
            )
            .context("Failed to delete holding")?;
        Ok(changed > 0)
    }

    // ========================================================================
    // Allocation Targets
    // ========================================================================

    /// Replace a user's targets
    pub async fn save_targets(&self, user_id: &str, targets: &AllocationTargets) -> Result<()> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;

        tx.execute(
            "DELETE FROM allocation_targets WHERE user_id = ?1",
            params![user_id],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO allocation_targets (user_id, asset_class, target_pct, position)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, target) in targets.iter().enumerate() {
                stmt.execute(params![
                    user_id,
                    target.asset_class,
                    target.target_pct,
                    position as i64
                ])?;
            }
        }

        tx.commit().context("Failed to save allocation targets")?;
        debug!(user_id, classes = targets.len(), "Saved allocation targets");
        Ok(())
    }

    /// Load a user's targets in the order they were defined
    pub async fn load_targets(&self, user_id: &str) -> Result<AllocationTargets> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT asset_class, target_pct FROM allocation_targets
             WHERE user_id = ?1 ORDER BY position ASC",
        )?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read allocation targets")?;

        Ok(rows.into_iter().collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
