//! Local SQLite cache.
//!
//! Holds three things: a category/key settings table (session profile,
//! connectivity bookkeeping), the last list payload fetched from each
//! endpoint (served when the backend is unreachable), and the per-product
//! cash-to-bank values the companion cash check needs. None of this is a
//! durable copy of backend data.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::entry::Product;
use crate::error::{LedgerError, Result};

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

pub struct LocalCache {
    conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl LocalCache {
    /// Open (or create) the cache at `{data_dir}/ledger-cache.db`.
    ///
    /// The cache is disposable: on open failure the file is deleted and
    /// opened once more.
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .map_err(|e| LedgerError::Storage(format!("create data dir: {e}")))?;

        let db_path = data_dir.join("ledger-cache.db");
        info!("Opening local cache at {}", db_path.display());

        let conn = match open_and_configure(&db_path) {
            Ok(c) => c,
            Err(first_err) => {
                warn!("Cache open failed ({first_err}), deleting and retrying once");
                let _ = fs::remove_file(&db_path);
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
                open_and_configure(&db_path)?
            }
        };
        run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// In-memory cache, for tests and hosts without a writable data dir.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| LedgerError::Storage(format!("cache lock poisoned: {e}")))
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    pub fn get_setting(&self, category: &str, key: &str) -> Option<String> {
        let conn = self.conn().ok()?;
        conn.query_row(
            "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
            params![category, key],
            |row| row.get(0),
        )
        .ok()
    }

    pub fn set_setting(&self, category: &str, key: &str, value: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(setting_category, setting_key) DO UPDATE SET
                setting_value = excluded.setting_value,
                updated_at = excluded.updated_at",
            params![category, key, value],
        )?;
        Ok(())
    }

    pub fn delete_setting(&self, category: &str, key: &str) -> Result<()> {
        self.conn()?.execute(
            "DELETE FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
            params![category, key],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // List cache
    // -----------------------------------------------------------------------

    /// Remember the latest successful response for `cache_key`.
    pub fn store_list<T: Serialize>(&self, cache_key: &str, items: &T) -> Result<()> {
        let payload = serde_json::to_string(items)?;
        self.conn()?.execute(
            "INSERT INTO list_cache (cache_key, payload, fetched_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(cache_key) DO UPDATE SET
                payload = excluded.payload,
                fetched_at = excluded.fetched_at",
            params![cache_key, payload, Utc::now().to_rfc3339()],
        )?;
        debug!(cache_key, "list cached");
        Ok(())
    }

    /// Last cached response for `cache_key`. A payload that no longer decodes
    /// is treated as missing.
    pub fn load_list<T: DeserializeOwned>(&self, cache_key: &str) -> Option<T> {
        let conn = self.conn().ok()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM list_cache WHERE cache_key = ?1",
                params![cache_key],
                |row| row.get(0),
            )
            .optional()
            .ok()
            .flatten();
        let payload = payload?;
        match serde_json::from_str(&payload) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(cache_key, error = %e, "discarding undecodable cached list");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Companion cash
    // -----------------------------------------------------------------------

    pub fn record_cash_to_bank(
        &self,
        station_id: &str,
        date: NaiveDate,
        product: Product,
        cash_to_bank: f64,
    ) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO companion_cash (station_id, entry_date, product, cash_to_bank, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(station_id, entry_date, product) DO UPDATE SET
                cash_to_bank = excluded.cash_to_bank,
                recorded_at = excluded.recorded_at",
            params![
                station_id,
                date.to_string(),
                product.as_str(),
                cash_to_bank,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn cash_to_bank(&self, station_id: &str, date: NaiveDate, product: Product) -> Option<f64> {
        let conn = self.conn().ok()?;
        conn.query_row(
            "SELECT cash_to_bank FROM companion_cash
             WHERE station_id = ?1 AND entry_date = ?2 AND product = ?3",
            params![station_id, date.to_string(), product.as_str()],
            |row| row.get(0),
        )
        .ok()
    }

    /// Drop everything tied to the signed-in user (on logout).
    pub fn clear_user_data(&self) -> Result<()> {
        self.conn()?.execute_batch(
            "BEGIN IMMEDIATE;
             DELETE FROM list_cache;
             DELETE FROM companion_cash;
             DELETE FROM local_settings WHERE setting_category = 'session';
             COMMIT;",
        )?;
        info!("local cache cleared");
        Ok(())
    }
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        debug!("Cache schema up to date (v{current})");
        return Ok(());
    }

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }
    Ok(())
}

/// Migration v1: settings and list cache.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS local_settings (
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            updated_at TEXT DEFAULT (datetime('now')),
            PRIMARY KEY (setting_category, setting_key)
        );

        CREATE TABLE IF NOT EXISTS list_cache (
            cache_key TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            fetched_at TEXT NOT NULL
        );

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        LedgerError::Storage(format!("migration v1: {e}"))
    })?;
    info!("Applied cache migration v1");
    Ok(())
}

/// Migration v2: companion cash-to-bank values.
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS companion_cash (
            station_id TEXT NOT NULL,
            entry_date TEXT NOT NULL,
            product TEXT NOT NULL,
            cash_to_bank REAL NOT NULL,
            recorded_at TEXT NOT NULL,
            PRIMARY KEY (station_id, entry_date, product)
        );

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        LedgerError::Storage(format!("migration v2: {e}"))
    })?;
    info!("Applied cache migration v2");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(cache: &LocalCache) -> Vec<String> {
        let conn = cache.conn().expect("lock");
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn migrations_create_all_tables() {
        let cache = LocalCache::in_memory().expect("open cache");
        let tables = table_names(&cache);
        for t in ["companion_cash", "list_cache", "local_settings", "schema_version"] {
            assert!(tables.contains(&t.to_string()), "missing {t}");
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let cache = LocalCache::in_memory().expect("open cache");
        let conn = cache.conn().expect("lock");
        run_migrations(&conn).expect("second run is a no-op");
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 2);
    }

    #[test]
    fn settings_upsert() {
        let cache = LocalCache::in_memory().unwrap();
        assert_eq!(cache.get_setting("session", "user"), None);
        cache.set_setting("session", "user", "a").unwrap();
        cache.set_setting("session", "user", "b").unwrap();
        assert_eq!(cache.get_setting("session", "user").as_deref(), Some("b"));
        cache.delete_setting("session", "user").unwrap();
        assert_eq!(cache.get_setting("session", "user"), None);
    }

    #[test]
    fn list_cache_keeps_latest_payload() {
        let cache = LocalCache::in_memory().unwrap();
        cache.store_list("entries?status=DRAFT", &vec![1, 2, 3]).unwrap();
        cache.store_list("entries?status=DRAFT", &vec![4]).unwrap();
        let cached: Option<Vec<i32>> = cache.load_list("entries?status=DRAFT");
        assert_eq!(cached, Some(vec![4]));

        let wrong_shape: Option<Vec<String>> = cache.load_list("entries?status=DRAFT");
        assert_eq!(wrong_shape, None);
        let missing: Option<Vec<i32>> = cache.load_list("entries");
        assert_eq!(missing, None);
    }

    #[test]
    fn companion_cash_is_keyed_by_station_day_and_product() {
        let cache = LocalCache::in_memory().unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        cache.record_cash_to_bank("st-1", day, Product::Super, 1200.5).unwrap();
        cache.record_cash_to_bank("st-1", day, Product::Super, 1300.0).unwrap();

        assert_eq!(cache.cash_to_bank("st-1", day, Product::Super), Some(1300.0));
        assert_eq!(cache.cash_to_bank("st-1", day, Product::Diesel), None);
        assert_eq!(cache.cash_to_bank("st-2", day, Product::Super), None);
        assert_eq!(cache.cash_to_bank("st-1", day.succ_opt().unwrap(), Product::Super), None);
    }

    #[test]
    fn clearing_user_data_keeps_other_settings() {
        let cache = LocalCache::in_memory().unwrap();
        cache.set_setting("session", "user", "{}").unwrap();
        cache.set_setting("connectivity", "last_online", "x").unwrap();
        cache.store_list("entries", &vec![1]).unwrap();
        cache.clear_user_data().unwrap();

        assert_eq!(cache.get_setting("session", "user"), None);
        assert_eq!(cache.get_setting("connectivity", "last_online").as_deref(), Some("x"));
        assert_eq!(cache.load_list::<Vec<i32>>("entries"), None);
    }
}
