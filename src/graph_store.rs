// 🕸️ Payment Graph Store - companies as nodes, payments as directed edges
//
// The analytics layer only talks to the `GraphStore` trait.
// `SqliteGraphStore` is the bundled backend (imported from the registry);
// `UnavailableGraphStore` stands in when the backend cannot be opened so the
// degraded path stays observable instead of crashing startup.

use crate::network::dependency::find_critical_dependencies;
use crate::registry::Registry;
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{info, warn};

// ============================================================================
// TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum GraphStoreError {
    #[error("graph store unreachable: {0}")]
    Unreachable(String),

    #[error("graph query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

/// One payment relation payer → payee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEdge {
    pub source: String,
    pub target: String,
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub date: NaiveDate,
}

/// Share of `dependent_company`'s inbound revenue coming from `key_client`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub dependent_company: String,
    pub key_client: String,
    /// 0..=1
    pub share: f64,
    /// share × 100
    pub concentration_pct: f64,
}

/// Distinct counterparties of one company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighborhood {
    pub company_id: String,
    /// Companies that paid it
    pub clients: Vec<String>,
    /// Companies it paid
    pub suppliers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportStats {
    pub companies: usize,
    pub payments: usize,
    pub skipped_payments: usize,
}

pub type StoreResult<T> = std::result::Result<T, GraphStoreError>;

// ============================================================================
// TRAIT
// ============================================================================

pub trait GraphStore: Send + Sync {
    /// All company ids, sorted
    fn nodes(&self) -> StoreResult<Vec<String>>;

    /// Largest payments first, at most `limit`
    fn edges(&self, limit: usize) -> StoreResult<Vec<PaymentEdge>>;

    /// Every payment edge
    fn all_edges(&self) -> StoreResult<Vec<PaymentEdge>>;

    /// None when the company is not a node
    fn neighborhood(&self, company_id: &str) -> StoreResult<Option<Neighborhood>>;

    /// Concentration query over the whole graph
    fn critical_dependencies(&self, threshold: f64, limit: usize) -> StoreResult<Vec<DependencyRecord>> {
        Ok(find_critical_dependencies(&self.all_edges()?, threshold, limit))
    }
}

// ============================================================================
// SQLITE BACKEND
// ============================================================================

pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn)
    }

    /// Like `open`, but a missing database file is an unreachable store
    pub fn open_existing(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            return Err(GraphStoreError::Unreachable(format!("graph database {} not found", path.display())));
        }
        Self::open(path)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        setup_schema(&conn)?;
        Ok(SqliteGraphStore { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| GraphStoreError::Unreachable("connection lock poisoned".to_string()))
    }

    /// Replace the graph with the registry contents.
    /// Payments whose payer or payee is not a registered company are skipped.
    pub fn import_registry(&self, registry: &Registry) -> StoreResult<ImportStats> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM payments", [])?;
        tx.execute("DELETE FROM companies", [])?;

        let mut known: HashSet<&str> = HashSet::new();
        for company in &registry.companies {
            if !known.insert(company.id.as_str()) {
                continue;
            }
            tx.execute(
                "INSERT INTO companies (id, opening_date, balance, sector) VALUES (?1, ?2, ?3, ?4)",
                params![
                    company.id,
                    company.opening_date.to_string(),
                    company.balance,
                    company.sector,
                ],
            )?;
        }

        let mut payments = 0;
        let mut skipped_payments = 0;
        for payment in &registry.transactions {
            if !known.contains(payment.payer_id.as_str()) || !known.contains(payment.payee_id.as_str()) {
                skipped_payments += 1;
                continue;
            }
            tx.execute(
                "INSERT INTO payments (payer, payee, value, kind, date) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    payment.payer_id,
                    payment.payee_id,
                    payment.amount,
                    payment.category,
                    payment.occurred_on.to_string(),
                ],
            )?;
            payments += 1;
        }

        tx.commit()?;

        let stats = ImportStats {
            companies: known.len(),
            payments,
            skipped_payments,
        };
        info!(
            companies = stats.companies,
            payments = stats.payments,
            skipped = stats.skipped_payments,
            "Payment graph imported"
        );
        Ok(stats)
    }

    fn query_edges(&self, limit: Option<usize>) -> StoreResult<Vec<PaymentEdge>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT payer, payee, value, kind, date
             FROM payments
             ORDER BY value DESC, id ASC
             LIMIT ?1",
        )?;

        // SQLite treats a negative LIMIT as "no limit"
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let edges = stmt
            .query_map(params![limit], |row| {
                let date: String = row.get(4)?;
                Ok(PaymentEdge {
                    source: row.get(0)?,
                    target: row.get(1)?,
                    value: row.get(2)?,
                    kind: row.get(3)?,
                    date: NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
                    })?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(edges)
    }
}

impl GraphStore for SqliteGraphStore {
    fn nodes(&self) -> StoreResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM companies ORDER BY id")?;
        let nodes = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(nodes)
    }

    fn edges(&self, limit: usize) -> StoreResult<Vec<PaymentEdge>> {
        self.query_edges(Some(limit))
    }

    fn all_edges(&self) -> StoreResult<Vec<PaymentEdge>> {
        self.query_edges(None)
    }

    fn neighborhood(&self, company_id: &str) -> StoreResult<Option<Neighborhood>> {
        let conn = self.lock()?;

        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM companies WHERE id = ?1",
            params![company_id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Ok(None);
        }

        let mut clients_stmt =
            conn.prepare("SELECT DISTINCT payer FROM payments WHERE payee = ?1 ORDER BY payer")?;
        let clients = clients_stmt
            .query_map(params![company_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        let mut suppliers_stmt =
            conn.prepare("SELECT DISTINCT payee FROM payments WHERE payer = ?1 ORDER BY payee")?;
        let suppliers = suppliers_stmt
            .query_map(params![company_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(Some(Neighborhood {
            company_id: company_id.to_string(),
            clients,
            suppliers,
        }))
    }
}

pub fn setup_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS companies (
            id TEXT PRIMARY KEY,
            opening_date TEXT NOT NULL,
            balance REAL NOT NULL,
            sector TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            payer TEXT NOT NULL REFERENCES companies(id),
            payee TEXT NOT NULL REFERENCES companies(id),
            value REAL NOT NULL,
            kind TEXT NOT NULL,
            date TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_payments_payer ON payments(payer)", [])?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_payments_payee ON payments(payee)", [])?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_payments_value ON payments(value)", [])?;

    Ok(())
}

/// Open the configured backend.
/// Without a path the graph is built in memory from the registry. Any failure
/// yields an `UnavailableGraphStore` so graph answers degrade instead of aborting.
pub fn connect_store(path: Option<&Path>, registry: &Registry) -> Arc<dyn GraphStore> {
    let opened = match path {
        Some(path) => SqliteGraphStore::open_existing(path),
        None => SqliteGraphStore::open_in_memory().and_then(|store| {
            store.import_registry(registry)?;
            Ok(store)
        }),
    };

    match opened {
        Ok(store) => Arc::new(store),
        Err(err) => {
            warn!(degraded = true, error = %err, "Graph store could not be opened");
            Arc::new(UnavailableGraphStore::new(err.to_string()))
        }
    }
}

// ============================================================================
// UNAVAILABLE BACKEND
// ============================================================================

/// Every call fails as unreachable
pub struct UnavailableGraphStore {
    reason: String,
}

impl UnavailableGraphStore {
    pub fn new(reason: impl Into<String>) -> Self {
        UnavailableGraphStore { reason: reason.into() }
    }

    fn fail<T>(&self) -> StoreResult<T> {
        Err(GraphStoreError::Unreachable(self.reason.clone()))
    }
}

impl GraphStore for UnavailableGraphStore {
    fn nodes(&self) -> StoreResult<Vec<String>> {
        self.fail()
    }

    fn edges(&self, _limit: usize) -> StoreResult<Vec<PaymentEdge>> {
        self.fail()
    }

    fn all_edges(&self) -> StoreResult<Vec<PaymentEdge>> {
        self.fail()
    }

    fn neighborhood(&self, _company_id: &str) -> StoreResult<Option<Neighborhood>> {
        self.fail()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::registry::{CompanyRecord, TransactionRecord};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn company(id: &str) -> CompanyRecord {
        CompanyRecord {
            id: id.to_string(),
            opening_date: NaiveDate::from_ymd_opt(2015, 6, 1).unwrap(),
            reference_date: date(31),
            declared_revenue: 0.0,
            balance: 10.0,
            sector: "COMERCIO".to_string(),
        }
    }

    /// B depends 80% on A; C is paid by A and B evenly
    pub(crate) fn sample_store() -> SqliteGraphStore {
        let registry = Registry::new(
            vec![company("A"), company("B"), company("C"), company("D")],
            vec![
                TransactionRecord::new("A", "B", 80.0, date(1), "PIX"),
                TransactionRecord::new("D", "B", 20.0, date(2), "TED"),
                TransactionRecord::new("A", "C", 50.0, date(3), "PIX"),
                TransactionRecord::new("B", "C", 50.0, date(4), "BOLETO"),
                TransactionRecord::new("A", "GHOST", 999.0, date(5), "PIX"),
            ],
        );

        let store = SqliteGraphStore::open_in_memory().unwrap();
        store.import_registry(&registry).unwrap();
        store
    }

    #[test]
    fn test_import_skips_unknown_endpoints() {
        let registry = Registry::new(
            vec![company("A"), company("A"), company("B")],
            vec![
                TransactionRecord::new("A", "B", 1.0, date(1), "PIX"),
                TransactionRecord::new("A", "Z", 1.0, date(1), "PIX"),
            ],
        );
        let store = SqliteGraphStore::open_in_memory().unwrap();

        let stats = store.import_registry(&registry).unwrap();

        assert_eq!(stats.companies, 2);
        assert_eq!(stats.payments, 1);
        assert_eq!(stats.skipped_payments, 1);

        // Re-import replaces instead of duplicating
        let again = store.import_registry(&registry).unwrap();
        assert_eq!(again, stats);
        assert_eq!(store.all_edges().unwrap().len(), 1);

        println!("✅ Import stats: {:?}", stats);
    }

    #[test]
    fn test_nodes_and_edges() {
        let store = sample_store();

        assert_eq!(store.nodes().unwrap(), vec!["A", "B", "C", "D"]);

        let top = store.edges(2).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].value, 80.0);
        assert_eq!(top[0].source, "A");
        assert_eq!(top[0].kind, "PIX");

        assert_eq!(store.all_edges().unwrap().len(), 4);
    }

    #[test]
    fn test_neighborhood() {
        let store = sample_store();

        let b = store.neighborhood("B").unwrap().unwrap();
        assert_eq!(b.clients, vec!["A", "D"]);
        assert_eq!(b.suppliers, vec!["C"]);

        assert!(store.neighborhood("NOPE").unwrap().is_none());
    }

    #[test]
    fn test_critical_dependencies_default_query() {
        let store = sample_store();

        let deps = store.critical_dependencies(0.7, 10).unwrap();

        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].dependent_company, "B");
        assert_eq!(deps[0].key_client, "A");
        assert!((deps[0].concentration_pct - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_connect_store_degrades_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.db");
        let registry = Registry::new(vec![company("A")], vec![]);

        let store = connect_store(Some(missing.as_path()), &registry);
        assert!(store.nodes().is_err());
        assert!(!missing.exists());

        let in_memory = connect_store(None, &registry);
        assert_eq!(in_memory.nodes().unwrap(), vec!["A"]);
    }

    #[test]
    fn test_file_store_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        let registry = Registry::new(
            vec![company("A"), company("B")],
            vec![TransactionRecord::new("A", "B", 5.0, date(1), "PIX")],
        );

        SqliteGraphStore::open(&path).unwrap().import_registry(&registry).unwrap();
        let reopened = SqliteGraphStore::open_existing(&path).unwrap();

        assert_eq!(reopened.all_edges().unwrap().len(), 1);
    }

    #[test]
    fn test_unavailable_store_always_fails() {
        let store = UnavailableGraphStore::new("connection refused");

        assert!(matches!(store.nodes(), Err(GraphStoreError::Unreachable(_))));
        assert!(store.critical_dependencies(0.7, 10).is_err());
    }
}
