// 📂 Registry Loader - Company ledger + payment transactions from CSV
//
// Two tables:
//   companies:    id, dt_abrt, dt_refe, vl_fatu, vl_sldo, ds_cnae
//   transactions: id_pgto, id_rcbe, vl, dt_refe, ds_tran
//
// Missing files, missing columns and malformed rows are all surfaced as
// configuration errors. Nothing is skipped silently.

use crate::error::{AnalyticsError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

pub const COMPANY_COLUMNS: [&str; 6] = ["id", "dt_abrt", "dt_refe", "vl_fatu", "vl_sldo", "ds_cnae"];
pub const TRANSACTION_COLUMNS: [&str; 5] = ["id_pgto", "id_rcbe", "vl", "dt_refe", "ds_tran"];

// ============================================================================
// RECORDS
// ============================================================================

/// One payment between two companies. Immutable, duplicates are valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub payer_id: String,
    pub payee_id: String,
    pub amount: f64,
    pub occurred_on: NaiveDate,
    pub category: String,
}

impl TransactionRecord {
    pub fn new(payer_id: &str, payee_id: &str, amount: f64, occurred_on: NaiveDate, category: &str) -> Self {
        TransactionRecord {
            payer_id: payer_id.to_string(),
            payee_id: payee_id.to_string(),
            amount,
            occurred_on,
            category: category.to_string(),
        }
    }
}

/// One registry snapshot row for a company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub id: String,
    pub opening_date: NaiveDate,
    pub reference_date: NaiveDate,
    pub declared_revenue: f64,
    pub balance: f64,
    pub sector: String,
}

// Raw CSV shapes (column names as they appear in the ledger export)
#[derive(Debug, Deserialize)]
struct RawCompanyRow {
    id: String,
    dt_abrt: String,
    dt_refe: String,
    vl_fatu: f64,
    vl_sldo: f64,
    ds_cnae: String,
}

#[derive(Debug, Deserialize)]
struct RawTransactionRow {
    id_pgto: String,
    id_rcbe: String,
    vl: f64,
    dt_refe: String,
    ds_tran: String,
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Full company + transaction tables for one load
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    pub companies: Vec<CompanyRecord>,
    pub transactions: Vec<TransactionRecord>,
}

impl Registry {
    pub fn new(companies: Vec<CompanyRecord>, transactions: Vec<TransactionRecord>) -> Self {
        Registry { companies, transactions }
    }

    /// First registry row for each company id, in file order
    pub fn first_rows(&self) -> HashMap<&str, &CompanyRecord> {
        let mut first: HashMap<&str, &CompanyRecord> = HashMap::new();
        for company in &self.companies {
            first.entry(company.id.as_str()).or_insert(company);
        }
        first
    }

    /// Latest balance per company: max reference_date, later rows win ties
    pub fn latest_balances(&self) -> HashMap<&str, f64> {
        let mut latest: HashMap<&str, (NaiveDate, f64)> = HashMap::new();
        for company in &self.companies {
            let entry = latest
                .entry(company.id.as_str())
                .or_insert((company.reference_date, company.balance));
            if company.reference_date >= entry.0 {
                *entry = (company.reference_date, company.balance);
            }
        }
        latest.into_iter().map(|(id, (_, balance))| (id, balance)).collect()
    }

    /// Distinct sectors, sorted
    pub fn sectors(&self) -> Vec<String> {
        let mut sectors: Vec<String> = self.companies.iter().map(|c| c.sector.clone()).collect();
        sectors.sort();
        sectors.dedup();
        sectors
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Load both tables. Either failing aborts the whole load.
pub fn load_registry(companies_csv: &Path, transactions_csv: &Path) -> Result<Registry> {
    let companies = load_companies(companies_csv)?;
    let transactions = load_transactions(transactions_csv)?;

    info!(
        companies = companies.len(),
        transactions = transactions.len(),
        "Registry loaded"
    );

    Ok(Registry::new(companies, transactions))
}

pub fn load_companies(path: &Path) -> Result<Vec<CompanyRecord>> {
    let mut rdr = open_reader(path, &COMPANY_COLUMNS)?;
    let mut companies = Vec::new();

    for (index, result) in rdr.deserialize::<RawCompanyRow>().enumerate() {
        let line = index + 2;
        let row = result.map_err(|e| row_error(path, line, &e.to_string()))?;

        companies.push(CompanyRecord {
            opening_date: parse_date(&row.dt_abrt).ok_or_else(|| row_error(path, line, "bad dt_abrt"))?,
            reference_date: parse_date(&row.dt_refe).ok_or_else(|| row_error(path, line, "bad dt_refe"))?,
            id: row.id.trim().to_string(),
            declared_revenue: row.vl_fatu,
            balance: row.vl_sldo,
            sector: row.ds_cnae.trim().to_string(),
        });
    }

    Ok(companies)
}

pub fn load_transactions(path: &Path) -> Result<Vec<TransactionRecord>> {
    let mut rdr = open_reader(path, &TRANSACTION_COLUMNS)?;
    let mut transactions = Vec::new();

    for (index, result) in rdr.deserialize::<RawTransactionRow>().enumerate() {
        let line = index + 2;
        let row = result.map_err(|e| row_error(path, line, &e.to_string()))?;

        transactions.push(TransactionRecord {
            occurred_on: parse_date(&row.dt_refe).ok_or_else(|| row_error(path, line, "bad dt_refe"))?,
            payer_id: row.id_pgto.trim().to_string(),
            payee_id: row.id_rcbe.trim().to_string(),
            amount: row.vl,
            category: row.ds_tran.trim().to_string(),
        });
    }

    Ok(transactions)
}

fn open_reader(path: &Path, required: &[&str]) -> Result<csv::Reader<std::fs::File>> {
    if !path.exists() {
        return Err(AnalyticsError::configuration(format!(
            "source file not found: {}",
            path.display()
        )));
    }

    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let headers = rdr.headers()?.clone();

    for column in required {
        if !headers.iter().any(|h| h == *column) {
            return Err(AnalyticsError::configuration(format!(
                "column '{}' not found in {}",
                column,
                path.display()
            )));
        }
    }

    Ok(rdr)
}

fn row_error(path: &Path, line: usize, detail: &str) -> AnalyticsError {
    AnalyticsError::configuration(format!("{} line {}: {}", path.display(), line, detail))
}

/// Accepts ISO dates, ISO datetimes (spreadsheet exports) and dd/mm/yyyy
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok().map(|dt| dt.date()))
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").ok().map(|dt| dt.date()))
        .or_else(|| NaiveDate::parse_from_str(raw, "%d/%m/%Y").ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn company(id: &str, reference: &str, balance: f64, sector: &str) -> CompanyRecord {
        CompanyRecord {
            id: id.to_string(),
            opening_date: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
            reference_date: parse_date(reference).unwrap(),
            declared_revenue: 0.0,
            balance,
            sector: sector.to_string(),
        }
    }

    #[test]
    fn test_load_companies() {
        let file = write_csv(
            "id,dt_abrt,dt_refe,vl_fatu,vl_sldo,ds_cnae\n\
             CNPJ_1,2010-05-01,2024-01-31,1000.0,250.5,COMERCIO\n\
             CNPJ_2,2020-01-15 00:00:00,2024-01-31,500.0,-10.0,SERVICOS\n",
        );

        let companies = load_companies(file.path()).unwrap();

        assert_eq!(companies.len(), 2);
        assert_eq!(companies[0].id, "CNPJ_1");
        assert_eq!(companies[1].opening_date, NaiveDate::from_ymd_opt(2020, 1, 15).unwrap());
        assert_eq!(companies[1].balance, -10.0);
    }

    #[test]
    fn test_missing_column_is_configuration_error() {
        let file = write_csv("id_pgto,id_rcbe,vl,dt_refe\nA,B,10.0,2024-01-01\n");

        let err = load_transactions(file.path()).unwrap_err();

        assert!(err.is_configuration());
        assert!(err.to_string().contains("ds_tran"));
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = load_companies(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_malformed_amount_reports_line() {
        let file = write_csv(
            "id_pgto,id_rcbe,vl,dt_refe,ds_tran\n\
             A,B,10.0,2024-01-01,PIX\n\
             A,B,abc,2024-01-02,PIX\n",
        );

        let err = load_transactions(file.path()).unwrap_err();

        assert!(err.is_configuration());
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_latest_balance_and_first_row() {
        let registry = Registry::new(
            vec![
                company("A", "2024-01-31", 100.0, "COMERCIO"),
                company("A", "2024-03-31", 300.0, "INDUSTRIA"),
                company("A", "2024-02-29", 200.0, "SERVICOS"),
                company("B", "2024-01-31", 50.0, "SERVICOS"),
            ],
            vec![],
        );

        let balances = registry.latest_balances();
        assert_eq!(balances["A"], 300.0);
        assert_eq!(balances["B"], 50.0);

        let first = registry.first_rows();
        assert_eq!(first["A"].sector, "COMERCIO");

        assert_eq!(registry.sectors(), vec!["COMERCIO", "INDUSTRIA", "SERVICOS"]);
    }

    #[test]
    fn test_latest_balance_same_date_later_row_wins() {
        let registry = Registry::new(
            vec![
                company("A", "2024-03-31", 10.0, "COMERCIO"),
                company("A", "2024-03-31", 20.0, "COMERCIO"),
                company("A", "2024-01-31", 99.0, "COMERCIO"),
            ],
            vec![],
        );

        let balances = registry.latest_balances();

        assert_eq!(balances["A"], 20.0);
        println!("✅ Latest balance on a date tie: {}", balances["A"]);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 7, 9);
        assert_eq!(parse_date("2023-07-09"), expected);
        assert_eq!(parse_date("2023-07-09 00:00:00"), expected);
        assert_eq!(parse_date("09/07/2023"), expected);
        assert_eq!(parse_date("July 9"), None);
    }
}
