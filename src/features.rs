// 🧮 Feature Profiler - Trailing-window financial features per company
//
// Per company, over its monthly rows ordered by month:
//   revenue_avg_6m / expense_avg_6m / margin_avg_6m  mean of the last 6 rows
//   revenue_volatility                               sample std dev of the last 6 revenues
//   revenue_growth_3m                                least-squares slope of the last 3 revenues
//   age_years                                        (reference_date - opening_date) / 365.25
//
// Every feature column goes through the same non-finite → 0 sanitizer.

use crate::cashflow::{CashflowTable, MonthlyCashflowEntry};
use crate::forecast::trend_slope;
use crate::registry::Registry;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::info;

pub const TRAILING_WINDOW: usize = 6;
pub const GROWTH_WINDOW: usize = 3;
pub const DAYS_PER_YEAR: f64 = 365.25;

/// Sector assigned to participants that never appear in the registry
pub const UNKNOWN_SECTOR: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyFeatures {
    pub company_id: String,
    pub sector: String,
    pub age_years: f64,
    pub revenue_avg_6m: f64,
    pub expense_avg_6m: f64,
    pub revenue_growth_3m: f64,
    pub margin_avg_6m: f64,
    pub revenue_volatility: f64,
}

impl CompanyFeatures {
    /// Clustering input: age, revenue, expense, growth, margin, volatility
    pub fn vector(&self) -> [f64; 6] {
        [
            self.age_years,
            self.revenue_avg_6m,
            self.expense_avg_6m,
            self.revenue_growth_3m,
            self.margin_avg_6m,
            self.revenue_volatility,
        ]
    }

    fn sanitized(mut self) -> Self {
        self.age_years = finite_or_zero(self.age_years);
        self.revenue_avg_6m = finite_or_zero(self.revenue_avg_6m);
        self.expense_avg_6m = finite_or_zero(self.expense_avg_6m);
        self.revenue_growth_3m = finite_or_zero(self.revenue_growth_3m);
        self.margin_avg_6m = finite_or_zero(self.margin_avg_6m);
        self.revenue_volatility = finite_or_zero(self.revenue_volatility);
        self
    }
}

pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Build one feature row per company (registry ∪ cash-flow participants), sorted by id
pub fn build_features(
    cashflow: &CashflowTable,
    registry: &Registry,
    reference_date: NaiveDate,
) -> Vec<CompanyFeatures> {
    let first_rows = registry.first_rows();

    let mut histories: BTreeMap<&str, &[MonthlyCashflowEntry]> = BTreeMap::new();
    for company in &registry.companies {
        histories.insert(company.id.as_str(), &[]);
    }
    for (company_id, rows) in cashflow.by_company() {
        histories.insert(company_id, rows);
    }

    let features: Vec<CompanyFeatures> = histories
        .into_iter()
        .map(|(company_id, rows)| {
            let (sector, age_years) = match first_rows.get(company_id) {
                Some(record) => (
                    record.sector.clone(),
                    (reference_date - record.opening_date).num_days() as f64 / DAYS_PER_YEAR,
                ),
                None => (UNKNOWN_SECTOR.to_string(), 0.0),
            };

            let window = tail(rows, TRAILING_WINDOW);
            let revenues: Vec<f64> = window.iter().map(|e| e.revenue).collect();
            let expenses: Vec<f64> = window.iter().map(|e| e.expense).collect();
            let margins: Vec<f64> = window.iter().map(|e| e.margin).collect();
            let growth: Vec<f64> = tail(rows, GROWTH_WINDOW).iter().map(|e| e.revenue).collect();

            CompanyFeatures {
                company_id: company_id.to_string(),
                sector,
                age_years,
                revenue_avg_6m: mean(&revenues),
                expense_avg_6m: mean(&expenses),
                revenue_growth_3m: trend_slope(&growth),
                margin_avg_6m: mean(&margins),
                revenue_volatility: sample_std_dev(&revenues),
            }
            .sanitized()
        })
        .collect();

    info!(companies = features.len(), %reference_date, "Company features built");
    features
}

fn tail<T>(rows: &[T], n: usize) -> &[T] {
    &rows[rows.len().saturating_sub(n)..]
}

/// Arithmetic mean, 0 for an empty window
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().mean()
}

/// Sample (n-1) standard deviation, 0 below 2 points
fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().std_dev()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cashflow::aggregate;
    use crate::registry::{CompanyRecord, TransactionRecord};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn company(id: &str, opened: NaiveDate, sector: &str) -> CompanyRecord {
        CompanyRecord {
            id: id.to_string(),
            opening_date: opened,
            reference_date: date(2024, 1, 31),
            declared_revenue: 0.0,
            balance: 0.0,
            sector: sector.to_string(),
        }
    }

    fn monthly_payments(payer: &str, payee: &str, amounts: &[f64]) -> Vec<TransactionRecord> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| {
                TransactionRecord::new(payer, payee, *amount, date(2023, 1 + i as u32, 15), "PIX")
            })
            .collect()
    }

    fn find<'a>(features: &'a [CompanyFeatures], id: &str) -> &'a CompanyFeatures {
        features.iter().find(|f| f.company_id == id).unwrap()
    }

    #[test]
    fn test_growth_slope_example() {
        let transactions = monthly_payments("P", "X", &[100.0, 200.0, 300.0]);
        let registry = Registry::new(vec![company("X", date(2020, 1, 1), "COMERCIO")], transactions.clone());

        let features = build_features(&aggregate(&transactions), &registry, date(2024, 1, 1));
        let x = find(&features, "X");

        assert!((x.revenue_growth_3m - 100.0).abs() < 1e-9);
        assert!((x.revenue_avg_6m - 200.0).abs() < 1e-9);
        assert!((x.revenue_volatility - 100.0).abs() < 1e-9);
        assert_eq!(x.margin_avg_6m, 1.0);
        assert_eq!(x.sector, "COMERCIO");

        println!("✅ Growth slope: {:.2}", x.revenue_growth_3m);
    }

    #[test]
    fn test_trailing_window_uses_last_six() {
        let amounts: Vec<f64> = (1..=9).map(|i| i as f64 * 10.0).collect();
        let transactions = monthly_payments("P", "X", &amounts);
        let registry = Registry::new(vec![], transactions.clone());

        let features = build_features(&aggregate(&transactions), &registry, date(2024, 1, 1));
        let x = find(&features, "X");

        // last six: 40..90
        assert!((x.revenue_avg_6m - 65.0).abs() < 1e-9);
        // last three: 70, 80, 90
        assert!((x.revenue_growth_3m - 10.0).abs() < 1e-9);
        assert_eq!(x.sector, UNKNOWN_SECTOR);
        assert_eq!(x.age_years, 0.0);
    }

    #[test]
    fn test_single_point_is_zero_filled() {
        let transactions = monthly_payments("P", "X", &[500.0]);
        let registry = Registry::new(vec![], transactions.clone());

        let features = build_features(&aggregate(&transactions), &registry, date(2024, 1, 1));
        let x = find(&features, "X");

        assert_eq!(x.revenue_volatility, 0.0);
        assert_eq!(x.revenue_growth_3m, 0.0);
        for value in x.vector() {
            assert!(value.is_finite());
        }
    }

    #[test]
    fn test_registry_company_without_history_gets_profile() {
        let registry = Registry::new(vec![company("QUIET", date(2014, 1, 1), "SERVICOS")], vec![]);

        let features = build_features(&CashflowTable::default(), &registry, date(2024, 1, 1));

        assert_eq!(features.len(), 1);
        let quiet = &features[0];
        assert_eq!(quiet.revenue_avg_6m, 0.0);
        assert_eq!(quiet.revenue_volatility, 0.0);
        assert!((quiet.age_years - 3652.0 / DAYS_PER_YEAR).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_registry_rows_take_first_sector() {
        let registry = Registry::new(
            vec![
                company("A", date(2019, 1, 1), "COMERCIO"),
                company("A", date(2000, 1, 1), "INDUSTRIA"),
            ],
            vec![],
        );

        let features = build_features(&CashflowTable::default(), &registry, date(2024, 1, 1));

        assert_eq!(features.len(), 1);
        assert_eq!(features[0].sector, "COMERCIO");
    }

    #[test]
    fn test_sanitizer_replaces_non_finite() {
        assert_eq!(finite_or_zero(f64::NAN), 0.0);
        assert_eq!(finite_or_zero(f64::INFINITY), 0.0);
        assert_eq!(finite_or_zero(f64::NEG_INFINITY), 0.0);
        assert_eq!(finite_or_zero(-3.5), -3.5);
    }
}
