// 💵 Cashflow Aggregator - Transactions → monthly revenue/expense per company
//
//   revenue(company, month) = Σ amounts received  (company as payee)
//   expense(company, month) = Σ amounts paid      (company as payer)
//   net_flow = revenue - expense
//   margin   = net_flow / revenue   (0 when revenue == 0)
//
// Outer join of both sides, absent side filled with 0.
// Sorted by (company_id, year_month). Re-running on the same input yields
// the same table, byte for byte (see `fingerprint`).

use crate::registry::TransactionRecord;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::info;

// ============================================================================
// YEAR-MONTH
// ============================================================================

/// Calendar month, ordered chronologically, displayed as `YYYY-MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(YearMonth { year, month })
        } else {
            None
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        YearMonth {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The following calendar month
    pub fn succ(&self) -> Self {
        if self.month == 12 {
            YearMonth { year: self.year + 1, month: 1 }
        } else {
            YearMonth { year: self.year, month: self.month + 1 }
        }
    }

    /// Last day of the month
    pub fn month_end(&self) -> NaiveDate {
        let next = self.succ();
        NaiveDate::from_ymd_opt(next.year, next.month, 1)
            .and_then(|d| d.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got '{}'", s))?;
        let year: i32 = year.parse().map_err(|_| format!("bad year in '{}'", s))?;
        let month: u32 = month.parse().map_err(|_| format!("bad month in '{}'", s))?;
        YearMonth::new(year, month).ok_or_else(|| format!("month out of range in '{}'", s))
    }
}

impl Serialize for YearMonth {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// MONTHLY ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyCashflowEntry {
    pub company_id: String,
    pub year_month: YearMonth,
    pub revenue: f64,
    pub expense: f64,
    pub net_flow: f64,
    pub margin: f64,
}

impl MonthlyCashflowEntry {
    pub fn new(company_id: &str, year_month: YearMonth, revenue: f64, expense: f64) -> Self {
        let net_flow = revenue - expense;
        MonthlyCashflowEntry {
            company_id: company_id.to_string(),
            year_month,
            revenue,
            expense,
            net_flow,
            margin: margin(net_flow, revenue),
        }
    }
}

/// net_flow / revenue, 0 when revenue is 0 (never NaN/inf)
pub fn margin(net_flow: f64, revenue: f64) -> f64 {
    if revenue == 0.0 {
        return 0.0;
    }
    let m = net_flow / revenue;
    if m.is_finite() {
        m
    } else {
        0.0
    }
}

// ============================================================================
// TABLE
// ============================================================================

/// Monthly cash-flow table, sorted by (company_id, year_month), key unique
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CashflowTable {
    entries: Vec<MonthlyCashflowEntry>,
}

impl CashflowTable {
    pub fn entries(&self) -> &[MonthlyCashflowEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All rows for one company, ordered by month
    pub fn history_for(&self, company_id: &str) -> &[MonthlyCashflowEntry] {
        let start = self
            .entries
            .partition_point(|e| e.company_id.as_str() < company_id);
        let end = self
            .entries
            .partition_point(|e| e.company_id.as_str() <= company_id);
        &self.entries[start..end]
    }

    /// Rows grouped per company (company order = table order)
    pub fn by_company(&self) -> Vec<(&str, &[MonthlyCashflowEntry])> {
        let mut groups = Vec::new();
        let mut start = 0;
        for i in 1..=self.entries.len() {
            if i == self.entries.len() || self.entries[i].company_id != self.entries[start].company_id {
                groups.push((self.entries[start].company_id.as_str(), &self.entries[start..i]));
                start = i;
            }
        }
        groups
    }

    /// SHA-256 over the canonical rows; identical tables hash identically
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for e in &self.entries {
            hasher.update(e.company_id.as_bytes());
            hasher.update([0u8]);
            hasher.update(e.year_month.to_string().as_bytes());
            for value in [e.revenue, e.expense, e.net_flow, e.margin] {
                hasher.update(value.to_bits().to_le_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// AGGREGATION
// ============================================================================

/// Collapse transactions into one row per (participant, month)
pub fn aggregate(transactions: &[TransactionRecord]) -> CashflowTable {
    // BTreeMap keeps (company, month) ordering; Σ in input order per bucket
    let mut buckets: BTreeMap<(String, YearMonth), (f64, f64)> = BTreeMap::new();

    for tx in transactions {
        let month = YearMonth::from_date(tx.occurred_on);

        buckets
            .entry((tx.payee_id.clone(), month))
            .or_insert((0.0, 0.0))
            .0 += tx.amount;

        buckets
            .entry((tx.payer_id.clone(), month))
            .or_insert((0.0, 0.0))
            .1 += tx.amount;
    }

    let entries: Vec<MonthlyCashflowEntry> = buckets
        .into_iter()
        .map(|((company_id, month), (revenue, expense))| {
            MonthlyCashflowEntry::new(&company_id, month, revenue, expense)
        })
        .collect();

    info!(
        transactions = transactions.len(),
        rows = entries.len(),
        "Monthly cash-flow aggregated"
    );

    CashflowTable { entries }
}
