// 📈 Trend / Forecast Engine - Linear trend per metric, N months ahead
//
// For revenue and expense independently:
//   < 2 points  → flat repetition of the last value (0 without history)
//   otherwise   → least-squares line over indices 0..n-1, extrapolated n..n+N-1
//
// net_flow is ALWAYS forecast_revenue - forecast_expense (never fitted on its own).

use crate::cashflow::{MonthlyCashflowEntry, YearMonth};
use crate::error::{AnalyticsError, Result};
use crate::snapshot::Snapshot;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const MAX_HORIZON: u32 = 24;
pub const DEFAULT_HORIZON: u32 = 6;

// ============================================================================
// LINEAR TREND
// ============================================================================

/// y = intercept + slope * x, fitted over x = 0..n-1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearTrend {
    /// Ordinary least squares over index positions. None for fewer than 2 points.
    pub fn fit(values: &[f64]) -> Option<LinearTrend> {
        let n = values.len();
        if n < 2 {
            return None;
        }

        let n_f = n as f64;
        let mean_x = (n_f - 1.0) / 2.0;
        let mean_y = values.iter().sum::<f64>() / n_f;

        let mut sxy = 0.0;
        let mut sxx = 0.0;
        for (i, y) in values.iter().enumerate() {
            let dx = i as f64 - mean_x;
            sxy += dx * (y - mean_y);
            sxx += dx * dx;
        }

        let slope = sxy / sxx;
        Some(LinearTrend {
            slope,
            intercept: mean_y - slope * mean_x,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Slope of the least-squares line, 0 when it cannot be fitted
pub fn trend_slope(values: &[f64]) -> f64 {
    LinearTrend::fit(values).map(|t| t.slope).unwrap_or(0.0)
}

/// Next `horizon` values of a series
pub fn extrapolate(values: &[f64], horizon: usize) -> Vec<f64> {
    match LinearTrend::fit(values) {
        Some(trend) => {
            let n = values.len();
            (n..n + horizon).map(|x| trend.predict(x as f64)).collect()
        }
        None => {
            let last = values.last().copied().unwrap_or(0.0);
            vec![last; horizon]
        }
    }
}

// ============================================================================
// HORIZON
// ============================================================================

/// Forecast horizon in months, always within 1..=24
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon(u32);

impl Horizon {
    pub fn new(months: u32) -> Result<Self> {
        if (1..=MAX_HORIZON).contains(&months) {
            Ok(Horizon(months))
        } else {
            Err(AnalyticsError::InvalidParameter(format!(
                "horizon must be between 1 and {} months, got {}",
                MAX_HORIZON, months
            )))
        }
    }

    pub fn months(&self) -> u32 {
        self.0
    }
}

impl Default for Horizon {
    fn default() -> Self {
        Horizon(DEFAULT_HORIZON)
    }
}

// ============================================================================
// RESULT TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub year_month: YearMonth,
    /// Last day of `year_month`
    pub period_end: NaiveDate,
    pub revenue: f64,
    pub expense: f64,
    pub net_flow: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub total_revenue: f64,
    pub total_expense: f64,
    pub total_net_flow: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub company_id: String,
    pub horizon: u32,
    pub historical: Vec<MonthlyCashflowEntry>,
    pub forecast: Vec<ForecastEntry>,
    pub summary: ForecastSummary,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Forecast from an explicit history (rows for one company, ordered by month)
pub fn forecast_history(
    company_id: &str,
    history: &[MonthlyCashflowEntry],
    horizon: Horizon,
) -> Result<ForecastResult> {
    let last_month = history
        .last()
        .map(|e| e.year_month)
        .ok_or_else(|| AnalyticsError::not_found(format!("no cash-flow history for company {}", company_id)))?;

    let steps = horizon.months() as usize;
    let revenues: Vec<f64> = history.iter().map(|e| e.revenue).collect();
    let expenses: Vec<f64> = history.iter().map(|e| e.expense).collect();

    let future_revenue = extrapolate(&revenues, steps);
    let future_expense = extrapolate(&expenses, steps);

    let mut month = last_month;
    let forecast: Vec<ForecastEntry> = future_revenue
        .into_iter()
        .zip(future_expense)
        .map(|(revenue, expense)| {
            month = month.succ();
            ForecastEntry {
                year_month: month,
                period_end: month.month_end(),
                revenue,
                expense,
                net_flow: revenue - expense,
            }
        })
        .collect();

    let summary = ForecastSummary {
        total_revenue: forecast.iter().map(|f| f.revenue).sum(),
        total_expense: forecast.iter().map(|f| f.expense).sum(),
        total_net_flow: forecast.iter().map(|f| f.net_flow).sum(),
    };

    Ok(ForecastResult {
        company_id: company_id.to_string(),
        horizon: horizon.months(),
        historical: history.to_vec(),
        forecast,
        summary,
    })
}

/// Forecast a company from the snapshot's cash-flow table
pub fn forecast_company(snapshot: &Snapshot, company_id: &str, horizon: Horizon) -> Result<ForecastResult> {
    forecast_history(company_id, snapshot.cashflow().history_for(company_id), horizon)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(revenues: &[f64], expenses: &[f64]) -> Vec<MonthlyCashflowEntry> {
        let mut month = YearMonth::new(2023, 1).unwrap();
        revenues
            .iter()
            .zip(expenses)
            .map(|(r, e)| {
                let entry = MonthlyCashflowEntry::new("X", month, *r, *e);
                month = month.succ();
                entry
            })
            .collect()
    }

    #[test]
    fn test_linear_growth_example() {
        let hist = history(&[100.0, 200.0, 300.0], &[0.0, 0.0, 0.0]);

        assert!((trend_slope(&[100.0, 200.0, 300.0]) - 100.0).abs() < 1e-9);

        let result = forecast_history("X", &hist, Horizon::new(1).unwrap()).unwrap();

        assert_eq!(result.forecast.len(), 1);
        assert!((result.forecast[0].revenue - 400.0).abs() < 1e-9);
        assert_eq!(result.forecast[0].year_month, YearMonth::new(2023, 4).unwrap());
        assert_eq!(result.historical.len(), 3);

        println!("✅ Forecast example: {:?}", result.forecast[0]);
    }

    #[test]
    fn test_single_point_is_flat() {
        let hist = history(&[250.0], &[100.0]);

        let result = forecast_history("X", &hist, Horizon::new(12).unwrap()).unwrap();

        assert_eq!(result.forecast.len(), 12);
        for entry in &result.forecast {
            assert_eq!(entry.revenue, 250.0);
            assert_eq!(entry.expense, 100.0);
        }
        assert_eq!(result.summary.total_revenue, 3000.0);
    }

    #[test]
    fn test_extrapolate_without_history_is_zero() {
        assert_eq!(extrapolate(&[], 3), vec![0.0, 0.0, 0.0]);
        assert_eq!(trend_slope(&[42.0]), 0.0);
    }

    #[test]
    fn test_no_history_is_not_found() {
        let err = forecast_history("ghost", &[], Horizon::default()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_net_flow_is_revenue_minus_expense() {
        let hist = history(&[10.0, 40.0, 20.0, 55.0], &[30.0, 5.0, 25.0, 12.0]);

        let result = forecast_history("X", &hist, Horizon::new(24).unwrap()).unwrap();

        for entry in &result.forecast {
            assert_eq!(entry.net_flow, entry.revenue - entry.expense);
        }
        let total: f64 = result.forecast.iter().map(|f| f.net_flow).sum();
        assert!((result.summary.total_net_flow - total).abs() < 1e-9);
    }

    #[test]
    fn test_months_cross_year_boundary() {
        let mut month = YearMonth::new(2023, 11).unwrap();
        let hist: Vec<MonthlyCashflowEntry> = (0..2)
            .map(|_| {
                let e = MonthlyCashflowEntry::new("X", month, 1.0, 1.0);
                month = month.succ();
                e
            })
            .collect();

        let result = forecast_history("X", &hist, Horizon::new(3).unwrap()).unwrap();
        let labels: Vec<String> = result.forecast.iter().map(|f| f.year_month.to_string()).collect();

        assert_eq!(labels, vec!["2024-01", "2024-02", "2024-03"]);

        // Leap-year February closes on the 29th
        assert_eq!(result.forecast[1].period_end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(result.forecast[2].period_end, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
    }

    #[test]
    fn test_horizon_bounds() {
        assert!(Horizon::new(0).is_err());
        assert!(Horizon::new(25).is_err());
        assert_eq!(Horizon::new(24).unwrap().months(), 24);
        assert_eq!(Horizon::default().months(), 6);
    }
}
