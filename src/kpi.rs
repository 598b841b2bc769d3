// 📊 KPI & Benchmark Engine - Read-only aggregates over the profile snapshot
//
// Headline KPIs (optionally per sector), company-vs-sector benchmark,
// company details, and the dashboard sections built from the same tables.

use crate::error::{AnalyticsError, Result};
use crate::features::finite_or_zero;
use crate::forecast::trend_slope;
use crate::lifecycle::{CompanyProfile, LifecycleMoment};
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Age buckets for the maturity analysis: [lower, upper) in years
pub const MATURITY_BUCKETS: [(f64, f64, &str); 4] = [
    (0.0, 2.0, "Startup (<2 years)"),
    (2.0, 5.0, "Growing (2-5 years)"),
    (5.0, 10.0, "Mature (5-10 years)"),
    (10.0, 100.0, "Established (>10 years)"),
];

// ============================================================================
// RESULT TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentShare {
    pub moment: LifecycleMoment,
    /// Population share in 0..=1
    pub share: f64,
    /// Share as a whole percentage (truncated)
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub total_companies: usize,
    /// None when the filtered population is empty
    pub predominant_moment: Option<MomentShare>,
    pub average_balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    pub company_id: String,
    pub sector: String,
    pub company_average_revenue_6m: f64,
    pub sector_average_revenue_6m: f64,
    pub company_average_margin_6m: f64,
    pub sector_average_margin_6m: f64,
    pub sector_companies: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashflowTrends {
    pub revenue: f64,
    pub expense: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyDetails {
    pub profile: CompanyProfile,
    pub benchmark: Benchmark,
    pub cashflow_trends: CashflowTrends,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentCount {
    pub moment: LifecycleMoment,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterPoint {
    pub id: String,
    pub sector: String,
    pub moment: LifecycleMoment,
    pub average_revenue_6m: f64,
    pub average_expense_6m: f64,
    pub average_margin_6m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaturityBucket {
    pub maturity_range: String,
    pub average_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub transaction_type: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorTotal {
    pub sector: String,
    pub total_revenue: f64,
    pub company_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub kpis: Kpis,
    pub moment_distribution: Vec<MomentCount>,
    pub revenue_expense_clusters: Vec<ClusterPoint>,
    pub maturity_analysis: Vec<MaturityBucket>,
    pub transaction_analysis: Vec<CategoryTotal>,
    pub sector_analysis: Vec<SectorTotal>,
}

// ============================================================================
// FILTERING
// ============================================================================

/// Profiles in `sector`, or all of them when no sector is given
pub fn filter_profiles<'a>(snapshot: &'a Snapshot, sector: Option<&str>) -> Vec<&'a CompanyProfile> {
    snapshot
        .profiles()
        .iter()
        .filter(|p| sector.map_or(true, |s| p.sector() == s))
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        finite_or_zero(sum / count as f64)
    }
}

// ============================================================================
// KPIs
// ============================================================================

/// Most frequent moment and its share. Ties resolve to the alphabetically smallest label.
pub fn predominant_moment(profiles: &[&CompanyProfile]) -> Option<MomentShare> {
    let mut counts: BTreeMap<LifecycleMoment, usize> = BTreeMap::new();
    for profile in profiles {
        *counts.entry(profile.lifecycle_moment).or_insert(0) += 1;
    }

    counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.label().cmp(a.0.label())))
        .map(|(moment, count)| {
            let share = *count as f64 / profiles.len() as f64;
            MomentShare {
                moment: *moment,
                share,
                percentage: (share * 100.0) as u32,
            }
        })
}

pub fn compute_kpis(snapshot: &Snapshot, sector: Option<&str>) -> Kpis {
    let profiles = filter_profiles(snapshot, sector);

    let ids: HashSet<&str> = profiles.iter().map(|p| p.company_id()).collect();
    let predominant_moment = predominant_moment(&profiles);

    let balances = snapshot.registry().latest_balances();
    let average_balance = mean(
        balances
            .iter()
            .filter(|(id, _)| ids.contains(*id))
            .map(|(_, balance)| *balance),
    );

    Kpis {
        total_companies: ids.len(),
        predominant_moment,
        average_balance,
    }
}

// ============================================================================
// BENCHMARK & DETAILS
// ============================================================================

pub fn benchmark(snapshot: &Snapshot, company_id: &str) -> Result<Benchmark> {
    let profile = snapshot
        .profile(company_id)
        .ok_or_else(|| AnalyticsError::not_found(format!("company {} not in profile table", company_id)))?;

    let peers = filter_profiles(snapshot, Some(profile.sector()));

    Ok(Benchmark {
        company_id: company_id.to_string(),
        sector: profile.sector().to_string(),
        company_average_revenue_6m: profile.features.revenue_avg_6m,
        sector_average_revenue_6m: mean(peers.iter().map(|p| p.features.revenue_avg_6m)),
        company_average_margin_6m: profile.features.margin_avg_6m,
        sector_average_margin_6m: mean(peers.iter().map(|p| p.features.margin_avg_6m)),
        sector_companies: peers.len(),
    })
}

/// Profile, benchmark and full-history trend slopes for one company
pub fn company_details(snapshot: &Snapshot, company_id: &str) -> Result<CompanyDetails> {
    let benchmark = benchmark(snapshot, company_id)?;
    let profile = snapshot
        .profile(company_id)
        .cloned()
        .ok_or_else(|| AnalyticsError::not_found(company_id.to_string()))?;

    let history = snapshot.cashflow().history_for(company_id);
    let revenues: Vec<f64> = history.iter().map(|e| e.revenue).collect();
    let expenses: Vec<f64> = history.iter().map(|e| e.expense).collect();

    Ok(CompanyDetails {
        profile,
        benchmark,
        cashflow_trends: CashflowTrends {
            revenue: trend_slope(&revenues),
            expense: trend_slope(&expenses),
        },
    })
}

// ============================================================================
// DASHBOARD
// ============================================================================

pub fn moment_distribution(profiles: &[&CompanyProfile]) -> Vec<MomentCount> {
    let mut counts: BTreeMap<LifecycleMoment, usize> = BTreeMap::new();
    for profile in profiles {
        *counts.entry(profile.lifecycle_moment).or_insert(0) += 1;
    }

    let mut distribution: Vec<MomentCount> = counts
        .into_iter()
        .map(|(moment, count)| MomentCount { moment, count })
        .collect();
    distribution.sort_by(|a, b| b.count.cmp(&a.count).then(a.moment.cmp(&b.moment)));
    distribution
}

pub fn maturity_analysis(profiles: &[&CompanyProfile]) -> Vec<MaturityBucket> {
    MATURITY_BUCKETS
        .iter()
        .filter_map(|(lower, upper, label)| {
            let in_bucket: Vec<f64> = profiles
                .iter()
                .filter(|p| p.features.age_years >= *lower && p.features.age_years < *upper)
                .map(|p| p.features.revenue_avg_6m)
                .collect();
            if in_bucket.is_empty() {
                return None;
            }
            Some(MaturityBucket {
                maturity_range: label.to_string(),
                average_revenue: mean(in_bucket.into_iter()),
            })
        })
        .collect()
}

/// Σ amount per category over transactions touching the given companies, descending
pub fn transaction_analysis(snapshot: &Snapshot, company_ids: &HashSet<&str>, filtered: bool) -> Vec<CategoryTotal> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for tx in &snapshot.registry().transactions {
        if filtered && !company_ids.contains(tx.payer_id.as_str()) && !company_ids.contains(tx.payee_id.as_str()) {
            continue;
        }
        *totals.entry(tx.category.as_str()).or_insert(0.0) += tx.amount;
    }

    let mut rows: Vec<CategoryTotal> = totals
        .into_iter()
        .map(|(category, value)| CategoryTotal {
            transaction_type: category.to_string(),
            value,
        })
        .collect();
    rows.sort_by(|a, b| b.value.total_cmp(&a.value).then(a.transaction_type.cmp(&b.transaction_type)));
    rows
}

/// Σ revenue_avg_6m and company count per sector, always over the full population
pub fn sector_analysis(snapshot: &Snapshot) -> Vec<SectorTotal> {
    let mut totals: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for profile in snapshot.profiles() {
        let entry = totals.entry(profile.sector()).or_insert((0.0, 0));
        entry.0 += profile.features.revenue_avg_6m;
        entry.1 += 1;
    }

    let mut rows: Vec<SectorTotal> = totals
        .into_iter()
        .map(|(sector, (total_revenue, company_count))| SectorTotal {
            sector: sector.to_string(),
            total_revenue,
            company_count,
        })
        .collect();
    rows.sort_by(|a, b| b.total_revenue.total_cmp(&a.total_revenue).then(a.sector.cmp(&b.sector)));
    rows
}

pub fn dashboard(snapshot: &Snapshot, sector: Option<&str>) -> Dashboard {
    let profiles = filter_profiles(snapshot, sector);
    let ids: HashSet<&str> = profiles.iter().map(|p| p.company_id()).collect();

    let revenue_expense_clusters = profiles
        .iter()
        .map(|p| ClusterPoint {
            id: p.company_id().to_string(),
            sector: p.sector().to_string(),
            moment: p.lifecycle_moment,
            average_revenue_6m: p.features.revenue_avg_6m,
            average_expense_6m: p.features.expense_avg_6m,
            average_margin_6m: p.features.margin_avg_6m,
        })
        .collect();

    Dashboard {
        kpis: compute_kpis(snapshot, sector),
        moment_distribution: moment_distribution(&profiles),
        revenue_expense_clusters,
        maturity_analysis: maturity_analysis(&profiles),
        transaction_analysis: transaction_analysis(snapshot, &ids, sector.is_some()),
        sector_analysis: sector_analysis(snapshot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::tests::sample_registry;
    use crate::snapshot::PipelineConfig;

    fn snapshot() -> Snapshot {
        Snapshot::initialize(sample_registry(), &PipelineConfig::default()).unwrap()
    }

    #[test]
    fn test_kpis_all_sectors() {
        let snapshot = snapshot();

        let kpis = compute_kpis(&snapshot, None);

        assert_eq!(kpis.total_companies, 8);
        let predominant = kpis.predominant_moment.clone().unwrap();
        assert!(predominant.share > 0.0 && predominant.share <= 1.0);
        assert_eq!(predominant.percentage, (predominant.share * 100.0) as u32);

        let expected_balance: f64 = snapshot
            .registry()
            .companies
            .iter()
            .map(|c| c.balance)
            .sum::<f64>()
            / 8.0;
        assert!((kpis.average_balance - expected_balance).abs() < 1e-6);

        println!("✅ KPIs: {:?}", kpis);
    }

    fn profile_with(base: &CompanyProfile, id: &str, moment: LifecycleMoment) -> CompanyProfile {
        let mut profile = base.clone();
        profile.features.company_id = id.to_string();
        profile.lifecycle_moment = moment;
        profile
    }

    #[test]
    fn test_predominant_moment_tie_takes_smallest_label() {
        let snapshot = snapshot();
        let base = &snapshot.profiles()[0];
        let profiles = vec![
            profile_with(base, "A", LifecycleMoment::Maturidade),
            profile_with(base, "B", LifecycleMoment::Crescimento),
            profile_with(base, "C", LifecycleMoment::Maturidade),
            profile_with(base, "D", LifecycleMoment::Crescimento),
            profile_with(base, "E", LifecycleMoment::Inicio),
        ];
        let refs: Vec<&CompanyProfile> = profiles.iter().collect();

        let predominant = predominant_moment(&refs).unwrap();

        // 2-2 tie: "Crescimento" < "Maturidade"
        assert_eq!(predominant.moment, LifecycleMoment::Crescimento);
        assert!((predominant.share - 0.4).abs() < 1e-12);
        assert_eq!(predominant.percentage, 40);

        println!("✅ Tie resolved to {}", predominant.moment);
    }

    #[test]
    fn test_kpis_sector_filter() {
        let snapshot = snapshot();

        let kpis = compute_kpis(&snapshot, Some("COMERCIO"));
        assert_eq!(kpis.total_companies, 4);

        let empty = compute_kpis(&snapshot, Some("NO_SUCH_SECTOR"));
        assert_eq!(empty.total_companies, 0);
        assert!(empty.predominant_moment.is_none());
        assert_eq!(empty.average_balance, 0.0);
    }

    #[test]
    fn test_benchmark_side_by_side() {
        let snapshot = snapshot();

        let bench = benchmark(&snapshot, "C03").unwrap();

        let peers: Vec<&CompanyProfile> = filter_profiles(&snapshot, Some("SERVICOS"));
        let expected: f64 = peers.iter().map(|p| p.features.revenue_avg_6m).sum::<f64>() / peers.len() as f64;

        assert_eq!(bench.sector, "SERVICOS");
        assert_eq!(bench.sector_companies, 4);
        assert!((bench.sector_average_revenue_6m - expected).abs() < 1e-6);
        assert_eq!(
            bench.company_average_revenue_6m,
            snapshot.profile("C03").unwrap().features.revenue_avg_6m
        );
    }

    #[test]
    fn test_benchmark_unknown_company_is_not_found() {
        let snapshot = snapshot();
        assert!(benchmark(&snapshot, "NOPE").unwrap_err().is_not_found());
        assert!(company_details(&snapshot, "NOPE").unwrap_err().is_not_found());
    }

    #[test]
    fn test_company_details_trends() {
        let snapshot = snapshot();

        // C02 (index 1) grows 5% of base per month on the revenue side
        let details = company_details(&snapshot, "C02").unwrap();
        assert!((details.cashflow_trends.revenue - 800.0 * 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_dashboard_sections() {
        let snapshot = snapshot();

        let dash = dashboard(&snapshot, None);

        assert_eq!(dash.revenue_expense_clusters.len(), 8);
        let total: usize = dash.moment_distribution.iter().map(|m| m.count).sum();
        assert_eq!(total, 8);
        assert_eq!(dash.transaction_analysis.len(), 1);
        assert_eq!(dash.transaction_analysis[0].transaction_type, "PIX");
        assert_eq!(dash.sector_analysis.len(), 2);
        assert!(dash.sector_analysis[0].total_revenue >= dash.sector_analysis[1].total_revenue);
        assert!(!dash.maturity_analysis.is_empty());
    }

    #[test]
    fn test_maturity_buckets_are_half_open() {
        let snapshot = snapshot();
        let profiles = filter_profiles(&snapshot, None);

        let buckets = maturity_analysis(&profiles);

        // C01: 730 days / 365.25 is just under 2 years
        let startup = buckets.iter().find(|b| b.maturity_range.starts_with("Startup")).unwrap();
        assert_eq!(startup.average_revenue, snapshot.profile("C01").unwrap().features.revenue_avg_6m);

        // C02: ~3 years
        assert!(buckets.iter().any(|b| b.maturity_range.starts_with("Growing")));
        assert_eq!(buckets.len(), 4);
    }
}
