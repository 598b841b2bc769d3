// 🗄️ Profile Snapshot - Eager, one-shot, cache-until-restart
//
// registry → aggregate → features → classify, run once at startup.
// The result is immutable; a fresh computation means building a new Snapshot
// (in practice: restarting the process). If any stage fails nothing is published.

use crate::cashflow::{aggregate, CashflowTable};
use crate::error::Result;
use crate::features::build_features;
use crate::lifecycle::{classify, ClusteringConfig, CompanyProfile};
use crate::registry::Registry;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Fixed date ages are computed against
    pub reference_date: NaiveDate,
    pub clustering: ClusteringConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            reference_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            clustering: ClusteringConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    id: String,
    built_at: DateTime<Utc>,
    registry: Registry,
    cashflow: CashflowTable,
    profiles: Vec<CompanyProfile>,
}

impl Snapshot {
    /// Run the full pipeline. Fails with a configuration error without publishing anything.
    pub fn initialize(registry: Registry, config: &PipelineConfig) -> Result<Snapshot> {
        let cashflow = aggregate(&registry.transactions);
        let features = build_features(&cashflow, &registry, config.reference_date);
        let mut profiles = classify(features, &config.clustering)?;
        profiles.sort_by(|a, b| a.features.company_id.cmp(&b.features.company_id));

        let snapshot = Snapshot {
            id: Uuid::new_v4().to_string(),
            built_at: Utc::now(),
            registry,
            cashflow,
            profiles,
        };

        info!(
            snapshot_id = %snapshot.id,
            companies = snapshot.profiles.len(),
            cashflow_rows = snapshot.cashflow.len(),
            fingerprint = %snapshot.cashflow.fingerprint(),
            "Profile snapshot initialized"
        );

        Ok(snapshot)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cashflow(&self) -> &CashflowTable {
        &self.cashflow
    }

    /// Profiles sorted by company id
    pub fn profiles(&self) -> &[CompanyProfile] {
        &self.profiles
    }

    pub fn profile(&self, company_id: &str) -> Option<&CompanyProfile> {
        self.profiles
            .binary_search_by(|p| p.company_id().cmp(company_id))
            .ok()
            .map(|i| &self.profiles[i])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::registry::{CompanyRecord, TransactionRecord};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Eight companies in two sectors with clearly different revenue scales.
    /// Shared by the KPI and forecast tests.
    pub(crate) fn sample_registry() -> Registry {
        let specs = [
            ("C01", "COMERCIO", 2022, 500.0),
            ("C02", "COMERCIO", 2021, 800.0),
            ("C03", "SERVICOS", 2015, 20_000.0),
            ("C04", "SERVICOS", 2016, 22_000.0),
            ("C05", "COMERCIO", 2010, 150_000.0),
            ("C06", "SERVICOS", 2009, 160_000.0),
            ("C07", "COMERCIO", 2000, 2_000_000.0),
            ("C08", "SERVICOS", 1998, 2_100_000.0),
        ];

        let companies: Vec<CompanyRecord> = specs
            .iter()
            .map(|(id, sector, year, revenue)| CompanyRecord {
                id: id.to_string(),
                opening_date: date(*year, 1, 1),
                reference_date: date(2024, 1, 31),
                declared_revenue: *revenue,
                balance: revenue / 10.0,
                sector: sector.to_string(),
            })
            .collect();

        // Each company is paid by the next one around the ring, growing monthly
        let mut transactions = Vec::new();
        for (i, (id, _, _, revenue)) in specs.iter().enumerate() {
            let payer = specs[(i + 1) % specs.len()].0;
            for month in 1..=6u32 {
                let amount = revenue * (1.0 + 0.05 * month as f64 * (i % 3) as f64);
                transactions.push(TransactionRecord::new(payer, id, amount, date(2023, month, 10), "PIX"));
            }
        }

        Registry::new(companies, transactions)
    }

    #[test]
    fn test_initialize_builds_all_tables() {
        let snapshot = Snapshot::initialize(sample_registry(), &PipelineConfig::default()).unwrap();

        assert_eq!(snapshot.profiles().len(), 8);
        assert_eq!(snapshot.cashflow().len(), 8 * 6);
        assert!(snapshot.profile("C05").is_some());
        assert!(snapshot.profile("missing").is_none());

        let ids: Vec<&str> = snapshot.profiles().iter().map(|p| p.company_id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);

        println!("✅ Snapshot {} built at {}", snapshot.id(), snapshot.built_at());
    }

    #[test]
    fn test_initialize_fails_without_population() {
        let registry = Registry::new(vec![], vec![]);

        let err = Snapshot::initialize(registry, &PipelineConfig::default()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let config = PipelineConfig::default();
        let a = Snapshot::initialize(sample_registry(), &config).unwrap();
        let b = Snapshot::initialize(sample_registry(), &config).unwrap();

        assert_eq!(a.profiles(), b.profiles());
        assert_eq!(a.cashflow().fingerprint(), b.cashflow().fingerprint());
        assert_ne!(a.id(), b.id());
    }
}
