// 🔗 Critical Dependency Detection
//
// For every company: total inbound value, then each inbound counterparty's share.
// Report (dependent, client, share) with share >= threshold, largest first.

use crate::graph_store::{DependencyRecord, PaymentEdge};
use std::collections::BTreeMap;

pub const DEFAULT_THRESHOLD: f64 = 0.7;
pub const DEFAULT_LIMIT: usize = 10;

pub fn find_critical_dependencies(edges: &[PaymentEdge], threshold: f64, limit: usize) -> Vec<DependencyRecord> {
    // payee → payer → Σ value
    let mut inbound: BTreeMap<&str, BTreeMap<&str, f64>> = BTreeMap::new();
    for edge in edges {
        *inbound
            .entry(edge.target.as_str())
            .or_default()
            .entry(edge.source.as_str())
            .or_insert(0.0) += edge.value;
    }

    let mut records = Vec::new();
    for (dependent, clients) in &inbound {
        let total: f64 = clients.values().sum();
        if total <= 0.0 {
            continue;
        }

        for (client, value) in clients {
            let share = value / total;
            if share >= threshold {
                records.push(DependencyRecord {
                    dependent_company: dependent.to_string(),
                    key_client: client.to_string(),
                    share,
                    concentration_pct: share * 100.0,
                });
            }
        }
    }

    records.sort_by(|a, b| {
        b.share
            .total_cmp(&a.share)
            .then_with(|| a.dependent_company.cmp(&b.dependent_company))
            .then_with(|| a.key_client.cmp(&b.key_client))
    });
    records.truncate(limit);
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn edge(source: &str, target: &str, value: f64) -> PaymentEdge {
        PaymentEdge {
            source: source.to_string(),
            target: target.to_string(),
            value,
            kind: "PIX".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        }
    }

    fn sample_edges() -> Vec<PaymentEdge> {
        vec![
            edge("A", "B", 60.0),
            edge("A", "B", 30.0),
            edge("C", "B", 10.0),
            edge("A", "D", 75.0),
            edge("C", "D", 25.0),
            edge("B", "E", 50.0),
            edge("C", "E", 50.0),
        ]
    }

    #[test]
    fn test_parallel_edges_are_summed() {
        let deps = find_critical_dependencies(&sample_edges(), 0.7, 10);

        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].dependent_company, "B");
        assert_eq!(deps[0].key_client, "A");
        assert!((deps[0].share - 0.9).abs() < 1e-12);
        assert!((deps[0].concentration_pct - 90.0).abs() < 1e-9);
        assert_eq!(deps[1].dependent_company, "D");

        println!("✅ Critical dependencies: {:?}", deps);
    }

    #[test]
    fn test_never_below_threshold_and_sorted() {
        for threshold in [0.0, 0.25, 0.5, 0.75, 0.9, 1.0] {
            let deps = find_critical_dependencies(&sample_edges(), threshold, 100);
            assert!(deps.iter().all(|d| d.share >= threshold));
            assert!(deps.windows(2).all(|w| w[0].share >= w[1].share));
        }
    }

    #[test]
    fn test_high_threshold_gives_empty_list() {
        let deps = find_critical_dependencies(&sample_edges(), 0.95, 10);
        assert!(deps.is_empty());
    }

    #[test]
    fn test_limit_caps_results() {
        let deps = find_critical_dependencies(&sample_edges(), 0.0, 3);
        assert_eq!(deps.len(), 3);
    }

    #[test]
    fn test_equal_shares_ordered_by_dependent_then_client() {
        // Every payee has a single payer, so every share is 1.0
        let edges = vec![
            edge("Z", "M", 5.0),
            edge("B", "K", 1.0),
            edge("A", "M2", 3.0),
            edge("C", "K2", 7.0),
        ];

        let deps = find_critical_dependencies(&edges, 0.7, 10);

        let order: Vec<(&str, &str)> = deps
            .iter()
            .map(|d| (d.dependent_company.as_str(), d.key_client.as_str()))
            .collect();
        assert_eq!(order, vec![("K", "B"), ("K2", "C"), ("M", "Z"), ("M2", "A")]);
        assert!(deps.iter().all(|d| d.share == 1.0));

        println!("✅ Tie order: {:?}", order);
    }

    #[test]
    fn test_same_dependent_ties_ordered_by_client() {
        // P is paid equally by Y and X: both at 0.5
        let edges = vec![edge("Y", "P", 10.0), edge("X", "P", 10.0)];

        let deps = find_critical_dependencies(&edges, 0.5, 10);

        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].key_client, "X");
        assert_eq!(deps[1].key_client, "Y");
    }

    #[test]
    fn test_zero_inbound_total_is_skipped() {
        let deps = find_critical_dependencies(&[edge("A", "B", 0.0)], 0.0, 10);
        assert!(deps.is_empty());
    }
}
