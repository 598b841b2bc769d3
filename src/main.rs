// Cashflow Insights - Command Line
//
// import-graph   CSV registry → SQLite payment graph
// profiles       lifecycle profiles + KPIs
// forecast       linear-trend forecast for one company
// dependencies   critical client concentration
// network        communities + centrality summary

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cashflow_insights::forecast::forecast_company;
use cashflow_insights::graph_store::connect_store;
use cashflow_insights::kpi::{compute_kpis, filter_profiles};
use cashflow_insights::{
    init_logging, load_registry, AppConfig, GraphAnalyzer, GraphOutcome, Horizon, Registry,
    Snapshot, SqliteGraphStore,
};

#[derive(Parser)]
#[command(name = "cashflow-insights", version, about = "Company cash-flow lifecycle analytics")]
struct Cli {
    /// Companies CSV (overrides INSIGHTS_COMPANIES_CSV)
    #[arg(long, global = true)]
    companies: Option<PathBuf>,

    /// Transactions CSV (overrides INSIGHTS_TRANSACTIONS_CSV)
    #[arg(long, global = true)]
    transactions: Option<PathBuf>,

    /// SQLite graph database (overrides INSIGHTS_GRAPH_DB)
    #[arg(long, global = true)]
    graph_db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import companies and payments into the SQLite graph database
    ImportGraph,

    /// Classify every company into a lifecycle moment
    Profiles {
        #[arg(long)]
        sector: Option<String>,
    },

    /// Forecast revenue, expense and net flow
    Forecast {
        company: String,
        #[arg(long, default_value_t = 6)]
        months: u32,
    },

    /// Companies that depend on a single client
    Dependencies {
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Communities and central companies of the payment network
    Network {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        threshold: Option<f64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(path) = cli.companies {
        config.companies_csv = path;
    }
    if let Some(path) = cli.transactions {
        config.transactions_csv = path;
    }
    if cli.graph_db.is_some() {
        config.graph_db = cli.graph_db;
    }
    init_logging(&config.log_level, config.log_format);

    match cli.command {
        Command::ImportGraph => run_import(&config),
        Command::Profiles { sector } => run_profiles(&config, sector.as_deref()),
        Command::Forecast { company, months } => run_forecast(&config, &company, months),
        Command::Dependencies { threshold, limit } => run_dependencies(&config, threshold, limit),
        Command::Network { limit, threshold } => run_network(&config, limit, threshold),
    }
}

fn load(config: &AppConfig) -> Result<Registry> {
    println!("📂 Loading registry...");
    let registry = load_registry(&config.companies_csv, &config.transactions_csv).with_context(|| {
        format!(
            "Failed to load {} / {}",
            config.companies_csv.display(),
            config.transactions_csv.display()
        )
    })?;
    println!(
        "✓ Loaded {} company rows and {} transactions",
        registry.companies.len(),
        registry.transactions.len()
    );
    Ok(registry)
}

fn build_snapshot(config: &AppConfig) -> Result<Snapshot> {
    let registry = load(config)?;
    println!("\n🧮 Building profiles...");
    let snapshot = Snapshot::initialize(registry, &config.pipeline).context("Profile pipeline failed")?;
    println!("✓ {} profiles ({} cash-flow rows)", snapshot.profiles().len(), snapshot.cashflow().len());
    Ok(snapshot)
}

fn analyzer(config: &AppConfig) -> Result<GraphAnalyzer> {
    let registry = load(config)?;
    let store = connect_store(config.graph_db.as_deref(), &registry);
    Ok(GraphAnalyzer::new(store, config.network))
}

fn report_degraded(reason: &str) {
    eprintln!("⚠️  Graph store unavailable: {}", reason);
    eprintln!("   Run: cashflow-insights import-graph --graph-db <path>");
}

fn run_import(config: &AppConfig) -> Result<()> {
    println!("🗄️  Payment Graph Import - CSV → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = config
        .graph_db
        .clone()
        .context("No graph database configured (set INSIGHTS_GRAPH_DB or --graph-db)")?;

    let registry = load(config)?;

    println!("\n🔧 Opening graph database...");
    let store = SqliteGraphStore::open(&db_path)
        .with_context(|| format!("Failed to open {}", db_path.display()))?;
    println!("✓ Database ready: {}", db_path.display());

    println!("\n💾 Importing payments...");
    let stats = store.import_registry(&registry)?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Companies: {}", stats.companies);
    println!("✅ Payments:  {}", stats.payments);
    if stats.skipped_payments > 0 {
        println!("⚠️  Skipped {} payments with unknown counterparties", stats.skipped_payments);
    }
    Ok(())
}

fn run_profiles(config: &AppConfig, sector: Option<&str>) -> Result<()> {
    let snapshot = build_snapshot(config)?;
    let kpis = compute_kpis(&snapshot, sector);

    println!("\n📊 KPIs{}", sector.map(|s| format!(" ({})", s)).unwrap_or_default());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("   Companies:        {}", kpis.total_companies);
    if let Some(moment) = &kpis.predominant_moment {
        println!("   Predominant:      {} ({}%)", moment.moment, moment.percentage);
    }
    println!("   Average balance:  {:.2}", kpis.average_balance);

    println!("\n🏷️  Profiles");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for profile in filter_profiles(&snapshot, sector) {
        println!(
            "   {:<12} {:<14} {:<12} revenue {:>14.2}  margin {:>7.3}",
            profile.company_id(),
            profile.sector(),
            profile.lifecycle_moment.label(),
            profile.features.revenue_avg_6m,
            profile.features.margin_avg_6m,
        );
    }
    Ok(())
}

fn run_forecast(config: &AppConfig, company: &str, months: u32) -> Result<()> {
    let horizon = Horizon::new(months)?;
    let snapshot = build_snapshot(config)?;
    let result = forecast_company(&snapshot, company, horizon)?;

    println!("\n📈 Forecast for {} ({} months)", result.company_id, result.horizon);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for entry in &result.forecast {
        println!(
            "   {}  revenue {:>14.2}  expense {:>14.2}  net {:>14.2}",
            entry.year_month, entry.revenue, entry.expense, entry.net_flow
        );
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("   Total net flow: {:.2}", result.summary.total_net_flow);
    Ok(())
}

fn run_dependencies(config: &AppConfig, threshold: Option<f64>, limit: Option<usize>) -> Result<()> {
    let analyzer = analyzer(config)?;
    let threshold_used = threshold.unwrap_or(config.network.dependency_threshold);

    println!("\n🔗 Critical dependencies (share ≥ {:.0}%)", threshold_used * 100.0);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    match analyzer.critical_dependencies(threshold, limit) {
        GraphOutcome::Available(deps) if deps.is_empty() => println!("   None found"),
        GraphOutcome::Available(deps) => {
            for dep in deps {
                println!(
                    "   {:<12} ← {:<12} {:>6.1}%",
                    dep.dependent_company, dep.key_client, dep.concentration_pct
                );
            }
        }
        GraphOutcome::Degraded { reason } => report_degraded(&reason),
    }
    Ok(())
}

fn run_network(config: &AppConfig, limit: Option<usize>, threshold: Option<f64>) -> Result<()> {
    let analyzer = analyzer(config)?;

    println!("\n🌐 Network summary");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    match analyzer.network_summary(limit, threshold) {
        GraphOutcome::Available(summary) => {
            println!("   Companies:            {}", summary.node_count);
            println!("   Payment relations:    {}", summary.edge_count);
            println!("   Communities:          {}", summary.communities.len());
            println!("   Largest community:    {}", summary.largest_community_size);
            println!("   Critical dependencies: {}", summary.critical_dependency_count);
            println!("\n🎯 Most central companies");
            for score in &summary.top_central {
                println!("   {:<12} {:.4}", score.company_id, score.betweenness);
            }
        }
        GraphOutcome::Degraded { reason } => report_degraded(&reason),
    }
    Ok(())
}
