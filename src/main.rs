use checkout_engine::application::checkout::{CheckoutService, EngineStores};
use checkout_engine::domain::ports::SystemClock;
use checkout_engine::infrastructure::in_memory::{
    InMemoryCatalogStore, InMemoryCouponStore, InMemoryFunnelStore, InMemoryOrderStore,
    InMemoryQuoteStore, InMemorySessionStore,
};
use checkout_engine::infrastructure::processor::SimulatedProcessor;
use checkout_engine::interfaces::rpc::{RequestReader, dispatch};
use checkout_engine::interfaces::seed::Seed;
use chrono::Duration;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input requests file, one JSON request per line
    input: PathBuf,

    /// Seed file with catalog, coupons, funnels, and tax rates
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Quote lifetime in minutes; 0 means quotes never expire
    #[arg(long, default_value_t = 30)]
    quote_ttl_minutes: i64,

    /// Session lifetime in hours
    #[arg(long, default_value_t = 24)]
    session_ttl_hours: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let seed = match &cli.seed {
        Some(path) => {
            let file = File::open(path).into_diagnostic()?;
            Seed::from_reader(BufReader::new(file)).into_diagnostic()?
        }
        None => Seed::default(),
    };

    let catalog = InMemoryCatalogStore::new();
    let stores = build_stores(&cli, &seed, &catalog).into_diagnostic()?;
    seed.apply(&catalog, &stores.coupons, &stores.funnels)
        .await
        .into_diagnostic()?;

    let quote_ttl = match cli.quote_ttl_minutes {
        0 => None,
        minutes => Some(Duration::minutes(minutes)),
    };
    let service = CheckoutService::assemble(
        stores,
        quote_ttl,
        Duration::hours(cli.session_ttl_hours),
    );

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = RequestReader::new(BufReader::new(file));
    for request in reader.requests() {
        match request {
            Ok(request) => {
                let response = dispatch(&service, request).await;
                let line = serde_json::to_string(&response).into_diagnostic()?;
                println!("{line}");
            }
            Err(e) => {
                eprintln!("Error reading request: {e}");
            }
        }
    }

    Ok(())
}

fn build_stores(
    cli: &Cli,
    seed: &Seed,
    catalog: &InMemoryCatalogStore,
) -> checkout_engine::error::Result<EngineStores> {
    #[cfg(not(feature = "storage-rocksdb"))]
    let _ = cli;

    let tax_rates = Arc::new(seed.tax_table());
    let processor = Arc::new(SimulatedProcessor::new());
    let clock = Arc::new(SystemClock);

    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = &cli.db_path {
        use checkout_engine::infrastructure::rocksdb::RocksDbEngineStore;
        let store = RocksDbEngineStore::open(db_path)?;
        return Ok(EngineStores {
            catalog: Arc::new(catalog.clone()),
            coupons: Arc::new(store.clone()),
            quotes: Arc::new(store.clone()),
            sessions: Arc::new(store.clone()),
            orders: Arc::new(store.clone()),
            funnels: Arc::new(store),
            processor,
            tax_rates,
            clock,
        });
    }

    Ok(EngineStores {
        catalog: Arc::new(catalog.clone()),
        coupons: Arc::new(InMemoryCouponStore::new()),
        quotes: Arc::new(InMemoryQuoteStore::new()),
        sessions: Arc::new(InMemorySessionStore::new()),
        orders: Arc::new(InMemoryOrderStore::new()),
        funnels: Arc::new(InMemoryFunnelStore::new()),
        processor,
        tax_rates,
        clock,
    })
}
