//! mygate - a PostgREST-compatible REST gateway for MySQL/MariaDB
//!
//! Introspects the target schema at startup and exposes every table, view,
//! and stored routine as REST resources, with row-level security enforced
//! from signed bearer tokens.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use mygate_api::{AppState, Executor, GatewayServer};
use mygate_auth::JwtVerifier;
use mygate_catalog::{load_catalog, CatalogCache};
use mygate_rls::PolicyCache;

mod config;

use config::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mygate=info".parse()?),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let config = config::build(&cli)?;

    let executor = Executor::connect(&config.database);

    // Schema introspection is mandatory; the gateway refuses to start blind
    let catalog = load_catalog(executor.pool(), &config.database.database).await?;
    info!(tables = catalog.table_count(), "catalog ready");
    let catalog = CatalogCache::new(catalog);

    // Policy load failure degrades to an unrestricted gateway rather than
    // refusing traffic
    let policies = PolicyCache::empty();
    match policies.reload(executor.pool()).await {
        Ok(loaded) => info!(policies = loaded, "row-level policies ready"),
        Err(e) => warn!("row-level policies unavailable: {e}"),
    }

    let verifier = JwtVerifier::new(config.auth.jwt_secret.as_deref(), config.auth.jwt_required);

    let state = AppState {
        catalog,
        policies,
        executor,
        verifier,
        database: config.database.database.clone(),
    };

    // actix installs its own signal handler and drains workers on ctrl-c
    GatewayServer::new(config.http.clone(), state).run().await?;

    info!("gateway stopped");
    Ok(())
}
