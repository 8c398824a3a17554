//! Application state shared across all handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::listing::{
    Catalog, ListingComposer, ListingService, Paginator, PgPaginator, SearchEngine,
    pager::DEFAULT_STATEMENT_TIMEOUT_SECS,
};
use crate::metrics::Metrics;

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// PostgreSQL connection pool.
    db: PgPool,

    /// Registered listings with their composer and paginator.
    listings: ListingService,

    /// Prometheus metrics.
    metrics: Metrics,

    /// Upper bound on the health check query.
    health_timeout: Duration,
}

impl AppState {
    /// Connect to the database and load the listing catalog.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = db::create_pool(config)
            .await
            .context("failed to create database pool")?;

        let catalog = Catalog::load(&config.catalog_path).context("failed to load catalog")?;

        let paginator = Arc::new(
            PgPaginator::new(db.clone()).with_statement_timeout(config.statement_timeout_secs),
        );
        let listings = build_listing_service(config, &catalog, paginator);

        info!(resources = listings.resources().len(), "Listing catalog ready");

        Ok(Self::from_parts(db, listings).with_health_timeout(db::statement_timeout(config)))
    }

    /// Assemble state from already-built parts.
    pub fn from_parts(db: PgPool, listings: ListingService) -> Self {
        let metrics = Metrics::new();
        metrics.set_catalog_resources(listings.resources().len());
        Self {
            inner: Arc::new(AppStateInner {
                db,
                listings,
                metrics,
                health_timeout: Duration::from_secs(DEFAULT_STATEMENT_TIMEOUT_SECS),
            }),
        }
    }

    /// Bound the health check query; only takes effect before the state is cloned.
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.health_timeout = timeout;
        }
        self
    }

    pub fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub fn listings(&self) -> &ListingService {
        &self.inner.listings
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// Check PostgreSQL reachability.
    pub async fn postgres_healthy(&self) -> bool {
        db::check_health(&self.inner.db, self.inner.health_timeout).await
    }
}

/// Build the listing service for every resource in `catalog`.
pub fn build_listing_service(
    config: &Config,
    catalog: &Catalog,
    paginator: Arc<dyn Paginator>,
) -> ListingService {
    let search = SearchEngine::new()
        .with_max_length(config.search_max_length)
        .with_text_search_config(config.text_search_config.clone());
    let composer = ListingComposer::new(Arc::new(catalog.schema())).with_search_engine(search);

    let mut service = ListingService::new(composer, paginator)
        .with_page_limits(config.listing_default_per_page, config.listing_max_per_page);
    for (name, listing) in catalog.listings() {
        service.register(name, Arc::new(listing));
    }
    service
}
