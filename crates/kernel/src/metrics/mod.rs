//! Prometheus metrics collection.
//!
//! Provides listing metrics in Prometheus format.

use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

/// Listing request labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ListingLabels {
    pub resource: String,
    pub outcome: String,
}

/// Per-resource labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResourceLabels {
    pub resource: String,
}

/// Application metrics.
pub struct Metrics {
    registry: Registry,

    /// Listing requests by resource/outcome.
    pub listing_requests: Family<ListingLabels, Counter>,

    /// Compose-and-paginate duration per resource.
    pub listing_duration_seconds: Family<ResourceLabels, Histogram>,

    /// Resources loaded from the catalog.
    pub catalog_resources: Gauge,
}

impl Metrics {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let listing_requests = Family::<ListingLabels, Counter>::default();
        registry.register(
            "listing_requests_total",
            "Total listing requests",
            listing_requests.clone(),
        );

        let listing_duration_seconds =
            Family::<ResourceLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.0005, 2.0, 14))
            });
        registry.register(
            "listing_duration_seconds",
            "Listing compose and pagination duration in seconds",
            listing_duration_seconds.clone(),
        );

        let catalog_resources = Gauge::default();
        registry.register(
            "catalog_resources",
            "Listable resources in the catalog",
            catalog_resources.clone(),
        );

        Self {
            registry,
            listing_requests,
            listing_duration_seconds,
            catalog_resources,
        }
    }

    /// Record one listing request.
    pub fn record_listing(&self, resource: &str, outcome: &str, duration_secs: f64) {
        self.listing_requests
            .get_or_create(&ListingLabels {
                resource: resource.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
        self.listing_duration_seconds
            .get_or_create(&ResourceLabels {
                resource: resource.to_string(),
            })
            .observe(duration_secs);
    }

    pub fn set_catalog_resources(&self, count: usize) {
        self.catalog_resources
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Encode metrics in Prometheus text format.
    ///
    /// # Panics
    ///
    /// Panics if encoding to a `String` buffer fails, which `fmt::Write` for
    /// `String` never does.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        #[allow(clippy::expect_used)]
        encode(&mut buffer, &self.registry).expect("encoding metrics");
        buffer
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish()
    }
}
