//! Upstream product-list contract.
//!
//! The archive query/metadata service is an external collaborator: given a
//! source id it yields the data products to download. The server consumes
//! it through this trait; requests may also inline their product list and
//! skip the upstream call entirely.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use mastfetch_core::config::Config;
use mastfetch_core::resolver::Product;

#[async_trait]
pub trait ProductSource: Send + Sync {
    /// Data products for a source id, optionally filtered by product type.
    async fn products_for(
        &self,
        source_id: &str,
        product_type: Option<&str>,
    ) -> anyhow::Result<Vec<Product>>;
}

/// HTTP client for the archive query service.
pub struct ArchiveProductSource {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ProductsResponse {
    products: Vec<Product>,
}

impl ArchiveProductSource {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl ProductSource for ArchiveProductSource {
    async fn products_for(
        &self,
        source_id: &str,
        product_type: Option<&str>,
    ) -> anyhow::Result<Vec<Product>> {
        let url = format!("{}/products", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "source_id": source_id,
            "product_type": product_type,
        });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let parsed: ProductsResponse = resp.json().await?;
        tracing::info!(
            source_id,
            count = parsed.products.len(),
            "fetched product list from archive service"
        );
        Ok(parsed.products)
    }
}

/// Placeholder used when no archive service is configured. Jobs that do
/// not inline their product list fail with a clear message.
pub struct UnconfiguredProductSource;

#[async_trait]
impl ProductSource for UnconfiguredProductSource {
    async fn products_for(
        &self,
        source_id: &str,
        _product_type: Option<&str>,
    ) -> anyhow::Result<Vec<Product>> {
        anyhow::bail!(
            "no archive query service configured (MASTFETCH_ARCHIVE_API_URL); \
             cannot resolve products for {source_id}"
        )
    }
}

pub fn from_config(config: &Config) -> Arc<dyn ProductSource> {
    match &config.archive_api_url {
        Some(url) => Arc::new(ArchiveProductSource::new(url.clone())),
        None => Arc::new(UnconfiguredProductSource),
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Fixed product list for route tests.
    pub struct StaticProductSource(pub Vec<Product>);

    #[async_trait]
    impl ProductSource for StaticProductSource {
        async fn products_for(
            &self,
            _source_id: &str,
            _product_type: Option<&str>,
        ) -> anyhow::Result<Vec<Product>> {
            Ok(self.0.clone())
        }
    }
}
