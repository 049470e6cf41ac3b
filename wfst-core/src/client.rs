use tracing::debug;

use crate::cancel::CancelToken;
use crate::config::ClientConfig;
use crate::errors::WfsResult;
use crate::http::HttpClient;
use crate::metadata::{LayerConfig, LayerSummary, MetadataResolver, ServiceMeta};
use crate::model::{CanonicalFeatureCollection, ReadParams, TransactionRequest, TransactionResult};
use crate::reader::FeatureReader;
use crate::response;
use crate::transaction::{PreparedTransaction, TransactionBuilder};

/// Entry point for callers: one connection pool, no other shared state.
///
/// Every call resolves the layer configuration again; nothing is cached
/// between calls.
#[derive(Debug, Clone)]
pub struct WfsClient {
    metadata: MetadataResolver,
    reader: FeatureReader,
    transactions: TransactionBuilder,
}

impl WfsClient {
    pub fn new(config: ClientConfig) -> WfsResult<Self> {
        debug!(
            "Creating WFS client for {} (timeout {}s)",
            config.api_base, config.timeout_secs
        );
        let http = HttpClient::new(config)?;
        let metadata = MetadataResolver::new(http.clone());
        Ok(Self {
            reader: FeatureReader::new(http.clone(), metadata.clone()),
            transactions: TransactionBuilder::new(http, metadata.clone()),
            metadata,
        })
    }

    pub async fn list_services(
        &self,
        fields: &[&str],
        cancel: &CancelToken,
    ) -> WfsResult<Vec<LayerSummary>> {
        self.metadata.list_services(fields, cancel).await
    }

    pub async fn get_service_meta(&self, id: &str, cancel: &CancelToken) -> WfsResult<ServiceMeta> {
        self.metadata.get_service_meta(id, cancel).await
    }

    pub async fn fetch_layer(
        &self,
        id: &str,
        fields: &[&str],
        cancel: &CancelToken,
    ) -> WfsResult<LayerConfig> {
        self.metadata.fetch_layer(id, fields, cancel).await
    }

    pub async fn read_features(
        &self,
        layer_id: &str,
        params: &ReadParams,
        cancel: &CancelToken,
    ) -> WfsResult<CanonicalFeatureCollection> {
        self.reader.read_features(layer_id, params, cancel).await
    }

    /// Build the transaction document for a layer without posting it.
    pub async fn prepare_transaction(
        &self,
        layer_id: &str,
        request: &TransactionRequest,
        cancel: &CancelToken,
    ) -> WfsResult<PreparedTransaction> {
        self.transactions.prepare(layer_id, request, cancel).await
    }

    pub async fn commit_transaction(
        &self,
        layer_id: &str,
        request: &TransactionRequest,
        cancel: &CancelToken,
    ) -> WfsResult<TransactionResult> {
        self.transactions
            .commit_transaction(layer_id, request, cancel)
            .await
    }

    pub fn parse_transaction_response(&self, body: &str) -> TransactionResult {
        response::parse_transaction_response(body)
    }
}
