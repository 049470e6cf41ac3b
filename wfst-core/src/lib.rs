//! Client for OGC WFS and WFS-T services behind a layer-configuration
//! backend.
//!
//! Reads normalize GeoJSON, GML3 and GML2 responses into
//! [`CanonicalFeatureCollection`]; writes build Transaction documents and
//! classify the server's TransactionResponse into a [`TransactionResult`].

pub mod cancel;
pub mod client;
pub mod codec;
pub mod config;
pub mod errors;
pub mod gml;
pub mod http;
pub mod metadata;
pub mod model;
pub mod reader;
pub mod response;
pub mod transaction;
pub mod xml;

pub use cancel::CancelToken;
pub use client::WfsClient;
pub use config::ClientConfig;
pub use errors::{WfsError, WfsResult};
pub use metadata::{LayerConfig, LayerSummary, ServerKind, ServiceMeta};
pub use model::{
    CanonicalFeature, CanonicalFeatureCollection, FeatureRef, Geometry, ReadParams,
    TransactionRequest, TransactionResult, FID_PROPERTY,
};
pub use response::parse_transaction_response;
