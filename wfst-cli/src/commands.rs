use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;
use wfst::{CancelToken, ReadParams, TransactionRequest, WfsClient};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn layers(client: &WfsClient, fields: &[String], cancel: &CancelToken) -> Result<()> {
    let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
    let services = client.list_services(&fields, cancel).await?;
    info!("Backend lists {} layers", services.len());
    print_json(&services)
}

pub async fn meta(client: &WfsClient, id: &str, cancel: &CancelToken) -> Result<()> {
    let meta = client.get_service_meta(id, cancel).await?;
    print_json(&meta)
}

pub async fn read(
    client: &WfsClient,
    id: &str,
    params: &ReadParams,
    cancel: &CancelToken,
) -> Result<()> {
    let collection = client.read_features(id, params, cancel).await?;
    print_json(&collection)
}

pub async fn commit(
    client: &WfsClient,
    id: &str,
    request_path: &Path,
    dry_run: bool,
    cancel: &CancelToken,
) -> Result<()> {
    let source = std::fs::read_to_string(request_path)
        .with_context(|| format!("Failed to read request {}", request_path.display()))?;
    let request: TransactionRequest = serde_json::from_str(&source)
        .with_context(|| format!("Invalid transaction request in {}", request_path.display()))?;

    if dry_run {
        let prepared = client.prepare_transaction(id, &request, cancel).await?;
        info!("Would POST to {}", prepared.url);
        println!("{}", prepared.document);
        return Ok(());
    }

    let result = client.commit_transaction(id, &request, cancel).await?;
    print_json(&result)?;
    result.into_result()?;
    Ok(())
}

pub fn classify(response_path: &Path) -> Result<()> {
    let body = std::fs::read_to_string(response_path)
        .with_context(|| format!("Failed to read response {}", response_path.display()))?;
    print_json(&wfst::parse_transaction_response(&body))
}
