use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::backend::{normalize_fetched, Fetcher};
use crate::error::ToolError;
use crate::registry::{FieldSpec, FieldType, ToolDescriptor, ToolHandler, ToolInput, ToolRegistryBuilder};

pub(super) fn register(builder: &mut ToolRegistryBuilder, fetcher: Arc<dyn Fetcher>) -> Result<()> {
    builder.register(
        ToolDescriptor::new(
            "fetch",
            "Fetch a URL and return its content as text. HTML is converted to plain text.",
        )
        .field(FieldSpec::required("url", FieldType::String, "http(s) URL")),
        Arc::new(FetchTool { fetcher }),
    )?;
    Ok(())
}

/// Bare hosts get `https://`; any other scheme is refused.
fn normalize_url(raw: &str) -> std::result::Result<String, ToolError> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(ToolError::invalid_input("url must not be empty"));
    }
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(url.to_string());
    }
    if url.contains("://") || lower.starts_with("file:") || lower.starts_with("data:") {
        return Err(ToolError::invalid_input(format!(
            "Only http and https URLs are supported: '{url}'"
        )));
    }
    Ok(format!("https://{url}"))
}

#[derive(Debug, Deserialize)]
struct FetchRequest {
    url: String,
}

struct FetchTool {
    fetcher: Arc<dyn Fetcher>,
}

#[async_trait]
impl ToolHandler for FetchTool {
    async fn run(&self, input: ToolInput) -> Result<Value> {
        let request: FetchRequest = input.parse()?;
        let url = normalize_url(&request.url)?;
        let fetched = self.fetcher.fetch(&url).await?;
        let normalized = normalize_fetched(&fetched)?;
        Ok(serde_json::json!({
            "url": url,
            "content_type": fetched.content_type,
            "format": normalized.format,
            "content": normalized.text,
        }))
    }
}
