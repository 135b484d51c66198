use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use super::{FetchedContent, Fetcher};
use crate::config::EngineConfig;
use crate::error::ToolError;

const HTML_WRAP_WIDTH: usize = 100;

/// HTTP(S) fetcher backed by `reqwest` with a per-request timeout and a body size cap.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("toolhost/", env!("CARGO_PKG_VERSION")))
            .timeout(config.fetch_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            max_bytes: config.max_fetch_bytes,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedContent> {
        log::debug!("fetch: GET {url}");
        let mut response = self.client.get(url).send().await.map_err(|err| {
            if err.is_timeout() {
                anyhow::Error::from(ToolError::Timeout(format!("GET {url}")))
            } else {
                anyhow::Error::new(err).context(format!("GET {url} failed"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {url} returned HTTP {status}");
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let mut body = CappedBody::new(self.max_bytes);
        if let Some(declared) = response.content_length() {
            body.check_declared(declared)?;
        }
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("Failed to read body of {url}"))?
        {
            body.push(&chunk)?;
        }

        Ok(FetchedContent {
            body: body.into_inner(),
            content_type,
        })
    }
}

/// Response body collected chunk by chunk, refusing to grow past `max` bytes.
struct CappedBody {
    bytes: Vec<u8>,
    max: usize,
}

impl CappedBody {
    fn new(max: usize) -> Self {
        Self {
            bytes: Vec::new(),
            max,
        }
    }

    fn too_large(&self, len: u64) -> anyhow::Error {
        anyhow::anyhow!("Response too large: {len} bytes (max {})", self.max)
    }

    fn check_declared(&self, len: u64) -> Result<()> {
        if len > self.max as u64 {
            return Err(self.too_large(len));
        }
        Ok(())
    }

    fn push(&mut self, chunk: &[u8]) -> Result<()> {
        let len = self.bytes.len() + chunk.len();
        if len > self.max {
            return Err(self.too_large(len as u64));
        }
        self.bytes.extend_from_slice(chunk);
        Ok(())
    }

    fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentFormat {
    Html,
    Json,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedContent {
    pub format: ContentFormat,
    pub text: String,
}

fn mime_of(content_type: Option<&str>) -> Option<String> {
    content_type
        .and_then(|raw| raw.split(';').next())
        .map(|mime| mime.trim().to_ascii_lowercase())
        .filter(|mime| !mime.is_empty())
}

fn sniff(body: &[u8]) -> ContentFormat {
    let text = String::from_utf8_lossy(&body[..body.len().min(1024)]).to_ascii_lowercase();
    let trimmed = text.trim_start();
    if trimmed.starts_with("<!doctype html") || trimmed.starts_with("<html") {
        ContentFormat::Html
    } else if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_slice::<serde_json::Value>(body).is_ok()
    {
        ContentFormat::Json
    } else {
        ContentFormat::Text
    }
}

/// HTML is converted to plain text, JSON is pretty-printed, text passes through.
/// Binary content types are refused.
pub fn normalize_fetched(content: &FetchedContent) -> Result<NormalizedContent> {
    let format = match mime_of(content.content_type.as_deref()) {
        None => sniff(&content.body),
        Some(mime) if mime == "text/html" || mime == "application/xhtml+xml" => ContentFormat::Html,
        Some(mime) if mime == "application/json" || mime.ends_with("+json") => ContentFormat::Json,
        Some(mime)
            if mime.starts_with("text/")
                || mime.ends_with("+xml")
                || mime == "application/xml"
                || mime == "application/javascript" =>
        {
            ContentFormat::Text
        }
        Some(mime) => {
            return Err(ToolError::ToolFailure(format!("Unsupported content type '{mime}'")).into())
        }
    };

    let text = match format {
        ContentFormat::Html => html2text::from_read(&content.body[..], HTML_WRAP_WIDTH)
            .map_err(|err| anyhow::anyhow!("html2text error: {err}"))?,
        ContentFormat::Json => match serde_json::from_slice::<serde_json::Value>(&content.body) {
            Ok(value) => serde_json::to_string_pretty(&value)?,
            Err(_) => String::from_utf8_lossy(&content.body).into_owned(),
        },
        ContentFormat::Text => String::from_utf8_lossy(&content.body).into_owned(),
    };
    Ok(NormalizedContent { format, text })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(body: &str, content_type: Option<&str>) -> FetchedContent {
        FetchedContent {
            body: body.as_bytes().to_vec(),
            content_type: content_type.map(str::to_string),
        }
    }

    #[test]
    fn html_becomes_text() {
        let out = normalize_fetched(&content(
            "<html><body><h1>Title</h1><p>Hello <b>there</b></p></body></html>",
            Some("text/html; charset=utf-8"),
        ))
        .expect("normalize");
        assert_eq!(out.format, ContentFormat::Html);
        assert!(out.text.contains("Title"));
        assert!(out.text.contains("Hello"));
        assert!(!out.text.contains("<p>"));
    }

    #[test]
    fn json_is_pretty_printed() {
        let out = normalize_fetched(&content(r#"{"a":1}"#, Some("application/json")))
            .expect("normalize");
        assert_eq!(out.format, ContentFormat::Json);
        assert_eq!(out.text, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn missing_content_type_is_sniffed() {
        let out = normalize_fetched(&content("[1, 2]", None)).expect("normalize");
        assert_eq!(out.format, ContentFormat::Json);
        let out = normalize_fetched(&content("plain words", None)).expect("normalize");
        assert_eq!(out.format, ContentFormat::Text);
    }

    #[test]
    fn body_cap_stops_before_buffering_past_the_limit() {
        let mut body = CappedBody::new(8);
        assert!(body.check_declared(8).is_ok());
        let err = body.check_declared(9).expect_err("declared length over the cap");
        assert_eq!(err.to_string(), "Response too large: 9 bytes (max 8)");

        body.push(b"12345").expect("first chunk");
        let err = body.push(b"6789").expect_err("second chunk crosses the cap");
        assert_eq!(err.to_string(), "Response too large: 9 bytes (max 8)");
        body.push(b"678").expect("fits exactly");
        assert_eq!(body.into_inner(), b"12345678".to_vec());
    }

    #[test]
    fn binary_is_refused() {
        assert!(normalize_fetched(&content("\u{0}", Some("image/png"))).is_err());
    }
}
