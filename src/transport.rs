use crate::context::CallContext;
use crate::defaults::DEFAULT_BASE_URL;
use crate::errors::{CyborgError, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

const API_KEY_HEADER: &str = "X-API-Key";

/// Connection settings for the service.
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `CYBORGDB_BASE_URL`, `CYBORGDB_API_KEY`, `CYBORGDB_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = lookup("CYBORGDB_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut config = Self::new(base_url);
        config.api_key = lookup("CYBORGDB_API_KEY").filter(|k| !k.is_empty());
        if let Some(raw) = lookup("CYBORGDB_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                CyborgError::InvalidConfig(format!("CYBORGDB_TIMEOUT_SECS is not a number: {}", raw))
            })?;
            config.timeout = Some(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// JSON-over-HTTP access to the service.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            CyborgError::InvalidConfig(format!("invalid base url {}: {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(CyborgError::InvalidConfig(format!(
                "base url cannot carry paths: {}",
                config.base_url
            )));
        }

        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let mut value = HeaderValue::from_str(api_key)
                .map_err(|e| CyborgError::InvalidConfig(format!("invalid api key: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(API_KEY_HEADER, value);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| CyborgError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL plus `segments`, each escaped as a single path segment.
    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CyborgError::InvalidConfig("base url cannot carry paths".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        segments: &[&str],
    ) -> Result<T> {
        let request = self.request(Method::GET, segments)?;
        self.send(ctx, request).await
    }

    pub async fn post_json<B, T>(&self, ctx: &CallContext, segments: &[&str], body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::POST, segments)?.json(body);
        self.send(ctx, request).await
    }

    pub async fn delete_json<B, T>(
        &self,
        ctx: &CallContext,
        segments: &[&str],
        body: &B,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::DELETE, segments)?.json(body);
        self.send(ctx, request).await
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let url = self.url(segments)?;
        tracing::debug!("{} {}", method, url.path());
        Ok(self.client.request(method, url))
    }

    async fn send<T: DeserializeOwned>(&self, ctx: &CallContext, request: RequestBuilder) -> Result<T> {
        ctx.run(async move {
            let response = request.send().await.map_err(map_reqwest_error)?;
            let status = response.status();
            let path = response.url().path().to_string();
            let body = response.text().await.map_err(map_reqwest_error)?;

            if !status.is_success() {
                tracing::warn!("Service returned {} for {}", status, path);
                return Err(CyborgError::Service {
                    status: status.as_u16(),
                    body,
                });
            }

            // Some endpoints reply with an empty body.
            let text = if body.trim().is_empty() { "null" } else { body.as_str() };
            serde_json::from_str(text).map_err(|e| {
                CyborgError::MalformedResponse(format!("failed to parse response from {}: {}", path, e))
            })
        })
        .await
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

fn map_reqwest_error(e: reqwest::Error) -> CyborgError {
    if e.is_timeout() {
        CyborgError::DeadlineExceeded
    } else {
        CyborgError::Transport(e.to_string())
    }
}
