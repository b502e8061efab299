//! PostgREST + realtime backend: queries go over the REST endpoint
//! (`/rest/v1/{table}`), change feeds over the realtime websocket
//! (`/realtime/v1/websocket`, Phoenix channel protocol).

mod realtime;
mod rest;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;

use flowwatch_api::{ChangeSubscription, DataService, QuerySpec, Record, ServiceError};

pub use realtime::RealtimeSubscription;

const DEFAULT_SCHEMA: &str = "public";

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    10
}

// ═══════════════════════════════════════════════════════════════
//  PostgrestConfig
// ═══════════════════════════════════════════════════════════════

#[derive(Clone, Deserialize)]
pub struct PostgrestConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`.
    pub url: String,
    /// Anon / service key. Sent as `apikey` and bearer token.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Таймаут REST-запроса и websocket-рукопожатия.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl PostgrestConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            schema: default_schema(),
            heartbeat_secs: default_heartbeat_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for PostgrestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestConfig")
            .field("url", &self.url)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("schema", &self.schema)
            .field("heartbeat_secs", &self.heartbeat_secs)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════
//  PostgrestService
// ═══════════════════════════════════════════════════════════════

pub struct PostgrestService {
    http: reqwest::Client,
    config: PostgrestConfig,
}

impl PostgrestService {
    pub fn new(config: PostgrestConfig) -> Result<Self, ServiceError> {
        if config.url.trim().is_empty() {
            return Err(ServiceError::config("service url must not be empty"));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::config(format!("HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &PostgrestConfig {
        &self.config
    }

    fn base(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn table_url(&self, collection: &str) -> String {
        format!("{}/rest/v1/{collection}", self.base())
    }

    /// `http(s)://host` → `ws(s)://host/realtime/v1/websocket?apikey=..&vsn=1.0.0`.
    pub fn realtime_url(&self) -> Result<String, ServiceError> {
        let mut url = reqwest::Url::parse(&format!("{}/realtime/v1/websocket", self.base()))
            .map_err(|e| ServiceError::config(format!("invalid service url '{}': {e}", self.config.url)))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ServiceError::config(format!("unsupported url scheme '{other}'"))),
        };
        url.set_scheme(scheme)
            .map_err(|_| ServiceError::config(format!("cannot switch '{}' to {scheme}", self.config.url)))?;
        url.query_pairs_mut()
            .append_pair("apikey", &self.config.api_key)
            .append_pair("vsn", "1.0.0");
        Ok(url.into())
    }

    pub fn channel_topic(&self, collection: &str) -> String {
        format!("realtime:{}:{collection}", self.config.schema)
    }

    async fn fetch(&self, spec: &QuerySpec) -> Result<Vec<Record>, ServiceError> {
        let mut req = self
            .http
            .get(self.table_url(&spec.collection))
            .query(&rest::query_params(spec))
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key);
        if self.config.schema != DEFAULT_SCHEMA {
            req = req.header("Accept-Profile", &self.config.schema);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ServiceError::io(format!("request {}: {e}", spec.collection)))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| ServiceError::io(format!("read {}: {e}", spec.collection)))?;

        if !status.is_success() {
            return Err(rest::error_from_response(status.as_u16(), &body));
        }
        let rows = rest::parse_rows(&body)?;
        tracing::debug!(collection = %spec.collection, rows = rows.len(), "query complete");
        Ok(rows)
    }
}

impl DataService for PostgrestService {
    fn query(&self, spec: &QuerySpec) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, ServiceError>> + Send + '_>> {
        let spec = spec.clone();
        Box::pin(async move { self.fetch(&spec).await })
    }

    fn subscribe(
        &self,
        collection: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn ChangeSubscription>, ServiceError>> + Send + '_>> {
        let collection = collection.to_string();
        Box::pin(async move {
            let url = self.realtime_url()?;
            let heartbeat = Duration::from_secs(self.config.heartbeat_secs.max(1));
            let connect_timeout = Duration::from_secs(self.config.timeout_secs.max(1));
            let sub =
                RealtimeSubscription::connect(&url, &self.config.schema, &collection, heartbeat, connect_timeout)
                    .await?;
            tracing::info!(topic = %self.channel_topic(&collection), "realtime subscription open");
            Ok(Box::new(sub) as Box<dyn ChangeSubscription>)
        })
    }
}
