use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use flowwatch_api::QuerySpec;
use live_query::ReconnectPolicy;
use service_postgrest::PostgrestConfig;

use crate::error::CliError;

#[derive(Parser)]
#[command(name = "flowwatch", about = "Live view of detected network attacks")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Keep every view synchronized and log changes until Ctrl-C
    Watch(WatchArgs),
    /// Fetch one view once and print a JSON report
    Snapshot(SnapshotArgs),
}

#[derive(Args, Clone, Debug)]
pub struct SourceArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "flowwatch.toml", env = "FLOWWATCH_CONFIG")]
    pub config: String,
    /// Overrides `[service].api_key`
    #[arg(long, env = "FLOWWATCH_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Args, Clone, Debug)]
pub struct SnapshotArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Name of the view to report
    #[arg(long, default_value = "overview")]
    pub view: String,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct FlowwatchConfig {
    pub service: PostgrestConfig,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    #[serde(default)]
    pub views: Vec<ViewConfig>,
}

/// Named query; the query fields sit next to `name` in the table.
#[derive(Debug, Clone, Deserialize)]
pub struct ViewConfig {
    pub name: String,
    #[serde(flatten)]
    pub spec: QuerySpec,
}

impl FlowwatchConfig {
    pub fn load(source: &SourceArgs) -> Result<Self, CliError> {
        let path = &source.config;
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        let mut config = Self::parse(&content)
            .map_err(|detail| CliError::Config { context: "parse", detail: format!("'{path}': {detail}") })?;
        if let Some(key) = &source.api_key {
            config.service.api_key = key.clone();
        }
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        let mut config: Self = toml::from_str(content).map_err(|e| e.to_string())?;
        if config.views.is_empty() {
            config.views = dashboard::default_views()
                .into_iter()
                .map(|(name, spec)| ViewConfig { name: name.to_string(), spec })
                .collect();
        }
        let mut names: Vec<&str> = config.views.iter().map(|v| v.name.as_str()).collect();
        names.sort_unstable();
        if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(format!("duplicate view '{}'", dup[0]));
        }
        Ok(config)
    }

    pub fn view(&self, name: &str) -> Result<&ViewConfig, CliError> {
        self.views
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| CliError::UnknownView(name.to_string()))
    }
}
