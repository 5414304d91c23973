use crate::{
    logging::LoggingConfig,
    winners::DEFAULT_WINNERS_TO_DISPLAY,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    path::Path,
    time::Duration,
};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// What the store does with a refresh result that arrives after a newer one
/// was already published.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOrdering {
    /// Drop results older than the published snapshot.
    #[default]
    DiscardStale,
    /// Publish in arrival order, so a slow refresh can overwrite a newer one.
    LastArrivalWins,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub poll_interval_ms: u64,
    pub winners_to_display: usize,
    pub refresh_ordering: RefreshOrdering,
    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            winners_to_display: DEFAULT_WINNERS_TO_DISPLAY,
            refresh_ordering: RefreshOrdering::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn with_refresh_ordering(mut self, ordering: RefreshOrdering) -> Self {
        self.refresh_ordering = ordering;
        self
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).wrap_err("Failed to parse client config JSON")
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read client config: {}", path.display()))?;
        Self::from_json_str(&raw)
            .wrap_err_with(|| format!("Invalid client config: {}", path.display()))
    }
}
