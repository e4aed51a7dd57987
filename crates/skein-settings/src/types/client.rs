//! HTTP client settings.

use serde::{Deserialize, Serialize};

pub use skein_core::ApiFlavor;

/// Connection settings for the completion service.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// URL scheme of the service.
    pub flavor: ApiFlavor,
    /// Base URL, without a trailing operation path.
    pub endpoint: String,
    /// Model name (`OpenAI`) or deployment name (Azure).
    pub deployment: String,
    /// `api-version` query value (Azure only).
    pub api_version: String,
    /// Longest wait in milliseconds for the next chunk of a response.
    ///
    /// Bounds the idle gap between streamed chunks, not the length of the
    /// whole stream.
    pub read_timeout_ms: u64,
    /// TCP/TLS connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            flavor: ApiFlavor::OpenAi,
            endpoint: "https://api.openai.com/v1".to_string(),
            deployment: "gpt-4o-mini".to_string(),
            api_version: "2023-07-01-preview".to_string(),
            read_timeout_ms: 120_000,
            connect_timeout_ms: 10_000,
        }
    }
}
