//! # Completions client
//!
//! Thin `reqwest` client that posts a streaming completion request and hands
//! the response body to a [`StreamingSession`]. No retries and no credential
//! refresh: a key is sent as-is.

mod types;

pub use types::{
    ChatCompletionsRequest, ChatMessage, CompletionsRequest, FunctionCall, FunctionDefinition,
};

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use skein_core::ApiFlavor;
use tracing::{debug, error, instrument};

use crate::error::{ProviderError, ProviderResult};
use crate::sse::{SseParserOptions, frame_stream};
use crate::stream::StreamingSession;

/// Default `OpenAI` endpoint.
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";

/// Default Azure `api-version`.
pub const DEFAULT_AZURE_API_VERSION: &str = "2023-07-01-preview";

const CHAT_COMPLETIONS: &str = "chat/completions";
const COMPLETIONS: &str = "completions";

/// Default SSE parser options.
static SSE_OPTIONS: SseParserOptions = SseParserOptions {
    process_remaining_buffer: true,
};

/// Connection settings of a [`ChatCompletionsClient`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// URL scheme.
    pub flavor: ApiFlavor,
    /// Base URL, without the operation path.
    pub endpoint: String,
    /// Model name (`OpenAI`, used when a request leaves `model` unset) or
    /// deployment name (Azure, part of the URL).
    pub deployment: String,
    /// `api-version` query value (Azure only).
    pub api_version: String,
    /// Service key.
    pub api_key: SecretString,
    /// Longest idle wait for the next chunk, applied to every read of the
    /// response including the streamed body. A stream may run longer than
    /// this as long as chunks keep arriving.
    pub read_timeout: Duration,
    /// Connect timeout.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Settings for the public `OpenAI` endpoint.
    pub fn openai(model: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            flavor: ApiFlavor::OpenAi,
            endpoint: DEFAULT_OPENAI_ENDPOINT.to_string(),
            deployment: model.into(),
            api_version: String::new(),
            api_key,
            read_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Settings for an Azure resource endpoint and deployment.
    pub fn azure(
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        api_key: SecretString,
    ) -> Self {
        Self {
            flavor: ApiFlavor::Azure,
            endpoint: endpoint.into(),
            api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            ..Self::openai(deployment, api_key)
        }
    }

    /// Full URL of `operation`.
    pub fn operation_url(&self, operation: &str) -> String {
        let base = self.endpoint.trim_end_matches('/');
        match self.flavor {
            ApiFlavor::OpenAi => format!("{base}/{operation}"),
            ApiFlavor::Azure => format!(
                "{base}/openai/deployments/{}/{operation}?api-version={}",
                self.deployment, self.api_version
            ),
        }
    }
}

/// Streaming chat and text completions over HTTP.
pub struct ChatCompletionsClient {
    config: ClientConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("flavor", &self.config.flavor)
            .field("endpoint", &self.config.endpoint)
            .field("deployment", &self.config.deployment)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionsClient {
    /// Build a client with its own connection pool.
    pub fn new(config: ClientConfig) -> ProviderResult<Self> {
        validate(&config)?;
        let client = reqwest::Client::builder()
            .read_timeout(config.read_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    /// Build a client over a shared `reqwest` client.
    pub fn with_client(config: ClientConfig, client: reqwest::Client) -> ProviderResult<Self> {
        validate(&config)?;
        Ok(Self { config, client })
    }

    /// Connection settings.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start a streaming chat completion.
    #[instrument(skip_all, fields(deployment = %self.config.deployment, messages = request.messages.len()))]
    pub async fn stream_chat(
        &self,
        request: &ChatCompletionsRequest,
    ) -> ProviderResult<StreamingSession> {
        let mut body = request.clone();
        body.stream = true;
        if self.config.flavor == ApiFlavor::OpenAi && body.model.is_none() {
            body.model = Some(self.config.deployment.clone());
        }
        self.open(CHAT_COMPLETIONS, &body).await
    }

    /// Start a streaming text completion.
    #[instrument(skip_all, fields(deployment = %self.config.deployment, prompts = request.prompt.len()))]
    pub async fn stream_text(&self, request: &CompletionsRequest) -> ProviderResult<StreamingSession> {
        let mut body = request.clone();
        body.stream = true;
        if self.config.flavor == ApiFlavor::OpenAi && body.model.is_none() {
            body.model = Some(self.config.deployment.clone());
        }
        self.open(COMPLETIONS, &body).await
    }

    fn build_headers(&self) -> ProviderResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let _ = headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        let key = self.config.api_key.expose_secret();
        let (name, value) = match self.config.flavor {
            ApiFlavor::OpenAi => (AUTHORIZATION, format!("Bearer {key}")),
            ApiFlavor::Azure => (reqwest::header::HeaderName::from_static("api-key"), key.to_string()),
        };
        let mut value = HeaderValue::from_str(&value).map_err(|e| ProviderError::Auth {
            message: format!("Invalid API key header: {e}"),
        })?;
        value.set_sensitive(true);
        let _ = headers.insert(name, value);

        Ok(headers)
    }

    async fn open<B: Serialize>(&self, operation: &str, body: &B) -> ProviderResult<StreamingSession> {
        let url = self.config.operation_url(operation);
        let headers = self.build_headers()?;
        debug!(%url, "sending streaming request");

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body_text = response.text().await.unwrap_or_default();
            let err = ProviderError::from_status(status.as_u16(), &body_text, retry_after.as_deref());
            error!(status = status.as_u16(), category = err.category(), error = %err, "completion request failed");
            return Err(err);
        }

        Ok(StreamingSession::open(frame_stream(
            response.bytes_stream(),
            &SSE_OPTIONS,
        )))
    }
}

fn validate(config: &ClientConfig) -> ProviderResult<()> {
    let invalid = |message: &str| {
        Err(ProviderError::InvalidConfig {
            message: message.to_string(),
        })
    };
    if !(config.endpoint.starts_with("http://") || config.endpoint.starts_with("https://")) {
        return invalid("endpoint must be an http(s) URL");
    }
    if config.flavor == ApiFlavor::Azure {
        if config.deployment.is_empty() {
            return invalid("azure requires a deployment name");
        }
        if config.api_version.is_empty() {
            return invalid("azure requires an api-version");
        }
    }
    Ok(())
}
