//! Ollama HTTP client.

use super::CompletionModel;
use crate::config::ForgeflowConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Sampling options forwarded with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OllamaOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Context window in tokens.
    pub num_ctx: u32,
}

impl Default for OllamaOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            num_ctx: 8192,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Calls a local Ollama server's `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    host: String,
    options: OllamaOptions,
    http: reqwest::Client,
}

impl OllamaClient {
    /// Creates a client for `host`, e.g. `http://127.0.0.1:11434`.
    pub fn new(host: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            host: host.into().trim_end_matches('/').to_string(),
            options: OllamaOptions::default(),
            http,
        })
    }

    /// Creates a client from the host, timeout and sampling settings in `config`.
    pub fn from_config(config: &ForgeflowConfig) -> Result<Self> {
        Ok(Self::new(
            config.ollama_host.clone(),
            Duration::from_secs(config.request_timeout_seconds),
        )?
        .with_options(OllamaOptions {
            temperature: config.temperature,
            num_ctx: config.context_window,
        }))
    }

    /// Replaces the sampling options.
    #[must_use]
    pub const fn with_options(mut self, options: OllamaOptions) -> Self {
        self.options = options;
        self
    }

    /// The generate endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}/api/generate", self.host)
    }
}

#[async_trait]
impl CompletionModel for OllamaClient {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: self.options,
        };
        debug!(model, prompt_len = prompt.len(), "Calling Ollama");

        let resp = self
            .http
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .context("Failed to call Ollama")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Ollama error {status}: {body}");
        }

        let parsed = resp
            .json::<GenerateResponse>()
            .await
            .context("Failed to parse Ollama response")?;
        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/api/generate");
    }

    #[test]
    fn test_request_body_shape() {
        let body = GenerateRequest {
            model: "gemma3:4b",
            prompt: "hello",
            stream: false,
            options: OllamaOptions::default(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gemma3:4b");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_ctx"], 8192);
    }

    #[test]
    fn test_from_config() {
        let config = ForgeflowConfig {
            ollama_host: "http://gpu-box:11434".to_string(),
            temperature: 0.2,
            context_window: 4096,
            ..ForgeflowConfig::default()
        };
        let client = OllamaClient::from_config(&config).unwrap();
        assert_eq!(client.endpoint(), "http://gpu-box:11434/api/generate");
        assert_eq!(client.options.num_ctx, 4096);
    }
}
