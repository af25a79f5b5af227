use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Credentials, feed_profile::LlmConfig};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0} API key missing")]
    MissingCredentials(&'static str),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{provider} API error [{status}]: {body}")]
    Status { provider: String, status: u16, body: String },
    #[error("gateway timed out after {0}s")]
    Timeout(u64),
    #[error("{0} returned no usable content")]
    EmptyResponse(String),
}

/// 语言模型网关：给提示词和 token 预算，返回自由文本。不做重试。
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn provider(&self) -> &str;

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GatewayError>;
}

/// OpenAI 兼容的 /chat/completions 接口 (OpenAI, DeepSeek)
pub struct ChatCompletionsClient {
    client: Client,
    provider: String,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f64,
}

impl ChatCompletionsClient {
    pub fn new(client: Client, provider: &str, api_key: String, base_url: &str, model: &str, temperature: f64) -> Self {
        Self {
            client,
            provider: provider.to_string(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
        }
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GatewayError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "max_tokens": max_tokens,
            "temperature": self.temperature,
        });

        let resp = self.client.post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Status { provider: self.provider.clone(), status, body });
        }

        let json_res: Value = resp.json().await?;
        json_res["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GatewayError::EmptyResponse(self.provider.clone()))
    }
}

/// Anthropic /v1/messages 接口
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f64,
}

impl AnthropicClient {
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(client: Client, api_key: String, base_url: &str, model: &str, temperature: f64) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
        }
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    fn provider(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GatewayError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": self.temperature,
            "messages": [
                {"role": "user", "content": prompt}
            ],
        });

        let resp = self.client.post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Status { provider: "anthropic".to_string(), status, body });
        }

        let json_res: Value = resp.json().await?;
        json_res["content"]
            .as_array()
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|b| b["type"].as_str() == Some("text"))
                    .and_then(|b| b["text"].as_str())
            })
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GatewayError::EmptyResponse("anthropic".to_string()))
    }
}

/// 按配置选网关。auto 模式优先 Anthropic，其次 OpenAI，再次 DeepSeek；都没有 Key 则返回 None。
pub fn build_gateway(config: &LlmConfig, credentials: &Credentials, client: Client) -> Option<Arc<dyn LanguageModel>> {
    let provider = config.provider.trim().to_ascii_lowercase();

    let gateway: Result<Arc<dyn LanguageModel>, GatewayError> = match provider.as_str() {
        "none" | "off" | "" => {
            info!("🧠 LLM disabled by config, conversations run in degraded mode");
            return None;
        }
        "anthropic" => anthropic(config, credentials, client),
        "openai" => openai(config, credentials, client),
        "deepseek" => deepseek(config, credentials, client),
        "auto" => anthropic(config, credentials, client.clone())
            .or_else(|_| openai(config, credentials, client.clone()))
            .or_else(|_| deepseek(config, credentials, client)),
        other => {
            warn!("⚠️ Unknown llm.provider '{}', running without LLM", other);
            return None;
        }
    };

    match gateway {
        Ok(gw) => {
            info!("🧠 LLM gateway ready: {}", gw.provider());
            Some(gw)
        }
        Err(e) => {
            warn!("⚠️ No LLM gateway ({}). Conversations fall back to canned mode.", e);
            None
        }
    }
}

fn anthropic(config: &LlmConfig, credentials: &Credentials, client: Client) -> Result<Arc<dyn LanguageModel>, GatewayError> {
    let key = credentials.anthropic_api_key.clone().ok_or(GatewayError::MissingCredentials("ANTHROPIC"))?;
    Ok(Arc::new(AnthropicClient::new(client, key, &config.anthropic_base_url, &config.anthropic_model, config.temperature)))
}

fn openai(config: &LlmConfig, credentials: &Credentials, client: Client) -> Result<Arc<dyn LanguageModel>, GatewayError> {
    let key = credentials.openai_api_key.clone().ok_or(GatewayError::MissingCredentials("OPENAI"))?;
    Ok(Arc::new(ChatCompletionsClient::new(client, "openai", key, &config.openai_base_url, &config.openai_model, config.temperature)))
}

fn deepseek(config: &LlmConfig, credentials: &Credentials, client: Client) -> Result<Arc<dyn LanguageModel>, GatewayError> {
    let key = credentials.deepseek_api_key.clone().ok_or(GatewayError::MissingCredentials("DEEPSEEK"))?;
    Ok(Arc::new(ChatCompletionsClient::new(client, "deepseek", key, &config.deepseek_base_url, &config.deepseek_model, config.temperature)))
}

/// 去掉推理模型输出里的 <think>...</think> 段
pub fn clean_reasoning_content(raw: &str) -> String {
    let mut clean = raw.to_string();
    while let Some(start) = clean.find("<think>") {
        match clean[start..].find("</think>") {
            Some(rel_end) => {
                let end = start + rel_end + "</think>".len();
                clean.replace_range(start..end, "");
            }
            None => break,
        }
    }
    clean
}
