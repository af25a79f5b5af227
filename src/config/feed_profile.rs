use serde::Deserialize;
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewsConfig {
    pub base_url: String,
    pub days_back: i64,
    pub page_size: u32,
    pub topic_page_size: u32,
    pub subtopic_page_size: u32,
    pub language: String,
    pub sort_by: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// auto | anthropic | openai | deepseek | none
    pub provider: String,
    pub anthropic_model: String,
    pub anthropic_base_url: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub deepseek_model: String,
    pub deepseek_base_url: String,
    pub conversation_max_tokens: u32,
    pub chat_max_tokens: u32,
    pub summary_max_tokens: u32,
    pub temperature: f64,
    pub timeout_sec: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    pub summarize_with_llm: bool,
    pub summary_concurrency: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedProfile {
    pub server: ServerConfig,
    pub news: NewsConfig,
    pub llm: LlmConfig,
    pub enrichment: EnrichmentConfig,
}

impl FeedProfile {
    /// 默认值 -> feed_config.toml (可选) -> NEWS_PLAZA__* 环境变量
    pub fn load() -> Result<Self> {
        let settings = Self::defaults()?
            .add_source(File::with_name("feed_config").required(false))
            .add_source(
                Environment::with_prefix("NEWS_PLAZA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to build feed config")?;

        Self::from_config(settings)
    }

    pub fn from_config(settings: Config) -> Result<Self> {
        let profile: FeedProfile = settings
            .try_deserialize()
            .context("invalid feed config")?;
        Ok(profile)
    }

    pub fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let builder = Config::builder()
            .set_default("server.bind_addr", "0.0.0.0:5001")?
            .set_default("news.base_url", "https://newsapi.org/v2/everything")?
            .set_default("news.days_back", 7)?
            .set_default("news.page_size", 100)?
            .set_default("news.topic_page_size", 20)?
            .set_default("news.subtopic_page_size", 50)?
            .set_default("news.language", "en")?
            .set_default("news.sort_by", "popularity")?
            .set_default("llm.provider", "auto")?
            .set_default("llm.anthropic_model", "claude-3-haiku-20240307")?
            .set_default("llm.anthropic_base_url", "https://api.anthropic.com")?
            .set_default("llm.openai_model", "gpt-3.5-turbo")?
            .set_default("llm.openai_base_url", "https://api.openai.com/v1")?
            .set_default("llm.deepseek_model", "deepseek-chat")?
            .set_default("llm.deepseek_base_url", "https://api.deepseek.com")?
            .set_default("llm.conversation_max_tokens", 500)?
            .set_default("llm.chat_max_tokens", 100)?
            .set_default("llm.summary_max_tokens", 150)?
            .set_default("llm.temperature", 0.8)?
            .set_default("llm.timeout_sec", 30)?
            .set_default("enrichment.summarize_with_llm", false)?
            .set_default("enrichment.summary_concurrency", 4)?;
        Ok(builder)
    }
}

/// API Key 只从环境变量读取，不进配置文件
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub news_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            news_api_key: non_empty_var("NEWS_API_KEY"),
            anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            deepseek_api_key: non_empty_var("DEEPSEEK_API_KEY"),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
