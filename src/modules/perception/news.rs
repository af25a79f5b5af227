use reqwest::Client;
use anyhow::{Result, Context};
use chrono::{Duration, Utc};
use tracing::{info, warn};

use super::structs::{NewsApiResponse, RawArticle};
use crate::config::feed_profile::NewsConfig;

pub struct NewsSentinel {
    client: Client,
    api_key: Option<String>,
    config: NewsConfig,
}

impl NewsSentinel {
    pub fn new(client: Client, api_key: Option<String>, config: NewsConfig) -> Self {
        Self { client, api_key, config }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// 拉取 NewsAPI 文章。没有 Key 时直接返回空列表，不报错。
    pub async fn fetch_articles(&self, query: Option<&str>, days_back: i64, page_size: u32) -> Result<Vec<RawArticle>> {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("📰 NEWS_API_KEY not configured, skipping fetch");
            return Ok(Vec::new());
        };

        let end_date = Utc::now();
        let start_date = end_date - Duration::days(days_back.max(0));
        let from = start_date.format("%Y-%m-%d").to_string();
        let to = end_date.format("%Y-%m-%d").to_string();
        let page_size = page_size.clamp(1, 100).to_string();

        let mut params: Vec<(&str, &str)> = vec![
            ("apiKey", api_key),
            ("from", from.as_str()),
            ("to", to.as_str()),
            ("sortBy", self.config.sort_by.as_str()),
            ("pageSize", page_size.as_str()),
            ("language", self.config.language.as_str()),
        ];
        if let Some(q) = query.filter(|q| !q.trim().is_empty()) {
            params.push(("q", q));
        }

        let resp = self.client.get(&self.config.base_url)
            .query(&params)
            .send()
            .await
            .context("failed to call NewsAPI")?
            .error_for_status()
            .context("NewsAPI returned non-success status")?;

        let data: NewsApiResponse = resp.json().await.context("failed to decode NewsAPI response")?;

        if data.status != "ok" {
            warn!("⚠️ NewsAPI error: {}", data.message.unwrap_or_else(|| "Unknown error".to_string()));
            return Ok(Vec::new());
        }

        info!("📰 NewsAPI returned {} articles (q={:?}, days={})", data.articles.len(), query, days_back);
        Ok(data.articles)
    }
}
