use reqwest::Client;
use std::time::Duration;
use anyhow::{Result, Context};
use tracing::info;

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// 通用 HTTP Client，用于 NewsAPI 拉取文章
    pub fn create() -> Result<Client> {
        let builder = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .user_agent(concat!("news_plaza/", env!("CARGO_PKG_VERSION")));

        info!("🌐 [Http Client] News client ready");

        let client = builder.build().context("failed to build news http client")?;
        Ok(client)
    }

    /// LLM 专用 Client。总超时跟随配置，超时与其他网关错误同等处理。
    pub fn create_direct(timeout_sec: u64) -> Result<Client> {
        let builder = Client::builder()
            .timeout(Duration::from_secs(timeout_sec.max(1)))
            .connect_timeout(Duration::from_secs(10))
            // 强制 HTTP/1.1，长响应下更稳
            .http1_only();

        let client = builder.build().context("failed to build llm http client")?;
        Ok(client)
    }
}
