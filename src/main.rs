mod config;
mod utils;
mod modules;

use std::sync::Arc;

use dotenvy::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Credentials, FeedProfile};
use crate::modules::action::{run_server, AppState};
use crate::modules::brain::{build_gateway, ConversationSynth};
use crate::modules::perception::{Enricher, NewsSentinel};
use crate::utils::{Clock, HttpClientFactory, SystemClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("Starting News Plaza v{}...", env!("CARGO_PKG_VERSION"));

    // 1. 配置与密钥
    let profile = FeedProfile::load()?;
    let credentials = Credentials::from_env();
    if credentials.news_api_key.is_none() {
        warn!("⚠️ NEWS_API_KEY not set, news endpoints will return empty results");
    }

    // 2. 网络客户端
    let std_client = HttpClientFactory::create()?;
    let direct_client = HttpClientFactory::create_direct(profile.llm.timeout_sec)?;

    // 3. 模块组装
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let gateway = build_gateway(&profile.llm, &credentials, direct_client);
    let synth = Arc::new(ConversationSynth::new(gateway, clock.clone(), &profile.llm));
    let enricher = Arc::new(Enricher::new(
        synth.clone(),
        profile.enrichment.summarize_with_llm,
        profile.enrichment.summary_concurrency,
    ));
    let sentinel = Arc::new(NewsSentinel::new(std_client, credentials.news_api_key.clone(), profile.news.clone()));

    let state = AppState {
        sentinel,
        enricher,
        synth,
        clock,
        news: profile.news.clone(),
    };

    // 4. HTTP 服务
    run_server(&profile.server.bind_addr, state).await
}
