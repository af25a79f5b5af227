use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::feed_profile::NewsConfig;
use crate::modules::brain::conversation::{ChatContext, ConversationSynth};
use crate::modules::brain::prompt::ConversationStyle;
use crate::modules::perception::structs::{ArticleRef, ProcessedArticle};
use crate::modules::perception::subtopics::extract_subtopics;
use crate::modules::perception::{Enricher, NewsSentinel};
use crate::utils::Clock;

const FACT_LIMIT: usize = 5;

#[derive(Clone)]
pub struct AppState {
    pub sentinel: Arc<NewsSentinel>,
    pub enricher: Arc<Enricher>,
    pub synth: Arc<ConversationSynth>,
    pub clock: Arc<dyn Clock>,
    pub news: NewsConfig,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/news", get(get_news))
        .route("/api/topic/:topic", get(get_topic))
        .route("/api/subtopics/:topic", get(get_subtopics))
        .route("/api/subtopic/:topic/:subtopic_id", get(get_subtopic))
        .route("/api/conversation", post(post_conversation))
        .route("/api/chat", post(post_chat))
        .route("/api/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(bind_addr: &str, state: AppState) -> Result<()> {
    let app = build_router(state);

    let addr: SocketAddr = bind_addr.parse().with_context(|| format!("invalid bind address: {}", bind_addr))?;
    info!("🚀 News plaza listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind listener")?;
    axum::serve(listener, app).await.context("server stopped")?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct NewsQuery {
    q: Option<String>,
    days: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StyleQuery {
    style: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationRequest {
    #[serde(default)]
    articles: Vec<ArticleRef>,
    #[serde(default)]
    topic: String,
    style: Option<String>,
}

impl AppState {
    /// 拉取失败按空列表处理，只记日志
    async fn fetch_processed(&self, query: Option<&str>, days_back: i64, page_size: u32) -> Vec<ProcessedArticle> {
        let raw = match self.sentinel.fetch_articles(query, days_back, page_size).await {
            Ok(raw) => raw,
            Err(e) => {
                error!("❌ News fetch failed: {:#}", e);
                Vec::new()
            }
        };
        self.enricher.process_articles(raw).await
    }

    async fn topic_articles(&self, topic: &str, page_size: u32) -> Vec<ProcessedArticle> {
        self.fetch_processed(Some(topic), self.news.days_back, page_size)
            .await
            .into_iter()
            .filter(|a| a.topic.eq_ignore_ascii_case(topic))
            .collect()
    }
}

fn refs(articles: &[ProcessedArticle]) -> Vec<ArticleRef> {
    articles.iter().map(ArticleRef::from).collect()
}

async fn get_news(State(state): State<AppState>, Query(query): Query<NewsQuery>) -> Json<Value> {
    let days = query.days.unwrap_or(state.news.days_back).max(1);
    let q = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty());

    let articles = state.fetch_processed(q, days, state.news.page_size).await;
    if articles.is_empty() {
        return Json(json!({
            "success": false,
            "message": "No articles found or NewsAPI key not configured",
            "articles": [],
        }));
    }

    Json(json!({
        "success": true,
        "total_articles": articles.len(),
        "articles": articles,
    }))
}

async fn get_topic(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    Query(query): Query<StyleQuery>,
) -> Json<Value> {
    let style = ConversationStyle::from_label(query.style.as_deref());
    let articles = state.topic_articles(&topic, state.news.topic_page_size).await;

    let mut rng = StdRng::from_entropy();
    let conversation = state.synth.synthesize(&refs(&articles), &topic, style, &mut rng).await;
    let facts: Vec<&str> = articles.iter().take(FACT_LIMIT).map(|a| a.summary.as_str()).collect();

    Json(json!({
        "success": true,
        "topic": topic,
        "articles": articles,
        "conversation": conversation,
        "facts": facts,
    }))
}

async fn get_subtopics(State(state): State<AppState>, Path(topic): Path<String>) -> Json<Value> {
    let articles = state.topic_articles(&topic, state.news.subtopic_page_size).await;
    let subtopics = extract_subtopics(&articles, &topic, state.clock.now());

    Json(json!({
        "success": true,
        "topic": topic,
        "subtopics": subtopics,
        "total_articles": articles.len(),
    }))
}

async fn get_subtopic(
    State(state): State<AppState>,
    Path((topic, subtopic_id)): Path<(String, String)>,
    Query(query): Query<StyleQuery>,
) -> Result<Json<Value>, ApiError> {
    let style = ConversationStyle::from_label(query.style.as_deref());
    let articles = state.topic_articles(&topic, state.news.subtopic_page_size).await;

    let subtopic = extract_subtopics(&articles, &topic, state.clock.now())
        .into_iter()
        .find(|s| s.id == subtopic_id)
        .ok_or_else(|| ApiError::not_found("Subtopic not found"))?;

    let mut rng = StdRng::from_entropy();
    let conversation = state
        .synth
        .synthesize(&refs(&subtopic.articles), &subtopic.title, style, &mut rng)
        .await;

    Ok(Json(json!({
        "success": true,
        "topic": topic,
        "articles": subtopic.articles,
        "subtopic": subtopic,
        "conversation": conversation,
    })))
}

/// 直接把文章交给会话管线，不经过 NewsAPI
async fn post_conversation(State(state): State<AppState>, Json(request): Json<ConversationRequest>) -> Json<Value> {
    let request_id = Uuid::new_v4().to_string();
    let style = ConversationStyle::from_label(request.style.as_deref());
    info!("💬 [{}] conversation request: {} articles, topic '{}'", request_id, request.articles.len(), request.topic);

    let mut rng = StdRng::from_entropy();
    let conversation = state.synth.synthesize(&request.articles, &request.topic, style, &mut rng).await;

    Json(json!({
        "success": true,
        "request_id": request_id,
        "conversation": conversation,
    }))
}

async fn post_chat(State(state): State<AppState>, Json(request): Json<ChatContext>) -> Result<Json<Value>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::bad_request("No message provided"));
    }

    let mut rng = StdRng::from_entropy();
    let response = state.synth.reply(&request, &mut rng).await;

    Ok(Json(json!({
        "success": true,
        "response": response,
    })))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": state.clock.now(),
        "news_api_configured": state.sentinel.is_configured(),
        "llm_provider": state.synth.provider(),
        "llm_configured": state.synth.is_configured(),
    }))
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: &str) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.to_string() }
    }

    fn bad_request(message: &str) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!("⚠️ {} {}", self.status, self.message);
        let body = json!({ "success": false, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}
