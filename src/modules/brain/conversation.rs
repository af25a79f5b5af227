use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::degraded::build_degraded;
use super::identity::{assign_identities, ConversationTurn, Side};
use super::llm::{clean_reasoning_content, GatewayError, LanguageModel};
use super::parser::{parse_turns, StrategyTier};
use super::prompt::{build_conversation_prompt, build_persona_prompt, build_summary_prompt, ConversationStyle, Persona, PERSONAS};
use crate::config::feed_profile::LlmConfig;
use crate::modules::perception::enrichment::KeywordText;
use crate::modules::perception::structs::{truncate_chars, ArticleRef};
use crate::utils::Clock;

const CHAT_HISTORY_LIMIT: usize = 3;
const CHAT_ARTICLE_LIMIT: usize = 3;
const CHAT_ARTICLE_CHARS: usize = 200;
const FALLBACK_SUMMARY_CHARS: usize = 200;
const CHAT_FAILURE_LINE: &str = "This is a complex topic but I'm having some technical difficulties right now";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ChatArticle {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    #[serde(default = "default_history_speaker")]
    pub speaker: String,
    #[serde(default)]
    pub text: String,
}

fn default_history_speaker() -> String {
    "User".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ChatContext {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub subtopic: String,
    #[serde(default)]
    pub articles: Vec<ChatArticle>,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatReply {
    pub speaker: String,
    pub side: Side,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

struct Budgets {
    conversation: u32,
    chat: u32,
    summary: u32,
    timeout: Duration,
}

/// 会话合成器：提示词 -> 网关 -> 解析 -> (降级) -> 身份分配。对外永不报错。
pub struct ConversationSynth {
    gateway: Option<Arc<dyn LanguageModel>>,
    clock: Arc<dyn Clock>,
    budgets: Budgets,
}

impl ConversationSynth {
    pub fn new(gateway: Option<Arc<dyn LanguageModel>>, clock: Arc<dyn Clock>, config: &LlmConfig) -> Self {
        Self {
            gateway,
            clock,
            budgets: Budgets {
                conversation: config.conversation_max_tokens,
                chat: config.chat_max_tokens,
                summary: config.summary_max_tokens,
                timeout: Duration::from_secs(config.timeout_sec.max(1)),
            },
        }
    }

    pub fn provider(&self) -> Option<&str> {
        self.gateway.as_ref().map(|g| g.provider())
    }

    pub fn is_configured(&self) -> bool {
        self.gateway.is_some()
    }

    pub async fn synthesize<R: Rng + Send + ?Sized>(
        &self,
        articles: &[ArticleRef],
        topic: &str,
        style: ConversationStyle,
        rng: &mut R,
    ) -> Vec<ConversationTurn> {
        if articles.is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        if let Some(gateway) = &self.gateway {
            let prompt = build_conversation_prompt(articles, topic, style);
            match self.call(gateway.as_ref(), &prompt, self.budgets.conversation).await {
                Ok(raw) => {
                    let parsed = parse_turns(&raw, self.clock.as_ref());
                    if parsed.tier == StrategyTier::Failed {
                        warn!("🧩 Model output unusable for topic '{}', building degraded conversation", topic);
                    } else {
                        debug!("🧩 Parsed {} turns via {:?} tier", parsed.turns.len(), parsed.tier);
                    }
                    candidates = parsed.turns;
                }
                Err(e) => warn!("❌ Conversation generation failed ({}), building degraded conversation", e),
            }
        }

        if candidates.is_empty() {
            candidates = build_degraded(articles, style, self.clock.as_ref());
        }

        let mut turns = assign_identities(candidates, rng);
        for turn in &mut turns {
            turn.news_source_url = resolve_source_url(articles, &turn.attributed_source);
        }
        info!("💬 Conversation for '{}' ready: {} turns", topic, turns.len());
        turns
    }

    pub async fn reply<R: Rng + Send + ?Sized>(&self, request: &ChatContext, rng: &mut R) -> ChatReply {
        let persona: &Persona = PERSONAS.choose(rng).unwrap_or(&PERSONAS[0]);

        let text = match &self.gateway {
            None => format!("This is actually pretty interesting from my perspective as {}", persona.background),
            Some(gateway) => {
                let context = chat_context(request);
                let prompt = build_persona_prompt(persona, &context, &request.message);
                match self.call_for_display(gateway.as_ref(), &prompt, self.budgets.chat).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("❌ Chat reply failed: {}", e);
                        CHAT_FAILURE_LINE.to_string()
                    }
                }
            }
        };

        ChatReply {
            speaker: persona.name.to_string(),
            side: Side::Left,
            text,
            timestamp: self.clock.now(),
        }
    }

    /// 没有正文时直接用描述截断，不调用模型
    pub async fn summarize(&self, title: &str, content: &str, description: &str) -> String {
        let body = if content.trim().is_empty() { description } else { content };
        if body.trim().is_empty() {
            return fallback_summary(description);
        }

        let Some(gateway) = &self.gateway else {
            return fallback_summary(description);
        };

        let prompt = build_summary_prompt(title, body);
        match self.call_for_display(gateway.as_ref(), &prompt, self.budgets.summary).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("⚠️ Summary failed for '{}': {}", truncate_chars(title, 60), e);
                fallback_summary(description)
            }
        }
    }

    async fn call(&self, gateway: &dyn LanguageModel, prompt: &str, max_tokens: u32) -> Result<String, GatewayError> {
        match timeout(self.budgets.timeout, gateway.generate(prompt, max_tokens)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.budgets.timeout.as_secs())),
        }
    }

    /// 直接展示给用户的文本：去掉 <think> 段，剩下空串按失败处理
    async fn call_for_display(&self, gateway: &dyn LanguageModel, prompt: &str, max_tokens: u32) -> Result<String, GatewayError> {
        let raw = self.call(gateway, prompt, max_tokens).await?;
        let text = clean_reasoning_content(&raw).trim().to_string();
        if text.is_empty() {
            return Err(GatewayError::EmptyResponse(gateway.provider().to_string()));
        }
        Ok(text)
    }
}

pub fn fallback_summary(description: &str) -> String {
    format!("{}...", truncate_chars(description, FALLBACK_SUMMARY_CHARS))
}

/// 先找来源名完全相同的文章，再退到整词包含（"Reuters" 对 "Reuters UK"），不做子串匹配
fn resolve_source_url(articles: &[ArticleRef], attributed: &str) -> String {
    let needle = attributed.trim().to_lowercase();
    if needle.is_empty() {
        return String::new();
    }

    let with_url = || articles.iter().filter(|a| !a.url.is_empty() && !a.source_name.trim().is_empty());

    with_url()
        .find(|a| a.source_name.trim().to_lowercase() == needle)
        .or_else(|| {
            let needle_words = KeywordText::new(&needle);
            with_url().find(|a| {
                KeywordText::new(&a.source_name).contains(&needle) || needle_words.contains(&a.source_name)
            })
        })
        .map(|a| a.url.clone())
        .unwrap_or_default()
}

fn chat_context(request: &ChatContext) -> String {
    let mut context = format!("Topic: {}", request.topic);
    if !request.subtopic.is_empty() {
        context.push_str(&format!("\nSubtopic: {}", request.subtopic));
    }

    if !request.articles.is_empty() {
        context.push_str("\nRelevant articles:");
        for article in request.articles.iter().take(CHAT_ARTICLE_LIMIT) {
            let summary = article.summary.as_deref().unwrap_or(&article.description);
            context.push_str(&format!("\n- {}: {}", article.title, truncate_chars(summary, CHAT_ARTICLE_CHARS)));
        }
    }

    if !request.history.is_empty() {
        let skip = request.history.len().saturating_sub(CHAT_HISTORY_LIMIT);
        context.push_str("\nRecent conversation:");
        for msg in &request.history[skip..] {
            context.push_str(&format!("\n{}: {}", msg.speaker, msg.text));
        }
    }

    context
}
