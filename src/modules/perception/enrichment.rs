use std::collections::HashSet;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, info};

use super::structs::{BiasAnalysis, BiasType, ProcessedArticle, RawArticle, SentimentBreakdown};
use crate::modules::brain::conversation::{fallback_summary, ConversationSynth};

pub const GENERAL_TOPIC: &str = "General";

/// 表顺序即平分时的优先顺序
pub const TOPIC_KEYWORDS: &[(&str, &[&str])] = &[
    ("Technology", &[
        "artificial intelligence", "ai", "machine learning", "tech", "software", "hardware",
        "computer", "internet", "digital", "cyber", "data", "algorithm", "app", "startup",
        "innovation", "robot", "automation", "blockchain", "cryptocurrency", "bitcoin",
        "programming", "coding", "developer", "tech company", "silicon valley",
    ]),
    ("Politics", &[
        "election", "government", "president", "congress", "senate", "vote", "campaign",
        "policy", "law", "bill", "legislation", "democrat", "republican", "political",
        "parliament", "minister", "prime minister", "mayor", "governor", "senator",
        "representative", "cabinet", "administration", "federal", "state", "local",
    ]),
    ("Economy", &[
        "economy", "economic", "market", "stock", "finance", "financial", "bank",
        "investment", "trading", "recession", "inflation", "gdp", "unemployment",
        "business", "corporate", "company", "earnings", "profit", "revenue",
        "dollar", "currency", "trade", "export", "import", "budget", "debt",
    ]),
    ("Health", &[
        "health", "medical", "medicine", "doctor", "hospital", "patient", "disease",
        "treatment", "drug", "pharmaceutical", "vaccine", "covid", "pandemic",
        "research", "study", "clinical", "therapy", "surgery", "diagnosis",
        "healthcare", "wellness", "fitness", "nutrition", "mental health",
    ]),
    ("Environment", &[
        "climate", "environment", "environmental", "global warming", "carbon",
        "emission", "pollution", "renewable", "energy", "solar", "wind", "green",
        "sustainability", "conservation", "wildlife", "nature", "forest", "ocean",
        "weather", "temperature", "greenhouse", "fossil fuel", "clean energy",
    ]),
    ("Sports", &[
        "sports", "football", "basketball", "baseball", "soccer", "tennis", "golf",
        "olympics", "championship", "tournament", "game", "match", "player",
        "team", "coach", "league", "season", "playoff", "victory", "defeat",
        "athlete", "training", "fitness", "stadium", "arena",
    ]),
    ("Entertainment", &[
        "movie", "film", "cinema", "actor", "actress", "director", "producer",
        "music", "song", "album", "artist", "singer", "band", "concert",
        "television", "tv", "show", "series", "episode", "streaming", "netflix",
        "hollywood", "celebrity", "award", "oscar", "grammy", "entertainment",
    ]),
    ("Science", &[
        "science", "scientific", "research", "study", "discovery", "experiment",
        "laboratory", "scientist", "physics", "chemistry", "biology", "space",
        "nasa", "astronomy", "universe", "planet", "moon", "mars", "earth",
        "evolution", "genetics", "dna", "molecule", "atom", "quantum",
    ]),
];

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "amazing", "brilliant", "incredible", "success", "successful",
    "win", "wins", "won", "breakthrough", "gain", "gains", "growth", "improve", "improved",
    "hope", "hopeful", "strong", "record", "positive", "benefit", "celebrate", "praise",
    "boost", "surge", "rally", "thrive", "progress", "optimistic", "recovery", "best",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "crisis", "failure", "fail", "fails", "failed", "loss", "losses",
    "decline", "drop", "crash", "war", "death", "dead", "kill", "killed", "attack",
    "scandal", "devastating", "shocking", "fear", "fears", "worry", "worries", "risk",
    "threat", "warning", "lawsuit", "fraud", "negative", "weak", "collapse", "plunge",
    "worst", "violence", "recession",
];

const SUBJECTIVE_WORDS: &[&str] = &["amazing", "terrible", "shocking", "incredible", "devastating", "brilliant"];
const LOADED_WORDS: &[&str] = &["controversial", "scandal", "crisis", "breakthrough", "failure", "success"];

/// 单个情感词的权重，compound 归一化常数
const WORD_VALENCE: f64 = 2.0;
const COMPOUND_ALPHA: f64 = 15.0;

/// 小写分词后的文本，单词按整词匹配，多词短语按连续词匹配
pub struct KeywordText {
    tokens: Vec<String>,
    set: HashSet<String>,
    joined: String,
}

impl KeywordText {
    pub fn new(text: &str) -> Self {
        let tokens: Vec<String> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        let joined = format!(" {} ", tokens.join(" "));
        let set = tokens.iter().cloned().collect();
        Self { tokens, set, joined }
    }

    /// 关键词按同样的规则分词，"Reuters.com" 与 "reuters com" 等价
    pub fn contains(&self, keyword: &str) -> bool {
        let needle = KeywordText::new(keyword);
        match needle.tokens.as_slice() {
            [] => false,
            [single] => self.set.contains(single),
            _ => self.joined.contains(&needle.joined),
        }
    }

    fn count_tokens_in(&self, lexicon: &[&str]) -> usize {
        self.tokens.iter().filter(|t| lexicon.contains(&t.as_str())).count()
    }

    fn count_present(&self, words: &[&str]) -> usize {
        words.iter().filter(|w| self.set.contains::<str>(w)).count()
    }
}

pub fn categorize_article(title: &str, description: &str, content: &str) -> &'static str {
    let text = KeywordText::new(&format!("{} {} {}", title, description, content));

    let mut best = (GENERAL_TOPIC, 0usize);
    for (topic, keywords) in TOPIC_KEYWORDS {
        let score = keywords.iter().filter(|k| text.contains(k)).count();
        if score > best.1 {
            best = (*topic, score);
        }
    }
    best.0
}

/// 词典法情感与偏向打分。body 为空时直接判为中性。
pub fn detect_bias(title: &str, body: &str) -> BiasAnalysis {
    if body.trim().is_empty() {
        return BiasAnalysis::default();
    }

    let text = KeywordText::new(&format!("{} {}", title, body));
    let total = text.tokens.len().max(1) as f64;

    let pos = text.count_tokens_in(POSITIVE_WORDS) as f64;
    let neg = text.count_tokens_in(NEGATIVE_WORDS) as f64;

    let sum = (pos - neg) * WORD_VALENCE;
    let compound = sum / (sum * sum + COMPOUND_ALPHA).sqrt();
    let polarity = ((pos - neg) / total * 10.0).clamp(-1.0, 1.0);

    let language_hits = text.count_present(SUBJECTIVE_WORDS) + text.count_present(LOADED_WORDS);

    let score = (compound.abs() * 50.0 + polarity.abs() * 50.0 + language_hits as f64 * 5.0).min(100.0);

    let bias_type = if score < 20.0 {
        BiasType::Neutral
    } else if compound > 0.1 {
        BiasType::Positive
    } else if compound < -0.1 {
        BiasType::Negative
    } else {
        BiasType::Mixed
    };

    BiasAnalysis {
        bias_score: round_to(score, 1),
        bias_type,
        confidence: round_to(score, 1),
        sentiment_breakdown: SentimentBreakdown {
            positive: round_to(pos / total, 3),
            negative: round_to(neg / total, 3),
            neutral: round_to(1.0 - (pos + neg) / total, 3),
            compound: round_to(compound, 3),
        },
    }
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// 原始文章 -> 带主题、摘要、偏向分析的文章
pub struct Enricher {
    synth: Arc<ConversationSynth>,
    summarize_with_llm: bool,
    concurrency: usize,
}

impl Enricher {
    pub fn new(synth: Arc<ConversationSynth>, summarize_with_llm: bool, concurrency: usize) -> Self {
        Self { synth, summarize_with_llm, concurrency: concurrency.max(1) }
    }

    pub async fn process_articles(&self, raw: Vec<RawArticle>) -> Vec<ProcessedArticle> {
        let total = raw.len();
        let kept: Vec<RawArticle> = raw
            .into_iter()
            .filter(|a| non_blank(&a.title) && non_blank(&a.description))
            .collect();
        if kept.len() < total {
            debug!("🧹 Dropped {} articles without title or description", total - kept.len());
        }

        let use_llm = self.summarize_with_llm && self.synth.is_configured();
        // 每个 future 持有自己的文章和 Arc
        let summaries: Vec<String> = stream::iter(kept.clone())
            .map(|a| {
                let synth = self.synth.clone();
                async move {
                    let title = a.title.unwrap_or_default();
                    let description = a.description.unwrap_or_default();
                    if use_llm {
                        let content = a.content.unwrap_or_default();
                        synth.summarize(&title, &content, &description).await
                    } else {
                        fallback_summary(&description)
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let processed: Vec<ProcessedArticle> = kept
            .into_iter()
            .zip(summaries)
            .enumerate()
            .map(|(i, (a, summary))| to_processed(i + 1, a, summary))
            .collect();

        info!("📰 Processed {} / {} articles", processed.len(), total);
        processed
    }
}

fn to_processed(id: usize, raw: RawArticle, summary: String) -> ProcessedArticle {
    let title = raw.title.unwrap_or_default();
    let description = raw.description.unwrap_or_default();
    let content = raw.content.unwrap_or_default();

    let topic = categorize_article(&title, &description, &content).to_string();
    let body = if content.trim().is_empty() { &description } else { &content };
    let bias_analysis = detect_bias(&title, body);

    ProcessedArticle {
        id,
        title,
        description,
        content,
        url: raw.url.unwrap_or_default(),
        url_to_image: raw.url_to_image.unwrap_or_default(),
        published_at: raw.published_at.unwrap_or_default(),
        source: raw.source.name.unwrap_or_default(),
        topic,
        summary,
        bias_analysis,
    }
}

fn non_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedProfile;
    use crate::modules::brain::llm::{GatewayError, LanguageModel};
    use crate::modules::perception::structs::RawSource;
    use crate::utils::SystemClock;

    fn raw(title: Option<&str>, description: Option<&str>, source: &str) -> RawArticle {
        RawArticle {
            source: RawSource { id: None, name: Some(source.to_string()) },
            title: title.map(str::to_string),
            description: description.map(str::to_string),
            content: None,
            url: Some("https://example.com/x".into()),
            url_to_image: None,
            published_at: Some("2024-01-15T10:30:00Z".into()),
        }
    }

    fn offline_enricher() -> Enricher {
        let config = FeedProfile::from_config(FeedProfile::defaults().unwrap().build().unwrap()).unwrap();
        let synth = Arc::new(ConversationSynth::new(None, Arc::new(SystemClock), &config.llm));
        Enricher::new(synth, true, 2)
    }

    #[test]
    fn categorizes_by_keyword_score() {
        assert_eq!(categorize_article("Senate passes new election bill", "", ""), "Politics");
        assert_eq!(categorize_article("AI startup ships new software", "", ""), "Technology");
        assert_eq!(categorize_article("Bakery celebrates anniversary with pie contest", "", ""), GENERAL_TOPIC);
    }

    #[test]
    fn keywords_match_whole_tokens_and_phrases() {
        // "said" 里的 "ai"、"apple" 里的 "app" 不算
        assert_eq!(categorize_article("Apple said hello", "", ""), GENERAL_TOPIC);
        let text = KeywordText::new("Advances in Machine-Learning research");
        assert!(text.contains("machine learning"));
        assert!(!text.contains("learning machine"));
    }

    #[test]
    fn ties_go_to_the_earlier_topic() {
        // research/study 同时属于 Health 和 Science
        assert_eq!(categorize_article("New research study", "", ""), "Health");
    }

    #[test]
    fn upbeat_text_scores_positive() {
        let analysis = detect_bias("Amazing breakthrough", "Scientists hail brilliant success in great new cancer treatment");
        assert_eq!(analysis.bias_type, BiasType::Positive);
        assert_eq!(analysis.bias_score, 100.0);
        assert!(analysis.sentiment_breakdown.compound > 0.9);
    }

    #[test]
    fn gloomy_text_scores_negative() {
        let analysis = detect_bias("Devastating crash", "Markets collapse as fears of recession and fraud worsen the crisis");
        assert_eq!(analysis.bias_type, BiasType::Negative);
        assert!(analysis.bias_score >= 20.0);
        assert!(analysis.sentiment_breakdown.compound < -0.1);
    }

    #[test]
    fn balanced_loaded_text_is_mixed() {
        let analysis = detect_bias("Controversial breakthrough sparks crisis", "shocking and amazing observers");
        assert_eq!(analysis.sentiment_breakdown.compound, 0.0);
        assert_eq!(analysis.bias_score, 25.0);
        assert_eq!(analysis.bias_type, BiasType::Mixed);
    }

    #[test]
    fn plain_or_empty_text_is_neutral() {
        let plain = detect_bias("City council meets on Tuesday", "The council will discuss the schedule for road repairs");
        assert_eq!(plain.bias_type, BiasType::Neutral);
        assert_eq!(plain.bias_score, 0.0);
        assert_eq!(plain.sentiment_breakdown.neutral, 1.0);

        assert_eq!(detect_bias("Title only", "  "), BiasAnalysis::default());
    }

    #[test]
    fn language_word_counts_ignore_repeats_and_case() {
        let text = KeywordText::new("SHOCKING news, shocking again. A Scandal!");
        assert_eq!(text.count_present(SUBJECTIVE_WORDS), 1);
        assert_eq!(text.count_present(LOADED_WORDS), 1);
        assert_eq!(text.count_tokens_in(NEGATIVE_WORDS), 3);
    }

    #[test]
    fn processing_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let enricher = offline_enricher();
        let fut = enricher.process_articles(vec![raw(Some("t"), Some("d"), "AP")]);
        assert_send(&fut);
    }

    struct EchoGateway;

    #[async_trait::async_trait]
    impl LanguageModel for EchoGateway {
        fn provider(&self) -> &str {
            "echo"
        }

        async fn generate(&self, prompt: &str, _max_tokens: u32) -> Result<String, GatewayError> {
            let title = prompt.lines().find(|l| l.starts_with("Title: ")).unwrap_or_default();
            Ok(format!("Summary of {}", title.trim_start_matches("Title: ")))
        }
    }

    #[tokio::test]
    async fn llm_summaries_keep_article_order() {
        let config = FeedProfile::from_config(FeedProfile::defaults().unwrap().build().unwrap()).unwrap();
        let gateway: Arc<dyn LanguageModel> = Arc::new(EchoGateway);
        let synth = Arc::new(ConversationSynth::new(Some(gateway), Arc::new(SystemClock), &config.llm));
        let enricher = Enricher::new(synth, true, 3);

        let input: Vec<RawArticle> = (0..5)
            .map(|i| raw(Some(&format!("Story {}", i)), Some("Some description here"), "AP"))
            .collect();
        let processed = enricher.process_articles(input).await;

        let summaries: Vec<&str> = processed.iter().map(|a| a.summary.as_str()).collect();
        assert_eq!(summaries, vec!["Summary of Story 0", "Summary of Story 1", "Summary of Story 2", "Summary of Story 3", "Summary of Story 4"]);
    }

    #[test]
    fn punctuated_keywords_match_by_tokens() {
        let text = KeywordText::new("Reported by reuters.com staff");
        assert!(text.contains("Reuters.com"));
        assert!(text.contains("reuters com staff"));
        assert!(!text.contains("  "));
        assert!(!KeywordText::new("Japan Times").contains("AP"));
    }

    #[tokio::test]
    async fn process_skips_incomplete_records_and_numbers_from_one() {
        let input = vec![
            raw(Some("Senate passes election bill"), Some("Lawmakers vote on the new policy"), "AP"),
            raw(None, Some("no title"), "AP"),
            raw(Some("no description"), Some("   "), "AP"),
            raw(Some("AI startup raises funding"), Some(&"d".repeat(250)), "TechCrunch"),
        ];
        let processed = offline_enricher().process_articles(input).await;

        assert_eq!(processed.len(), 2);
        assert_eq!(processed[0].id, 1);
        assert_eq!(processed[1].id, 2);
        assert_eq!(processed[0].topic, "Politics");
        assert_eq!(processed[1].topic, "Technology");
        assert_eq!(processed[1].source, "TechCrunch");
        assert_eq!(processed[1].summary, format!("{}...", "d".repeat(200)));
        assert_eq!(processed[0].url_to_image, "");
    }
}
