use serde::{Serialize, Deserialize};

/// NewsAPI `/v2/everything` 返回的原始记录，字段全部可能缺失
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawArticle {
    #[serde(default)]
    pub source: RawSource,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub url_to_image: Option<String>,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSource {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewsApiResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub articles: Vec<RawArticle>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiasType {
    #[default]
    Neutral,
    Positive,
    Negative,
    Mixed,
}

impl BiasType {
    pub fn as_str(self) -> &'static str {
        match self {
            BiasType::Neutral => "neutral",
            BiasType::Positive => "positive",
            BiasType::Negative => "negative",
            BiasType::Mixed => "mixed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentBreakdown {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
    pub compound: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiasAnalysis {
    pub bias_score: f64,
    pub bias_type: BiasType,
    pub confidence: f64,
    #[serde(default)]
    pub sentiment_breakdown: SentimentBreakdown,
}

/// 经过分类、摘要和偏向打分后返回给前端的文章
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedArticle {
    pub id: usize,
    pub title: String,
    pub description: String,
    pub content: String,
    pub url: String,
    #[serde(rename = "urlToImage")]
    pub url_to_image: String,
    #[serde(rename = "publishedAt")]
    pub published_at: String,
    pub source: String,
    pub topic: String,
    pub summary: String,
    pub bias_analysis: BiasAnalysis,
}

/// 会话管线读取的文章视图。只读，核心流程不会修改它。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ArticleRefWire")]
pub struct ArticleRef {
    pub title: String,
    pub description: String,
    pub content: String,
    pub source_name: String,
    pub url: String,
    pub published_at: String,
    pub bias_type: BiasType,
}

/// 前端回传的文章：字段名两种写法都收，偏向可以在顶层也可以在 `bias_analysis` 里
#[derive(Deserialize)]
struct ArticleRefWire {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    content: String,
    #[serde(default, alias = "source")]
    source_name: String,
    #[serde(default)]
    url: String,
    #[serde(default, alias = "publishedAt")]
    published_at: String,
    #[serde(default)]
    bias_type: Option<BiasType>,
    #[serde(default)]
    bias_analysis: Option<NestedBias>,
}

#[derive(Deserialize)]
struct NestedBias {
    #[serde(default)]
    bias_type: Option<BiasType>,
}

impl From<ArticleRefWire> for ArticleRef {
    fn from(wire: ArticleRefWire) -> Self {
        let nested = wire.bias_analysis.and_then(|b| b.bias_type);
        Self {
            title: wire.title,
            description: wire.description,
            content: wire.content,
            source_name: wire.source_name,
            url: wire.url,
            published_at: wire.published_at,
            bias_type: wire.bias_type.or(nested).unwrap_or_default(),
        }
    }
}

impl From<&ProcessedArticle> for ArticleRef {
    fn from(article: &ProcessedArticle) -> Self {
        Self {
            title: article.title.clone(),
            description: article.description.clone(),
            content: article.content.clone(),
            source_name: article.source.clone(),
            url: article.url.clone(),
            published_at: article.published_at.clone(),
            bias_type: article.bias_analysis.bias_type,
        }
    }
}

/// 按字符截断，不会切断 UTF-8
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
