use chrono::{DateTime, Utc};
use serde::Serialize;

use super::enrichment::KeywordText;
use super::structs::{truncate_chars, ProcessedArticle};

const MIN_GROUP_SIZE: usize = 2;
const MAX_SUBTOPICS: usize = 8;
const PREVIEW_ARTICLES: usize = 5;
const DESCRIPTION_CHARS: usize = 150;
const GENERAL_KEY: &str = "general";

const SUBTOPIC_PATTERNS: &[(&str, &[&str])] = &[
    ("business", &[
        "IPO", "earnings", "merger", "acquisition", "layoffs", "hiring", "stock", "market",
        "startup", "funding", "venture capital", "cryptocurrency", "bitcoin", "tesla",
        "apple", "google", "microsoft", "amazon", "meta", "netflix", "uber", "airbnb",
    ]),
    ("technology", &[
        "AI", "artificial intelligence", "machine learning", "chatgpt", "openai", "google",
        "apple", "microsoft", "meta", "tesla", "spacex", "quantum", "blockchain",
        "cybersecurity", "data privacy", "algorithm", "software", "hardware",
    ]),
    ("sports", &[
        "nfl", "nba", "mlb", "nhl", "soccer", "football", "basketball", "baseball",
        "olympics", "world cup", "championship", "playoff", "draft", "trade",
        "injury", "contract", "salary", "coach", "player",
    ]),
    ("health", &[
        "covid", "vaccine", "pandemic", "mental health", "cancer", "diabetes",
        "heart disease", "alzheimer", "dementia", "depression", "anxiety",
        "medication", "treatment", "research", "clinical trial",
    ]),
    ("politics", &[
        "election", "president", "congress", "senate", "house", "bill", "law",
        "policy", "immigration", "healthcare", "economy", "tax", "budget",
        "supreme court", "justice", "federal", "state", "local",
    ]),
    ("entertainment", &[
        "movie", "film", "netflix", "disney", "hbo", "streaming", "oscar",
        "grammy", "emmy", "music", "album", "concert", "tour", "celebrity",
        "actor", "actress", "director", "producer",
    ]),
];

#[derive(Debug, Clone, Serialize)]
pub struct Subtopic {
    pub id: String,
    pub title: String,
    pub description: String,
    pub article_count: usize,
    pub latest_article: ProcessedArticle,
    pub articles: Vec<ProcessedArticle>,
    pub created_at: DateTime<Utc>,
}

fn patterns_for(topic: &str) -> &'static [&'static str] {
    let topic = topic.trim().to_lowercase();
    SUBTOPIC_PATTERNS
        .iter()
        .find(|(name, _)| *name == topic)
        .map(|(_, patterns)| *patterns)
        .unwrap_or(&[])
}

/// 按关键词把同一主题下的文章分组，至少两篇才算一个子话题
pub fn extract_subtopics(articles: &[ProcessedArticle], topic: &str, now: DateTime<Utc>) -> Vec<Subtopic> {
    let patterns = patterns_for(topic);

    // 保持首次出现顺序，分组下标参与 id
    let mut groups: Vec<(String, Vec<&ProcessedArticle>)> = Vec::new();
    for article in articles {
        let key = subtopic_key(article, patterns);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(article),
            None => groups.push((key, vec![article])),
        }
    }

    let mut subtopics: Vec<Subtopic> = groups
        .into_iter()
        .enumerate()
        .filter(|(_, (_, members))| members.len() >= MIN_GROUP_SIZE)
        .filter_map(|(index, (key, members))| {
            let latest = members
                .iter()
                .copied()
                .reduce(|best, a| if a.published_at > best.published_at { a } else { best })?;

            let title = if key == GENERAL_KEY {
                format!("General {} News", title_case(topic))
            } else {
                format!("{} News", title_case(&key))
            };

            Some(Subtopic {
                id: format!("{}_{}_{}", slug(topic), slug(&key), index),
                title,
                description: format!("{}...", truncate_chars(&latest.description, DESCRIPTION_CHARS)),
                article_count: members.len(),
                latest_article: latest.clone(),
                articles: members.iter().take(PREVIEW_ARTICLES).map(|a| (*a).clone()).collect(),
                created_at: now,
            })
        })
        .collect();

    subtopics.sort_by(|a, b| b.article_count.cmp(&a.article_count));
    subtopics.truncate(MAX_SUBTOPICS);
    subtopics
}

fn subtopic_key(article: &ProcessedArticle, patterns: &[&str]) -> String {
    let text = KeywordText::new(&format!("{} {}", article.title, article.description));
    if let Some(pattern) = patterns.iter().find(|p| text.contains(p)) {
        return (*pattern).to_string();
    }

    // 没有命中关键词时，取标题里第一个像实体的大写单词
    article
        .title
        .split_whitespace()
        .find(|word| {
            word.chars().count() > 3
                && word.chars().all(char::is_alphabetic)
                && word.chars().next().map_or(false, char::is_uppercase)
        })
        .map(str::to_string)
        .unwrap_or_else(|| GENERAL_KEY.to_string())
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn slug(text: &str) -> String {
    let mut out = String::new();
    for c in text.trim().to_lowercase().chars() {
        if c.is_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_end_matches('_').to_string()
}
