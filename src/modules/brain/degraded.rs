use super::identity::Side;
use super::parser::CandidateTurn;
use super::prompt::ConversationStyle;
use crate::modules::perception::structs::ArticleRef;
use crate::utils::Clock;

/// 文章来源不足两家时补位
pub const DEFAULT_SOURCES: &[&str] = &["TechCrunch", "Reuters", "Associated Press", "Wall Street Journal"];

const MAX_DEGRADED_SOURCES: usize = 4;

const CASUAL_LINES: &[&str] = &[
    "This is really interesting stuff",
    "I'm not sure what to make of this",
    "This seems concerning to me",
    "Why isn't this getting more attention?",
    "This is actually pretty fascinating",
    "This is crazy news",
    "What does this mean for everyone?",
    "This is making me worried",
    "This is actually a big deal",
    "This is pretty exciting news",
];

const GENZ_LINES: &[&str] = &[
    "ngl this is lowkey wild",
    "wait I'm so confused rn",
    "this is giving red flags fr",
    "why is nobody talking about this??",
    "okay this is kinda fascinating tho",
    "bro this news is unhinged",
    "what does this even mean for us",
    "not me getting stressed over this",
    "this is actually a huge deal no cap",
    "lowkey hyped about this ngl",
];

pub fn canned_lines(style: ConversationStyle) -> &'static [&'static str] {
    match style {
        ConversationStyle::Casual => CASUAL_LINES,
        ConversationStyle::GenZ => GENZ_LINES,
    }
}

/// 没有可用模型输出时，只靠文章来源名和固定台词拼一段对话
pub fn build_degraded(articles: &[ArticleRef], style: ConversationStyle, clock: &dyn Clock) -> Vec<CandidateTurn> {
    if articles.is_empty() {
        return Vec::new();
    }

    let sources = pick_sources(articles);
    let lines = canned_lines(style);

    sources
        .into_iter()
        .zip(lines.iter())
        .enumerate()
        .map(|(index, (source, line))| CandidateTurn {
            speaker: source,
            text: (*line).to_string(),
            side_hint: Some(Side::for_index(index).as_str().to_string()),
            timestamp: clock.now(),
            source_url: String::new(),
            quote: String::new(),
        })
        .collect()
}

/// 按首次出现顺序取最多 4 个不同来源；不足 2 个时用默认来源补到 n + 2 个
fn pick_sources(articles: &[ArticleRef]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for article in articles {
        let name = article.source_name.trim();
        if name.is_empty() || contains_ignore_case(&sources, name) {
            continue;
        }
        sources.push(name.to_string());
        if sources.len() == MAX_DEGRADED_SOURCES {
            break;
        }
    }

    if sources.len() < 2 {
        let target = sources.len() + 2;
        for fallback in DEFAULT_SOURCES {
            if sources.len() == target {
                break;
            }
            if !contains_ignore_case(&sources, fallback) {
                sources.push((*fallback).to_string());
            }
        }
    }

    sources
}

fn contains_ignore_case(sources: &[String], name: &str) -> bool {
    sources.iter().any(|s| s.eq_ignore_ascii_case(name))
}
