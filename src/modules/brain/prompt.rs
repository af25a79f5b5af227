use std::fmt::Write as _;

use serde::Serialize;

use super::parser::MAX_TURNS;
use crate::modules::perception::structs::{truncate_chars, ArticleRef, BiasType};

/// 进入提示词的文章数量上限
pub const PROMPT_ARTICLE_LIMIT: usize = 5;
const SUMMARY_CONTENT_CHARS: usize = 3000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStyle {
    #[default]
    Casual,
    GenZ,
}

impl ConversationStyle {
    /// 未知取值一律按 casual 处理
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
            Some("genz") | Some("gen_z") | Some("gen-z") | Some("gen z") => ConversationStyle::GenZ,
            _ => ConversationStyle::Casual,
        }
    }

    fn voice(self) -> &'static str {
        match self {
            ConversationStyle::Casual => {
                "Write it like friends texting: casual, conversational language, natural flow, \
                 one sentence per message."
            }
            ConversationStyle::GenZ => {
                "Write it like Gen Z group-chat texting: lowercase is fine, slang like \"ngl\", \
                 \"fr\", \"lowkey\", \"no cap\", short punchy reactions, one sentence per message."
            }
        }
    }
}

pub struct Persona {
    pub name: &'static str,
    pub background: &'static str,
    pub perspective: &'static str,
    pub style: &'static str,
}

pub const PERSONAS: &[Persona] = &[
    Persona {
        name: "Dr. Sarah Chen (Nature)",
        background: "Environmental scientist with expertise in climate research",
        perspective: "Data-driven, focuses on peer-reviewed research and scientific consensus",
        style: "Academic, precise, evidence-based",
    },
    Persona {
        name: "Mike Rodriguez (WSJ)",
        background: "Business and economics reporter for Wall Street Journal",
        perspective: "Market-focused, emphasizes economic implications and business impact",
        style: "Professional, analytical, business-oriented",
    },
    Persona {
        name: "Dr. Elena Patel (Scientific American)",
        background: "Science journalist specializing in emerging technologies",
        perspective: "Interdisciplinary approach, explains complex science for general audience",
        style: "Engaging, educational, accessible",
    },
    Persona {
        name: "Leo (MIT Tech Review)",
        background: "Technology analyst and innovation researcher",
        perspective: "Future-focused, emphasizes technological potential and disruption",
        style: "Forward-thinking, technical but accessible",
    },
    Persona {
        name: "Rin (Financial Times)",
        background: "International business correspondent",
        perspective: "Global economic perspective, geopolitical implications",
        style: "Sophisticated, international outlook, analytical",
    },
    Persona {
        name: "Zoe (Nature)",
        background: "Research scientist and peer review expert",
        perspective: "Rigorous scientific methodology, replication and validation",
        style: "Methodical, cautious, peer-review focused",
    },
    Persona {
        name: "Kai (AP)",
        background: "Associated Press reporter with fact-checking expertise",
        perspective: "Neutral, fact-based reporting, multiple source verification",
        style: "Objective, thorough, verification-focused",
    },
    Persona {
        name: "Jules (FiveThirtyEight)",
        background: "Data journalist and statistical analyst",
        perspective: "Statistical analysis, data interpretation, probability assessment",
        style: "Statistical, probabilistic, data-driven",
    },
];

fn stance(bias: BiasType) -> &'static str {
    match bias {
        BiasType::Positive => "upbeat, sees the opportunity in the story",
        BiasType::Negative => "skeptical, focused on the risks and fallout",
        BiasType::Mixed => "torn, weighs both sides before reacting",
        BiasType::Neutral => "even-handed, sticks to the facts",
    }
}

const FORMAT_RULES: &str = r#"OUTPUT FORMAT (STRICT):
- Return ONLY a valid JSON array. No commentary, no markdown, nothing before or after the array.
- Every element is an object with exactly these fields: "speaker", "side", "text", "timestamp", "source_url", "quote".
- All keys and string values use double quotes. No trailing commas. Every field is required; use "" when a value is unknown.
- "speaker" is the news source name. "text" is one sentence.
- "side" alternates "left", "right", "left", ... starting with "left".
- "timestamp" is ISO-8601, e.g. "2024-01-15T10:30:00Z".
- "source_url" is the URL of the article being referenced; "quote" is a short phrase taken from it."#;

const FORMAT_EXAMPLE: &str = r#"[
  {"speaker": "Source Name", "side": "left", "text": "message", "timestamp": "2024-01-15T10:30:00Z", "source_url": "https://example.com/article", "quote": "short phrase"},
  {"speaker": "Another Source", "side": "right", "text": "another message", "timestamp": "2024-01-15T10:31:00Z", "source_url": "", "quote": ""}
]"#;

/// 纯函数：相同输入必然得到相同提示词
pub fn build_conversation_prompt(articles: &[ArticleRef], topic: &str, style: ConversationStyle) -> String {
    let selected = &articles[..articles.len().min(PROMPT_ARTICLE_LIMIT)];

    let mut context = format!("Recent news articles about {}:\n", topic.trim());
    for article in selected {
        let _ = write!(context, "\n{}\n", article);
    }

    let mut voices = String::new();
    let mut seen: Vec<&str> = Vec::new();
    for article in selected {
        let name = article.source_name.trim();
        if name.is_empty() || seen.iter().any(|s| s.eq_ignore_ascii_case(name)) {
            continue;
        }
        seen.push(name);
        let _ = writeln!(voices, "- {}: {}", name, stance(article.bias_type));
    }
    if voices.is_empty() {
        voices.push_str("- Invent a few plausible news outlets with different perspectives.\n");
    }

    format!(
        "You are creating a short texting conversation between different news sources discussing these articles.\n\n\
         {context}\n\
         VOICES (each source keeps its typical perspective and tone):\n\
         {voices}\n\
         STYLE:\n{voice}\n\
         Reference the actual articles, give each source a different perspective, and keep the \
         conversation to at most {max} messages.\n\n\
         {rules}\n\n\
         EXAMPLE:\n{example}\n",
        context = context,
        voices = voices,
        voice = style.voice(),
        max = MAX_TURNS,
        rules = FORMAT_RULES,
        example = FORMAT_EXAMPLE,
    )
}

pub fn build_persona_prompt(persona: &Persona, context: &str, user_message: &str) -> String {
    format!(
        "You are {name}, {background}.\n\
         Your perspective: {perspective}\n\
         Your communication style: {style}\n\n\
         Context:\n{context}\n\n\
         User's question: {message}\n\n\
         Respond in a casual, conversational style (max one sentence) with your perspective on this topic.\n\
         Use natural, friendly language that's easy to understand.\n\
         If there are relevant articles mentioned in the context, reference them briefly.\n\
         Be authentic to your background but keep it conversational and engaging.\n",
        name = persona.name,
        background = persona.background,
        perspective = persona.perspective,
        style = persona.style,
        context = context,
        message = user_message.trim(),
    )
}

pub fn build_summary_prompt(title: &str, content: &str) -> String {
    let mut body = truncate_chars(content, SUMMARY_CONTENT_CHARS);
    if content.chars().count() > SUMMARY_CONTENT_CHARS {
        body.push_str("...");
    }
    format!(
        "Please provide a concise, neutral summary of this news article in 2-3 sentences:\n\n\
         Title: {}\n\
         Content: {}\n\n\
         Summary:",
        title, body
    )
}
