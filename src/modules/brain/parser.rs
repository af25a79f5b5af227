//! 模型输出修复管线。
//!
//! 模型返回的是不可信的自由文本，按置信度从高到低依次尝试：
//! 严格 JSON 提取 -> 正则模式提取 -> 逐行自由文本提取 -> 放弃。
//! 每一层都是全函数，失败只会降级到下一层，不会向外抛错。

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::llm::clean_reasoning_content;
use crate::utils::Clock;

/// 单次会话最多保留的轮数
pub const MAX_TURNS: usize = 6;
/// 自由文本层：行长度必须超过这个值
const MIN_LINE_CHARS: usize = 10;
/// 自由文本层：去掉引号星号后的最短消息
const MIN_MESSAGE_CHARS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyTier {
    Strict,
    Pattern,
    FreeText,
    Failed,
}

/// 身份分配之前的候选发言。`speaker` 是模型给出的原始署名。
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTurn {
    pub speaker: String,
    pub text: String,
    pub side_hint: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub source_url: String,
    pub quote: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTurns {
    pub tier: StrategyTier,
    pub turns: Vec<CandidateTurn>,
}

type Strategy = fn(&str, &dyn Clock) -> Vec<CandidateTurn>;

pub fn parse_turns(raw: &str, clock: &dyn Clock) -> ParsedTurns {
    let cleaned = strip_control_chars(&clean_reasoning_content(raw));

    let strategies: [(StrategyTier, Strategy); 3] = [
        (StrategyTier::Strict, strict_extraction),
        (StrategyTier::Pattern, pattern_extraction),
        (StrategyTier::FreeText, free_text_extraction),
    ];

    for (tier, strategy) in strategies {
        let mut turns = strategy(&cleaned, clock);
        if !turns.is_empty() {
            turns.truncate(MAX_TURNS);
            debug!("🧩 parsed {} turns via {:?}", turns.len(), tier);
            return ParsedTurns { tier, turns };
        }
        debug!("🧩 {:?} yielded nothing, demoting", tier);
    }

    ParsedTurns { tier: StrategyTier::Failed, turns: Vec::new() }
}

// ----------------------------------------------------------------------------
// 第一层：严格提取
// ----------------------------------------------------------------------------

fn strict_extraction(text: &str, clock: &dyn Clock) -> Vec<CandidateTurn> {
    for payload in json_candidates(text) {
        match serde_json::from_str::<Value>(&payload) {
            Ok(Value::Array(items)) => {
                return items
                    .iter()
                    .filter_map(|item| turn_from_value(item, clock))
                    .collect()
            }
            Ok(_) => {}
            Err(e) => debug!("strict parse failed: {}", e),
        }
    }
    Vec::new()
}

/// 候选载荷：尾部未闭合（被 token 预算截断）时先试补齐后的整段尾部，再试第一个 `[` 到最后一个 `]`
fn json_candidates(text: &str) -> Vec<String> {
    let Some(start) = text.find('[') else {
        return Vec::new();
    };

    let mut candidates = Vec::new();
    let (tail, truncated) = repair_structure(&text[start..]);
    if truncated {
        candidates.push(tail);
    }
    if let Some(end) = text.rfind(']').filter(|&end| end > start) {
        let (slice, _) = repair_structure(&text[start..=end]);
        if !candidates.contains(&slice) {
            candidates.push(slice);
        }
    }
    candidates
}

/// 字符串感知的单遍扫描：去掉 `]` / `}` / 结尾前的逗号，补齐未闭合的字符串和括号。
/// 第二个返回值表示是否补了闭合符。
fn repair_structure(payload: &str) -> (String, bool) {
    let mut out = String::with_capacity(payload.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in payload.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => stack.push(']'),
            '{' => stack.push('}'),
            ']' | '}' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
            }
            ',' => {
                let next = payload[i + 1..].trim_start().chars().next();
                if matches!(next, None | Some(']') | Some('}')) {
                    continue;
                }
            }
            _ => {}
        }
        out.push(c);
    }

    let truncated = in_string || !stack.is_empty();
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    out.extend(stack.iter().rev());
    (out, truncated)
}

fn turn_from_value(item: &Value, clock: &dyn Clock) -> Option<CandidateTurn> {
    let obj = item.as_object()?;
    let field = |key: &str| obj.get(key).and_then(Value::as_str);

    build_candidate(
        field("speaker")?,
        field("text")?,
        field("side"),
        field("timestamp"),
        field("source_url"),
        field("quote"),
        clock,
    )
}

// ----------------------------------------------------------------------------
// 第二层：正则模式
// ----------------------------------------------------------------------------

struct PatternSpec {
    name: &'static str,
    regex: Regex,
    /// 捕获组依次对应的字段
    fields: &'static [&'static str],
    /// 捕获内容是 JSON 字符串体，需要反转义
    json_strings: bool,
}

const JSON_STR: &str = r#""((?:[^"\\]|\\.)*)""#;

fn json_field(name: &str) -> String {
    format!(r#""{}"\s*:\s*{}"#, name, JSON_STR)
}

fn json_sequence(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| json_field(f))
        .collect::<Vec<_>>()
        .join(r"\s*,\s*")
}

static PATTERNS: Lazy<Vec<PatternSpec>> = Lazy::new(|| {
    const FULL: &[&str] = &["speaker", "side", "text", "timestamp", "source_url", "quote"];
    const CORE: &[&str] = &["speaker", "side", "text", "timestamp"];
    const LOOSE: &[&str] = &["speaker", "text"];

    vec![
        PatternSpec {
            name: "full",
            regex: Regex::new(&json_sequence(FULL)).expect("invalid full pattern"),
            fields: FULL,
            json_strings: true,
        },
        PatternSpec {
            name: "core",
            regex: Regex::new(&json_sequence(CORE)).expect("invalid core pattern"),
            fields: CORE,
            json_strings: true,
        },
        PatternSpec {
            name: "loose",
            regex: Regex::new(&format!(
                r"{}[^{{}}]*?{}",
                json_field("speaker"),
                json_field("text")
            ))
            .expect("invalid loose pattern"),
            fields: LOOSE,
            json_strings: true,
        },
        // 键名不带引号或用单引号，例如 {speaker: 'Reuters', text: '...'}
        PatternSpec {
            name: "bare",
            regex: Regex::new(
                r#"(?im)\bspeaker['"]?\s*[:=]\s*['"]?([^'"\n,}]+?)['"]?\s*[,;\n][^{}]*?\btext['"]?\s*[:=]\s*['"]?([^"\n}]+?)['"]?\s*(?:,\s*\w+['"]?\s*[:=]|[}\n]|$)"#,
            )
            .expect("invalid bare pattern"),
            fields: LOOSE,
            json_strings: false,
        },
    ]
});

impl PatternSpec {
    fn capture(&self, caps: &Captures<'_>, field: &str) -> Option<String> {
        let idx = self.fields.iter().position(|f| *f == field)? + 1;
        let raw = caps.get(idx)?.as_str();
        if self.json_strings {
            Some(decode_json_string(raw))
        } else {
            Some(raw.trim().to_string())
        }
    }

    fn candidate(&self, caps: &Captures<'_>, clock: &dyn Clock) -> Option<CandidateTurn> {
        let speaker = self.capture(caps, "speaker")?;
        let text = self.capture(caps, "text")?;
        let side = self.capture(caps, "side");
        let timestamp = self.capture(caps, "timestamp");
        let source_url = self.capture(caps, "source_url");
        let quote = self.capture(caps, "quote");

        build_candidate(
            &speaker,
            &text,
            side.as_deref(),
            timestamp.as_deref(),
            source_url.as_deref(),
            quote.as_deref(),
            clock,
        )
    }
}

fn pattern_extraction(text: &str, clock: &dyn Clock) -> Vec<CandidateTurn> {
    for spec in PATTERNS.iter() {
        let turns: Vec<CandidateTurn> = spec
            .regex
            .captures_iter(text)
            .filter_map(|caps| spec.candidate(&caps, clock))
            .collect();
        if !turns.is_empty() {
            debug!("pattern '{}' matched {} turns", spec.name, turns.len());
            return turns;
        }
    }
    Vec::new()
}

fn decode_json_string(body: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", body)).unwrap_or_else(|_| body.to_string())
}

// ----------------------------------------------------------------------------
// 第三层：逐行自由文本
// ----------------------------------------------------------------------------

fn free_text_extraction(text: &str, clock: &dyn Clock) -> Vec<CandidateTurn> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.chars().count() <= MIN_LINE_CHARS || !(line.contains(':') || line.contains('"')) {
                return None;
            }

            let (speaker, message) = line.split_once(':')?;
            let speaker = speaker
                .replace(|c: char| c == '"' || c == '*', "")
                .trim_start_matches(|c: char| c == '-' || c == '•' || c.is_whitespace())
                .trim()
                .to_string();
            let message = message
                .replace('"', "")
                .trim_matches(|c: char| c == '*' || c.is_whitespace())
                .to_string();

            if message.chars().count() < MIN_MESSAGE_CHARS {
                return None;
            }
            build_candidate(&speaker, &message, None, None, None, None, clock)
        })
        .collect()
}

// ----------------------------------------------------------------------------
// 公共
// ----------------------------------------------------------------------------

fn build_candidate(
    speaker: &str,
    text: &str,
    side: Option<&str>,
    timestamp: Option<&str>,
    source_url: Option<&str>,
    quote: Option<&str>,
    clock: &dyn Clock,
) -> Option<CandidateTurn> {
    let speaker = speaker.trim();
    let text = text.trim();
    if speaker.is_empty() || text.is_empty() {
        return None;
    }

    Some(CandidateTurn {
        speaker: speaker.to_string(),
        text: text.to_string(),
        side_hint: side.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()),
        // 模型没给或格式不对时，取接收这一刻的时间
        timestamp: timestamp.and_then(parse_timestamp).unwrap_or_else(|| clock.now()),
        source_url: source_url.map(normalize_url).unwrap_or_default(),
        quote: quote.map(|q| q.trim().to_string()).unwrap_or_default(),
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn normalize_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => url.to_string(),
        _ => String::new(),
    }
}

fn strip_control_chars(raw: &str) -> String {
    raw.chars()
        .filter(|c| {
            let cp = *c as u32;
            let c0 = cp < 0x20 && !matches!(c, '\t' | '\n' | '\r');
            let c1 = (0x7F..=0x9F).contains(&cp);
            !(c0 || c1)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::FixedClock;
    use chrono::TimeZone;

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap())
    }

    fn speakers(parsed: &ParsedTurns) -> Vec<&str> {
        parsed.turns.iter().map(|t| t.speaker.as_str()).collect()
    }

    #[test]
    fn well_formed_array_keeps_every_turn_in_order() {
        let raw = r#"[
            {"speaker": "Reuters", "side": "left", "text": "Rates are holding", "timestamp": "2024-01-15T10:30:00Z", "source_url": "https://reuters.com/a", "quote": "holding"},
            {"speaker": "AP", "side": "left", "text": "Markets shrugged it off", "timestamp": "2024-01-15T10:31:00Z", "source_url": "", "quote": ""},
            {"speaker": "WSJ", "side": "right", "text": "Bond traders disagree"}
        ]"#;
        let parsed = parse_turns(raw, &clock());

        assert_eq!(parsed.tier, StrategyTier::Strict);
        assert_eq!(speakers(&parsed), vec!["Reuters", "AP", "WSJ"]);
        assert_eq!(parsed.turns[0].timestamp, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
        assert_eq!(parsed.turns[0].source_url, "https://reuters.com/a");
        assert_eq!(parsed.turns[0].quote, "holding");
        assert_eq!(parsed.turns[1].side_hint.as_deref(), Some("left"));
        assert_eq!(parsed.turns[2].timestamp, clock().0);
    }

    #[test]
    fn elements_missing_speaker_or_text_are_dropped() {
        let raw = r#"[
            {"speaker": "Reuters", "text": "First take"},
            {"speaker": "AP"},
            {"text": "orphan message"},
            {"speaker": "  ", "text": "blank speaker"},
            "just a string",
            {"speaker": "BBC", "text": "Second take"}
        ]"#;
        let parsed = parse_turns(raw, &clock());

        assert_eq!(parsed.tier, StrategyTier::Strict);
        assert_eq!(speakers(&parsed), vec!["Reuters", "BBC"]);
    }

    #[test]
    fn surrounding_prose_fences_and_reasoning_are_ignored() {
        let raw = "<think>should I use [brackets]?</think>Sure! Here it is:\n```json\n[{\"speaker\": \"AP\", \"text\": \"Big day for science\"}]\n```\nEnjoy.";
        let parsed = parse_turns(raw, &clock());

        assert_eq!(parsed.tier, StrategyTier::Strict);
        assert_eq!(speakers(&parsed), vec!["AP"]);
    }

    #[test]
    fn truncated_array_is_closed_before_parse() {
        let raw = r#"[{"speaker": "Reuters", "text": "Hello there"}, {"speaker": "AP", "text": "General news"}"#;
        let parsed = parse_turns(raw, &clock());

        assert_eq!(parsed.tier, StrategyTier::Strict);
        assert_eq!(speakers(&parsed), vec!["Reuters", "AP"]);
    }

    #[test]
    fn truncation_after_trailing_comma_still_parses() {
        let raw = r#"[{"speaker": "Reuters", "text": "Hello there"},"#;
        let parsed = parse_turns(raw, &clock());

        assert_eq!(parsed.tier, StrategyTier::Strict);
        assert_eq!(speakers(&parsed), vec!["Reuters"]);
    }

    #[test]
    fn closers_match_the_unbalanced_count() {
        assert_eq!(repair_structure(r#"[{"a": 1}"#), (r#"[{"a": 1}]"#.to_string(), true));
        assert_eq!(repair_structure(r#"[[[{"a": 1}"#).0, r#"[[[{"a": 1}]]]"#);
        assert_eq!(repair_structure(r#"[{"a": [1, 2"#).0, r#"[{"a": [1, 2]}]"#);
        assert_eq!(repair_structure(r#"[{"a": "cut off"#).0, r#"[{"a": "cut off"}]"#);
        assert_eq!(repair_structure(r#"[{"a": "[not counted"}]"#), (r#"[{"a": "[not counted"}]"#.to_string(), false));
    }

    #[test]
    fn truncation_after_an_inner_array_keeps_later_turns() {
        let raw = r#"[{"speaker":"AP","text":"first take","tags":["a"]}, {"speaker":"BBC","text":"second take"}"#;
        let parsed = parse_turns(raw, &clock());

        assert_eq!(parsed.tier, StrategyTier::Strict);
        assert_eq!(speakers(&parsed), vec!["AP", "BBC"]);
    }

    #[test]
    fn unclosed_bracket_in_trailing_prose_falls_back_to_last_bracket() {
        let raw = "[{\"speaker\": \"AP\", \"text\": \"Rates held\"}]\nSources: [1";
        let parsed = parse_turns(raw, &clock());

        assert_eq!(parsed.tier, StrategyTier::Strict);
        assert_eq!(speakers(&parsed), vec!["AP"]);
    }

    #[test]
    fn commas_inside_strings_are_left_alone() {
        let raw = r#"[{"speaker": "AP", "text": "Lists like [a, ] look odd", "quote": "{x, }",}]"#;
        let parsed = parse_turns(raw, &clock());

        assert_eq!(parsed.tier, StrategyTier::Strict);
        assert_eq!(parsed.turns[0].text, "Lists like [a, ] look odd");
        assert_eq!(parsed.turns[0].quote, "{x, }");
    }

    #[test]
    fn trailing_commas_are_removed() {
        let raw = r#"[{"speaker": "AP", "text": "One",}, {"speaker": "BBC", "text": "Two",},]"#;
        let parsed = parse_turns(raw, &clock());

        assert_eq!(parsed.tier, StrategyTier::Strict);
        assert_eq!(speakers(&parsed), vec!["AP", "BBC"]);
    }

    #[test]
    fn control_characters_are_stripped() {
        let raw = "[{\"speaker\": \"AP\u{0007}\", \"text\": \"Line\u{0001} noise\u{0085}\"}]";
        let parsed = parse_turns(raw, &clock());

        assert_eq!(parsed.tier, StrategyTier::Strict);
        assert_eq!(parsed.turns[0].speaker, "AP");
        assert_eq!(parsed.turns[0].text, "Line noise");
    }

    #[test]
    fn pattern_tier_uses_first_matching_pattern_only() {
        // 对象之间缺逗号，严格解析失败
        let raw = r#"[{"speaker": "Reuters", "side": "left", "text": "Rates are up", "timestamp": "2024-01-15T10:30:00Z", "source_url": "https://reuters.com/x", "quote": "rates"} {"speaker": "AP", "text": "Indeed so"}]"#;
        let parsed = parse_turns(raw, &clock());

        assert_eq!(parsed.tier, StrategyTier::Pattern);
        assert_eq!(speakers(&parsed), vec!["Reuters"]);
        assert_eq!(parsed.turns[0].quote, "rates");
    }

    #[test]
    fn loose_pattern_recovers_minimal_objects() {
        let raw = r#"[{"speaker": "AP", "text": "Indeed so"} {"speaker": "BBC", "mood": "dry", "text": "Quite \"right\""}]"#;
        let parsed = parse_turns(raw, &clock());

        assert_eq!(parsed.tier, StrategyTier::Pattern);
        assert_eq!(speakers(&parsed), vec!["AP", "BBC"]);
        assert_eq!(parsed.turns[1].text, "Quite \"right\"");
        assert_eq!(parsed.turns[1].timestamp, clock().0);
    }

    #[test]
    fn bare_pattern_reads_unquoted_keys() {
        let raw = "{speaker: 'Reuters', text: 'Markets can't stop climbing'}\n{speaker: 'AP', text: 'Nobody saw it coming', side: 'right'}";
        let parsed = parse_turns(raw, &clock());

        assert_eq!(parsed.tier, StrategyTier::Pattern);
        assert_eq!(speakers(&parsed), vec!["Reuters", "AP"]);
        assert_eq!(parsed.turns[0].text, "Markets can't stop climbing");
        assert_eq!(parsed.turns[1].text, "Nobody saw it coming");
    }

    #[test]
    fn free_text_lines_split_on_first_colon() {
        let raw = "Here's the chat:\n**Reuters**: Markets look shaky today\nAP: ok\n\"TechCrunch\": \"Startups are scrambling again\"";
        let parsed = parse_turns(raw, &clock());

        assert_eq!(parsed.tier, StrategyTier::FreeText);
        assert_eq!(speakers(&parsed), vec!["Reuters", "TechCrunch"]);
        assert_eq!(parsed.turns[0].text, "Markets look shaky today");
        assert_eq!(parsed.turns[1].text, "Startups are scrambling again");
    }

    #[test]
    fn garbage_fails_every_tier() {
        let parsed = parse_turns("not json at all", &clock());
        assert_eq!(parsed.tier, StrategyTier::Failed);
        assert!(parsed.turns.is_empty());

        assert_eq!(parse_turns("", &clock()).tier, StrategyTier::Failed);
    }

    #[test]
    fn candidates_are_capped() {
        let items: Vec<String> = (0..9)
            .map(|i| format!(r#"{{"speaker": "S{}", "text": "message {}"}}"#, i, i))
            .collect();
        let raw = format!("[{}]", items.join(","));
        let parsed = parse_turns(&raw, &clock());

        assert_eq!(parsed.turns.len(), MAX_TURNS);
        assert_eq!(parsed.turns[5].speaker, "S5");
    }

    #[test]
    fn parsing_is_idempotent_under_a_fixed_clock() {
        let raw = r#"[{"speaker": "AP", "text": "One more"}, {"speaker": "BBC", "text": "And another", "timestamp": "bogus"}]"#;
        let first = parse_turns(raw, &clock());
        let second = parse_turns(raw, &clock());

        assert_eq!(first, second);
        assert_eq!(first.turns[1].timestamp, clock().0);
    }

    #[test]
    fn naive_timestamps_are_read_as_utc() {
        assert_eq!(
            parse_timestamp("2024-01-15T10:30:00"),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn non_http_urls_are_dropped() {
        let raw = r#"[{"speaker": "AP", "text": "Look here", "source_url": "javascript:alert(1)"}]"#;
        let parsed = parse_turns(raw, &clock());
        assert_eq!(parsed.turns[0].source_url, "");
    }
}
