use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::parser::CandidateTurn;

/// 化名池，必须不少于单次会话上限的两倍
pub const PSEUDONYM_POOL: &[&str] = &[
    "Nova", "Juniper", "Atlas", "Marlowe", "Sable", "Quinn", "Ember", "Orion",
    "Wren", "Indigo", "Rowan", "Lyric", "Sage", "Phoenix", "Echo", "Briar",
];

const FALLBACK_BASE: &str = "Guest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// 偶数下标在左，奇数在右，与谁在说话无关
    pub fn for_index(index: usize) -> Self {
        if index % 2 == 0 { Side::Left } else { Side::Right }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTurn {
    #[serde(rename = "speaker")]
    pub display_speaker: String,
    pub side: Side,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub source_url: String,
    pub quote: String,
    #[serde(rename = "news_source")]
    pub attributed_source: String,
    pub news_source_url: String,
}

pub fn assign_identities<R: Rng + ?Sized>(candidates: Vec<CandidateTurn>, rng: &mut R) -> Vec<ConversationTurn> {
    assign_identities_from(candidates, PSEUDONYM_POOL, rng)
}

pub fn assign_identities_from<R: Rng + ?Sized>(
    candidates: Vec<CandidateTurn>,
    pool: &[&str],
    rng: &mut R,
) -> Vec<ConversationTurn> {
    let mut draw = PseudonymDraw::new(pool, rng);

    candidates
        .into_iter()
        .enumerate()
        .map(|(index, candidate)| {
            let display_speaker = draw.next_for(&candidate.speaker);
            let side = Side::for_index(index);
            if candidate.side_hint.as_deref().map_or(false, |hint| hint != side.as_str()) {
                debug!("🎭 turn {} side hint {:?} overridden to {}", index, candidate.side_hint, side.as_str());
            }
            ConversationTurn {
                display_speaker,
                side,
                text: candidate.text,
                timestamp: candidate.timestamp,
                source_url: candidate.source_url,
                quote: candidate.quote,
                attributed_source: candidate.speaker,
                news_source_url: String::new(),
            }
        })
        .collect()
}

/// 洗牌后的化名池 + 游标，不放回抽取
struct PseudonymDraw<'a> {
    pool: &'a [&'a str],
    order: Vec<&'a str>,
    cursor: usize,
    used: HashSet<String>,
}

impl<'a> PseudonymDraw<'a> {
    fn new<R: Rng + ?Sized>(pool: &'a [&'a str], rng: &mut R) -> Self {
        let mut order = pool.to_vec();
        order.shuffle(rng);
        Self { pool, order, cursor: 0, used: HashSet::new() }
    }

    fn next_for(&mut self, attributed: &str) -> String {
        // 跳过已用过的名字和与原署名相同的名字；被跳过的名字换到后面，留给之后的发言
        if let Some(offset) = self.order[self.cursor..]
            .iter()
            .position(|name| self.is_free(name, attributed))
        {
            self.order.swap(self.cursor, self.cursor + offset);
            let name = self.order[self.cursor];
            self.cursor += 1;
            self.used.insert(name.to_lowercase());
            return name.to_string();
        }

        self.disambiguated(attributed)
    }

    /// 化名池耗尽时的确定性兜底：按原池顺序加数字后缀
    fn disambiguated(&mut self, attributed: &str) -> String {
        warn!("🎭 pseudonym pool exhausted ({} names), using suffixed fallback", self.pool.len());
        let bases: Vec<&str> = if self.pool.is_empty() { vec![FALLBACK_BASE] } else { self.pool.to_vec() };

        for suffix in 2.. {
            for base in &bases {
                let name = format!("{} {}", base, suffix);
                if self.is_free(&name, attributed) {
                    self.used.insert(name.to_lowercase());
                    return name;
                }
            }
        }
        unreachable!("suffix space is unbounded")
    }

    fn is_free(&self, name: &str, attributed: &str) -> bool {
        !self.used.contains(&name.to_lowercase()) && !name.eq_ignore_ascii_case(attributed.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::brain::parser::MAX_TURNS;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn candidate(speaker: &str, text: &str) -> CandidateTurn {
        CandidateTurn {
            speaker: speaker.to_string(),
            text: text.to_string(),
            side_hint: Some("left".to_string()),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            source_url: String::new(),
            quote: String::new(),
        }
    }

    fn candidates(n: usize) -> Vec<CandidateTurn> {
        (0..n).map(|i| candidate(&format!("Outlet {}", i), "something worth saying")).collect()
    }

    fn assert_distinct(turns: &[ConversationTurn]) {
        let names: HashSet<String> = turns.iter().map(|t| t.display_speaker.to_lowercase()).collect();
        assert_eq!(names.len(), turns.len(), "duplicate pseudonym in {:?}", turns);
    }

    #[test]
    fn pool_is_at_least_twice_the_turn_cap() {
        assert!(PSEUDONYM_POOL.len() >= 2 * MAX_TURNS);
        let unique: HashSet<&str> = PSEUDONYM_POOL.iter().copied().collect();
        assert_eq!(unique.len(), PSEUDONYM_POOL.len());
    }

    #[test]
    fn every_size_up_to_cap_gets_distinct_names_and_alternating_sides() {
        for seed in 0..32 {
            for n in 1..=MAX_TURNS {
                let mut rng = StdRng::seed_from_u64(seed);
                let turns = assign_identities(candidates(n), &mut rng);

                assert_eq!(turns.len(), n);
                assert_distinct(&turns);
                for (i, turn) in turns.iter().enumerate() {
                    let expected = if i % 2 == 0 { Side::Left } else { Side::Right };
                    assert_eq!(turn.side, expected);
                    assert!(PSEUDONYM_POOL.contains(&turn.display_speaker.as_str()));
                }
            }
        }
    }

    #[test]
    fn attribution_is_preserved_and_never_displayed() {
        // 模型直接用了化名池里的名字当署名
        let input: Vec<CandidateTurn> = PSEUDONYM_POOL[..MAX_TURNS]
            .iter()
            .map(|name| candidate(name, "hello from the newsroom"))
            .collect();

        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let turns = assign_identities(input.clone(), &mut rng);
            for (turn, original) in turns.iter().zip(&input) {
                assert_eq!(turn.attributed_source, original.speaker);
                assert_ne!(turn.display_speaker, turn.attributed_source);
                assert_eq!(turn.text, original.text);
            }
            assert_distinct(&turns);
        }
    }

    #[test]
    fn same_speaker_twice_still_gets_two_pseudonyms() {
        let mut rng = StdRng::seed_from_u64(7);
        let turns = assign_identities(vec![candidate("Reuters", "first"), candidate("Reuters", "second")], &mut rng);
        assert_ne!(turns[0].display_speaker, turns[1].display_speaker);
    }

    #[test]
    fn exhausted_pool_falls_back_to_suffixed_names() {
        let pool = ["Nova", "Atlas"];
        let mut rng = StdRng::seed_from_u64(1);
        let turns = assign_identities_from(candidates(5), &pool, &mut rng);

        assert_eq!(turns.len(), 5);
        assert_distinct(&turns);
        assert_eq!(turns[2].display_speaker, "Nova 2");
        assert_eq!(turns[3].display_speaker, "Atlas 2");
        assert_eq!(turns[4].display_speaker, "Nova 3");
    }

    #[test]
    fn empty_pool_still_assigns_names() {
        let mut rng = StdRng::seed_from_u64(1);
        let turns = assign_identities_from(candidates(2), &[], &mut rng);
        assert_eq!(turns[0].display_speaker, "Guest 2");
        assert_eq!(turns[1].display_speaker, "Guest 3");
    }

    #[test]
    fn same_seed_gives_same_names() {
        let a = assign_identities(candidates(4), &mut StdRng::seed_from_u64(99));
        let b = assign_identities(candidates(4), &mut StdRng::seed_from_u64(99));
        assert_eq!(a, b);
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let mut rng = StdRng::seed_from_u64(3);
        let turns = assign_identities(vec![candidate("Reuters", "Rates are up")], &mut rng);
        let json = serde_json::to_value(&turns[0]).unwrap();

        assert_eq!(json["news_source"], "Reuters");
        assert_eq!(json["side"], "left");
        assert_eq!(json["speaker"], turns[0].display_speaker.as_str());
        assert_eq!(json["timestamp"], "2025-03-01T12:00:00Z");
        assert!(json.get("display_speaker").is_none());
    }
}
