//! Fuzzy matching by longest common subsequence.
//!
//! Candidates are scored by the LCS length between the query and the
//! candidate text, then ranked and truncated. Candidate sets are small
//! (every user, every video), so the O(m·n) per-candidate cost is fine.

use serde::Deserialize;

/// How candidates with equal scores are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Descending score, then ascending candidate text.
    Lexical,
    /// Only the candidates tying for the single best score.
    BestOnly,
}

#[derive(Debug, Clone, Copy)]
pub struct RankOptions {
    pub limit: usize,
    pub tie_break: TieBreak,
    pub case_sensitive: bool,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            tie_break: TieBreak::Lexical,
            case_sensitive: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match<T> {
    pub score: usize,
    pub item: T,
}

/// Length of the longest common subsequence of `a` and `b`, compared
/// char by char with no case folding.
pub fn lcs_length(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    lcs_chars(&a, &b)
}

/// LCS length after optional lower-casing of both sides.
pub fn similarity(query: &str, candidate: &str, case_sensitive: bool) -> usize {
    if case_sensitive {
        lcs_length(query, candidate)
    } else {
        lcs_length(&query.to_lowercase(), &candidate.to_lowercase())
    }
}

// Two rolling rows of the (m+1)x(n+1) table; row i holds the LCS of the
// first i chars of `a` against every prefix of `b`.
fn lcs_chars(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Rank arbitrary items. `texts` returns the strings an item is matched
/// on: the item scores the best LCS over all of them, and the first one
/// is the tie-break key.
///
/// An empty query yields nothing. Items scoring zero are dropped.
pub fn rank_by<T, I, F>(
    query: &str,
    candidates: I,
    options: &RankOptions,
    texts: F,
) -> Vec<Match<T>>
where
    I: IntoIterator<Item = T>,
    F: for<'a> Fn(&'a T) -> Vec<&'a str>,
{
    let query = query.trim();
    if query.is_empty() || options.limit == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(usize, String, T)> = candidates
        .into_iter()
        .filter_map(|item| {
            let keys = texts(&item);
            let score = keys
                .iter()
                .map(|&text| similarity(query, text, options.case_sensitive))
                .max()
                .unwrap_or(0);
            let tie_key = keys.first().map(|k| k.to_string()).unwrap_or_default();
            (score > 0).then_some((score, tie_key, item))
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    if options.tie_break == TieBreak::BestOnly {
        if let Some(best) = scored.first().map(|s| s.0) {
            scored.retain(|s| s.0 == best);
        }
    }

    scored
        .into_iter()
        .take(options.limit)
        .map(|(score, _, item)| Match { score, item })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank<'a>(query: &str, users: &[&'a str], options: &RankOptions) -> Vec<Match<&'a str>> {
        rank_by(query, users.iter().copied(), options, |u| vec![*u])
    }

    fn names<'a>(matches: &[Match<&'a str>]) -> Vec<&'a str> {
        matches.iter().map(|m| m.item).collect()
    }

    #[test]
    fn classic_reference_case() {
        assert_eq!(lcs_length("ABCBDAB", "BDCABA"), 4);
    }

    #[test]
    fn lcs_is_symmetric() {
        let pairs = [
            ("ABCBDAB", "BDCABA"),
            ("kitten", "sitting"),
            ("视频网站", "网站视频"),
            ("", "abc"),
            ("aaaa", "aa"),
        ];
        for (a, b) in pairs {
            assert_eq!(lcs_length(a, b), lcs_length(b, a), "{a} / {b}");
        }
    }

    #[test]
    fn lcs_with_self_is_length_in_chars() {
        for s in ["", "a", "hello", "用户_01"] {
            assert_eq!(lcs_length(s, s), s.chars().count());
        }
    }

    #[test]
    fn lcs_with_empty_is_zero() {
        assert_eq!(lcs_length("anything", ""), 0);
        assert_eq!(lcs_length("", "anything"), 0);
    }

    #[test]
    fn case_folding() {
        assert_eq!(similarity("abc", "ABC", false), 3);
        assert_eq!(similarity("abc", "ABC", true), 0);
    }

    #[test]
    fn ranking_folds_case_unless_asked_not_to() {
        let users = ["ALICE", "Bob", "mal"];
        let found = rank("Al", &users, &RankOptions::default());
        assert_eq!(names(&found), vec!["ALICE", "mal"]);
        assert!(found.iter().all(|m| m.score == 2));

        let strict = RankOptions {
            case_sensitive: true,
            ..RankOptions::default()
        };
        let found = rank("Al", &users, &strict);
        assert_eq!(names(&found), vec!["ALICE", "mal"]);
        assert_eq!(found.iter().map(|m| m.score).collect::<Vec<_>>(), vec![1, 1]);
    }

    #[test]
    fn empty_query_returns_nothing() {
        let users = ["alice", "bob"];
        assert!(rank("", &users, &RankOptions::default()).is_empty());
        assert!(rank("   ", &users, &RankOptions::default()).is_empty());
    }

    #[test]
    fn zero_scores_are_dropped() {
        let users = ["xyz", "abc"];
        let found = rank("a", &users, &RankOptions::default());
        assert_eq!(names(&found), vec!["abc"]);
    }

    #[test]
    fn lexical_tie_break_orders_equal_scores_alphabetically() {
        let users = ["carol", "alice", "bo_l", "al"];
        let found = rank("al", &users, &RankOptions::default());
        assert_eq!(found.iter().map(|m| m.score).collect::<Vec<_>>(), vec![2, 2, 2, 1]);
        assert_eq!(names(&found), vec!["al", "alice", "carol", "bo_l"]);
    }

    #[test]
    fn best_only_keeps_the_top_tier() {
        let users = ["carol", "alice", "bob_al", "zed"];
        let options = RankOptions {
            tie_break: TieBreak::BestOnly,
            ..RankOptions::default()
        };
        let found = rank("al", &users, &options);
        assert_eq!(names(&found), vec!["alice", "bob_al", "carol"]);
    }

    #[test]
    fn limit_truncates_after_sorting() {
        let users = ["ab", "abc", "abcd", "a"];
        let options = RankOptions {
            limit: 2,
            ..RankOptions::default()
        };
        let found = rank("abcd", &users, &options);
        assert_eq!(names(&found), vec!["abcd", "abc"]);
    }

    #[test]
    fn rank_by_scores_best_of_all_texts() {
        let videos = vec![("Holiday", "beach_trip.mp4"), ("Beach", "clip.mp4")];
        let found = rank_by("beach", videos, &RankOptions::default(), |v| vec![v.0, v.1]);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|m| m.score == 5));
        // equal scores fall back to the first text, the title
        assert_eq!(found[0].item.0, "Beach");
    }
}
