//! Query execution over a [`Lexicon`]: tokenizing, per-class ranking, and
//! the `ADJACENT_WORDS`/`FUZZY_SEARCH`/`SET_LOGIC` flag contract of §4.6 —
//! adjacency boosting, a fuzzy fallback for near-miss spellings, and a
//! choice between AND set-logic and term union across query words.

use crate::lexicon::{tokenize_words, Hit, Lexicon, Posting, PositionClass};

/// Rank contribution of a single hit, by position class. Body-unquoted
/// hits get a further split between the first [`crate::lexicon::TOP_OF_MESSAGE_LINES`]
/// lines and the rest, applied via `top_of_message_count` on the posting.
fn class_weight(class: PositionClass) -> f64 {
    match class {
        PositionClass::Subject => 5.0,
        PositionClass::HeaderFrom => 3.0,
        PositionClass::BodyUnquoted => 1.0,
        PositionClass::BodyQuoted => 0.4,
        PositionClass::Signature => 0.1,
        PositionClass::WroteContext => 0.05,
    }
}

const TOP_OF_MESSAGE_WEIGHT: f64 = 2.5;
/// Maximum ordinal distance between two query words' hits that counts as
/// "adjacent" for the ranking boost.
const ADJACENCY_WINDOW: u8 = 3;
const ADJACENCY_BOOST: f64 = 1.5;

fn posting_rank(posting: &Posting<'_>) -> f64 {
    let mut rank = 0.0;
    for hit in posting.hits() {
        rank += if hit.class == PositionClass::BodyUnquoted && (posting.top_of_message_count > 0) {
            TOP_OF_MESSAGE_WEIGHT
        } else {
            class_weight(hit.class)
        };
    }
    rank
}

fn adjacency_boost(hits_by_word: &[Vec<Hit>]) -> f64 {
    if hits_by_word.len() < 2 {
        return 1.0;
    }
    for i in 0..hits_by_word.len() {
        for j in i + 1..hits_by_word.len() {
            for a in &hits_by_word[i] {
                for b in &hits_by_word[j] {
                    if a.class == b.class && a.ordinal.abs_diff(b.ordinal) <= ADJACENCY_WINDOW {
                        return ADJACENCY_BOOST;
                    }
                }
            }
        }
    }
    1.0
}

/// Toggles the `ADJACENT_WORDS`, `FUZZY_SEARCH`, and `SET_LOGIC` contract
/// (§4.6): which ranking refinements apply and whether multi-word queries
/// are AND-intersected or OR-unioned.
#[derive(Debug, Clone, Copy)]
pub struct SearchFlags {
    /// Boost postings where matched words land at nearby ordinals in the
    /// same position class.
    pub adjacent_words: bool,
    /// Fall back to prefix/edit-distance-1 dictionary neighbors for query
    /// words with no exact match.
    pub fuzzy_search: bool,
    /// Require every query word to match (AND) rather than any of them
    /// (union/OR).
    pub set_logic: bool,
}

impl Default for SearchFlags {
    fn default() -> Self {
        Self { adjacent_words: true, fuzzy_search: true, set_logic: true }
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub msg_index: u32,
    pub rank: f64,
    pub matched_words: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub total: usize,
    pub truncated: bool,
}

/// Maximum results returned by [`search`] before truncation.
pub const MAX_RESULTS: usize = 200;
/// Maximum hamming-1 neighbors considered per fuzzy query word.
const MAX_FUZZY_CANDIDATES: usize = 8;

/// Runs a query under `flags` (§4.6): `set_logic` chooses AND intersection
/// vs. term union, `fuzzy_search` enables the prefix/edit-distance-1
/// dictionary fallback for unmatched words, and `adjacent_words` enables the
/// co-location ranking boost.
pub fn search(lexicon: &Lexicon, query: &str, flags: SearchFlags) -> SearchResults {
    let words: Vec<&str> = tokenize_words(query).collect();
    if words.is_empty() {
        return SearchResults { hits: Vec::new(), total: 0, truncated: false };
    }

    let mut resolved: Vec<(String, u32)> = Vec::new();
    for word in &words {
        match lexicon.find_word(word) {
            Some(id) => resolved.push((word.to_string(), id)),
            None => {
                if flags.fuzzy_search && let Some((fuzzy_word, id)) = fuzzy_lookup(lexicon, word) {
                    resolved.push((fuzzy_word, id));
                }
            }
        }
    }
    if flags.set_logic && resolved.len() != words.len() {
        // at least one query word (and no fuzzy neighbor) had zero matches;
        // an AND query can never succeed.
        return SearchResults { hits: Vec::new(), total: 0, truncated: false };
    }
    if resolved.is_empty() {
        return SearchResults { hits: Vec::new(), total: 0, truncated: false };
    }

    let postings: Vec<Vec<Posting<'_>>> = resolved
        .iter()
        .filter_map(|(_, id)| lexicon.postings(*id).ok())
        .collect();
    if flags.set_logic && (postings.len() != resolved.len() || postings.iter().any(Vec::is_empty)) {
        return SearchResults { hits: Vec::new(), total: 0, truncated: false };
    }

    let matches = if flags.set_logic { merge_join(&postings) } else { union_join(&postings) };
    let mut scored: Vec<SearchHit> = matches
        .into_iter()
        .map(|(msg_index, per_word_postings)| {
            let hits_by_word: Vec<Vec<Hit>> = per_word_postings
                .iter()
                .filter_map(|p| p.as_ref())
                .map(|p| p.hits().collect())
                .collect();
            let boost = if flags.adjacent_words { adjacency_boost(&hits_by_word) } else { 1.0 };
            let rank: f64 = per_word_postings.iter().filter_map(|p| p.map(posting_rank)).sum::<f64>() * boost;
            let matched_words = resolved
                .iter()
                .zip(&per_word_postings)
                .filter(|(_, p)| p.is_some())
                .map(|((w, _), _)| w.clone())
                .collect();
            SearchHit { msg_index, rank, matched_words }
        })
        .collect();

    scored.sort_by(|a, b| b.rank.total_cmp(&a.rank));
    let total = scored.len();
    let truncated = total > MAX_RESULTS;
    scored.truncate(MAX_RESULTS);
    SearchResults { hits: scored, total, truncated }
}

/// Merge-joins sorted-by-`msg_index` posting lists, keeping only messages
/// present in every list (AND set logic). Every returned entry has `Some`
/// at each position, since a message only survives when all words match.
fn merge_join<'a>(postings: &'a [Vec<Posting<'a>>]) -> Vec<(u32, Vec<Option<&'a Posting<'a>>>)> {
    let mut cursors = vec![0usize; postings.len()];
    let mut out = Vec::new();
    while let Some(candidate) = cursors
        .iter()
        .zip(postings)
        .map(|(&c, list)| list.get(c).map(|p| p.msg_index))
        .collect::<Option<Vec<_>>>()
    {
        let max = *candidate.iter().max().unwrap();
        let mut advanced_any = false;
        for (list, cursor) in postings.iter().zip(cursors.iter_mut()) {
            while list.get(*cursor).is_some_and(|p| p.msg_index < max) {
                *cursor += 1;
                advanced_any = true;
            }
        }
        if !advanced_any {
            let all_match = postings
                .iter()
                .zip(&cursors)
                .all(|(list, &c)| list.get(c).is_some_and(|p| p.msg_index == max));
            if all_match {
                let entry = postings.iter().zip(&cursors).map(|(list, &c)| Some(&list[c])).collect();
                out.push((max, entry));
                for cursor in &mut cursors {
                    *cursor += 1;
                }
            }
        }
    }
    out
}

/// Unions sorted-by-`msg_index` posting lists, keeping every message that
/// matches at least one word (term-union set logic). Missing words are
/// `None` at that message's position.
fn union_join<'a>(postings: &'a [Vec<Posting<'a>>]) -> Vec<(u32, Vec<Option<&'a Posting<'a>>>)> {
    use std::collections::BTreeMap;
    let mut by_msg: BTreeMap<u32, Vec<Option<&'a Posting<'a>>>> = BTreeMap::new();
    for (word_idx, list) in postings.iter().enumerate() {
        for posting in list {
            by_msg
                .entry(posting.msg_index)
                .or_insert_with(|| vec![None; postings.len()])[word_idx] = Some(posting);
        }
    }
    by_msg.into_iter().collect()
}

/// Finds a dictionary word within edit-distance 1 of `word`, or sharing
/// `word` as a prefix, preferring the closest match by length.
fn fuzzy_lookup(lexicon: &Lexicon, word: &str) -> Option<(String, u32)> {
    let mut best: Option<(String, u32, usize)> = None;
    let mut seen = 0;
    for id in 0..lexicon.word_count() as u32 {
        let Some(candidate) = lexicon.word(id) else { continue };
        let distance = if candidate.starts_with(word) {
            0
        } else if edit_distance_at_most_one(word, candidate) {
            1
        } else {
            continue;
        };
        seen += 1;
        if best.as_ref().is_none_or(|(_, _, d)| distance < *d) {
            best = Some((candidate.to_string(), id, distance));
        }
        if seen >= MAX_FUZZY_CANDIDATES {
            break;
        }
    }
    best.map(|(w, id, _)| (w, id))
}

fn edit_distance_at_most_one(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len().abs_diff(b.len()) > 1 {
        return false;
    }
    if a.len() == b.len() {
        return a.iter().zip(b).filter(|(x, y)| x != y).count() <= 1;
    }
    let (shorter, longer) = if a.len() < b.len() { (a, b) } else { (b, a) };
    let mut i = 0;
    let mut j = 0;
    let mut skipped = false;
    while i < shorter.len() && j < longer.len() {
        if shorter[i] == longer[j] {
            i += 1;
            j += 1;
        } else if !skipped {
            skipped = true;
            j += 1;
        } else {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::LexiconBuilder;
    use std::path::Path;

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, bytes).unwrap();
        p
    }

    fn build_lexicon(dir: &Path, messages: &[(&str, &str, &str)]) -> Lexicon {
        let mut builder = LexiconBuilder::new();
        for (i, (from, subject, body)) in messages.iter().enumerate() {
            builder.tokenize_message(i as u32, from, subject, body);
        }
        let bytes = builder.build();
        let lexmeta_str = write(dir, "lexmeta_str.bin", &bytes.lexmeta_str);
        let lexstr = write(dir, "lexstr.bin", &bytes.lexstr);
        let lexhash = write(dir, "lexhash.bin", &bytes.lexhash);
        let lexhashdata = write(dir, "lexhashdata.bin", &bytes.lexhashdata);
        let lexmeta = write(dir, "lexmeta.bin", &bytes.lexmeta);
        let lexdata = write(dir, "lexdata.bin", &bytes.lexdata);
        let lexhit = write(dir, "lexhit.bin", &bytes.lexhit);
        Lexicon::open(&lexmeta_str, &lexstr, &lexhash, &lexhashdata, &lexmeta, &lexdata, &lexhit).unwrap()
    }

    #[test]
    fn and_query_finds_only_messages_with_all_words() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("0")).ok();
        let lexicon = build_lexicon(
            &dir.path().join("0"),
            &[
                ("a@x", "archive search system", "the new archive has a search feature"),
                ("b@x", "archive only", "just about the archive"),
                ("c@x", "search only", "just about search"),
            ],
        );

        let results = search(&lexicon, "archive search", SearchFlags::default());
        let indices: Vec<u32> = results.hits.iter().map(|h| h.msg_index).collect();
        assert_eq!(indices, vec![0]);
    }

    #[test]
    fn union_query_finds_messages_with_any_word() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("0")).ok();
        let lexicon = build_lexicon(
            &dir.path().join("0"),
            &[
                ("a@x", "archive search system", "the new archive has a search feature"),
                ("b@x", "archive only", "just about the archive"),
                ("c@x", "search only", "just about search"),
                ("d@x", "unrelated", "nothing in common"),
            ],
        );

        let flags = SearchFlags { set_logic: false, ..SearchFlags::default() };
        let results = search(&lexicon, "archive search", flags);
        let mut indices: Vec<u32> = results.hits.iter().map(|h| h.msg_index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn disabling_adjacency_does_not_boost_coinciding_words() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("0")).ok();
        let lexicon =
            build_lexicon(&dir.path().join("0"), &[("a@x", "subject words", "archive search close together")]);

        let with_boost = search(&lexicon, "archive search", SearchFlags::default());
        let flags = SearchFlags { adjacent_words: false, ..SearchFlags::default() };
        let without_boost = search(&lexicon, "archive search", flags);
        assert!(with_boost.hits[0].rank > without_boost.hits[0].rank);
    }

    #[test]
    fn disabling_fuzzy_search_drops_unmatched_typos() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("0")).ok();
        let lexicon = build_lexicon(&dir.path().join("0"), &[("a@x", "archive tool", "an archive tool for news")]);

        let flags = SearchFlags { fuzzy_search: false, ..SearchFlags::default() };
        let results = search(&lexicon, "archiv", flags);
        assert!(results.hits.is_empty());
    }

    #[test]
    fn subject_hits_outrank_body_hits() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("0")).ok();
        let lexicon = build_lexicon(
            &dir.path().join("0"),
            &[
                ("a@x", "newsarchive", "irrelevant body text here"),
                ("b@x", "irrelevant subject", "mentions newsarchive only in the body"),
            ],
        );
        let results = search(&lexicon, "newsarchive", SearchFlags::default());
        assert_eq!(results.hits[0].msg_index, 0);
        assert!(results.hits[0].rank > results.hits[1].rank);
    }

    #[test]
    fn fuzzy_match_recovers_a_typo() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("0")).ok();
        let lexicon = build_lexicon(&dir.path().join("0"), &[("a@x", "archive tool", "an archive tool for news")]);
        let results = search(&lexicon, "archiv", SearchFlags::default());
        assert_eq!(results.hits.len(), 1);
    }

    #[test]
    fn edit_distance_helper_allows_one_substitution_or_indel() {
        assert!(edit_distance_at_most_one("archive", "archiv"));
        assert!(edit_distance_at_most_one("archive", "archivd".replace('d', "e").as_str()));
        assert!(!edit_distance_at_most_one("archive", "completely"));
    }
}
