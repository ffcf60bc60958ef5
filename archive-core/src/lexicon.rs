//! Full-text inverted index: a sorted word dictionary, a hash index from
//! word to word id, and per-word posting lists with per-hit position
//! information (§3.5, §4.5).
//!
//! Ported in spirit from `original_source/lexicon/lexicon.cpp`, collapsed
//! onto the dictionary's already-parsed `from`/`subject` fields rather than
//! re-parsing raw headers.

use crate::error::{ArchiveError, Result};
use crate::filemap::FileMap;
use crate::hashindex::{HashIndex, HashIndexBuilder};
use crate::heuristics::{detect_wrote, kill_re, quotation_level};
use std::collections::BTreeMap;
use std::path::Path;

/// How many leading unquoted body lines count as "top of message" for
/// ranking purposes (§4.6).
pub const TOP_OF_MESSAGE_LINES: usize = 3;

/// Where a word occurrence was found, encoded in the top 3 bits of a hit
/// byte. Six of the eight available codes are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PositionClass {
    Subject = 0,
    HeaderFrom = 1,
    BodyUnquoted = 2,
    BodyQuoted = 3,
    Signature = 4,
    WroteContext = 5,
}

impl PositionClass {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Subject),
            1 => Some(Self::HeaderFrom),
            2 => Some(Self::BodyUnquoted),
            3 => Some(Self::BodyQuoted),
            4 => Some(Self::Signature),
            5 => Some(Self::WroteContext),
            _ => None,
        }
    }
}

/// A single word occurrence: its class and its ordinal position within
/// that class's run (clamped to 5 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub class: PositionClass,
    pub ordinal: u8,
}

fn encode_hit(hit: Hit) -> u8 {
    ((hit.class as u8) << 5) | hit.ordinal.min(31)
}

fn decode_hit(byte: u8) -> Option<Hit> {
    Some(Hit {
        class: PositionClass::from_bits(byte >> 5)?,
        ordinal: byte & 0x1f,
    })
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
struct WordMeta {
    data_offset: u32,
    count: u32,
}

/// `postid` packs a 29-bit message index with a 3-bit top-of-message hit
/// count (§4.5); `hit_offset` indexes into the hit blob.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
struct PostingRecord {
    postid: u32,
    hit_offset: u32,
}

const MSG_INDEX_BITS: u32 = 29;
const MSG_INDEX_MASK: u32 = (1 << MSG_INDEX_BITS) - 1;

/// One word's occurrence in one message.
pub struct Posting<'a> {
    pub msg_index: u32,
    pub top_of_message_count: u8,
    hits: &'a [u8],
}

impl<'a> Posting<'a> {
    pub fn hits(&self) -> impl Iterator<Item = Hit> + 'a {
        self.hits.iter().copied().filter_map(decode_hit)
    }

    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }
}

pub struct Lexicon {
    word_str_meta: FileMap<u32>,
    words: FileMap<u8>,
    hash: HashIndex,
    word_meta: FileMap<WordMeta>,
    postings: FileMap<PostingRecord>,
    hits: FileMap<u8>,
}

#[allow(clippy::too_many_arguments)]
impl Lexicon {
    pub fn open(
        lexmeta_str_path: &Path,
        lexstr_path: &Path,
        lexhash_path: &Path,
        lexhashdata_path: &Path,
        lexmeta_path: &Path,
        lexdata_path: &Path,
        lexhit_path: &Path,
    ) -> Result<Self> {
        Ok(Self {
            word_str_meta: FileMap::open(lexmeta_str_path, false)?,
            words: FileMap::open(lexstr_path, false)?,
            hash: HashIndex::open(lexhash_path, lexhashdata_path)?,
            word_meta: FileMap::open(lexmeta_path, false)?,
            postings: FileMap::open(lexdata_path, false)?,
            hits: FileMap::open(lexhit_path, false)?,
        })
    }

    /// Opens a lexicon from a package bundle's slices, sharing its mapping
    /// instead of opening each named file separately.
    pub fn open_from_package(package: &crate::package::Package) -> Result<Self> {
        Ok(Self {
            word_str_meta: package.filemap("lexmeta_str")?,
            words: package.filemap("lexstr")?,
            hash: HashIndex::from_parts(package.filemap("lexhash")?, package.filemap("lexhashdata")?)?,
            word_meta: package.filemap("lexmeta")?,
            postings: package.filemap("lexdata")?,
            hits: package.filemap("lexhit")?,
        })
    }

    pub fn word_count(&self) -> usize {
        self.word_str_meta.len()
    }

    pub fn word(&self, word_id: u32) -> Option<&str> {
        let offset = *self.word_str_meta.get(word_id as usize)? as usize;
        let bytes = self.words.as_slice().get(offset..)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        std::str::from_utf8(&bytes[..end]).ok()
    }

    /// Looks up a word's id via the hash index, verifying the exact byte
    /// match (the index's bucket lookup can collide on hash value alone).
    pub fn find_word(&self, word: &str) -> Option<u32> {
        let key = word.as_bytes();
        let blob = self.words.as_slice();
        self.hash.lookup(key, |off| blob.get(off as usize..off as usize + key.len()))
    }

    pub fn postings(&self, word_id: u32) -> Result<Vec<Posting<'_>>> {
        let meta = self
            .word_meta
            .get(word_id as usize)
            .ok_or_else(|| ArchiveError::WordNotFound(word_id.to_string()))?;
        let records = self
            .postings
            .as_slice()
            .get(meta.data_offset as usize..meta.data_offset as usize + meta.count as usize)
            .ok_or_else(|| ArchiveError::MalformedLexicon(format!("word {word_id}: postings out of range")))?;

        let hit_bytes = self.hits.as_slice();
        records
            .iter()
            .map(|rec| {
                let off = rec.hit_offset as usize;
                let count = *hit_bytes
                    .get(off)
                    .ok_or_else(|| ArchiveError::MalformedLexicon(format!("word {word_id}: truncated hit list")))?
                    as usize;
                let hits = hit_bytes
                    .get(off + 1..off + 1 + count)
                    .ok_or_else(|| ArchiveError::MalformedLexicon(format!("word {word_id}: truncated hit list")))?;
                Ok(Posting {
                    msg_index: rec.postid & MSG_INDEX_MASK,
                    top_of_message_count: (rec.postid >> MSG_INDEX_BITS) as u8,
                    hits,
                })
            })
            .collect()
    }
}

/// Serialized on-disk byte buffers for every lexicon-related named file.
pub struct LexiconBytes {
    pub lexmeta_str: Vec<u8>,
    pub lexstr: Vec<u8>,
    pub lexhash: Vec<u8>,
    pub lexhashdata: Vec<u8>,
    pub lexmeta: Vec<u8>,
    pub lexdata: Vec<u8>,
    pub lexhit: Vec<u8>,
}

/// Accumulates word occurrences across a batch of messages and serializes
/// the dictionary, hash index, and posting/hit lists.
#[derive(Default)]
pub struct LexiconBuilder {
    // word -> msg_index -> hits (in first-seen order)
    words: BTreeMap<String, BTreeMap<u32, Vec<Hit>>>,
}

impl LexiconBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_occurrence(&mut self, word: &str, msg_index: u32, class: PositionClass, ordinal: u8) {
        self.words
            .entry(word.to_string())
            .or_default()
            .entry(msg_index)
            .or_default()
            .push(Hit { class, ordinal });
    }

    /// Tokenizes one message's already-parsed fields and records every word
    /// occurrence with its position class, the way `lexicon.cpp` classifies
    /// header, body, quoted, signature, and wrote-context words.
    pub fn tokenize_message(&mut self, msg_index: u32, from: &str, subject: &str, body: &str) {
        for (ordinal, word) in tokenize_words(kill_re(subject)).enumerate() {
            self.add_occurrence(word, msg_index, PositionClass::Subject, ordinal as u8);
        }
        for (ordinal, word) in tokenize_words(from).enumerate() {
            self.add_occurrence(word, msg_index, PositionClass::HeaderFrom, ordinal as u8);
        }

        let wrote_lines = detect_wrote(body) as usize;
        let mut in_signature = false;
        // Running per-class ordinal across the whole body, not per line —
        // `PositionClass` is used to index this directly (six classes).
        let mut class_ordinals = [0u8; 6];
        for (line_index, line) in body.split('\n').enumerate() {
            if line.trim_end() == "--" || line.trim_end() == "-- " {
                in_signature = true;
            }
            let class = if line_index < wrote_lines {
                PositionClass::WroteContext
            } else if in_signature {
                PositionClass::Signature
            } else if quotation_level(line.as_bytes()) > 0 {
                PositionClass::BodyQuoted
            } else {
                PositionClass::BodyUnquoted
            };
            for word in tokenize_words(line) {
                let ordinal = &mut class_ordinals[class as usize];
                self.add_occurrence(word, msg_index, class, *ordinal);
                *ordinal = ordinal.saturating_add(1);
            }
        }
    }

    pub fn build(&self) -> LexiconBytes {
        let mut lexstr = Vec::new();
        let mut lexmeta_str = Vec::new();
        let mut hash_builder = HashIndexBuilder::new();
        let mut lexmeta = Vec::new();
        let mut lexdata = Vec::new();
        let mut lexhit = Vec::new();

        for (word_id, (word, by_msg)) in self.words.iter().enumerate() {
            lexmeta_str.extend_from_slice(&(lexstr.len() as u32).to_le_bytes());
            hash_builder.insert(word.as_bytes().to_vec(), word_id as u32);
            lexstr.extend_from_slice(word.as_bytes());
            lexstr.push(0);

            let data_offset = (lexdata.len() / 8) as u32;
            for (&msg_index, hits) in by_msg {
                let top_of_message = hits
                    .iter()
                    .filter(|h| h.class == PositionClass::BodyUnquoted && (h.ordinal as usize) < TOP_OF_MESSAGE_LINES)
                    .count()
                    .min(7) as u32;
                let postid = (msg_index & MSG_INDEX_MASK) | (top_of_message << MSG_INDEX_BITS);
                let hit_offset = lexhit.len() as u32;
                lexhit.push(hits.len().min(255) as u8);
                for h in hits {
                    lexhit.push(encode_hit(*h));
                }
                lexdata.extend_from_slice(&postid.to_le_bytes());
                lexdata.extend_from_slice(&hit_offset.to_le_bytes());
            }
            let count = (by_msg.len()) as u32;
            lexmeta.extend_from_slice(&data_offset.to_le_bytes());
            lexmeta.extend_from_slice(&count.to_le_bytes());
        }

        // word_id already matches dictionary (BTreeMap) iteration order, so
        // the hash builder's `string_offset` can just re-read lexmeta_str.
        let offsets: Vec<u32> = lexmeta_str
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        let (lexhash, lexhashdata) = hash_builder.build(|i| offsets[i]);

        LexiconBytes {
            lexmeta_str,
            lexstr,
            lexhash,
            lexhashdata,
            lexmeta,
            lexdata,
            lexhit,
        }
    }
}

/// Lowercase ASCII tokens of length 3-13: alphanumeric with interior
/// hyphens allowed, matching the search engine's tokenizer (§4.6).
pub fn tokenize_words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .map(|w| w.trim_matches('-'))
        .filter(|w| w.len() >= 3 && w.len() <= 13)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, bytes).unwrap();
        p
    }

    fn open_lexicon(bytes: &LexiconBytes, dir: &Path) -> Lexicon {
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
    fn tokenizer_filters_short_and_long_words() {
        let words: Vec<&str> = tokenize_words("hi the archive system ab supercalifragilisticexpialidocious").collect();
        assert_eq!(words, vec!["the", "archive", "system"]);
    }

    #[test]
    fn builds_and_resolves_word_postings() {
        let mut builder = LexiconBuilder::new();
        builder.tokenize_message(0, "alice@example.com", "archive search engine", "the archive stores messages");
        builder.tokenize_message(1, "bob@example.org", "re: archive search engine", "> the archive stores messages\narchive again");

        let bytes = builder.build();
        let dir = tempfile::tempdir().unwrap();
        let lexicon = open_lexicon(&bytes, dir.path());

        let word_id = lexicon.find_word("archive").unwrap();
        assert_eq!(lexicon.word(word_id), Some("archive"));

        let postings = lexicon.postings(word_id).unwrap();
        assert_eq!(postings.len(), 2);
        assert_eq!(postings[0].msg_index, 0);
        assert_eq!(postings[1].msg_index, 1);

        let hits: Vec<Hit> = postings[1].hits().collect();
        assert!(hits.iter().any(|h| h.class == PositionClass::Subject));
        assert!(hits.iter().any(|h| h.class == PositionClass::BodyQuoted));
        assert!(hits.iter().any(|h| h.class == PositionClass::BodyUnquoted));
    }

    #[test]
    fn body_ordinal_runs_across_lines_within_a_class() {
        let mut builder = LexiconBuilder::new();
        builder.tokenize_message(0, "alice@example.com", "subject", "one two three\nfour five six");

        let hits = &builder.words["four"][&0];
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].class, PositionClass::BodyUnquoted);
        // "four" is the 4th body word overall, not the 1st word of its line.
        assert_eq!(hits[0].ordinal, 3);
    }

    #[test]
    fn unknown_word_is_not_found() {
        let builder = LexiconBuilder::new();
        let bytes = builder.build();
        let dir = tempfile::tempdir().unwrap();
        let lexicon = open_lexicon(&bytes, dir.path());
        assert_eq!(lexicon.find_word("nothing"), None);
    }
}
