//! `MsgIdCodec`: packs and unpacks Message-IDs against the fixed codebook
//! (see [`crate::codebook`]) plus a per-archive [`HostTable`].

use crate::codebook::{is_compressible_class, BIGRAM_INDEX, BIGRAM_TABLE, CODE_BOOK, TRIGRAM_INDEX, TRIGRAM_TABLE};
use crate::error::{Error, Result};
use crate::host::HostTable;

/// End-of-string opcode.
const OP_END: u8 = 0;
/// Host-reference opcode: followed by one byte, the host id.
const OP_HOST_REF: u8 = 1;

/// A Message-ID compressor bound to one archive's host dictionary.
#[derive(Debug, Clone, Default)]
pub struct MsgIdCodec {
    hosts: HostTable,
}

fn lookup_ngram(table: &[&str], index: &[u8], candidate: &[u8]) -> Option<u8> {
    table
        .binary_search_by(|probe| probe.as_bytes().cmp(candidate))
        .ok()
        .map(|i| index[i])
}

impl MsgIdCodec {
    /// A codec with an empty host table (hosts fall back to literal bytes).
    pub fn new() -> Self {
        Self {
            hosts: HostTable::new(),
        }
    }

    /// Build a codec whose host table is seeded from the given hosts.
    pub fn with_hosts<I: IntoIterator<Item = String>>(hosts: I) -> Self {
        Self {
            hosts: HostTable::build(hosts),
        }
    }

    /// Borrow the host table (e.g. to list known hosts for serialization).
    pub fn hosts(&self) -> &HostTable {
        &self.hosts
    }

    /// Mutably borrow the host table, for incremental host insertion while
    /// building an archive.
    pub fn hosts_mut(&mut self) -> &mut HostTable {
        &mut self.hosts
    }

    /// Pack a well-formed Message-ID into its opcode representation.
    ///
    /// Bytes outside `0x20..=0x7e` that are not consumed by a bigram or
    /// trigram match are rejected with [`Error::InvalidByte`].
    pub fn pack(&self, msgid: &str) -> Result<Vec<u8>> {
        let bytes = msgid.as_bytes();
        let mut out = Vec::with_capacity(bytes.len() + 1);
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            if b != b'@' {
                if is_compressible_class(b) {
                    if i + 3 <= bytes.len()
                        && let Some(op) = lookup_ngram(&TRIGRAM_TABLE, &TRIGRAM_INDEX, &bytes[i..i + 3])
                    {
                        out.push(op);
                        i += 3;
                        continue;
                    }
                    if i + 2 <= bytes.len()
                        && let Some(op) = lookup_ngram(&BIGRAM_TABLE, &BIGRAM_INDEX, &bytes[i..i + 2])
                    {
                        out.push(op);
                        i += 2;
                        continue;
                    }
                }
                if !(0x20..=0x7e).contains(&b) {
                    return Err(Error::InvalidByte(b));
                }
                out.push(b);
                i += 1;
            } else {
                let host = &msgid[i + 1..];
                if let Some(id) = self.hosts.find(host) {
                    out.push(OP_HOST_REF);
                    out.push(id);
                } else {
                    out.push(b'@');
                    out.extend_from_slice(host.as_bytes());
                }
                break;
            }
        }
        out.push(OP_END);
        Ok(out)
    }

    /// Unpack an opcode stream back into its original Message-ID.
    pub fn unpack(&self, packed: &[u8]) -> Result<String> {
        let mut out = String::new();
        let mut i = 0;
        while i < packed.len() {
            let op = packed[i];
            if op == OP_END {
                break;
            }
            if (0x20..=0x7e).contains(&op) {
                if op != b'@' {
                    out.push(op as char);
                    i += 1;
                } else {
                    out.push('@');
                    i += 1;
                    while i < packed.len() && packed[i] != OP_END {
                        out.push(packed[i] as char);
                        i += 1;
                    }
                    break;
                }
            } else if op != OP_HOST_REF {
                out.push_str(CODE_BOOK[op as usize]);
                i += 1;
            } else {
                i += 1;
                let id = *packed
                    .get(i)
                    .ok_or(Error::TruncatedData { expected: i + 1, actual: packed.len() })?;
                let host = self
                    .hosts
                    .host(id)
                    .ok_or_else(|| Error::MalformedMessageId(format!("unknown host id {id}")))?;
                out.push('@');
                out.push_str(host);
                break;
            }
        }
        Ok(out)
    }

    /// Unpack `packed` against `other`'s host table, then re-pack against
    /// this codec's host table. Lossless for well-formed Message-IDs.
    pub fn repack(&self, packed: &[u8], other: &MsgIdCodec) -> Result<Vec<u8>> {
        let msgid = other.unpack(packed)?;
        self.pack(&msgid)
    }
}

/// Strip spaces and tabs from a raw Message-ID field, reporting whether it
/// required cleanup ("broken" in the original tool's terminology).
pub fn validate_msg_id(raw: &str) -> (String, bool) {
    let cleaned: String = raw.chars().filter(|c| *c != ' ' && *c != '\t').collect();
    let broken = cleaned.len() != raw.len();
    (cleaned, broken)
}

/// Structural well-formedness check: exactly one `@`, non-empty unique and
/// host parts, printable 7-bit ASCII, no angle brackets.
pub fn is_msg_id(s: &str) -> bool {
    if !s.bytes().all(|b| (0x20..=0x7e).contains(&b) && b != b'<' && b != b'>') {
        return false;
    }
    let mut parts = s.splitn(2, '@');
    let unique = match parts.next() {
        Some(u) if !u.is_empty() => u,
        _ => return false,
    };
    let host = match parts.next() {
        Some(h) if !h.is_empty() => h,
        _ => return false,
    };
    !unique.contains('@') && !host.contains('@')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips_without_host_table() {
        let codec = MsgIdCodec::new();
        for msgid in ["abc123@example.com", "x@y", "$1.00@news.test", "plain@host"] {
            let packed = codec.pack(msgid).unwrap();
            assert_eq!(codec.unpack(&packed).unwrap(), msgid);
        }
    }

    #[test]
    fn pack_unpack_round_trips_with_host_table() {
        let codec = MsgIdCodec::with_hosts(["example.com".to_string(), "news.test".to_string()]);
        for msgid in ["abc123@example.com", "hello@news.test", "nohost@other.org"] {
            let packed = codec.pack(msgid).unwrap();
            assert_eq!(codec.unpack(&packed).unwrap(), msgid);
        }
    }

    #[test]
    fn host_reference_is_shorter_than_literal() {
        let codec = MsgIdCodec::with_hosts(["averylonghostname.example.com".to_string()]);
        let packed = codec.pack("x@averylonghostname.example.com").unwrap();
        assert!(packed.len() < "x@averylonghostname.example.com".len());
    }

    #[test]
    fn repack_between_codecs_is_lossless() {
        let a = MsgIdCodec::with_hosts(["example.com".to_string()]);
        let b = MsgIdCodec::with_hosts(["news.test".to_string(), "example.com".to_string()]);
        let msgid = "thread42@example.com";
        let packed_a = a.pack(msgid).unwrap();
        let repacked = b.repack(&packed_a, &a).unwrap();
        assert_eq!(b.unpack(&repacked).unwrap(), msgid);
    }

    #[test]
    fn rejects_invalid_byte() {
        let codec = MsgIdCodec::new();
        assert!(matches!(
            codec.pack("bad\x01msgid@host"),
            Err(Error::InvalidByte(0x01))
        ));
    }

    #[test]
    fn validates_message_id_shape() {
        assert!(is_msg_id("a@b"));
        assert!(!is_msg_id("noatsign"));
        assert!(!is_msg_id("@nouniqpart"));
        assert!(!is_msg_id("nohostpart@"));
        assert!(!is_msg_id("<a@b>"));
    }

    #[test]
    fn validate_msg_id_strips_whitespace() {
        let (cleaned, broken) = validate_msg_id("a b@c\tcom");
        assert_eq!(cleaned, "ab@ccom");
        assert!(broken);
        let (cleaned, broken) = validate_msg_id("clean@id");
        assert_eq!(cleaned, "clean@id");
        assert!(!broken);
    }
}
