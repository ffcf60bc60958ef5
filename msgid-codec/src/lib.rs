//! Message-ID compression for Usenet archives.
//!
//! Message-IDs are highly repetitive (`unique@host`, with a small number
//! of hosts dominating any one newsgroup's traffic) so a generic byte
//! compressor wastes a frame header on every few dozen bytes. This crate
//! implements a fixed 256-entry opcode alphabet mined offline from a large
//! Message-ID corpus, plus a per-archive host dictionary, giving most
//! Message-IDs a packed form under ten bytes.

pub mod codebook;
mod codec;
mod error;
mod host;

pub use codec::{is_msg_id, validate_msg_id, MsgIdCodec};
pub use error::{Error, Result};
pub use host::HostTable;
