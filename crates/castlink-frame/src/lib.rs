//! Length-prefixed message framing for the cast device socket.
//!
//! Every message on the wire is framed as:
//! - A 4-byte big-endian unsigned payload length
//! - Exactly that many payload bytes
//!
//! There are no other delimiters. Readers loop over short reads and only
//! ever hand out complete payloads.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{decode_frame, encode_frame, CastCodec, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
