//! Async I/O over the abstract byte channel: frame reading and writing, and
//! reading the HTTP head of the opening handshake.

mod framed;
pub mod http;

pub use framed::{FrameReader, FrameWriter};
