//! WebSocket protocol core (RFC 6455): frame codec, validation, reassembly
//! and the opening handshake. Nothing in here performs I/O.

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;
pub mod validation;

pub use assembler::MessageAssembler;
pub use frame::{Decoded, Frame, decode, encode};
pub use handshake::{HandshakeRequest, HandshakeResponse, WS_GUID, compute_accept_key};
pub use mask::apply_mask;
pub use opcode::OpCode;
pub use validation::FrameValidator;
