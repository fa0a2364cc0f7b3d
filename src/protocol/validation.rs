//! Header-level checks applied to every incoming frame.
//!
//! Running these on the header alone means a bad frame is rejected before its
//! payload is buffered:
//! - masking direction per RFC 6455 Section 5.1
//! - RSV bits, since no extensions are negotiated
//! - control frame rules (FIN set, payload of at most 125 bytes)
//! - the configured frame size limit

use crate::config::Limits;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::frame::{FrameHeader, MAX_CONTROL_FRAME_PAYLOAD};

/// Validator for incoming frame headers, bound to the local role.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    role: Role,
    limits: Limits,
}

impl FrameValidator {
    /// Create a validator for frames received by `role`.
    #[must_use]
    pub const fn new(role: Role, limits: Limits) -> Self {
        Self { role, limits }
    }

    /// The local role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// The limits in force.
    #[must_use]
    pub const fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Validate a decoded frame header.
    ///
    /// # Errors
    ///
    /// - `Error::UnmaskedClientFrame` - server received an unmasked frame
    /// - `Error::MaskedServerFrame` - client received a masked frame
    /// - `Error::ReservedBitsSet` - RSV bits set
    /// - `Error::FragmentedControlFrame` - control frame without FIN
    /// - `Error::ControlFrameTooLarge` - control payload above 125 bytes
    /// - `Error::FrameTooLarge` - payload above the frame limit
    pub fn validate(&self, header: &FrameHeader) -> Result<()> {
        self.validate_masking(header.mask.is_some())?;

        if header.rsv != 0 {
            return Err(Error::ReservedBitsSet);
        }

        if header.opcode.is_control() {
            if !header.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if header.payload_len > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(header.payload_len));
            }
        }

        self.limits.check_frame_size(header.payload_len)
    }

    fn validate_masking(&self, masked: bool) -> Result<()> {
        match (self.role.expects_masked(), masked) {
            (true, false) => Err(Error::UnmaskedClientFrame),
            (false, true) => Err(Error::MaskedServerFrame),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OpCode;

    fn header(opcode: OpCode, fin: bool, masked: bool, payload_len: usize) -> FrameHeader {
        FrameHeader {
            fin,
            rsv: 0,
            opcode,
            mask: masked.then_some([1, 2, 3, 4]),
            payload_len,
            header_len: 2,
        }
    }

    // --------------------------------------------------------------------------
    // Masking (RFC 6455 Section 5.1)
    // --------------------------------------------------------------------------

    #[test]
    fn test_server_rejects_unmasked_client_frame() {
        let validator = FrameValidator::new(Role::Server, Limits::default());
        let result = validator.validate(&header(OpCode::Text, true, false, 10));
        assert!(matches!(result, Err(Error::UnmaskedClientFrame)));
    }

    #[test]
    fn test_server_accepts_masked_client_frame() {
        let validator = FrameValidator::new(Role::Server, Limits::default());
        assert!(validator.validate(&header(OpCode::Text, true, true, 10)).is_ok());
    }

    #[test]
    fn test_client_rejects_masked_server_frame() {
        let validator = FrameValidator::new(Role::Client, Limits::default());
        let result = validator.validate(&header(OpCode::Binary, true, true, 10));
        assert!(matches!(result, Err(Error::MaskedServerFrame)));
    }

    #[test]
    fn test_client_accepts_unmasked_server_frame() {
        let validator = FrameValidator::new(Role::Client, Limits::default());
        assert!(validator.validate(&header(OpCode::Binary, true, false, 10)).is_ok());
    }

    // --------------------------------------------------------------------------
    // RSV bits and control frames
    // --------------------------------------------------------------------------

    #[test]
    fn test_rejects_any_rsv_bit() {
        let validator = FrameValidator::new(Role::Client, Limits::default());
        for rsv in [0x40, 0x20, 0x10] {
            let mut h = header(OpCode::Text, true, false, 1);
            h.rsv = rsv;
            assert!(matches!(validator.validate(&h), Err(Error::ReservedBitsSet)));
        }
    }

    #[test]
    fn test_control_frame_rules() {
        let validator = FrameValidator::new(Role::Client, Limits::default());
        assert!(matches!(
            validator.validate(&header(OpCode::Ping, false, false, 0)),
            Err(Error::FragmentedControlFrame)
        ));
        assert!(matches!(
            validator.validate(&header(OpCode::Close, true, false, 126)),
            Err(Error::ControlFrameTooLarge(126))
        ));
        assert!(validator.validate(&header(OpCode::Pong, true, false, 125)).is_ok());
    }

    // --------------------------------------------------------------------------
    // Size limit
    // --------------------------------------------------------------------------

    #[test]
    fn test_frame_size_limit() {
        let validator = FrameValidator::new(Role::Client, Limits::new(1024, 4096, 8, 8192));
        assert!(validator.validate(&header(OpCode::Binary, true, false, 1024)).is_ok());
        assert!(matches!(
            validator.validate(&header(OpCode::Binary, true, false, 1025)),
            Err(Error::FrameTooLarge { size: 1025, max: 1024 })
        ));
    }
}
