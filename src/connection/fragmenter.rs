//! Splitting of large outgoing messages into continuation frames.

use bytes::Bytes;

use crate::protocol::{Frame, OpCode};

/// Iterator over the frames of one outgoing message.
///
/// The first frame keeps the original opcode, later frames use
/// `OpCode::Continuation`, and only the last one has FIN set. Chunks are
/// zero-copy slices of the payload.
#[derive(Debug)]
pub struct MessageFragmenter {
    payload: Bytes,
    opcode: OpCode,
    fragment_size: usize,
    offset: usize,
    is_first: bool,
}

impl MessageFragmenter {
    /// Create a fragmenter. A `fragment_size` of zero is treated as one.
    #[must_use]
    pub fn new(payload: Bytes, opcode: OpCode, fragment_size: usize) -> Self {
        Self {
            payload,
            opcode,
            fragment_size: fragment_size.max(1),
            offset: 0,
            is_first: true,
        }
    }

    /// Returns `true` if the payload needs more than one frame.
    #[must_use]
    pub fn needs_fragmentation(&self) -> bool {
        self.payload.len() > self.fragment_size
    }
}

impl Iterator for MessageFragmenter {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.payload.len() {
            if self.is_first {
                self.is_first = false;
                return Some(Frame::new(true, self.opcode, Bytes::new()));
            }
            return None;
        }

        let end = (self.offset + self.fragment_size).min(self.payload.len());
        let chunk = self.payload.slice(self.offset..end);
        self.offset = end;

        let opcode = if self.is_first {
            self.is_first = false;
            self.opcode
        } else {
            OpCode::Continuation
        };

        Some(Frame::new(end == self.payload.len(), opcode, chunk))
    }
}

/// Frames to write for `frame`: split when it is a complete data message
/// larger than `fragment_size`, otherwise the frame itself.
pub(crate) fn split(frame: Frame, fragment_size: usize) -> Vec<Frame> {
    if !frame.fin || !matches!(frame.opcode, OpCode::Text | OpCode::Binary) {
        return vec![frame];
    }
    let fragmenter = MessageFragmenter::new(frame.clone().into_payload(), frame.opcode, fragment_size);
    if fragmenter.needs_fragmentation() {
        fragmenter.collect()
    } else {
        vec![frame]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_fragmentation_needed() {
        let frag = MessageFragmenter::new(Bytes::from_static(b"Hello"), OpCode::Text, 1024);
        assert!(!frag.needs_fragmentation());

        let frames: Vec<_> = frag.collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
        assert_eq!(frames[0].opcode, OpCode::Text);
        assert_eq!(frames[0].payload(), b"Hello");
    }

    #[test]
    fn test_exact_fragmentation() {
        let frag = MessageFragmenter::new(Bytes::from(vec![0xAB; 30]), OpCode::Binary, 10);
        assert!(frag.needs_fragmentation());

        let frames: Vec<_> = frag.collect();
        assert_eq!(frames.len(), 3);
        assert_eq!((frames[0].fin, frames[0].opcode), (false, OpCode::Binary));
        assert_eq!((frames[1].fin, frames[1].opcode), (false, OpCode::Continuation));
        assert_eq!((frames[2].fin, frames[2].opcode), (true, OpCode::Continuation));
        assert!(frames.iter().all(|f| f.payload().len() == 10));
    }

    #[test]
    fn test_uneven_fragmentation() {
        let frames: Vec<_> =
            MessageFragmenter::new(Bytes::from(vec![0xCD; 25]), OpCode::Binary, 10).collect();
        let sizes: Vec<_> = frames.iter().map(|f| f.payload().len()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert!(frames[2].fin);
    }

    #[test]
    fn test_empty_payload() {
        let frames: Vec<_> = MessageFragmenter::new(Bytes::new(), OpCode::Text, 1024).collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
        assert!(frames[0].payload().is_empty());
    }

    #[test]
    fn test_split_leaves_small_and_partial_frames_alone() {
        assert_eq!(split(Frame::text(&b"small"[..]), 10).len(), 1);

        // Caller-built fragments are written as given.
        let partial = Frame::new(false, OpCode::Text, vec![b'x'; 50]);
        assert_eq!(split(partial, 10).len(), 1);

        let ping = Frame::ping(vec![0u8; 100]);
        assert_eq!(split(ping, 10).len(), 1);
    }

    #[test]
    fn test_split_large_message() {
        let frames = split(Frame::binary(vec![7u8; 25]), 10);
        assert_eq!(frames.len(), 3);
        let joined: Vec<u8> = frames.iter().flat_map(|f| f.payload().to_vec()).collect();
        assert_eq!(joined, vec![7u8; 25]);
    }
}
