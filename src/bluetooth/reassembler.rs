// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Stream reassembly of newline-delimited payloads.
//!
//! A serial stream may split one payload across reads or pack several into
//! one. Every payload is terminated by `\n`; JSON encoding escapes newlines
//! inside strings, so the terminator never occurs within a payload.

use tracing::{debug, warn};

use crate::error::TransportError;

/// Frame terminator.
pub const DELIMITER: u8 = b'\n';

/// Default upper bound for a single payload.
pub const DEFAULT_MAX_FRAME: usize = 64 * 1024;

/// Accumulates stream bytes and yields whole payloads.
pub struct MessageReassembler {
    buffer: Vec<u8>,
    max_frame: usize,
    /// Set while skipping the remainder of an oversized frame.
    discarding: bool,
}

impl MessageReassembler {
    /// Create a reassembler with the given payload size limit.
    pub fn new(max_frame: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_frame,
            discarding: false,
        }
    }

    /// Feed a chunk read from the stream.
    ///
    /// Returns every payload completed by this chunk, in stream order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut complete = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == DELIMITER) {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                self.buffer.clear();
                continue;
            }

            if self.buffer.len() + head.len() > self.max_frame {
                warn!(
                    "Dropping oversized frame: {} bytes (limit {})",
                    self.buffer.len() + head.len(),
                    self.max_frame
                );
                self.buffer.clear();
                continue;
            }

            self.buffer.extend_from_slice(head);
            let frame = std::mem::take(&mut self.buffer);

            if frame.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }

            debug!("Frame complete: {} bytes", frame.len());
            complete.push(frame);
        }

        if !self.discarding {
            if self.buffer.len() + rest.len() > self.max_frame {
                warn!(
                    "Frame exceeds limit of {} bytes, discarding until delimiter",
                    self.max_frame
                );
                self.buffer.clear();
                self.discarding = true;
            } else {
                self.buffer.extend_from_slice(rest);
            }
        }

        complete
    }

    /// Check if a partial frame is buffered.
    pub fn is_in_progress(&self) -> bool {
        !self.buffer.is_empty() || self.discarding
    }

    /// Get current buffer size.
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for MessageReassembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME)
    }
}

/// Frame a payload for the stream.
pub fn frame(payload: &[u8], max_frame: usize) -> Result<Vec<u8>, TransportError> {
    if payload.len() > max_frame {
        return Err(TransportError::FrameTooLarge {
            size: payload.len(),
            limit: max_frame,
        });
    }

    let mut framed = Vec::with_capacity(payload.len() + 1);
    framed.extend_from_slice(payload);
    framed.push(DELIMITER);
    Ok(framed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut reassembler = MessageReassembler::default();

        let result = reassembler.push(b"hello\n");
        assert_eq!(result, vec![b"hello".to_vec()]);
        assert!(!reassembler.is_in_progress());
    }

    #[test]
    fn test_split_frame() {
        let mut reassembler = MessageReassembler::default();

        assert!(reassembler.push(b"hel").is_empty());
        assert!(reassembler.is_in_progress());
        assert_eq!(reassembler.buffer_size(), 3);

        let result = reassembler.push(b"lo\n");
        assert_eq!(result, vec![b"hello".to_vec()]);
        assert!(!reassembler.is_in_progress());
    }

    #[test]
    fn test_combined_frames() {
        let mut reassembler = MessageReassembler::default();

        let result = reassembler.push(b"one\ntwo\nthr");
        assert_eq!(result, vec![b"one".to_vec(), b"two".to_vec()]);

        let result = reassembler.push(b"ee\n");
        assert_eq!(result, vec![b"three".to_vec()]);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let mut reassembler = MessageReassembler::default();

        let result = reassembler.push(b"\n\r\none\n  \n");
        assert_eq!(result, vec![b"one".to_vec()]);
    }

    #[test]
    fn test_oversized_frame_dropped() {
        let mut reassembler = MessageReassembler::new(8);

        // Too long before the delimiter arrives
        assert!(reassembler.push(b"0123456789").is_empty());
        assert!(reassembler.is_in_progress());

        // Remainder of the oversized frame is skipped, next frame survives
        let result = reassembler.push(b"abc\nok\n");
        assert_eq!(result, vec![b"ok".to_vec()]);
        assert!(!reassembler.is_in_progress());
    }

    #[test]
    fn test_oversized_frame_in_one_chunk() {
        let mut reassembler = MessageReassembler::new(4);

        let result = reassembler.push(b"toolong\nfine\n");
        assert_eq!(result, vec![b"fine".to_vec()]);
    }

    #[test]
    fn test_frame() {
        assert_eq!(frame(b"abc", 16).unwrap(), b"abc\n".to_vec());
        assert!(matches!(
            frame(b"abcdef", 4),
            Err(TransportError::FrameTooLarge { size: 6, limit: 4 })
        ));
    }

    #[test]
    fn test_byte_by_byte() {
        let data = b"{\"type\":\"text\",\"content\":\"hi\",\"timestamp\":1}\n";
        let mut reassembler = MessageReassembler::default();

        let mut result = Vec::new();
        for byte in data.iter() {
            result.extend(reassembler.push(std::slice::from_ref(byte)));
        }

        assert_eq!(result, vec![data[..data.len() - 1].to_vec()]);
    }
}
