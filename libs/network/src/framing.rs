//! # Message Boundary Detection
//!
//! A TCP stream carries no message boundaries of its own. A
//! [`BoundaryDetector`] decides where one message ends inside the bytes a
//! connection has buffered so far:
//!
//! | Policy | Boundary | Trailing bytes at end of input |
//! |---|---|---|
//! | [`ConnectionClose`] | the client closing (or half-closing) the connection | always one message, possibly empty |
//! | [`Delimited`] | a delimiter byte, stripped from the message | one message if non-empty |
//! | [`LengthPrefixed`] | 4-byte big-endian length, then payload | incomplete frame discarded |
//!
//! `ConnectionClose` is the default and makes every connection carry exactly
//! one message. The framer only talks to the trait, so switching policies does
//! not touch the rest of the pipeline.

use crate::{Result, TransportError};
use bytes::{Buf, Bytes, BytesMut};
use socket_config::{FramingPolicyKind, FramingSettings};
use std::fmt;
use tracing::warn;

/// Length prefix size (4 bytes, big-endian u32)
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Frame limit for length-prefixed framing when none is configured
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Pluggable message boundary policy
pub trait BoundaryDetector: Send + fmt::Debug {
    /// Split the next complete message off the front of `buffer`, if one is there.
    ///
    /// Called repeatedly after every chunk until it returns `Ok(None)`.
    fn split(&mut self, buffer: &mut BytesMut) -> Result<Option<Bytes>>;

    /// Take whatever message the remaining bytes form once input has ended.
    fn finish(&mut self, buffer: &mut BytesMut) -> Option<Bytes>;

    /// Policy name for logs
    fn name(&self) -> &'static str;
}

/// One message per connection, completed at end of input
#[derive(Debug, Default, Clone, Copy)]
pub struct ConnectionClose;

impl BoundaryDetector for ConnectionClose {
    fn split(&mut self, _buffer: &mut BytesMut) -> Result<Option<Bytes>> {
        Ok(None)
    }

    fn finish(&mut self, buffer: &mut BytesMut) -> Option<Bytes> {
        Some(buffer.split().freeze())
    }

    fn name(&self) -> &'static str {
        "close"
    }
}

/// Messages terminated by a delimiter byte
#[derive(Debug, Clone)]
pub struct Delimited {
    delimiter: u8,
    /// Prefix of the buffer already known to hold no delimiter
    scanned: usize,
}

impl Delimited {
    pub fn new(delimiter: u8) -> Self {
        Self {
            delimiter,
            scanned: 0,
        }
    }
}

impl BoundaryDetector for Delimited {
    fn split(&mut self, buffer: &mut BytesMut) -> Result<Option<Bytes>> {
        loop {
            let start = self.scanned.min(buffer.len());
            let found = buffer[start..].iter().position(|b| *b == self.delimiter);

            match found {
                Some(offset) => {
                    let end = start + offset;
                    self.scanned = 0;
                    let mut frame = buffer.split_to(end + 1);
                    frame.truncate(end);
                    // Blank lines between messages carry nothing
                    if !frame.is_empty() {
                        return Ok(Some(frame.freeze()));
                    }
                }
                None => {
                    self.scanned = buffer.len();
                    return Ok(None);
                }
            }
        }
    }

    fn finish(&mut self, buffer: &mut BytesMut) -> Option<Bytes> {
        self.scanned = 0;
        if buffer.is_empty() {
            None
        } else {
            Some(buffer.split().freeze())
        }
    }

    fn name(&self) -> &'static str {
        "delimiter"
    }
}

/// Messages preceded by a 4-byte big-endian length
#[derive(Debug, Clone)]
pub struct LengthPrefixed {
    max_frame_bytes: usize,
}

impl LengthPrefixed {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }
}

impl BoundaryDetector for LengthPrefixed {
    fn split(&mut self, buffer: &mut BytesMut) -> Result<Option<Bytes>> {
        if buffer.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&buffer[..LENGTH_PREFIX_SIZE]);
        let frame_len = u32::from_be_bytes(prefix) as usize;

        if frame_len > self.max_frame_bytes {
            return Err(TransportError::framing(format!(
                "Frame size {} exceeds maximum {}",
                frame_len, self.max_frame_bytes
            )));
        }

        if buffer.len() < LENGTH_PREFIX_SIZE + frame_len {
            return Ok(None);
        }

        buffer.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(buffer.split_to(frame_len).freeze()))
    }

    fn finish(&mut self, buffer: &mut BytesMut) -> Option<Bytes> {
        if !buffer.is_empty() {
            warn!(
                discarded_bytes = buffer.len(),
                "Connection ended inside a length-prefixed frame"
            );
            buffer.clear();
        }
        None
    }

    fn name(&self) -> &'static str {
        "length_prefix"
    }
}

/// Build the detector named by the framing settings
pub fn detector_for(settings: &FramingSettings) -> Box<dyn BoundaryDetector> {
    match settings.policy {
        FramingPolicyKind::Close => Box::new(ConnectionClose),
        FramingPolicyKind::Delimiter => Box::new(Delimited::new(settings.delimiter)),
        FramingPolicyKind::LengthPrefix => Box::new(LengthPrefixed::new(
            settings.max_message_bytes.unwrap_or(DEFAULT_MAX_FRAME_BYTES),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(detector: &mut dyn BoundaryDetector, buffer: &mut BytesMut) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Some(frame) = detector.split(buffer).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_close_policy_only_completes_at_end() {
        let mut detector = ConnectionClose;
        let mut buffer = BytesMut::from(&b"{\"id\":1}\n{\"id\":2}"[..]);

        assert!(drain(&mut detector, &mut buffer).is_empty());
        assert_eq!(
            detector.finish(&mut buffer).unwrap(),
            Bytes::from_static(b"{\"id\":1}\n{\"id\":2}")
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_close_policy_flushes_empty_buffer() {
        let mut buffer = BytesMut::new();
        assert_eq!(ConnectionClose.finish(&mut buffer), Some(Bytes::new()));
    }

    #[test]
    fn test_delimited_across_chunks() {
        let mut detector = Delimited::new(b'\n');
        let mut buffer = BytesMut::new();

        buffer.extend_from_slice(b"alpha\nbr");
        assert_eq!(drain(&mut detector, &mut buffer), vec![Bytes::from_static(b"alpha")]);

        buffer.extend_from_slice(b"avo\n\ncharlie");
        assert_eq!(drain(&mut detector, &mut buffer), vec![Bytes::from_static(b"bravo")]);

        assert_eq!(detector.finish(&mut buffer), Some(Bytes::from_static(b"charlie")));
        assert_eq!(detector.finish(&mut buffer), None);
    }

    #[test]
    fn test_length_prefixed_frames() {
        let mut detector = LengthPrefixed::new(1024);
        let mut buffer = BytesMut::new();

        buffer.extend_from_slice(&3u32.to_be_bytes());
        buffer.extend_from_slice(b"ab");
        assert!(drain(&mut detector, &mut buffer).is_empty());

        buffer.extend_from_slice(b"c");
        buffer.extend_from_slice(&0u32.to_be_bytes());
        assert_eq!(
            drain(&mut detector, &mut buffer),
            vec![Bytes::from_static(b"abc"), Bytes::new()]
        );
    }

    #[test]
    fn test_length_prefixed_rejects_oversized_and_discards_partial() {
        let mut detector = LengthPrefixed::new(8);
        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&9u32.to_be_bytes());
        assert!(matches!(
            detector.split(&mut buffer),
            Err(TransportError::Framing { .. })
        ));

        let mut partial = BytesMut::from(&[0u8, 0, 0][..]);
        assert_eq!(detector.finish(&mut partial), None);
        assert!(partial.is_empty());
    }

    #[test]
    fn test_detector_for_settings() {
        let mut settings = FramingSettings::default();
        assert_eq!(detector_for(&settings).name(), "close");

        settings.policy = FramingPolicyKind::Delimiter;
        assert_eq!(detector_for(&settings).name(), "delimiter");

        settings.policy = FramingPolicyKind::LengthPrefix;
        assert_eq!(detector_for(&settings).name(), "length_prefix");
    }
}
