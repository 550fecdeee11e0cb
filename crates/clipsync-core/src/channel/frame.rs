//! Length-prefixed framing for clipboard text on a byte stream
//!
//! ## Wire Format
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────┐
//! │ length: u32 (BE) │ payload: `length` bytes UTF-8 │
//! └──────────────────┴──────────────────────────────┘
//! ```
//!
//! A single read from a socket may return part of a frame or several frames
//! at once; the codec buffers until a whole frame is present.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::error::SyncError;
use crate::types::ClipboardValue;

/// Largest accepted frame payload (16 MiB)
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Width of the big-endian length header in bytes
const LENGTH_FIELD_BYTES: usize = 4;

/// Encodes/decodes [`ClipboardValue`]s as length-prefixed UTF-8 frames
#[derive(Debug)]
pub struct ClipboardCodec {
    inner: LengthDelimitedCodec,
}

impl ClipboardCodec {
    pub fn new(max_frame_length: usize) -> Self {
        let inner = LengthDelimitedCodec::builder()
            .length_field_length(LENGTH_FIELD_BYTES)
            .big_endian()
            .max_frame_length(max_frame_length)
            .new_codec();
        Self { inner }
    }
}

impl Default for ClipboardCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LENGTH)
    }
}

fn frame_error(err: std::io::Error) -> SyncError {
    match err.kind() {
        std::io::ErrorKind::InvalidData | std::io::ErrorKind::InvalidInput => {
            SyncError::InvalidFrame(err.to_string())
        }
        _ => SyncError::Io(err),
    }
}

impl Decoder for ClipboardCodec {
    type Item = ClipboardValue;
    type Error = SyncError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(frame) = self.inner.decode(src).map_err(frame_error)? else {
            return Ok(None);
        };
        let text = std::str::from_utf8(&frame)
            .map_err(|e| SyncError::InvalidFrame(format!("payload is not UTF-8: {e}")))?;
        Ok(Some(ClipboardValue::from(text)))
    }
}

impl Encoder<ClipboardValue> for ClipboardCodec {
    type Error = SyncError;

    fn encode(&mut self, item: ClipboardValue, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner
            .encode(Bytes::copy_from_slice(item.as_bytes()), dst)
            .map_err(frame_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: &str) -> BytesMut {
        let mut buf = BytesMut::new();
        ClipboardCodec::default()
            .encode(ClipboardValue::from(value), &mut buf)
            .unwrap();
        buf
    }

    #[test]
    fn test_header_is_big_endian_length() {
        let buf = encoded("abc");
        assert_eq!(&buf[..], &[0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_empty_value_is_a_frame() {
        let mut buf = encoded("");
        assert_eq!(buf.len(), LENGTH_FIELD_BYTES);

        let decoded = ClipboardCodec::default().decode(&mut buf).unwrap();
        assert_eq!(decoded, Some(ClipboardValue::empty()));
    }

    #[test]
    fn test_partial_frame_waits_for_rest() {
        let full = encoded("hello world");
        let mut codec = ClipboardCodec::default();

        let mut buf = BytesMut::from(&full[..6]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(&full[6..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_str(), "hello world");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_coalesced_frames_split_cleanly() {
        let mut buf = encoded("first");
        buf.extend_from_slice(&encoded("second"));
        let mut codec = ClipboardCodec::default();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_str(), "first");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_str(), "second");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let mut buf = BytesMut::from(&[0u8, 0, 0, 2, 0xff, 0xfe][..]);
        let err = ClipboardCodec::default().decode(&mut buf).unwrap_err();
        assert!(matches!(err, SyncError::InvalidFrame(_)));
    }

    #[test]
    fn test_oversize_frames_are_rejected() {
        let mut codec = ClipboardCodec::new(8);

        let mut out = BytesMut::new();
        let err = codec
            .encode(ClipboardValue::from("too long for eight"), &mut out)
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidFrame(_)));

        let mut buf = encoded("too long for eight");
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, SyncError::InvalidFrame(_)));
    }
}
