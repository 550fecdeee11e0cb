//! Core types for clipsync

use std::fmt;
use std::sync::Arc;

use ulid::Ulid;

/// Number of characters shown by [`ClipboardValue::preview`]
const PREVIEW_CHARS: usize = 32;

/// An immutable clipboard text payload.
///
/// Equality is exact byte equality; no trimming or normalization is applied.
/// Clones share the underlying buffer, so fanning one value out to many peers
/// does not copy the text.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct ClipboardValue(Arc<str>);

impl ClipboardValue {
    /// Create a value from any string-like input
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    /// The empty clipboard value
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short single-line rendering for log output
    pub fn preview(&self) -> String {
        let mut preview: String = self
            .0
            .chars()
            .take(PREVIEW_CHARS)
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        if self.0.chars().nth(PREVIEW_CHARS).is_some() {
            preview.push('…');
        }
        preview
    }
}

impl From<String> for ClipboardValue {
    fn from(text: String) -> Self {
        Self(text.into())
    }
}

impl From<&str> for ClipboardValue {
    fn from(text: &str) -> Self {
        Self(text.into())
    }
}

impl AsRef<str> for ClipboardValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClipboardValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ClipboardValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipboardValue")
            .field("len", &self.len())
            .field("preview", &self.preview())
            .finish()
    }
}

/// Outcome of feeding a candidate value through the change tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The candidate differs from the last known value and is now recorded
    Changed,
    /// The candidate equals the last known value; nothing happened
    Unchanged,
}

impl Observation {
    pub fn is_changed(self) -> bool {
        matches!(self, Observation::Changed)
    }
}

/// Unique identifier for one accepted peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub Ulid);

impl PeerId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer_{}", self.0)
    }
}

/// A value received from a channel, tagged with the connection it came from.
///
/// `origin` is `None` for channels with a single remote end (shared file,
/// TCP client). The server sets it so re-broadcast can skip the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub value: ClipboardValue,
    pub origin: Option<PeerId>,
}

impl Inbound {
    /// Inbound value from a channel with a single remote end
    pub fn new(value: ClipboardValue) -> Self {
        Self {
            value,
            origin: None,
        }
    }

    /// Inbound value received from a specific server-side peer
    pub fn from_peer(value: ClipboardValue, origin: PeerId) -> Self {
        Self {
            value,
            origin: Some(origin),
        }
    }
}
