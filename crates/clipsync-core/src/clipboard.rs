//! Local clipboard access
//!
//! The engine only talks to the clipboard through [`ClipboardSource`]. Three
//! backends are provided:
//!
//! - [`ArboardClipboard`]: the platform clipboard via `arboard`
//! - [`CommandClipboard`]: external paste/copy commands (`wl-paste`/`wl-copy`
//!   by default), for Wayland guests without a clipboard library
//! - [`MemoryClipboard`]: an in-process value, used by tests and embedders
//!
//! Calls may block; the engine runs them on the blocking thread pool.

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{SyncError, SyncResult};
use crate::types::ClipboardValue;

/// Read/write access to one local clipboard
pub trait ClipboardSource: Send + Sync + 'static {
    /// Current clipboard text. An empty or non-text clipboard reads as empty.
    fn read(&self) -> SyncResult<ClipboardValue>;

    /// Replace the clipboard text
    fn write(&self, value: &ClipboardValue) -> SyncResult<()>;
}

/// Platform clipboard backed by `arboard`.
///
/// The handle is kept for the lifetime of the backend: on X11 the copied
/// content is only served while the owning handle exists.
#[cfg(feature = "arboard")]
pub struct ArboardClipboard {
    inner: Mutex<arboard::Clipboard>,
}

#[cfg(feature = "arboard")]
impl ArboardClipboard {
    pub fn new() -> SyncResult<Self> {
        let inner = arboard::Clipboard::new()
            .map_err(|e| SyncError::ClipboardAccess(format!("failed to open clipboard: {e}")))?;
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }
}

#[cfg(feature = "arboard")]
impl ClipboardSource for ArboardClipboard {
    fn read(&self) -> SyncResult<ClipboardValue> {
        match self.inner.lock().get_text() {
            Ok(text) => Ok(text.into()),
            Err(arboard::Error::ContentNotAvailable) => Ok(ClipboardValue::empty()),
            Err(e) => Err(SyncError::ClipboardAccess(e.to_string())),
        }
    }

    fn write(&self, value: &ClipboardValue) -> SyncResult<()> {
        self.inner
            .lock()
            .set_text(value.as_str())
            .map_err(|e| SyncError::ClipboardAccess(e.to_string()))
    }
}

/// Clipboard driven by external commands.
///
/// The paste command must print the clipboard to stdout; the copy command
/// must read the new content from stdin.
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    paste: Vec<String>,
    copy: Vec<String>,
}

impl CommandClipboard {
    /// Build from whitespace-separated command lines, e.g. `"xclip -o"`.
    pub fn new(paste: &str, copy: &str) -> SyncResult<Self> {
        let paste = split_command(paste)?;
        let copy = split_command(copy)?;
        Ok(Self { paste, copy })
    }

    fn command(argv: &[String]) -> Command {
        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);
        command
    }
}

fn split_command(line: &str) -> SyncResult<Vec<String>> {
    let argv: Vec<String> = line.split_whitespace().map(str::to_string).collect();
    if argv.is_empty() {
        return Err(SyncError::ClipboardAccess("empty clipboard command".into()));
    }
    Ok(argv)
}

impl ClipboardSource for CommandClipboard {
    fn read(&self) -> SyncResult<ClipboardValue> {
        let output = Self::command(&self.paste)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| SyncError::ClipboardAccess(format!("{}: {e}", self.paste[0])))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SyncError::ClipboardAccess(format!(
                "{} exited with {}: {}",
                self.paste[0],
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map(ClipboardValue::from)
            .map_err(|_| SyncError::ClipboardAccess("clipboard content is not UTF-8".into()))
    }

    fn write(&self, value: &ClipboardValue) -> SyncResult<()> {
        let mut child = Self::command(&self.copy)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SyncError::ClipboardAccess(format!("{}: {e}", self.copy[0])))?;

        // stdin is closed at the end of this statement so the child sees EOF
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(value.as_bytes()),
            None => Ok(()),
        };

        // Reap the child even when it stopped reading early
        let status = child
            .wait()
            .map_err(|e| SyncError::ClipboardAccess(format!("{}: {e}", self.copy[0])))?;
        written.map_err(|e| SyncError::ClipboardAccess(format!("{}: {e}", self.copy[0])))?;
        if !status.success() {
            return Err(SyncError::ClipboardAccess(format!(
                "{} exited with {}",
                self.copy[0], status
            )));
        }
        Ok(())
    }
}

/// In-memory clipboard.
///
/// [`MemoryClipboard::set`] stands in for a user copying text; writes made
/// by the engine through [`ClipboardSource::write`] are also recorded in
/// [`MemoryClipboard::writes`] so callers can see what sync applied.
/// Reads and writes can be made to fail, like a clipboard that is locked or
/// has no display.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    value: Mutex<ClipboardValue>,
    writes: Mutex<Vec<ClipboardValue>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: impl Into<ClipboardValue>) -> Self {
        Self {
            value: Mutex::new(value.into()),
            ..Self::default()
        }
    }

    /// Make every following read fail (or succeed again)
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every following write fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Replace the content as a local user would
    pub fn set(&self, value: impl Into<ClipboardValue>) {
        *self.value.lock() = value.into();
    }

    pub fn get(&self) -> ClipboardValue {
        self.value.lock().clone()
    }

    /// Every value written through the [`ClipboardSource`] interface
    pub fn writes(&self) -> Vec<ClipboardValue> {
        self.writes.lock().clone()
    }
}

impl ClipboardSource for MemoryClipboard {
    fn read(&self) -> SyncResult<ClipboardValue> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SyncError::ClipboardAccess("clipboard unavailable".into()));
        }
        Ok(self.get())
    }

    fn write(&self, value: &ClipboardValue) -> SyncResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::ClipboardAccess("clipboard unavailable".into()));
        }
        *self.value.lock() = value.clone();
        self.writes.lock().push(value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_clipboard_separates_user_and_sync_writes() {
        let clipboard = MemoryClipboard::with_value("start");
        assert_eq!(clipboard.read().unwrap().as_str(), "start");

        clipboard.set("typed");
        assert!(clipboard.writes().is_empty());

        clipboard.write(&"synced".into()).unwrap();
        assert_eq!(clipboard.get().as_str(), "synced");
        assert_eq!(clipboard.writes(), vec![ClipboardValue::from("synced")]);
    }

    #[test]
    fn test_memory_clipboard_failure_switches() {
        let clipboard = MemoryClipboard::with_value("kept");

        clipboard.set_fail_reads(true);
        clipboard.set_fail_writes(true);
        assert!(matches!(clipboard.read(), Err(SyncError::ClipboardAccess(_))));
        assert!(matches!(
            clipboard.write(&"lost".into()),
            Err(SyncError::ClipboardAccess(_))
        ));
        assert_eq!(clipboard.get().as_str(), "kept");
        assert!(clipboard.writes().is_empty());

        clipboard.set_fail_reads(false);
        clipboard.set_fail_writes(false);
        assert_eq!(clipboard.read().unwrap().as_str(), "kept");
    }

    #[test]
    fn test_command_clipboard_rejects_empty_command() {
        assert!(matches!(
            CommandClipboard::new("", "wl-copy"),
            Err(SyncError::ClipboardAccess(_))
        ));
    }

    #[test]
    fn test_missing_command_is_access_error() {
        let clipboard =
            CommandClipboard::new("clipsync-no-such-paste", "clipsync-no-such-copy").unwrap();
        assert!(matches!(clipboard.read(), Err(SyncError::ClipboardAccess(_))));
        assert!(matches!(
            clipboard.write(&"x".into()),
            Err(SyncError::ClipboardAccess(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_clipboard_reads_stdout_verbatim() {
        let clipboard = CommandClipboard::new("echo hello", "true").unwrap();
        assert_eq!(clipboard.read().unwrap().as_str(), "hello\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_command_that_stops_reading_is_reported() {
        // `true` exits without reading, so a value larger than the pipe
        // buffer hits a broken pipe
        let clipboard = CommandClipboard::new("true", "true").unwrap();
        let big = ClipboardValue::from("x".repeat(1024 * 1024));
        assert!(matches!(
            clipboard.write(&big),
            Err(SyncError::ClipboardAccess(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_clipboard_reports_failing_command() {
        let clipboard = CommandClipboard::new("false", "false").unwrap();
        assert!(clipboard.read().is_err());
        assert!(clipboard.write(&"x".into()).is_err());
    }
}
