use std::fmt;

use arboard::Clipboard;
use dbfuse_core::clipboard::{ClipboardError, ClipboardSink};

/// Platform clipboard, opened lazily on first copy.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Option<Clipboard>,
}

impl SystemClipboard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for SystemClipboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemClipboard")
            .field("opened", &self.inner.is_some())
            .finish()
    }
}

impl ClipboardSink for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        if self.inner.is_none() {
            self.inner = Some(Clipboard::new().map_err(to_clipboard_error)?);
        }
        let Some(clipboard) = self.inner.as_mut() else {
            return Err(ClipboardError::new("system clipboard is unavailable"));
        };

        if let Err(error) = clipboard.set_text(text.to_string()) {
            // A broken handle is reopened on the next copy.
            self.inner = None;
            return Err(to_clipboard_error(error));
        }
        Ok(())
    }
}

fn to_clipboard_error(error: arboard::Error) -> ClipboardError {
    ClipboardError::new(format!("system clipboard: {error}"))
}
