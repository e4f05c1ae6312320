use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ClipboardError {
    message: String,
}

impl ClipboardError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub trait ClipboardSink {
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMethod {
    Primary,
    Fallback,
}

pub fn copy_with_fallback(
    primary: &mut dyn ClipboardSink,
    fallback: &mut dyn ClipboardSink,
    text: &str,
) -> Result<CopyMethod, ClipboardError> {
    match primary.set_text(text) {
        Ok(()) => Ok(CopyMethod::Primary),
        Err(error) => {
            tracing::warn!(%error, "primary clipboard failed, using fallback");
            fallback.set_text(text)?;
            Ok(CopyMethod::Fallback)
        }
    }
}
