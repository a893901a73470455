//! Input artifact loading.

use std::borrow::Cow;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::error::RunError;

/// Read a text file for use in the prompt.
///
/// Invalid UTF-8 is replaced with U+FFFD rather than failing the read, and
/// surrounding whitespace is trimmed. A missing file is `Ok(None)` so each
/// caller can apply its own default; any other I/O failure is an error.
pub fn load_text(path: &Path) -> Result<Option<String>, RunError> {
    match std::fs::read(path) {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            if matches!(text, Cow::Owned(_)) {
                debug!("{} contains invalid UTF-8; replaced", path.display());
            }
            let trimmed = text.trim().to_string();
            debug!("Loaded {} ({} chars)", path.display(), trimmed.chars().count());
            Ok(Some(trimmed))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} not found", path.display());
            Ok(None)
        }
        Err(source) => Err(RunError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
