//! Source code intake for Code Canvas.
//!
//! Source text arrives either pasted into the editor or uploaded as a single
//! file. Uploaded file names are checked against an extension allow-list
//! before any content is read. Source text is opaque: it is never parsed or
//! executed, only forwarded to the generation service.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CanvasError, Result};

/// File extensions accepted for upload, compared case-insensitively.
pub const ACCEPTED_EXTENSIONS: &[&str] = &[
    ".js", ".jsx", ".ts", ".tsx", ".py", ".java", ".c", ".cpp", ".cs", ".go", ".rs", ".php",
    ".rb", ".html", ".css", ".json", ".md", ".txt",
];

/// Where the current source text came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceOrigin {
    /// Typed or pasted into the editor.
    #[default]
    Pasted,
    /// Loaded from an uploaded or local file.
    File {
        /// File name as supplied by the user.
        name: String,
    },
}

/// The code snippet a session works on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceText {
    /// Raw text content.
    pub content: String,
    /// How the content entered the session.
    pub origin: SourceOrigin,
}

impl SourceText {
    /// Creates source text from editor input.
    #[must_use]
    pub fn pasted(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            origin: SourceOrigin::Pasted,
        }
    }

    /// Creates source text from an uploaded file.
    ///
    /// The name is validated first; bytes are decoded as UTF-8 with invalid
    /// sequences replaced.
    ///
    /// # Errors
    ///
    /// Returns `CanvasError::Validation` if the name has an unaccepted extension.
    pub fn from_upload(name: &str, bytes: &[u8]) -> Result<Self> {
        validate_upload_name(name)?;
        Ok(Self {
            content: String::from_utf8_lossy(bytes).into_owned(),
            origin: SourceOrigin::File {
                name: name.to_string(),
            },
        })
    }

    /// Loads source text from a local file through the same allow-list.
    ///
    /// # Errors
    ///
    /// Returns `CanvasError::Validation` if the extension is not accepted, or
    /// `CanvasError::Io` if the file cannot be read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        validate_upload_name(name)?;

        let bytes = std::fs::read(path)?;
        Self::from_upload(name, &bytes)
    }

    /// Returns `true` if the content is empty or only whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Number of lines in the content.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }
}

/// Checks an upload's file name against [`ACCEPTED_EXTENSIONS`].
///
/// # Errors
///
/// Returns `CanvasError::Validation` listing the accepted extensions.
pub fn validate_upload_name(name: &str) -> Result<()> {
    let lower = name.to_lowercase();
    if ACCEPTED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        Ok(())
    } else {
        Err(CanvasError::validation(name, ACCEPTED_EXTENSIONS))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_listed_extensions() {
        for name in ["main.rs", "App.TSX", "index.html", "notes.md", "a.b.py"] {
            assert!(validate_upload_name(name).is_ok(), "{name} should be accepted");
        }
    }

    #[test]
    fn test_rejects_unlisted_extensions() {
        for name in ["note.exe", "archive.tar.gz", "Makefile", "image.png", "rs"] {
            let err = validate_upload_name(name).unwrap_err();
            assert!(
                matches!(&err, CanvasError::Validation { file_name, .. } if file_name == name),
                "{name} should be rejected, got: {err:?}"
            );
        }
    }

    #[test]
    fn test_rejected_upload_never_becomes_source() {
        let result = SourceText::from_upload("note.exe", b"MZ\x90\x00");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_upload_records_origin() {
        let source = SourceText::from_upload("main.rs", b"fn main() {}\n").unwrap();
        assert_eq!(source.content, "fn main() {}\n");
        assert_eq!(
            source.origin,
            SourceOrigin::File {
                name: "main.rs".to_string()
            }
        );
    }

    #[test]
    fn test_from_upload_decodes_lossily() {
        let source = SourceText::from_upload("data.txt", &[b'o', b'k', 0xFF]).unwrap();
        assert!(source.content.starts_with("ok"));
        assert!(source.content.contains('\u{FFFD}'));
    }

    #[test]
    fn test_is_blank() {
        assert!(SourceText::default().is_blank());
        assert!(SourceText::pasted("  \n\t").is_blank());
        assert!(!SourceText::pasted("x").is_blank());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = std::env::temp_dir().join("test_canvas_source");
        std::fs::create_dir_all(&dir).unwrap();
        let good = dir.join("lib.rs");
        let bad = dir.join("lib.so");
        std::fs::write(&good, "pub fn a() {}\npub fn b() {}\n").unwrap();
        std::fs::write(&bad, "binary").unwrap();

        let source = SourceText::load(&good).unwrap();
        assert_eq!(source.line_count(), 2);
        assert!(matches!(
            SourceText::load(&bad),
            Err(CanvasError::Validation { .. })
        ));

        std::fs::remove_file(&good).ok();
        std::fs::remove_file(&bad).ok();
        std::fs::remove_dir(&dir).ok();
    }

    #[test]
    fn test_origin_serialization() {
        let json = serde_json::to_string(&SourceOrigin::File {
            name: "a.go".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"file","name":"a.go"}"#);
        assert_eq!(
            serde_json::to_string(&SourceOrigin::Pasted).unwrap(),
            r#"{"kind":"pasted"}"#
        );
    }
}
