//! Document loaders: turn raw file bytes into a typed [`Document`].
//!
//! Format polymorphism lives only here. Each [`DocumentLoader`] decodes one
//! [`DocumentFormat`]; the [`LoaderRegistry`] maps file extensions to loaders
//! and rejects anything unregistered with [`RagError::UnsupportedFormat`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::document::{Document, DocumentFormat};
use crate::error::{RagError, Result};

/// Decodes raw bytes of one format into ordered text segments.
pub trait DocumentLoader: Send + Sync {
    /// The format this loader decodes.
    fn format(&self) -> DocumentFormat;

    /// Decode `bytes` into text segments in reading order.
    ///
    /// `source` is only used for error messages.
    fn load(&self, source: &str, bytes: &[u8]) -> Result<Vec<String>>;
}

/// Loads UTF-8 plain text or markdown as a single segment.
#[derive(Debug, Clone, Copy)]
pub struct TextLoader {
    format: DocumentFormat,
}

impl TextLoader {
    /// A loader for `.txt` files.
    pub fn plain() -> Self {
        Self { format: DocumentFormat::Text }
    }

    /// A loader for `.md` files.
    pub fn markdown() -> Self {
        Self { format: DocumentFormat::Markdown }
    }
}

impl DocumentLoader for TextLoader {
    fn format(&self) -> DocumentFormat {
        self.format
    }

    fn load(&self, source: &str, bytes: &[u8]) -> Result<Vec<String>> {
        let text = std::str::from_utf8(bytes).map_err(|e| RagError::DocumentLoad {
            source_name: source.to_string(),
            message: format!("not valid UTF-8: {e}"),
        })?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Ok(vec![text.to_string()])
    }
}

/// Extracts text from a PDF, one segment per page.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    fn load(&self, source: &str, bytes: &[u8]) -> Result<Vec<String>> {
        pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| RagError::DocumentLoad {
            source_name: source.to_string(),
            message: format!("PDF extraction failed: {e}"),
        })
    }
}

/// Maps lower-case file extensions to loaders.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::LoaderRegistry;
///
/// let registry = LoaderRegistry::default();
/// let document = registry.load_path("notes/intro.md")?;
/// ```
#[derive(Clone)]
pub struct LoaderRegistry {
    loaders: HashMap<String, Arc<dyn DocumentLoader>>,
}

impl LoaderRegistry {
    /// An empty registry that rejects every file.
    pub fn empty() -> Self {
        Self { loaders: HashMap::new() }
    }

    /// Register `loader` for `extension` (case-insensitive, without the dot).
    pub fn register(mut self, extension: &str, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loaders.insert(extension.trim_start_matches('.').to_ascii_lowercase(), loader);
        self
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut extensions: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        extensions.sort_unstable();
        extensions
    }

    /// Resolve the loader for a file name.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::UnsupportedFormat`] if the extension is missing or
    /// not registered.
    pub fn resolve(&self, name: &str) -> Result<&Arc<dyn DocumentLoader>> {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        self.loaders.get(&extension).ok_or_else(|| RagError::UnsupportedFormat {
            source_name: name.to_string(),
            extension,
        })
    }

    /// Decode uploaded content named `name` into a [`Document`].
    pub fn load_bytes(&self, name: &str, bytes: &[u8]) -> Result<Document> {
        let loader = self.resolve(name)?;
        let segments = loader.load(name, bytes)?;
        debug!(source = name, format = %loader.format(), segments = segments.len(), "loaded document");
        Ok(Document { source: name.to_string(), format: loader.format(), segments })
    }

    /// Read and decode the file at `path`.
    ///
    /// The document's source is the file name without its directory. The format
    /// is checked before the file is read.
    pub fn load_path(&self, path: impl AsRef<Path>) -> Result<Document> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.resolve(&name)?;
        let bytes = std::fs::read(path).map_err(|e| RagError::DocumentLoad {
            source_name: name.clone(),
            message: e.to_string(),
        })?;
        self.load_bytes(&name, &bytes)
    }
}

impl Default for LoaderRegistry {
    /// Registers `pdf`, `txt` and `md`.
    fn default() -> Self {
        Self::empty()
            .register("pdf", Arc::new(PdfLoader))
            .register("txt", Arc::new(TextLoader::plain()))
            .register("md", Arc::new(TextLoader::markdown()))
    }
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderRegistry").field("extensions", &self.extensions()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_knows_pdf_txt_md() {
        assert_eq!(LoaderRegistry::default().extensions(), vec!["md", "pdf", "txt"]);
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let registry = LoaderRegistry::default();
        let doc = registry.load_bytes("NOTES.MD", b"# Title\n\nBody").unwrap();
        assert_eq!(doc.format, DocumentFormat::Markdown);
        assert_eq!(doc.segments, vec!["# Title\n\nBody".to_string()]);
    }

    #[test]
    fn unknown_or_missing_extension_is_unsupported() {
        let registry = LoaderRegistry::default();
        let err = registry.load_bytes("report.docx", b"PK").unwrap_err();
        assert!(matches!(
            err,
            RagError::UnsupportedFormat { ref extension, .. } if extension == "docx"
        ));
        assert!(matches!(
            registry.load_bytes("Makefile", b"all:"),
            Err(RagError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn invalid_utf8_is_a_load_error() {
        let err = LoaderRegistry::default().load_bytes("bad.txt", &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, RagError::DocumentLoad { .. }));
    }

    #[test]
    fn byte_order_mark_is_stripped() {
        let doc = LoaderRegistry::default().load_bytes("a.txt", "\u{feff}hello".as_bytes()).unwrap();
        assert_eq!(doc.segments, vec!["hello".to_string()]);
    }

    #[test]
    fn garbage_pdf_is_a_load_error() {
        let err = LoaderRegistry::default().load_bytes("broken.pdf", b"not a pdf").unwrap_err();
        assert!(matches!(err, RagError::DocumentLoad { .. }));
    }

    #[test]
    fn load_path_checks_format_before_reading() {
        let err = LoaderRegistry::default().load_path("/does/not/exist.xlsx").unwrap_err();
        assert!(matches!(err, RagError::UnsupportedFormat { .. }));
        let err = LoaderRegistry::default().load_path("/does/not/exist.txt").unwrap_err();
        assert!(matches!(err, RagError::DocumentLoad { .. }));
    }

    #[test]
    fn load_path_uses_file_name_as_source() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("a.txt");
        std::fs::write(&path, "The sky is blue.").unwrap();
        let doc = LoaderRegistry::default().load_path(&path).unwrap();
        assert_eq!(doc.source, "a.txt");
        assert_eq!(doc.format, DocumentFormat::Text);
    }
}
