use anyhow::{Context, Result};
use log::{debug, info, warn};
use mime_guess::from_path;
use pdf_extract::extract_text;
use std::fs;
use std::path::Path;

/// A source file with its extracted text
#[derive(Debug, Clone)]
pub struct Document {
    /// The actual text content of the document
    pub content: String,
    /// The document's file name (used as its title)
    pub title: String,
    /// Lower-cased extension including the dot, e.g. `.pdf`
    pub extension: String,
    /// The document's MIME type
    pub mime_type: String,
}

impl Document {
    /// Create a new document from a file path
    pub fn from_file<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let path = file_path.as_ref();
        let title = path
            .file_name()
            .context("Invalid file name")?
            .to_str()
            .context("Invalid file name encoding")?
            .to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();

        // Detect MIME type
        let mime = from_path(path).first_or_octet_stream();
        let mime_type = mime.to_string();
        debug!("Detected MIME type: {}", mime_type);

        let content = read_document_content(path, &mime_type)?;

        Ok(Document {
            content,
            title,
            extension,
            mime_type,
        })
    }
}

/// Read content from a document based on its MIME type
pub fn read_document_content<P: AsRef<Path>>(file_path: P, mime_type: &str) -> Result<String> {
    let path = file_path.as_ref();

    match mime_type {
        mime if mime.starts_with("application/pdf") => {
            info!("Processing PDF document: {}", path.display());
            let content = extract_text(path)
                .with_context(|| format!("Failed to extract text from PDF: {}", path.display()))?;

            // PDF extraction can sometimes include excessive whitespace
            let cleaned_content = normalize_whitespace(&content);

            if cleaned_content.is_empty() {
                warn!("Extracted PDF content is empty or contains only whitespace");
            }

            Ok(cleaned_content)
        }

        // Plain text and markdown
        mime if mime.starts_with("text/") => {
            info!("Processing text document: {}", path.display());
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read text file: {}", path.display()))?;
            Ok(content.replace("\r\n", "\n"))
        }

        _ => Err(anyhow::anyhow!(
            "Unsupported document format: {}. Only text, markdown and PDF files are supported.",
            mime_type
        )),
    }
}

/// Normalize whitespace in text (collapse repeated spaces, keep paragraph breaks)
fn normalize_whitespace(text: &str) -> String {
    let result = text.replace('\r', "");

    let mut prev_char = ' ';
    let mut newline_count = 0;
    let mut normalized = String::with_capacity(result.len());

    for c in result.chars() {
        if c == '\n' {
            newline_count += 1;
        } else {
            if newline_count > 0 {
                // At most one blank line survives, so paragraphs stay splittable
                if newline_count >= 2 {
                    normalized.push_str("\n\n");
                } else {
                    normalized.push('\n');
                }
                newline_count = 0;
            }

            if !(c == ' ' && prev_char == ' ') {
                normalized.push(c);
            }

            prev_char = c;
        }
    }

    normalized.trim().to_string()
}
