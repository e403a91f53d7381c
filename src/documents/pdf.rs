/// Page-by-page PDF text extraction
use crate::error::{ParlorError, ParlorResult};
use lopdf::Document;
use serde::{Deserialize, Serialize};

/// Text of one page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub page: u32,
    pub content: String,
    pub preview: String,
}

/// Text of a whole document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub filename: String,
    pub page_count: usize,
    pub pages: Vec<ExtractedPage>,
}

impl ExtractedDocument {
    pub fn total_chars(&self) -> usize {
        self.pages.iter().map(|p| p.content.chars().count()).sum()
    }
}

/// Extract trimmed text for every page of a PDF held in memory
pub fn extract_pdf(
    filename: &str,
    bytes: &[u8],
    preview_chars: usize,
) -> ParlorResult<ExtractedDocument> {
    let document = Document::load_mem(bytes).map_err(|e| {
        tracing::error!(filename, error = %e, "failed to open PDF");
        ParlorError::Document("Invalid or corrupt PDF file".to_string())
    })?;

    let mut pages = Vec::new();
    for page_number in document.get_pages().keys().copied() {
        let content = match document.extract_text(&[page_number]) {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(filename, page = page_number, error = %e, "page has no readable text");
                String::new()
            }
        };
        let preview = content.chars().take(preview_chars).collect();
        pages.push(ExtractedPage {
            page: page_number,
            content,
            preview,
        });
    }

    let extracted = ExtractedDocument {
        filename: filename.to_string(),
        page_count: pages.len(),
        pages,
    };

    let total_chars = extracted.total_chars();
    tracing::info!(
        filename,
        pages = extracted.page_count,
        total_chars,
        "extracted PDF text"
    );

    if total_chars == 0 {
        return Err(ParlorError::Document(
            "No extractable text found in PDF".to_string(),
        ));
    }

    Ok(extracted)
}
