use common::hash::ContentHash;
use common::media::MediaType;

use super::{Extraction, IngestError};
use crate::entity::content;
use crate::state::AppState;

/// Extract text from an uploaded document.
///
/// PDFs keep their extracted plain text only; markdown and plain text
/// files are additionally rendered to HTML for the reader view.
pub async fn extract(
    state: &AppState,
    content: &content::Model,
) -> Result<Extraction, IngestError> {
    let storage_name = content
        .file_name_in_storage
        .as_deref()
        .ok_or_else(|| IngestError::Invalid("file row has no stored object".into()))?;

    match content.media_type {
        MediaType::Pdf => {
            let bytes = state.storage.download(storage_name).await?;
            pdf_extraction(&bytes)
        }
        MediaType::Text => {
            let bytes = state.storage.download(storage_name).await?;
            Ok(text_extraction(&String::from_utf8_lossy(&bytes)))
        }
        other => Err(IngestError::Unsupported(other)),
    }
}

fn pdf_extraction(bytes: &[u8]) -> Result<Extraction, IngestError> {
    let document = lopdf::Document::load_mem(bytes)
        .map_err(|e| IngestError::Invalid(format!("unreadable pdf: {e}")))?;
    let pages: Vec<u32> = document.get_pages().keys().copied().collect();
    let text = document
        .extract_text(&pages)
        .map_err(|e| IngestError::Invalid(format!("pdf text extraction failed: {e}")))?;

    Ok(Extraction {
        text_content: non_empty(&text),
        content_hash: non_empty(&text).map(|t| ContentHash::compute(&t).to_hex()),
        ..Default::default()
    })
}

fn text_extraction(raw: &str) -> Extraction {
    let html = comrak::markdown_to_html(raw, &comrak::Options::default());
    Extraction {
        content: non_empty(&html),
        text_content: non_empty(raw),
        content_hash: non_empty(raw).map(|t| ContentHash::compute(&t).to_hex()),
        ..Default::default()
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_renders_to_html() {
        let extraction = text_extraction("# Notes\n\nfirst line");
        let html = extraction.content.unwrap();
        assert!(html.contains("<h1>Notes</h1>"));
        assert!(html.contains("<p>first line</p>"));
        assert_eq!(extraction.text_content.unwrap(), "# Notes\n\nfirst line");
        assert!(extraction.content_hash.is_some());
    }

    #[test]
    fn blank_text_stores_nothing() {
        let extraction = text_extraction("   \n  ");
        assert!(extraction.content.is_none());
        assert!(extraction.text_content.is_none());
        assert!(extraction.content_hash.is_none());
    }

    #[test]
    fn garbage_bytes_are_not_a_pdf() {
        assert!(matches!(
            pdf_extraction(b"not a pdf"),
            Err(IngestError::Invalid(_))
        ));
    }
}
