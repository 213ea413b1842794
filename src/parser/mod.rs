pub mod classify;
pub mod normalize;
pub mod segment;

pub use segment::{segment_document, SectionRecord, Segmented};

use crate::converter;

/// Two-step pipeline: chapter markup → plain-text lines → section records.
pub fn process_chapter(html: &str, code: &str, filename: &str) -> Segmented {
    let text = converter::html_to_text(html);
    segment_document(&text, code, filename)
}
