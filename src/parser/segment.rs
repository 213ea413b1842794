use serde::{Deserialize, Serialize};
use tracing::debug;

use super::classify::{classify, Marker, SectionPrefix};
use super::normalize::clean;

const PARAGRAPH_SEP: &str = "\n\n";

/// One completed section, stamped with the hierarchy in force when it closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRecord {
    pub code: String,
    pub code_name: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub chapter: Option<String>,
    pub subchapter: Option<String>,
    pub section_prefix: SectionPrefix,
    pub section_number: String,
    pub section_name: String,
    pub text: String,
    pub source_text: String,
    pub filename: String,
}

/// Running state for one document.
///
/// Hierarchy fields persist until their own marker overwrites them; entering a
/// new chapter does not clear `subchapter`.
#[derive(Debug, Clone, Default)]
struct Context {
    code: String,
    code_name: Option<String>,
    title: Option<String>,
    subtitle: Option<String>,
    chapter: Option<String>,
    subchapter: Option<String>,
    section_prefix: Option<SectionPrefix>,
    section_number: Option<String>,
    section_name: Option<String>,
    text: String,
    source_text: String,
    filename: String,
}

impl Context {
    fn new(code: &str, filename: &str) -> Self {
        Context {
            code: code.to_string(),
            filename: filename.to_string(),
            ..Default::default()
        }
    }

    /// Detached copy of the open section, or `None` if no section has started.
    fn snapshot(&self) -> Option<SectionRecord> {
        let section_number = self.section_number.clone()?;
        Some(SectionRecord {
            code: self.code.clone(),
            code_name: self.code_name.clone(),
            title: self.title.clone(),
            subtitle: self.subtitle.clone(),
            chapter: self.chapter.clone(),
            subchapter: self.subchapter.clone(),
            section_prefix: self.section_prefix.unwrap_or(SectionPrefix::Sec),
            section_number,
            section_name: self.section_name.clone().unwrap_or_default(),
            text: self.text.clone(),
            source_text: self.source_text.clone(),
            filename: self.filename.clone(),
        })
    }

    fn apply(&mut self, marker: Marker, raw: &str) {
        match marker {
            Marker::CodeName(name) => self.code_name = Some(name),
            Marker::Title(name) => self.title = Some(name),
            Marker::Subtitle(name) => self.subtitle = Some(name),
            Marker::Chapter(name) => self.chapter = Some(name),
            Marker::Subchapter(name) => self.subchapter = Some(name),
            Marker::LegislativeHistory => {}
            Marker::Section {
                prefix,
                number,
                name,
                body,
            } => {
                self.section_prefix = Some(prefix);
                self.section_number = Some(number);
                self.section_name = Some(name);
                match body {
                    Some(body) => {
                        self.text = body;
                        self.source_text = raw.to_string();
                    }
                    None => {
                        self.text.clear();
                        self.source_text.clear();
                    }
                }
            }
        }
    }

    fn append(&mut self, line: &str, raw: &str) {
        push_paragraph(&mut self.text, line);
        push_paragraph(&mut self.source_text, raw);
    }
}

fn push_paragraph(buf: &mut String, line: &str) {
    if !buf.is_empty() {
        buf.push_str(PARAGRAPH_SEP);
    }
    buf.push_str(line);
}

/// How a single input line was consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Marker,
    History,
    Continuation,
    Dropped,
}

/// Per-document line accounting. Every non-blank line lands in exactly one
/// of `markers`, `history`, `continuations` or `dropped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineTally {
    pub blank: usize,
    pub markers: usize,
    pub history: usize,
    pub continuations: usize,
    pub dropped: usize,
}

impl LineTally {
    fn count(&mut self, kind: LineKind) {
        match kind {
            LineKind::Blank => self.blank += 1,
            LineKind::Marker => self.markers += 1,
            LineKind::History => self.history += 1,
            LineKind::Continuation => self.continuations += 1,
            LineKind::Dropped => self.dropped += 1,
        }
    }

    pub fn non_blank(&self) -> usize {
        self.markers + self.history + self.continuations + self.dropped
    }
}

/// Output of segmenting one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmented {
    pub records: Vec<SectionRecord>,
    pub tally: LineTally,
}

/// Single-pass line segmenter. Owns all state for one document; feed it lines
/// with [`Segmenter::push`] and collect records with [`Segmenter::finish`].
pub struct Segmenter {
    context: Context,
    records: Vec<SectionRecord>,
    tally: LineTally,
}

impl Segmenter {
    pub fn new(code: &str, filename: &str) -> Self {
        Segmenter {
            context: Context::new(code, filename),
            records: Vec::new(),
            tally: LineTally::default(),
        }
    }

    pub fn push(&mut self, raw: &str) -> LineKind {
        let kind = self.consume(raw);
        self.tally.count(kind);
        kind
    }

    fn consume(&mut self, raw: &str) -> LineKind {
        let line = clean(raw);
        if line.is_empty() {
            return LineKind::Blank;
        }

        match classify(&line) {
            Some(Marker::LegislativeHistory) => LineKind::History,
            Some(marker) => {
                if let Marker::Section { number, .. } = &marker {
                    if self.context.section_number.as_ref() != Some(number) {
                        self.flush();
                    }
                }
                self.context.apply(marker, raw);
                LineKind::Marker
            }
            None if self.context.section_number.is_some() => {
                self.context.append(&line, raw);
                LineKind::Continuation
            }
            None => LineKind::Dropped,
        }
    }

    fn flush(&mut self) {
        if let Some(record) = self.context.snapshot() {
            debug!(
                section = %record.section_number,
                chars = record.text.len(),
                "section complete"
            );
            self.records.push(record);
        }
    }

    /// End of stream: the open section, if any, is always emitted.
    pub fn finish(mut self) -> Segmented {
        self.flush();
        Segmented {
            records: self.records,
            tally: self.tally,
        }
    }
}

/// Segment a sequence of raw lines belonging to one document.
pub fn segment_lines<'a, I>(lines: I, code: &str, filename: &str) -> Segmented
where
    I: IntoIterator<Item = &'a str>,
{
    let mut segmenter = Segmenter::new(code, filename);
    for line in lines {
        segmenter.push(line);
    }
    segmenter.finish()
}

/// Segment a whole plain-text document.
pub fn segment_document(text: &str, code: &str, filename: &str) -> Segmented {
    segment_lines(text.lines(), code, filename)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn records(lines: &[&str]) -> Vec<SectionRecord> {
        segment_lines(lines.iter().copied(), "FA", "FA-Chapter-00001.json").records
    }

    #[test]
    fn scenario_headings_and_one_section() {
        let out = records(&[
            "TEXAS FAMILY CODE",
            "TITLE 1. THE MARRIAGE RELATIONSHIP",
            "CHAPTER 1. GENERAL PROVISIONS",
            "Sec. 1.001. SHORT TITLE. This is body.",
        ]);
        assert_eq!(out.len(), 1);
        let r = &out[0];
        assert_eq!(r.code, "FA");
        assert_eq!(r.code_name.as_deref(), Some("TEXAS FAMILY "));
        assert_eq!(r.title.as_deref(), Some("1. THE MARRIAGE RELATIONSHIP"));
        assert_eq!(r.subtitle, None);
        assert_eq!(r.chapter.as_deref(), Some("1. GENERAL PROVISIONS"));
        assert_eq!(r.subchapter, None);
        assert_eq!(r.section_prefix, SectionPrefix::Sec);
        assert_eq!(r.section_number, "1.001");
        assert_eq!(r.section_name, "SHORT TITLE");
        assert_eq!(r.text, "This is body.");
        assert_eq!(r.filename, "FA-Chapter-00001.json");
    }

    #[test]
    fn bare_section_then_continuation() {
        let out = records(&["Sec. 2.001. FUTURE LAW.", "This text arrives later."]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "This text arrives later.");
        assert_eq!(out[0].source_text, "This text arrives later.");
    }

    #[test]
    fn legislative_history_dropped() {
        let out = records(&["Sec. 3.001. X. Body.", "Added by Acts 1999, 76th Leg."]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "Body.");
        assert!(!out[0].source_text.contains("Acts 1999"));
    }

    #[test]
    fn two_sections_flush_on_change_and_eof() {
        let out = records(&["Sec. 1.001. A. Alpha.", "Sec. 1.002. B. Beta."]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].section_number, "1.001");
        assert_eq!(out[0].text, "Alpha.");
        assert_eq!(out[1].section_number, "1.002");
        assert_eq!(out[1].text, "Beta.");
    }

    #[test]
    fn continuation_joins_with_blank_line() {
        let out = records(&[
            "Sec. 1.001. DEFINITIONS. In this code:",
            "(1) \"Court\" means a court.",
            "",
            "   (2) \"Party\" means a party.   ",
        ]);
        assert_eq!(
            out[0].text,
            "In this code:\n\n(1) \"Court\" means a court.\n\n(2) \"Party\" means a party."
        );
        assert_eq!(
            out[0].source_text,
            "Sec. 1.001. DEFINITIONS. In this code:\n\n(1) \"Court\" means a court.\n\n   (2) \"Party\" means a party.   "
        );
    }

    #[test]
    fn stub_section_is_emitted_without_text() {
        let out = records(&["Sec. 4.001. RESERVED.", "Sec. 4.002. NEXT. Body."]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].section_number, "4.001");
        assert_eq!(out[0].text, "");
        assert_eq!(out[0].source_text, "");
    }

    #[test]
    fn trailing_stub_is_flushed() {
        let out = records(&["Sec. 4.001. A. Body.", "Sec. 4.002. LATER."]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].section_number, "4.002");
        assert_eq!(out[1].text, "");
    }

    #[test]
    fn front_matter_is_dropped() {
        let seg = segment_lines(
            ["Texas Legislature Online", "FAMILY CODE", "Sec. 1.001. A. Body."],
            "FA",
            "f",
        );
        assert_eq!(seg.records.len(), 1);
        assert_eq!(seg.tally.dropped, 1);
        assert_eq!(seg.tally.markers, 2);
    }

    #[test]
    fn empty_and_heading_only_documents() {
        assert!(records(&[]).is_empty());
        assert!(records(&["", "   ", "\t"]).is_empty());
        assert!(records(&["FAMILY CODE", "TITLE 1. MARRIAGE", "random words"]).is_empty());
    }

    #[test]
    fn child_levels_survive_parent_marker() {
        let out = records(&[
            "CHAPTER 2. ONE",
            "SUBCHAPTER A. FIRST",
            "Sec. 2.001. A. Body.",
            "CHAPTER 3. TWO",
            "Sec. 3.001. B. Body.",
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].chapter.as_deref(), Some("3. TWO"));
        assert_eq!(out[1].subchapter.as_deref(), Some("A. FIRST"));
    }

    #[test]
    fn record_keeps_hierarchy_at_close_time() {
        // A heading between sections lands on the section still open.
        let out = records(&[
            "SUBCHAPTER A. FIRST",
            "Sec. 2.001. A. Body.",
            "SUBCHAPTER B. SECOND",
            "Sec. 2.051. B. Body.",
        ]);
        assert_eq!(out[0].subchapter.as_deref(), Some("B. SECOND"));
        assert_eq!(out[1].subchapter.as_deref(), Some("B. SECOND"));
    }

    #[test]
    fn headings_do_not_reset_text() {
        let out = records(&["Sec. 5.001. A. First.", "TITLE 2. CHILD", "Second."]);
        assert_eq!(out[0].text, "First.\n\nSecond.");
    }

    #[test]
    fn repeated_number_restarts_section() {
        let out = records(&[
            "Sec. 6.001. A. Old version.",
            "Sec. 6.001. A. New version.",
            "Sec. 6.002. B. Next.",
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text, "New version.");
    }

    #[test]
    fn non_adjacent_repeat_passes_through() {
        let out = records(&[
            "Sec. 7.001. A. One.",
            "Sec. 7.002. B. Two.",
            "Sec. 7.001. A. Again.",
        ]);
        let numbers: Vec<_> = out.iter().map(|r| r.section_number.as_str()).collect();
        assert_eq!(numbers, ["7.001", "7.002", "7.001"]);
    }

    #[test]
    fn article_sections() {
        let out = records(&[
            "CODE OF CRIMINAL PROCEDURE",
            "Art. 1.01. SHORT TITLE. This Act shall be known.",
            "Art. 1.02. EFFECTIVE DATE.",
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].code_name.as_deref(), Some("CRIMINAL PROCEDURE"));
        assert_eq!(out[0].section_prefix, SectionPrefix::Art);
        assert_eq!(out[1].section_name, "EFFECTIVE DATE");
    }

    #[test]
    fn tally_conserves_lines() {
        let lines = [
            "header noise",
            "",
            "CHAPTER 1. GENERAL",
            "Sec. 1.001. A. Body.",
            "more body",
            "Acts 1997, 75th Leg.",
            "   ",
            "Sec. 1.002. B.",
        ];
        let mut segmenter = Segmenter::new("FA", "f");
        let kinds: Vec<_> = lines.iter().map(|l| segmenter.push(l)).collect();
        assert_eq!(
            kinds,
            [
                LineKind::Dropped,
                LineKind::Blank,
                LineKind::Marker,
                LineKind::Marker,
                LineKind::Continuation,
                LineKind::History,
                LineKind::Blank,
                LineKind::Marker,
            ]
        );
        let seg = segmenter.finish();
        let non_blank = lines.iter().filter(|l| !l.trim().is_empty()).count();
        assert_eq!(seg.tally.non_blank(), non_blank);
        assert_eq!(seg.tally.blank, 2);
    }

    #[test]
    fn history_before_any_section_counts_as_history() {
        let mut segmenter = Segmenter::new("FA", "f");
        assert_eq!(segmenter.push("Amended by:"), LineKind::History);
        assert_eq!(
            segmenter.push("Acts 2019, 86th Leg., R.S., Ch. 1."),
            LineKind::History
        );
        assert_eq!(segmenter.push("front matter"), LineKind::Dropped);
        assert_eq!(segmenter.push("Sec. 1.001. A. Body."), LineKind::Marker);
        let seg = segmenter.finish();
        assert_eq!(seg.tally.history, 2);
        assert_eq!(seg.tally.dropped, 1);
        assert_eq!(seg.records.len(), 1);
        assert_eq!(seg.records[0].text, "Body.");
    }

    #[test]
    fn last_record_matches_final_context() {
        let text = "Sec. 1.001. A. One.\nSec. 1.002. B. Two.\ntail line";
        let mut segmenter = Segmenter::new("FA", "f");
        for line in text.lines() {
            segmenter.push(line);
        }
        let expected = segmenter.context.snapshot().unwrap();
        let seg = segmenter.finish();
        assert_eq!(seg.records.last(), Some(&expected));
        assert_eq!(expected.text, "Two.\n\ntail line");
    }

    #[test]
    fn idempotent() {
        let text = std::fs::read_to_string("tests/fixtures/family_chapter_2.txt").unwrap();
        let a = serde_json::to_string(&segment_document(&text, "FA", "f").records).unwrap();
        let b = serde_json::to_string(&segment_document(&text, "FA", "f").records).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fixture_chapter() {
        let text = std::fs::read_to_string("tests/fixtures/family_chapter_2.txt").unwrap();
        let seg = segment_document(&text, "FA", "FA-Chapter-00002.json");
        let numbers: Vec<_> = seg
            .records
            .iter()
            .map(|r| r.section_number.as_str())
            .collect();
        assert_eq!(numbers, ["2.001", "2.002", "2.003", "2.004", "2.005"]);

        for r in &seg.records {
            assert_eq!(r.code_name.as_deref(), Some("FAMILY "));
            assert_eq!(r.title.as_deref(), Some("1. THE MARRIAGE RELATIONSHIP"));
            assert_eq!(r.subtitle.as_deref(), Some("A. MARRIAGE"));
            assert_eq!(r.chapter.as_deref(), Some("2. THE MARRIAGE RELATIONSHIP"));
            for needle in ["Acts 19", "Acts 20", "Added by", "Amended by"] {
                assert!(!r.text.contains(needle), "{} leaks {needle:?}", r.section_number);
                assert!(!r.source_text.contains(needle));
            }
        }

        let first = &seg.records[0];
        assert_eq!(first.subchapter.as_deref(), Some("A. APPLICATION FOR MARRIAGE LICENSE"));
        assert_eq!(first.section_name, "GENERAL DUTY TO ISSUE LICENSE");
        assert!(first.text.starts_with("(a) Except as provided"));
        assert!(first.text.contains("\n\n(b) A license may not"));

        let stub = &seg.records[3];
        assert_eq!(stub.section_number, "2.004");
        assert_eq!(stub.section_name, "APPLICATION FORM");
        assert!(stub.text.starts_with("Text of section effective until a future date\n\n(a)"));
        assert!(stub.source_text.starts_with("Text of section effective"));

        let last = &seg.records[4];
        assert_eq!(last.subchapter.as_deref(), Some("B. UNDERAGE APPLICANTS"));
        assert_eq!(last.text, "");
        assert!(seg.tally.dropped >= 2);
    }
}
