use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Citation style of a section heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionPrefix {
    #[serde(rename = "Sec.")]
    Sec,
    #[serde(rename = "Art.")]
    Art,
}

impl SectionPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sec => "Sec.",
            Self::Art => "Art.",
        }
    }

    fn parse(s: &str) -> Self {
        if s == "Art." {
            Self::Art
        } else {
            Self::Sec
        }
    }
}

impl fmt::Display for SectionPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural event recognized on a single normalized line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    CodeName(String),
    Title(String),
    Subtitle(String),
    Chapter(String),
    Subchapter(String),
    LegislativeHistory,
    Section {
        prefix: SectionPrefix,
        number: String,
        name: String,
        /// `None` for a bare heading with no body on the same line.
        body: Option<String>,
    },
}

struct Matcher {
    name: &'static str,
    re: Regex,
    build: fn(&Captures) -> Marker,
}

fn matcher(name: &'static str, pattern: &str, build: fn(&Captures) -> Marker) -> Matcher {
    Matcher {
        name,
        re: Regex::new(pattern).unwrap(),
        build,
    }
}

// First match wins, so order is priority.
static MATCHERS: LazyLock<Vec<Matcher>> = LazyLock::new(|| {
    vec![
        matcher("code_name", r"^([A-Z\-\s]+)CODE$", |c| {
            Marker::CodeName(c[1].to_string())
        }),
        matcher("code_of_name", r"^CODE OF ([A-Z\-\s]+)$", |c| {
            Marker::CodeName(c[1].to_string())
        }),
        matcher("title", r"^TITLE ([A-Za-z0-9\-\.\s]+)", |c| {
            Marker::Title(c[1].to_string())
        }),
        matcher("subtitle", r"^SUBTITLE ([A-Za-z0-9\-\.\s]+)", |c| {
            Marker::Subtitle(c[1].to_string())
        }),
        matcher("chapter", r"^CHAPTER ([A-Za-z0-9\-\.\s]+)", |c| {
            Marker::Chapter(c[1].to_string())
        }),
        matcher("subchapter", r"^SUBCHAPTER ([A-Za-z0-9\-\.\s]+)", |c| {
            Marker::Subchapter(c[1].to_string())
        }),
        matcher(
            "legislative_history",
            r"(?i)^(?:ADDED BY ACTS|AMENDED BY:|ACTS \d{4})",
            |_| Marker::LegislativeHistory,
        ),
        matcher(
            "section",
            r"^(Sec\.|Art\.) (\d+\.[0-9A-Za-z]+)\. ([0-9A-Z,;:\-\s]+?)\. (.*)$",
            |c| Marker::Section {
                prefix: SectionPrefix::parse(&c[1]),
                number: c[2].trim().to_string(),
                name: c[3].trim().to_string(),
                body: Some(c[4].trim().to_string()),
            },
        ),
        matcher(
            "bare_section",
            r"^(Sec\.|Art\.) (\d+\.[0-9A-Za-z]+)\. ([0-9A-Z,;:\-\s]+?)\.$",
            |c| Marker::Section {
                prefix: SectionPrefix::parse(&c[1]),
                number: c[2].trim().to_string(),
                name: c[3].trim().to_string(),
                body: None,
            },
        ),
    ]
});

/// Map one normalized line to the first structural marker it matches.
/// `None` means the line is body text (or noise, if no section is open).
pub fn classify(line: &str) -> Option<Marker> {
    MATCHERS
        .iter()
        .find_map(|m| m.re.captures(line).map(|caps| (m.build)(&caps)))
}

#[cfg(test)]
fn matcher_name(line: &str) -> Option<&'static str> {
    MATCHERS.iter().find(|m| m.re.is_match(line)).map(|m| m.name)
}

// ── Tests ──
