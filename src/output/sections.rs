use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::AnalysisResult;

use super::findings::{FindingsSummary, summarize};
use super::{PARSE_ERROR_SENTINEL, assemble, try_assemble};

/// Lower-cased section title to raw section body.
pub type SectionMap = HashMap<String, String>;

/// `##` or deeper, optionally wrapped in `**`.
static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*#{2,}\s+(?:\*\*)?(.*?)(?:\*\*)?\s*$").expect("valid header regex")
});

static RISK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(risk|vulnerab|exploit|insecure|unsafe|danger|threat|injection|overflow|leak|exposure|attack|malicious|warning|critical)",
    )
    .expect("valid risk regex")
});

static CRITICAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:critical|high[- ]?risk|severe)\b[^\n]*?\b(?:vulnerab|risk|exploit|issue)|\bremote code execution\b",
    )
    .expect("valid critical regex")
});

/// Negation within the same clause as a critical phrase.
static NEGATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:no|not|without|none|zero)\b").expect("valid negation regex")
});

/// Assembled model output with its sections indexed.
///
/// # Examples
///
/// ```
/// use llm_bridge::ParsedOutput;
///
/// let parsed = ParsedOutput::from_text("## Summary\nAll good.\n## **Next Steps**\n- merge\n");
/// assert_eq!(parsed.section("SUMMARY"), Some("All good."));
/// assert!(parsed.has_section("next steps"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    text: String,
    sections: SectionMap,
}

impl ParsedOutput {
    /// Assembles NDJSON fragments first; unparseable input yields the sentinel text.
    pub fn from_raw(raw: &str) -> Self {
        Self::from_text(assemble(raw))
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let sections = extract_sections(&text);
        Self { text, sections }
    }

    /// Content of a successful result, assembled when it is NDJSON; the sentinel for
    /// failures.
    pub fn from_result(result: &AnalysisResult) -> Self {
        if !result.success {
            return Self::from_text(PARSE_ERROR_SENTINEL);
        }
        match try_assemble(&result.content) {
            Some(text) => Self::from_text(text),
            None => Self::from_text(result.content.clone()),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the text is the parse-failure sentinel.
    pub fn is_parse_error(&self) -> bool {
        self.text == PARSE_ERROR_SENTINEL
    }

    /// Case-insensitive, trimmed lookup.
    pub fn section(&self, title: &str) -> Option<&str> {
        self.sections
            .get(&title.trim().to_lowercase())
            .map(String::as_str)
    }

    pub fn sections(&self) -> &SectionMap {
        &self.sections
    }

    pub fn has_section(&self, title: &str) -> bool {
        self.section(title).is_some()
    }

    /// Lines mentioning risk vocabulary, verbatim and in order, duplicates kept.
    pub fn risks(&self) -> Vec<&str> {
        self.text
            .lines()
            .filter(|line| RISK_RE.is_match(line))
            .collect()
    }

    /// True when a critical phrase appears in a clause that does not negate it, so
    /// "no critical issues found" does not count.
    pub fn has_critical_vulnerability(&self) -> bool {
        CRITICAL_RE.find_iter(&self.text).any(|found| {
            let before = &self.text[..found.start()];
            let clause_start = before
                .rfind(['.', ',', ';', '!', '?', '\n'])
                .map_or(0, |index| index + 1);
            !NEGATION_RE.is_match(&before[clause_start..])
        })
    }

    pub fn findings(&self) -> FindingsSummary {
        summarize(self)
    }
}

fn extract_sections(text: &str) -> SectionMap {
    let mut sections = SectionMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;
    for line in text.lines() {
        if let Some(captures) = HEADER_RE.captures(line) {
            flush(&mut sections, current.take());
            let title = captures
                .get(1)
                .map(|title| title.as_str().trim().to_lowercase())
                .unwrap_or_default();
            current = Some((title, Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    flush(&mut sections, current);
    sections
}

fn flush(sections: &mut SectionMap, section: Option<(String, Vec<&str>)>) {
    if let Some((title, body)) = section {
        if !title.is_empty() {
            sections.insert(title, body.join("\n").trim().to_string());
        }
    }
}
