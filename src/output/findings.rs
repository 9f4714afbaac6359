use std::fmt;

use serde::{Deserialize, Serialize};

use super::sections::ParsedOutput;

/// Overall severity of an analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    fn default_conclusion(self) -> &'static str {
        match self {
            Severity::Critical => {
                "Critical vulnerabilities were identified; address them before release."
            }
            Severity::Warning => "Potential risks were identified; review them before proceeding.",
            Severity::Info => "No significant risks were identified.",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured digest of an analysis.
///
/// Empty (see [`FindingsSummary::is_empty`]) when the text carried no risks, no
/// conclusion and no next steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingsSummary {
    pub severity: Severity,
    pub conclusion: String,
    /// Cleaned risk lines, de-duplicated in first-seen order.
    pub risks: Vec<String>,
    pub next_steps: Vec<String>,
}

impl FindingsSummary {
    pub fn is_empty(&self) -> bool {
        self.conclusion.is_empty() && self.risks.is_empty() && self.next_steps.is_empty()
    }
}

pub(super) fn summarize(parsed: &ParsedOutput) -> FindingsSummary {
    let mut risks: Vec<String> = Vec::new();
    for line in parsed.risks() {
        if line.trim_start().starts_with('#') {
            continue;
        }
        let cleaned = clean_item(line);
        if !cleaned.is_empty() && !risks.contains(&cleaned) {
            risks.push(cleaned);
        }
    }

    let next_steps: Vec<String> = parsed
        .section("next steps")
        .map(|body| {
            body.lines()
                .map(clean_item)
                .filter(|step| !step.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let severity = if parsed.has_critical_vulnerability() {
        Severity::Critical
    } else if !risks.is_empty() {
        Severity::Warning
    } else {
        Severity::Info
    };

    let stated = parsed
        .section("conclusion")
        .map(str::trim)
        .filter(|text| !text.is_empty());
    if stated.is_none() && risks.is_empty() && next_steps.is_empty() && severity == Severity::Info {
        return FindingsSummary::default();
    }

    FindingsSummary {
        severity,
        conclusion: stated
            .unwrap_or_else(|| severity.default_conclusion())
            .to_string(),
        risks,
        next_steps,
    }
}

/// Strips list markers and emphasis from a line.
fn clean_item(line: &str) -> String {
    let mut item = line.trim();
    if let Some(rest) = item
        .strip_prefix("- ")
        .or_else(|| item.strip_prefix("* "))
        .or_else(|| item.strip_prefix("+ "))
        .or_else(|| item.strip_prefix("• "))
    {
        item = rest;
    } else {
        let digits = item.chars().take_while(char::is_ascii_digit).count();
        if digits > 0 {
            if let Some(rest) = item[digits..]
                .strip_prefix(". ")
                .or_else(|| item[digits..].strip_prefix(") "))
            {
                item = rest;
            }
        }
    }
    item.replace("**", "").trim().to_string()
}
