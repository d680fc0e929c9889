//! Turns a free-text AI answer into structured fields.
//!
//! The prompts ask for a JSON object, so that is tried first. Models do not
//! always comply, so the fallback walks the text line by line looking for
//! labeled sections ("Learning Objectives:", "## Topics", "**Insights**") and
//! collects the bullets underneath. Both paths are best-effort: any field may
//! come back empty.
//!
//! Everything here is pure (text in, fields out).

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Structured view of an analysis answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DerivedFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub topics: Vec<String>,
    pub insights: Vec<String>,
    pub learning_objectives: Vec<String>,
    pub entities: Vec<String>,
    /// Any other labeled section (syllabus grading, schedule, ...), keyed by its label.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sections: BTreeMap<String, Vec<String>>,
}

impl DerivedFields {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.topics.is_empty()
            && self.insights.is_empty()
            && self.learning_objectives.is_empty()
            && self.entities.is_empty()
            && self.sections.is_empty()
    }

    fn push(&mut self, target: &Target, item: String) {
        if item.is_empty() {
            return;
        }
        match target {
            Target::Field(Field::Summary) => match self.summary.as_mut() {
                Some(summary) => {
                    summary.push(' ');
                    summary.push_str(&item);
                }
                None => self.summary = Some(item),
            },
            Target::Field(Field::Topics) => self.topics.push(item),
            Target::Field(Field::Insights) => self.insights.push(item),
            Target::Field(Field::Objectives) => self.learning_objectives.push(item),
            Target::Field(Field::Entities) => self.entities.push(item),
            Target::Section(label) => self.sections.entry(label.clone()).or_default().push(item),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Summary,
    Topics,
    Insights,
    Objectives,
    Entities,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Field(Field),
    Section(String),
}

/// Header-only labels longer than this are treated as prose, not sections.
const MAX_SECTION_LABEL_WORDS: usize = 6;

/// Parses an answer, preferring an embedded JSON object.
pub fn parse_analysis(text: &str) -> DerivedFields {
    match parse_structured(text) {
        Some(fields) => fields,
        None => parse_sections(text),
    }
}

/// Reads the first `{ ... }` block of the answer (fenced or bare) as JSON.
///
/// Returns `None` when there is no object or it carries none of the fields.
pub fn parse_structured(text: &str) -> Option<DerivedFields> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    let value: Value = serde_json::from_str(&text[start..=end]).ok()?;
    let object = value.as_object()?;

    let mut fields = DerivedFields::default();
    for (key, value) in object {
        let target = match classify_label(key) {
            Some(field) => Target::Field(field),
            None => Target::Section(key.clone()),
        };
        if target == Target::Field(Field::Summary) {
            if let Some(summary) = value.as_str().map(clean_item).filter(|s| !s.is_empty()) {
                fields.summary = Some(summary);
            }
            continue;
        }
        for item in json_items(value) {
            fields.push(&target, item);
        }
    }

    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}

/// Regex-driven section matching over plain text.
pub fn parse_sections(text: &str) -> DerivedFields {
    let mut fields = DerivedFields::default();
    let mut current: Option<Target> = None;
    let mut preamble: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }

        // Models often number their labels ("1. **Key Topics**:")
        let (body, marked) = match list_marker_re().find(line) {
            Some(marker) => (&line[marker.end()..], true),
            None => (line, false),
        };

        if let Some((label, rest)) = match_header(body) {
            if let Some(field) = classify_label(&label) {
                let target = Target::Field(field);
                push_inline(&mut fields, &target, &rest);
                current = Some(target);
                continue;
            }
            // A plain list item ending in a colon stays an item of the current section.
            let emphasized = !marked || is_emphasized(body);
            if emphasized
                && rest.is_empty()
                && label.split_whitespace().count() <= MAX_SECTION_LABEL_WORDS
            {
                current = Some(Target::Section(label));
                continue;
            }
        }

        let item = bullet_re()
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .unwrap_or(line);

        match &current {
            Some(target) => fields.push(target, clean_item(item)),
            None => preamble.push(line.trim()),
        }
    }

    if fields.summary.is_none() && !preamble.is_empty() {
        fields.summary = Some(clean_item(&preamble.join(" ")));
    }

    fields
}

/// Inline content after a list label ("Topics: a, b, c") is split on commas.
fn push_inline(fields: &mut DerivedFields, target: &Target, rest: &str) {
    if rest.is_empty() {
        return;
    }
    match target {
        Target::Field(Field::Summary) | Target::Section(_) => {
            fields.push(target, clean_item(rest))
        }
        Target::Field(_) => {
            for part in rest.split(',') {
                fields.push(target, clean_item(part));
            }
        }
    }
}

fn match_header(line: &str) -> Option<(String, String)> {
    if let Some(caps) = heading_re().captures(line) {
        let label = caps.get(1)?.as_str().trim_end_matches(':');
        return Some((clean_item(label), String::new()));
    }
    if let Some(caps) = bold_label_re().captures(line) {
        return Some((clean_item(caps.get(1)?.as_str()), String::new()));
    }
    let caps = labeled_line_re().captures(line)?;
    let label = clean_item(caps.get(1)?.as_str());
    let rest = caps.get(2).map(|m| clean_item(m.as_str())).unwrap_or_default();
    Some((label, rest))
}

fn is_emphasized(text: &str) -> bool {
    let text = text.trim_start();
    text.starts_with("**") || text.starts_with("__")
}

fn classify_label(label: &str) -> Option<Field> {
    let normalized: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    if normalized.contains("objective") || normalized.contains("outcome") {
        Some(Field::Objectives)
    } else if normalized.contains("topic") {
        Some(Field::Topics)
    } else if normalized.contains("insight") {
        Some(Field::Insights)
    } else if normalized.contains("entit")
        || normalized.contains("keyterm")
        || normalized.contains("keyconcept")
    {
        Some(Field::Entities)
    } else if normalized == "summary" || normalized == "overview" || normalized == "coursesummary"
    {
        Some(Field::Summary)
    } else {
        None
    }
}

fn json_items(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .lines()
            .map(clean_item)
            .filter(|s| !s.is_empty())
            .collect(),
        Value::Array(items) => items.iter().filter_map(json_item_text).collect(),
        Value::Number(_) | Value::Bool(_) => vec![value.to_string()],
        Value::Object(_) => json_item_text(value).into_iter().collect(),
        Value::Null => Vec::new(),
    }
}

/// Lists sometimes come back as objects (`{"name": ..., "description": ...}`).
fn json_item_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(clean_item(s)).filter(|s| !s.is_empty()),
        Value::Object(map) => {
            let primary = ["name", "title", "objective", "topic", "text", "item"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))?;
            let detail = ["description", "detail", "weight", "date"]
                .iter()
                .find_map(|key| map.get(*key))
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
            Some(match detail {
                Some(detail) => format!("{}: {}", clean_item(primary), clean_item(&detail)),
                None => clean_item(primary),
            })
        }
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn clean_item(raw: &str) -> String {
    raw.replace("**", "")
        .replace("__", "")
        .trim()
        .trim_end_matches(':')
        .trim()
        .to_string()
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*#{1,6}\s+(.+?)\s*#*\s*$").expect("valid heading regex"))
}

fn bold_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*\*\*([^*]+?)\*\*\s*:?\s*$").expect("valid bold label regex")
    })
}

fn labeled_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:\*\*|__)?\s*([A-Za-z][A-Za-z0-9 &/()-]{0,48}?)\s*(?:\*\*|__)?\s*:\s*(?:\*\*|__)?\s*(.*)$")
            .expect("valid labeled line regex")
    })
}

fn list_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*•+]|\d{1,3}[.)])\s+").expect("valid list marker regex")
    })
}

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*•+]|\d{1,3}[.)])\s+(.+)$").expect("valid bullet regex")
    })
}
