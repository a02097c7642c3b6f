//! Task parser for deriving an ordered task list from SOW text
//!
//! Recognises three kinds of task markers, in priority order:
//! - `## Task 1: Title`, `### Deliverable 2 - Title` (also Step, Phase, Milestone)
//! - numbered items: `1. Title`, `1) Title`, `(1) Title`
//! - bullet items: `- Title`, `* Title`, `• Title`
//!
//! The highest-priority kind present in the document becomes the task marker.
//! Lower-priority items and plain lines that follow a task are kept as that
//! task's description, so a deliverable heading with numbered sub-steps
//! becomes one task rather than many.

use regex::Regex;
use serde::{Deserialize, Serialize};
use sowcrew_core::Task;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

use crate::error::ParseError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Drop tasks whose title repeats an earlier one.
    pub dedupe: bool,
    /// Task lines with shorter titles are treated as plain text.
    pub min_title_chars: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            dedupe: true,
            min_title_chars: 3,
        }
    }
}

/// Tasks derived from a document plus the text before the first task.
#[derive(Debug, Clone, Default)]
pub struct ParsedSow {
    pub preamble: String,
    pub tasks: Vec<Task>,
}

impl ParsedSow {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MarkerKind {
    Heading,
    Numbered,
    Bullet,
}

struct ParserPatterns {
    heading: Regex,
    numbered: Regex,
    bullet: Regex,
    checkbox: Regex,
    leading_hint: Regex,
    trailing_hint: Regex,
}

fn patterns() -> &'static ParserPatterns {
    static PATTERNS: OnceLock<ParserPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| ParserPatterns {
        heading: Regex::new(
            r"(?i)^#{1,6}\s*(?:task|step|phase|deliverable|milestone)\s+\d+\s*(?:[:\-–.]\s*|\s)(.+)$",
        )
        .expect("Invalid heading regex pattern"),
        numbered: Regex::new(r"^(?:\d{1,3}[.)]|\(\d{1,3}\))\s+(.+)$")
            .expect("Invalid numbered regex pattern"),
        bullet: Regex::new(r"^[-*•]\s+(.+)$").expect("Invalid bullet regex pattern"),
        checkbox: Regex::new(r"^\[[ xX]\]\s+(.+)$").expect("Invalid checkbox regex pattern"),
        leading_hint: Regex::new(r"^\[([^\]]+)\]\s*(.+)$").expect("Invalid hint regex pattern"),
        trailing_hint: Regex::new(r"(?i)^(.+?)\s*\(\s*role\s*:\s*([^)]+)\)\s*$")
            .expect("Invalid hint regex pattern"),
    })
}

fn classify(line: &str) -> Option<(MarkerKind, &str)> {
    let p = patterns();
    let line = line.trim();
    if let Some(caps) = p.heading.captures(line) {
        return caps.get(1).map(|m| (MarkerKind::Heading, m.as_str()));
    }
    if let Some(caps) = p.numbered.captures(line) {
        return caps.get(1).map(|m| (MarkerKind::Numbered, m.as_str()));
    }
    if let Some(caps) = p.bullet.captures(line) {
        return caps.get(1).map(|m| (MarkerKind::Bullet, m.as_str()));
    }
    None
}

/// Split a raw item text into a clean title and an optional role hint.
fn split_role_hint(text: &str) -> (String, Option<String>) {
    let p = patterns();
    let mut text = text.trim();

    // Markdown task-list boxes are not role hints.
    if let Some(rest) = p.checkbox.captures(text).and_then(|c| c.get(1)) {
        text = rest.as_str();
    }

    if let Some(caps) = p.leading_hint.captures(text) {
        return (clean_title(&caps[2]), Some(caps[1].trim().to_string()));
    }
    if let Some(caps) = p.trailing_hint.captures(text) {
        return (clean_title(&caps[1]), Some(caps[2].trim().to_string()));
    }
    (clean_title(text), None)
}

fn clean_title(title: &str) -> String {
    let mut title = title.trim();
    for wrapper in ["**", "__"] {
        if let Some(inner) = title
            .strip_prefix(wrapper)
            .and_then(|t| t.strip_suffix(wrapper))
        {
            title = inner.trim();
        }
    }
    title.trim_end_matches(':').trim().to_string()
}

fn dedupe_key(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

struct Draft {
    title: String,
    role_hint: Option<String>,
    description: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskParser {
    config: ParserConfig,
}

impl TaskParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse document text into tasks in document order.
    ///
    /// Blank input yields no tasks. Non-blank input without any task marker
    /// is a [`ParseError`].
    pub fn parse(&self, raw_text: &str) -> Result<ParsedSow, ParseError> {
        if raw_text.trim().is_empty() {
            return Ok(ParsedSow::default());
        }

        let lines: Vec<&str> = raw_text.lines().map(str::trim_end).collect();
        let non_blank = lines.iter().filter(|l| !l.trim().is_empty()).count();

        let task_kind = lines
            .iter()
            .filter_map(|line| classify(line))
            .filter(|(_, text)| self.title_ok(&split_role_hint(text).0))
            .map(|(kind, _)| kind)
            .min()
            .ok_or_else(|| ParseError {
                reason: "no task headings, numbered items or bullet items found".to_string(),
                lines_scanned: non_blank,
            })?;

        let mut preamble = Vec::new();
        let mut drafts: Vec<Draft> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut current: Option<usize> = None;

        for line in lines {
            if let Some((kind, text)) = classify(line) {
                let (title, role_hint) = split_role_hint(text);
                if kind == task_kind && self.title_ok(&title) {
                    let key = dedupe_key(&title);
                    if self.config.dedupe {
                        if let Some(&existing) = seen.get(&key) {
                            debug!(title = %title, "Dropping duplicate task");
                            current = Some(existing);
                            continue;
                        }
                    }

                    seen.insert(key, drafts.len());
                    current = Some(drafts.len());
                    drafts.push(Draft {
                        title,
                        role_hint,
                        description: Vec::new(),
                    });
                    continue;
                }
            }

            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            match current {
                Some(idx) => drafts[idx].description.push(text.to_string()),
                None => preamble.push(text.to_string()),
            }
        }

        let tasks: Vec<Task> = drafts
            .into_iter()
            .enumerate()
            .map(|(idx, draft)| {
                let mut task =
                    Task::new(idx as u32, draft.title).with_description(draft.description.join("\n"));
                task.role_hint = draft.role_hint;
                task
            })
            .collect();

        debug!(
            task_count = tasks.len(),
            marker = ?task_kind,
            preamble_lines = preamble.len(),
            "Parsed SOW text"
        );

        Ok(ParsedSow {
            preamble: preamble.join("\n"),
            tasks,
        })
    }

    fn title_ok(&self, title: &str) -> bool {
        title.chars().count() >= self.config.min_title_chars
    }
}

/// Parse with the default configuration.
pub fn parse_tasks(raw_text: &str) -> Result<Vec<Task>, ParseError> {
    TaskParser::default().parse(raw_text).map(|parsed| parsed.tasks)
}
