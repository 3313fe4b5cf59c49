//! Drag identifier codec.
//!
//! Sections and tasks share one flat namespace of draggable ids. Each token
//! carries a tag so the kind can be recovered from the token alone:
//!
//! ```text
//! section:<section>
//! task:<section>:<task>:<index>
//! placeholder:<section>
//! ```
//!
//! `%` and `:` inside ids are percent-escaped.

use crate::domain::board::SectionId;
use crate::domain::task::TaskId;
use crate::error::{HlaviError, Result};
use std::{fmt, str::FromStr};

const SECTION_TAG: &str = "section";
const TASK_TAG: &str = "task";
const PLACEHOLDER_TAG: &str = "placeholder";

/// Decoded drag identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DragToken {
    /// A whole section, for section-level reordering
    Section { section_id: SectionId },
    /// A task together with its owning section and index at render time
    Task {
        section_id: SectionId,
        task_id: TaskId,
        index: usize,
    },
    /// The drop area rendered inside an empty section
    Placeholder { section_id: SectionId },
}

impl DragToken {
    /// Section the token belongs to, whatever its kind
    pub fn section_id(&self) -> &SectionId {
        match self {
            Self::Section { section_id }
            | Self::Task { section_id, .. }
            | Self::Placeholder { section_id } => section_id,
        }
    }

    pub fn is_section(&self) -> bool {
        matches!(self, Self::Section { .. })
    }

    pub fn is_task(&self) -> bool {
        matches!(self, Self::Task { .. })
    }
}

pub fn encode_section(section_id: &SectionId) -> String {
    format!("{}:{}", SECTION_TAG, escape(section_id.as_str()))
}

pub fn encode_task(section_id: &SectionId, task_id: &TaskId, index: usize) -> String {
    format!(
        "{}:{}:{}:{}",
        TASK_TAG,
        escape(section_id.as_str()),
        escape(task_id.as_str()),
        index
    )
}

pub fn encode_placeholder(section_id: &SectionId) -> String {
    format!("{}:{}", PLACEHOLDER_TAG, escape(section_id.as_str()))
}

pub fn encode(token: &DragToken) -> String {
    match token {
        DragToken::Section { section_id } => encode_section(section_id),
        DragToken::Task {
            section_id,
            task_id,
            index,
        } => encode_task(section_id, task_id, *index),
        DragToken::Placeholder { section_id } => encode_placeholder(section_id),
    }
}

pub fn decode(token: &str) -> Result<DragToken> {
    let invalid = || HlaviError::InvalidToken(token.to_string());
    let parts: Vec<&str> = token.split(':').collect();

    match parts.as_slice() {
        [SECTION_TAG, section] => Ok(DragToken::Section {
            section_id: SectionId::new(unescape(section).ok_or_else(invalid)?),
        }),
        [PLACEHOLDER_TAG, section] => Ok(DragToken::Placeholder {
            section_id: SectionId::new(unescape(section).ok_or_else(invalid)?),
        }),
        [TASK_TAG, section, task, index] => {
            // Reject signs and whitespace that `parse` would otherwise accept.
            if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            Ok(DragToken::Task {
                section_id: SectionId::new(unescape(section).ok_or_else(invalid)?),
                task_id: TaskId::new(unescape(task).ok_or_else(invalid)?),
                index: index.parse().map_err(|_| invalid())?,
            })
        }
        _ => Err(invalid()),
    }
}

impl FromStr for DragToken {
    type Err = HlaviError;

    fn from_str(s: &str) -> Result<Self> {
        decode(s)
    }
}

impl fmt::Display for DragToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self))
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverses `escape`. Empty ids and unknown escapes are rejected.
fn unescape(escaped: &str) -> Option<String> {
    if escaped.is_empty() {
        return None;
    }

    let mut out = String::with_capacity(escaped.len());
    let mut rest = escaped;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3)?;
        match code {
            "25" => out.push('%'),
            "3A" | "3a" => out.push(':'),
            _ => return None,
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Some(out)
}
