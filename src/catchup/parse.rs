use crate::error::CatchupError;
use serde::{Deserialize, Serialize};

/// Heading lines longer than this are treated as prose that merely mentions
/// a section name, not as a heading.
const MAX_HEADING_CHARS: usize = 40;
/// Speaker labels past this length are almost certainly sentence text.
const MAX_SPEAKER_CHARS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerPosition {
    pub speaker: String,
    pub position: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub assignee: String,
    pub task: String,
    pub deadline: Option<String>,
}

/// Structured form of the model's free-text reply. `speaker_map` and
/// `action_items` may legitimately be empty; `bullets` may not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub bullets: Vec<String>,
    pub speaker_map: Vec<SpeakerPosition>,
    pub action_items: Vec<ActionItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Bullets,
    Speakers,
    Actions,
}

/// Strip bullet glyphs and checkbox prefixes, returning the content when
/// the line was bullet-like.
fn bullet_content(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let rest = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("• "))
        .or_else(|| trimmed.strip_prefix("-\t"))?;
    let rest = rest.trim_start();
    let rest = rest
        .strip_prefix("[ ]")
        .or_else(|| rest.strip_prefix("[x]"))
        .or_else(|| rest.strip_prefix("[X]"))
        .unwrap_or(rest)
        .trim();
    if rest.is_empty() { None } else { Some(rest) }
}

/// Keyword-anchored heading detection: tolerant of case, `#`/`**`
/// decoration, and trailing punctuation drift.
fn heading_for(line: &str) -> Option<Section> {
    if bullet_content(line).is_some() {
        return None;
    }
    let stripped = line
        .trim()
        .trim_start_matches(['#', '*', ' '])
        .trim_end_matches(['*', ':', '?', '!', '.', ' '])
        .to_lowercase();
    if stripped.is_empty() || stripped.chars().count() > MAX_HEADING_CHARS {
        return None;
    }
    if stripped.contains("who said what") {
        return Some(Section::Speakers);
    }
    if stripped.contains("action item") {
        return Some(Section::Actions);
    }
    if stripped.contains("key point") || stripped.contains("summary") {
        return Some(Section::Bullets);
    }
    None
}

fn parse_speaker_line(line: &str) -> Option<SpeakerPosition> {
    let content = bullet_content(line).unwrap_or(line.trim());
    let (speaker, position) = content.split_once(':')?;
    let speaker = speaker.trim().trim_matches('*');
    let position = position.trim();
    if speaker.is_empty() || position.is_empty() || speaker.chars().count() > MAX_SPEAKER_CHARS {
        return None;
    }
    Some(SpeakerPosition {
        speaker: speaker.to_string(),
        position: position.to_string(),
    })
}

/// Grammar: `assignee - task (by deadline)`, deadline clause optional. An
/// absent deadline is `None`, never a parse failure.
fn parse_action_line(line: &str) -> Option<ActionItem> {
    let content = bullet_content(line).unwrap_or(line.trim());
    if content.is_empty() {
        return None;
    }

    let (assignee, rest) = match content.split_once(" - ") {
        Some((assignee, rest)) if !assignee.trim().is_empty() => {
            (assignee.trim().to_string(), rest.trim())
        }
        _ => (String::from("Unassigned"), content),
    };

    let (task, deadline) = match rest.rfind("(by ") {
        Some(idx) if rest.ends_with(')') => {
            let deadline = rest[idx + 4..rest.len() - 1].trim();
            let task = rest[..idx].trim();
            if deadline.is_empty() || task.is_empty() {
                (rest.to_string(), None)
            } else {
                (task.to_string(), Some(deadline.to_string()))
            }
        }
        _ => (rest.trim().to_string(), None),
    };

    if task.is_empty() {
        return None;
    }
    Some(ActionItem {
        assignee,
        task,
        deadline,
    })
}

/// First contiguous block of bullet-like lines not claimed by a recognized
/// section, used when no bullets heading can be located. Keeps the parser
/// usable under minor template drift instead of failing outright.
fn first_unclaimed_bullet_block(lines: &[&str], claimed: &[bool]) -> Vec<String> {
    let mut block = Vec::new();
    let mut in_block = false;
    for (idx, line) in lines.iter().enumerate() {
        if claimed[idx] {
            if in_block {
                break;
            }
            continue;
        }
        match bullet_content(line) {
            Some(content) => {
                in_block = true;
                block.push(content.to_string());
            }
            None if in_block && line.trim().is_empty() => continue,
            None if in_block => break,
            None => continue,
        }
    }
    block
}

/// Parse the service's reply into the three structured sections.
///
/// Headings are matched on keyword anchors, so `KEY POINTS`, `key points:`
/// and `## Who said what?` all work. A reply missing the speaker or action
/// sections degrades to empty sequences; a reply with no bullet lines at
/// all is `UnparseableResponse`.
pub fn parse_summary(text: &str) -> Result<SummaryResult, CatchupError> {
    let lines: Vec<&str> = text.lines().collect();

    let mut bullets = Vec::new();
    let mut speaker_map = Vec::new();
    let mut action_items = Vec::new();
    let mut current: Option<Section> = None;
    let mut saw_bullets_heading = false;
    let mut claimed = vec![false; lines.len()];

    for (idx, line) in lines.iter().enumerate() {
        if let Some(section) = heading_for(line) {
            if section == Section::Bullets {
                saw_bullets_heading = true;
            }
            claimed[idx] = true;
            current = Some(section);
            continue;
        }
        match current {
            Some(Section::Bullets) => {
                if let Some(content) = bullet_content(line) {
                    bullets.push(content.to_string());
                    claimed[idx] = true;
                }
            }
            Some(Section::Speakers) => {
                if let Some(entry) = parse_speaker_line(line) {
                    speaker_map.push(entry);
                    claimed[idx] = true;
                }
            }
            Some(Section::Actions) => {
                if let Some(item) = parse_action_line(line) {
                    action_items.push(item);
                    claimed[idx] = true;
                }
            }
            None => {}
        }
    }

    if !saw_bullets_heading {
        // Fallback: the first bullet block outside the recognized sections
        // is taken as the summary, wherever it sits in the reply.
        bullets = first_unclaimed_bullet_block(&lines, &claimed);
    }

    if bullets.is_empty() {
        return Err(CatchupError::UnparseableResponse);
    }

    Ok(SummaryResult {
        bullets,
        speaker_map,
        action_items,
    })
}
