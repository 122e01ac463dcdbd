use crate::catchup::transcript::Transcript;
use chrono::DateTime;

/// Version tag shared by the prompt template and the response parser. Bump
/// both together: the parser's section anchors are only guaranteed against
/// replies produced from this template.
pub const SUMMARY_FORMAT_VERSION: &str = "catchup-v1";

pub const UNKNOWN_SENDER: &str = "Unknown";

/// Immutable once built; a retry rebuilds a fresh prompt from the same
/// transcript instead of editing this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    text: String,
}

impl Prompt {
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Render a transcript into the fixed summarization request. Deterministic:
/// the same transcript and label always produce byte-identical text.
pub fn build_prompt(transcript: &Transcript, chat_label: &str) -> Prompt {
    let mut text = String::new();
    text.push_str(
        "You are an assistant that reads a group chat export and returns a compact, \
         bullet-point catch-up summary.\n",
    );
    text.push_str(&format!("Chat: {chat_label}\n\nHere is the chat export:\n\n"));

    for record in transcript.records() {
        let sender = record.sender_label.as_deref().unwrap_or(UNKNOWN_SENDER);
        // UTC keeps the rendering independent of the host timezone.
        let stamp = record
            .timestamp_epoch_secs
            .and_then(|secs| DateTime::from_timestamp(secs as i64, 0));
        match stamp {
            Some(at) => text.push_str(&format!(
                "[{}] {}: {}\n",
                at.format("%Y-%m-%d %H:%M"),
                sender,
                record.body
            )),
            None => text.push_str(&format!("{}: {}\n", sender, record.body)),
        }
    }

    text.push_str(&format!(
        "\nRespond with exactly three labeled sections (format {SUMMARY_FORMAT_VERSION}):\n\
         KEY POINTS\n\
         - 6 to 12 bullet points covering decisions, dates, plans, and highlights\n\
         WHO SAID WHAT\n\
         name: their short position, one line per notable speaker\n\
         ACTION ITEMS\n\
         - [ ] assignee - task (by deadline); omit the deadline clause when none was stated\n\
         Be concise and only include what is contained in the messages. Use ISO dates when present.\n",
    ));

    Prompt { text }
}
