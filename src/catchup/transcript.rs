use crate::error::CatchupError;
use serde::Serialize;

/// Largest body the normalizer lets through, marker included. Bounds the
/// prompt size when a chat contains pasted walls of text.
pub const MAX_BODY_CHARS: usize = 4000;
const TRUNCATION_MARKER: &str = "… [message truncated]";

/// One attributed message as it came out of a source adapter. The sender
/// label is unparsed source text; clipboard records usually carry no
/// timestamp, so `source_ordinal` is the authoritative ordering signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawMessageRecord {
    pub sender_label: Option<String>,
    pub timestamp_epoch_secs: Option<u64>,
    pub body: String,
    pub source_ordinal: u32,
}

/// Ordered, attributed message sequence. Never empty: both adapters refuse
/// to hand an empty transcript to the prompt builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    records: Vec<RawMessageRecord>,
}

impl Transcript {
    /// Sorts by source ordinal (timestamp as tie-breaker) and rejects an
    /// empty record set, which is an error rather than a degenerate value.
    pub fn new(mut records: Vec<RawMessageRecord>) -> Result<Self, CatchupError> {
        if records.is_empty() {
            return Err(CatchupError::EmptyInput);
        }
        records.sort_by_key(|r| (r.source_ordinal, r.timestamp_epoch_secs));
        Ok(Self { records })
    }

    pub fn records(&self) -> &[RawMessageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn is_zero_width(ch: char) -> bool {
    matches!(
        ch,
        '\u{200B}'..='\u{200F}' | '\u{FEFF}' | '\u{2060}' | '\u{00AD}'
    )
}

fn clean_body(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    for line in body.lines() {
        let mut cleaned = String::with_capacity(line.len());
        let mut last_was_space = false;
        for ch in line.chars() {
            if is_zero_width(ch) || (ch.is_control() && ch != '\t') {
                continue;
            }
            if ch == ' ' || ch == '\t' {
                if !last_was_space {
                    cleaned.push(' ');
                }
                last_was_space = true;
            } else {
                cleaned.push(ch);
                last_was_space = false;
            }
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(cleaned.trim_end());
    }
    out
}

fn cap_body(body: String) -> String {
    if body.chars().count() <= MAX_BODY_CHARS {
        return body;
    }
    let marker_chars = TRUNCATION_MARKER.chars().count();
    let mut capped: String = body.chars().take(MAX_BODY_CHARS - marker_chars).collect();
    capped.push_str(TRUNCATION_MARKER);
    capped
}

/// Strip zero-width and control characters, collapse space runs, drop exact
/// back-to-back duplicates (same sender, identical body), and cap oversized
/// bodies with a visible marker. Never reorders records; the only count
/// change is the duplicate drop. Idempotent.
pub fn normalize(transcript: &Transcript) -> Transcript {
    let mut out: Vec<RawMessageRecord> = Vec::with_capacity(transcript.len());

    for record in transcript.records() {
        let body = cap_body(clean_body(&record.body));
        if let Some(prev) = out.last()
            && prev.sender_label == record.sender_label
            && prev.body == body
        {
            continue;
        }
        out.push(RawMessageRecord {
            sender_label: record.sender_label.clone(),
            timestamp_epoch_secs: record.timestamp_epoch_secs,
            body,
            source_ordinal: record.source_ordinal,
        });
    }

    // Dropping duplicates can never empty a non-empty transcript, so the
    // constructor invariant holds without re-checking.
    Transcript { records: out }
}
