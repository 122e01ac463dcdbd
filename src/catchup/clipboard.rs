use crate::catchup::transcript::{RawMessageRecord, Transcript};
use crate::error::CatchupError;

/// Sender labels longer than this are assumed to be prose containing a
/// colon, not an attribution prefix.
const MAX_SENDER_LABEL_CHARS: usize = 40;

/// Split `line` into `(sender, text)` when it looks like the start of a new
/// message: `Name: text` with no leading whitespace, a short label, and no
/// sentence-ending punctuation inside the label.
fn split_sender_line(line: &str) -> Option<(&str, &str)> {
    if line.starts_with(char::is_whitespace) {
        return None;
    }
    let (label, rest) = line.split_once(':')?;
    let text = rest.strip_prefix(char::is_whitespace)?.trim();
    if text.is_empty() {
        return None;
    }
    let label = label.trim_end();
    if label.is_empty()
        || label.chars().count() > MAX_SENDER_LABEL_CHARS
        || label.contains(['.', '!', '?'])
    {
        return None;
    }
    Some((label, text))
}

/// Parse loosely formatted conversation text copied out of a chat window.
///
/// Lines of the form `Name: text` start a new record; anything else is a
/// continuation of the previous message body. Text before the first
/// attributed line becomes an unattributed record. Clipboard text carries
/// no usable timestamps, so source order is the only ordering signal.
pub fn parse_clipboard(raw: &str) -> Result<Transcript, CatchupError> {
    let trimmed = raw.trim_matches(|c: char| c == '\n' || c == '\r' || c.is_whitespace());
    if trimmed.is_empty() {
        return Err(CatchupError::EmptyInput);
    }

    let mut records: Vec<RawMessageRecord> = Vec::new();
    let mut current: Option<(Option<String>, String)> = None;
    let mut ordinal: u32 = 0;

    let flush = |current: &mut Option<(Option<String>, String)>,
                 records: &mut Vec<RawMessageRecord>,
                 ordinal: &mut u32| {
        if let Some((sender, body)) = current.take() {
            let body = body.trim_end().to_string();
            if body.is_empty() {
                return;
            }
            records.push(RawMessageRecord {
                sender_label: sender,
                timestamp_epoch_secs: None,
                body,
                source_ordinal: *ordinal,
            });
            *ordinal += 1;
        }
    };

    for line in trimmed.lines() {
        if let Some((sender, text)) = split_sender_line(line) {
            flush(&mut current, &mut records, &mut ordinal);
            current = Some((Some(sender.to_string()), text.to_string()));
            continue;
        }

        let continuation = line.trim_end();
        match &mut current {
            Some((_, body)) => {
                body.push('\n');
                body.push_str(continuation);
            }
            None => current = Some((None, continuation.to_string())),
        }
    }
    flush(&mut current, &mut records, &mut ordinal);

    Transcript::new(records)
}
