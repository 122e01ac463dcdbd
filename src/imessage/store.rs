use crate::catchup::resolve::{ChatCandidate, ChatIdentity};
use crate::catchup::session::ChatStore;
use crate::catchup::transcript::RawMessageRecord;
use crate::error::CatchupError;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Mutex;

/// Seconds between the Unix epoch and the Apple reference date
/// (2001-01-01T00:00:00Z).
const APPLE_EPOCH_OFFSET_SECS: i64 = 978_307_200;

pub const UNREADABLE_BODY: &str = "[unreadable message]";
const SELF_SENDER_LABEL: &str = "Me";

/// Read-only adapter over the macOS Messages store (`chat.db`).
///
/// The connection is mutex-wrapped so the adapter can be shared with the
/// coordinator's background worker.
pub struct SqliteChatStore {
    conn: Mutex<Connection>,
}

impl SqliteChatStore {
    /// Open the store read-only. A missing or unreadable database is
    /// `StoreUnavailable` — distinct from a chat that merely isn't there.
    pub fn open(path: &Path) -> Result<Self, CatchupError> {
        if !path.is_file() {
            return Err(CatchupError::StoreUnavailable(format!(
                "chat database not found at {}",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| {
            CatchupError::StoreUnavailable(format!("{}: {err}", path.display()))
        })?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// chat.db stores timestamps as an offset from the Apple reference date,
/// but the unit drifted across macOS releases (seconds, then ms/µs, then
/// nanoseconds). Scale-detect by magnitude before converting.
pub fn apple_time_to_epoch_secs(raw: i64) -> Option<u64> {
    if raw <= 0 {
        return None;
    }
    let secs = if raw > 1_000_000_000_000_000 {
        raw / 1_000_000_000
    } else if raw > 1_000_000_000_000 {
        raw / 1_000_000
    } else if raw > 10_000_000_000 {
        raw / 1_000
    } else {
        raw
    };
    u64::try_from(secs + APPLE_EPOCH_OFFSET_SECS).ok()
}

/// Pull the visible text out of an `attributedBody` typedstream blob.
///
/// The container is an NSKeyedArchiver-era typedstream; the message text
/// sits right after the `NSString` class marker as a `+`-tagged,
/// length-prefixed UTF-8 run. This decodes that one field and nothing else.
pub fn decode_attributed_body(blob: &[u8]) -> Option<String> {
    let marker = b"NSString";
    let start = blob
        .windows(marker.len())
        .position(|window| window == marker)?
        + marker.len();

    let tail = &blob[start..];
    let plus = tail.iter().position(|&b| b == b'+')?;
    let after = &tail[plus + 1..];

    let (len, data_start) = match *after.first()? {
        // 0x81: little-endian u16 length follows.
        0x81 => {
            if after.len() < 3 {
                return None;
            }
            (u16::from_le_bytes([after[1], after[2]]) as usize, 3)
        }
        n if n < 0x80 => (n as usize, 1),
        _ => return None,
    };

    let data = after.get(data_start..data_start + len)?;
    let text = std::str::from_utf8(data).ok()?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

fn store_err(err: rusqlite::Error) -> CatchupError {
    CatchupError::StoreUnavailable(err.to_string())
}

impl ChatStore for SqliteChatStore {
    fn list_chats(&self) -> Result<Vec<ChatCandidate>, CatchupError> {
        let conn = self.conn.lock().expect("chat.db connection poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT c.ROWID, c.display_name, MAX(m.date) AS last_active
                 FROM chat c
                 LEFT JOIN chat_message_join cmj ON cmj.chat_id = c.ROWID
                 LEFT JOIN message m ON m.ROWID = cmj.message_id
                 WHERE c.display_name IS NOT NULL AND c.display_name <> ''
                 GROUP BY c.ROWID",
            )
            .map_err(store_err)?;

        let rows = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                let display_name: String = row.get(1)?;
                let last_active: Option<i64> = row.get(2)?;
                Ok(ChatCandidate {
                    identity: ChatIdentity { id, display_name },
                    last_active_epoch_secs: last_active.and_then(apple_time_to_epoch_secs),
                })
            })
            .map_err(store_err)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(store_err)?);
        }
        Ok(out)
    }

    /// Most-recent `limit` messages, returned in chronological order. A
    /// single undecodable row degrades to a placeholder body; it never
    /// fails the batch.
    fn fetch_messages(
        &self,
        chat_id: i64,
        limit: u32,
    ) -> Result<Vec<RawMessageRecord>, CatchupError> {
        let conn = self.conn.lock().expect("chat.db connection poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT m.text, m.attributedBody, m.date, m.is_from_me, h.id
                 FROM message m
                 JOIN chat_message_join cmj ON cmj.message_id = m.ROWID
                 LEFT JOIN handle h ON m.handle_id = h.ROWID
                 WHERE cmj.chat_id = ?1
                 ORDER BY m.date DESC
                 LIMIT ?2",
            )
            .map_err(store_err)?;

        struct Row {
            text: Option<String>,
            attributed_body: Option<Vec<u8>>,
            date: Option<i64>,
            is_from_me: bool,
            handle: Option<String>,
        }

        let rows = stmt
            .query_map(rusqlite::params![chat_id, limit], |row| {
                Ok(Row {
                    text: row.get(0)?,
                    attributed_body: row.get(1)?,
                    date: row.get(2)?,
                    is_from_me: row.get::<_, Option<bool>>(3)?.unwrap_or(false),
                    handle: row.get(4)?,
                })
            })
            .map_err(store_err)?;

        let mut newest_first = Vec::new();
        for row in rows {
            newest_first.push(row.map_err(store_err)?);
        }

        let mut out = Vec::with_capacity(newest_first.len());
        for (ordinal, row) in newest_first.into_iter().rev().enumerate() {
            let body = match (&row.text, &row.attributed_body) {
                (Some(text), _) if !text.trim().is_empty() => text.trim().to_string(),
                (_, Some(blob)) => {
                    decode_attributed_body(blob).unwrap_or_else(|| UNREADABLE_BODY.to_string())
                }
                // Reactions and system rows carry no body at all.
                _ => continue,
            };
            let sender_label = if row.is_from_me {
                Some(SELF_SENDER_LABEL.to_string())
            } else {
                row.handle
            };
            out.push(RawMessageRecord {
                sender_label,
                timestamp_epoch_secs: row.date.and_then(apple_time_to_epoch_secs),
                body,
                source_ordinal: ordinal as u32,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apple_time_scales_by_magnitude() {
        // 2022-01-01T00:00:00Z is 662688000 seconds after the Apple epoch.
        let expected = 662_688_000 + APPLE_EPOCH_OFFSET_SECS as u64;
        assert_eq!(apple_time_to_epoch_secs(662_688_000), Some(expected));
        assert_eq!(apple_time_to_epoch_secs(662_688_000_000), Some(expected));
        assert_eq!(apple_time_to_epoch_secs(662_688_000_000_000), Some(expected));
        assert_eq!(
            apple_time_to_epoch_secs(662_688_000_000_000_000),
            Some(expected)
        );
    }

    #[test]
    fn apple_time_rejects_zero_and_negative() {
        assert_eq!(apple_time_to_epoch_secs(0), None);
        assert_eq!(apple_time_to_epoch_secs(-5), None);
    }

    fn typedstream_with(text: &str) -> Vec<u8> {
        let mut blob = vec![0x04, 0x0B];
        blob.extend_from_slice(b"streamtyped");
        blob.extend_from_slice(b"NSString");
        blob.extend_from_slice(&[0x01, 0x94, 0x84]);
        blob.push(b'+');
        blob.push(text.len() as u8);
        blob.extend_from_slice(text.as_bytes());
        blob.extend_from_slice(&[0x86, 0x84]);
        blob
    }

    #[test]
    fn attributed_body_short_form_decodes() {
        let blob = typedstream_with("lunch at noon?");
        assert_eq!(
            decode_attributed_body(&blob).as_deref(),
            Some("lunch at noon?")
        );
    }

    #[test]
    fn attributed_body_long_form_decodes() {
        let text = "a".repeat(300);
        let mut blob = Vec::new();
        blob.extend_from_slice(b"NSString");
        blob.push(b'+');
        blob.push(0x81);
        blob.extend_from_slice(&(text.len() as u16).to_le_bytes());
        blob.extend_from_slice(text.as_bytes());
        assert_eq!(decode_attributed_body(&blob).as_deref(), Some(text.as_str()));
    }

    #[test]
    fn garbage_blob_fails_decode_without_panicking() {
        assert_eq!(decode_attributed_body(b"\x00\x01\x02nonsense"), None);
        assert_eq!(decode_attributed_body(b"NSString"), None);
        let truncated = [b'N', b'S', b'S', b't', b'r', b'i', b'n', b'g', b'+', 50, b'h'];
        assert_eq!(decode_attributed_body(&truncated), None);
    }

    #[test]
    fn missing_database_is_store_unavailable() {
        let err = SqliteChatStore::open(Path::new("/nonexistent/chat.db"))
            .err()
            .unwrap();
        assert!(matches!(err, CatchupError::StoreUnavailable(_)));
    }
}
