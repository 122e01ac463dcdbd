use rusqlite::Connection;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;

const APPLE_EPOCH_OFFSET_SECS: i64 = 978_307_200;

pub const CANNED_REPLY: &str = "\
KEY POINTS
- Trip confirmed for 2026-09-12
- Cabin booked by Alice
- Budget set at $400 per person
- Bob handles the food run
- Carol is skipping this one
- Departure from the usual spot at 08:00
- Bring layers, the forecast is cold

WHO SAID WHAT
Alice: organized everything
Bob: volunteered for groceries

ACTION ITEMS
- [ ] Bob - grocery run (by 2026-09-10)
";

/// Build a minimal chat.db fixture with one named group chat and
/// `message_count` alternating messages, dated in Apple nanoseconds.
pub fn build_chat_db(path: &Path, chat_name: &str, message_count: usize) {
    let conn = Connection::open(path).expect("open fixture db");
    conn.execute_batch(
        "CREATE TABLE chat (ROWID INTEGER PRIMARY KEY, guid TEXT, display_name TEXT);
         CREATE TABLE handle (ROWID INTEGER PRIMARY KEY, id TEXT);
         CREATE TABLE message (
             ROWID INTEGER PRIMARY KEY,
             text TEXT,
             attributedBody BLOB,
             date INTEGER,
             is_from_me INTEGER,
             handle_id INTEGER,
             service TEXT
         );
         CREATE TABLE chat_message_join (chat_id INTEGER, message_id INTEGER);",
    )
    .expect("create schema");

    conn.execute(
        "INSERT INTO chat (ROWID, guid, display_name) VALUES (1, 'chat-guid-1', ?1)",
        [chat_name],
    )
    .expect("insert chat");
    conn.execute(
        "INSERT INTO handle (ROWID, id) VALUES (1, 'alice@example.com')",
        [],
    )
    .expect("insert handle");

    let base_unix: i64 = 1_756_000_000;
    for i in 0..message_count {
        let date_ns = (base_unix + i as i64 - APPLE_EPOCH_OFFSET_SECS) * 1_000_000_000;
        let is_from_me = i64::from(i % 2 == 0);
        conn.execute(
            "INSERT INTO message (ROWID, text, date, is_from_me, handle_id, service)
             VALUES (?1, ?2, ?3, ?4, 1, 'iMessage')",
            rusqlite::params![i as i64 + 1, format!("message {i}"), date_ns, is_from_me],
        )
        .expect("insert message");
        conn.execute(
            "INSERT INTO chat_message_join (chat_id, message_id) VALUES (1, ?1)",
            [i as i64 + 1],
        )
        .expect("insert join");
    }
}

/// One-shot OpenAI-compatible stub: accepts a single request and answers
/// with `reply` wrapped in a chat-completions JSON envelope. Returns the
/// base URL to point `CATCHUP_BASE_URL` at.
pub fn spawn_generation_stub(reply: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub listener");
    let base_url = format!("http://{}", listener.local_addr().expect("stub addr"));
    let body = serde_json::json!({
        "choices": [
            {"message": {"content": reply}}
        ]
    })
    .to_string();

    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };

        // Read the request fully (headers, then Content-Length bytes).
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let Ok(n) = stream.read(&mut chunk) else {
                return;
            };
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = headers
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let Ok(n) = stream.read(&mut chunk) else {
                return;
            };
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.flush();
    });

    base_url
}
