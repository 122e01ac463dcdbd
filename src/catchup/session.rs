use crate::catchup::audit::AuditLog;
use crate::catchup::clipboard::parse_clipboard;
use crate::catchup::generate::Generator;
use crate::catchup::parse::{SummaryResult, parse_summary};
use crate::catchup::prompt::build_prompt;
use crate::catchup::resolve::{ChatCandidate, ChatIdentity, resolve_chat};
use crate::catchup::transcript::{RawMessageRecord, Transcript, normalize};
use crate::catchup::util::now_epoch_secs;
use crate::error::{CatchupError, ErrorKind};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const MIN_FETCH_LIMIT: u32 = 20;
pub const MAX_FETCH_LIMIT: u32 = 500;

const CLIPBOARD_CHAT_LABEL: &str = "Pasted conversation";

/// Read-only message store seam. The sqlite adapter implements this for
/// chat.db; tests substitute an in-memory fake.
pub trait ChatStore {
    fn list_chats(&self) -> Result<Vec<ChatCandidate>, CatchupError>;
    fn fetch_messages(
        &self,
        chat_id: i64,
        limit: u32,
    ) -> Result<Vec<RawMessageRecord>, CatchupError>;
}

pub type SessionId = u64;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    ResolvingChat {
        query: String,
    },
    FetchingMessages {
        chat: ChatIdentity,
    },
    Prompting {
        message_count: usize,
    },
    AwaitingResponse {
        started_at_epoch_secs: u64,
    },
    Parsed {
        result: SummaryResult,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Parsed { .. } | Self::Failed { .. } | Self::Cancelled
        )
    }

    pub fn phase_label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ResolvingChat { .. } => "resolving_chat",
            Self::FetchingMessages { .. } => "fetching_messages",
            Self::Prompting { .. } => "prompting",
            Self::AwaitingResponse { .. } => "awaiting_response",
            Self::Parsed { .. } => "parsed",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::ResolvingChat { .. } => 1,
            Self::FetchingMessages { .. } => 2,
            Self::Prompting { .. } => 3,
            Self::AwaitingResponse { .. } => 4,
            Self::Parsed { .. } | Self::Failed { .. } | Self::Cancelled => 5,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionInput {
    Store { query: String, limit: u32 },
    Clipboard { raw: String },
}

#[derive(Debug)]
struct SessionSlot {
    session_id: SessionId,
    state: SessionState,
}

struct Inner {
    store: Box<dyn ChatStore + Send + Sync>,
    generator: Box<dyn Generator + Send + Sync>,
    audit: Option<AuditLog>,
    slot: Mutex<SessionSlot>,
}

/// Drives one summarization session at a time through the pipeline on a
/// background thread, so the interactive path only ever locks briefly to
/// read a snapshot.
///
/// Guarantees: transitions are monotonic per session id, terminal states
/// are final, and a stale worker (superseded or cancelled session) can
/// never write into visible state — its late result is simply dropped.
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(
        store: impl ChatStore + Send + Sync + 'static,
        generator: impl Generator + Send + Sync + 'static,
        audit: Option<AuditLog>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: Box::new(store),
                generator: Box::new(generator),
                audit,
                slot: Mutex::new(SessionSlot {
                    session_id: 0,
                    state: SessionState::Idle,
                }),
            }),
        }
    }

    /// Begin a new session, superseding whatever session came before it.
    /// Retry after `Failed` or `Parsed` is exactly this: a fresh start with
    /// the same input, never a mutation of the finished session.
    pub fn start(&self, input: SessionInput) -> SessionId {
        let id = {
            let mut slot = self.inner.slot.lock().expect("session slot poisoned");
            slot.session_id += 1;
            slot.state = SessionState::Idle;
            slot.session_id
        };
        self.inner.audit(id, "session", "start", "");

        let inner = Arc::clone(&self.inner);
        thread::spawn(move || run_pipeline(&inner, id, input));
        id
    }

    /// Cooperative cancel: flips visible state to `Cancelled` immediately.
    /// The background call is left to finish on its own; the transition
    /// guard discards its result when it arrives.
    pub fn cancel(&self, id: SessionId) -> bool {
        let cancelled = {
            let mut slot = self.inner.slot.lock().expect("session slot poisoned");
            if slot.session_id != id || slot.state.is_terminal() {
                false
            } else {
                slot.state = SessionState::Cancelled;
                true
            }
        };
        if cancelled {
            self.inner.audit(id, "cancelled", "ok", "");
        }
        cancelled
    }

    pub fn snapshot(&self) -> (SessionId, SessionState) {
        let slot = self.inner.slot.lock().expect("session slot poisoned");
        (slot.session_id, slot.state.clone())
    }

    /// Poll until the given session reaches a terminal state or the timeout
    /// elapses. Returns `None` on timeout or when the session was
    /// superseded.
    pub fn wait_terminal(&self, id: SessionId, timeout: Duration) -> Option<SessionState> {
        let deadline = Instant::now() + timeout;
        loop {
            let (current_id, state) = self.snapshot();
            if current_id != id {
                return None;
            }
            if state.is_terminal() {
                return Some(state);
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }
}

impl Inner {
    /// Apply `next` for session `id`. Rejects stale sessions, transitions
    /// out of a terminal state, and anything that would move backward.
    /// Workers stop as soon as a transition is refused.
    fn transition(&self, id: SessionId, next: SessionState) -> bool {
        let applied = {
            let mut slot = self.slot.lock().expect("session slot poisoned");
            if slot.session_id != id
                || slot.state.is_terminal()
                || next.rank() <= slot.state.rank()
            {
                false
            } else {
                slot.state = next.clone();
                true
            }
        };
        if applied {
            let status = match &next {
                SessionState::Failed { .. } => "failed",
                _ => "ok",
            };
            let message = match &next {
                SessionState::ResolvingChat { query } => format!("query={query}"),
                SessionState::FetchingMessages { chat } => format!("chat={}", chat.display_name),
                SessionState::Prompting { message_count } => format!("messages={message_count}"),
                SessionState::Parsed { result } => format!("bullets={}", result.bullets.len()),
                SessionState::Failed { message, .. } => message.clone(),
                _ => String::new(),
            };
            self.audit(id, next.phase_label(), status, &message);
        }
        applied
    }

    fn fail(&self, id: SessionId, err: CatchupError) {
        let _ = self.transition(
            id,
            SessionState::Failed {
                kind: err.kind(),
                message: err.to_string(),
            },
        );
    }

    fn audit(&self, id: SessionId, phase: &str, status: &str, message: &str) {
        if let Some(audit) = &self.audit {
            let _ = audit.record(id, phase, status, message);
        }
    }
}

fn acquire_store_transcript(
    inner: &Inner,
    id: SessionId,
    query: &str,
    limit: u32,
) -> Result<Option<(Transcript, String)>, CatchupError> {
    if !inner.transition(
        id,
        SessionState::ResolvingChat {
            query: query.to_string(),
        },
    ) {
        return Ok(None);
    }

    let candidates = inner.store.list_chats()?;
    let chat = resolve_chat(query, &candidates)?;

    if !inner.transition(id, SessionState::FetchingMessages { chat: chat.clone() }) {
        return Ok(None);
    }

    let limit = limit.clamp(MIN_FETCH_LIMIT, MAX_FETCH_LIMIT);
    let records = inner.store.fetch_messages(chat.id, limit)?;
    let transcript = Transcript::new(records)?;
    Ok(Some((transcript, chat.display_name)))
}

fn run_pipeline(inner: &Arc<Inner>, id: SessionId, input: SessionInput) {
    let acquired = match input {
        SessionInput::Store { query, limit } => {
            match acquire_store_transcript(inner, id, &query, limit) {
                Ok(Some(pair)) => pair,
                Ok(None) => return,
                Err(err) => return inner.fail(id, err),
            }
        }
        SessionInput::Clipboard { raw } => match parse_clipboard(&raw) {
            Ok(transcript) => (transcript, CLIPBOARD_CHAT_LABEL.to_string()),
            Err(err) => return inner.fail(id, err),
        },
    };

    let (transcript, chat_label) = acquired;
    let transcript = normalize(&transcript);

    if !inner.transition(
        id,
        SessionState::Prompting {
            message_count: transcript.len(),
        },
    ) {
        return;
    }
    let prompt = build_prompt(&transcript, &chat_label);

    if !inner.transition(
        id,
        SessionState::AwaitingResponse {
            started_at_epoch_secs: now_epoch_secs().unwrap_or(0),
        },
    ) {
        return;
    }
    let reply = match inner.generator.generate(&prompt) {
        Ok(reply) => reply,
        Err(err) => return inner.fail(id, err),
    };

    let result = match parse_summary(&reply) {
        Ok(result) => result,
        Err(err) => return inner.fail(id, err),
    };
    let _ = inner.transition(id, SessionState::Parsed { result });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catchup::prompt::Prompt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::{Receiver, SyncSender, sync_channel};

    const CANNED_REPLY: &str = "\
KEY POINTS
- Trip confirmed for 2026-09-12
- Cabin booked by Alice
- Budget set at $400 per person
- Bob handles the food run
- Carol is skipping this one
- Departure from the usual spot at 08:00

WHO SAID WHAT
Alice: organized everything
Bob: volunteered for groceries

ACTION ITEMS
- [ ] Bob - grocery run (by 2026-09-10)
";

    struct FakeStore {
        chats: Vec<ChatCandidate>,
        messages: Vec<RawMessageRecord>,
    }

    impl FakeStore {
        fn with_chat(name: &str, message_count: usize) -> Self {
            let messages = (0..message_count)
                .map(|i| RawMessageRecord {
                    sender_label: Some(if i % 2 == 0 { "Alice" } else { "Bob" }.to_string()),
                    timestamp_epoch_secs: Some(1_700_000_000 + i as u64),
                    body: format!("message {i}"),
                    source_ordinal: i as u32,
                })
                .collect();
            Self {
                chats: vec![ChatCandidate {
                    identity: ChatIdentity {
                        id: 1,
                        display_name: name.to_string(),
                    },
                    last_active_epoch_secs: Some(1_700_000_000),
                }],
                messages,
            }
        }
    }

    impl ChatStore for FakeStore {
        fn list_chats(&self) -> Result<Vec<ChatCandidate>, CatchupError> {
            Ok(self.chats.clone())
        }

        fn fetch_messages(
            &self,
            _chat_id: i64,
            limit: u32,
        ) -> Result<Vec<RawMessageRecord>, CatchupError> {
            Ok(self
                .messages
                .iter()
                .rev()
                .take(limit as usize)
                .rev()
                .cloned()
                .collect())
        }
    }

    struct FakeGenerator {
        reply: String,
        called: Arc<AtomicBool>,
    }

    impl FakeGenerator {
        fn new(reply: &str) -> (Self, Arc<AtomicBool>) {
            let called = Arc::new(AtomicBool::new(false));
            (
                Self {
                    reply: reply.to_string(),
                    called: Arc::clone(&called),
                },
                called,
            )
        }
    }

    impl Generator for FakeGenerator {
        fn generate(&self, _prompt: &Prompt) -> Result<String, CatchupError> {
            self.called.store(true, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    /// Signals when the call starts, then blocks until released, so tests
    /// can interleave a cancel with an in-flight generation.
    struct BlockingGenerator {
        started: SyncSender<()>,
        release: Mutex<Receiver<()>>,
        reply: String,
    }

    impl Generator for BlockingGenerator {
        fn generate(&self, _prompt: &Prompt) -> Result<String, CatchupError> {
            let _ = self.started.send(());
            let release = self.release.lock().expect("release lock");
            let _ = release.recv();
            Ok(self.reply.clone())
        }
    }

    fn empty_store() -> FakeStore {
        FakeStore {
            chats: Vec::new(),
            messages: Vec::new(),
        }
    }

    #[test]
    fn store_mode_reaches_parsed_with_expected_bullets() {
        let store = FakeStore::with_chat("Squad Planning", 50);
        let (generator, _) = FakeGenerator::new(CANNED_REPLY);
        let coordinator = Coordinator::new(store, generator, None);

        let id = coordinator.start(SessionInput::Store {
            query: "squad".to_string(),
            limit: 50,
        });
        let state = coordinator
            .wait_terminal(id, Duration::from_secs(5))
            .expect("session should finish");

        let SessionState::Parsed { result } = state else {
            panic!("expected Parsed, got {state:?}");
        };
        assert!((6..=12).contains(&result.bullets.len()));
        assert_eq!(result.speaker_map.len(), 2);
        assert_eq!(result.action_items.len(), 1);
    }

    #[test]
    fn empty_clipboard_fails_before_any_generation_call() {
        let (generator, called) = FakeGenerator::new(CANNED_REPLY);
        let coordinator = Coordinator::new(empty_store(), generator, None);

        let id = coordinator.start(SessionInput::Clipboard {
            raw: "   \n ".to_string(),
        });
        let state = coordinator
            .wait_terminal(id, Duration::from_secs(5))
            .expect("session should finish");

        let SessionState::Failed { kind, .. } = state else {
            panic!("expected Failed, got {state:?}");
        };
        assert_eq!(kind, ErrorKind::EmptyInput);
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn clipboard_mode_skips_resolution_and_parses() {
        let (generator, _) = FakeGenerator::new(CANNED_REPLY);
        let coordinator = Coordinator::new(empty_store(), generator, None);

        let id = coordinator.start(SessionInput::Clipboard {
            raw: "Alice: hi\nBob: hello there\nstill talking".to_string(),
        });
        let state = coordinator
            .wait_terminal(id, Duration::from_secs(5))
            .expect("session should finish");
        assert!(matches!(state, SessionState::Parsed { .. }));
    }

    #[test]
    fn unknown_chat_fails_with_not_found() {
        let store = FakeStore::with_chat("Book Club", 30);
        let (generator, called) = FakeGenerator::new(CANNED_REPLY);
        let coordinator = Coordinator::new(store, generator, None);

        let id = coordinator.start(SessionInput::Store {
            query: "squad".to_string(),
            limit: 50,
        });
        let state = coordinator
            .wait_terminal(id, Duration::from_secs(5))
            .expect("session should finish");

        let SessionState::Failed { kind, .. } = state else {
            panic!("expected Failed, got {state:?}");
        };
        assert_eq!(kind, ErrorKind::NotFound);
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn late_result_never_overwrites_a_cancelled_session() {
        let (started_tx, started_rx) = sync_channel(1);
        let (release_tx, release_rx) = sync_channel(1);
        let generator = BlockingGenerator {
            started: started_tx,
            release: Mutex::new(release_rx),
            reply: CANNED_REPLY.to_string(),
        };
        let store = FakeStore::with_chat("Squad Planning", 25);
        let coordinator = Coordinator::new(store, generator, None);

        let id = coordinator.start(SessionInput::Store {
            query: "squad planning".to_string(),
            limit: 25,
        });
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("generation should start");

        assert!(coordinator.cancel(id));
        release_tx.send(()).expect("release worker");

        // Give the worker time to attempt its (rejected) final transition.
        thread::sleep(Duration::from_millis(100));
        let (current_id, state) = coordinator.snapshot();
        assert_eq!(current_id, id);
        assert!(matches!(state, SessionState::Cancelled));
    }

    #[test]
    fn cancel_of_finished_or_stale_session_is_a_no_op() {
        let store = FakeStore::with_chat("Squad Planning", 25);
        let (generator, _) = FakeGenerator::new(CANNED_REPLY);
        let coordinator = Coordinator::new(store, generator, None);

        let id = coordinator.start(SessionInput::Store {
            query: "squad".to_string(),
            limit: 25,
        });
        coordinator
            .wait_terminal(id, Duration::from_secs(5))
            .expect("session should finish");

        assert!(!coordinator.cancel(id));
        assert!(!coordinator.cancel(id + 1));
    }

    #[test]
    fn a_new_session_supersedes_the_previous_one() {
        let (started_tx, started_rx) = sync_channel(1);
        let (release_tx, release_rx) = sync_channel(1);
        let generator = BlockingGenerator {
            started: started_tx,
            release: Mutex::new(release_rx),
            reply: CANNED_REPLY.to_string(),
        };
        let store = FakeStore::with_chat("Squad Planning", 25);
        let coordinator = Coordinator::new(store, generator, None);

        let first = coordinator.start(SessionInput::Store {
            query: "squad".to_string(),
            limit: 25,
        });
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("first generation should start");

        let second = coordinator.start(SessionInput::Clipboard {
            raw: "   ".to_string(),
        });
        assert!(second > first);

        // Unblock the first worker; its result must be dropped.
        release_tx.send(()).expect("release worker");
        let state = coordinator
            .wait_terminal(second, Duration::from_secs(5))
            .expect("second session should finish");
        assert!(matches!(
            state,
            SessionState::Failed {
                kind: ErrorKind::EmptyInput,
                ..
            }
        ));
        let (current_id, _) = coordinator.snapshot();
        assert_eq!(current_id, second);
    }
}
