use crate::catchup::audit::AuditLog;
use crate::catchup::config::{CatchupConfig, load_config};
use crate::catchup::generate::{GenerateConfig, HttpGenerator, Provider};
use crate::catchup::parse::SummaryResult;
use crate::catchup::paths::resolve_paths;
use crate::catchup::resolve::ChatCandidate;
use crate::catchup::session::{ChatStore, Coordinator, SessionInput, SessionState};
use crate::catchup::transcript::RawMessageRecord;
use crate::commands::CommandReport;
use crate::error::{CatchupError, ErrorKind};
use crate::imessage::clipboard;
use crate::imessage::store::SqliteChatStore;
use anyhow::Result;
use std::env;
use std::io::{BufRead, Read};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Slack on top of the generation timeout before the command gives up on
/// a session that never reached a terminal state.
const SESSION_GRACE_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct DbOptions {
    pub chat: String,
    pub last: Option<u32>,
    pub model: Option<String>,
    pub db_path: Option<PathBuf>,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct ClipboardOptions {
    pub model: Option<String>,
    pub json: bool,
    pub no_wait: bool,
    pub from_stdin: bool,
}

fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn resolve_api_key() -> Option<String> {
    env_non_empty("CATCHUP_API_KEY").or_else(|| env_non_empty("GEMINI_API_KEY"))
}

fn generate_config(
    config: &CatchupConfig,
    model_override: Option<&str>,
    report: &mut CommandReport,
) -> Option<GenerateConfig> {
    let Some(provider) = Provider::from_label(&config.generation.provider) else {
        report.issue(format!(
            "unknown provider `{}`; use `gemini` or `openai`",
            config.generation.provider
        ));
        return None;
    };
    let Some(api_key) = resolve_api_key() else {
        report.issue("no API key; set GEMINI_API_KEY or CATCHUP_API_KEY");
        return None;
    };
    let model = model_override
        .unwrap_or(&config.generation.model)
        .to_string();
    report.detail(format!("provider={} model={model}", provider.label()));
    Some(GenerateConfig {
        provider,
        model,
        api_key,
        base_url: config.generation.base_url.clone(),
        timeout_secs: config.generation.timeout_secs,
    })
}

/// Store stand-in for clipboard mode, which never touches the message
/// store; reaching it would be a coordinator bug.
struct NoStore;

impl ChatStore for NoStore {
    fn list_chats(&self) -> Result<Vec<ChatCandidate>, CatchupError> {
        Err(CatchupError::StoreUnavailable(
            "clipboard mode has no message store".to_string(),
        ))
    }

    fn fetch_messages(
        &self,
        _chat_id: i64,
        _limit: u32,
    ) -> Result<Vec<RawMessageRecord>, CatchupError> {
        Err(CatchupError::StoreUnavailable(
            "clipboard mode has no message store".to_string(),
        ))
    }
}

fn print_summary(result: &SummaryResult) {
    println!("\n=== CATCH-UP SUMMARY ===\n");
    println!("KEY POINTS");
    for bullet in &result.bullets {
        println!("- {bullet}");
    }
    if !result.speaker_map.is_empty() {
        println!("\nWHO SAID WHAT");
        for entry in &result.speaker_map {
            println!("{}: {}", entry.speaker, entry.position);
        }
    }
    if !result.action_items.is_empty() {
        println!("\nACTION ITEMS");
        for item in &result.action_items {
            match &item.deadline {
                Some(deadline) => {
                    println!("- [ ] {} - {} (by {deadline})", item.assignee, item.task)
                }
                None => println!("- [ ] {} - {}", item.assignee, item.task),
            }
        }
    }
}

/// Drive one session to completion, folding phase changes into the report
/// and rendering the parsed summary on success.
fn run_session(
    coordinator: &Coordinator,
    input: SessionInput,
    timeout_secs: u64,
    report: &mut CommandReport,
    json: bool,
) {
    let id = coordinator.start(input);
    let deadline = Instant::now() + Duration::from_secs(timeout_secs + SESSION_GRACE_SECS);
    let mut last_phase = "";

    let terminal = loop {
        let (current_id, state) = coordinator.snapshot();
        if current_id != id {
            report.issue("session was superseded before finishing");
            return;
        }
        let phase = state.phase_label();
        if phase != last_phase {
            report.detail(format!("phase={phase}"));
            last_phase = phase;
        }
        if state.is_terminal() {
            break state;
        }
        if Instant::now() >= deadline {
            coordinator.cancel(id);
            report.issue(format!(
                "session did not finish within {}s",
                timeout_secs + SESSION_GRACE_SECS
            ));
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    match terminal {
        SessionState::Parsed { result } => {
            report.detail(format!("bullets={}", result.bullets.len()));
            if json {
                match serde_json::to_string_pretty(&result) {
                    Ok(rendered) => println!("{rendered}"),
                    Err(err) => report.issue(format!("failed to render JSON: {err}")),
                }
            } else {
                print_summary(&result);
            }
        }
        SessionState::Failed { kind, message } => {
            report.issue(format!("{message} [{}]", kind.as_str()));
            if matches!(kind, ErrorKind::NotFound | ErrorKind::Ambiguous) {
                report.issue("run with the exact group name as shown in Messages");
            }
        }
        SessionState::Cancelled => report.issue("session cancelled"),
        other => report.issue(format!("session ended in unexpected phase {}", other.phase_label())),
    }
}

pub fn run_db(opts: &DbOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("db");
    let config = load_config(&paths)?;

    let Some(gen_config) = generate_config(&config, opts.model.as_deref(), &mut report) else {
        return Ok(report);
    };
    let timeout_secs = gen_config.timeout_secs;

    let db_path = opts.db_path.clone().unwrap_or_else(|| paths.chat_db.clone());
    let store = match SqliteChatStore::open(&db_path) {
        Ok(store) => store,
        Err(err) => {
            report.issue(format!("{err}"));
            return Ok(report);
        }
    };
    let generator = match HttpGenerator::new(gen_config) {
        Ok(generator) => generator,
        Err(err) => {
            report.issue(format!("{err}"));
            return Ok(report);
        }
    };

    report.detail(format!("chat_db={}", db_path.display()));
    let coordinator = Coordinator::new(store, generator, Some(AuditLog::new(paths.logs_dir)));
    let input = SessionInput::Store {
        query: opts.chat.clone(),
        limit: opts.last.unwrap_or(config.fetch.limit),
    };
    run_session(&coordinator, input, timeout_secs, &mut report, opts.json);
    Ok(report)
}

fn read_stdin_to_string() -> Result<String> {
    let mut raw = String::new();
    std::io::stdin().read_to_string(&mut raw)?;
    Ok(raw)
}

fn wait_for_enter() -> Result<()> {
    eprintln!(
        "Clipboard mode: select the messages in Messages.app, then press Enter to continue."
    );
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

pub fn run_clipboard(opts: &ClipboardOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("clipboard");
    let config = load_config(&paths)?;

    let Some(gen_config) = generate_config(&config, opts.model.as_deref(), &mut report) else {
        return Ok(report);
    };
    let timeout_secs = gen_config.timeout_secs;

    // With the pause skipped there is no moment to bring Messages to the
    // front, so ⌘C would hit the wrong app; read the clipboard as-is.
    let captured = if opts.from_stdin {
        read_stdin_to_string().map_err(anyhow::Error::from)
    } else if opts.no_wait {
        clipboard::read_clipboard()
    } else {
        wait_for_enter()?;
        clipboard::capture_selection()
    };
    let raw = match captured {
        Ok(raw) => raw,
        Err(err) => {
            report.issue(format!("clipboard capture failed: {err:#}"));
            return Ok(report);
        }
    };

    let generator = match HttpGenerator::new(gen_config) {
        Ok(generator) => generator,
        Err(err) => {
            report.issue(format!("{err}"));
            return Ok(report);
        }
    };

    let coordinator = Coordinator::new(NoStore, generator, Some(AuditLog::new(paths.logs_dir)));
    run_session(
        &coordinator,
        SessionInput::Clipboard { raw },
        timeout_secs,
        &mut report,
        opts.json,
    );
    Ok(report)
}
