use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Command;

/// Copies the current selection in Messages.app (⌘C) and returns the
/// clipboard text. Messages must be frontmost with a selection made.
const COPY_SELECTION_SCRIPT: &str = r#"
tell application "System Events"
    keystroke "c" using {command down}
end tell
delay 0.15
set theClipboard to the clipboard
return theClipboard
"#;

const READ_CLIPBOARD_SCRIPT: &str = "return the clipboard";

fn resolve_osascript_bin() -> Result<PathBuf> {
    which::which("osascript")
        .context("osascript not found; clipboard mode requires macOS")
}

fn run_osascript(script: &str) -> Result<String> {
    let bin = resolve_osascript_bin()?;
    let out = Command::new(&bin)
        .arg("-e")
        .arg(script)
        .output()
        .with_context(|| format!("failed to run {}", bin.display()))?;
    if !out.status.success() {
        anyhow::bail!(
            "osascript failed: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}

/// Send ⌘C to the frontmost app and read back the clipboard. An empty
/// selection comes back as empty text; deciding that is an error belongs
/// to the session, not this adapter.
pub fn capture_selection() -> Result<String> {
    run_osascript(COPY_SELECTION_SCRIPT)
}

/// Read the clipboard without touching the current selection.
pub fn read_clipboard() -> Result<String> {
    run_osascript(READ_CLIPBOARD_SCRIPT)
}
