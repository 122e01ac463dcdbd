use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct CatchupPaths {
    pub home: PathBuf,
    pub logs_dir: PathBuf,
    pub config_file: PathBuf,
    pub chat_db: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<CatchupPaths> {
    let home = required_home_dir()?;
    let catchup_home = env_or_default_path("CATCHUP_HOME", home.join(".catchup"));

    let logs_dir = env_or_default_path("CATCHUP_LOGS_DIR", catchup_home.join("logs"));
    let config_file = env_or_default_path("CATCHUP_CONFIG_FILE", catchup_home.join("config.toml"));
    let chat_db = env_or_default_path("CATCHUP_CHAT_DB", home.join("Library/Messages/chat.db"));

    Ok(CatchupPaths {
        home: catchup_home,
        logs_dir,
        config_file,
        chat_db,
    })
}
