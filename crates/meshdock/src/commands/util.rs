//! Shared helpers for command handlers.

use std::io::Read;
use std::path::PathBuf;

use meshdock_config::Config;
use meshdock_core::FileStore;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file selected by `--config`, else the platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(meshdock_config::config_path)
}

/// Load config from the selected file + environment.
pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(meshdock_config::load_config_from(&config_file(global))?)
}

/// State file selected by `--state`, else the config's.
pub fn state_file(global: &GlobalOpts, cfg: &Config) -> PathBuf {
    global.state.clone().unwrap_or_else(|| cfg.state_path())
}

/// Open the stack's persisted key/value state.
pub fn open_state(global: &GlobalOpts) -> Result<FileStore, CliError> {
    let cfg = load_config(global)?;
    let path = state_file(global, &cfg);
    tracing::debug!(path = %path.display(), "opening state file");
    Ok(FileStore::new(path))
}

/// Read a file argument, `-` meaning stdin.
pub fn read_input(file: &str) -> Result<String, CliError> {
    if file == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    Ok(std::fs::read_to_string(file)?)
}
