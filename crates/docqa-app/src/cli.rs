//! CLI argument definitions for the docqa binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::{Path, PathBuf};

/// docqa - chat with a folder of Markdown documents.
#[derive(Parser, Debug)]
#[command(name = "docqa", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Directory holding the Markdown documents to index.
    #[arg(short = 'd', long = "docs-dir")]
    pub docs_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Ignore any persisted index snapshot and re-embed every chunk.
    #[arg(long = "rebuild-index")]
    pub rebuild_index: bool,
}

impl CliArgs {
    /// Priority: --config flag > DOCQA_CONFIG env var > ~/.docqa/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("DOCQA_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Priority: --port flag > DOCQA_PORT env var > config file value.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        let env_port = std::env::var("DOCQA_PORT").ok();
        pick_port(self.port, env_port.as_deref(), config_port)
    }

    pub fn resolve_docs_dir(&self) -> Option<String> {
        self.docs_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| config_level.to_string())
    }
}

fn pick_port(cli: Option<u16>, env: Option<&str>, config_port: u16) -> u16 {
    if let Some(p) = cli {
        return p;
    }
    if let Some(p) = env.and_then(|v| v.trim().parse::<u16>().ok()) {
        return p;
    }
    config_port
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Place a relative `path` under `base`; absolute and `~` paths stand alone.
pub fn resolve_under(base: &Path, path: &str) -> PathBuf {
    base.join(expand_home(path))
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.ok().map(PathBuf::from)
}

fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".docqa").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_all_flags() {
        let args = CliArgs::try_parse_from([
            "docqa",
            "-c",
            "/tmp/docqa.toml",
            "--port",
            "9000",
            "-d",
            "notes",
            "-l",
            "debug",
            "--rebuild-index",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/tmp/docqa.toml")));
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.resolve_docs_dir().as_deref(), Some("notes"));
        assert_eq!(args.resolve_log_level("info"), "debug");
        assert!(args.rebuild_index);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/docqa.toml"));
    }

    #[test]
    fn test_defaults_when_no_flags() {
        let args = CliArgs::try_parse_from(["docqa"]).unwrap();
        assert!(args.config.is_none());
        assert!(!args.rebuild_index);
        assert!(args.resolve_docs_dir().is_none());
        assert_eq!(args.resolve_log_level("warn"), "warn");
    }

    #[test]
    fn test_rejects_invalid_port() {
        assert!(CliArgs::try_parse_from(["docqa", "--port", "99999"]).is_err());
    }

    #[test]
    fn test_port_priority() {
        assert_eq!(pick_port(Some(9000), Some("9100"), 8501), 9000);
        assert_eq!(pick_port(None, Some("9100"), 8501), 9100);
        assert_eq!(pick_port(None, Some("not-a-port"), 8501), 8501);
        assert_eq!(pick_port(None, None, 8501), 8501);
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("docs"), PathBuf::from("docs"));
        assert_eq!(expand_home("/abs/index"), PathBuf::from("/abs/index"));
    }

    #[test]
    fn test_resolve_under_data_dir() {
        let base = Path::new("/var/lib/docqa");
        assert_eq!(
            resolve_under(base, "index_persist"),
            PathBuf::from("/var/lib/docqa/index_persist")
        );
        assert_eq!(resolve_under(base, "/srv/index"), PathBuf::from("/srv/index"));
    }
}
