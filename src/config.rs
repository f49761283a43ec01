use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

/// Quiet interval after the last edit before a pass runs.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Settings consumed by the previewer for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewConfig {
    /// Global "preview images" switch, re-read on every timer firing.
    pub preview_images: bool,
    pub debounce: Duration,
    /// Directory relative image targets are resolved against.
    pub base_dir: PathBuf,
}

impl PreviewConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            preview_images: true,
            debounce: DEFAULT_DEBOUNCE,
            base_dir: base_dir.into(),
        }
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub fn with_preview_images(mut self, enabled: bool) -> Self {
        self.preview_images = enabled;
        self
    }

    /// Build from effective flags for the document at `file_path`.
    pub fn from_flags(flags: &ConfigFlags, file_path: &Path) -> Self {
        let base_dir = file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let debounce = flags
            .debounce_ms
            .map_or(DEFAULT_DEBOUNCE, Duration::from_millis);
        Self::new(base_dir)
            .with_debounce(debounce)
            .with_preview_images(!flags.no_images)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigFlags {
    pub watch: bool,
    pub no_images: bool,
    pub perf: bool,
    pub debounce_ms: Option<u64>,
    pub debug_log: Option<PathBuf>,
}

impl ConfigFlags {
    pub fn union(&self, other: &Self) -> Self {
        Self {
            watch: self.watch || other.watch,
            no_images: self.no_images || other.no_images,
            perf: self.perf || other.perf,
            debounce_ms: other.debounce_ms.or(self.debounce_ms),
            debug_log: other
                .debug_log
                .clone()
                .or_else(|| self.debug_log.clone()),
        }
    }
}

pub fn global_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata)
                .join("markless-preview")
                .join("config");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("markless-preview")
                .join("config");
        }
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("markless-preview").join("config");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join(".config")
                .join("markless-preview")
                .join("config");
        }
    }

    local_override_path()
}

pub fn local_override_path() -> PathBuf {
    PathBuf::from(".marklesspreviewrc")
}

pub fn load_config_flags(path: &Path) -> Result<ConfigFlags> {
    if !path.exists() {
        return Ok(ConfigFlags::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let tokens = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(split_config_line)
        .collect::<Vec<_>>();
    Ok(parse_flag_tokens(&tokens))
}

pub fn save_config_flags(path: &Path, flags: &ConfigFlags) -> Result<()> {
    let mut lines = vec!["# markless-preview defaults (saved with --save)".to_string()];
    if flags.watch {
        lines.push("--watch".to_string());
    }
    if flags.no_images {
        lines.push("--no-images".to_string());
    }
    if flags.perf {
        lines.push("--perf".to_string());
    }
    if let Some(ms) = flags.debounce_ms {
        lines.push(format!("--debounce-ms {ms}"));
    }
    if let Some(path) = &flags.debug_log {
        lines.push(format!("--debug-log {}", quote_config_value(&path.display().to_string())));
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
    }
    fs::write(path, format!("{}\n", lines.join("\n")))
        .with_context(|| format!("Failed to write config {}", path.display()))
}

pub fn clear_config_flags(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

/// Split a config line on whitespace. Double quotes group a value that
/// contains spaces; `\"` and `\\` escape inside quotes.
fn split_config_line(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            '\\' if quoted => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ch if ch.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            ch => {
                current.push(ch);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

fn quote_config_value(value: &str) -> String {
    if !value.is_empty() && !value.contains(|c: char| c.is_whitespace() || c == '"') {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Pick known flags out of raw tokens; unknown tokens are skipped.
pub fn parse_flag_tokens(tokens: &[String]) -> ConfigFlags {
    let mut flags = ConfigFlags::default();
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i].as_str();
        match token {
            "--watch" | "-w" => flags.watch = true,
            "--no-images" => flags.no_images = true,
            "--perf" => flags.perf = true,
            "--debounce-ms" => {
                if let Some(next) = tokens.get(i + 1) {
                    flags.debounce_ms = next.parse().ok();
                    i += 1;
                }
            }
            "--debug-log" => {
                if let Some(next) = tokens.get(i + 1) {
                    flags.debug_log = Some(PathBuf::from(next));
                    i += 1;
                }
            }
            _ => {
                if let Some(value) = token.strip_prefix("--debounce-ms=") {
                    flags.debounce_ms = value.parse().ok();
                } else if let Some(value) = token.strip_prefix("--debug-log=") {
                    flags.debug_log = Some(PathBuf::from(value));
                }
            }
        }
        i += 1;
    }
    flags
}
