use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::dialogue::prompts::{default_prompt_files, DEFAULT_PROMPTS_DIR};

pub const CONFIG_FILE_NAME: &str = "docfill.toml";
pub const CONFIG_ENV: &str = "DOCFILL_CONFIG";

pub const DEFAULT_BASE_URL: &str = "https://api.cohere.ai/compatibility/v1";
pub const DEFAULT_MODEL: &str = "command-r-plus-08-2024";
pub const DEFAULT_API_KEY_ENV: &str = "COHERE_API_KEY";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub chat: ChatSection,
    #[serde(default)]
    pub prompts: PromptsSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ChatSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// Optional prompt file overrides, relative to the config file's directory.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub first_question: Option<String>,
    #[serde(default)]
    pub next_question: Option<String>,
    #[serde(default)]
    pub all_done: Option<String>,
}

/// Effective collaborator settings after defaults and overrides.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatSettings {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            temperature: None,
        }
    }
}

impl ChatSettings {
    pub fn from_section(section: &ChatSection) -> Self {
        let defaults = Self::default();
        Self {
            base_url: non_empty(section.base_url.as_deref()).unwrap_or(defaults.base_url),
            model: non_empty(section.model.as_deref()).unwrap_or(defaults.model),
            api_key_env: non_empty(section.api_key_env.as_deref()).unwrap_or(defaults.api_key_env),
            timeout_secs: section
                .timeout_secs
                .filter(|s| *s > 0)
                .unwrap_or(defaults.timeout_secs),
            temperature: section.temperature,
        }
    }

    /// Reads the API key from the configured environment variable.
    pub fn api_key(&self) -> anyhow::Result<String> {
        let key = std::env::var(&self.api_key_env)
            .map_err(|_| anyhow!("{} not set (environment or .env)", self.api_key_env))?;
        if key.trim().is_empty() {
            return Err(anyhow!("{} is empty", self.api_key_env));
        }
        Ok(key)
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Loaded configuration plus the path it came from (or would have come from).
#[derive(Clone, Debug)]
pub struct ResolvedConfig {
    pub path: PathBuf,
    pub found: bool,
    pub app: AppConfig,
}

impl ResolvedConfig {
    pub fn config_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings::from_section(&self.app.chat)
    }
}

/// Explicit path, then `DOCFILL_CONFIG`, then an upward search. No file means defaults.
pub fn resolve_config(explicit: Option<PathBuf>, workdir: &Path) -> anyhow::Result<ResolvedConfig> {
    let candidate = explicit
        .clone()
        .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
        .or_else(|| find_default_config(workdir, CONFIG_FILE_NAME));

    match candidate {
        Some(path) if path.exists() => {
            let app = load_config(&path)?;
            Ok(ResolvedConfig {
                path,
                found: true,
                app,
            })
        }
        Some(path) if explicit.is_some() => {
            Err(anyhow!("config file not found: {}", path.display()))
        }
        _ => Ok(ResolvedConfig {
            path: workdir.join(CONFIG_FILE_NAME),
            found: false,
            app: AppConfig::default(),
        }),
    }
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    let exe = std::env::current_exe().ok()?;
    find_file_upwards(exe.parent()?, filename, 4)
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text)
        .with_context(|| format!("parse config toml: {}", path.display()))?;
    Ok(cfg)
}

/// Writes `docfill.toml` and the default prompt files into `dir`.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;

    let prompts_dir = dir.join(DEFAULT_PROMPTS_DIR);
    std::fs::create_dir_all(&prompts_dir)
        .with_context(|| format!("create prompts dir: {}", prompts_dir.display()))?;
    for (fname, body) in default_prompt_files() {
        let p = prompts_dir.join(fname);
        if p.exists() && !force {
            continue;
        }
        std::fs::write(&p, body).with_context(|| format!("write prompt: {}", p.display()))?;
    }

    let cfg_path = dir.join(CONFIG_FILE_NAME);
    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, default_config_toml())
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

fn default_config_toml() -> String {
    format!(
        r#"[chat]
# Any endpoint speaking the OpenAI chat/completions dialect.
base_url = "{DEFAULT_BASE_URL}"
model = "{DEFAULT_MODEL}"
# The key itself is read from this environment variable (a .env file works too).
api_key_env = "{DEFAULT_API_KEY_ENV}"
timeout_secs = {DEFAULT_TIMEOUT_SECS}
# temperature = 0.3

[prompts]
system = "{DEFAULT_PROMPTS_DIR}/system.txt"
first_question = "{DEFAULT_PROMPTS_DIR}/first_question.txt"
next_question = "{DEFAULT_PROMPTS_DIR}/next_question.txt"
all_done = "{DEFAULT_PROMPTS_DIR}/all_done.txt"
"#
    )
}
