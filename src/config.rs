//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or the path given with `-f`), then applies `VOICE_AGENT_WORK_DIR` and
//! `VOICE_AGENT_LOG_LEVEL` env overrides. API keys come from the environment
//! only, never from TOML.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::AppError;
use crate::logger;
use crate::llm::RetryPolicy;
use crate::llm::extract::FALLBACK_REPLY;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

use crate::llm::providers::HUGGINGFACE_API_KEY_ENV as LLM_API_KEY_ENV;
use crate::voice::stt::STT_API_KEY_ENV;
use crate::voice::tts::TTS_API_KEY_ENV;

/// Hugging Face inference provider configuration (`[llm.huggingface]`).
#[derive(Debug, Clone)]
pub struct HuggingFaceConfig {
    /// Base URL; the model id is appended as a path segment.
    pub api_base_url: String,
    pub model: String,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// Text-generation configuration (`[llm]`).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"dummy"`, `"huggingface"`).
    /// Maps to `default` in `[llm]` TOML.
    pub provider: String,
    pub max_retries: u32,
    pub backoff_factor: f64,
    /// Base unit the exponential backoff is multiplied into.
    pub backoff_unit_ms: u64,
    /// Overall deadline for one exchange; `0` disables it.
    pub deadline_seconds: u64,
    /// Reply used when the model answers without usable text.
    pub fallback_reply: String,
    pub huggingface: HuggingFaceConfig,
}

impl LlmConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_factor: self.backoff_factor,
            backoff_unit: Duration::from_millis(self.backoff_unit_ms),
            deadline: (self.deadline_seconds > 0).then(|| Duration::from_secs(self.deadline_seconds)),
        }
    }
}

/// Speech-to-text collaborator (`[voice.stt]`).
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub enabled: bool,
    pub api_url: String,
    pub model: String,
    pub timeout_seconds: u64,
}

/// Text-to-speech collaborator (`[voice.tts]`).
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub enabled: bool,
    /// Base URL; the voice id is appended as a path segment.
    pub api_url: String,
    pub voice_id: String,
    pub format: String,
    /// Audio reference returned when synthesis fails.
    pub fallback_audio_url: Option<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub stt: SttConfig,
    pub tts: TtsConfig,
}

/// PTY (console) channel configuration.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    pub enabled: bool,
}

/// HTTP channel configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    /// Socket address to bind the HTTP channel to.
    pub bind: String,
}

#[derive(Debug, Clone)]
pub struct CommsConfig {
    pub pty: PtyConfig,
    pub http: HttpConfig,
}

/// Conversation log locations, already resolved against `work_dir`.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub log_file: PathBuf,
    pub audio_dir: PathBuf,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub agent_name: String,
    /// Working directory for all persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    /// Seed system turn for new conversations.
    pub system_prompt: Option<String>,
    pub llm: LlmConfig,
    pub voice: VoiceConfig,
    pub comms: CommsConfig,
    pub store: StoreConfig,
    /// From `HUGGINGFACE_API_KEY`.
    pub llm_api_key: Option<String>,
    /// From `DEEPGRAM_API_KEY`.
    pub stt_api_key: Option<String>,
    /// From `ELEVENLABS_API_KEY`.
    pub tts_api_key: Option<String>,
}

impl Config {
    pub fn comms_pty_should_load(&self) -> bool {
        self.comms.pty.enabled
    }

    pub fn comms_http_should_load(&self) -> bool {
        self.comms.http.enabled
    }
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawConfig {
    agent: RawAgent,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    voice: RawVoice,
    #[serde(default)]
    comms: RawComms,
    #[serde(default)]
    store: RawStore,
}

#[derive(Deserialize)]
struct RawAgent {
    name: String,
    work_dir: String,
    log_level: String,
    #[serde(default)]
    system_prompt: Option<String>,
}

#[derive(Deserialize)]
struct RawLlm {
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default = "default_backoff_factor")]
    backoff_factor: f64,
    #[serde(default = "default_backoff_unit_ms")]
    backoff_unit_ms: u64,
    #[serde(default = "default_deadline_seconds")]
    deadline_seconds: u64,
    #[serde(default = "default_fallback_reply")]
    fallback_reply: String,
    #[serde(default)]
    huggingface: RawHuggingFace,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
            backoff_unit_ms: default_backoff_unit_ms(),
            deadline_seconds: default_deadline_seconds(),
            fallback_reply: default_fallback_reply(),
            huggingface: RawHuggingFace::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawHuggingFace {
    #[serde(default = "default_hf_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_hf_model")]
    model: String,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawHuggingFace {
    fn default() -> Self {
        Self {
            api_base_url: default_hf_api_base_url(),
            model: default_hf_model(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawVoice {
    #[serde(default)]
    stt: RawStt,
    #[serde(default)]
    tts: RawTts,
}

#[derive(Deserialize)]
struct RawStt {
    #[serde(default = "default_false")]
    enabled: bool,
    #[serde(default = "default_stt_api_url")]
    api_url: String,
    #[serde(default = "default_stt_model")]
    model: String,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawStt {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_stt_api_url(),
            model: default_stt_model(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawTts {
    #[serde(default = "default_false")]
    enabled: bool,
    #[serde(default = "default_tts_api_url")]
    api_url: String,
    #[serde(default = "default_tts_voice_id")]
    voice_id: String,
    #[serde(default = "default_tts_format")]
    format: String,
    #[serde(default)]
    fallback_audio_url: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawTts {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_tts_api_url(),
            voice_id: default_tts_voice_id(),
            format: default_tts_format(),
            fallback_audio_url: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawComms {
    #[serde(default)]
    pty: RawPty,
    #[serde(default)]
    http: RawHttp,
}

#[derive(Deserialize)]
struct RawPty {
    /// Defaults to `true`. `-n`/`--no-console` turns the console off for one
    /// run regardless of this value.
    #[serde(default = "default_true")]
    enabled: bool,
}

impl Default for RawPty {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Deserialize)]
struct RawHttp {
    /// Defaults to `false`: HTTP must be explicitly enabled.
    #[serde(default = "default_false")]
    enabled: bool,
    #[serde(default = "default_http_bind")]
    bind: String,
}

impl Default for RawHttp {
    fn default() -> Self {
        Self { enabled: false, bind: default_http_bind() }
    }
}

#[derive(Deserialize)]
struct RawStore {
    #[serde(default = "default_log_file")]
    log_file: String,
    #[serde(default = "default_audio_dir")]
    audio_dir: String,
}

impl Default for RawStore {
    fn default() -> Self {
        Self { log_file: default_log_file(), audio_dir: default_audio_dir() }
    }
}

fn default_llm_provider() -> String { "dummy".to_string() }
fn default_max_retries() -> u32 { 3 }
fn default_backoff_factor() -> f64 { 2.0 }
fn default_backoff_unit_ms() -> u64 { 1000 }
fn default_deadline_seconds() -> u64 { 60 }
fn default_fallback_reply() -> String { FALLBACK_REPLY.to_string() }
fn default_hf_api_base_url() -> String { "https://api-inference.huggingface.co/models".to_string() }
fn default_hf_model() -> String { "facebook/blenderbot-400M-distill".to_string() }
fn default_timeout_seconds() -> u64 { 30 }
fn default_stt_api_url() -> String { "https://api.deepgram.com/v1/listen".to_string() }
fn default_stt_model() -> String { "nova".to_string() }
fn default_tts_api_url() -> String { "https://api.elevenlabs.io/v1/text-to-speech".to_string() }
fn default_tts_voice_id() -> String { "9BWtsMINqrJLrRacOk9x".to_string() }
fn default_tts_format() -> String { "mp3".to_string() }
fn default_http_bind() -> String { "127.0.0.1:8080".to_string() }
fn default_log_file() -> String { "conversation_log.json".to_string() }
fn default_audio_dir() -> String { "audio".to_string() }

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load config from `path` (or `config/default.toml`), then apply env-var
/// overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let work_dir_override = env::var("VOICE_AGENT_WORK_DIR").ok();
    let log_level_override = env::var("VOICE_AGENT_LOG_LEVEL").ok();
    load_from(
        Path::new(path.unwrap_or(DEFAULT_CONFIG_PATH)),
        work_dir_override.as_deref(),
        log_level_override.as_deref(),
    )
}

/// Loader behind [`load`]: explicit path and overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    validate_llm(&parsed.llm)?;

    let a = parsed.agent;
    let work_dir = expand_home(work_dir_override.unwrap_or(&a.work_dir));
    let log_level = log_level_override.unwrap_or(&a.log_level).to_string();
    logger::parse_level(&log_level).map_err(|e| AppError::Config(format!("agent.log_level: {e}")))?;

    let store = StoreConfig {
        log_file: resolve_in(&work_dir, &parsed.store.log_file),
        audio_dir: resolve_in(&work_dir, &parsed.store.audio_dir),
    };

    Ok(Config {
        agent_name: a.name,
        work_dir,
        log_level,
        system_prompt: a.system_prompt.filter(|p| !p.trim().is_empty()),
        llm: LlmConfig {
            provider: parsed.llm.provider,
            max_retries: parsed.llm.max_retries,
            backoff_factor: parsed.llm.backoff_factor,
            backoff_unit_ms: parsed.llm.backoff_unit_ms,
            deadline_seconds: parsed.llm.deadline_seconds,
            fallback_reply: parsed.llm.fallback_reply,
            huggingface: HuggingFaceConfig {
                api_base_url: parsed.llm.huggingface.api_base_url,
                model: parsed.llm.huggingface.model,
                timeout_seconds: parsed.llm.huggingface.timeout_seconds,
            },
        },
        voice: VoiceConfig {
            stt: SttConfig {
                enabled: parsed.voice.stt.enabled,
                api_url: parsed.voice.stt.api_url,
                model: parsed.voice.stt.model,
                timeout_seconds: parsed.voice.stt.timeout_seconds,
            },
            tts: TtsConfig {
                enabled: parsed.voice.tts.enabled,
                api_url: parsed.voice.tts.api_url,
                voice_id: parsed.voice.tts.voice_id,
                format: parsed.voice.tts.format,
                fallback_audio_url: parsed.voice.tts.fallback_audio_url,
                timeout_seconds: parsed.voice.tts.timeout_seconds,
            },
        },
        comms: CommsConfig {
            pty: PtyConfig { enabled: parsed.comms.pty.enabled },
            http: HttpConfig {
                enabled: parsed.comms.http.enabled,
                bind: parsed.comms.http.bind,
            },
        },
        store,
        llm_api_key: env::var(LLM_API_KEY_ENV).ok(),
        stt_api_key: env::var(STT_API_KEY_ENV).ok(),
        tts_api_key: env::var(TTS_API_KEY_ENV).ok(),
    })
}

fn validate_llm(llm: &RawLlm) -> Result<(), AppError> {
    if llm.max_retries == 0 {
        return Err(AppError::Config("llm.max_retries must be at least 1".into()));
    }
    if !llm.backoff_factor.is_finite() || llm.backoff_factor < 1.0 {
        return Err(AppError::Config(format!(
            "llm.backoff_factor must be a finite number >= 1.0, got {}",
            llm.backoff_factor
        )));
    }
    Ok(())
}

/// Absolute paths are kept; relative ones are joined onto `work_dir`.
fn resolve_in(work_dir: &Path, path: &str) -> PathBuf {
    let p = expand_home(path);
    if p.is_absolute() { p } else { work_dir.join(p) }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// `LlmConfig` for unit tests: dummy provider, millisecond backoff.
#[cfg(test)]
impl LlmConfig {
    pub fn test_default() -> Self {
        Self {
            provider: "dummy".into(),
            max_retries: 3,
            backoff_factor: 2.0,
            backoff_unit_ms: 1,
            deadline_seconds: 5,
            fallback_reply: FALLBACK_REPLY.into(),
            huggingface: HuggingFaceConfig {
                api_base_url: "http://localhost:0/models".into(),
                model: "test-model".into(),
                timeout_seconds: 1,
            },
        }
    }
}
