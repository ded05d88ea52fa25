use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use coursechat_stream::StreamFraming;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_THREAD_API_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_STREAM_ERROR_MESSAGE: &str =
    "Sorry, something went wrong while generating a reply. Please try again.";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const SETTINGS_DIRECTORY_NAME: &str = "coursechat";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "COURSECHAT_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_user_block_path")]
    pub user_block_path: String,
    #[serde(default = "default_workflow_path")]
    pub workflow_path: String,
    #[serde(default = "default_legacy_path")]
    pub legacy_path: String,
    #[serde(default = "default_thread_api_base_url")]
    pub thread_api_base_url: String,
    #[serde(default)]
    pub thread_api_key: String,
    #[serde(default = "default_generation_path")]
    pub generation_path: String,
    #[serde(default)]
    pub stream_framing: StreamFraming,
    #[serde(default = "default_report_path")]
    pub report_path: String,
    #[serde(default = "default_grading_path")]
    pub grading_path: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_stream_error_message")]
    pub stream_error_message: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            user_block_path: default_user_block_path(),
            workflow_path: default_workflow_path(),
            legacy_path: default_legacy_path(),
            thread_api_base_url: default_thread_api_base_url(),
            thread_api_key: String::new(),
            generation_path: default_generation_path(),
            stream_framing: StreamFraming::default(),
            report_path: default_report_path(),
            grading_path: default_grading_path(),
            request_timeout_secs: default_request_timeout_secs(),
            stream_error_message: default_stream_error_message(),
        }
    }
}

impl SessionSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn endpoint_url(&self, path: &str) -> String {
        let base = self.api_base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    pub fn normalized(mut self) -> Self {
        fn or_default(value: String, default: fn() -> String) -> String {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                default()
            } else {
                trimmed.to_string()
            }
        }

        self.api_base_url = or_default(self.api_base_url, default_api_base_url);
        self.user_block_path = or_default(self.user_block_path, default_user_block_path);
        self.workflow_path = or_default(self.workflow_path, default_workflow_path);
        self.legacy_path = or_default(self.legacy_path, default_legacy_path);
        self.thread_api_base_url =
            or_default(self.thread_api_base_url, default_thread_api_base_url);
        self.thread_api_key = self.thread_api_key.trim().to_string();
        self.generation_path = or_default(self.generation_path, default_generation_path);
        self.report_path = or_default(self.report_path, default_report_path);
        self.grading_path = or_default(self.grading_path, default_grading_path);
        self.stream_error_message =
            or_default(self.stream_error_message, default_stream_error_message);
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }

        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<SessionSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".coursechat"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<SessionSettings> {
        self.settings.load_full()
    }

    /// Re-reads the layered configuration and swaps it in for later sessions.
    pub fn reload(&self) -> Arc<SessionSettings> {
        let settings = Arc::new(Self::load_from_disk(&self.config_path));
        self.settings.store(settings.clone());
        settings
    }

    fn load_from_disk(path: &Path) -> SessionSettings {
        let mut figment = Figment::from(Serialized::defaults(SessionSettings::default()));
        if path.exists() {
            figment = figment.merge(Json::file(path));
        } else {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        match figment.extract::<SessionSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                SessionSettings::default()
            }
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_user_block_path() -> String {
    "user_blocks/lookup".to_string()
}

fn default_workflow_path() -> String {
    "workflow_state".to_string()
}

fn default_legacy_path() -> String {
    "air".to_string()
}

fn default_thread_api_base_url() -> String {
    DEFAULT_THREAD_API_BASE_URL.to_string()
}

fn default_generation_path() -> String {
    "chat/stream".to_string()
}

fn default_report_path() -> String {
    "reports".to_string()
}

fn default_grading_path() -> String {
    "grading".to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_stream_error_message() -> String {
    DEFAULT_STREAM_ERROR_MESSAGE.to_string()
}
