use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

pub mod duration;

pub const ENV_PREFIX: &str = "HOARDER";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub log: LogConfig,
    #[serde(default)]
    pub firefly: Option<FireflyConfig>,
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
    #[serde(default)]
    pub stdin: bool,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub tinkoff: Option<TinkoffConfig>,
    #[serde(default)]
    pub lkdr: Option<LkdrConfig>,
    #[serde(default)]
    pub captcha: Option<CaptchaConfig>,
    #[serde(default)]
    pub selenium: Option<SeleniumConfig>,
    #[serde(default)]
    pub dump: DumpConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEncoding {
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    pub level: String,
    pub encoding: LogEncoding,
    pub add_source: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FireflyConfig {
    pub server_url: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    #[serde(with = "duration", default = "ScheduleConfig::default_interval")]
    pub interval: Duration,
    /// User id to the job ids run for that user on every tick.
    #[serde(default)]
    pub users: BTreeMap<String, Vec<String>>,
}

impl ScheduleConfig {
    const fn default_interval() -> Duration {
        Duration::from_secs(60 * 60)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    pub token: String,
    #[serde(default = "TelegramConfig::default_api_url")]
    pub api_url: String,
    /// Telegram sender id to user id.
    #[serde(default)]
    pub users: BTreeMap<String, String>,
    #[serde(with = "duration", default = "TelegramConfig::default_poll_timeout")]
    pub poll_timeout: Duration,
    #[serde(with = "duration", default = "TelegramConfig::default_typing_interval")]
    pub typing_interval: Duration,
}

impl TelegramConfig {
    fn default_api_url() -> String {
        "https://api.telegram.org".to_owned()
    }

    const fn default_poll_timeout() -> Duration {
        Duration::from_secs(30)
    }

    const fn default_typing_interval() -> Duration {
        Duration::from_secs(4)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "DatabaseConfig::default_max_connections")]
    pub max_connections: u8,
}

impl DatabaseConfig {
    const fn default_max_connections() -> u8 {
        4
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TinkoffAuth {
    #[default]
    Api,
    Browser,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TinkoffCredentials {
    pub phone: String,
    pub password: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TinkoffConfig {
    pub database: DatabaseConfig,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(with = "duration", default = "default_overlap")]
    pub overlap: Duration,
    #[serde(default = "default_true")]
    pub with_receipts: bool,
    #[serde(default)]
    pub auth: TinkoffAuth,
    #[serde(with = "duration", default = "TinkoffConfig::default_ping_interval")]
    pub ping_interval: Duration,
    #[serde(default = "TinkoffConfig::default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "TinkoffConfig::default_api_url")]
    pub api_url: String,
    #[serde(default = "TinkoffConfig::default_invest_url")]
    pub invest_url: String,
    #[serde(default = "TinkoffConfig::default_login_url")]
    pub login_url: String,
    /// User id to the bank logins harvested for that user.
    #[serde(default)]
    pub users: BTreeMap<String, Vec<TinkoffCredentials>>,
}

impl TinkoffConfig {
    const fn default_ping_interval() -> Duration {
        Duration::from_secs(60)
    }

    const fn default_retry_attempts() -> u32 {
        5
    }

    fn default_api_url() -> String {
        "https://www.tinkoff.ru/api/common/v1".to_owned()
    }

    fn default_invest_url() -> String {
        "https://www.tinkoff.ru/api/invest-gw".to_owned()
    }

    fn default_login_url() -> String {
        "https://www.tinkoff.ru/login/".to_owned()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LkdrCredentials {
    pub phone: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LkdrConfig {
    pub database: DatabaseConfig,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(with = "duration", default = "default_overlap")]
    pub overlap: Duration,
    #[serde(default = "LkdrConfig::default_api_url")]
    pub api_url: String,
    /// Site key of the captcha guarding the SMS challenge.
    #[serde(default)]
    pub captcha_site_key: Option<String>,
    #[serde(default = "LkdrConfig::default_captcha_page_url")]
    pub captcha_page_url: String,
    #[serde(default)]
    pub users: BTreeMap<String, Vec<LkdrCredentials>>,
}

impl LkdrConfig {
    fn default_api_url() -> String {
        "https://mco.nalog.ru/api/v1".to_owned()
    }

    fn default_captcha_page_url() -> String {
        "https://lkdr.nalog.ru/login".to_owned()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CaptchaConfig {
    pub key: String,
    #[serde(default = "CaptchaConfig::default_api_url")]
    pub api_url: String,
    #[serde(with = "duration", default = "CaptchaConfig::default_poll_interval")]
    pub poll_interval: Duration,
    #[serde(with = "duration", default = "CaptchaConfig::default_timeout")]
    pub timeout: Duration,
}

impl CaptchaConfig {
    fn default_api_url() -> String {
        "https://rucaptcha.com".to_owned()
    }

    const fn default_poll_interval() -> Duration {
        Duration::from_secs(5)
    }

    const fn default_timeout() -> Duration {
        Duration::from_secs(180)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Browser {
    #[default]
    Firefox,
    Chrome,
    Chromium,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SeleniumConfig {
    /// WebDriver endpoint of a running Selenium server or browser driver.
    #[serde(default = "SeleniumConfig::default_url")]
    pub url: String,
    #[serde(default)]
    pub browser: Browser,
    #[serde(default)]
    pub binary: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(with = "duration", default = "SeleniumConfig::default_timeout")]
    pub timeout: Duration,
}

impl SeleniumConfig {
    fn default_url() -> String {
        "http://localhost:4444".to_owned()
    }

    const fn default_timeout() -> Duration {
        Duration::from_secs(120)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DumpConfig {
    #[serde(default)]
    pub values: bool,
}

const fn default_batch_size() -> usize {
    100
}

const fn default_overlap() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

const fn default_true() -> bool {
    true
}

/// Format of a configuration document piped through stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinFormat {
    Yaml,
    Json,
    Toml,
}

impl From<StdinFormat> for FileFormat {
    fn from(format: StdinFormat) -> Self {
        match format {
            StdinFormat::Yaml => Self::Yaml,
            StdinFormat::Json => Self::Json,
            StdinFormat::Toml => Self::Toml,
        }
    }
}

/// Configuration sources named on the command line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Sources {
    pub files: Vec<PathBuf>,
    pub stdin: Option<StdinFormat>,
    pub overrides: Vec<(String, String)>,
}

impl Sources {
    /// ## Summary
    /// Parses `--a.b.c=value` arguments. `config.file` (repeatable) and `config.stdin` select
    /// sources; every other key is an override applied last.
    ///
    /// ## Errors
    /// Returns [`CoreError::ConfigError`] for malformed arguments or an unknown stdin format.
    pub fn from_args<I, S>(args: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sources = Self::default();
        for arg in args {
            let arg = arg.as_ref();
            let (key, value) = arg
                .strip_prefix("--")
                .and_then(|rest| rest.split_once('='))
                .ok_or_else(|| CoreError::ConfigError(format!("expected --key=value, got {arg:?}")))?;

            match key {
                "config.file" => sources.files.push(PathBuf::from(value)),
                "config.stdin" => {
                    sources.stdin = Some(match value {
                        "yaml" | "yml" => StdinFormat::Yaml,
                        "json" => StdinFormat::Json,
                        "toml" => StdinFormat::Toml,
                        other => {
                            return Err(CoreError::ConfigError(format!(
                                "unsupported stdin format {other:?}"
                            )));
                        }
                    });
                }
                _ => sources.overrides.push((key.to_owned(), value.to_owned())),
            }
        }
        Ok(sources)
    }
}

impl Settings {
    /// ## Summary
    /// Builds settings from defaults, `HOARDER_*` environment variables, files, stdin and
    /// argument overrides, in that order of precedence (later wins).
    ///
    /// ## Errors
    /// Returns an error if a source cannot be read, a value does not deserialize, an unknown
    /// property is present, or validation fails.
    pub fn load(sources: &Sources, stdin: Option<&str>) -> Result<Self> {
        Self::build(sources, stdin, None)
    }

    fn build(
        sources: &Sources,
        stdin: Option<&str>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("log.level", "info")?
            .set_default("log.encoding", "text")?
            .set_default("log.add_source", false)?
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true)
                    .source(env),
            );

        for file in &sources.files {
            builder = builder.add_source(File::from(file.as_path()));
        }

        if let (Some(format), Some(text)) = (sources.stdin, stdin) {
            builder = builder.add_source(File::from_str(text, FileFormat::from(format)));
        }

        for (key, value) in &sources.overrides {
            builder = builder.set_override(key.as_str(), value.as_str())?;
        }

        let settings = builder.build()?.try_deserialize::<Self>()?;
        settings.validate()?;
        Ok(settings)
    }

    /// ## Summary
    /// Checks cross-field constraints that deserialization cannot express.
    ///
    /// ## Errors
    /// Returns [`CoreError::ValidationError`] describing the first violated constraint.
    pub fn validate(&self) -> CoreResult<()> {
        let invalid = |msg: String| Err(CoreError::ValidationError(msg));

        if let Some(schedule) = &self.schedule
            && schedule.interval.is_zero()
        {
            return invalid("schedule.interval must be positive".to_owned());
        }

        if let Some(telegram) = &self.telegram
            && let Some(sender) = telegram.users.keys().find(|k| k.parse::<i64>().is_err())
        {
            return invalid(format!("telegram.users key {sender:?} is not a numeric sender id"));
        }

        if let Some(tinkoff) = &self.tinkoff {
            if tinkoff.batch_size == 0 {
                return invalid("tinkoff.batch_size must be positive".to_owned());
            }
            if tinkoff.auth == TinkoffAuth::Browser && self.selenium.is_none() {
                return invalid("tinkoff.auth=browser requires the selenium section".to_owned());
            }
        }

        if let Some(lkdr) = &self.lkdr {
            if lkdr.batch_size == 0 {
                return invalid("lkdr.batch_size must be positive".to_owned());
            }
            if !lkdr.users.is_empty() && self.captcha.is_none() {
                return invalid("lkdr users require the captcha section".to_owned());
            }
            if !lkdr.users.is_empty() && lkdr.captcha_site_key.is_none() {
                return invalid("lkdr users require lkdr.captcha_site_key".to_owned());
            }
        }

        Ok(())
    }

    /// ## Summary
    /// Renders the effective settings as YAML.
    ///
    /// ## Errors
    /// Returns [`CoreError::ConfigError`] if serialization fails.
    pub fn dump_values(&self) -> CoreResult<String> {
        serde_yaml::to_string(self).map_err(|e| CoreError::ConfigError(e.to_string()))
    }
}

/// ## Summary
/// Loads `.env`, parses the process arguments and reads stdin when `config.stdin` asks for it.
///
/// ## Errors
/// Returns an error if parsing, reading or validating the configuration fails.
pub fn load_config() -> Result<Settings> {
    dotenvy::dotenv().ok();

    let sources = Sources::from_args(std::env::args().skip(1))?;
    let stdin = match sources.stdin {
        Some(_) => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Some(text)
        }
        None => None,
    };

    Settings::load(&sources, stdin.as_deref())
}
