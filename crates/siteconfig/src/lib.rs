//! Site configuration for the fundraiser binary.
//!
//! Values come from a TOML file and are then overridden by environment
//! variables, so a deployment can keep secrets out of the file entirely.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const DEFAULT_SERVER_PREFIX: &str = "us1";
pub const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
pub const CONFIG_FILE_NAME: &str = "fundraiser.toml";

const REDACTED: &str = "<redacted>";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" | "test" | "staging" => Some(Self::Production),
            _ => None,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SiteConfig {
    pub version: u32,
    #[serde(default)]
    pub environment: Environment,
    /// Public URL of the site; checkout redirects fall back to the request origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_url: Option<String>,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub stripe: StripeSection,
    #[serde(default)]
    pub mailchimp: MailchimpSection,
    #[serde(default)]
    pub renderer: RendererSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StripeSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(default = "default_stripe_api_base")]
    pub api_base: String,
    #[serde(
        default = "default_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MailchimpSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_server_prefix")]
    pub server_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_id: Option<String>,
    /// Overrides `https://{server_prefix}.api.mailchimp.com`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(
        default = "default_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub timeout: Duration,
}

impl MailchimpSection {
    pub fn api_base(&self) -> String {
        self.api_base
            .clone()
            .unwrap_or_else(|| format!("https://{}.api.mailchimp.com", self.server_prefix))
    }
}

/// Defaults for `preview` and `render`; command-line flags win.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RendererSection {
    #[serde(default = "default_stylize")]
    pub stylize: bool,
    #[serde(default = "default_radius")]
    pub radius: u32,
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paper_seed: Option<u64>,
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_stripe_api_base() -> String {
    DEFAULT_STRIPE_API_BASE.to_string()
}

fn default_server_prefix() -> String {
    DEFAULT_SERVER_PREFIX.to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_stylize() -> bool {
    true
}

fn default_radius() -> u32 {
    7
}

fn default_alpha() -> f32 {
    25.0
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for StripeSection {
    fn default() -> Self {
        Self {
            secret_key: None,
            api_base: default_stripe_api_base(),
            timeout: default_timeout(),
        }
    }
}

impl Default for MailchimpSection {
    fn default() -> Self {
        Self {
            api_key: None,
            server_prefix: default_server_prefix(),
            list_id: None,
            api_base: None,
            timeout: default_timeout(),
        }
    }
}

impl Default for RendererSection {
    fn default() -> Self {
        Self {
            stylize: default_stylize(),
            radius: default_radius(),
            alpha: default_alpha(),
            fps: None,
            paper_seed: None,
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            version: 1,
            environment: Environment::default(),
            app_url: None,
            server: ServerSection::default(),
            stripe: StripeSection::default(),
            mailchimp: MailchimpSection::default(),
            renderer: RendererSection::default(),
        }
    }
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

/// Reads the first non-empty variable among `names`.
fn first_set(lookup: &impl Fn(&str) -> Option<String>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| lookup(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

impl SiteConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: SiteConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Parses `path` without validating, so environment overrides can still
    /// fill in missing values.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Loads `path` (or the defaults when `None`), applies the process
    /// environment and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => Self::default(),
        };
        config.apply_process_env();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_process_env(&mut self) {
        self.apply_env(|name| std::env::var(name).ok());
    }

    /// Overrides fields from environment-style variables resolved by `lookup`.
    /// Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = first_set(&lookup, &["STRIPE_SECRET_KEY"]) {
            self.stripe.secret_key = Some(value);
        }
        if let Some(value) = first_set(&lookup, &["APP_URL", "VITE_APP_URL"]) {
            self.app_url = Some(value);
        }
        if let Some(value) = first_set(&lookup, &["MAILCHIMP_API_KEY", "VITE_MAILCHIMP_API_KEY"])
        {
            self.mailchimp.api_key = Some(value);
        }
        if let Some(value) = first_set(
            &lookup,
            &["MAILCHIMP_SERVER_PREFIX", "VITE_MAILCHIMP_SERVER_PREFIX"],
        ) {
            self.mailchimp.server_prefix = value;
        }
        if let Some(value) = first_set(&lookup, &["MAILCHIMP_LIST_ID", "VITE_MAILCHIMP_LIST_ID"])
        {
            self.mailchimp.list_id = Some(value);
        }
        if let Some(environment) =
            first_set(&lookup, &["APP_ENV", "NODE_ENV"]).and_then(|raw| Environment::parse(&raw))
        {
            self.environment = environment;
        }
        if let Some(value) = first_set(&lookup, &["FUNDRAISER_BIND"]) {
            self.server.bind = value;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        self.bind_addr()?;

        if let Some(url) = &self.app_url {
            validate_url("app_url", url)?;
        }
        validate_url("stripe.api_base", &self.stripe.api_base)?;
        if let Some(base) = &self.mailchimp.api_base {
            validate_url("mailchimp.api_base", base)?;
        }

        let prefix = &self.mailchimp.server_prefix;
        if prefix.is_empty() || !prefix.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(ConfigError::Invalid(format!(
                "mailchimp.server_prefix '{prefix}' must be alphanumeric, e.g. 'us1'"
            )));
        }

        for (name, timeout) in [
            ("stripe.timeout", self.stripe.timeout),
            ("mailchimp.timeout", self.mailchimp.timeout),
        ] {
            if timeout.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        let renderer = &self.renderer;
        if !(1..=10).contains(&renderer.radius) {
            return Err(ConfigError::Invalid(format!(
                "renderer.radius {} is outside 1-10",
                renderer.radius
            )));
        }
        if !(1.0..=50.0).contains(&renderer.alpha) {
            return Err(ConfigError::Invalid(format!(
                "renderer.alpha {} is outside 1-50",
                renderer.alpha
            )));
        }
        if let Some(fps) = renderer.fps {
            if !fps.is_finite() || fps < 0.0 {
                return Err(ConfigError::Invalid("renderer.fps must be >= 0".into()));
            }
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.bind.parse().map_err(|err| {
            ConfigError::Invalid(format!(
                "server.bind '{}' is not a socket address: {err}",
                self.server.bind
            ))
        })
    }

    /// Copy with every secret replaced, for printing.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.stripe.secret_key.is_some() {
            copy.stripe.secret_key = Some(REDACTED.into());
        }
        if copy.mailchimp.api_key.is_some() {
            copy.mailchimp.api_key = Some(REDACTED.into());
        }
        copy
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|err| ConfigError::Invalid(format!("failed to serialise config: {err}")))
    }
}

fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(ConfigError::Invalid(format!(
            "{field} '{value}' must be an http(s) URL"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
version = 1
environment = "development"
app_url = "https://everybodyscool.org"

[server]
bind = "0.0.0.0:8080"

[stripe]
secret_key = "sk_test_123"
timeout = "5s"

[mailchimp]
api_key = "abc-us21"
server_prefix = "us21"
list_id = "list42"
timeout = 3

[renderer]
radius = 4
alpha = 12.5
fps = 30
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn parses_sample_config() {
        let config = SiteConfig::from_toml_str(SAMPLE).expect("parse config");
        assert!(config.environment.is_development());
        assert_eq!(config.app_url.as_deref(), Some("https://everybodyscool.org"));
        assert_eq!(config.bind_addr().expect("bind").port(), 8080);
        assert_eq!(config.stripe.timeout, Duration::from_secs(5));
        assert_eq!(config.mailchimp.timeout, Duration::from_secs(3));
        assert_eq!(config.mailchimp.api_base(), "https://us21.api.mailchimp.com");
        assert_eq!(config.renderer.radius, 4);
        assert_eq!(config.renderer.fps, Some(30.0));
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = SiteConfig::from_toml_str("version = 1").expect("parse");
        assert_eq!(config, SiteConfig::default());
        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert_eq!(config.mailchimp.server_prefix, "us1");
        assert_eq!(config.environment, Environment::Production);
        assert!(config.renderer.stylize);
        assert_eq!((config.renderer.radius, config.renderer.alpha), (7, 25.0));
    }

    #[test]
    fn rejects_unknown_version() {
        let err = SiteConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_values() {
        for body in [
            "version = 1\n[server]\nbind = \"localhost\"",
            "version = 1\napp_url = \"everybodyscool.org\"",
            "version = 1\n[mailchimp]\nserver_prefix = \"us-1\"",
            "version = 1\n[stripe]\ntimeout = \"0s\"",
            "version = 1\n[renderer]\nradius = 11",
            "version = 1\n[renderer]\nalpha = 0.5",
            "version = 1\n[renderer]\nfps = -1",
        ] {
            let err = SiteConfig::from_toml_str(body).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{body}: {err}");
        }
    }

    #[test]
    fn rejects_malformed_duration() {
        let err = SiteConfig::from_toml_str("version = 1\n[stripe]\ntimeout = \"soon\"")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = SiteConfig::from_toml_str(SAMPLE).expect("parse");
        config.apply_env(env(&[
            ("STRIPE_SECRET_KEY", "sk_live_env"),
            ("VITE_APP_URL", "https://preview.example"),
            ("VITE_MAILCHIMP_API_KEY", "vite-key"),
            ("MAILCHIMP_LIST_ID", "env-list"),
            ("NODE_ENV", "production"),
            ("FUNDRAISER_BIND", "127.0.0.1:9000"),
        ]));
        assert_eq!(config.stripe.secret_key.as_deref(), Some("sk_live_env"));
        assert_eq!(config.app_url.as_deref(), Some("https://preview.example"));
        assert_eq!(config.mailchimp.api_key.as_deref(), Some("vite-key"));
        assert_eq!(config.mailchimp.list_id.as_deref(), Some("env-list"));
        assert_eq!(config.mailchimp.server_prefix, "us21");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.bind_addr().expect("bind").port(), 9000);
    }

    #[test]
    fn primary_names_win_over_vite_aliases() {
        let mut config = SiteConfig::default();
        config.apply_env(env(&[
            ("APP_URL", "https://primary.example"),
            ("VITE_APP_URL", "https://alias.example"),
            ("APP_ENV", "development"),
            ("NODE_ENV", "production"),
        ]));
        assert_eq!(config.app_url.as_deref(), Some("https://primary.example"));
        assert!(config.environment.is_development());
    }

    #[test]
    fn empty_and_unknown_values_are_ignored() {
        let mut config = SiteConfig::default();
        config.apply_env(env(&[
            ("STRIPE_SECRET_KEY", "  "),
            ("APP_ENV", "staging-ish"),
        ]));
        assert_eq!(config.stripe.secret_key, None);
        assert_eq!(config.environment, Environment::Production);
    }

    #[test]
    fn redaction_hides_secrets_only() {
        let config = SiteConfig::from_toml_str(SAMPLE).expect("parse");
        let printed = config.redacted().to_toml_string().expect("toml");
        assert!(!printed.contains("sk_test_123"));
        assert!(!printed.contains("abc-us21"));
        assert!(printed.contains(REDACTED));
        assert!(printed.contains("list42"));
        assert!(printed.contains("timeout = \"5s\""));
    }

    #[test]
    fn load_reads_file_and_reports_missing_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "version = 1\n[renderer]\nradius = 3\n").expect("write");
        let config = SiteConfig::read(&path).expect("read");
        assert_eq!(config.renderer.radius, 3);

        let err = SiteConfig::read(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
