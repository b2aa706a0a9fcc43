//! Environment configuration.
//!
//! Every option has a default; unset variables are logged and defaulted,
//! malformed ones are an error. Range checks (zero windows, empty secrets)
//! happen later, when the gate is built. The mail transport is the exception:
//! there is no default, and a gate without one refuses to build.

use crate::domain::identity::IdentitySource;
use rand::RngCore;
use std::env;
use std::fmt::{self, Display};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Error returned when an environment variable cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The variable is set but its value is malformed
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    /// A variable required by another one is not set
    Missing {
        key: &'static str,
        needed_by: &'static str,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { key, value, reason } => {
                write!(f, "invalid {key} value {value:?}: {reason}")
            }
            ConfigError::Missing { key, needed_by } => {
                write!(f, "{key} must be set when {needed_by} is set")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// How notifications leave the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailSettings {
    /// Deliver through an SMTP relay
    Smtp(SmtpSettings),
    /// Write notifications to the log; they are never delivered
    Log,
}

/// SMTP relay settings.
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    /// Relay host (`EMAIL_HOST`)
    pub host: String,
    /// Relay port (`EMAIL_PORT`, 465 when secure, else 587)
    pub port: u16,
    /// Implicit TLS from the first byte; otherwise STARTTLS when offered (`EMAIL_SECURE`)
    pub secure: bool,
    /// Login user (`EMAIL_USER`)
    pub user: Option<String>,
    /// Login password (`EMAIL_PASS`)
    pub pass: Option<String>,
    /// Sender mailbox (`EMAIL_FROM`, defaults to `EMAIL_USER`)
    pub from: String,
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("user", &self.user)
            .field("pass", &self.pass.as_ref().map(|_| "<redacted>"))
            .field("from", &self.from)
            .finish()
    }
}

/// Runtime configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Where contact notifications are sent (`CONTACT_EMAIL`)
    pub contact_email: String,
    /// Contact and global limiter window (`RATE_LIMIT_WINDOW_MS`)
    pub rate_limit_window: Duration,
    /// Contact submissions per window (`RATE_LIMIT_MAX`)
    pub rate_limit_max: u32,
    /// Requests of any kind per window (`GLOBAL_RATE_LIMIT_MAX`)
    pub global_rate_limit_max: u32,
    /// Comment limiter window (`COMMENT_RATE_LIMIT_WINDOW_MS`)
    pub comment_rate_limit_window: Duration,
    /// Comment submissions per window (`COMMENT_RATE_LIMIT_MAX`)
    pub comment_rate_limit_max: u32,
    /// Identities tracked per limiter before eviction (`MAX_TRACKED_IDENTITIES`)
    pub max_tracked_identities: usize,
    /// Key for signing session cookies (`SESSION_SECRET`)
    pub session_secret: String,
    /// Idle session lifetime (`SESSION_TTL_SECS`)
    pub session_ttl: Duration,
    /// Listening port (`PORT`)
    pub port: u16,
    /// Client identity source (`TRUST_PROXY`)
    pub identity_source: IdentitySource,
    /// Delivery attempts per notification (`DISPATCH_MAX_ATTEMPTS`)
    pub dispatch_max_attempts: u32,
    /// Delay after the first failed attempt (`DISPATCH_BACKOFF_MS`)
    pub dispatch_backoff: Duration,
    /// Timeout per delivery attempt (`DISPATCH_TIMEOUT_MS`)
    pub dispatch_timeout: Duration,
    /// Background sweep period (`SWEEP_INTERVAL_SECS`)
    pub sweep_interval: Duration,
    /// Mail transport (`MAIL_TRANSPORT`, `EMAIL_*`); None until chosen
    pub mail: Option<MailSettings>,
}

// The session secret stays out of logs
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("contact_email", &self.contact_email)
            .field("rate_limit_window", &self.rate_limit_window)
            .field("rate_limit_max", &self.rate_limit_max)
            .field("global_rate_limit_max", &self.global_rate_limit_max)
            .field("comment_rate_limit_window", &self.comment_rate_limit_window)
            .field("comment_rate_limit_max", &self.comment_rate_limit_max)
            .field("max_tracked_identities", &self.max_tracked_identities)
            .field("session_secret", &"<redacted>")
            .field("session_ttl", &self.session_ttl)
            .field("port", &self.port)
            .field("identity_source", &self.identity_source)
            .field("dispatch_max_attempts", &self.dispatch_max_attempts)
            .field("dispatch_backoff", &self.dispatch_backoff)
            .field("dispatch_timeout", &self.dispatch_timeout)
            .field("sweep_interval", &self.sweep_interval)
            .field("mail", &self.mail)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            contact_email: String::new(),
            rate_limit_window: Duration::from_millis(900_000),
            rate_limit_max: 10,
            global_rate_limit_max: 100,
            comment_rate_limit_window: Duration::from_millis(60_000),
            comment_rate_limit_max: 5,
            max_tracked_identities: 10_000,
            session_secret: String::new(),
            session_ttl: Duration::from_secs(86_400),
            port: 42069,
            identity_source: IdentitySource::PeerAddress,
            dispatch_max_attempts: 3,
            dispatch_backoff: Duration::from_millis(200),
            dispatch_timeout: Duration::from_millis(10_000),
            sweep_interval: Duration::from_secs(60),
            mail: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let loader = Loader { lookup };

        let contact_email = match loader.raw("CONTACT_EMAIL") {
            Some(email) => email,
            None => {
                warn!("CONTACT_EMAIL not set, contact notifications will be rejected");
                String::new()
            }
        };

        let session_secret = match loader.raw("SESSION_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("SESSION_SECRET not set, using a random secret; sessions end on restart");
                random_secret()
            }
        };

        Ok(Self {
            contact_email,
            rate_limit_window: loader.millis("RATE_LIMIT_WINDOW_MS", defaults.rate_limit_window)?,
            rate_limit_max: loader.parse("RATE_LIMIT_MAX", defaults.rate_limit_max)?,
            global_rate_limit_max: loader
                .parse("GLOBAL_RATE_LIMIT_MAX", defaults.global_rate_limit_max)?,
            comment_rate_limit_window: loader.millis(
                "COMMENT_RATE_LIMIT_WINDOW_MS",
                defaults.comment_rate_limit_window,
            )?,
            comment_rate_limit_max: loader
                .parse("COMMENT_RATE_LIMIT_MAX", defaults.comment_rate_limit_max)?,
            max_tracked_identities: loader
                .parse("MAX_TRACKED_IDENTITIES", defaults.max_tracked_identities)?,
            session_secret,
            session_ttl: Duration::from_secs(
                loader.parse("SESSION_TTL_SECS", defaults.session_ttl.as_secs())?,
            ),
            port: loader.parse("PORT", defaults.port)?,
            identity_source: if loader.flag("TRUST_PROXY")? {
                IdentitySource::ForwardedFor
            } else {
                IdentitySource::PeerAddress
            },
            dispatch_max_attempts: loader
                .parse("DISPATCH_MAX_ATTEMPTS", defaults.dispatch_max_attempts)?,
            dispatch_backoff: loader.millis("DISPATCH_BACKOFF_MS", defaults.dispatch_backoff)?,
            dispatch_timeout: loader.millis("DISPATCH_TIMEOUT_MS", defaults.dispatch_timeout)?,
            sweep_interval: Duration::from_secs(
                loader.parse("SWEEP_INTERVAL_SECS", defaults.sweep_interval.as_secs())?,
            ),
            mail: mail_settings(&loader)?,
        })
    }
}

fn mail_settings<L>(loader: &Loader<L>) -> Result<Option<MailSettings>, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    let choice = loader.raw("MAIL_TRANSPORT").map(|value| value.to_ascii_lowercase());
    match choice.as_deref() {
        Some("log") => {
            warn!("MAIL_TRANSPORT=log, notifications are logged and never delivered");
            Ok(Some(MailSettings::Log))
        }
        None | Some("") | Some("smtp") => {
            let Some(host) = loader.raw("EMAIL_HOST").filter(|host| !host.is_empty()) else {
                warn!("EMAIL_HOST not set and MAIL_TRANSPORT is not log, no mail transport configured");
                return Ok(None);
            };
            let secure = loader.flag("EMAIL_SECURE")?;
            let port = loader.parse("EMAIL_PORT", if secure { 465u16 } else { 587 })?;
            let user = loader.raw("EMAIL_USER").filter(|user| !user.is_empty());
            let pass = loader.raw("EMAIL_PASS");
            let from = loader
                .raw("EMAIL_FROM")
                .filter(|from| !from.is_empty())
                .or_else(|| user.clone())
                .ok_or(ConfigError::Missing {
                    key: "EMAIL_FROM",
                    needed_by: "EMAIL_HOST",
                })?;
            Ok(Some(MailSettings::Smtp(SmtpSettings {
                host,
                port,
                secure,
                user,
                pass,
                from,
            })))
        }
        Some(other) => Err(ConfigError::Invalid {
            key: "MAIL_TRANSPORT",
            value: other.to_string(),
            reason: "expected smtp or log".to_string(),
        }),
    }
}

struct Loader<L> {
    lookup: L,
}

impl<L> Loader<L>
where
    L: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key).map(|value| value.trim().to_string())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + Display,
        T::Err: Display,
    {
        match self.raw(key) {
            None => {
                info!("{key} not set, using default: {default}");
                Ok(default)
            }
            Some(value) => value.parse().map_err(|e: T::Err| {
                warn!("Invalid {key} value: {e}");
                ConfigError::Invalid {
                    key,
                    reason: e.to_string(),
                    value,
                }
            }),
        }
    }

    fn millis(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.parse(key, default_ms).map(Duration::from_millis)
    }

    fn flag(&self, key: &'static str) -> Result<bool, ConfigError> {
        match self.raw(key).as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("") | Some("0") | Some("false") | Some("no") => Ok(false),
            Some("1") | Some("true") | Some("yes") => Ok(true),
            Some(other) => Err(ConfigError::Invalid {
                key,
                value: other.to_string(),
                reason: "expected true or false".to_string(),
            }),
        }
    }
}

fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
