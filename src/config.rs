//! Configuration types.
//!
//! Every config struct has a `Default` matching production settings and a
//! `from_env()` constructor that overrides individual fields from
//! `CAMPAIGN_*` environment variables.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::accounts::SelectionPolicy;
use crate::conversation::Intent;
use crate::error::ConfigError;
use crate::scheduler::DistributionPattern;

/// Read an env var and parse it, falling back to `default` when unset.
pub(crate) fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
        _ => Ok(default),
    }
}

pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// One configured sending identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountConfig {
    pub id: String,
    pub name: String,
    pub enabled: bool,
}

impl AccountConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
        }
    }
}

impl FromStr for AccountConfig {
    type Err = String;

    /// `id:name` or `id:name:disabled`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split(':');
        let id = parts.next().unwrap_or_default().trim();
        if id.is_empty() {
            return Err(format!("account entry '{s}' has no id"));
        }
        let name = parts.next().map(str::trim).filter(|n| !n.is_empty()).unwrap_or(id);
        let enabled = match parts.next().map(str::trim) {
            None | Some("enabled") => true,
            Some("disabled") => false,
            Some(other) => return Err(format!("unknown account flag '{other}'")),
        };
        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            enabled,
        })
    }
}

/// Outbound campaign settings.
#[derive(Debug, Clone)]
pub struct CampaignConfig {
    /// System-wide send budget per hour; sets the base delay.
    pub max_per_hour: u32,
    /// Shape of the inter-send delay.
    pub pattern: DistributionPattern,
    /// Contacts handled per scheduling pass.
    pub batch_size: usize,
    /// Upper bound on contacts waiting for a later pass.
    pub backlog_capacity: usize,
    /// How a ready account is picked for each claimed contact.
    pub selection: SelectionPolicy,
    /// Sending identities.
    pub accounts: Vec<AccountConfig>,
    /// Where ledger, history and block-list documents live.
    pub data_dir: PathBuf,
    /// Append every commit to `message_history.log`.
    pub audit_log: bool,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            max_per_hour: 60,
            pattern: DistributionPattern::Random,
            batch_size: 50,
            backlog_capacity: 100_000,
            selection: SelectionPolicy::Random,
            accounts: vec![AccountConfig::new("account1", "Primary Account")],
            data_dir: PathBuf::from("./data"),
            audit_log: true,
        }
    }
}

impl CampaignConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_per_hour = env_parse("CAMPAIGN_MAX_PER_HOUR", defaults.max_per_hour)?;
        if max_per_hour == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CAMPAIGN_MAX_PER_HOUR".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let batch_size = env_parse("CAMPAIGN_BATCH_SIZE", defaults.batch_size)?.max(1);

        let accounts = match env_string("CAMPAIGN_ACCOUNTS") {
            Some(raw) => raw
                .split(',')
                .filter(|entry| !entry.trim().is_empty())
                .map(|entry| {
                    entry
                        .parse::<AccountConfig>()
                        .map_err(|message| ConfigError::InvalidValue {
                            key: "CAMPAIGN_ACCOUNTS".to_string(),
                            message,
                        })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => defaults.accounts,
        };

        Ok(Self {
            max_per_hour,
            pattern: env_parse("CAMPAIGN_PATTERN", defaults.pattern)?,
            batch_size,
            backlog_capacity: env_parse("CAMPAIGN_BACKLOG_CAPACITY", defaults.backlog_capacity)?,
            selection: env_parse("CAMPAIGN_SELECTION", defaults.selection)?,
            accounts,
            data_dir: env_string("CAMPAIGN_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            audit_log: env_parse("CAMPAIGN_AUDIT_LOG", defaults.audit_log)?,
        })
    }

    /// Base inter-send delay: one hour divided by the hourly budget.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(3_600_000 / u64::from(self.max_per_hour.max(1)))
    }
}

/// Human-like pacing applied before every reply.
#[derive(Debug, Clone)]
pub struct ReplyPacing {
    pub enabled: bool,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Typing speed in characters per minute.
    pub typing_cpm: f64,
    /// Uniform variance applied to `typing_cpm`.
    pub typing_variance: f64,
}

impl Default for ReplyPacing {
    fn default() -> Self {
        Self {
            enabled: true,
            min_delay: Duration::from_millis(2_000),
            max_delay: Duration::from_millis(15_000),
            typing_cpm: 150.0,
            typing_variance: 50.0,
        }
    }
}

impl ReplyPacing {
    /// No delay at all (tests, local runs).
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Conversation responder settings.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    pub persona_name: String,
    pub persona_tone: String,
    /// Intents answered from templates instead of the generative responder.
    pub canned_intents: HashSet<Intent>,
    /// Turns kept per contact.
    pub history_cap: usize,
    pub pacing: ReplyPacing,
    /// Hard limit on one generative call.
    pub generate_timeout: Duration,
}

/// Intents answered from templates when nothing else is configured.
pub const DEFAULT_CANNED_INTENTS: [Intent; 6] = [
    Intent::Costs,
    Intent::HowItWorks,
    Intent::CallRequest,
    Intent::Rejection,
    Intent::IdentityQuestion,
    Intent::NumberSource,
];

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            persona_name: "Sofia".to_string(),
            persona_tone: "Menselijk, luchtig, duidelijk. Niet formeel. Geen verkooppraatjes."
                .to_string(),
            canned_intents: DEFAULT_CANNED_INTENTS.into_iter().collect(),
            history_cap: 20,
            pacing: ReplyPacing::default(),
            generate_timeout: Duration::from_secs(30),
        }
    }
}

impl ResponderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let canned_intents = match env_string("CAMPAIGN_CANNED_INTENTS") {
            Some(raw) => raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| {
                    s.parse::<Intent>()
                        .map_err(|message| ConfigError::InvalidValue {
                            key: "CAMPAIGN_CANNED_INTENTS".to_string(),
                            message,
                        })
                })
                .collect::<Result<HashSet<_>, _>>()?,
            None => defaults.canned_intents,
        };

        let pacing_defaults = defaults.pacing;
        let min_ms = env_parse(
            "CAMPAIGN_REPLY_DELAY_MIN_MS",
            pacing_defaults.min_delay.as_millis() as u64,
        )?;
        let max_ms = env_parse(
            "CAMPAIGN_REPLY_DELAY_MAX_MS",
            pacing_defaults.max_delay.as_millis() as u64,
        )?;
        if min_ms > max_ms {
            return Err(ConfigError::InvalidValue {
                key: "CAMPAIGN_REPLY_DELAY_MIN_MS".to_string(),
                message: format!("{min_ms} exceeds maximum {max_ms}"),
            });
        }

        let pacing = ReplyPacing {
            enabled: env_parse("CAMPAIGN_REPLY_PACING", pacing_defaults.enabled)?,
            min_delay: Duration::from_millis(min_ms),
            max_delay: Duration::from_millis(max_ms),
            ..pacing_defaults
        };

        Ok(Self {
            persona_name: env_string("CAMPAIGN_PERSONA_NAME").unwrap_or(defaults.persona_name),
            persona_tone: env_string("CAMPAIGN_PERSONA_TONE").unwrap_or(defaults.persona_tone),
            canned_intents,
            history_cap: env_parse("CAMPAIGN_HISTORY_CAP", defaults.history_cap)?.max(1),
            pacing,
            generate_timeout: Duration::from_secs(env_parse(
                "CAMPAIGN_GENERATE_TIMEOUT_SECS",
                defaults.generate_timeout.as_secs(),
            )?),
        })
    }
}
