//! Session configuration.

use crate::error::{SessionError, SessionResult};
use crate::gc::GcTrigger;
use crate::id::{IdGenerator, IdStrategy, is_safe_id_char};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prefix of every environment variable read by [`SessionConfig::from_env`].
pub const ENV_PREFIX: &str = "ARMATURE_SESSION_";

/// Longest accepted id prefix.
const MAX_PREFIX_LEN: usize = 64;

/// What `destroy` reports when the current record does not match the id
/// being destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyPolicy {
    /// Always report success; delete failures are logged and swallowed
    #[default]
    Lenient,
    /// Report success only when a matching row was deleted
    Strict,
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session name passed to `open`
    pub name: String,
    /// Save path passed to `open`
    pub save_path: String,
    /// Validate incoming ids against the store before trusting them
    pub strict_id_mode: bool,
    /// Seconds of inactivity after which a session is swept
    #[serde(with = "duration_secs")]
    pub gc_max_lifetime: Duration,
    /// Fraction of `open` calls that run a sweep
    pub gc_probability: f64,
    /// String prepended to generated ids
    pub id_prefix: String,
    /// How new ids are generated
    pub id_strategy: IdStrategy,
    /// Bump the timestamp instead of rewriting an unchanged payload
    pub lazy_write: bool,
    /// Result policy for `destroy`
    pub destroy_policy: DestroyPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "ARMATURESESSID".to_string(),
            save_path: String::new(),
            strict_id_mode: true,
            gc_max_lifetime: Duration::from_secs(1440), // 24 minutes
            gc_probability: 0.01,
            id_prefix: String::new(),
            id_strategy: IdStrategy::default(),
            lazy_write: true,
            destroy_policy: DestroyPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables.
    ///
    /// Recognised variables (all optional):
    /// - `ARMATURE_SESSION_NAME`
    /// - `ARMATURE_SESSION_SAVE_PATH`
    /// - `ARMATURE_SESSION_STRICT_ID_MODE` (true/false)
    /// - `ARMATURE_SESSION_GC_MAX_LIFETIME` (seconds)
    /// - `ARMATURE_SESSION_GC_PROBABILITY` (0.0 - 1.0)
    /// - `ARMATURE_SESSION_ID_PREFIX`
    /// - `ARMATURE_SESSION_ID_STRATEGY` (uuid/chunked)
    /// - `ARMATURE_SESSION_SID_BITS_PER_CHARACTER` (4, 5 or 6)
    /// - `ARMATURE_SESSION_LAZY_WRITE` (true/false)
    /// - `ARMATURE_SESSION_DESTROY_POLICY` (lenient/strict)
    pub fn from_env() -> SessionResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// `lookup` receives the full variable name, e.g.
    /// `ARMATURE_SESSION_GC_PROBABILITY`.
    pub fn from_lookup<F>(lookup: F) -> SessionResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix));
        let mut config = Self::default();

        if let Some(name) = var("NAME") {
            config.name = name;
        }

        if let Some(path) = var("SAVE_PATH") {
            config.save_path = path;
        }

        if let Some(strict) = var("STRICT_ID_MODE") {
            config.strict_id_mode = parse_bool("STRICT_ID_MODE", &strict)?;
        }

        if let Some(lifetime) = var("GC_MAX_LIFETIME") {
            let secs = lifetime.trim().parse::<u64>().map_err(|_| {
                SessionError::Config(format!("Invalid {}GC_MAX_LIFETIME", ENV_PREFIX))
            })?;
            config.gc_max_lifetime = Duration::from_secs(secs);
        }

        if let Some(probability) = var("GC_PROBABILITY") {
            config.gc_probability = probability.trim().parse::<f64>().map_err(|_| {
                SessionError::Config(format!("Invalid {}GC_PROBABILITY", ENV_PREFIX))
            })?;
        }

        if let Some(prefix) = var("ID_PREFIX") {
            config.id_prefix = prefix;
        }

        let bits = match var("SID_BITS_PER_CHARACTER") {
            Some(bits) => Some(bits.trim().parse::<u8>().map_err(|_| {
                SessionError::Config(format!("Invalid {}SID_BITS_PER_CHARACTER", ENV_PREFIX))
            })?),
            None => None,
        };

        if let Some(strategy) = var("ID_STRATEGY") {
            config.id_strategy = match strategy.trim().to_lowercase().as_str() {
                "uuid" => IdStrategy::Uuid,
                "chunked" => IdStrategy::chunked(bits.unwrap_or(IdStrategy::DEFAULT_BITS)),
                other => {
                    return Err(SessionError::Config(format!(
                        "Unknown id strategy '{}', expected uuid or chunked",
                        other
                    )));
                }
            };
        } else if let Some(bits) = bits {
            config.id_strategy = IdStrategy::chunked(bits);
        }

        if let Some(lazy) = var("LAZY_WRITE") {
            config.lazy_write = parse_bool("LAZY_WRITE", &lazy)?;
        }

        if let Some(policy) = var("DESTROY_POLICY") {
            config.destroy_policy = match policy.trim().to_lowercase().as_str() {
                "lenient" => DestroyPolicy::Lenient,
                "strict" => DestroyPolicy::Strict,
                other => {
                    return Err(SessionError::Config(format!(
                        "Unknown destroy policy '{}', expected lenient or strict",
                        other
                    )));
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the handler cannot work with.
    pub fn validate(&self) -> SessionResult<()> {
        if self.name.is_empty() || !self.name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SessionError::Config(
                "Session name must be non-empty and alphanumeric".to_string(),
            ));
        }

        if !self.gc_probability.is_finite() || !(0.0..=1.0).contains(&self.gc_probability) {
            return Err(SessionError::Config(format!(
                "gc_probability must be between 0 and 1, got {}",
                self.gc_probability
            )));
        }

        if self.id_prefix.len() > MAX_PREFIX_LEN {
            return Err(SessionError::Config(format!(
                "id_prefix longer than {} characters",
                MAX_PREFIX_LEN
            )));
        }

        if !self.id_prefix.chars().all(is_safe_id_char) {
            return Err(SessionError::Config(
                "id_prefix may only contain 0-9, a-z, A-Z, '-' and ','".to_string(),
            ));
        }

        if let IdStrategy::Chunked { bits_per_character } = self.id_strategy {
            if !(4..=6).contains(&bits_per_character) {
                return Err(SessionError::Config(format!(
                    "bits_per_character must be 4, 5 or 6, got {}",
                    bits_per_character
                )));
            }
        }

        Ok(())
    }

    /// Set the session name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set the save path passed to `open`.
    pub fn with_save_path(mut self, path: &str) -> Self {
        self.save_path = path.to_string();
        self
    }

    /// Enable or disable strict id mode.
    pub fn with_strict_id_mode(mut self, strict: bool) -> Self {
        self.strict_id_mode = strict;
        self
    }

    /// Set the inactivity lifetime used by probabilistic sweeps.
    pub fn with_gc_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.gc_max_lifetime = lifetime;
        self
    }

    /// Set the fraction of `open` calls that trigger a sweep.
    pub fn with_gc_probability(mut self, probability: f64) -> Self {
        self.gc_probability = probability;
        self
    }

    /// Set the prefix of generated ids.
    pub fn with_id_prefix(mut self, prefix: &str) -> Self {
        self.id_prefix = prefix.to_string();
        self
    }

    /// Set the id generation strategy.
    pub fn with_id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    /// Enable or disable lazy writes.
    pub fn with_lazy_write(mut self, lazy: bool) -> Self {
        self.lazy_write = lazy;
        self
    }

    /// Set the destroy result policy.
    pub fn with_destroy_policy(mut self, policy: DestroyPolicy) -> Self {
        self.destroy_policy = policy;
        self
    }

    /// Trigger policy evaluated on every `open`.
    pub fn gc_trigger(&self) -> GcTrigger {
        GcTrigger::new(self.gc_probability)
    }

    /// Id generator for this configuration.
    pub fn id_generator(&self) -> IdGenerator {
        IdGenerator::new(self.id_strategy).with_prefix(&self.id_prefix)
    }
}

fn parse_bool(name: &str, value: &str) -> SessionResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SessionError::Config(format!(
            "Invalid {}{}: expected a boolean",
            ENV_PREFIX, name
        ))),
    }
}

/// Serialize durations as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
