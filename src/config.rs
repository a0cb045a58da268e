//! Runtime configuration resolution and delivery verification.
//!
//! Configuration is injected at activation time, never baked into
//! an artifact. Every recognized key resolves to a value with a
//! recorded provenance before anything touches the host, and the
//! rendered compose file is checked to confirm each resolved value
//! actually reaches the service environment. A value that resolved
//! but was not delivered looks identical to a missing value from
//! the outside; the two faults are reported distinctly.

use serde::{Deserialize, Serialize};

/// Host allow-list for the API service.
pub const ALLOWED_HOSTS_KEY: &str = "ALLOWED_HOSTS";
/// Debug flag for the API service.
pub const DEBUG_KEY: &str = "DEBUG";

/// Keys the resolver owns. Build args carrying one of these would
/// bake runtime configuration into an artifact.
pub const RECOGNIZED_KEYS: [&str; 2] = [ALLOWED_HOSTS_KEY, DEBUG_KEY];

#[must_use]
pub fn is_runtime_key(key: &str) -> bool {
    RECOGNIZED_KEYS.contains(&key)
}

/// A misconfiguration caught before activation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigFault {
    #[error("required key '{key}' has no value from any source")]
    Missing { key: String },

    #[error(
        "key '{key}' is explicitly empty; an empty allow-list \
         rejects all inbound requests - supply a value or drop \
         the key to get the permissive default"
    )]
    Empty { key: String },

    #[error("key '{key}' has unparseable value '{value}'")]
    Invalid { key: String, value: String },

    #[error(
        "key '{key}' resolved but is not present in the '{service}' \
         service environment; the running process would never see it"
    )]
    Undelivered { key: String, service: String },

    #[error(
        "build arg '{key}' for component '{component}' is a runtime \
         configuration key; artifacts must stay configuration-free"
    )]
    BakedIn { key: String, component: String },
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    Explicit,
    Environment,
    Default,
}

/// One resolved configuration entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedEntry {
    pub key: String,
    pub value: String,
    pub provenance: Provenance,
}

/// The validated result of resolution: every recognized key has a
/// value and a provenance, in a stable order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedConfig {
    entries: Vec<ResolvedEntry>,
}

impl ResolvedConfig {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ResolvedEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedEntry> {
        self.entries.iter()
    }

    /// Render as `KEY=VALUE` pairs for a container environment.
    #[must_use]
    pub fn to_env(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|e| (e.key.clone(), e.value.clone()))
            .collect()
    }
}

/// Runtime configuration as supplied by the operator. `None` means
/// "resolve from the environment, then the documented default".
///
/// # Example
///
/// ```
/// use gantry::RuntimeConfig;
///
/// let runtime = RuntimeConfig::new()
///     .allowed_hosts("demo.example.com")
///     .debug(false)
///     .set("API_BASE", "/api");
///
/// assert_eq!(runtime.allowed_hosts.as_deref(), Some("demo.example.com"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub allowed_hosts: Option<String>,
    pub debug: Option<bool>,
    pub extra: Vec<(String, String)>,
}

impl RuntimeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn allowed_hosts(mut self, pattern: &str) -> Self {
        self.allowed_hosts = Some(pattern.to_string());
        self
    }

    #[must_use]
    pub const fn debug(mut self, on: bool) -> Self {
        self.debug = Some(on);
        self
    }

    #[must_use]
    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.extra.push((key.to_string(), value.to_string()));
        self
    }
}

/// Resolve against the process environment.
pub fn resolve(runtime: &RuntimeConfig) -> Result<ResolvedConfig, ConfigFault> {
    resolve_with(runtime, |key| std::env::var(key).ok())
}

/// Resolve every recognized key: explicit value first, then the
/// environment, then the documented default. The allow-list default
/// is permissive and announced loudly; an explicitly empty
/// allow-list is refused because it silently rejects all traffic.
pub fn resolve_with(
    runtime: &RuntimeConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig, ConfigFault> {
    let mut entries = Vec::new();

    entries.push(resolve_allowed_hosts(runtime, &lookup)?);
    entries.push(resolve_debug(runtime, &lookup)?);

    for (key, value) in &runtime.extra {
        if value.trim().is_empty() {
            return Err(ConfigFault::Empty { key: key.clone() });
        }
        entries.push(ResolvedEntry {
            key: key.clone(),
            value: value.clone(),
            provenance: Provenance::Explicit,
        });
    }

    Ok(ResolvedConfig { entries })
}

fn resolve_allowed_hosts(
    runtime: &RuntimeConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedEntry, ConfigFault> {
    let (value, provenance) = if let Some(explicit) = &runtime.allowed_hosts {
        (explicit.clone(), Provenance::Explicit)
    } else if let Some(from_env) = lookup(ALLOWED_HOSTS_KEY) {
        (from_env, Provenance::Environment)
    } else {
        eprintln!(
            "WARNING: no allow-list supplied; defaulting \
             {ALLOWED_HOSTS_KEY} to '*' (all hosts accepted)"
        );
        ("*".to_string(), Provenance::Default)
    };

    if value.trim().is_empty() {
        return Err(ConfigFault::Empty {
            key: ALLOWED_HOSTS_KEY.to_string(),
        });
    }

    Ok(ResolvedEntry {
        key: ALLOWED_HOSTS_KEY.to_string(),
        value,
        provenance,
    })
}

fn resolve_debug(
    runtime: &RuntimeConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedEntry, ConfigFault> {
    let (value, provenance) = if let Some(explicit) = runtime.debug {
        (explicit.to_string(), Provenance::Explicit)
    } else if let Some(from_env) = lookup(DEBUG_KEY) {
        (parse_bool(&from_env)?.to_string(), Provenance::Environment)
    } else {
        ("false".to_string(), Provenance::Default)
    };

    Ok(ResolvedEntry {
        key: DEBUG_KEY.to_string(),
        value,
        provenance,
    })
}

fn parse_bool(raw: &str) -> Result<bool, ConfigFault> {
    match raw.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(ConfigFault::Invalid {
            key: DEBUG_KEY.to_string(),
            value: other.to_string(),
        }),
    }
}

/// Confirm every resolved entry appears verbatim in the named
/// service's environment within a rendered compose file.
pub fn verify_delivery(
    resolved: &ResolvedConfig,
    compose_yaml: &str,
    service: &str,
) -> Result<(), ConfigFault> {
    let doc: serde_yaml::Value = serde_yaml::from_str(compose_yaml).map_err(|_| {
        ConfigFault::Undelivered {
            key: "(unparseable compose)".to_string(),
            service: service.to_string(),
        }
    })?;

    let environment = doc
        .get("services")
        .and_then(|s| s.get(service))
        .and_then(|s| s.get("environment"))
        .and_then(serde_yaml::Value::as_sequence);

    for entry in resolved.iter() {
        let expected = format!("{}={}", entry.key, entry.value);
        let delivered = environment.is_some_and(|env| {
            env.iter()
                .filter_map(serde_yaml::Value::as_str)
                .any(|line| line == expected)
        });
        if !delivered {
            return Err(ConfigFault::Undelivered {
                key: entry.key.clone(),
                service: service.to_string(),
            });
        }
    }

    Ok(())
}
