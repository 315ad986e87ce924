//! # Store Configuration
//!
//! `StoreConfig` is an immutable value type: merging two configurations
//! produces a new value instead of mutating a shared one, so two entities
//! can never alias each other's connection settings by accident.
//!
//! Process-wide defaults (`Defaults`) are resolved once — from the
//! environment or hardcoded fallbacks — and injected where a handle is
//! built. Business logic never reads the environment ad hoc.

use crate::types::NodalError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Fallback protocol used when a configuration names none.
pub const DEFAULT_PROTOCOL: &str = "http";

/// Fallback host used when neither configuration nor environment name one.
pub const DEFAULT_HOST: &str = "localhost";

/// Fallback port used when neither configuration nor environment name one.
pub const DEFAULT_PORT: u16 = 8529;

// =============================================================================
// DEFAULTS
// =============================================================================

/// Process-wide connection defaults.
///
/// Resolved once at startup (`Defaults::from_env`) and passed explicitly
/// into `Handle::connect`, never read inside entity logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    /// Default store host.
    pub host: String,
    /// Default store port.
    pub port: u16,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Defaults {
    /// Resolve defaults from `NODAL_HOST` / `NODAL_PORT`, falling back to
    /// the hardcoded values for anything absent or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let fallback = Self::default();
        let host = std::env::var("NODAL_HOST").unwrap_or(fallback.host);
        let port = std::env::var("NODAL_PORT")
            .ok()
            .and_then(|raw| match raw.parse::<u16>() {
                Ok(p) => Some(p),
                Err(_) => {
                    tracing::warn!(value = %raw, "NODAL_PORT is not a valid port, using default");
                    None
                }
            })
            .unwrap_or(fallback.port);
        Self { host, port }
    }
}

// =============================================================================
// STORE CONFIG
// =============================================================================

/// Connection and behavior options for one entity's store handle.
///
/// Every field is optional so that merging can distinguish "set" from
/// "absent"; `with_defaults` fills the required connection fields without
/// ever overwriting a present value. Unknown keys are preserved in `extra`
/// and passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Wire protocol. Deserialized through a type guard: a non-string
    /// value is treated as absent rather than rejected.
    #[serde(default, deserialize_with = "string_or_absent")]
    pub protocol: Option<String>,
    /// Store host.
    pub host: Option<String>,
    /// Store port.
    pub port: Option<u16>,
    /// Credential: user name.
    pub username: Option<String>,
    /// Credential: password.
    pub password: Option<String>,
    /// Domain (database) this entity lives in.
    pub domain: Option<String>,
    /// Collection this entity lives in.
    pub collection: Option<String>,
    /// Whether `collection` is an edge collection.
    pub edge: Option<bool>,
    /// Arbitrary passthrough keys, preserved across merges.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Deserialize a string, mapping any non-string value to `None`.
///
/// The original behavior never corrected a present-but-wrong-typed
/// protocol; here the guard sits at the serde boundary so a malformed
/// value simply counts as absent and gets defaulted.
fn string_or_absent<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_str().map(str::to_owned)))
}

impl StoreConfig {
    /// Empty configuration: everything must come from merging or defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for the common domain+collection pair.
    #[must_use]
    pub fn for_collection(domain: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            collection: Some(collection.into()),
            ..Self::default()
        }
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, NodalError> {
        toml::from_str(text).map_err(|e| NodalError::Configuration(e.to_string()))
    }

    /// Resolve a configuration from `NODAL_*` environment variables.
    ///
    /// Reads `NODAL_PROTOCOL`, `NODAL_HOST`, `NODAL_PORT`,
    /// `NODAL_USERNAME`, `NODAL_PASSWORD` and `NODAL_DOMAIN` once; absent
    /// variables leave the field unset.
    #[must_use]
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            protocol: var("NODAL_PROTOCOL"),
            host: var("NODAL_HOST"),
            port: var("NODAL_PORT").and_then(|raw| raw.parse().ok()),
            username: var("NODAL_USERNAME"),
            password: var("NODAL_PASSWORD"),
            domain: var("NODAL_DOMAIN"),
            collection: None,
            edge: None,
            extra: BTreeMap::new(),
        }
    }

    /// Whether this configuration names an edge collection.
    #[must_use]
    pub fn is_edge(&self) -> bool {
        self.edge.unwrap_or(false)
    }

    /// Merge with an override configuration, producing a new value.
    ///
    /// Set fields of `over` win on collision; fields `over` leaves unset
    /// fall back to `self`. `extra` keys union with override precedence.
    /// The merge is NOT symmetric — order matters.
    #[must_use]
    pub fn merged(&self, over: &Self) -> Self {
        let mut extra = self.extra.clone();
        for (k, v) in &over.extra {
            extra.insert(k.clone(), v.clone());
        }
        Self {
            protocol: over.protocol.clone().or_else(|| self.protocol.clone()),
            host: over.host.clone().or_else(|| self.host.clone()),
            port: over.port.or(self.port),
            username: over.username.clone().or_else(|| self.username.clone()),
            password: over.password.clone().or_else(|| self.password.clone()),
            domain: over.domain.clone().or_else(|| self.domain.clone()),
            collection: over.collection.clone().or_else(|| self.collection.clone()),
            edge: over.edge.or(self.edge),
            extra,
        }
    }

    /// Fill required connection fields, only where absent.
    ///
    /// A present value is never overwritten, even an invalid one — the
    /// type guard at the serde boundary is the only correction applied.
    #[must_use]
    pub fn with_defaults(&self, defaults: &Defaults) -> Self {
        let mut out = self.clone();
        out.protocol = out.protocol.or_else(|| Some(DEFAULT_PROTOCOL.to_string()));
        out.host = out.host.or_else(|| Some(defaults.host.clone()));
        out.port = out.port.or(Some(defaults.port));
        out.username = out.username.or_else(|| Some(String::new()));
        out.password = out.password.or_else(|| Some(String::new()));
        out
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn with_defaults_fills_only_absent_fields() {
        let config = StoreConfig {
            host: Some("db.internal".to_string()),
            ..StoreConfig::default()
        };
        let filled = config.with_defaults(&Defaults::default());

        assert_eq!(filled.host.as_deref(), Some("db.internal"));
        assert_eq!(filled.protocol.as_deref(), Some(DEFAULT_PROTOCOL));
        assert_eq!(filled.port, Some(DEFAULT_PORT));
        assert_eq!(filled.username.as_deref(), Some(""));
        assert_eq!(filled.password.as_deref(), Some(""));
    }

    #[test]
    fn with_defaults_never_overwrites_present_values() {
        let config = StoreConfig {
            protocol: Some("https".to_string()),
            port: Some(443),
            username: Some("svc".to_string()),
            ..StoreConfig::default()
        };
        let filled = config.with_defaults(&Defaults::default());

        assert_eq!(filled.protocol.as_deref(), Some("https"));
        assert_eq!(filled.port, Some(443));
        assert_eq!(filled.username.as_deref(), Some("svc"));
    }

    #[test]
    fn merged_override_wins_on_collision() {
        let base = StoreConfig {
            host: Some("a".to_string()),
            port: Some(1),
            domain: Some("left".to_string()),
            ..StoreConfig::default()
        };
        let over = StoreConfig {
            port: Some(2),
            domain: Some("right".to_string()),
            ..StoreConfig::default()
        };

        let merged = base.merged(&over);
        assert_eq!(merged.host.as_deref(), Some("a"));
        assert_eq!(merged.port, Some(2));
        assert_eq!(merged.domain.as_deref(), Some("right"));
    }

    #[test]
    fn merged_is_not_symmetric() {
        let a = StoreConfig {
            domain: Some("a".to_string()),
            ..StoreConfig::default()
        };
        let b = StoreConfig {
            domain: Some("b".to_string()),
            ..StoreConfig::default()
        };

        assert_eq!(a.merged(&b).domain.as_deref(), Some("b"));
        assert_eq!(b.merged(&a).domain.as_deref(), Some("a"));
    }

    #[test]
    fn merged_unions_extra_with_override_precedence() {
        let mut base = StoreConfig::default();
        base.extra.insert("retries".to_string(), json!(3));
        base.extra.insert("pool".to_string(), json!("small"));
        let mut over = StoreConfig::default();
        over.extra.insert("retries".to_string(), json!(9));

        let merged = base.merged(&over);
        assert_eq!(merged.extra.get("retries"), Some(&json!(9)));
        assert_eq!(merged.extra.get("pool"), Some(&json!("small")));
    }

    #[test]
    fn non_string_protocol_is_treated_as_absent() {
        let config: StoreConfig =
            serde_json::from_value(json!({ "protocol": 8529, "host": "h" })).expect("deserialize");
        assert_eq!(config.protocol, None);

        let filled = config.with_defaults(&Defaults::default());
        assert_eq!(filled.protocol.as_deref(), Some(DEFAULT_PROTOCOL));
    }

    #[test]
    fn toml_round_trip_preserves_passthrough_keys() {
        let config = StoreConfig::from_toml_str(
            r#"
            host = "db.internal"
            port = 9999
            domain = "crm"
            pool = "large"
            "#,
        )
        .expect("parse");

        assert_eq!(config.host.as_deref(), Some("db.internal"));
        assert_eq!(config.port, Some(9999));
        assert_eq!(config.domain.as_deref(), Some("crm"));
        assert_eq!(config.extra.get("pool"), Some(&json!("large")));
    }

    #[test]
    fn toml_rejects_malformed_text() {
        assert!(matches!(
            StoreConfig::from_toml_str("host = "),
            Err(NodalError::Configuration(_))
        ));
    }
}
