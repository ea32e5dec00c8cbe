//! # Storefront Configuration
//!
//! Configuration for cart sessions: cart limits, sync timing and pricing
//! policy.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STOREFRONT_MAX_SYNC_QUANTITY=10                                    │
//! │     STOREFRONT_DETACH_POLICY=park                                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/cart/cart.toml (Linux)                                   │
//! │     ~/Library/Application Support/com.storefront.cart/cart.toml        │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # cart.toml
//! [cart]
//! max_lines = 100
//! max_line_quantity = 999
//!
//! [sync]
//! max_sync_quantity = 99
//! write_timeout_ms = 5000
//! detach_policy = "discard"  # discard | park
//!
//! [pricing]
//! currency = "USD"
//! free_shipping_threshold_minor = 5000
//! flat_shipping_fee_minor = 599
//! tax_rate_bps = 800
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use storefront_core::money::{Currency, Money};
use storefront_core::pricing::{ShippingPolicy, TaxPolicy};
use storefront_core::types::TaxRate;
use storefront_core::validation::{validate_price_minor, validate_tax_rate_bps};
use storefront_core::{DEFAULT_MAX_LINES, DEFAULT_MAX_LINE_QUANTITY, DEFAULT_MAX_SYNC_QUANTITY};

use crate::error::ConfigError;

// =============================================================================
// Detach Policy
// =============================================================================

/// What happens to the local replica on logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetachPolicy {
    /// Drop the local cart.
    #[default]
    Discard,

    /// Hand the local cart back in the `Detached` event so a later guest
    /// session can start from it.
    Park,
}

impl std::fmt::Display for DetachPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetachPolicy::Discard => write!(f, "discard"),
            DetachPolicy::Park => write!(f, "park"),
        }
    }
}

impl std::str::FromStr for DetachPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "discard" => Ok(DetachPolicy::Discard),
            "park" | "keep" => Ok(DetachPolicy::Park),
            other => Err(ConfigError::InvalidConfig(format!(
                "Unknown detach policy: '{}'. Valid options: discard, park",
                other
            ))),
        }
    }
}

// =============================================================================
// Cart Settings
// =============================================================================

/// Cart invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSettings {
    /// Maximum distinct lines per cart.
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,

    /// Maximum quantity a single line may hold.
    #[serde(default = "default_max_line_quantity")]
    pub max_line_quantity: i64,
}

fn default_max_lines() -> usize {
    DEFAULT_MAX_LINES
}

fn default_max_line_quantity() -> i64 {
    DEFAULT_MAX_LINE_QUANTITY
}

impl Default for CartSettings {
    fn default() -> Self {
        CartSettings {
            max_lines: default_max_lines(),
            max_line_quantity: default_max_line_quantity(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Replica sync behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Cap applied to guest lines written to the remote cart at merge.
    #[serde(default = "default_max_sync_quantity")]
    pub max_sync_quantity: u32,

    /// A remote write that takes longer than this is treated as failed.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,

    /// Timeout for remote cart and catalog reads.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,

    /// Initial delay before retrying failed writes (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum delay between retries (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Buffered events per subscriber before lagging.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Local replica handling on logout.
    #[serde(default)]
    pub detach_policy: DetachPolicy,
}

fn default_max_sync_quantity() -> u32 {
    DEFAULT_MAX_SYNC_QUANTITY
}
fn default_write_timeout() -> u64 {
    5_000
}
fn default_fetch_timeout() -> u64 {
    5_000
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}
fn default_event_capacity() -> usize {
    64
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            max_sync_quantity: default_max_sync_quantity(),
            write_timeout_ms: default_write_timeout(),
            fetch_timeout_ms: default_fetch_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            event_capacity: default_event_capacity(),
            detach_policy: DetachPolicy::default(),
        }
    }
}

// =============================================================================
// Pricing Settings
// =============================================================================

/// Shipping and tax policy, all amounts in minor units of `currency`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingSettings {
    #[serde(default)]
    pub currency: Currency,

    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold_minor: i64,

    #[serde(default = "default_flat_shipping_fee")]
    pub flat_shipping_fee_minor: i64,

    #[serde(default = "default_tax_rate_bps")]
    pub tax_rate_bps: u32,
}

fn default_free_shipping_threshold() -> i64 {
    5_000
}
fn default_flat_shipping_fee() -> i64 {
    599
}
fn default_tax_rate_bps() -> u32 {
    800
}

impl Default for PricingSettings {
    fn default() -> Self {
        PricingSettings {
            currency: Currency::default(),
            free_shipping_threshold_minor: default_free_shipping_threshold(),
            flat_shipping_fee_minor: default_flat_shipping_fee(),
            tax_rate_bps: default_tax_rate_bps(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete storefront cart configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorefrontConfig {
    #[serde(default)]
    pub cart: CartSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub pricing: PricingSettings,
}

impl StorefrontConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (cart.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading storefront config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load storefront config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> Result<(), ConfigError> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::SaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        info!(?path, "Storefront config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cart.max_lines == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_lines must be greater than 0".into(),
            ));
        }

        if self.cart.max_line_quantity < 1 || self.cart.max_line_quantity > i64::from(u32::MAX) {
            return Err(ConfigError::InvalidConfig(format!(
                "max_line_quantity must be between 1 and {}",
                u32::MAX
            )));
        }

        if self.sync.max_sync_quantity == 0
            || i64::from(self.sync.max_sync_quantity) > self.cart.max_line_quantity
        {
            return Err(ConfigError::InvalidConfig(format!(
                "max_sync_quantity must be between 1 and max_line_quantity ({})",
                self.cart.max_line_quantity
            )));
        }

        if self.sync.write_timeout_ms == 0 || self.sync.fetch_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "timeouts must be greater than 0".into(),
            ));
        }

        if self.sync.initial_backoff_ms == 0 || self.sync.max_backoff_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "backoff intervals must be greater than 0".into(),
            ));
        }

        if self.sync.event_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "event_capacity must be greater than 0".into(),
            ));
        }

        validate_tax_rate_bps(self.pricing.tax_rate_bps)?;
        validate_price_minor(self.pricing.free_shipping_threshold_minor)?;
        validate_price_minor(self.pricing.flat_shipping_fee_minor)?;

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Applies overrides from any `STOREFRONT_*` lookup.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(name: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(variable = name, value = %raw, "Ignoring unparsable environment override");
                    None
                }
            }
        }

        if let Some(v) = parsed("STOREFRONT_MAX_LINES", lookup("STOREFRONT_MAX_LINES")) {
            self.cart.max_lines = v;
        }
        if let Some(v) = parsed(
            "STOREFRONT_MAX_LINE_QUANTITY",
            lookup("STOREFRONT_MAX_LINE_QUANTITY"),
        ) {
            self.cart.max_line_quantity = v;
        }
        if let Some(v) = parsed(
            "STOREFRONT_MAX_SYNC_QUANTITY",
            lookup("STOREFRONT_MAX_SYNC_QUANTITY"),
        ) {
            debug!(max_sync_quantity = v, "Overriding max sync quantity from environment");
            self.sync.max_sync_quantity = v;
        }
        if let Some(v) = parsed("STOREFRONT_WRITE_TIMEOUT_MS", lookup("STOREFRONT_WRITE_TIMEOUT_MS")) {
            self.sync.write_timeout_ms = v;
        }
        if let Some(v) = parsed("STOREFRONT_FETCH_TIMEOUT_MS", lookup("STOREFRONT_FETCH_TIMEOUT_MS")) {
            self.sync.fetch_timeout_ms = v;
        }
        if let Some(v) = parsed::<DetachPolicy>(
            "STOREFRONT_DETACH_POLICY",
            lookup("STOREFRONT_DETACH_POLICY"),
        ) {
            debug!(policy = %v, "Overriding detach policy from environment");
            self.sync.detach_policy = v;
        }
        if let Some(v) = parsed::<Currency>("STOREFRONT_CURRENCY", lookup("STOREFRONT_CURRENCY")) {
            self.pricing.currency = v;
        }
        if let Some(v) = parsed("STOREFRONT_TAX_RATE_BPS", lookup("STOREFRONT_TAX_RATE_BPS")) {
            self.pricing.tax_rate_bps = v;
        }
        if let Some(v) = parsed(
            "STOREFRONT_FREE_SHIPPING_THRESHOLD",
            lookup("STOREFRONT_FREE_SHIPPING_THRESHOLD"),
        ) {
            self.pricing.free_shipping_threshold_minor = v;
        }
        if let Some(v) = parsed(
            "STOREFRONT_FLAT_SHIPPING_FEE",
            lookup("STOREFRONT_FLAT_SHIPPING_FEE"),
        ) {
            self.pricing.flat_shipping_fee_minor = v;
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "storefront", "cart")
            .map(|dirs| dirs.config_dir().join("cart.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn currency(&self) -> Currency {
        self.pricing.currency
    }

    pub fn shipping_policy(&self) -> ShippingPolicy {
        let currency = self.pricing.currency;
        ShippingPolicy::new(
            Money::new(self.pricing.free_shipping_threshold_minor, currency),
            Money::new(self.pricing.flat_shipping_fee_minor, currency),
        )
    }

    pub fn tax_policy(&self) -> TaxPolicy {
        TaxPolicy::new(TaxRate::from_bps(self.pricing.tax_rate_bps))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.sync.write_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.sync.fetch_timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.sync.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.sync.max_backoff_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_detach_policy_parsing() {
        assert_eq!("discard".parse::<DetachPolicy>().unwrap(), DetachPolicy::Discard);
        assert_eq!("PARK".parse::<DetachPolicy>().unwrap(), DetachPolicy::Park);
        assert!("invalid".parse::<DetachPolicy>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = StorefrontConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cart.max_lines, 100);
        assert_eq!(config.sync.max_sync_quantity, 99);
        assert_eq!(config.sync.detach_policy, DetachPolicy::Discard);
        assert_eq!(config.currency(), Currency::Usd);
    }

    #[test]
    fn test_config_validation() {
        let mut config = StorefrontConfig::default();
        config.cart.max_lines = 0;
        assert!(config.validate().is_err());

        let mut config = StorefrontConfig::default();
        config.sync.max_sync_quantity = 1000;
        assert!(config.validate().is_err());

        let mut config = StorefrontConfig::default();
        config.pricing.tax_rate_bps = 20_000;
        assert!(config.validate().is_err());

        let mut config = StorefrontConfig::default();
        config.pricing.flat_shipping_fee_minor = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_backoff_rejected() {
        let mut config = StorefrontConfig::default();
        config.sync.initial_backoff_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(msg)) if msg.contains("backoff")
        ));

        let mut config = StorefrontConfig::default();
        config.sync.max_backoff_secs = 0;
        assert!(config.validate().is_err());

        let mut config = StorefrontConfig::default();
        config.sync.initial_backoff_ms = 1;
        config.sync.max_backoff_secs = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("STOREFRONT_MAX_SYNC_QUANTITY", "5"),
            ("STOREFRONT_DETACH_POLICY", "park"),
            ("STOREFRONT_CURRENCY", "EUR"),
            ("STOREFRONT_TAX_RATE_BPS", "not-a-number"),
        ]);

        let mut config = StorefrontConfig::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.sync.max_sync_quantity, 5);
        assert_eq!(config.sync.detach_policy, DetachPolicy::Park);
        assert_eq!(config.currency(), Currency::Eur);
        // Unparsable values are ignored
        assert_eq!(config.pricing.tax_rate_bps, 800);
    }

    #[test]
    fn test_toml_round_trip_with_partial_file() {
        let config: StorefrontConfig = toml::from_str(
            r#"
            [sync]
            max_sync_quantity = 10
            detach_policy = "park"

            [pricing]
            currency = "GBP"
            "#,
        )
        .unwrap();
        assert_eq!(config.sync.max_sync_quantity, 10);
        assert_eq!(config.sync.write_timeout_ms, 5_000);
        assert_eq!(config.pricing.currency, Currency::Gbp);
        assert_eq!(config.cart, CartSettings::default());

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[cart]"));
        assert!(toml_str.contains("[pricing]"));
    }

    #[test]
    fn test_policies_from_config() {
        let config = StorefrontConfig::default();
        let shipping = config.shipping_policy();
        assert_eq!(shipping.free_threshold, Money::new(5000, Currency::Usd));
        assert_eq!(shipping.flat_fee, Money::new(599, Currency::Usd));
        assert_eq!(config.tax_policy().rate.bps(), 800);
        assert_eq!(config.write_timeout(), Duration::from_millis(5000));
    }
}
