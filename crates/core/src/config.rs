use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub pricing: PricingConfig,
    pub coupon: CouponConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PricingConfig {
    pub currency: String,
    pub full_reduction: Vec<FullReductionRule>,
    pub shipping: ShippingConfig,
    pub points: PointsConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullReductionRule {
    #[serde(default = "default_full_reduction_key")]
    pub key: String,
    pub threshold: Decimal,
    pub reduction: Decimal,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShippingConfig {
    pub flat_fee: Decimal,
    pub free_threshold: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointsConfig {
    /// Points worth 1.00. Zero disables points redemption.
    pub points_per_unit: u32,
}

#[derive(Clone, Debug, Default)]
pub struct CouponConfig {
    /// Codes the local provider claims. `None` claims every code.
    pub local_code_prefix: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub currency: Option<String>,
    pub local_code_prefix: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

fn default_full_reduction_key() -> String {
    "full_reduction".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://checkout.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            pricing: PricingConfig::default(),
            coupon: CouponConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            full_reduction: vec![FullReductionRule {
                key: default_full_reduction_key(),
                threshold: Decimal::new(10_000, 2),
                reduction: Decimal::new(1000, 2),
                priority: 0,
            }],
            shipping: ShippingConfig { flat_fee: Decimal::ZERO, free_threshold: None },
            points: PointsConfig { points_per_unit: 100 },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("checkout.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(currency) = pricing.currency {
                self.pricing.currency = currency;
            }
            if let Some(rules) = pricing.full_reduction {
                self.pricing.full_reduction = rules;
            }
            if let Some(shipping) = pricing.shipping {
                if let Some(flat_fee) = shipping.flat_fee {
                    self.pricing.shipping.flat_fee = flat_fee;
                }
                if let Some(free_threshold) = shipping.free_threshold {
                    self.pricing.shipping.free_threshold = Some(free_threshold);
                }
            }
            if let Some(points) = pricing.points {
                if let Some(points_per_unit) = points.points_per_unit {
                    self.pricing.points.points_per_unit = points_per_unit;
                }
            }
        }

        if let Some(coupon) = patch.coupon {
            if let Some(prefix) = coupon.local_code_prefix {
                self.coupon.local_code_prefix = Some(prefix);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CHECKOUT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CHECKOUT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("CHECKOUT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CHECKOUT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CHECKOUT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CHECKOUT_PRICING_CURRENCY") {
            self.pricing.currency = value;
        }
        if let Some(value) = read_env("CHECKOUT_SHIPPING_FLAT_FEE") {
            self.pricing.shipping.flat_fee = parse_decimal("CHECKOUT_SHIPPING_FLAT_FEE", &value)?;
        }
        if let Some(value) = read_env("CHECKOUT_SHIPPING_FREE_THRESHOLD") {
            self.pricing.shipping.free_threshold =
                Some(parse_decimal("CHECKOUT_SHIPPING_FREE_THRESHOLD", &value)?);
        }
        if let Some(value) = read_env("CHECKOUT_POINTS_PER_UNIT") {
            self.pricing.points.points_per_unit = parse_u32("CHECKOUT_POINTS_PER_UNIT", &value)?;
        }

        if let Some(value) = read_env("CHECKOUT_COUPON_LOCAL_PREFIX") {
            self.coupon.local_code_prefix = Some(value);
        }

        let log_level =
            read_env("CHECKOUT_LOGGING_LEVEL").or_else(|| read_env("CHECKOUT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CHECKOUT_LOGGING_FORMAT").or_else(|| read_env("CHECKOUT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(currency) = overrides.currency {
            self.pricing.currency = currency;
        }
        if let Some(prefix) = overrides.local_code_prefix {
            self.coupon.local_code_prefix = Some(prefix);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_pricing(&self.pricing)?;
        validate_coupon(&self.coupon)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("checkout.toml"), PathBuf::from("config/checkout.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    let currency = pricing.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Err(ConfigError::Validation(format!(
            "pricing.currency must be a three-letter ISO code such as `USD`, got `{currency}`"
        )));
    }

    let mut keys = HashSet::new();
    for rule in &pricing.full_reduction {
        if rule.key.trim().is_empty() {
            return Err(ConfigError::Validation(
                "pricing.full_reduction[].key must not be empty".to_string(),
            ));
        }
        if !keys.insert(rule.key.as_str()) {
            return Err(ConfigError::Validation(format!(
                "pricing.full_reduction key `{}` is declared more than once",
                rule.key
            )));
        }
        if rule.threshold < Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "pricing.full_reduction `{}` threshold must not be negative",
                rule.key
            )));
        }
        if rule.reduction <= Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "pricing.full_reduction `{}` reduction must be greater than zero",
                rule.key
            )));
        }
    }

    if pricing.shipping.flat_fee < Decimal::ZERO {
        return Err(ConfigError::Validation(
            "pricing.shipping.flat_fee must not be negative".to_string(),
        ));
    }
    if pricing.shipping.free_threshold.is_some_and(|threshold| threshold < Decimal::ZERO) {
        return Err(ConfigError::Validation(
            "pricing.shipping.free_threshold must not be negative".to_string(),
        ));
    }

    Ok(())
}

fn validate_coupon(coupon: &CouponConfig) -> Result<(), ConfigError> {
    if coupon.local_code_prefix.as_deref().is_some_and(|prefix| prefix.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "coupon.local_code_prefix must not be blank; omit it to claim every code".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    pricing: Option<PricingPatch>,
    coupon: Option<CouponPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    currency: Option<String>,
    full_reduction: Option<Vec<FullReductionRule>>,
    shipping: Option<ShippingPatch>,
    points: Option<PointsPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ShippingPatch {
    flat_fee: Option<Decimal>,
    free_threshold: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct PointsPatch {
    points_per_unit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CouponPatch {
    local_code_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;
        ensure(config.pricing.currency == "USD", "default currency should be USD")?;
        ensure(config.pricing.full_reduction.len() == 1, "one default full reduction rule")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation_and_pricing_rules() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_CHECKOUT_DB", "sqlite://from-env-interpolation.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("checkout.toml");
            fs::write(
                &path,
                r#"
[database]
url = "${TEST_CHECKOUT_DB}"

[pricing]
currency = "CNY"

[[pricing.full_reduction]]
key = "spend_200"
threshold = "200.00"
reduction = "30.00"
priority = 5

[[pricing.full_reduction]]
threshold = "100.00"
reduction = "10.00"

[pricing.shipping]
flat_fee = "8.00"
free_threshold = "99.00"

[coupon]
local_code_prefix = "LC-"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-env-interpolation.db",
                "database url should be interpolated from environment",
            )?;
            ensure(config.pricing.currency == "CNY", "currency should come from file")?;
            ensure(config.pricing.full_reduction.len() == 2, "two rules should be loaded")?;
            ensure(
                config.pricing.full_reduction[0].key == "spend_200"
                    && config.pricing.full_reduction[0].priority == 5,
                "first rule keeps key and priority",
            )?;
            ensure(
                config.pricing.full_reduction[1].key == "full_reduction",
                "rule key defaults to full_reduction",
            )?;
            ensure(
                config.pricing.shipping.flat_fee == Decimal::new(800, 2)
                    && config.pricing.shipping.free_threshold == Some(Decimal::new(9900, 2)),
                "shipping should come from file",
            )?;
            ensure(
                config.coupon.local_code_prefix.as_deref() == Some("LC-"),
                "local coupon prefix should come from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_CHECKOUT_DB"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CHECKOUT_LOG_LEVEL", "warn");
        env::set_var("CHECKOUT_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["CHECKOUT_LOG_LEVEL", "CHECKOUT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CHECKOUT_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("CHECKOUT_SHIPPING_FLAT_FEE", "12.50");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("checkout.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[pricing.shipping]
flat_fee = "5.00"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.pricing.shipping.flat_fee == Decimal::new(1250, 2),
                "env shipping fee should win over file",
            )?;
            Ok(())
        })();

        clear_vars(&["CHECKOUT_DATABASE_URL", "CHECKOUT_SHIPPING_FLAT_FEE"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CHECKOUT_PRICING_CURRENCY", "dollars");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("pricing.currency")
            );
            ensure(has_message, "validation failure should mention pricing.currency")
        })();

        clear_vars(&["CHECKOUT_PRICING_CURRENCY"]);
        result
    }

    #[test]
    fn malformed_decimal_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CHECKOUT_SHIPPING_FREE_THRESHOLD", "lots");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected env override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "CHECKOUT_SHIPPING_FREE_THRESHOLD"),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["CHECKOUT_SHIPPING_FREE_THRESHOLD"]);
        result
    }

    #[test]
    fn duplicate_promotion_keys_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("checkout.toml");
        fs::write(
            &path,
            r#"
[[pricing.full_reduction]]
threshold = "100.00"
reduction = "10.00"

[[pricing.full_reduction]]
threshold = "200.00"
reduction = "25.00"
"#,
        )
        .map_err(|err| err.to_string())?;

        let error = match AppConfig::load(LoadOptions {
            config_path: Some(path),
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected duplicate key failure".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("more than once")),
            "validation should report duplicate promotion key",
        )
    }
}
