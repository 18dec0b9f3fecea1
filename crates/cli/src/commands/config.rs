use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use checkout_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", &["CHECKOUT_DATABASE_URL"]),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", &["CHECKOUT_DATABASE_MAX_CONNECTIONS"]),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", &["CHECKOUT_DATABASE_TIMEOUT_SECS"]),
    ));

    lines.push(render_line(
        "pricing.currency",
        &config.pricing.currency,
        source("pricing.currency", &["CHECKOUT_PRICING_CURRENCY"]),
    ));
    let rules = config
        .pricing
        .full_reduction
        .iter()
        .map(|rule| format!("{}: {} off at {}", rule.key, rule.reduction, rule.threshold))
        .collect::<Vec<_>>();
    lines.push(render_line(
        "pricing.full_reduction",
        &if rules.is_empty() { "<none>".to_string() } else { rules.join("; ") },
        source("pricing.full_reduction", &[]),
    ));
    lines.push(render_line(
        "pricing.shipping.flat_fee",
        &config.pricing.shipping.flat_fee.to_string(),
        source("pricing.shipping.flat_fee", &["CHECKOUT_SHIPPING_FLAT_FEE"]),
    ));
    lines.push(render_line(
        "pricing.shipping.free_threshold",
        &config
            .pricing
            .shipping
            .free_threshold
            .map(|threshold| threshold.to_string())
            .unwrap_or_else(|| "<unset>".to_string()),
        source("pricing.shipping.free_threshold", &["CHECKOUT_SHIPPING_FREE_THRESHOLD"]),
    ));
    lines.push(render_line(
        "pricing.points.points_per_unit",
        &config.pricing.points.points_per_unit.to_string(),
        source("pricing.points.points_per_unit", &["CHECKOUT_POINTS_PER_UNIT"]),
    ));

    lines.push(render_line(
        "coupon.local_code_prefix",
        config.coupon.local_code_prefix.as_deref().unwrap_or("<all codes>"),
        source("coupon.local_code_prefix", &["CHECKOUT_COUPON_LOCAL_PREFIX"]),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["CHECKOUT_LOGGING_LEVEL", "CHECKOUT_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["CHECKOUT_LOGGING_FORMAT", "CHECKOUT_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    ["checkout.toml", "config/checkout.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
