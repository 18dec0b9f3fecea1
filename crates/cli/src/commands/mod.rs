pub mod config;
pub mod coupon;
pub mod migrate;
pub mod price;
pub mod seed;

use checkout_core::config::{AppConfig, LoadOptions};
use checkout_core::errors::{ApplicationError, InterfaceError};
use serde::Serialize;
use serde_json::Value;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DB_CONNECTIVITY: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_SEED_VERIFICATION: u8 = 6;
pub const EXIT_INVALID_INPUT: u8 = 7;
pub const EXIT_REJECTED: u8 = 8;
pub const EXIT_UNAVAILABLE: u8 = 9;
pub const EXIT_INTERNAL: u8 = 10;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            hint: None,
            result: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    /// Success carrying a structured body under `result`.
    pub fn report(command: &str, message: impl Into<String>, body: &impl Serialize) -> Self {
        match serde_json::to_value(body) {
            Ok(result) => {
                let payload = CommandOutcome {
                    command: command.to_string(),
                    status: "ok".to_string(),
                    error_class: None,
                    message: message.into(),
                    hint: None,
                    result: Some(result),
                };
                Self { exit_code: 0, output: serialize_payload(payload) }
            }
            Err(error) => Self::failure(
                command,
                "serialization",
                format!("failed to serialize result: {error}"),
                EXIT_INTERNAL,
            ),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            hint: None,
            result: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Failure classified the way a request handler would classify it. The
    /// operator-facing `hint` is the interface error's user message.
    pub fn application_failure(command: &str, error: ApplicationError) -> Self {
        let message = error.to_string();
        let interface = error.into_interface(command);
        let (error_class, exit_code) = match &interface {
            InterfaceError::BadRequest { .. } => ("bad_request", EXIT_INVALID_INPUT),
            InterfaceError::Conflict { .. } => ("conflict", EXIT_REJECTED),
            InterfaceError::ServiceUnavailable { .. } => ("service_unavailable", EXIT_UNAVAILABLE),
            InterfaceError::Internal { .. } => ("internal", EXIT_INTERNAL),
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message,
            hint: Some(interface.user_message().to_string()),
            result: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

pub(crate) fn runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
