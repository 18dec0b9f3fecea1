use std::fmt;

use clap::ValueEnum;
use serde::Serialize;
use serde_json::json;

use checkout_core::config::AppConfig;
use checkout_core::coupon::CouponProviderChain;
use checkout_core::domain::coupon::{Coupon, CouponMetadata};
use checkout_core::domain::user::UserId;
use checkout_db::{connect_with_config, migrations, LocalCouponProvider, SqlCouponRepository};

use crate::commands::{
    load_config, runtime, CommandResult, EXIT_DB_CONNECTIVITY, EXIT_MIGRATION, EXIT_REJECTED,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CouponAction {
    Find,
    Lock,
    Unlock,
    Redeem,
}

impl fmt::Display for CouponAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Find => "find",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::Redeem => "redeem",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize)]
struct CouponReport {
    action: String,
    code: String,
    user: String,
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    coupon: Option<Coupon>,
}

/// Runs a single lifecycle step against the configured coupon store.
pub fn run(action: CouponAction, code: &str, user: &str, order: Option<String>) -> CommandResult {
    let config = match load_config("coupon") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("coupon") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let user = UserId(user.to_string());
    let result = runtime.block_on(execute(&config, action, code, &user, order));

    match result {
        Ok(report) if report.accepted => {
            CommandResult::report("coupon", format!("{action} succeeded for `{code}`"), &report)
        }
        Ok(_) => CommandResult::failure(
            "coupon",
            "coupon_rejected",
            format!("{action} was rejected for coupon `{code}` and user `{user}`"),
            EXIT_REJECTED,
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("coupon", error_class, message, exit_code)
        }
    }
}

pub fn chain_for(config: &AppConfig, repository: SqlCouponRepository) -> CouponProviderChain {
    let provider = LocalCouponProvider::new(repository);
    let provider = match config.coupon.local_code_prefix.as_deref() {
        Some(prefix) => provider.with_code_prefix(prefix),
        None => provider,
    };
    CouponProviderChain::new().with_provider(provider)
}

async fn execute(
    config: &AppConfig,
    action: CouponAction,
    code: &str,
    user: &UserId,
    order: Option<String>,
) -> Result<CouponReport, (&'static str, String, u8)> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

    let chain = chain_for(config, SqlCouponRepository::new(pool.clone()));
    let mut coupon = None;
    let accepted = match action {
        CouponAction::Find => {
            coupon = chain.find_by_code(code, user).await;
            coupon.is_some()
        }
        CouponAction::Lock => chain.lock(code, user).await,
        CouponAction::Unlock => chain.unlock(code, user).await,
        CouponAction::Redeem => {
            let mut metadata = CouponMetadata::new();
            metadata.insert("user_id".to_string(), json!(user.0));
            metadata.insert("channel".to_string(), json!("cli"));
            if let Some(order_id) = order {
                metadata.insert("order_id".to_string(), json!(order_id));
            }
            chain.redeem(code, user, metadata).await
        }
    };
    pool.close().await;

    Ok(CouponReport {
        action: action.to_string(),
        code: code.to_string(),
        user: user.0.clone(),
        accepted,
        coupon,
    })
}
