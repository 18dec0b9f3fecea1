pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use checkout_core::config::{AppConfig, LoadOptions, LogFormat};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::coupon::CouponAction;

#[derive(Debug, Parser)]
#[command(
    name = "checkout",
    about = "Checkout pricing operator CLI",
    long_about = "Apply migrations, load demo data, inspect configuration, dry-run cart pricing and drive coupon lifecycles.",
    after_help = "Examples:\n  checkout migrate\n  checkout price --cart cart.json --coupon SAVE10\n  checkout coupon lock --code SAVE10 --user user-demo"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo catalog and coupons, then verify them")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Price a cart file without reserving coupons or stock")]
    Price {
        #[arg(long, help = "Path to a JSON cart file")]
        cart: PathBuf,
        #[arg(long, help = "Coupon code overriding the one in the cart file")]
        coupon: Option<String>,
        #[arg(long, help = "User id overriding the one in the cart file")]
        user: Option<String>,
    },
    #[command(about = "Find, lock, unlock or redeem a coupon in the configured store")]
    Coupon {
        #[arg(value_enum)]
        action: CouponAction,
        #[arg(long)]
        code: String,
        #[arg(long)]
        user: String,
        #[arg(long, help = "Order id recorded on redemption")]
        order: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Price { cart, coupon, user } => commands::price::run(&cart, coupon, user),
        Command::Coupon { action, code, user, order } => {
            commands::coupon::run(action, &code, &user, order)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays a single JSON payload. A broken config
/// still gets logging at the defaults; the command itself reports the error.
fn init_logging() {
    let logging = AppConfig::load(LoadOptions::default())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);

    let _ = match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
