//! Compass CLI - database migrations, account management and sample data.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! compass migrate
//!
//! # Create an administrator (password from --password or COMPASS_NEW_USER_PASSWORD)
//! compass user create -e admin@example.com -r admin
//!
//! # Deactivate or reactivate an account
//! compass user deactivate -e someone@example.com
//! compass user activate -e someone@example.com
//!
//! # Insert the sample complaints, optionally clearing existing ones
//! compass seed --clear
//! ```
//!
//! # Environment Variables
//!
//! - `COMPASS_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "compass")]
#[command(author, version, about = "Compass CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Insert sample complaints
    Seed {
        /// Delete every existing complaint first
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new account
    Create {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account role (`user`, `admin`)
        #[arg(short, long, default_value = "user")]
        role: String,

        /// Password (falls back to `COMPASS_NEW_USER_PASSWORD`)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Prevent an account from logging in
    Deactivate {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
    /// Allow a deactivated account to log in again
    Activate {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Create {
                email,
                role,
                password,
            } => {
                commands::users::create(&email, &role, password).await?;
            }
            UserAction::Deactivate { email } => {
                commands::users::set_active(&email, false).await?;
            }
            UserAction::Activate { email } => {
                commands::users::set_active(&email, true).await?;
            }
        },
        Commands::Seed { clear } => {
            commands::seed::complaints(clear).await?;
        }
    }
    Ok(())
}
