//! Best By Buddy CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run recognition service migrations
//! bb-cli migrate core
//!
//! # Run gateway migrations
//! bb-cli migrate gateway
//!
//! # Pin the shelf life of an item
//! bb-cli durations set "Greek Yogurt" "2 W"
//!
//! # Inspect a purchase
//! bb-cli purchases show <purchase-uid>
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `durations` - Read and write stored item durations
//! - `items` - Resolve item identities
//! - `purchases` - Inspect recorded purchases

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "bb-cli")]
#[command(author, version, about = "Best By Buddy CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        target: MigrateTarget,
    },
    /// Manage stored item durations
    Durations {
        #[command(subcommand)]
        action: DurationAction,
    },
    /// Manage item identities
    Items {
        #[command(subcommand)]
        action: ItemAction,
    },
    /// Inspect purchases
    Purchases {
        #[command(subcommand)]
        action: PurchaseAction,
    },
}

#[derive(Subcommand)]
enum MigrateTarget {
    /// Run recognition service migrations
    Core,
    /// Run gateway migrations
    Gateway,
    /// Run all migrations
    All,
}

#[derive(Subcommand)]
enum DurationAction {
    /// Store the duration for an item, creating the item if needed
    Set {
        /// Item name
        name: String,
        /// Duration such as "4 D", "2 W", "1 M" or "1 Y"
        duration: String,
    },
    /// Print the stored duration for an item
    Get {
        /// Item name
        name: String,
    },
}

#[derive(Subcommand)]
enum ItemAction {
    /// Print the UID for an item name, creating it if needed
    Resolve {
        /// Item name
        name: String,
    },
}

#[derive(Subcommand)]
enum PurchaseAction {
    /// Print a purchase as JSON
    Show {
        /// Purchase UID
        purchase_uid: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate { target } => match target {
            MigrateTarget::Core => commands::migrate::core().await?,
            MigrateTarget::Gateway => commands::migrate::gateway().await?,
            MigrateTarget::All => {
                commands::migrate::core().await?;
                commands::migrate::gateway().await?;
            }
        },
        Commands::Durations { action } => match action {
            DurationAction::Set { name, duration } => {
                commands::durations::set(&name, &duration).await?;
            }
            DurationAction::Get { name } => commands::durations::get(&name).await?,
        },
        Commands::Items { action } => match action {
            ItemAction::Resolve { name } => commands::items::resolve(&name).await?,
        },
        Commands::Purchases { action } => match action {
            PurchaseAction::Show { purchase_uid } => {
                commands::purchases::show(&purchase_uid).await?;
            }
        },
    }
    Ok(())
}
