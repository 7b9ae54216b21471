//! Stored duration commands.
//!
//! # Usage
//!
//! ```bash
//! bb-cli durations set "Greek Yogurt" "2 W"
//! bb-cli durations get "Greek Yogurt"
//! ```

use std::sync::Arc;

use bestby_core::{CanonicalName, DurationString};
use bestby_recognition::db::{DurationRepository, DurationStore, ItemRepository};
use bestby_recognition::identity::{IdentityResolver, RandomUids};

use super::{CommandError, connect};

/// Validate `duration` and store it for `name`.
pub async fn set(name: &str, duration: &str) -> Result<(), CommandError> {
    let name = CanonicalName::parse(name)?;
    let duration = DurationString::parse(duration)?;
    let pool = connect("CORE_DATABASE_URL").await?;

    let identities = IdentityResolver::new(
        Arc::new(ItemRepository::new(pool.clone())),
        Arc::new(RandomUids),
    );
    let item_uid = identities.resolve_or_create(&name).await?;
    DurationRepository::new(pool).upsert(&name, duration).await?;

    tracing::info!(item_uid = %item_uid, "Duration stored");
    #[allow(clippy::print_stdout)]
    {
        println!("{name}\t{duration}\t{item_uid}");
    }
    Ok(())
}

/// Print the stored duration for `name`.
pub async fn get(name: &str) -> Result<(), CommandError> {
    let name = CanonicalName::parse(name)?;
    let pool = connect("CORE_DATABASE_URL").await?;

    let duration = DurationRepository::new(pool)
        .lookup(&name)
        .await?
        .ok_or_else(|| CommandError::NotFound(format!("no duration stored for {name}")))?;

    #[allow(clippy::print_stdout)]
    {
        println!("{duration}");
    }
    Ok(())
}
