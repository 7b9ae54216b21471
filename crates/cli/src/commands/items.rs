//! Item identity commands.

use std::sync::Arc;

use bestby_core::CanonicalName;
use bestby_recognition::db::ItemRepository;
use bestby_recognition::identity::{IdentityResolver, RandomUids};

use super::{CommandError, connect};

/// Print the UID for `name`, creating the item if it is new.
pub async fn resolve(name: &str) -> Result<(), CommandError> {
    let name = CanonicalName::parse(name)?;
    let pool = connect("CORE_DATABASE_URL").await?;

    let identities = IdentityResolver::new(Arc::new(ItemRepository::new(pool)), Arc::new(RandomUids));
    let item_uid = identities.resolve_or_create(&name).await?;

    #[allow(clippy::print_stdout)]
    {
        println!("{item_uid}");
    }
    Ok(())
}
