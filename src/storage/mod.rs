pub mod cache;
pub mod db;
pub mod store;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use cache::DiscussionCache;
pub use db::{Database, DiscussionHeader};
pub use store::DiscussionStore;

/// Create the data directory and the schema inside it
pub async fn init(data_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    let db = Database::new(data_dir)?;
    db.initialize()?;
    Ok(())
}

/// Open (and migrate) the database under `data_dir`
pub fn open(data_dir: &Path, busy_timeout: Duration) -> Result<Arc<Database>> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let db = Database::new(data_dir)?;
    db.initialize()?;
    db.set_busy_timeout(busy_timeout)?;
    Ok(Arc::new(db))
}
