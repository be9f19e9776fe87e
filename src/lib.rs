//! # DX Discuss - Course-scoped discussion engine
//!
//! Threaded discussions attached to a course (and optionally a lesson):
//! messages, emoji reactions, pinning and participant presence, with
//! enrollment-based authorization and an HTTP/JSON surface.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use dx_discuss::directory::{Course, InMemoryDirectory};
//! use dx_discuss::model::NewDiscussion;
//! use dx_discuss::storage::{self, DiscussionStore};
//! use dx_discuss::{Deadline, DiscussionService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = storage::open(".dx/discuss".as_ref(), Duration::from_secs(2))?;
//!     let directory = Arc::new(InMemoryDirectory::new());
//!     directory.insert_course(Course::new("rust-101", "teacher-1"));
//!
//!     let service = DiscussionService::new(
//!         DiscussionStore::new(db, 1024),
//!         directory.clone(),
//!         directory,
//!     );
//!     let deadline = Deadline::after(Duration::from_secs(5));
//!     let discussion = service
//!         .create_discussion(NewDiscussion::new("rust-101", "Week 1"), "teacher-1", deadline)
//!         .await?;
//!     println!("created {}", discussion.id);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod deadline;
pub mod directory;
pub mod error;
pub mod guard;
pub mod logging;
pub mod model;
pub mod paging;
pub mod presence;
pub mod server;
pub mod service;
pub mod storage;

pub use config::AppConfig;
pub use deadline::Deadline;
pub use error::{DiscussionError, DiscussionResult, RetryPolicy};
pub use service::DiscussionService;
pub use storage::{Database, DiscussionStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
