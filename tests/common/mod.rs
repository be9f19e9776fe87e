#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use dx_discuss::directory::{Course, InMemoryDirectory, UserProfile};
use dx_discuss::storage::{self, DiscussionStore};
use dx_discuss::{Deadline, DiscussionService, RetryPolicy};
use tempfile::TempDir;

pub const COURSE: &str = "course-c";
pub const TEACHER: &str = "teacher-t";
pub const STUDENT: &str = "student-s";
pub const OTHER_STUDENT: &str = "student-r";
pub const OUTSIDER: &str = "outsider-u";

pub struct Fixture {
    pub service: Arc<DiscussionService>,
    pub directory: Arc<InMemoryDirectory>,
    // Keeps the database file alive for the duration of the test
    pub dir: TempDir,
}

pub fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(10))
}

pub fn directory() -> InMemoryDirectory {
    let directory = InMemoryDirectory::new();
    directory.insert_course(Course::new(COURSE, TEACHER).with_students([STUDENT, OTHER_STUDENT]));
    for id in [TEACHER, STUDENT, OTHER_STUDENT, OUTSIDER] {
        directory.insert_user(UserProfile {
            id: id.to_string(),
            username: format!("{id}-name"),
            email: format!("{id}@example.com"),
            avatar_url: None,
        });
    }
    directory
}

pub fn fixture() -> anyhow::Result<Fixture> {
    let dir = TempDir::new()?;
    let db = storage::open(dir.path(), Duration::from_secs(2))?;
    let store = DiscussionStore::new(db, 64);
    let directory = Arc::new(directory());

    let service = DiscussionService::new(store, directory.clone(), directory.clone())
        .with_read_retry(RetryPolicy::default());

    Ok(Fixture {
        service: Arc::new(service),
        directory,
        dir,
    })
}
