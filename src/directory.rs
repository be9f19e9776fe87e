//! Read-only collaborators owned by the surrounding platform.
//!
//! The discussion engine never writes courses or users; it only resolves a
//! course to its teacher and roster, and a user id to display fields.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::DiscussionResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub teacher_id: String,
    #[serde(default)]
    pub student_ids: HashSet<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Course {
    pub fn new(id: impl Into<String>, teacher_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            teacher_id: teacher_id.into(),
            student_ids: HashSet::new(),
            is_active: true,
        }
    }

    pub fn with_students<I, S>(mut self, students: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.student_ids.extend(students.into_iter().map(Into::into));
        self
    }
}

/// Display fields attached to authors when a message or discussion is returned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait CourseRegistry: Send + Sync {
    async fn get(&self, course_id: &str) -> DiscussionResult<Option<Course>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get(&self, user_id: &str) -> DiscussionResult<Option<UserProfile>>;
}

/// Seed file layout for [`InMemoryDirectory::from_file`]
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub users: Vec<UserProfile>,
}

/// Process-local course registry and user directory
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    courses: DashMap<String, Course>,
    users: DashMap<String, UserProfile>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: DirectorySeed) -> Self {
        let directory = Self::new();
        for course in seed.courses {
            directory.insert_course(course);
        }
        for user in seed.users {
            directory.insert_user(user);
        }
        directory
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read directory seed {}", path.display()))?;
        let seed: DirectorySeed = serde_json::from_str(&raw)
            .with_context(|| format!("invalid directory seed {}", path.display()))?;
        tracing::info!(
            courses = seed.courses.len(),
            users = seed.users.len(),
            "loaded directory seed"
        );
        Ok(Self::from_seed(seed))
    }

    pub fn insert_course(&self, course: Course) {
        self.courses.insert(course.id.clone(), course);
    }

    pub fn insert_user(&self, user: UserProfile) {
        self.users.insert(user.id.clone(), user);
    }
}

#[async_trait]
impl CourseRegistry for InMemoryDirectory {
    async fn get(&self, course_id: &str) -> DiscussionResult<Option<Course>> {
        Ok(self.courses.get(course_id).map(|c| c.clone()))
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn get(&self, user_id: &str) -> DiscussionResult<Option<UserProfile>> {
        Ok(self.users.get(user_id).map(|u| u.clone()))
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_round_trip_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("directory.json");
        std::fs::write(
            &path,
            r#"{
                "courses": [{"id": "c1", "teacherId": "t1", "studentIds": ["s1"]}],
                "users": [{"id": "s1", "username": "sam", "email": "sam@example.com"}]
            }"#,
        )
        .unwrap();

        let directory = InMemoryDirectory::from_file(&path).unwrap();
        let course = CourseRegistry::get(&directory, "c1").await.unwrap().unwrap();
        assert_eq!(course.teacher_id, "t1");
        assert!(course.is_active);
        assert!(course.student_ids.contains("s1"));

        let user = UserDirectory::get(&directory, "s1").await.unwrap().unwrap();
        assert_eq!(user.username, "sam");
        assert!(UserDirectory::get(&directory, "nobody").await.unwrap().is_none());
    }
}
