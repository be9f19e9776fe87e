//! Authorization predicates over already-loaded course and message snapshots.

use crate::directory::Course;
use crate::error::{DiscussionError, DiscussionResult};
use crate::model::Message;

/// Enrolled students and the course teacher may take part
pub fn can_participate(course: &Course, user_id: &str) -> bool {
    course.teacher_id == user_id || course.student_ids.contains(user_id)
}

/// The author of a message or the course teacher may remove it
pub fn can_moderate(course: &Course, user_id: &str, message: &Message) -> bool {
    message.user == user_id || course.teacher_id == user_id
}

pub fn is_teacher(course: &Course, user_id: &str) -> bool {
    course.teacher_id == user_id
}

pub fn require_participant(course: &Course, user_id: &str) -> DiscussionResult<()> {
    if can_participate(course, user_id) {
        Ok(())
    } else {
        Err(DiscussionError::forbidden(
            "You must be enrolled in this course or be its teacher",
        ))
    }
}

pub fn require_moderator(
    course: &Course,
    user_id: &str,
    message: &Message,
) -> DiscussionResult<()> {
    if can_moderate(course, user_id, message) {
        Ok(())
    } else {
        Err(DiscussionError::forbidden(
            "Only the author or the course teacher can delete this message",
        ))
    }
}

pub fn require_teacher(course: &Course, user_id: &str) -> DiscussionResult<()> {
    if is_teacher(course, user_id) {
        Ok(())
    } else {
        Err(DiscussionError::forbidden(
            "Only the course teacher can perform this action",
        ))
    }
}
