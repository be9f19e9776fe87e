mod common;

use std::time::{Duration, Instant};

use anyhow::Result;
use common::*;
use dx_discuss::model::{DiscussionFilter, DiscussionKind, NewDiscussion, NewMessage};
use dx_discuss::{Deadline, DiscussionError};
use uuid::Uuid;

#[tokio::test]
async fn teacher_reply_joins_discussion() -> Result<()> {
    let fx = fixture()?;

    let created = fx
        .service
        .create_discussion(NewDiscussion::new(COURSE, "Intro"), STUDENT, deadline())
        .await?;
    assert_eq!(created.participants.len(), 1);
    assert_eq!(created.participants[0].user_id, STUDENT);
    assert_eq!(created.kind, DiscussionKind::General);
    assert!(created.is_active);
    assert!(!created.is_pinned);
    assert_eq!(created.creator.as_ref().map(|c| c.id.as_str()), Some(STUDENT));

    let message = fx
        .service
        .add_message(created.id, TEACHER, NewMessage::text("Welcome!"), deadline())
        .await?;
    assert_eq!(message.user, TEACHER);
    assert!(!message.edited);
    assert_eq!(message.author.as_ref().map(|a| a.id.as_str()), Some(TEACHER));

    let loaded = fx
        .service
        .get_discussion(created.id, None, deadline())
        .await?;
    assert_eq!(loaded.message_count, 1);
    assert_eq!(loaded.messages.len(), 1);
    assert_eq!(loaded.messages[0].content, "Welcome!");
    let users: Vec<&str> = loaded.participants.iter().map(|p| p.user_id.as_str()).collect();
    assert_eq!(users, vec![STUDENT, TEACHER]);
    assert!(loaded.last_activity >= created.last_activity);
    Ok(())
}

#[tokio::test]
async fn same_emoji_twice_toggles_off() -> Result<()> {
    let fx = fixture()?;
    let d = fx
        .service
        .create_discussion(NewDiscussion::new(COURSE, "Reactions"), STUDENT, deadline())
        .await?;
    let m = fx
        .service
        .add_message(d.id, STUDENT, NewMessage::text("hello"), deadline())
        .await?;
    let before = fx.service.get_discussion(d.id, None, deadline()).await?;

    let first = fx
        .service
        .add_or_toggle_reaction(d.id, m.id, STUDENT, "👍", deadline())
        .await?;
    assert_eq!(first.reactions.len(), 1);
    assert_eq!(first.reactions[0].user_id, STUDENT);
    assert_eq!(first.reactions[0].emoji, "👍");

    let second = fx
        .service
        .add_or_toggle_reaction(d.id, m.id, STUDENT, "👍", deadline())
        .await?;
    assert!(second.reactions.is_empty());

    // Reactions are not activity
    let after = fx.service.get_discussion(d.id, None, deadline()).await?;
    assert_eq!(after.last_activity, before.last_activity);
    Ok(())
}

#[tokio::test]
async fn reactions_are_keyed_by_user_and_emoji() -> Result<()> {
    let fx = fixture()?;
    let d = fx
        .service
        .create_discussion(NewDiscussion::new(COURSE, "Keys"), STUDENT, deadline())
        .await?;
    let m = fx
        .service
        .add_message(d.id, STUDENT, NewMessage::text("hello"), deadline())
        .await?;

    for (user, emoji) in [(STUDENT, "👍"), (STUDENT, "🎉"), (OTHER_STUDENT, "👍")] {
        fx.service
            .add_or_toggle_reaction(d.id, m.id, user, emoji, deadline())
            .await?;
    }
    let message = fx
        .service
        .add_or_toggle_reaction(d.id, m.id, OTHER_STUDENT, "👍", deadline())
        .await?;
    assert_eq!(message.reactions.len(), 2);
    assert!(message.has_reaction(STUDENT, "👍"));
    assert!(message.has_reaction(STUDENT, "🎉"));
    assert!(!message.has_reaction(OTHER_STUDENT, "👍"));

    let err = fx
        .service
        .add_or_toggle_reaction(d.id, m.id, STUDENT, "  ", deadline())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscussionError::InvalidArgument(_)));

    let err = fx
        .service
        .add_or_toggle_reaction(d.id, Uuid::new_v4(), STUDENT, "👍", deadline())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscussionError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn outsider_cannot_create_or_post() -> Result<()> {
    let fx = fixture()?;

    let err = fx
        .service
        .create_discussion(NewDiscussion::new(COURSE, "Sneaky"), OUTSIDER, deadline())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscussionError::Forbidden(_)));

    let d = fx
        .service
        .create_discussion(NewDiscussion::new(COURSE, "Members only"), STUDENT, deadline())
        .await?;
    let err = fx
        .service
        .add_message(d.id, OUTSIDER, NewMessage::text("hi"), deadline())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscussionError::Forbidden(_)));

    let err = fx
        .service
        .create_discussion(NewDiscussion::new("no-such-course", "Lost"), STUDENT, deadline())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscussionError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn only_author_or_teacher_deletes() -> Result<()> {
    let fx = fixture()?;
    let d = fx
        .service
        .create_discussion(NewDiscussion::new(COURSE, "Deletes"), STUDENT, deadline())
        .await?;
    let own = fx
        .service
        .add_message(d.id, STUDENT, NewMessage::text("mine"), deadline())
        .await?;
    let second = fx
        .service
        .add_message(d.id, STUDENT, NewMessage::text("also mine"), deadline())
        .await?;
    let third = fx
        .service
        .add_message(d.id, STUDENT, NewMessage::text("teacher removes this"), deadline())
        .await?;

    fx.service
        .delete_message(d.id, own.id, STUDENT, deadline())
        .await?;
    let loaded = fx.service.get_discussion(d.id, None, deadline()).await?;
    assert_eq!(loaded.message_count, 2);
    assert!(loaded.message(own.id).is_none());

    let err = fx
        .service
        .delete_message(d.id, second.id, OTHER_STUDENT, deadline())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscussionError::Forbidden(_)));

    fx.service
        .delete_message(d.id, third.id, TEACHER, deadline())
        .await?;
    let loaded = fx.service.get_discussion(d.id, None, deadline()).await?;
    assert_eq!(loaded.message_count, 1);
    assert_eq!(loaded.messages.len(), loaded.message_count);

    let err = fx
        .service
        .delete_message(d.id, own.id, STUDENT, deadline())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscussionError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn pinned_discussion_lists_first() -> Result<()> {
    let fx = fixture()?;
    let mut ids = Vec::new();
    for title in ["First", "Second", "Third"] {
        let d = fx
            .service
            .create_discussion(NewDiscussion::new(COURSE, title), STUDENT, deadline())
            .await?;
        ids.push(d.id);
    }
    let pinned = fx
        .service
        .set_pinned(ids[0], TEACHER, true, deadline())
        .await?;
    assert!(pinned.is_pinned);

    let page = fx
        .service
        .list_discussions(COURSE, DiscussionFilter::default(), 1, 1, deadline())
        .await?;
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, ids[0]);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.total, 3);

    // Remaining pages by most recent activity
    let page2 = fx
        .service
        .list_discussions(COURSE, DiscussionFilter::default(), 2, 1, deadline())
        .await?;
    assert_eq!(page2.items[0].id, ids[2]);
    let page3 = fx
        .service
        .list_discussions(COURSE, DiscussionFilter::default(), 3, 1, deadline())
        .await?;
    assert_eq!(page3.items[0].id, ids[1]);

    let err = fx
        .service
        .set_pinned(ids[1], STUDENT, true, deadline())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscussionError::Forbidden(_)));
    Ok(())
}

#[tokio::test]
async fn listing_filters_and_validates_paging() -> Result<()> {
    let fx = fixture()?;
    fx.service
        .create_discussion(
            NewDiscussion::new(COURSE, "Lesson one question")
                .kind(DiscussionKind::Question)
                .lesson("lesson-1"),
            STUDENT,
            deadline(),
        )
        .await?;
    fx.service
        .create_discussion(NewDiscussion::new(COURSE, "General chat"), STUDENT, deadline())
        .await?;

    let questions = fx
        .service
        .list_discussions(
            COURSE,
            DiscussionFilter {
                lesson_id: None,
                kind: Some(DiscussionKind::Question),
            },
            1,
            20,
            deadline(),
        )
        .await?;
    assert_eq!(questions.total, 1);
    assert_eq!(questions.items[0].title, "Lesson one question");

    let lesson = fx
        .service
        .list_discussions(
            COURSE,
            DiscussionFilter {
                lesson_id: Some("lesson-2".to_string()),
                kind: None,
            },
            1,
            20,
            deadline(),
        )
        .await?;
    assert!(lesson.items.is_empty());
    assert_eq!(lesson.total_pages, 1);

    for (page, limit) in [(0, 20), (1, 0), (-1, 5)] {
        let err = fx
            .service
            .list_discussions(COURSE, DiscussionFilter::default(), page, limit, deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscussionError::InvalidArgument(_)));
    }

    let same_a = fx
        .service
        .list_discussions(COURSE, DiscussionFilter::default(), 1, 20, deadline())
        .await?;
    let same_b = fx
        .service
        .list_discussions(COURSE, DiscussionFilter::default(), 1, 20, deadline())
        .await?;
    let order_a: Vec<Uuid> = same_a.items.iter().map(|s| s.id).collect();
    let order_b: Vec<Uuid> = same_b.items.iter().map(|s| s.id).collect();
    assert_eq!(order_a, order_b);
    Ok(())
}

#[tokio::test]
async fn viewing_is_idempotent_presence() -> Result<()> {
    let fx = fixture()?;
    let d = fx
        .service
        .create_discussion(NewDiscussion::new(COURSE, "Presence"), STUDENT, deadline())
        .await?;

    let once = fx
        .service
        .get_discussion(d.id, Some(OTHER_STUDENT), deadline())
        .await?;
    assert_eq!(once.participants.len(), 2);
    let first_seen = once.participant(OTHER_STUDENT).map(|p| p.last_seen);

    let mut last = once;
    for _ in 0..3 {
        last = fx
            .service
            .get_discussion(d.id, Some(OTHER_STUDENT), deadline())
            .await?;
    }
    assert_eq!(last.participants.len(), 2);
    let participant = last.participant(OTHER_STUDENT).unwrap();
    assert!(Some(participant.last_seen) >= first_seen);
    assert!(participant.joined_at <= participant.last_seen);

    // Outsiders may read but are not recorded
    let viewed = fx
        .service
        .get_discussion(d.id, Some(OUTSIDER), deadline())
        .await?;
    assert!(viewed.participant(OUTSIDER).is_none());
    Ok(())
}

#[tokio::test]
async fn invalid_messages_are_rejected() -> Result<()> {
    let fx = fixture()?;
    let d = fx
        .service
        .create_discussion(NewDiscussion::new(COURSE, "Validation"), STUDENT, deadline())
        .await?;

    let err = fx
        .service
        .add_message(d.id, STUDENT, NewMessage::text("   "), deadline())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscussionError::InvalidArgument(_)));

    let mut file = NewMessage::file("https://cdn.example.com/notes.pdf", "notes.pdf");
    file.file_url = None;
    let err = fx
        .service
        .add_message(d.id, STUDENT, file, deadline())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscussionError::InvalidArgument(_)));

    let attached = fx
        .service
        .add_message(
            d.id,
            STUDENT,
            NewMessage::file("https://cdn.example.com/notes.pdf", "notes.pdf"),
            deadline(),
        )
        .await?;
    assert_eq!(attached.file_name.as_deref(), Some("notes.pdf"));

    let err = fx
        .service
        .add_message(Uuid::new_v4(), STUDENT, NewMessage::text("hi"), deadline())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscussionError::NotFound(_)));

    let err = fx
        .service
        .get_discussion(Uuid::new_v4(), None, deadline())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscussionError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn expired_call_leaves_no_partial_write() -> Result<()> {
    let fx = fixture()?;
    let d = fx
        .service
        .create_discussion(NewDiscussion::new(COURSE, "Deadlines"), STUDENT, deadline())
        .await?;

    let expired = Deadline::at(Instant::now() - Duration::from_millis(1));
    let err = fx
        .service
        .add_message(d.id, TEACHER, NewMessage::text("too late"), expired)
        .await
        .unwrap_err();
    assert!(matches!(err, DiscussionError::Timeout));

    let loaded = fx.service.get_discussion(d.id, None, deadline()).await?;
    assert_eq!(loaded.message_count, 0);
    assert!(loaded.messages.is_empty());
    assert!(loaded.participant(TEACHER).is_none());
    Ok(())
}

#[tokio::test]
async fn round_trip_preserves_fields() -> Result<()> {
    let fx = fixture()?;
    let created = fx
        .service
        .create_discussion(
            NewDiscussion::new(COURSE, "Round trip")
                .description("All the fields")
                .kind(DiscussionKind::Announcement)
                .lesson("lesson-7")
                .tags(["rust", "ownership"]),
            TEACHER,
            deadline(),
        )
        .await?;
    let loaded = fx
        .service
        .get_discussion(created.id, None, deadline())
        .await?;

    assert_eq!(loaded.title, created.title);
    assert_eq!(loaded.description, "All the fields");
    assert_eq!(loaded.kind, DiscussionKind::Announcement);
    assert_eq!(loaded.lesson_id.as_deref(), Some("lesson-7"));
    assert_eq!(loaded.tags, created.tags);
    assert_eq!(loaded.created_at, created.created_at);
    assert_eq!(loaded.participants, created.participants);
    Ok(())
}
