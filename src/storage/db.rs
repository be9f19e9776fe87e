use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

use crate::deadline::Deadline;
use crate::error::{DiscussionError, DiscussionResult};
use crate::model::{
    now, Discussion, DiscussionFilter, DiscussionSummary, Message, Participant, Reaction,
    ReactionToggle,
};
use crate::paging::PageRequest;

pub const DB_FILE: &str = "discussions.db";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS discussions (
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL,
        lesson_id TEXT,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        kind TEXT NOT NULL,
        tags TEXT NOT NULL DEFAULT '[]',
        is_active INTEGER NOT NULL DEFAULT 1,
        is_pinned INTEGER NOT NULL DEFAULT 0,
        created_by TEXT NOT NULL,
        message_count INTEGER NOT NULL DEFAULT 0,
        last_activity TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS participants (
        discussion_id TEXT NOT NULL REFERENCES discussions(id),
        user_id TEXT NOT NULL,
        joined_at TEXT NOT NULL,
        last_seen TEXT NOT NULL,
        PRIMARY KEY (discussion_id, user_id)
    );

    CREATE TABLE IF NOT EXISTS messages (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        discussion_id TEXT NOT NULL REFERENCES discussions(id),
        content TEXT NOT NULL,
        kind TEXT NOT NULL,
        emoji TEXT,
        file_url TEXT,
        file_name TEXT,
        user_id TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        edited INTEGER NOT NULL DEFAULT 0,
        edited_at TEXT
    );

    CREATE TABLE IF NOT EXISTS reactions (
        message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL,
        emoji TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        PRIMARY KEY (message_id, user_id, emoji)
    );

    CREATE INDEX IF NOT EXISTS idx_discussions_course
        ON discussions(course_id, is_active);

    CREATE INDEX IF NOT EXISTS idx_messages_discussion
        ON messages(discussion_id, seq);
";

const SUMMARY_COLUMNS: &str = "
    d.id, d.course_id, d.lesson_id, d.title, d.description, d.kind, d.tags,
    d.is_active, d.is_pinned, d.created_by, d.message_count, d.last_activity,
    d.created_at, d.updated_at,
    (SELECT COUNT(*) FROM participants p WHERE p.discussion_id = d.id)
";

const MESSAGE_COLUMNS: &str = "
    m.id, m.content, m.kind, m.emoji, m.file_url, m.file_name, m.user_id,
    m.timestamp, m.edited, m.edited_at
";

/// Course a discussion belongs to, and whether it still accepts messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscussionHeader {
    pub course_id: String,
    pub is_active: bool,
}

/// SQLite persistence for discussion aggregates.
///
/// Every mutation runs in one IMMEDIATE transaction, so appends, deletes,
/// reaction toggles and presence upserts are all-or-nothing per discussion.
pub struct Database {
    pub conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join(DB_FILE);
        let conn = Connection::open(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// How long SQLite itself waits on a lock held by another process
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.conn.lock().busy_timeout(timeout)?;
        Ok(())
    }

    fn lock(&self, deadline: Deadline) -> DiscussionResult<MutexGuard<'_, Connection>> {
        self.conn
            .try_lock_for(deadline.remaining())
            .ok_or(DiscussionError::Timeout)
    }

    fn read<T>(
        &self,
        deadline: Deadline,
        f: impl FnOnce(&Connection) -> DiscussionResult<T>,
    ) -> DiscussionResult<T> {
        let mut conn = self.lock(deadline)?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    fn write<T>(
        &self,
        deadline: Deadline,
        f: impl FnOnce(&Transaction<'_>) -> DiscussionResult<T>,
    ) -> DiscussionResult<T> {
        let mut conn = self.lock(deadline)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        // An expired caller has already been told the write failed; dropping
        // the transaction here rolls everything back.
        deadline.check()?;
        tx.commit()?;
        Ok(value)
    }

    pub fn insert_discussion(
        &self,
        discussion: &Discussion,
        deadline: Deadline,
    ) -> DiscussionResult<()> {
        let tags = serde_json::to_string(&discussion.tags)?;

        self.write(deadline, |tx| {
            tx.execute(
                "INSERT INTO discussions (id, course_id, lesson_id, title, description, kind,
                    tags, is_active, is_pinned, created_by, message_count, last_activity,
                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    discussion.id.to_string(),
                    discussion.course_id,
                    discussion.lesson_id,
                    discussion.title,
                    discussion.description,
                    discussion.kind.as_str(),
                    tags,
                    discussion.is_active,
                    discussion.is_pinned,
                    discussion.created_by,
                    discussion.messages.len() as i64,
                    ts(&discussion.last_activity),
                    ts(&discussion.created_at),
                    ts(&discussion.updated_at),
                ],
            )?;

            for participant in &discussion.participants {
                upsert_participant(
                    tx,
                    discussion.id,
                    &participant.user_id,
                    &participant.joined_at,
                )?;
            }

            Ok(())
        })
    }

    pub fn load_discussion(
        &self,
        id: Uuid,
        deadline: Deadline,
    ) -> DiscussionResult<Option<Discussion>> {
        self.read(deadline, |conn| {
            let Some(summary) = query_summary(conn, id)? else {
                return Ok(None);
            };

            let participants = query_participants(conn, id)?;
            let mut reactions = query_reactions_for_discussion(conn, id)?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.discussion_id = ?1 ORDER BY m.seq"
            ))?;
            let messages = stmt
                .query_map([id.to_string()], message_from_row)?
                .map(|row| {
                    row.map(|mut message| {
                        message.reactions = reactions.remove(&message.id).unwrap_or_default();
                        message
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            Ok(Some(assemble(summary, participants, messages)))
        })
    }

    pub fn load_header(
        &self,
        id: Uuid,
        deadline: Deadline,
    ) -> DiscussionResult<Option<DiscussionHeader>> {
        self.read(deadline, |conn| {
            Ok(conn
                .query_row(
                    "SELECT course_id, is_active FROM discussions WHERE id = ?1",
                    [id.to_string()],
                    |row| {
                        Ok(DiscussionHeader {
                            course_id: row.get(0)?,
                            is_active: row.get(1)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    pub fn load_message(
        &self,
        discussion_id: Uuid,
        message_id: Uuid,
        deadline: Deadline,
    ) -> DiscussionResult<Option<Message>> {
        self.read(deadline, |conn| query_message(conn, discussion_id, message_id))
    }

    /// One page of a course's active discussions, pinned first, then by most
    /// recent activity, ties in creation order. Also returns the match count.
    pub fn list_active(
        &self,
        course_id: &str,
        filter: &DiscussionFilter,
        request: PageRequest,
        deadline: Deadline,
    ) -> DiscussionResult<(Vec<DiscussionSummary>, usize)> {
        const MATCHES: &str = "FROM discussions d
             WHERE d.course_id = ?1
               AND d.is_active = 1
               AND (?2 IS NULL OR d.lesson_id = ?2)
               AND (?3 IS NULL OR d.kind = ?3)";

        self.read(deadline, |conn| {
            let kind = filter.kind.map(|k| k.as_str());

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) {MATCHES}"),
                params![course_id, filter.lesson_id, kind],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {SUMMARY_COLUMNS} {MATCHES}
                 ORDER BY d.is_pinned DESC, d.last_activity DESC, d.rowid
                 LIMIT ?4 OFFSET ?5"
            ))?;
            let rows = stmt.query_map(
                params![
                    course_id,
                    filter.lesson_id,
                    kind,
                    i64::from(request.limit),
                    i64::try_from(request.offset()).unwrap_or(i64::MAX),
                ],
                summary_from_row,
            )?;
            let items = rows.collect::<Result<Vec<_>, _>>()?;
            Ok((items, total as usize))
        })
    }

    /// Append `message`, recount, bump activity and auto-join the author.
    ///
    /// The timestamp is assigned here, under the write lock, and never
    /// precedes the discussion's latest message, so timestamps follow
    /// append order.
    pub fn append_message(
        &self,
        discussion_id: Uuid,
        message: &mut Message,
        deadline: Deadline,
    ) -> DiscussionResult<()> {
        self.write(deadline, |tx| {
            let is_active: Option<bool> = tx
                .query_row(
                    "SELECT is_active FROM discussions WHERE id = ?1",
                    [discussion_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;

            match is_active {
                None => return Err(DiscussionError::not_found("Discussion not found")),
                Some(false) => {
                    return Err(DiscussionError::forbidden("Discussion is no longer active"))
                }
                Some(true) => {}
            }

            let latest: Option<String> = tx.query_row(
                "SELECT MAX(timestamp) FROM messages WHERE discussion_id = ?1",
                [discussion_id.to_string()],
                |row| row.get(0),
            )?;
            let mut stamp = now();
            if let Some(latest) = latest {
                stamp = stamp.max(parse_rfc3339(0, &latest)?);
            }
            message.timestamp = stamp;

            tx.execute(
                "INSERT INTO messages (id, discussion_id, content, kind, emoji, file_url, file_name,
                    user_id, timestamp, edited, edited_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    message.id.to_string(),
                    discussion_id.to_string(),
                    message.content,
                    message.kind.as_str(),
                    message.emoji,
                    message.file_url,
                    message.file_name,
                    message.user,
                    ts(&message.timestamp),
                    message.edited,
                    message.edited_at.as_ref().map(ts),
                ],
            )?;

            upsert_participant(tx, discussion_id, &message.user, &message.timestamp)?;
            refresh_counters(tx, discussion_id, &message.timestamp, true)?;
            Ok(())
        })
    }

    /// Remove the (user, emoji) reaction if present, otherwise add it.
    /// Returns the message as it stands after the toggle.
    pub fn toggle_reaction(
        &self,
        discussion_id: Uuid,
        message_id: Uuid,
        reaction: &Reaction,
        deadline: Deadline,
    ) -> DiscussionResult<(Message, ReactionToggle)> {
        self.write(deadline, |tx| {
            let exists = tx
                .query_row(
                    "SELECT 1 FROM messages WHERE id = ?1 AND discussion_id = ?2",
                    params![message_id.to_string(), discussion_id.to_string()],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !exists {
                return Err(DiscussionError::not_found("Message not found"));
            }

            let removed = tx.execute(
                "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                params![message_id.to_string(), reaction.user_id, reaction.emoji],
            )?;

            let toggle = if removed > 0 {
                ReactionToggle::Removed
            } else {
                tx.execute(
                    "INSERT INTO reactions (message_id, user_id, emoji, timestamp)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        message_id.to_string(),
                        reaction.user_id,
                        reaction.emoji,
                        ts(&reaction.timestamp),
                    ],
                )?;
                ReactionToggle::Added
            };

            tx.execute(
                "UPDATE discussions SET updated_at = ?2 WHERE id = ?1",
                params![discussion_id.to_string(), ts(&reaction.timestamp)],
            )?;

            let message = query_message(tx, discussion_id, message_id)?
                .ok_or_else(|| DiscussionError::not_found("Message not found"))?;
            Ok((message, toggle))
        })
    }

    pub fn delete_message(
        &self,
        discussion_id: Uuid,
        message_id: Uuid,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> DiscussionResult<()> {
        self.write(deadline, |tx| {
            tx.execute(
                "DELETE FROM reactions WHERE message_id = ?1",
                [message_id.to_string()],
            )?;
            let deleted = tx.execute(
                "DELETE FROM messages WHERE id = ?1 AND discussion_id = ?2",
                params![message_id.to_string(), discussion_id.to_string()],
            )?;
            if deleted == 0 {
                return Err(DiscussionError::not_found("Message not found"));
            }

            refresh_counters(tx, discussion_id, &now, false)?;
            Ok(())
        })
    }

    /// Insert the participant or refresh their `last_seen`
    pub fn touch_participant(
        &self,
        discussion_id: Uuid,
        user_id: &str,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> DiscussionResult<()> {
        self.write(deadline, |tx| {
            ensure_discussion(tx, discussion_id)?;
            upsert_participant(tx, discussion_id, user_id, &now)
        })
    }

    pub fn set_pinned(
        &self,
        discussion_id: Uuid,
        pinned: bool,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> DiscussionResult<()> {
        self.write(deadline, |tx| {
            let updated = tx.execute(
                "UPDATE discussions SET is_pinned = ?2, updated_at = ?3 WHERE id = ?1",
                params![discussion_id.to_string(), pinned, ts(&now)],
            )?;
            if updated == 0 {
                return Err(DiscussionError::not_found("Discussion not found"));
            }
            Ok(())
        })
    }
}

fn ensure_discussion(conn: &Connection, id: Uuid) -> DiscussionResult<()> {
    conn.query_row(
        "SELECT 1 FROM discussions WHERE id = ?1",
        [id.to_string()],
        |_| Ok(()),
    )
    .optional()?
    .ok_or_else(|| DiscussionError::not_found("Discussion not found"))
}

fn upsert_participant(
    conn: &Connection,
    discussion_id: Uuid,
    user_id: &str,
    now: &DateTime<Utc>,
) -> DiscussionResult<()> {
    conn.execute(
        "INSERT INTO participants (discussion_id, user_id, joined_at, last_seen)
         VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(discussion_id, user_id)
         DO UPDATE SET last_seen = MAX(participants.last_seen, excluded.last_seen)",
        params![discussion_id.to_string(), user_id, ts(now)],
    )?;
    Ok(())
}

/// Recount messages from the table itself; optionally advance `last_activity`
/// (never backwards).
fn refresh_counters(
    conn: &Connection,
    discussion_id: Uuid,
    now: &DateTime<Utc>,
    is_activity: bool,
) -> DiscussionResult<()> {
    let sql = if is_activity {
        "UPDATE discussions
         SET message_count = (SELECT COUNT(*) FROM messages WHERE discussion_id = ?1),
             last_activity = MAX(last_activity, ?2),
             updated_at = ?2
         WHERE id = ?1"
    } else {
        "UPDATE discussions
         SET message_count = (SELECT COUNT(*) FROM messages WHERE discussion_id = ?1),
             updated_at = ?2
         WHERE id = ?1"
    };
    conn.execute(sql, params![discussion_id.to_string(), ts(now)])?;
    Ok(())
}

fn query_summary(conn: &Connection, id: Uuid) -> DiscussionResult<Option<DiscussionSummary>> {
    Ok(conn
        .query_row(
            &format!("SELECT {SUMMARY_COLUMNS} FROM discussions d WHERE d.id = ?1"),
            [id.to_string()],
            summary_from_row,
        )
        .optional()?)
}

fn query_participants(
    conn: &Connection,
    discussion_id: Uuid,
) -> DiscussionResult<Vec<Participant>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, joined_at, last_seen FROM participants
         WHERE discussion_id = ?1 ORDER BY rowid",
    )?;
    let rows = stmt.query_map([discussion_id.to_string()], |row| {
        Ok(Participant {
            user_id: row.get(0)?,
            joined_at: parse_ts(row, 1)?,
            last_seen: parse_ts(row, 2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn query_message(
    conn: &Connection,
    discussion_id: Uuid,
    message_id: Uuid,
) -> DiscussionResult<Option<Message>> {
    let message = conn
        .query_row(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages m
                 WHERE m.id = ?1 AND m.discussion_id = ?2"
            ),
            params![message_id.to_string(), discussion_id.to_string()],
            message_from_row,
        )
        .optional()?;

    let Some(mut message) = message else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT emoji, user_id, timestamp FROM reactions WHERE message_id = ?1 ORDER BY rowid",
    )?;
    message.reactions = stmt
        .query_map([message_id.to_string()], reaction_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(message))
}

fn query_reactions_for_discussion(
    conn: &Connection,
    discussion_id: Uuid,
) -> DiscussionResult<HashMap<Uuid, Vec<Reaction>>> {
    let mut stmt = conn.prepare(
        "SELECT r.emoji, r.user_id, r.timestamp, r.message_id
         FROM reactions r JOIN messages m ON m.id = r.message_id
         WHERE m.discussion_id = ?1
         ORDER BY r.rowid",
    )?;
    let rows = stmt.query_map([discussion_id.to_string()], |row| {
        Ok((parse_uuid(row, 3)?, reaction_from_row(row)?))
    })?;

    let mut by_message: HashMap<Uuid, Vec<Reaction>> = HashMap::new();
    for row in rows {
        let (message_id, reaction) = row?;
        by_message.entry(message_id).or_default().push(reaction);
    }
    Ok(by_message)
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<DiscussionSummary> {
    let tags: String = row.get(6)?;
    let message_count: i64 = row.get(10)?;
    let participant_count: i64 = row.get(14)?;

    Ok(DiscussionSummary {
        id: parse_uuid(row, 0)?,
        course_id: row.get(1)?,
        lesson_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        kind: parse_text(row, 5)?,
        tags: serde_json::from_str(&tags)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
        is_active: row.get(7)?,
        is_pinned: row.get(8)?,
        created_by: row.get(9)?,
        creator: None,
        message_count: message_count as usize,
        participant_count: participant_count as usize,
        last_activity: parse_ts(row, 11)?,
        created_at: parse_ts(row, 12)?,
        updated_at: parse_ts(row, 13)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let edited_at: Option<String> = row.get(9)?;

    Ok(Message {
        id: parse_uuid(row, 0)?,
        content: row.get(1)?,
        kind: parse_text(row, 2)?,
        emoji: row.get(3)?,
        file_url: row.get(4)?,
        file_name: row.get(5)?,
        user: row.get(6)?,
        author: None,
        timestamp: parse_ts(row, 7)?,
        edited: row.get(8)?,
        edited_at: edited_at
            .map(|raw| parse_rfc3339(9, &raw))
            .transpose()?,
        reactions: Vec::new(),
    })
}

fn reaction_from_row(row: &Row<'_>) -> rusqlite::Result<Reaction> {
    Ok(Reaction {
        emoji: row.get(0)?,
        user_id: row.get(1)?,
        timestamp: parse_ts(row, 2)?,
    })
}

fn assemble(
    summary: DiscussionSummary,
    participants: Vec<Participant>,
    messages: Vec<Message>,
) -> Discussion {
    Discussion {
        id: summary.id,
        course_id: summary.course_id,
        lesson_id: summary.lesson_id,
        title: summary.title,
        description: summary.description,
        kind: summary.kind,
        tags: summary.tags,
        is_active: summary.is_active,
        is_pinned: summary.is_pinned,
        participants,
        messages,
        created_by: summary.created_by,
        creator: None,
        message_count: summary.message_count,
        last_activity: summary.last_activity,
        created_at: summary.created_at,
        updated_at: summary.updated_at,
    }
}

/// Fixed-width UTC so that text comparison in SQL matches time order
fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_rfc3339(idx, &raw)
}

fn parse_rfc3339(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = DiscussionError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{now, NewDiscussion, NewMessage};

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    fn setup() -> (Database, Discussion) {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let discussion = Discussion::new(NewDiscussion::new("c1", "Intro"), "s1", now());
        db.insert_discussion(&discussion, deadline()).unwrap();
        (db, discussion)
    }

    #[test]
    fn test_append_keeps_count_in_sync() {
        let (db, d) = setup();
        for i in 0..3 {
            let mut msg = Message::new(NewMessage::text(format!("m{i}")), "s1", now());
            db.append_message(d.id, &mut msg, deadline()).unwrap();
        }

        let loaded = db.load_discussion(d.id, deadline()).unwrap().unwrap();
        assert_eq!(loaded.message_count, 3);
        assert_eq!(loaded.messages.len(), 3);
        assert_eq!(loaded.messages[2].content, "m2");
    }

    #[test]
    fn test_reaction_toggle_is_keyed() {
        let (db, d) = setup();
        let mut msg = Message::new(NewMessage::text("hi"), "s1", now());
        db.append_message(d.id, &mut msg, deadline()).unwrap();

        let reaction = Reaction {
            emoji: "👍".into(),
            user_id: "s2".into(),
            timestamp: now(),
        };
        let (after_add, toggle) =
            db.toggle_reaction(d.id, msg.id, &reaction, deadline()).unwrap();
        assert_eq!(toggle, ReactionToggle::Added);
        assert_eq!(after_add.reactions.len(), 1);

        let (after_remove, toggle) =
            db.toggle_reaction(d.id, msg.id, &reaction, deadline()).unwrap();
        assert_eq!(toggle, ReactionToggle::Removed);
        assert!(after_remove.reactions.is_empty());
    }

    #[test]
    fn test_expired_deadline_rolls_back() {
        let (db, d) = setup();
        let mut msg = Message::new(NewMessage::text("late"), "s1", now());
        let expired = Deadline::at(std::time::Instant::now() - Duration::from_millis(1));

        let result = db.append_message(d.id, &mut msg, expired);
        assert!(matches!(result, Err(DiscussionError::Timeout)));

        let loaded = db.load_discussion(d.id, deadline()).unwrap().unwrap();
        assert!(loaded.messages.is_empty());
        assert_eq!(loaded.message_count, 0);
    }

    #[test]
    fn test_append_stamps_in_storage_order() {
        let (db, d) = setup();
        let mut first = Message::new(NewMessage::text("first"), "s1", now());
        db.append_message(d.id, &mut first, deadline()).unwrap();

        // A writer that read the clock early but got the lock late
        let early = first.timestamp - chrono::Duration::hours(1);
        let mut second = Message::new(NewMessage::text("second"), "s1", early);
        db.append_message(d.id, &mut second, deadline()).unwrap();
        assert!(second.timestamp >= first.timestamp);

        let loaded = db.load_discussion(d.id, deadline()).unwrap().unwrap();
        assert_eq!(loaded.messages[1].id, second.id);
        assert_eq!(loaded.messages[1].timestamp, second.timestamp);
        assert!(loaded.messages[0].timestamp <= loaded.messages[1].timestamp);
        assert_eq!(loaded.last_activity, second.timestamp);
        assert!(loaded.last_activity >= d.last_activity);
    }

    #[test]
    fn test_listing_orders_and_pages_in_sql() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let base = now();

        let mut ids = Vec::new();
        for (i, title) in ["a", "b", "c", "d"].into_iter().enumerate() {
            // "a" and "b" share an activity time; "d" is the oldest
            let offset = match i {
                0 | 1 => 10,
                2 => 5,
                _ => 60,
            };
            let d = Discussion::new(
                NewDiscussion::new("c1", title),
                "s1",
                base - chrono::Duration::minutes(offset),
            );
            db.insert_discussion(&d, deadline()).unwrap();
            ids.push(d.id);
        }
        let other = Discussion::new(NewDiscussion::new("c2", "elsewhere"), "s1", base);
        db.insert_discussion(&other, deadline()).unwrap();
        db.set_pinned(ids[3], true, base, deadline()).unwrap();

        let filter = DiscussionFilter::default();
        let (all, total) = db
            .list_active("c1", &filter, PageRequest::new(1, 10).unwrap(), deadline())
            .unwrap();
        assert_eq!(total, 4);
        let order: Vec<Uuid> = all.iter().map(|s| s.id).collect();
        assert_eq!(order, vec![ids[3], ids[2], ids[0], ids[1]]);

        let (page, total) = db
            .list_active("c1", &filter, PageRequest::new(2, 3).unwrap(), deadline())
            .unwrap();
        assert_eq!(total, 4);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, ids[1]);

        let (beyond, total) = db
            .list_active("c1", &filter, PageRequest::new(9, 3).unwrap(), deadline())
            .unwrap();
        assert!(beyond.is_empty());
        assert_eq!(total, 4);
    }
}
