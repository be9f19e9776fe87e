pub mod discussion;
pub mod message;

pub use discussion::{
    Discussion, DiscussionFilter, DiscussionKind, DiscussionSummary, NewDiscussion, Participant,
};
pub use message::{Message, MessageKind, NewMessage, Reaction, ReactionToggle};

use chrono::{DateTime, SubsecRound, Utc};

/// Current time at the precision the store persists (microseconds)
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
