pub mod domain;
pub mod ports;
pub mod streak;
pub mod tracker;

pub use domain::{
    ActiveSession, Badge, Book, Post, ReadingSession, SessionOutcome, StreakProfile, UserBadge,
    UserBook,
};
pub use ports::{CompletedSession, NewBook, PortError, PortResult, ProfilePatch, ReadingStore};
pub use streak::{StreakFields, StreakUpdate, DAILY_MINUTES_THRESHOLD};
pub use tracker::{ReadingTracker, StreakStatus};
