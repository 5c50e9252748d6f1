//! Integration tests for the session tracker, run against an in-memory
//! store so every property of the end-session orchestration (totals,
//! posts, bookmarks, badge uniqueness, recovery gating) is observable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use litera_core::domain::{
    ActiveSession, Badge, Book, Post, ReadingSession, StreakProfile, UserBadge, UserBook,
};
use litera_core::ports::{
    CompletedSession, NewBook, PortError, PortResult, ReadingStore,
};
use litera_core::streak::StreakFields;
use litera_core::tracker::ReadingTracker;

//=========================================================================================
// In-Memory Store Fake
//=========================================================================================

#[derive(Default)]
struct Inner {
    profiles: HashMap<Uuid, StreakProfile>,
    active: HashMap<Uuid, ActiveSession>,
    sessions: Vec<ReadingSession>,
    badges: Vec<Badge>,
    user_badges: Vec<UserBadge>,
    posts: Vec<Post>,
    bookmarks: HashMap<(Uuid, Uuid), i32>,
    books: Vec<Book>,
}

struct FakeStore {
    inner: Mutex<Inner>,
}

impl FakeStore {
    /// A store with the badge catalog seeded, as the migration does.
    fn new() -> Self {
        let badges = ["Good Start", "Warming Up", "Dedicated Reader", "Committed Reader", "Iron Habit"]
            .iter()
            .map(|name| Badge {
                id: Uuid::new_v4(),
                name: name.to_string(),
                description: String::new(),
            })
            .collect();
        Self {
            inner: Mutex::new(Inner {
                badges,
                ..Inner::default()
            }),
        }
    }

    fn set_streak(
        &self,
        user_id: Uuid,
        streak_days: i32,
        last_reading_date: Option<NaiveDate>,
        last_broken_streak: i32,
        consecutive_recoveries: i32,
    ) {
        let mut inner = self.inner.lock().unwrap();
        let profile = inner.profiles.entry(user_id).or_insert_with(|| empty_profile(user_id));
        profile.streak_days = streak_days;
        profile.last_reading_date = last_reading_date;
        profile.last_broken_streak = last_broken_streak;
        profile.consecutive_recoveries = consecutive_recoveries;
    }

    fn profile(&self, user_id: Uuid) -> StreakProfile {
        self.inner.lock().unwrap().profiles[&user_id].clone()
    }

    fn posts(&self) -> Vec<Post> {
        self.inner.lock().unwrap().posts.clone()
    }

    fn bookmark(&self, user_id: Uuid, book_id: Uuid) -> Option<i32> {
        self.inner.lock().unwrap().bookmarks.get(&(user_id, book_id)).copied()
    }

    fn badge_count(&self, user_id: Uuid) -> usize {
        self.inner
            .lock()
            .unwrap()
            .user_badges
            .iter()
            .filter(|ub| ub.user_id == user_id)
            .count()
    }
}

fn empty_profile(user_id: Uuid) -> StreakProfile {
    StreakProfile {
        user_id,
        streak_days: 0,
        last_reading_date: None,
        last_broken_streak: 0,
        consecutive_recoveries: 0,
        total_pages_read: 0,
        total_reading_time: 0,
        reading_book_id: None,
    }
}

#[async_trait]
impl ReadingStore for FakeStore {
    async fn get_or_create_profile(&self, user_id: Uuid) -> PortResult<StreakProfile> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .profiles
            .entry(user_id)
            .or_insert_with(|| empty_profile(user_id))
            .clone())
    }

    async fn get_active_session(&self, user_id: Uuid) -> PortResult<Option<ActiveSession>> {
        Ok(self.inner.lock().unwrap().active.get(&user_id).cloned())
    }

    async fn start_active_session(&self, session: &ActiveSession) -> PortResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.active.insert(session.user_id, session.clone());
        if let Some(profile) = inner.profiles.get_mut(&session.user_id) {
            profile.reading_book_id = Some(session.book_id);
        }
        Ok(())
    }

    async fn clear_active_session(&self, user_id: Uuid) -> PortResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.active.remove(&user_id);
        if let Some(profile) = inner.profiles.get_mut(&user_id) {
            profile.reading_book_id = None;
        }
        Ok(())
    }

    async fn minutes_read_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PortResult<i64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.started_at >= from && s.started_at < to)
            .map(|s| s.duration_minutes)
            .sum())
    }

    async fn complete_session(&self, completion: &CompletedSession) -> PortResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let session = &completion.session;
        // Idempotent on the session id, like the ON CONFLICT DO NOTHING insert.
        if inner.sessions.iter().any(|s| s.id == session.id) {
            return Ok(());
        }
        inner.sessions.push(session.clone());
        inner
            .bookmarks
            .insert((session.user_id, session.book_id), session.end_page);
        let profile = inner
            .profiles
            .get_mut(&session.user_id)
            .ok_or_else(|| PortError::NotFound("profile".to_string()))?;
        profile.total_pages_read += completion.profile_patch.pages_delta;
        profile.total_reading_time += completion.profile_patch.minutes_delta;
        profile.reading_book_id = None;
        if let Some(fields) = &completion.profile_patch.streak {
            profile.streak_days = fields.streak_days;
            profile.last_reading_date = Some(fields.last_reading_date);
            profile.last_broken_streak = fields.last_broken_streak;
            profile.consecutive_recoveries = fields.consecutive_recoveries;
        }
        inner.active.remove(&session.user_id);
        inner.posts.push(Post {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            book_id: session.book_id,
            session_id: Some(session.id),
            kind: "session_update".to_string(),
            content: completion.post_content.clone(),
            created_at: session.started_at,
        });
        Ok(())
    }

    async fn sessions_for_user(&self, user_id: Uuid) -> PortResult<Vec<ReadingSession>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn apply_recovery(&self, user_id: Uuid, fields: &StreakFields) -> PortResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let profile = inner
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound("profile".to_string()))?;
        profile.streak_days = fields.streak_days;
        profile.last_reading_date = Some(fields.last_reading_date);
        profile.last_broken_streak = fields.last_broken_streak;
        profile.consecutive_recoveries = fields.consecutive_recoveries;
        Ok(())
    }

    async fn find_badge(&self, name: &str) -> PortResult<Option<Badge>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .badges
            .iter()
            .find(|b| b.name == name)
            .cloned())
    }

    async fn award_badge(&self, user_id: Uuid, badge_id: Uuid) -> PortResult<Option<UserBadge>> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .user_badges
            .iter()
            .any(|ub| ub.user_id == user_id && ub.badge_id == badge_id)
        {
            return Ok(None);
        }
        let awarded = UserBadge {
            user_id,
            badge_id,
            awarded_at: Utc::now(),
        };
        inner.user_badges.push(awarded.clone());
        Ok(Some(awarded))
    }

    async fn badges_for_user(&self, user_id: Uuid) -> PortResult<Vec<Badge>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .user_badges
            .iter()
            .filter(|ub| ub.user_id == user_id)
            .filter_map(|ub| inner.badges.iter().find(|b| b.id == ub.badge_id).cloned())
            .collect())
    }

    async fn add_book(&self, _user_id: Uuid, book: &NewBook) -> PortResult<Book> {
        let mut inner = self.inner.lock().unwrap();
        let book = Book {
            id: Uuid::new_v4(),
            title: book.title.clone(),
            author: book.author.clone(),
            page_count: book.page_count,
        };
        inner.books.push(book.clone());
        Ok(book)
    }

    async fn books_for_user(&self, _user_id: Uuid) -> PortResult<Vec<UserBook>> {
        Ok(Vec::new())
    }

    async fn posts_for_user(&self, user_id: Uuid) -> PortResult<Vec<Post>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .posts
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

fn setup() -> (Arc<FakeStore>, ReadingTracker, Uuid, Uuid) {
    let store = Arc::new(FakeStore::new());
    let tracker = ReadingTracker::new(store.clone());
    (store, tracker, Uuid::new_v4(), Uuid::new_v4())
}

fn at(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

//=========================================================================================
// Tests
//=========================================================================================

#[tokio::test]
async fn ending_without_an_active_session_is_not_found() {
    let (_store, tracker, user, _book) = setup();
    let err = tracker
        .end_session(user, 50, None, 0, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));
}

#[tokio::test]
async fn starting_at_a_negative_page_is_rejected() {
    let (_store, tracker, user, book) = setup();
    let err = tracker
        .start_session(user, book, -1, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Conflict(_)));
}

#[tokio::test]
async fn end_page_before_start_page_is_rejected() {
    let (_store, tracker, user, book) = setup();
    let t0 = at("2024-03-10T08:00:00Z");
    tracker.start_session(user, book, 40, t0).await.unwrap();
    let err = tracker
        .end_session(user, 30, None, 0, t0 + Duration::minutes(20))
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Conflict(_)));
}

#[tokio::test]
async fn full_session_flow_updates_everything_once() {
    let (store, tracker, user, book) = setup();
    let t0 = at("2024-03-10T08:00:00Z");

    tracker.start_session(user, book, 10, t0).await.unwrap();
    assert_eq!(store.profile(user).reading_book_id, Some(book));

    let outcome = tracker
        .end_session(user, 25, None, 0, t0 + Duration::minutes(15))
        .await
        .unwrap();

    assert_eq!(outcome.session.pages_read, 15);
    assert_eq!(outcome.session.duration_minutes, 15);
    assert_eq!(outcome.streak_days, 1);
    assert_eq!(outcome.new_badge.unwrap().name, "Good Start");

    let profile = store.profile(user);
    assert_eq!(profile.total_pages_read, 15);
    assert_eq!(profile.total_reading_time, 15);
    assert_eq!(profile.streak_days, 1);
    assert_eq!(profile.reading_book_id, None);
    assert_eq!(store.bookmark(user, book), Some(25));

    let posts = store.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].content, "Read 15 pages in 15 minutes!");
    assert_eq!(posts[0].session_id, Some(outcome.session.id));

    // The active session is gone, so a second end call cannot double-count.
    assert!(tracker.active_session(user).await.unwrap().is_none());
}

#[tokio::test]
async fn notes_become_the_post_content() {
    let (store, tracker, user, book) = setup();
    let t0 = at("2024-03-10T19:00:00Z");
    tracker.start_session(user, book, 0, t0).await.unwrap();
    tracker
        .end_session(user, 12, Some("Loved this chapter".to_string()), 0, t0 + Duration::minutes(11))
        .await
        .unwrap();
    assert_eq!(store.posts()[0].content, "Loved this chapter");
}

#[tokio::test]
async fn short_sessions_accumulate_toward_the_daily_threshold() {
    let (store, tracker, user, book) = setup();

    // 4 minutes: under the threshold, streak untouched.
    let t0 = at("2024-03-10T08:00:00Z");
    tracker.start_session(user, book, 0, t0).await.unwrap();
    let first = tracker
        .end_session(user, 3, None, 0, t0 + Duration::minutes(4))
        .await
        .unwrap();
    assert_eq!(first.streak_days, 0);
    assert_eq!(store.profile(user).last_reading_date, None);

    // 7 more minutes the same day: 11 total, streak starts.
    let t1 = at("2024-03-10T20:00:00Z");
    tracker.start_session(user, book, 3, t1).await.unwrap();
    let second = tracker
        .end_session(user, 8, None, 0, t1 + Duration::minutes(7))
        .await
        .unwrap();
    assert_eq!(second.streak_days, 1);
    assert_eq!(
        store.profile(user).last_reading_date,
        Some("2024-03-10".parse().unwrap())
    );
}

#[tokio::test]
async fn a_second_qualifying_session_on_a_credited_day_does_not_increment() {
    let (store, tracker, user, book) = setup();
    let t0 = at("2024-03-10T08:00:00Z");
    tracker.start_session(user, book, 0, t0).await.unwrap();
    tracker
        .end_session(user, 10, None, 0, t0 + Duration::minutes(12))
        .await
        .unwrap();
    assert_eq!(store.profile(user).streak_days, 1);

    let t1 = at("2024-03-10T21:00:00Z");
    tracker.start_session(user, book, 10, t1).await.unwrap();
    let outcome = tracker
        .end_session(user, 20, None, 0, t1 + Duration::minutes(30))
        .await
        .unwrap();
    assert_eq!(outcome.streak_days, 1);
    assert_eq!(store.profile(user).streak_days, 1);
    assert!(outcome.new_badge.is_none());
}

#[tokio::test]
async fn seven_day_extension_awards_dedicated_reader_exactly_once() {
    let (store, tracker, user, book) = setup();
    store.get_or_create_profile(user).await.unwrap();
    store.set_streak(user, 6, Some("2024-03-09".parse().unwrap()), 0, 0);

    let t0 = at("2024-03-10T08:00:00Z");
    tracker.start_session(user, book, 100, t0).await.unwrap();
    let outcome = tracker
        .end_session(user, 120, None, 0, t0 + Duration::minutes(15))
        .await
        .unwrap();
    assert_eq!(outcome.streak_days, 7);
    assert_eq!(outcome.new_badge.unwrap().name, "Dedicated Reader");
    let badges_before = store.badge_count(user);

    // Break the streak and climb back to 7: no second award.
    store.set_streak(user, 6, Some("2024-03-20".parse().unwrap()), 0, 0);
    let t1 = at("2024-03-21T08:00:00Z");
    tracker.start_session(user, book, 120, t1).await.unwrap();
    let again = tracker
        .end_session(user, 140, None, 0, t1 + Duration::minutes(15))
        .await
        .unwrap();
    assert_eq!(again.streak_days, 7);
    assert!(again.new_badge.is_none());
    assert_eq!(store.badge_count(user), badges_before);
}

#[tokio::test]
async fn a_gap_saves_the_broken_streak_and_restarts_at_one() {
    let (store, tracker, user, book) = setup();
    store.get_or_create_profile(user).await.unwrap();
    store.set_streak(user, 4, Some("2024-03-07".parse().unwrap()), 0, 0);

    let t0 = at("2024-03-10T08:00:00Z");
    tracker.start_session(user, book, 0, t0).await.unwrap();
    let outcome = tracker
        .end_session(user, 9, None, 0, t0 + Duration::minutes(12))
        .await
        .unwrap();

    assert_eq!(outcome.streak_days, 1);
    let profile = store.profile(user);
    assert_eq!(profile.streak_days, 1);
    assert_eq!(profile.last_broken_streak, 4);
}

#[tokio::test]
async fn recovery_works_once_and_is_rearmed_only_by_extension() {
    let (store, tracker, user, book) = setup();
    store.get_or_create_profile(user).await.unwrap();
    store.set_streak(user, 1, Some("2024-03-10".parse().unwrap()), 6, 0);

    let now = at("2024-03-10T12:00:00Z");
    let status = tracker.recover_streak(user, 0, now).await.unwrap();
    assert_eq!(status.profile.streak_days, 7);
    assert_eq!(status.profile.last_broken_streak, 0);
    assert_eq!(status.profile.consecutive_recoveries, 1);
    assert!(!status.can_recover);

    // A second recovery before any natural extension is rejected.
    let err = tracker.recover_streak(user, 0, now).await.unwrap_err();
    assert!(matches!(err, PortError::Conflict(_)));

    // Extending the streak the next day clears the lockout.
    let t1 = at("2024-03-11T08:00:00Z");
    tracker.start_session(user, book, 0, t1).await.unwrap();
    tracker
        .end_session(user, 10, None, 0, t1 + Duration::minutes(15))
        .await
        .unwrap();
    assert_eq!(store.profile(user).consecutive_recoveries, 0);

    // After a fresh break, recovery is available again.
    let t2 = at("2024-03-15T08:00:00Z");
    tracker.start_session(user, book, 10, t2).await.unwrap();
    tracker
        .end_session(user, 20, None, 0, t2 + Duration::minutes(15))
        .await
        .unwrap();
    let broken = store.profile(user);
    assert_eq!(broken.streak_days, 1);
    assert_eq!(broken.last_broken_streak, 8);

    let status = tracker
        .recover_streak(user, 0, at("2024-03-15T12:00:00Z"))
        .await
        .unwrap();
    assert_eq!(status.profile.streak_days, 9);
    assert_eq!(status.profile.consecutive_recoveries, 1);
}

#[tokio::test]
async fn starting_a_new_session_replaces_the_previous_one() {
    let (_store, tracker, user, book) = setup();
    let other_book = Uuid::new_v4();
    let t0 = at("2024-03-10T08:00:00Z");

    tracker.start_session(user, book, 10, t0).await.unwrap();
    tracker
        .start_session(user, other_book, 50, t0 + Duration::minutes(5))
        .await
        .unwrap();

    let active = tracker.active_session(user).await.unwrap().unwrap();
    assert_eq!(active.book_id, other_book);
    assert_eq!(active.start_page, 50);
}

#[tokio::test]
async fn cancel_discards_without_recording() {
    let (store, tracker, user, book) = setup();
    let t0 = at("2024-03-10T08:00:00Z");
    tracker.start_session(user, book, 10, t0).await.unwrap();
    tracker.cancel_session(user).await.unwrap();

    assert!(tracker.active_session(user).await.unwrap().is_none());
    assert_eq!(store.profile(user).reading_book_id, None);
    assert!(store.posts().is_empty());
    assert_eq!(store.profile(user).total_reading_time, 0);

    // Cancelling again is a harmless no-op.
    tracker.cancel_session(user).await.unwrap();
}

#[tokio::test]
async fn timezone_offset_credits_the_local_day() {
    let (store, tracker, user, book) = setup();
    // 23:30 UTC on March 9th, reader in UTC+2: locally it is March 10th.
    let t0 = at("2024-03-09T23:30:00Z");
    tracker.start_session(user, book, 0, t0).await.unwrap();
    tracker
        .end_session(user, 10, None, 120, t0 + Duration::minutes(12))
        .await
        .unwrap();
    assert_eq!(
        store.profile(user).last_reading_date,
        Some("2024-03-10".parse().unwrap())
    );
}
