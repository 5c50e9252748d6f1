pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

// Re-export the handlers the binary wires into the router.
pub use middleware::require_auth;
pub use rest::{
    active_session_handler, add_book_handler, cancel_session_handler, end_session_handler,
    list_badges_handler, list_books_handler, list_posts_handler, list_sessions_handler,
    recover_streak_handler, start_session_handler, streak_handler,
};
