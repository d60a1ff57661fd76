//! Navigation identity tracking for session history.
//!
//! Every history entry carries a `navigation` record `{key, index}` inside its
//! associated data. The [`NavigationTracker`] owns the index counter, stamps
//! entries on push/replace, and broadcasts [`NavigationEvent`]s; a
//! [`NavigationObserver`] turns that stream into a "current identity" value
//! that view stores can compare against.
//!
//! The platform history API sits behind [`HistoryPlatform`] so the tracker can
//! run against a browser binding or the in-memory [`MemoryHistory`].

use thiserror::Error;

pub mod identity;
pub mod observer;
pub mod platform;
pub mod tracker;

pub use identity::{generate_key, stamp, NavigationIdentity, NAVIGATION_KEY};
pub use observer::NavigationObserver;
pub use platform::{HistoryEntry, HistoryPlatform, MemoryHistory, Traversal};
pub use tracker::{NavigationEvent, NavigationEventKind, NavigationTracker, Subscription};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NavError {
    #[error("history traversal by {delta} is out of range")]
    OutOfRange { delta: i64 },
}

pub type NavResult<T> = Result<T, NavError>;
