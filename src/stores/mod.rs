//! Stateful services mirroring backend collections.
//!
//! Each store owns its state, is constructed once by [`crate::app::App`],
//! and is shared through `Arc`. Stores that hold user data implement
//! [`SessionAware`] so the session store can fan out sign-in and sign-out.

pub mod filter;
pub mod notifications;
pub mod pagination;
pub mod projects;
pub mod reference;
pub mod reminders;
pub mod session;
pub mod tasks;

use crate::error::{AppError, AppResult};
use crate::types::AuthUser;
use std::sync::{Mutex, MutexGuard};

pub use filter::TaskFilter;
pub use notifications::{LogNotifier, NotificationStore, Permission, SystemNotifier};
pub use pagination::{PageMove, PageView};
pub use projects::{ProjectStore, ProjectSummary};
pub use reference::{PickerOption, ReferenceStore};
pub use session::{ConfiguredIdentityProvider, IdentityProvider, SessionState, SessionStore};
pub use tasks::TaskStore;

/// A store whose data belongs to the signed-in user.
pub trait SessionAware: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Start mirroring data for `user`.
    fn signed_in(&self, user: &AuthUser) -> AppResult<()>;

    /// Drop every cached item. Live subscriptions are cancelled by the caller.
    fn signed_out(&self);
}

/// Lock store state, recovering from a poisoned lock.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Signed-in user id, or `NotAuthenticated`.
pub(crate) fn require_uid(uid: &Option<String>) -> AppResult<String> {
    uid.clone().ok_or_else(AppError::not_authenticated)
}

/// Trimmed value, or `None` when blank.
pub(crate) fn non_blank<S: AsRef<str>>(value: Option<S>) -> Option<String> {
    let value = value?;
    let trimmed = value.as_ref().trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
