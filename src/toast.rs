//! Transient user-facing messages.
//!
//! Stores surface validation warnings, failures and fired reminders here.
//! Toasts expire after a fixed time to live; the web surface renders the
//! active ones and live consumers can follow the broadcast channel.

use crate::db::now_ms;
use crate::error::{AppError, AuthError, Severity, auth_message};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

/// Upper bound on retained toasts; the oldest are dropped first.
const MAX_TOASTS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub id: u64,
    pub severity: Severity,
    pub icon: String,
    pub message: String,
    pub created_at: i64,
    pub expires_at: i64,
}

#[derive(Default)]
struct ToastState {
    next_id: u64,
    toasts: VecDeque<Toast>,
}

pub struct ToastCenter {
    ttl_ms: i64,
    state: Mutex<ToastState>,
    tx: broadcast::Sender<Toast>,
}

fn default_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Success => "check_circle",
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}

impl ToastCenter {
    pub fn new(ttl_ms: u64) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            ttl_ms: ttl_ms as i64,
            state: Mutex::new(ToastState::default()),
            tx,
        }
    }

    /// Queue a toast and broadcast it to live consumers.
    pub fn push(&self, severity: Severity, icon: &str, message: impl Into<String>) -> Toast {
        let now = now_ms();
        let toast = {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            state.next_id += 1;
            let toast = Toast {
                id: state.next_id,
                severity,
                icon: icon.to_string(),
                message: message.into(),
                created_at: now,
                expires_at: now + self.ttl_ms,
            };
            state.toasts.push_back(toast.clone());
            while state.toasts.len() > MAX_TOASTS {
                state.toasts.pop_front();
            }
            toast
        };
        // No receivers is fine.
        let _ = self.tx.send(toast.clone());
        toast
    }

    pub fn info(&self, message: impl Into<String>) -> Toast {
        self.push(Severity::Info, default_icon(Severity::Info), message)
    }

    pub fn success(&self, message: impl Into<String>) -> Toast {
        self.push(Severity::Success, default_icon(Severity::Success), message)
    }

    pub fn warning(&self, message: impl Into<String>) -> Toast {
        self.push(Severity::Warning, default_icon(Severity::Warning), message)
    }

    pub fn error(&self, message: impl Into<String>) -> Toast {
        self.push(Severity::Error, default_icon(Severity::Error), message)
    }

    /// Surface a failed store action: validation problems warn, everything else errors.
    pub fn report(&self, err: &AppError) -> Toast {
        if err.code.is_validation() {
            self.warning(err.message.clone())
        } else {
            warn!(code = ?err.code, error = %err.message, "Action failed");
            self.error(err.message.clone())
        }
    }

    /// Surface an identity-provider error through the fixed message table.
    pub fn auth_failure(&self, err: &AuthError) -> Toast {
        let msg = auth_message(&err.code);
        self.push(msg.severity, msg.icon, msg.message)
    }

    /// Toasts that have not expired yet, oldest first.
    pub fn active(&self) -> Vec<Toast> {
        self.active_at(now_ms())
    }

    pub fn active_at(&self, now: i64) -> Vec<Toast> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.toasts.retain(|t| t.expires_at > now);
        state.toasts.iter().cloned().collect()
    }

    pub fn dismiss(&self, id: u64) -> bool {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = state.toasts.len();
        state.toasts.retain(|t| t.id != id);
        state.toasts.len() != before
    }

    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.toasts.clear();
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Toast> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_become_warnings() {
        let toasts = ToastCenter::new(5_000);
        let toast = toasts.report(&AppError::missing_field("title"));
        assert_eq!(toast.severity, Severity::Warning);
        assert_eq!(toast.message, "title is required");

        let toast = toasts.report(&AppError::database("disk full"));
        assert_eq!(toast.severity, Severity::Error);
    }

    #[test]
    fn auth_failures_use_message_table() {
        let toasts = ToastCenter::new(5_000);
        let toast = toasts.auth_failure(&AuthError::new("auth/popup-blocked", "blocked"));
        assert_eq!(toast.severity, Severity::Warning);
        assert_eq!(toast.icon, "block");
    }

    #[test]
    fn toasts_expire() {
        let toasts = ToastCenter::new(1_000);
        let toast = toasts.info("hello");
        assert_eq!(toasts.active_at(toast.created_at).len(), 1);
        assert!(toasts.active_at(toast.expires_at).is_empty());
    }

    #[test]
    fn dismiss_removes_one() {
        let toasts = ToastCenter::new(60_000);
        let a = toasts.info("a");
        toasts.info("b");
        assert!(toasts.dismiss(a.id));
        assert!(!toasts.dismiss(a.id));
        assert_eq!(toasts.active().len(), 1);
    }

    #[test]
    fn retention_is_bounded() {
        let toasts = ToastCenter::new(60_000);
        for i in 0..(MAX_TOASTS + 5) {
            toasts.info(format!("toast {}", i));
        }
        let active = toasts.active();
        assert_eq!(active.len(), MAX_TOASTS);
        assert_eq!(active[0].message, "toast 5");
    }

    #[test]
    fn broadcasts_to_subscribers() {
        let toasts = ToastCenter::new(60_000);
        let mut rx = toasts.subscribe();
        toasts.success("saved");
        assert_eq!(rx.try_recv().unwrap().message, "saved");
    }
}
