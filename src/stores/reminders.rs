//! Reminder planning and cancellable reminder timers.
//!
//! Planning is pure: tasks, lead times and a clock in, fire times out.
//! Timers are tokio tasks that sleep until their fire time; the whole set is
//! aborted and rebuilt whenever its inputs change. Nothing is persisted.

use crate::dates::due_instant;
use crate::types::Task;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::lock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedReminder {
    pub task_id: String,
    pub title: String,
    pub lead_hours: u32,
    pub due_at: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
}

impl PlannedReminder {
    pub fn message(&self) -> String {
        let when = match self.lead_hours {
            0 => "now".to_string(),
            1 => "in 1 hour".to_string(),
            24 => "in 1 day".to_string(),
            h if h % 24 == 0 => format!("in {} days", h / 24),
            h => format!("in {} hours", h),
        };
        format!("\"{}\" is due {}", self.title, when)
    }
}

/// Reminders for every open, dated task and every lead time whose fire time
/// is strictly after `now`, soonest first.
pub fn plan_reminders(
    tasks: &[Task],
    lead_hours: &[u32],
    default_due_hour: u32,
    now: DateTime<Utc>,
) -> Vec<PlannedReminder> {
    let mut leads = lead_hours.to_vec();
    leads.sort_unstable();
    leads.dedup();

    let mut planned = Vec::new();
    for task in tasks.iter().filter(|t| !t.completed) {
        let Some(end_date) = task.end_date.as_deref() else {
            continue;
        };
        let Some(due_at) = due_instant(end_date, task.end_hour.as_deref(), default_due_hour) else {
            continue;
        };
        for &lead in &leads {
            let fire_at = due_at - Duration::hours(i64::from(lead));
            if fire_at > now {
                planned.push(PlannedReminder {
                    task_id: task.id.clone(),
                    title: task.title.clone(),
                    lead_hours: lead,
                    due_at,
                    fire_at,
                });
            }
        }
    }
    planned.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then_with(|| a.task_id.cmp(&b.task_id)));
    planned
}

struct ReminderTimer {
    reminder: PlannedReminder,
    handle: JoinHandle<()>,
}

/// The live set of reminder timers.
#[derive(Default)]
pub struct ReminderTimers {
    timers: Mutex<Vec<ReminderTimer>>,
}

impl ReminderTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn one timer per reminder on `runtime`. Each sleeps until its fire
    /// time (measured from `now`) and then runs `fire`.
    pub fn schedule<F, Fut>(
        &self,
        runtime: &Handle,
        reminders: Vec<PlannedReminder>,
        now: DateTime<Utc>,
        fire: F,
    ) where
        F: Fn(PlannedReminder) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut timers = lock(&self.timers);
        timers.extend(spawn_timers(runtime, reminders, now, fire));
    }

    /// Abort every timer and schedule `reminders` in their place, under one
    /// lock so concurrent rebuilds cannot interleave. Returns how many of the
    /// replaced timers had not fired yet.
    pub fn replace_all<F, Fut>(
        &self,
        runtime: &Handle,
        reminders: Vec<PlannedReminder>,
        now: DateTime<Utc>,
        fire: F,
    ) -> usize
    where
        F: Fn(PlannedReminder) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut timers = lock(&self.timers);
        let cancelled = abort_all(std::mem::take(&mut *timers));
        *timers = spawn_timers(runtime, reminders, now, fire);
        cancelled
    }

    /// Abort every timer. Returns how many had not fired yet.
    pub fn cancel_all(&self) -> usize {
        let timers = std::mem::take(&mut *lock(&self.timers));
        abort_all(timers)
    }

    /// Reminders whose timers have not fired yet.
    pub fn pending(&self) -> Vec<PlannedReminder> {
        lock(&self.timers)
            .iter()
            .filter(|t| !t.handle.is_finished())
            .map(|t| t.reminder.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.timers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn spawn_timers<F, Fut>(
    runtime: &Handle,
    reminders: Vec<PlannedReminder>,
    now: DateTime<Utc>,
    fire: F,
) -> Vec<ReminderTimer>
where
    F: Fn(PlannedReminder) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let fire = Arc::new(fire);
    reminders
        .into_iter()
        .map(|reminder| {
            let delay = (reminder.fire_at - now).to_std().unwrap_or_default();
            let fire = Arc::clone(&fire);
            let payload = reminder.clone();
            let handle = runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                fire(payload).await;
            });
            ReminderTimer { reminder, handle }
        })
        .collect()
}

fn abort_all(timers: Vec<ReminderTimer>) -> usize {
    let mut pending = 0;
    for timer in timers {
        if !timer.handle.is_finished() {
            pending += 1;
        }
        timer.handle.abort();
    }
    pending
}

impl Drop for ReminderTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn task(id: &str, end: Option<&str>, hour: Option<&str>, completed: bool) -> Task {
        Task {
            id: id.to_string(),
            project_id: "p".to_string(),
            project_ref: None,
            title: format!("Task {}", id),
            description: String::new(),
            label: None,
            priority: None,
            status: "todo".to_string(),
            start_date: None,
            end_date: end.map(str::to_string),
            start_hour: None,
            end_hour: hour.map(str::to_string),
            completed,
            color: None,
            owner: None,
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn plans_each_lead_time() {
        let now = at(2024, 5, 1, 0, 0);
        let tasks = vec![task("a", Some("2024-05-03"), Some("18:00"), false)];
        let planned = plan_reminders(&tasks, &[24, 1], 9, now);

        let fires: Vec<_> = planned.iter().map(|r| r.fire_at).collect();
        assert_eq!(fires, vec![at(2024, 5, 2, 18, 0), at(2024, 5, 3, 17, 0)]);
        assert_eq!(planned[0].message(), "\"Task a\" is due in 1 day");
        assert_eq!(planned[1].message(), "\"Task a\" is due in 1 hour");
    }

    #[test]
    fn uses_default_hour_without_end_hour() {
        let now = at(2024, 5, 1, 0, 0);
        let tasks = vec![task("a", Some("2024-05-02"), None, false)];
        let planned = plan_reminders(&tasks, &[0], 9, now);
        assert_eq!(planned[0].fire_at, at(2024, 5, 2, 9, 0));
        assert_eq!(planned[0].message(), "\"Task a\" is due now");
    }

    #[test]
    fn never_plans_at_or_before_now() {
        let now = at(2024, 5, 2, 8, 0);
        let tasks = vec![
            task("a", Some("2024-05-02"), Some("09:00"), false),
            task("b", Some("2024-05-01"), None, false),
        ];
        let planned = plan_reminders(&tasks, &[1, 2, 24], 9, now);
        // a fires at 08:00 (= now, skipped), 07:00 and the previous day.
        assert!(planned.is_empty());

        for hours in 0..48 {
            let now = at(2024, 5, 1, 0, 0) + Duration::hours(hours);
            for r in plan_reminders(&tasks, &[0, 1, 6, 24], 9, now) {
                assert!(r.fire_at > now);
            }
        }
    }

    #[test]
    fn skips_completed_and_undated_tasks() {
        let now = at(2024, 5, 1, 0, 0);
        let tasks = vec![
            task("done", Some("2024-05-03"), None, true),
            task("undated", None, None, false),
            task("bad", Some("not a date"), None, false),
        ];
        assert!(plan_reminders(&tasks, &[1], 9, now).is_empty());
    }

    #[test]
    fn duplicate_lead_times_plan_once() {
        let now = at(2024, 5, 1, 0, 0);
        let tasks = vec![task("a", Some("2024-05-03"), None, false)];
        assert_eq!(plan_reminders(&tasks, &[2, 2, 2], 9, now).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timers_fire_after_their_delay() {
        let timers = ReminderTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let now = at(2024, 5, 1, 0, 0);
        let tasks = vec![task("a", Some("2024-05-01"), Some("03:00"), false)];
        let planned = plan_reminders(&tasks, &[2, 1], 9, now);

        let counter = Arc::clone(&fired);
        timers.schedule(&Handle::current(), planned, now, move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(timers.pending().len(), 2);

        tokio::time::sleep(std::time::Duration::from_secs(3600 + 30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert!(timers.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timers_never_fire() {
        let timers = ReminderTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let now = at(2024, 5, 1, 0, 0);
        let tasks = vec![task("a", Some("2024-05-01"), Some("03:00"), false)];

        let counter = Arc::clone(&fired);
        timers.schedule(
            &Handle::current(),
            plan_reminders(&tasks, &[1], 9, now),
            now,
            move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        assert_eq!(timers.cancel_all(), 1);
        assert!(timers.is_empty());
        tokio::time::sleep(std::time::Duration::from_secs(4 * 3600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
