//! Cursor pagination arithmetic and page state.

use crate::db::{Cursor, Direction, OrderBy, Query};
use crate::types::Task;
use serde::{Deserialize, Serialize};

use super::filter::DUE_FIELD;

/// Page navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageMove {
    First,
    Next,
    Prev,
    Last,
}

impl std::str::FromStr for PageMove {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(PageMove::First),
            "next" => Ok(PageMove::Next),
            "prev" | "previous" => Ok(PageMove::Prev),
            "last" => Ok(PageMove::Last),
            other => Err(format!("unknown page move: {}", other)),
        }
    }
}

/// Task listing order: due date ascending, then title descending.
pub fn task_order() -> Vec<OrderBy> {
    vec![
        OrderBy {
            field: DUE_FIELD.to_string(),
            direction: Direction::Asc,
        },
        OrderBy {
            field: "title".to_string(),
            direction: Direction::Desc,
        },
    ]
}

/// Apply [`task_order`] to a query.
pub fn ordered(mut query: Query) -> Query {
    query.order = task_order();
    query
}

pub fn total_pages(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

/// Size of the final page: the remainder, or a full page when evenly divisible.
pub fn last_page_size(total: usize, page_size: usize) -> usize {
    match total % page_size.max(1) {
        0 => page_size,
        rem => rem,
    }
}

/// Boundaries of the page currently shown plus its position.
#[derive(Debug, Clone, Default)]
pub struct PageCursor {
    pub first: Option<Cursor>,
    pub last: Option<Cursor>,
    /// 1-based; 0 before any page was fetched.
    pub page: usize,
    pub total: usize,
}

impl PageCursor {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Page number after `mv`, clamped to `1..=total_pages`.
    pub fn target_page(&self, mv: PageMove, pages: usize) -> usize {
        let pages = pages.max(1);
        match mv {
            PageMove::First => 1,
            PageMove::Next => (self.page + 1).min(pages),
            PageMove::Prev => self.page.saturating_sub(1).max(1),
            PageMove::Last => pages,
        }
    }
}

/// Build the query for `mv` from the unpaged, ordered `base` query.
///
/// `Next` and `Prev` without a stored boundary fall back to the first page.
pub fn page_query(base: &Query, cursor: &PageCursor, mv: PageMove, page_size: usize) -> (Query, PageMove) {
    let base = base.clone();
    match (mv, &cursor.last, &cursor.first) {
        (PageMove::Next, Some(last), _) => (base.start_after(last.clone()).limit(page_size), PageMove::Next),
        (PageMove::Prev, _, Some(first)) => (
            base.end_before(first.clone()).limit_to_last(page_size),
            PageMove::Prev,
        ),
        (PageMove::Last, _, _) => (
            base.limit_to_last(last_page_size(cursor.total, page_size)),
            PageMove::Last,
        ),
        _ => (base.limit(page_size), PageMove::First),
    }
}

/// One page of tasks as handed to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageView {
    pub tasks: Vec<Task>,
    pub page: usize,
    pub total_pages: usize,
    pub total: usize,
    pub page_size: usize,
}

impl PageView {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}
