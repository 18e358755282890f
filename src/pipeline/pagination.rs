//! Page budget for one job
//!
//! Result pages are walked sequentially from the filter's start page. The
//! budget is the filter's `max_pages`, capped by the site configuration, so a
//! runaway filter cannot walk the whole inventory.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::filter::FilterCriteria;

/// Why pagination stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every page in the budget was requested
    PageLimit,
    /// A page parsed to zero cards
    EmptyPage,
    /// Transient failures outlasted the retry policy
    FetchExhausted,
    /// Cancellation was observed at a page boundary
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StopReason::PageLimit => "page limit reached",
            StopReason::EmptyPage => "empty page",
            StopReason::FetchExhausted => "fetch retries exhausted",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Page numbers a job may request, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBudget {
    next: u32,
    remaining: u32,
}

impl PageBudget {
    /// Budget for `filter`, with `max_pages` capped at `cap`
    pub fn new(filter: &FilterCriteria, cap: u32) -> Self {
        Self {
            next: filter.start_page.max(1),
            remaining: filter.max_pages.min(cap),
        }
    }

    /// Pages not yet handed out
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl Iterator for PageBudget {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.remaining == 0 {
            return None;
        }
        let page = self.next;
        self.next = self.next.checked_add(1)?;
        self.remaining -= 1;
        Some(page)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining as usize;
        (0, Some(n))
    }
}
