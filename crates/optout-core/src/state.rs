//! Consent state tracker
//!
//! Single source of truth for "has consent been resolved" and "which elements
//! were already tried". One instance per page load, owned by the orchestrator.
//! Everything is append-only; `mark_processed` is the only terminal transition.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::hash::Hash;
use std::time::Instant;

use crate::rate_limit::{Admission, RateLimiter};

/// How consent got resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// A decline control was clicked. `settings_only` marks the opening
    /// click of a two-step flow: the final reject was never clicked.
    DomClick { label: String, settings_only: bool },
    /// The TCF bulk-decline call succeeded
    TcfDecline,
    /// A SourcePoint decline entry point succeeded
    SourcePointDecline,
    /// A vendor frame reported its prompt hidden
    BannerHidden {
        vendor: Option<String>,
        reject_confirmed: bool,
    },
}

/// Snapshot for the toolbar popup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsentReport {
    pub processed: bool,
    pub resolution: Option<Resolution>,
    pub attempt_count: u32,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct ConsentState<N> {
    processed: bool,
    attempted_elements: HashSet<N>,
    last_attempt: Option<Instant>,
    attempt_count: u32,
    limiter: RateLimiter,
    resolution: Option<Resolution>,
    resolved_at: Option<DateTime<Utc>>,
}

impl<N: Copy + Eq + Hash> ConsentState<N> {
    pub fn new(limiter: RateLimiter) -> Self {
        Self {
            processed: false,
            attempted_elements: HashSet::new(),
            last_attempt: None,
            attempt_count: 0,
            limiter,
            resolution: None,
            resolved_at: None,
        }
    }

    /// Detailed admission decision for an attempt at `now`
    pub fn admission(&self, now: Instant) -> Admission {
        if self.processed {
            return Admission::Resolved;
        }
        self.limiter
            .admit(self.last_attempt, self.attempt_count, now)
    }

    /// True if a decline attempt may run now
    pub fn try_begin_attempt(&self, now: Instant) -> bool {
        self.admission(now).is_allowed()
    }

    pub fn record_attempt(&mut self, now: Instant) {
        if self.processed {
            tracing::debug!("Ignoring attempt recorded after resolution");
            return;
        }
        self.attempt_count += 1;
        self.last_attempt = Some(now);
    }

    /// Record an attempt against a specific element
    pub fn record_element_attempt(&mut self, node: N, now: Instant) {
        self.attempted_elements.insert(node);
        self.record_attempt(now);
    }

    /// Close the state. Returns false if it was already closed.
    pub fn mark_processed(&mut self, resolution: Resolution) -> bool {
        if self.processed {
            return false;
        }

        self.processed = true;
        self.resolution = Some(resolution);
        self.resolved_at = Some(Utc::now());
        true
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn has_attempted(&self, node: N) -> bool {
        self.attempted_elements.contains(&node)
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn report(&self) -> ConsentReport {
        ConsentReport {
            processed: self.processed,
            resolution: self.resolution.clone(),
            attempt_count: self.attempt_count,
            resolved_at: self.resolved_at,
        }
    }
}
