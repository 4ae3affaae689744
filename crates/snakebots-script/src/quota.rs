//! Per-invocation resource limits.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rhai::Engine;
use snakebots_core::ScriptSettings;

/// Operations between two wall-clock checks.
const CLOCK_CHECK_MASK: u64 = 0x3ff;

/// Wall-clock deadline shared between a runtime and its engine's progress hook.
#[derive(Debug)]
pub(crate) struct Deadline {
    origin: Instant,
    /// Nanoseconds after `origin`; `u64::MAX` when disarmed.
    expires_at: AtomicU64,
}

impl Deadline {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
            expires_at: AtomicU64::new(u64::MAX),
        }
    }

    fn elapsed_nanos(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Start a fresh budget measured from now.
    pub(crate) fn arm(&self, budget: Duration) {
        let budget = u64::try_from(budget.as_nanos()).unwrap_or(u64::MAX);
        let expires = self.elapsed_nanos().saturating_add(budget);
        self.expires_at.store(expires, Ordering::Release);
    }

    pub(crate) fn disarm(&self) {
        self.expires_at.store(u64::MAX, Ordering::Release);
    }

    pub(crate) fn expired(&self) -> bool {
        self.elapsed_nanos() >= self.expires_at.load(Ordering::Acquire)
    }
}

/// Arms the deadline for the lifetime of one script invocation.
pub(crate) struct Armed<'a>(&'a Deadline);

impl<'a> Armed<'a> {
    pub(crate) fn new(deadline: &'a Deadline, budget: Duration) -> Self {
        deadline.arm(budget);
        Self(deadline)
    }
}

impl Drop for Armed<'_> {
    fn drop(&mut self) {
        self.0.disarm();
    }
}

/// Install instruction, depth and size limits plus the wall-clock check.
pub(crate) fn apply_limits(engine: &mut Engine, settings: &ScriptSettings, deadline: Arc<Deadline>) {
    engine.set_max_operations(settings.max_operations);
    engine.set_max_call_levels(settings.max_call_depth);
    engine.set_max_expr_depths(settings.max_call_depth, settings.max_call_depth);
    engine.set_max_string_size(settings.max_string_size);
    engine.set_max_array_size(settings.max_array_size);
    engine.set_max_map_size(settings.max_map_size);
    engine.on_progress(move |ops| {
        if ops & CLOCK_CHECK_MASK == 0 && deadline.expired() {
            Some("time budget exceeded".into())
        } else {
            None
        }
    });
}
