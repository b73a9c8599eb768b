use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// Tracks scrape spend against a per-cycle limit.
/// Thread-safe via atomics: scrapes reserve at launch and settle when they finish.
pub struct BudgetTracker {
    /// Cycle limit in cents. 0 = unlimited.
    limit_cents: u64,
    spent_cents: AtomicU64,
}

impl BudgetTracker {
    pub fn new(limit_cents: u64) -> Self {
        Self {
            limit_cents,
            spent_cents: AtomicU64::new(0),
        }
    }

    /// Claim `cost_cents` up front, before a scrape launches. Fails without
    /// claiming anything if the claim would cross the limit.
    ///
    /// Concurrent launches race on the same counter, so the limit holds no
    /// matter how many scrapes are in flight.
    pub fn try_reserve(&self, cost_cents: u64) -> bool {
        if self.limit_cents == 0 {
            self.spent_cents.fetch_add(cost_cents, Ordering::AcqRel);
            return true;
        }
        self.spent_cents
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |spent| {
                let next = spent + cost_cents;
                (next <= self.limit_cents).then_some(next)
            })
            .is_ok()
    }

    /// Replace a reservation with what the provider actually billed, rounded
    /// up to whole cents. Returns false if the cycle is now over its limit.
    pub fn settle(&self, reserved_cents: u64, actual_usd: f64) -> bool {
        let actual_cents = usd_to_cents(actual_usd);
        let spent = if actual_cents >= reserved_cents {
            let extra = actual_cents - reserved_cents;
            self.spent_cents.fetch_add(extra, Ordering::AcqRel) + extra
        } else {
            let refund = reserved_cents - actual_cents;
            self.spent_cents.fetch_sub(refund, Ordering::AcqRel) - refund
        };
        if self.limit_cents > 0 && spent > self.limit_cents {
            warn!(spent, limit = self.limit_cents, "Scrape budget exceeded");
            return false;
        }
        true
    }

    pub fn total_spent(&self) -> u64 {
        self.spent_cents.load(Ordering::Relaxed)
    }

    /// Budget remaining (`u64::MAX` if unlimited).
    pub fn remaining(&self) -> u64 {
        if self.limit_cents == 0 {
            return u64::MAX;
        }
        self.limit_cents
            .saturating_sub(self.spent_cents.load(Ordering::Relaxed))
    }

    pub fn is_active(&self) -> bool {
        self.limit_cents > 0
    }

    pub fn log_status(&self) {
        if self.is_active() {
            info!(
                spent_cents = self.total_spent(),
                remaining_cents = self.remaining(),
                limit_cents = self.limit_cents,
                "Scrape budget status"
            );
        }
    }
}

pub fn usd_to_cents(cost_usd: f64) -> u64 {
    if cost_usd.is_finite() && cost_usd > 0.0 {
        (cost_usd * 100.0).ceil() as u64
    } else {
        0
    }
}
