//! COBALT: CoDel and BLUE run side by side on one queue.
//!
//! CoDel reacts to sojourn time and works well on flows that answer congestion signals
//! the way TCP does. BLUE reacts to the queue filling up and emptying, and is what
//! catches flows that ignore those signals. Every dequeued packet gets a verdict from
//! both, and is kept only if neither wants it dropped.
//!
//! Both controllers share one [`CobaltVars`]. Who writes what:
//!
//! | field          | CoDel (`should_drop`) | BLUE full event | BLUE empty event |
//! |----------------|-----------------------|-----------------|------------------|
//! | `count`        | ±1, primes 0 → 1      | primes 0 → 1    | -                |
//! | `rec_inv_sqrt` | follows `count`       | follows `count` | -                |
//! | `drop_next`    | yes                   | set to `now`    | -                |
//! | `dropping`     | yes                   | set             | cleared          |
//! | `ecn_marked`   | yes                   | -               | -                |
//! | `p_drop`       | read                  | increased       | decreased        |
//! | `blue_timer`   | -                     | yes             | yes              |

use std::time::Duration;

use rand::RngCore;
use tracing::trace;

use crate::time::{duration_to_nanos, CobaltTime};

pub mod blue;
pub mod codel;
pub mod rec_inv_sqrt;

pub use blue::{on_queue_empty, on_queue_full};
pub use codel::control_law;

/// What the engine needs from a packet it is deciding on.
pub trait CobaltPacket {
    /// When the packet entered the queue.
    fn enqueue_time(&self) -> CobaltTime;

    /// Mark the packet Congestion Experienced. Returns `false` if it can not carry
    /// the mark, in which case it will be dropped instead.
    fn set_ce(&mut self) -> bool;
}

/// Controller parameters, fixed for the life of a queue. Times are in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CobaltParams {
    interval: u64,
    target: u64,
    threshold: u64,
    p_inc: u32,
    p_dec: u32,
}

impl CobaltParams {
    pub fn new(
        interval: Duration,
        target: Duration,
        threshold: Duration,
        p_inc: u32,
        p_dec: u32,
    ) -> Self {
        Self {
            interval: duration_to_nanos(interval),
            target: duration_to_nanos(target),
            threshold: duration_to_nanos(threshold),
            p_inc,
            p_dec,
        }
    }

    /// CoDel's initial drop interval.
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Maximum persistent sojourn time, and the minimum spacing between BLUE updates.
    pub fn target(&self) -> u64 {
        self.target
    }

    /// Tolerance for the product of sojourn time and time above target. Carried with
    /// the parameters but not consulted by any decision.
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn p_inc(&self) -> u32 {
        self.p_inc
    }

    pub fn p_dec(&self) -> u32 {
        self.p_dec
    }
}

/// Per-queue controller state. Zeroed at creation, only changed through
/// [`should_drop`], [`on_queue_full`], [`on_queue_empty`] and [`CobaltVars::reset`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CobaltVars {
    count: u32,
    rec_inv_sqrt: u32,
    drop_next: CobaltTime,
    blue_timer: CobaltTime,
    p_drop: u32,
    dropping: bool,
    ecn_marked: bool,
}

impl CobaltVars {
    pub fn new() -> Self {
        // first queue to come up pays for the table
        let _ = rec_inv_sqrt::cache();
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Consecutive CoDel actions in the current or most recent dropping episode.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Q0.32 estimate of `1/sqrt(count)`.
    pub fn rec_inv_sqrt(&self) -> u32 {
        self.rec_inv_sqrt
    }

    /// When CoDel may act next.
    pub fn drop_next(&self) -> CobaltTime {
        self.drop_next
    }

    /// When BLUE last changed `p_drop`.
    pub fn blue_timer(&self) -> CobaltTime {
        self.blue_timer
    }

    /// BLUE drop probability, as a fraction of `u32::MAX`.
    pub fn p_drop(&self) -> u32 {
        self.p_drop
    }

    pub fn dropping(&self) -> bool {
        self.dropping
    }

    /// Whether the last [`should_drop`] call marked instead of dropping.
    pub fn ecn_marked(&self) -> bool {
        self.ecn_marked
    }

    fn set_count(&mut self, count: u32) {
        self.rec_inv_sqrt = rec_inv_sqrt::rec_inv_sqrt(count, self.rec_inv_sqrt);
        self.count = count;
    }

    fn prime_count(&mut self) {
        if self.count == 0 {
            self.set_count(1);
        }
    }
}

/// Outcome of one [`should_drop`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verdict {
    /// CoDel wanted the packet gone and could not mark it instead.
    pub codel_drop: bool,
    /// BLUE's random draw came in under `p_drop`.
    pub blue_drop: bool,
    /// CoDel signalled this packet with an ECN mark rather than a drop.
    pub ecn_marked: bool,
}

impl Verdict {
    /// The packet survives only if neither controller wants it dropped.
    pub fn is_drop(&self) -> bool {
        self.codel_drop || self.blue_drop
    }
}

/// Decide the fate of a freshly dequeued packet.
pub fn should_drop<S, R>(
    vars: &mut CobaltVars,
    params: &CobaltParams,
    now: CobaltTime,
    packet: &mut S,
    rng: &mut R,
) -> Verdict
where
    S: CobaltPacket + ?Sized,
    R: RngCore + ?Sized,
{
    let codel = codel::should_drop(vars, params, now, packet);
    let verdict = Verdict {
        codel_drop: codel.drop,
        blue_drop: blue::should_drop(vars, rng),
        ecn_marked: codel.ecn_marked,
    };
    trace!(
        codel_drop = verdict.codel_drop,
        blue_drop = verdict.blue_drop,
        ecn_marked = verdict.ecn_marked,
        count = vars.count,
        p_drop = vars.p_drop,
        "COBALT verdict"
    );
    verdict
}
