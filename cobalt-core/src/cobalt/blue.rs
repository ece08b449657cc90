// BLUE reacts to queue occupancy rather than delay. Its drop probability climbs while
// the queue keeps overflowing and decays while it keeps running dry. It never uses ECN,
// so flows that ignore marks still see loss.

use rand::RngCore;
use tracing::trace;

use super::{CobaltParams, CobaltVars};
use crate::time::CobaltTime;

/// Call when a packet had to be dropped because the queue was full.
pub fn on_queue_full(vars: &mut CobaltVars, params: &CobaltParams, now: CobaltTime) {
    if now.elapsed_since(vars.blue_timer) > params.target() {
        vars.p_drop = vars.p_drop.saturating_add(params.p_inc());
        vars.blue_timer = now;
        trace!(p_drop = vars.p_drop, %now, "BLUE raised drop probability");
    }
    // an overflowing queue is congested as far as CoDel is concerned too
    vars.dropping = true;
    vars.drop_next = now;
    vars.prime_count();
}

/// Call when the queue was serviced but turned out to be empty.
pub fn on_queue_empty(vars: &mut CobaltVars, params: &CobaltParams, now: CobaltTime) {
    if now.elapsed_since(vars.blue_timer) > params.target() {
        vars.p_drop = vars.p_drop.saturating_sub(params.p_dec());
        vars.blue_timer = now;
        trace!(p_drop = vars.p_drop, %now, "BLUE lowered drop probability");
    }
    vars.dropping = false;
}

pub(super) fn should_drop<R>(vars: &CobaltVars, rng: &mut R) -> bool
where
    R: RngCore + ?Sized,
{
    vars.p_drop != 0 && rng.next_u32() < vars.p_drop
}
