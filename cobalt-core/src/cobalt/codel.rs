// Simplified CoDel. Reference:
// https://github.com/torvalds/linux/blob/v6.6/include/net/codel.h
// https://github.com/torvalds/linux/blob/v6.6/net/sched/sch_cake.c

use tracing::trace;

use super::{CobaltPacket, CobaltParams, CobaltVars};
use crate::time::CobaltTime;

/// `t + interval / sqrt(count)`, with `1/sqrt(count)` supplied as a Q0.32 fraction so
/// neither a square root nor a division is needed.
pub fn control_law(t: CobaltTime, interval: u64, rec_inv_sqrt: u32) -> CobaltTime {
    let scaled = (interval as u128 * rec_inv_sqrt as u128) >> 32;
    t.wrapping_add_nanos(scaled as u64)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct CodelVerdict {
    pub drop: bool,
    pub ecn_marked: bool,
}

pub(super) fn should_drop<S>(
    vars: &mut CobaltVars,
    params: &CobaltParams,
    now: CobaltTime,
    packet: &mut S,
) -> CodelVerdict
where
    S: CobaltPacket + ?Sized,
{
    let mut verdict = CodelVerdict::default();

    let sojourn = now - packet.enqueue_time();
    let schedule = now - vars.drop_next;
    // a negative sojourn means the stamp is ahead of the clock, never over target
    let over_target = u64::try_from(sojourn).is_ok_and(|sojourn| sojourn > params.target());
    let mut next_due = vars.count > 0 && schedule >= 0;

    vars.ecn_marked = false;

    if over_target {
        if !vars.dropping {
            vars.dropping = true;
            vars.drop_next = now.wrapping_add_nanos(params.interval());
            trace!(sojourn, drop_next = %vars.drop_next, "Enter dropping state");
        }
        vars.prime_count();
    } else if vars.dropping {
        vars.dropping = false;
        trace!(sojourn, count = vars.count, "Exit dropping state");
    }

    if next_due && vars.dropping {
        verdict.ecn_marked = packet.set_ce();
        verdict.drop = !verdict.ecn_marked;
        vars.ecn_marked = verdict.ecn_marked;

        vars.set_count(vars.count.saturating_add(1));
        vars.drop_next = control_law(vars.drop_next, params.interval(), vars.rec_inv_sqrt);
        trace!(
            sojourn,
            count = vars.count,
            ecn_marked = verdict.ecn_marked,
            drop_next = %vars.drop_next,
            "CoDel signalled congestion"
        );
    } else {
        // unwind the schedule without touching packets; bounded by count
        while next_due {
            vars.set_count(vars.count - 1);
            vars.drop_next = control_law(vars.drop_next, params.interval(), vars.rec_inv_sqrt);
            next_due = vars.count > 0 && now - vars.drop_next >= 0;
        }
    }

    verdict
}
