use std::time::Duration;

use cobalt_core::cobalt::rec_inv_sqrt;
use cobalt_core::time::CobaltTime;
use cobalt_core::{
    on_queue_empty, on_queue_full, should_drop, CobaltPacket, CobaltParams, CobaltVars,
};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use tracing::{info, instrument};

const MS: u64 = 1_000_000;

#[derive(Debug)]
struct Stamped {
    enqueue_time: CobaltTime,
    markable: bool,
}

impl CobaltPacket for Stamped {
    fn enqueue_time(&self) -> CobaltTime {
        self.enqueue_time
    }

    fn set_ce(&mut self) -> bool {
        self.markable
    }
}

struct ConstRng(u32);

impl RngCore for ConstRng {
    fn next_u32(&mut self) -> u32 {
        self.0
    }

    fn next_u64(&mut self) -> u64 {
        self.0 as u64
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        dest.fill(0);
    }
}

fn params(p_inc: u32, p_dec: u32) -> CobaltParams {
    CobaltParams::new(
        Duration::from_millis(100),
        Duration::from_millis(5),
        Duration::ZERO,
        p_inc,
        p_dec,
    )
}

#[instrument]
#[test_log::test]
fn test_short_sojourn_passes() {
    let params = params(1000, 1000);
    let mut vars = CobaltVars::new();
    let now = CobaltTime::from_nanos(1000 * MS);
    let mut packet = Stamped {
        enqueue_time: CobaltTime::from_nanos(997 * MS),
        markable: false,
    };
    let verdict = should_drop(&mut vars, &params, now, &mut packet, &mut ConstRng(0));
    assert!(!verdict.codel_drop);
    assert!(!verdict.is_drop());
    assert!(!vars.dropping());
    assert_eq!(vars.count(), 0);
}

#[instrument]
#[test_log::test]
fn test_long_sojourn_enters_dropping() {
    let params = params(1000, 1000);
    let mut vars = CobaltVars::new();
    let now = CobaltTime::from_nanos(1000 * MS);
    let mut packet = Stamped {
        enqueue_time: CobaltTime::from_nanos(990 * MS),
        markable: false,
    };
    let verdict = should_drop(&mut vars, &params, now, &mut packet, &mut ConstRng(0));
    assert!(!verdict.is_drop());
    assert!(vars.dropping());
    assert_eq!(vars.count(), 1);
    assert_eq!(vars.drop_next(), CobaltTime::from_nanos(1100 * MS));
}

#[instrument]
#[test_log::test]
fn test_full_events_past_target_accumulate() {
    let params = params(1000, 1000);
    let mut vars = CobaltVars::new();
    let step = params.target() + 1;
    for i in 1..=3 {
        on_queue_full(&mut vars, &params, CobaltTime::from_nanos(i * step));
    }
    assert_eq!(vars.p_drop(), 3000);
}

#[instrument]
#[test_log::test]
fn test_blue_drop_overrides_codel_pass() {
    let params = params(1000, 1000);
    let mut vars = CobaltVars::new();
    on_queue_full(&mut vars, &params, CobaltTime::from_nanos(10 * MS));
    on_queue_empty(&mut vars, &params, CobaltTime::from_nanos(11 * MS));
    assert_eq!(vars.p_drop(), 1000);

    let mut packet = Stamped {
        enqueue_time: CobaltTime::from_nanos(11 * MS),
        markable: true,
    };
    let verdict = should_drop(
        &mut vars,
        &params,
        CobaltTime::from_nanos(12 * MS),
        &mut packet,
        &mut ConstRng(0),
    );
    assert!(!verdict.codel_drop);
    assert!(verdict.blue_drop);
    assert!(verdict.is_drop());
}

#[instrument]
#[test_log::test]
fn test_estimator_tracks_inverse_sqrt() {
    let mut rec = u32::MAX;
    let mut previous = u32::MAX;
    for count in 1..2000u32 {
        rec = rec_inv_sqrt::rec_inv_sqrt(count, rec);
        assert!(rec <= previous);
        previous = rec;
    }
    let exact = (u32::MAX as f64) / (1999f64).sqrt();
    let error = (rec as f64 - exact).abs() / exact;
    info!(rec, exact, error, "Estimate at count 1999");
    assert!(error < 0.01);
}

#[instrument]
#[test_log::test]
fn test_probability_stays_in_range() {
    let params = params(u32::MAX / 2, u32::MAX / 2);
    let mut vars = CobaltVars::new();
    let mut now = 0;
    for _ in 0..8 {
        now += 6 * MS;
        on_queue_full(&mut vars, &params, CobaltTime::from_nanos(now));
    }
    assert_eq!(vars.p_drop(), u32::MAX);
    for _ in 0..8 {
        now += 6 * MS;
        on_queue_empty(&mut vars, &params, CobaltTime::from_nanos(now));
    }
    assert_eq!(vars.p_drop(), 0);
}

#[instrument]
#[test_log::test]
fn test_congestion_episode_and_recovery() {
    let params = params(0, 0);
    let mut vars = CobaltVars::new();
    let mut rng = StdRng::seed_from_u64(42);

    // 20ms standing queue for one second, one dequeue per millisecond
    let mut drops = 0;
    for ms in 1000..2000u64 {
        let now = CobaltTime::from_nanos(ms * MS);
        let mut packet = Stamped {
            enqueue_time: CobaltTime::from_nanos((ms - 20) * MS),
            markable: false,
        };
        if should_drop(&mut vars, &params, now, &mut packet, &mut rng).is_drop() {
            drops += 1;
        }
    }
    let peak = vars.count();
    info!(drops, peak, "Congested second");
    assert!(vars.dropping());
    assert_eq!(peak as u64, drops + 1);

    // queue drains, nothing else is dropped and the schedule unwinds
    for ms in 2000..20_000u64 {
        let now = CobaltTime::from_nanos(ms * MS);
        let mut packet = Stamped {
            enqueue_time: CobaltTime::from_nanos((ms - 1) * MS),
            markable: false,
        };
        let verdict = should_drop(&mut vars, &params, now, &mut packet, &mut rng);
        assert!(!verdict.is_drop());
        if vars.count() == 0 {
            break;
        }
    }
    assert!(!vars.dropping());
    assert_eq!(vars.count(), 0);
}
