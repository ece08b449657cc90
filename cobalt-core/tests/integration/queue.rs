use std::time::Duration;

use cobalt_core::packet::{self, StdPacket};
use cobalt_core::queue::{CobaltQueue, CobaltQueueConfig, PacketQueue};
use cobalt_core::time::{CobaltTime, ManualClock};
use etherparse::IpEcn;
use itertools::iproduct;
use tracing::{info, instrument, span, Level};

#[tokio::test(start_paused = true)]
async fn test_queue_on_tokio_clock() -> anyhow::Result<()> {
    let mut queue: CobaltQueue<StdPacket> = CobaltQueueConfig::default().try_into()?;

    // 30ms standing queue
    for _ in 0..30 {
        queue.enqueue(StdPacket::synthetic_ipv4(IpEcn::ZERO, 1000));
        tokio::time::advance(Duration::from_millis(1)).await;
    }
    let mut delivered = 0;
    for _ in 0..200 {
        queue.enqueue(StdPacket::synthetic_ipv4(IpEcn::ZERO, 1000));
        tokio::time::advance(Duration::from_millis(1)).await;
        if queue.dequeue().is_some() {
            delivered += 1;
        }
    }
    let stats = *queue.stats();
    info!(?stats, "After 200ms");
    assert_eq!(stats.delivered, delivered);
    assert!(stats.codel_drops > 0);
    assert!(queue.vars().dropping());
    assert_eq!(
        stats.enqueued,
        stats.delivered + stats.codel_drops + stats.blue_drops + queue.length() as u64
    );
    Ok(())
}

#[instrument]
#[test_log::test]
fn test_mixed_traffic_accounting() -> anyhow::Result<()> {
    for (use_ecn, packet_limit) in iproduct!([true, false], [Some(16), Some(64), None]) {
        let _span = span!(Level::INFO, "mixed", use_ecn, ?packet_limit).entered();
        let config = CobaltQueueConfig {
            packet_limit,
            use_ecn,
            ..Default::default()
        };
        let clock = ManualClock::new(CobaltTime::ZERO);
        let mut queue = CobaltQueue::with_clock(config, clock.clone())?;

        let mut ce_received = 0;
        for i in 0..3000u64 {
            // every other packet is ECT(0), offered load is 3/2 of service
            let ecn = if i % 2 == 0 { IpEcn::TWO } else { IpEcn::ZERO };
            queue.enqueue(StdPacket::synthetic_ipv4(ecn, 1200));
            clock.advance(Duration::from_micros(500));
            if i % 3 != 0 {
                if let Some(packet) = queue.dequeue() {
                    if packet::classify(&packet) == IpEcn::THREE {
                        ce_received += 1;
                    }
                }
            }
            clock.advance(Duration::from_micros(500));
        }

        let stats = *queue.stats();
        info!(?stats, ce_received, "Done");
        assert_eq!(stats.enqueued + stats.overflow_drops, 3000);
        assert_eq!(
            stats.enqueued,
            stats.delivered + stats.codel_drops + stats.blue_drops + queue.length() as u64
        );
        assert_eq!(stats.ecn_marks, ce_received);
        assert!(stats.codel_drops > 0);
        if !use_ecn {
            assert_eq!(stats.ecn_marks, 0);
        } else {
            assert!(stats.ecn_marks > 0);
        }
        if packet_limit.is_none() {
            assert_eq!(stats.overflow_drops, 0);
            assert_eq!(queue.vars().p_drop(), 0);
            assert_eq!(stats.blue_drops, 0);
        }
    }
    Ok(())
}

#[instrument]
#[test_log::test]
fn test_queue_from_config_file() -> anyhow::Result<()> {
    use std::io::Write;

    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    writeln!(file, "packet_limit = 8\ntarget = \"2ms\"\ninterval = \"20ms\"")?;
    let config: CobaltQueueConfig = cobalt_core::config::load(file.path().to_string_lossy())?;

    let clock = ManualClock::new(CobaltTime::from_nanos(1_000_000_000));
    let mut queue = CobaltQueue::with_clock(config, clock.clone())?;
    assert_eq!(queue.params().target(), 2_000_000);
    assert_eq!(queue.params().interval(), 20_000_000);

    for _ in 0..10 {
        queue.enqueue(StdPacket::synthetic_ipv4(IpEcn::ZERO, 500));
    }
    assert_eq!(queue.length(), 8);
    assert_eq!(queue.stats().overflow_drops, 2);
    assert!(queue.vars().p_drop() > 0);

    // the overflow armed CoDel, the first dequeue past target acts on it
    clock.advance(Duration::from_millis(3));
    assert!(queue.dequeue().is_some());
    assert_eq!(queue.stats().codel_drops, 1);
    assert_eq!(queue.vars().count(), 2);
    Ok(())
}
