use std::collections::VecDeque;
use std::fmt::Debug;
use std::time::Duration;

use etherparse::IpEcn;
use rand::{rngs::StdRng, SeedableRng};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::cobalt::{self, CobaltPacket, CobaltParams, CobaltVars};
use crate::error::{Error, Result};
use crate::packet::{self, Packet};
use crate::time::{Clock, CobaltTime, InstantClock};

pub trait PacketQueue<P>: Send
where
    P: Packet,
{
    #[cfg(feature = "serde")]
    type Config: for<'a> Deserialize<'a> + Serialize + Send + Debug;
    #[cfg(not(feature = "serde"))]
    type Config: Send + Debug;

    fn configure(&mut self, config: Self::Config);

    fn enqueue(&mut self, packet: P);

    // If the queue is empty, return `None`
    fn dequeue(&mut self) -> Option<P>;

    fn is_empty(&self) -> bool;

    // If the queue is empty, return `None`
    fn get_front_size(&self) -> Option<usize>;

    fn length(&self) -> usize;
}

// COBALT Queue Implementation Reference:
// https://github.com/torvalds/linux/blob/v6.6/net/sched/sch_cake.c

#[cfg_attr(
    feature = "serde",
    serde_with::skip_serializing_none,
    derive(Deserialize, Serialize),
    serde(default)
)]
#[derive(Debug, Clone, PartialEq)]
pub struct CobaltQueueConfig {
    // the maximum number of packets in the queue, or None for unlimited
    pub packet_limit: Option<usize>,
    // the maximum number of bytes in the queue, or None for unlimited
    pub byte_limit: Option<usize>,
    #[cfg_attr(feature = "serde", serde(with = "crate::utils::serde::duration"))]
    pub interval: Duration, // codel initial drop interval
    #[cfg_attr(feature = "serde", serde(with = "crate::utils::serde::duration"))]
    pub target: Duration, // maximum persistent sojourn time & blue update rate
    #[cfg_attr(feature = "serde", serde(with = "crate::utils::serde::duration"))]
    pub threshold: Duration, // reserved, not used by any decision
    pub p_inc: u32, // increment of blue drop probability
    pub p_dec: u32, // decrement of blue drop probability
    pub use_ecn: bool,
    pub seed: u64,
}

impl Default for CobaltQueueConfig {
    fn default() -> Self {
        Self {
            packet_limit: None,
            byte_limit: None,
            interval: Duration::from_millis(100),
            target: Duration::from_millis(5),
            threshold: Duration::ZERO,
            p_inc: 1 << 24,
            p_dec: 1 << 20,
            use_ecn: true,
            seed: 42,
        }
    }
}

impl CobaltQueueConfig {
    pub fn new<A: Into<Option<usize>>, B: Into<Option<usize>>>(
        packet_limit: A,
        byte_limit: B,
        interval: Duration,
        target: Duration,
        p_inc: u32,
        p_dec: u32,
        use_ecn: bool,
    ) -> Self {
        Self {
            packet_limit: packet_limit.into(),
            byte_limit: byte_limit.into(),
            interval,
            target,
            p_inc,
            p_dec,
            use_ecn,
            ..Default::default()
        }
    }

    /// Validate the configuration and convert it to controller parameters.
    pub fn params(&self) -> Result<CobaltParams> {
        if self.interval.is_zero() {
            return Err(Error::ConfigError(
                "COBALT interval must be greater than zero".to_string(),
            ));
        }
        if self.target.is_zero() {
            return Err(Error::ConfigError(
                "COBALT target must be greater than zero".to_string(),
            ));
        }
        Ok(CobaltParams::new(
            self.interval,
            self.target,
            self.threshold,
            self.p_inc,
            self.p_dec,
        ))
    }
}

/// Per-queue counters.
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CobaltQueueStats {
    pub enqueued: u64,
    pub delivered: u64,
    pub overflow_drops: u64, // rejected at enqueue, queue full
    pub codel_drops: u64,    // dropped by CoDel, including those BLUE also drew
    pub blue_drops: u64,     // dropped by BLUE alone
    pub ecn_marks: u64,      // delivered with a CoDel CE mark
}

#[derive(Debug)]
struct CobaltControlBuffer<P> {
    packet: P,
    enqueue_time: CobaltTime,
    ecn_capable: bool,
}

impl<P> CobaltPacket for CobaltControlBuffer<P>
where
    P: Packet,
{
    fn enqueue_time(&self) -> CobaltTime {
        self.enqueue_time
    }

    fn set_ce(&mut self) -> bool {
        self.ecn_capable && packet::set_ce(&mut self.packet)
    }
}

#[derive(Debug)]
pub struct CobaltQueue<P, C = InstantClock> {
    queue: VecDeque<CobaltControlBuffer<P>>,
    config: CobaltQueueConfig,
    params: CobaltParams,
    vars: CobaltVars,
    now_bytes: usize, // the current number of bytes in the queue
    clock: C,
    rng: StdRng,
    stats: CobaltQueueStats,
}

impl<P> CobaltQueue<P, InstantClock> {
    pub fn new(config: CobaltQueueConfig) -> Result<Self> {
        Self::with_clock(config, InstantClock::new())
    }
}

impl<P, C> CobaltQueue<P, C> {
    pub fn with_clock(config: CobaltQueueConfig, clock: C) -> Result<Self> {
        let params = config.params()?;
        debug!(?config, "New CobaltQueue");
        Ok(Self {
            queue: VecDeque::new(),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            params,
            vars: CobaltVars::new(),
            now_bytes: 0,
            clock,
            stats: CobaltQueueStats::default(),
        })
    }

    pub fn config(&self) -> &CobaltQueueConfig {
        &self.config
    }

    pub fn params(&self) -> &CobaltParams {
        &self.params
    }

    pub fn vars(&self) -> &CobaltVars {
        &self.vars
    }

    pub fn stats(&self) -> &CobaltQueueStats {
        &self.stats
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Zero the controller state. Queued packets and counters are kept.
    pub fn reset(&mut self) {
        debug!("Reset COBALT state");
        self.vars.reset();
    }
}

impl<P> TryFrom<CobaltQueueConfig> for CobaltQueue<P, InstantClock> {
    type Error = Error;

    fn try_from(config: CobaltQueueConfig) -> Result<Self> {
        CobaltQueue::new(config)
    }
}

impl<P, C> CobaltQueue<P, C>
where
    P: Packet,
    C: Clock,
{
    fn over_limit(&self, length: usize) -> bool {
        self.config
            .packet_limit
            .is_some_and(|limit| self.queue.len() >= limit)
            || self
                .config
                .byte_limit
                .is_some_and(|limit| self.now_bytes + length > limit)
    }
}

impl<P, C> PacketQueue<P> for CobaltQueue<P, C>
where
    P: Packet,
    C: Clock,
{
    type Config = CobaltQueueConfig;

    fn configure(&mut self, config: Self::Config) {
        match config.params() {
            Ok(params) => {
                debug!(?config, "Configure CobaltQueue");
                self.params = params;
                self.config = config;
            }
            Err(e) => warn!("Ignore invalid COBALT config: {}", e),
        }
    }

    fn enqueue(&mut self, packet: P) {
        let now = self.clock.now();
        let length = packet.l3_length();
        if self.over_limit(length) {
            cobalt::on_queue_full(&mut self.vars, &self.params, now);
            self.stats.overflow_drops += 1;
            let header = &packet.as_slice()[..packet.length().min(56)];
            trace!(
                queue_len = self.queue.len(),
                now_bytes = self.now_bytes,
                p_drop = self.vars.p_drop(),
                header = ?format!("{:X?}", header),
                "Drop packet(l3_len: {}) when enqueue", length
            );
            return;
        }

        let ecn_capable = self.config.use_ecn && packet::classify(&packet) != IpEcn::ZERO;
        self.now_bytes += length;
        self.stats.enqueued += 1;
        self.queue.push_back(CobaltControlBuffer {
            packet,
            enqueue_time: now,
            ecn_capable,
        });
    }

    fn dequeue(&mut self) -> Option<P> {
        loop {
            let now = self.clock.now();
            let mut control_buffer = match self.queue.pop_front() {
                Some(control_buffer) => control_buffer,
                None => {
                    cobalt::on_queue_empty(&mut self.vars, &self.params, now);
                    return None;
                }
            };
            self.now_bytes -= control_buffer.packet.l3_length();

            let verdict = cobalt::should_drop(
                &mut self.vars,
                &self.params,
                now,
                &mut control_buffer,
                &mut self.rng,
            );
            if !verdict.is_drop() {
                if verdict.ecn_marked {
                    self.stats.ecn_marks += 1;
                }
                self.stats.delivered += 1;
                return Some(control_buffer.packet);
            }

            if verdict.codel_drop {
                self.stats.codel_drops += 1;
            } else {
                self.stats.blue_drops += 1;
            }
            trace!(
                sojourn = now - control_buffer.enqueue_time,
                count = self.vars.count(),
                p_drop = self.vars.p_drop(),
                after_queue_len = self.queue.len(),
                after_now_bytes = self.now_bytes,
                codel = verdict.codel_drop,
                blue = verdict.blue_drop,
                "Drop packet(l3_len: {}) when dequeue: {}",
                control_buffer.packet.l3_length(),
                control_buffer.packet.desc()
            );
        }
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn get_front_size(&self) -> Option<usize> {
        self.queue
            .front()
            .map(|control_buffer| control_buffer.packet.l3_length())
    }

    fn length(&self) -> usize {
        self.queue.len()
    }
}
