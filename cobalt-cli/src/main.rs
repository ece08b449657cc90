use std::io::Write;
use std::process::{ExitCode, Termination};
use std::time::Duration;

use clap::Parser;
use cobalt_core::config;
use cobalt_core::error::{Error, Result};
use cobalt_core::packet::{self, StdPacket};
use cobalt_core::queue::{CobaltQueue, CobaltQueueConfig, CobaltQueueStats, PacketQueue};
use cobalt_core::time::{CobaltTime, ManualClock};
use etherparse::IpEcn;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, error, info, span, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Push a constant-rate packet stream through a COBALT queue drained at a fixed rate.
#[derive(Debug, Parser, Clone)]
#[command(version)]
pub struct CommandArgs {
    /// Queue config file (JSON or TOML), overridden by the flags below
    #[arg(long, value_name = "File")]
    config: Option<String>,

    /// CoDel initial drop interval
    #[arg(long, value_name = "Duration", value_parser = humantime::parse_duration)]
    interval: Option<Duration>,
    /// Acceptable standing sojourn time
    #[arg(long, value_name = "Duration", value_parser = humantime::parse_duration)]
    target: Option<Duration>,
    /// BLUE probability increment, out of 2^32
    #[arg(long)]
    p_inc: Option<u32>,
    /// BLUE probability decrement, out of 2^32
    #[arg(long)]
    p_dec: Option<u32>,
    /// Queue capacity in packets
    #[arg(long, value_name = "Packets")]
    packet_limit: Option<usize>,
    /// Seed for the BLUE random source and the traffic generator
    #[arg(long)]
    seed: Option<u64>,

    /// Packets offered per second
    #[arg(long, value_name = "Packets/s", default_value_t = 1200.0)]
    arrival_rate: f64,
    /// Packets served per second
    #[arg(long, value_name = "Packets/s", default_value_t = 1000.0)]
    service_rate: f64,
    /// Simulated time
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    duration: Duration,
    /// Network layer size of each packet
    #[arg(long, value_name = "Bytes", default_value_t = 1500)]
    packet_size: usize,
    /// Fraction of packets sent as ECT(0)
    #[arg(long, value_name = "Ratio", default_value_t = 0.0)]
    ecn_ratio: f64,

    /// Print the summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Summary {
    config: CobaltQueueConfig,
    #[serde(flatten)]
    stats: CobaltQueueStats,
    ce_received: u64,
    max_queue_length: usize,
    final_queue_length: usize,
    p_drop: u32,
    count: u32,
    dropping: bool,
}

impl CommandArgs {
    fn queue_config(&self) -> Result<CobaltQueueConfig> {
        let mut config = match &self.config {
            Some(path) => config::load(path)?,
            None => CobaltQueueConfig::default(),
        };
        if let Some(interval) = self.interval {
            config.interval = interval;
        }
        if let Some(target) = self.target {
            config.target = target;
        }
        if let Some(p_inc) = self.p_inc {
            config.p_inc = p_inc;
        }
        if let Some(p_dec) = self.p_dec {
            config.p_dec = p_dec;
        }
        if self.packet_limit.is_some() {
            config.packet_limit = self.packet_limit;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        Ok(config)
    }

    fn period(rate: f64, name: &str) -> Result<u64> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::Custom(format!(
                "{} must be a positive number, got {}",
                name, rate
            )));
        }
        Ok(((1e9 / rate) as u64).max(1))
    }
}

fn simulate(opts: &CommandArgs) -> Result<Summary> {
    if !(0.0..=1.0).contains(&opts.ecn_ratio) {
        return Err(Error::Custom(format!(
            "ecn-ratio must be within [0, 1], got {}",
            opts.ecn_ratio
        )));
    }
    let arrival_period = CommandArgs::period(opts.arrival_rate, "arrival-rate")?;
    let service_period = CommandArgs::period(opts.service_rate, "service-rate")?;
    let end = CobaltTime::ZERO + opts.duration;

    let config = opts.queue_config()?;
    let mut traffic_rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));
    let clock = ManualClock::new(CobaltTime::ZERO);
    let mut queue: CobaltQueue<StdPacket, ManualClock> =
        CobaltQueue::with_clock(config.clone(), clock.clone())?;

    let mut next_arrival = CobaltTime::ZERO;
    let mut next_service = CobaltTime::from_nanos(service_period);
    let mut ce_received = 0;
    let mut max_queue_length = 0;

    loop {
        let arrival_first = next_arrival - next_service <= 0;
        let now = if arrival_first {
            next_arrival
        } else {
            next_service
        };
        if now - end > 0 {
            break;
        }
        clock.set(now);

        if arrival_first {
            let ecn = if traffic_rng.random_bool(opts.ecn_ratio) {
                IpEcn::TWO
            } else {
                IpEcn::ZERO
            };
            queue.enqueue(StdPacket::synthetic_ipv4(ecn, opts.packet_size));
            max_queue_length = max_queue_length.max(queue.length());
            next_arrival = next_arrival.wrapping_add_nanos(arrival_period);
        } else {
            if let Some(packet) = queue.dequeue() {
                if packet::classify(&packet) == IpEcn::THREE {
                    ce_received += 1;
                }
            }
            next_service = next_service.wrapping_add_nanos(service_period);
        }
    }

    debug!(vars = ?queue.vars(), "Simulation finished");
    Ok(Summary {
        config,
        stats: *queue.stats(),
        ce_received,
        max_queue_length,
        final_queue_length: queue.length(),
        p_drop: queue.vars().p_drop(),
        count: queue.vars().count(),
        dropping: queue.vars().dropping(),
    })
}

fn print_summary(opts: &CommandArgs, summary: &Summary) -> Result<()> {
    if opts.json {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", serde_json::to_string_pretty(summary)?)?;
        return Ok(());
    }
    let offered = summary.stats.enqueued + summary.stats.overflow_drops;
    info!(
        offered,
        delivered = summary.stats.delivered,
        overflow_drops = summary.stats.overflow_drops,
        codel_drops = summary.stats.codel_drops,
        blue_drops = summary.stats.blue_drops,
        ecn_marks = summary.stats.ecn_marks,
        ce_received = summary.ce_received,
        "Packets"
    );
    info!(
        max_queue_length = summary.max_queue_length,
        final_queue_length = summary.final_queue_length,
        p_drop = summary.p_drop,
        p_drop_ratio = summary.p_drop as f64 / u32::MAX as f64,
        count = summary.count,
        dropping = summary.dropping,
        "Controller"
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    let opts = CommandArgs::parse();
    debug!("{:?}", opts);

    let result = span!(Level::INFO, "simulate")
        .in_scope(|| simulate(&opts))
        .and_then(|summary| print_summary(&opts, &summary));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            e.report()
        }
    }
}
