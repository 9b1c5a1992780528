use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::{error, info};

use parking_sim::simulation::{
    AnyBayFallback, DedicatedBaysFirst, DriverMix, EvictionPolicy, MetricsExporter,
    MetricsRecord, ParkingConfig, PricingConfig, PricingStrategy, ReservationConfig, SimWorld,
    WtpModel, BASE_RATE_PER_MINUTE, DISCOUNT_MULTIPLIER, RESERVATION_FEE, SURGE_MULTIPLIER,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    Standard,
    Dynamic,
    Reservations,
}

impl From<StrategyArg> for PricingStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Standard => PricingStrategy::Standard,
            StrategyArg::Dynamic => PricingStrategy::Dynamic,
            StrategyArg::Reservations => PricingStrategy::Reservations,
        }
    }
}

/// `disabled`, `immediate` or `grace:<ticks>`
fn parse_eviction(s: &str) -> Result<EvictionPolicy, String> {
    match s {
        "disabled" => Ok(EvictionPolicy::Disabled),
        "immediate" => Ok(EvictionPolicy::Immediate),
        _ => s
            .strip_prefix("grace:")
            .and_then(|ticks| ticks.parse().ok())
            .map(EvictionPolicy::GracePeriod)
            .ok_or_else(|| format!("expected disabled, immediate or grace:<ticks>, got '{s}'")),
    }
}

#[derive(Parser)]
#[command(name = "parking_sim")]
#[command(about = "Headless parking facility simulation")]
struct Cli {
    /// Number of simulated days to run
    #[arg(long, default_value = "1")]
    days: u64,

    /// Ticks (minutes) per simulated day
    #[arg(long, default_value = "1000")]
    day_length: u64,

    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, value_enum, default_value = "standard")]
    strategy: StrategyArg,

    #[arg(long, default_value = "50")]
    width: i32,

    #[arg(long, default_value = "20")]
    height: i32,

    /// Parking columns per bay row
    #[arg(long, default_value = "16")]
    spaces: usize,

    #[arg(long, default_value = "0")]
    ev_spaces: usize,

    #[arg(long, default_value = "0")]
    pmr_spaces: usize,

    /// Let every driver class fall back to any bay category
    #[arg(long)]
    any_bay_fallback: bool,

    /// Scale applied to the time-of-day arrival profile
    #[arg(long, default_value = "0.7")]
    intensity: f64,

    #[arg(long, default_value = "10")]
    max_queue_length: usize,

    /// Base probability of refusing to join a long queue
    #[arg(long, default_value = "0.8")]
    p_not_enter: f64,

    /// Ticks a queued driver waits before it may balk
    #[arg(long, default_value = "15")]
    max_wait: u64,

    #[arg(long, default_value = "0.1")]
    balk_prob: f64,

    /// Let the driver at the checkpoint balk too
    #[arg(long)]
    gate_balking: bool,

    #[arg(long, default_value = "0.2")]
    reservation_fraction: f64,

    #[arg(long, default_value = "30")]
    hold_time: u64,

    #[arg(long, default_value = "0.1")]
    no_show_prob: f64,

    #[arg(long, default_value = "1")]
    reservations_per_space: u32,

    /// Fixed stay for reservation holders
    #[arg(long)]
    reservation_duration: Option<u64>,

    #[arg(long)]
    walk_ins_use_reserved: bool,

    /// disabled, immediate or grace:<ticks>
    #[arg(long, default_value = "immediate", value_parser = parse_eviction)]
    eviction: EvictionPolicy,

    /// Base rate per minute
    #[arg(long, default_value_t = BASE_RATE_PER_MINUTE)]
    base_rate: f64,

    #[arg(long, default_value_t = RESERVATION_FEE)]
    reservation_fee: f64,

    /// Rate multiplier below half occupancy (dynamic pricing)
    #[arg(long, default_value_t = DISCOUNT_MULTIPLIER)]
    discount_multiplier: f64,

    /// Rate multiplier above 80% occupancy (dynamic pricing)
    #[arg(long, default_value_t = SURGE_MULTIPLIER)]
    surge_multiplier: f64,

    #[arg(long, default_value = "0.01")]
    wtp_min: f64,

    #[arg(long, default_value = "0.05")]
    wtp_max: f64,

    /// Draw willingness to pay from a log-normal with this mu instead
    #[arg(long, requires = "wtp_sigma")]
    wtp_mu: Option<f64>,

    #[arg(long, requires = "wtp_mu")]
    wtp_sigma: Option<f64>,

    #[arg(long, default_value = "0.15")]
    ev_share: f64,

    #[arg(long, default_value = "0.05")]
    pmr_share: f64,

    /// Print the map at the end of every day
    #[arg(long)]
    show_map: bool,
}

impl Cli {
    fn to_config(&self) -> ParkingConfig {
        let wtp = match (self.wtp_mu, self.wtp_sigma) {
            (Some(mu), Some(sigma)) => WtpModel::LogNormal { mu, sigma },
            _ => WtpModel::Uniform {
                min: self.wtp_min,
                max: self.wtp_max,
            },
        };

        ParkingConfig {
            width: self.width,
            height: self.height,
            n_spaces: self.spaces,
            n_ev_spaces: self.ev_spaces,
            n_pmr_spaces: self.pmr_spaces,
            arrival_intensity: self.intensity,
            max_queue_length: self.max_queue_length,
            p_not_enter_long_queue: self.p_not_enter,
            max_wait_time: self.max_wait,
            balk_probability: self.balk_prob,
            gate_balking: self.gate_balking,
            day_length: self.day_length,
            reservations: ReservationConfig {
                fraction: self.reservation_fraction,
                hold_time: self.hold_time,
                no_show_prob: self.no_show_prob,
                per_space: self.reservations_per_space,
                duration: self.reservation_duration,
                walk_ins_use_reserved: self.walk_ins_use_reserved,
                eviction: self.eviction,
            },
            pricing: PricingConfig {
                strategy: self.strategy.into(),
                base_rate_per_minute: self.base_rate,
                reservation_fee: self.reservation_fee,
                discount_multiplier: self.discount_multiplier,
                surge_multiplier: self.surge_multiplier,
            },
            wtp,
            driver_mix: DriverMix {
                ev: self.ev_share,
                pmr: self.pmr_share,
            },
            seed: self.seed,
        }
    }
}

/// Logs the headline figures of every finished day
struct LogExporter {
    strategy: PricingStrategy,
}

impl MetricsExporter for LogExporter {
    fn export(&mut self, day: u64, records: &[MetricsRecord]) -> Result<()> {
        let Some(last) = records.last() else {
            return Ok(());
        };
        info!("=== SIMULATION COMPLETE ===");
        info!("Day: {}", day);
        info!("Strategy: {}", self.strategy.label());
        info!("Ticks: {}", last.tick);
        info!("Total arrivals: {}", last.total_arrivals);
        info!("Turned away: {}", last.turned_away);
        info!("Not entered (long queue): {}", last.not_entered_long_queue);
        info!("Price turnaways: {}", last.price_turnaways);
        info!("Balked: {}", last.balked);
        info!("Parked: {}", last.parked_count);
        info!("Cars inside: {}", last.cars_inside);
        info!(
            "Occupied spaces: {}/{}",
            last.occupied_spaces,
            last.occupied_spaces + last.free_spaces
        );
        info!("Average queue time: {:.2}", last.avg_queue_time);
        info!("Total revenue: {:.2}", last.total_revenue);
        if self.strategy == PricingStrategy::Reservations {
            info!("Reservations scheduled: {}", last.reservations_scheduled);
            info!("Reservations fulfilled: {}", last.reservations_fulfilled);
            info!("Reservations released: {}", last.reservations_released);
            info!("Evictions: {}", last.evictions);
        }
        Ok(())
    }
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,parking_sim=info"),
    )
    .init();

    let cli = Cli::parse();
    if let Err(e) = run_headless(&cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Run the simulation in headless mode (no graphics)
fn run_headless(cli: &Cli) -> Result<()> {
    let config = cli.to_config();
    let strategy = config.pricing.strategy;
    let day_length = config.day_length;

    let mut world = if cli.any_bay_fallback {
        SimWorld::with_priority(config, Box::new(AnyBayFallback))?
    } else {
        SimWorld::with_priority(config, Box::new(DedicatedBaysFirst))?
    };
    world.set_exporter(Box::new(LogExporter { strategy }));

    info!(
        "Running {} day(s) of {} ticks with {} spaces ({})",
        cli.days,
        day_length,
        world.spaces().total(),
        strategy.label()
    );

    for _ in 0..cli.days {
        for _ in 0..day_length {
            world.tick();
        }
        if cli.show_map {
            world.print_summary();
            world.draw_map();
            println!();
        }
    }

    Ok(())
}
