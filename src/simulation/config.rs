//! Run parameters for the parking facility
//!
//! Every tunable of a run lives in [`ParkingConfig`]. Construction of a
//! [`SimWorld`](super::SimWorld) validates it and refuses to start on bad input.

use anyhow::{ensure, Result};

use super::types::LAYOUT_OVERHEAD_COLUMNS;

/// Base parking rate in euros per minute
pub const BASE_RATE_PER_MINUTE: f64 = 0.022;
/// Flat fee charged on top of the stay for reservation holders
pub const RESERVATION_FEE: f64 = 5.0;
/// Rate multiplier applied while the facility is mostly empty
pub const DISCOUNT_MULTIPLIER: f64 = 0.5;
/// Rate multiplier applied while the facility is nearly full
pub const SURGE_MULTIPLIER: f64 = 2.0;
/// Ticks between a reservation holder's latest departure and the next
/// booking of the same bay
pub const RESERVATION_CHANGEOVER_TICKS: u64 = 5;

/// How the facility prices and books its spaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PricingStrategy {
    /// Flat base rate, no reservations
    #[default]
    Standard,
    /// Occupancy-tiered rate
    Dynamic,
    /// Flat base rate plus the reservation calendar
    Reservations,
}

impl PricingStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            PricingStrategy::Standard => "Standard",
            PricingStrategy::Dynamic => "Dynamic Pricing",
            PricingStrategy::Reservations => "Reservations",
        }
    }
}

/// What happens to an ordinary occupant when a reservation for its space fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// The reservation holder waits until the occupant leaves on its own
    Disabled,
    /// The occupant is forced out on the trigger tick
    #[default]
    Immediate,
    /// The occupant may stay at most this many more ticks
    GracePeriod(u64),
}

/// Distribution of a driver's willingness to pay, in euros per minute
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WtpModel {
    /// Uniform on `[min, max)`
    Uniform { min: f64, max: f64 },
    /// Log-normal with the given parameters of the underlying normal
    LogNormal { mu: f64, sigma: f64 },
}

impl Default for WtpModel {
    fn default() -> Self {
        WtpModel::Uniform {
            min: 0.01,
            max: 0.05,
        }
    }
}

/// Share of each driver class among ordinary arrivals. The remainder is General.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverMix {
    pub ev: f64,
    pub pmr: f64,
}

impl Default for DriverMix {
    fn default() -> Self {
        Self { ev: 0.15, pmr: 0.05 }
    }
}

/// Rate card used by the pricing engine and for revenue accounting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingConfig {
    pub strategy: PricingStrategy,
    pub base_rate_per_minute: f64,
    pub reservation_fee: f64,
    pub discount_multiplier: f64,
    pub surge_multiplier: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            strategy: PricingStrategy::Standard,
            base_rate_per_minute: BASE_RATE_PER_MINUTE,
            reservation_fee: RESERVATION_FEE,
            discount_multiplier: DISCOUNT_MULTIPLIER,
            surge_multiplier: SURGE_MULTIPLIER,
        }
    }
}

/// Reservation calendar parameters. Only used by [`PricingStrategy::Reservations`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReservationConfig {
    /// Fraction of spaces (0..=1) marked as reservable
    pub fraction: f64,
    /// Ticks a space stays on hold after a no-show
    pub hold_time: u64,
    /// Probability that a reservation holder does not turn up
    pub no_show_prob: f64,
    /// Non-overlapping windows scheduled per reservable space each day
    pub per_space: u32,
    /// Fixed stay for reservation holders; sampled like walk-ins when `None`
    pub duration: Option<u64>,
    /// Let walk-in drivers use reservable spaces that are not on hold
    pub walk_ins_use_reserved: bool,
    pub eviction: EvictionPolicy,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            fraction: 0.20,
            hold_time: 30,
            no_show_prob: 0.1,
            per_space: 1,
            duration: None,
            walk_ins_use_reserved: false,
            eviction: EvictionPolicy::Immediate,
        }
    }
}

/// Full set of parameters for one run
#[derive(Debug, Clone, PartialEq)]
pub struct ParkingConfig {
    pub width: i32,
    pub height: i32,
    /// Parking columns, i.e. spaces per bay row
    pub n_spaces: usize,
    pub n_ev_spaces: usize,
    pub n_pmr_spaces: usize,

    /// Scale applied to the time-of-day arrival profile
    pub arrival_intensity: f64,
    /// Queue length at which arrivals start refusing to join
    pub max_queue_length: usize,
    /// Base refusal probability once the queue is at its ceiling
    pub p_not_enter_long_queue: f64,
    /// Ticks a queued driver waits before it may balk
    pub max_wait_time: u64,
    /// Per-tick balk probability once eligible
    pub balk_probability: f64,
    /// Let the driver at the checkpoint balk too
    pub gate_balking: bool,

    pub day_length: u64,
    pub reservations: ReservationConfig,
    pub pricing: PricingConfig,
    pub wtp: WtpModel,
    pub driver_mix: DriverMix,

    /// Fixed seed for reproducible runs; OS entropy when `None`
    pub seed: Option<u64>,
}

impl Default for ParkingConfig {
    fn default() -> Self {
        Self {
            width: 50,
            height: 20,
            n_spaces: 16,
            n_ev_spaces: 0,
            n_pmr_spaces: 0,
            arrival_intensity: 0.7,
            max_queue_length: 10,
            p_not_enter_long_queue: 0.80,
            max_wait_time: 15,
            balk_probability: 0.10,
            gate_balking: false,
            day_length: 1000,
            reservations: ReservationConfig::default(),
            pricing: PricingConfig::default(),
            wtp: WtpModel::default(),
            driver_mix: DriverMix::default(),
            seed: None,
        }
    }
}

fn ensure_probability(name: &str, value: f64) -> Result<()> {
    ensure!(
        (0.0..=1.0).contains(&value),
        "{name} must be within [0, 1], got {value}"
    );
    Ok(())
}

impl ParkingConfig {
    /// Reservations are only scheduled under the reservation strategy
    pub fn reservations_enabled(&self) -> bool {
        self.pricing.strategy == PricingStrategy::Reservations
    }

    /// Check that the parameters describe a facility that can be built
    pub fn validate(&self) -> Result<()> {
        ensure!(self.n_spaces > 0, "at least one parking column is required");
        let min_width = self.n_spaces as i64 + LAYOUT_OVERHEAD_COLUMNS as i64;
        ensure!(
            self.width as i64 >= min_width,
            "grid width {} too small for {} spaces; need at least {}",
            self.width,
            self.n_spaces,
            min_width
        );
        ensure!(
            self.height >= 2,
            "grid height {} too small; need at least 2 rows",
            self.height
        );
        ensure!(self.day_length > 0, "day length must be positive");
        ensure!(
            self.arrival_intensity >= 0.0 && self.arrival_intensity.is_finite(),
            "arrival intensity must be a non-negative number, got {}",
            self.arrival_intensity
        );

        ensure_probability("long-queue refusal probability", self.p_not_enter_long_queue)?;
        ensure_probability("balk probability", self.balk_probability)?;
        ensure_probability("reservation fraction", self.reservations.fraction)?;
        ensure_probability("no-show probability", self.reservations.no_show_prob)?;
        ensure_probability("EV share", self.driver_mix.ev)?;
        ensure_probability("PMR share", self.driver_mix.pmr)?;
        ensure!(
            self.driver_mix.ev + self.driver_mix.pmr <= 1.0,
            "EV and PMR shares add up to more than 1"
        );
        ensure!(
            self.reservations.per_space > 0,
            "reservations per space must be positive"
        );
        if self.reservations_enabled() {
            let per_space = u64::from(self.reservations.per_space);
            ensure!(
                per_space <= self.day_length,
                "{} reservations per space do not fit in a day of {} ticks",
                per_space,
                self.day_length
            );
            let slot = self.day_length / per_space;
            let needed = self.reservations.duration.unwrap_or(1)
                + self.reservations.hold_time
                + RESERVATION_CHANGEOVER_TICKS;
            ensure!(
                needed < slot,
                "reservation slot of {} ticks too short for {} ticks of stay, hold and changeover",
                slot,
                needed
            );
        }

        match self.wtp {
            WtpModel::Uniform { min, max } => ensure!(
                min.is_finite() && max.is_finite() && min < max,
                "willingness-to-pay range [{min}, {max}) is empty"
            ),
            WtpModel::LogNormal { mu, sigma } => ensure!(
                mu.is_finite() && sigma.is_finite() && sigma >= 0.0,
                "invalid log-normal willingness-to-pay parameters mu={mu}, sigma={sigma}"
            ),
        }

        let pricing = &self.pricing;
        ensure!(
            pricing.base_rate_per_minute >= 0.0
                && pricing.reservation_fee >= 0.0
                && pricing.discount_multiplier >= 0.0
                && pricing.surge_multiplier >= 0.0,
            "rates, fees and multipliers must be non-negative"
        );

        Ok(())
    }
}
