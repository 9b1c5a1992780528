//! Arrival process and admission control
//!
//! Once per tick a Bernoulli trial decides whether somebody shows up. The
//! probability follows a step profile over the simulated day. A prospective
//! driver then compares the posted rate with its willingness to pay and
//! looks at the queue before deciding to join.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, LogNormal};

use super::config::{DriverMix, ParkingConfig, WtpModel};
use super::types::DriverClass;

/// Day-fraction breakpoints and the base arrival probability up to each one
const ARRIVAL_PROFILE: [(f64, f64); 7] = [
    (0.15, 0.10),
    (0.25, 0.20),
    (0.40, 0.50),
    (0.55, 0.70),
    (0.70, 0.40),
    (0.85, 0.20),
    (1.00, 0.10),
];

/// Extra long-queue refusal probability per queued driver
pub const REFUSAL_PER_QUEUED_DRIVER: f64 = 0.01;

/// Time-of-day step profile scaled by a global intensity
#[derive(Debug, Clone, Copy)]
pub struct ArrivalProfile {
    pub intensity: f64,
    pub day_length: u64,
}

impl ArrivalProfile {
    pub fn new(intensity: f64, day_length: u64) -> Self {
        Self {
            intensity,
            day_length,
        }
    }

    /// Base profile value (before scaling) at a fraction of the day
    pub fn base_at_fraction(fraction: f64) -> f64 {
        ARRIVAL_PROFILE
            .iter()
            .find(|(until, _)| fraction < *until)
            .map(|(_, base)| *base)
            .unwrap_or(ARRIVAL_PROFILE[ARRIVAL_PROFILE.len() - 1].1)
    }

    /// Arrival probability for `tick`, repeating every day
    pub fn probability_at(&self, tick: u64) -> f64 {
        let tau = tick % self.day_length.max(1);
        let fraction = tau as f64 / self.day_length.max(1) as f64;
        (self.intensity * Self::base_at_fraction(fraction)).clamp(0.0, 1.0)
    }
}

/// Draws willingness to pay for prospective drivers
#[derive(Debug, Clone)]
pub enum WtpSampler {
    Uniform { min: f64, max: f64 },
    LogNormal(LogNormal<f64>),
}

impl WtpSampler {
    pub fn new(model: WtpModel) -> Result<Self> {
        Ok(match model {
            WtpModel::Uniform { min, max } => WtpSampler::Uniform { min, max },
            WtpModel::LogNormal { mu, sigma } => WtpSampler::LogNormal(
                LogNormal::new(mu, sigma).context("Invalid willingness-to-pay distribution")?,
            ),
        })
    }

    pub fn sample(&self, rng: &mut StdRng) -> f64 {
        match self {
            WtpSampler::Uniform { min, max } => rng.random_range(*min..*max),
            WtpSampler::LogNormal(distr) => distr.sample(rng),
        }
    }
}

/// Stay length in ticks (one tick is one minute), drawn from a mixture of
/// short errands, normal visits and long stays.
pub fn sample_dwell(rng: &mut StdRng) -> u64 {
    let u: f64 = rng.random();
    if u < 0.15 {
        rng.random_range(15..=45)
    } else if u < 0.75 {
        rng.random_range(60..=150)
    } else {
        rng.random_range(240..=540)
    }
}

/// Class of an ordinary arrival
pub fn sample_class(mix: &DriverMix, rng: &mut StdRng) -> DriverClass {
    let u: f64 = rng.random();
    if u < mix.ev {
        DriverClass::Ev
    } else if u < mix.ev + mix.pmr {
        DriverClass::Pmr
    } else {
        DriverClass::General
    }
}

/// Outcome of an arrival attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Joins the facility at the agreed rate
    Admit { wtp: f64, rate: f64 },
    /// Posted rate is above what the driver is willing to pay
    PriceTurnaway { wtp: f64, rate: f64 },
    /// Saw a long queue and did not join
    LongQueue { queue_len: usize },
}

/// Decide whether a prospective driver with willingness `wtp` joins.
///
/// `rate` must already reflect the current occupancy.
pub fn admit(
    wtp: f64,
    rate: f64,
    queue_len: usize,
    config: &ParkingConfig,
    rng: &mut StdRng,
) -> Admission {
    if rate > wtp {
        return Admission::PriceTurnaway { wtp, rate };
    }

    if queue_len >= config.max_queue_length {
        let refusal = (config.p_not_enter_long_queue
            + queue_len as f64 * REFUSAL_PER_QUEUED_DRIVER)
            .clamp(0.0, 1.0);
        if rng.random_bool(refusal) {
            return Admission::LongQueue { queue_len };
        }
    }

    Admission::Admit { wtp, rate }
}
