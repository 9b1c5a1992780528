//! Occupancy-driven pricing

use super::config::{PricingConfig, PricingStrategy};

/// Occupancy below this ratio is charged the discounted rate
pub const DISCOUNT_BELOW: f64 = 0.50;
/// Occupancy above this ratio is charged the surge rate
pub const SURGE_ABOVE: f64 = 0.80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateTier {
    Discount,
    Base,
    Surge,
}

impl RateTier {
    /// Tier for an occupancy ratio in `[0, 1]`
    pub fn for_occupancy(occupancy: f64) -> Self {
        if occupancy < DISCOUNT_BELOW {
            RateTier::Discount
        } else if occupancy > SURGE_ABOVE {
            RateTier::Surge
        } else {
            RateTier::Base
        }
    }
}

/// Keeps the per-minute rate currently shown at the entrance
#[derive(Debug, Clone)]
pub struct PricingEngine {
    config: PricingConfig,
    current_rate: f64,
    tier: RateTier,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self {
            config,
            current_rate: config.base_rate_per_minute,
            tier: RateTier::Base,
        }
    }

    pub fn current_rate(&self) -> f64 {
        self.current_rate
    }

    pub fn tier(&self) -> RateTier {
        self.tier
    }

    /// Recompute the rate from the current occupancy.
    /// Only the dynamic strategy moves away from the base rate.
    pub fn update(&mut self, occupied: usize, total: usize) -> f64 {
        let base = self.config.base_rate_per_minute;
        if self.config.strategy != PricingStrategy::Dynamic {
            self.tier = RateTier::Base;
            self.current_rate = base;
            return base;
        }

        let occupancy = if total > 0 {
            occupied as f64 / total as f64
        } else {
            0.0
        };
        self.tier = RateTier::for_occupancy(occupancy);
        self.current_rate = match self.tier {
            RateTier::Discount => base * self.config.discount_multiplier,
            RateTier::Base => base,
            RateTier::Surge => base * self.config.surge_multiplier,
        };
        self.current_rate
    }

    /// Amount charged for a whole stay, booked at `rate`
    pub fn charge(&self, dwell: u64, rate: f64, with_reservation: bool) -> f64 {
        let stay = dwell as f64 * rate;
        if with_reservation {
            stay + self.config.reservation_fee
        } else {
            stay
        }
    }
}
