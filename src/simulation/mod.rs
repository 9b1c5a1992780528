//! Parking facility simulation
//!
//! This module contains all of the facility model: layout, spaces, drivers,
//! pricing, reservations and the tick driver. It has no rendering
//! dependency and can be exercised entirely from tests or the console.

mod arrivals;
mod config;
mod driver;
mod layout;
mod metrics;
mod navigation;
mod occupancy;
mod pricing;
mod reservation;
mod snapshot;
mod space;
mod types;
mod world;

// Re-export public types for external use
// These may not be used within this crate but are part of the public API
#[allow(unused_imports)]
pub use arrivals::{
    admit, sample_class, sample_dwell, Admission, ArrivalProfile, WtpSampler,
    REFUSAL_PER_QUEUED_DRIVER,
};
#[allow(unused_imports)]
pub use config::{
    DriverMix, EvictionPolicy, ParkingConfig, PricingConfig, PricingStrategy, ReservationConfig,
    WtpModel, BASE_RATE_PER_MINUTE, DISCOUNT_MULTIPLIER, RESERVATION_CHANGEOVER_TICKS,
    RESERVATION_FEE, SURGE_MULTIPLIER,
};
#[allow(unused_imports)]
pub use driver::{DriverUpdateResult, FacilityContext, SimDriver};
#[allow(unused_imports)]
pub use layout::{BayPlan, FacilityLayout};
#[allow(unused_imports)]
pub use metrics::{Counters, MemoryExporter, MetricsExporter, MetricsRecord};
#[allow(unused_imports)]
pub use navigation::{can_enter, next_step_to_checkpoint, next_step_to_exit, next_step_to_spot};
#[allow(unused_imports)]
pub use occupancy::OccupancyIndex;
#[allow(unused_imports)]
pub use pricing::{PricingEngine, RateTier, DISCOUNT_BELOW, SURGE_ABOVE};
#[allow(unused_imports)]
pub use reservation::{Reservation, ReservationCalendar};
#[allow(unused_imports)]
pub use snapshot::{DriverView, SpaceView, WorldSnapshot};
#[allow(unused_imports)]
pub use space::{AllocationPriority, AnyBayFallback, DedicatedBaysFirst, ParkingSpace, SpaceManager};
#[allow(unused_imports)]
pub use types::{
    Cell, DriverClass, DriverId, DriverState, Gate, GateId, GateKind, ReservationId, SimId,
    SpaceCategory, SpaceId, BELT_OFFSETS, CHECKPOINT_TO_PARKING, LAYOUT_OVERHEAD_COLUMNS,
    PARKING_TO_EXIT,
};
pub use world::SimWorld;
