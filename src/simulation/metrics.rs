//! Aggregate counters and the per-tick metrics series
//!
//! Counters only ever grow (except `cars_inside`, which tracks a level).
//! Once per tick the world folds them, together with a few instantaneous
//! readings, into a [`MetricsRecord`].

use anyhow::Result;
use std::cell::RefCell;
use std::rc::Rc;

/// Cumulative counters for a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Counters {
    /// Arrival attempts, whether or not the driver joined
    pub total_arrivals: u64,
    /// Every driver lost for any reason
    pub total_turned_away: u64,
    /// Saw a long queue and did not join
    pub total_not_entered_long_queue: u64,
    /// Posted rate above willingness to pay
    pub total_price_turnaways: u64,
    /// Joined the queue, then gave up
    pub total_balked: u64,
    /// Ticks spent queueing, summed over drivers
    pub total_queue_time: u64,
    /// Drivers that queued and then got in
    pub total_queued_drivers: u64,
    pub total_revenue: f64,
    /// Drivers past the checkpoint and not yet out
    pub cars_inside: u64,
    pub parked_count: u64,
    pub total_reservations: u64,
    pub total_reservations_fulfilled: u64,
    pub total_reservations_released: u64,
    pub total_evictions: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_arrival(&mut self) {
        self.total_arrivals += 1;
    }

    pub fn record_price_turnaway(&mut self) {
        self.total_turned_away += 1;
        self.total_price_turnaways += 1;
    }

    pub fn record_long_queue_refusal(&mut self) {
        self.total_turned_away += 1;
        self.total_not_entered_long_queue += 1;
    }

    /// A queued driver gave up. Its queue time is closed separately.
    pub fn record_balk(&mut self) {
        self.total_turned_away += 1;
        self.total_balked += 1;
    }

    /// Close a stretch of queueing. Only drivers that got in count as queued.
    pub fn record_queue_time(&mut self, ticks: u64, entered: bool) {
        self.total_queue_time += ticks;
        if entered {
            self.total_queued_drivers += 1;
        }
    }

    pub fn record_entry(&mut self) {
        self.cars_inside += 1;
    }

    pub fn record_exit(&mut self) {
        self.cars_inside = self.cars_inside.saturating_sub(1);
    }

    pub fn record_parked(&mut self, revenue: f64) {
        self.parked_count += 1;
        self.total_revenue += revenue;
    }

    pub fn average_queue_time(&self) -> f64 {
        if self.total_queued_drivers > 0 {
            self.total_queue_time as f64 / self.total_queued_drivers as f64
        } else {
            0.0
        }
    }

    pub fn turn_away_rate(&self) -> f64 {
        if self.total_arrivals > 0 {
            self.total_turned_away as f64 / self.total_arrivals as f64
        } else {
            0.0
        }
    }

    /// Get a summary string for display
    pub fn summary(&self) -> String {
        format!(
            "Arrivals: {} | Turned away: {} | Parked: {} | Avg queue: {:.2} | Revenue: {:.2}",
            self.total_arrivals,
            self.total_turned_away,
            self.parked_count,
            self.average_queue_time(),
            self.total_revenue
        )
    }
}

/// One row of the metrics series
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRecord {
    pub tick: u64,
    pub occupied_spaces: usize,
    pub free_spaces: usize,
    pub num_drivers: usize,
    pub cars_inside: u64,
    pub parked_count: u64,
    pub cars_waiting_at_gate: usize,
    pub total_arrivals: u64,
    pub turned_away: u64,
    pub not_entered_long_queue: u64,
    pub price_turnaways: u64,
    pub balked: u64,
    pub total_queue_time: u64,
    pub total_queued_drivers: u64,
    pub avg_queue_time: f64,
    pub arrival_prob: f64,
    pub current_rate: f64,
    pub total_revenue: f64,
    pub reservations_scheduled: u64,
    pub reservations_fulfilled: u64,
    pub reservations_released: u64,
    pub reserved_idle_spaces: usize,
    pub evictions: u64,
}

/// Receives the metrics series at the end of every simulated day
pub trait MetricsExporter {
    /// `day` is 1-based; `records` holds that day's rows in tick order
    fn export(&mut self, day: u64, records: &[MetricsRecord]) -> Result<()>;
}

/// Keeps exported days in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryExporter {
    pub days: Vec<(u64, Vec<MetricsRecord>)>,
}

impl MetricsExporter for MemoryExporter {
    fn export(&mut self, day: u64, records: &[MetricsRecord]) -> Result<()> {
        self.days.push((day, records.to_vec()));
        Ok(())
    }
}

/// Lets the caller keep a handle on an exporter owned by the world
impl<T: MetricsExporter> MetricsExporter for Rc<RefCell<T>> {
    fn export(&mut self, day: u64, records: &[MetricsRecord]) -> Result<()> {
        self.borrow_mut().export(day, records)
    }
}
