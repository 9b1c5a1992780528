//! Main simulation world that ties everything together
//!
//! This is the entry point for running the parking simulation headlessly.
//! One call to [`SimWorld::tick`] advances the clock by one minute and runs,
//! in order: due reservations, the arrival trial, every driver once in a
//! freshly shuffled order, and the metrics snapshot.

use anyhow::{ensure, Context, Result};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rand::SeedableRng;
use std::collections::BTreeMap;

use super::arrivals::{self, Admission, ArrivalProfile, WtpSampler};
use super::config::{EvictionPolicy, ParkingConfig};
use super::driver::{DriverUpdateResult, FacilityContext, SimDriver};
use super::layout::FacilityLayout;
use super::metrics::{Counters, MetricsExporter, MetricsRecord};
use super::occupancy::OccupancyIndex;
use super::pricing::PricingEngine;
use super::reservation::ReservationCalendar;
use super::snapshot::{DriverView, SpaceView, WorldSnapshot};
use super::space::{AllocationPriority, DedicatedBaysFirst, SpaceManager};
use super::types::{
    Cell, DriverClass, DriverId, DriverState, ReservationId, SimId, SpaceCategory, SpaceId,
};

/// The main simulation world
pub struct SimWorld {
    config: ParkingConfig,
    layout: FacilityLayout,
    spaces: SpaceManager,
    occupancy: OccupancyIndex,
    reservations: ReservationCalendar,
    pricing: PricingEngine,
    profile: ArrivalProfile,
    wtp: WtpSampler,

    /// Live drivers. Ordered so the activation shuffle is reproducible.
    drivers: BTreeMap<DriverId, SimDriver>,

    pub counters: Counters,

    /// Every metrics record of the run, one per tick
    history: Vec<MetricsRecord>,
    /// Index into `history` where the current day starts
    day_start: usize,
    exporter: Option<Box<dyn MetricsExporter>>,

    /// Bays taking part in the reservation calendar
    reservable: Vec<SpaceId>,

    /// Ticks elapsed. The first tick is 1.
    tick: u64,
    last_arrival_prob: f64,
    next_id: usize,
    rng: StdRng,
}

impl SimWorld {
    /// Build a facility with the default allocation priority
    pub fn new(config: ParkingConfig) -> Result<Self> {
        Self::with_priority(config, Box::new(DedicatedBaysFirst))
    }

    pub fn with_priority(
        config: ParkingConfig,
        priority: Box<dyn AllocationPriority>,
    ) -> Result<Self> {
        config.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut next_id = 0usize;
        let mut alloc = || {
            let id = SimId(next_id);
            next_id += 1;
            id
        };
        let layout = FacilityLayout::build(&config, &mut alloc)?;
        let mut spaces = SpaceManager::new(
            &layout.bays,
            || SpaceId(alloc()),
            priority,
            config.reservations.walk_ins_use_reserved,
        );

        let mut counters = Counters::new();
        let mut reservations = ReservationCalendar::new();
        let mut reservable = Vec::new();
        if config.reservations_enabled() {
            let count = (config.reservations.fraction * spaces.total() as f64).round() as usize;
            reservable = spaces.mark_reserved(count);
            let scheduled = reservations.schedule_day(
                &reservable,
                0,
                config.day_length,
                &config.reservations,
                &mut rng,
            );
            counters.total_reservations += scheduled as u64;
        }

        let wtp = WtpSampler::new(config.wtp)?;
        let profile = ArrivalProfile::new(config.arrival_intensity, config.day_length);
        let pricing = PricingEngine::new(config.pricing);

        Ok(Self {
            config,
            layout,
            spaces,
            occupancy: OccupancyIndex::new(),
            reservations,
            pricing,
            profile,
            wtp,
            drivers: BTreeMap::new(),
            counters,
            history: Vec::new(),
            day_start: 0,
            exporter: None,
            reservable,
            tick: 0,
            last_arrival_prob: 0.0,
            next_id,
            rng,
        })
    }

    /// Hand every completed day of metrics to `exporter`
    pub fn set_exporter(&mut self, exporter: Box<dyn MetricsExporter>) {
        self.exporter = Some(exporter);
    }

    fn next_sim_id(&mut self) -> SimId {
        let id = SimId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn layout(&self) -> &FacilityLayout {
        &self.layout
    }

    pub fn spaces(&self) -> &SpaceManager {
        &self.spaces
    }

    pub fn occupancy(&self) -> &OccupancyIndex {
        &self.occupancy
    }

    pub fn reservations(&self) -> &ReservationCalendar {
        &self.reservations
    }

    pub fn drivers(&self) -> impl Iterator<Item = &SimDriver> {
        self.drivers.values()
    }

    pub fn driver(&self, id: DriverId) -> Option<&SimDriver> {
        self.drivers.get(&id)
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn history(&self) -> &[MetricsRecord] {
        &self.history
    }

    /// Drivers currently standing in the gate queue
    pub fn cars_waiting_for_gate(&self) -> usize {
        self.drivers.values().filter(|d| d.waiting_for_gate).count()
    }

    /// Put an already admitted ordinary driver at the entrance. It is placed
    /// on the grid at its first activation.
    pub fn spawn_driver(&mut self, class: DriverClass, dwell: u64) -> Result<DriverId> {
        ensure!(
            !class.is_vip(),
            "reservation holders are only created by the reservation calendar"
        );
        let id = DriverId(self.next_sim_id());
        let rate = self.pricing.current_rate();
        let driver = SimDriver::new(id, class, dwell, self.tick, rate, rate);
        self.drivers.insert(id, driver);
        Ok(id)
    }

    /// Book `space_id` for a holder showing up at `trigger_tick`. The bay
    /// becomes reservable if it was not already.
    pub fn add_reservation(
        &mut self,
        space_id: SpaceId,
        trigger_tick: u64,
        duration: Option<u64>,
    ) -> Result<ReservationId> {
        ensure!(
            self.config.reservations_enabled(),
            "reservations require the reservation pricing strategy"
        );
        ensure!(
            trigger_tick > self.tick,
            "reservation trigger tick {} is not in the future (now {})",
            trigger_tick,
            self.tick
        );
        self.spaces.set_reservable(space_id)?;
        if !self.reservable.contains(&space_id) {
            self.reservable.push(space_id);
        }
        let id = self.reservations.add(space_id, trigger_tick, duration);
        self.counters.total_reservations += 1;
        Ok(id)
    }

    /// Main simulation tick
    pub fn tick(&mut self) {
        self.tick += 1;

        let day_length = self.config.day_length;
        if self.tick > 1 && (self.tick - 1) % day_length == 0 {
            self.schedule_day((self.tick - 1) / day_length);
        }

        self.process_reservations();
        self.maybe_arrive();
        self.update_drivers();
        self.record_metrics();

        if self.tick % day_length == 0 {
            self.end_of_day();
        }
    }

    fn schedule_day(&mut self, day: u64) {
        if !self.config.reservations_enabled() {
            return;
        }
        let scheduled = self.reservations.schedule_day(
            &self.reservable,
            day,
            self.config.day_length,
            &self.config.reservations,
            &mut self.rng,
        );
        self.counters.total_reservations += scheduled as u64;
    }

    /// Fire the reservations due this tick and release expired holds.
    /// Calling it again within the same tick changes nothing.
    pub fn process_reservations(&mut self) {
        if !self.config.reservations_enabled() {
            return;
        }

        for reservation_id in self.reservations.due(self.tick) {
            if let Err(e) = self.fire_reservation(reservation_id) {
                warn!("Reservation {:?} could not be handled: {:#}", reservation_id, e);
            }
        }

        for space_id in self.spaces.release_expired_holds(self.tick) {
            self.counters.total_reservations_released += 1;
            let released = self.reservations.mark_released(space_id, self.tick);
            debug!(
                "Tick {}: hold on {:?} released ({:?})",
                self.tick, space_id, released
            );
        }
    }

    fn fire_reservation(&mut self, reservation_id: ReservationId) -> Result<()> {
        let reservation = self
            .reservations
            .get(reservation_id)
            .context("Reservation not found")?
            .clone();

        let no_show = self
            .rng
            .random_bool(self.config.reservations.no_show_prob);
        if !self.reservations.mark_handled(reservation_id, no_show) {
            return Ok(());
        }

        if no_show {
            let until = self.tick + self.config.reservations.hold_time;
            self.spaces.place_hold(reservation.space_id, until)?;
            debug!(
                "Tick {}: no-show for {:?}, {:?} held until {}",
                self.tick, reservation_id, reservation.space_id, until
            );
            return Ok(());
        }

        let dwell = match reservation.duration {
            Some(duration) => duration,
            None => arrivals::sample_dwell(&mut self.rng),
        };
        let id = DriverId(self.next_sim_id());
        let driver = SimDriver::new_reserved(
            id,
            reservation_id,
            dwell,
            self.tick,
            self.pricing.current_rate(),
        );
        self.drivers.insert(id, driver);
        self.apply_eviction(reservation.space_id, id)?;
        debug!(
            "Tick {}: reservation {:?} fired, holder {:?} heading for {:?}",
            self.tick, reservation_id, id, reservation.space_id
        );
        Ok(())
    }

    /// Make room on a reserved bay for its arriving holder, then commit the
    /// holder to the bay if nobody else still claims it
    fn apply_eviction(&mut self, space_id: SpaceId, holder: DriverId) -> Result<()> {
        let space = self
            .spaces
            .get(space_id)
            .context("Reserved space not found")?;
        let (occupant, claimant) = (space.occupant_id, space.claimed_by);
        if let Some(occupant) = occupant {
            self.evict_occupant(space_id, occupant)?;
        } else if let Some(claimant) = claimant {
            self.redirect_claimant(space_id, claimant)?;
        }

        let unclaimed = self
            .spaces
            .get(space_id)
            .is_some_and(|s| s.claimed_by.is_none());
        if unclaimed {
            self.spaces.claim(space_id, holder)?;
            if let Some(driver) = self.drivers.get_mut(&holder) {
                driver.target_space_id = Some(space_id);
            }
        }
        Ok(())
    }

    fn evict_occupant(&mut self, space_id: SpaceId, occupant: DriverId) -> Result<()> {
        let ordinary = self
            .drivers
            .get(&occupant)
            .is_some_and(|d| !d.class.is_vip());
        if !ordinary {
            return Ok(());
        }

        match self.config.reservations.eviction {
            EvictionPolicy::Disabled => {}
            EvictionPolicy::Immediate => {
                self.spaces.evict(space_id)?;
                if let Some(driver) = self.drivers.get_mut(&occupant) {
                    driver.remaining = 0;
                    driver.current_space_id = None;
                    driver.target_space_id = None;
                    driver.state = DriverState::Exiting;
                }
                self.counters.total_evictions += 1;
                debug!(
                    "Tick {}: {:?} evicted from {:?}",
                    self.tick, occupant, space_id
                );
            }
            EvictionPolicy::GracePeriod(grace) => {
                if let Some(driver) = self.drivers.get_mut(&occupant) {
                    if driver.remaining > grace {
                        driver.remaining = grace;
                        self.counters.total_evictions += 1;
                        debug!(
                            "Tick {}: {:?} must leave {:?} within {} ticks",
                            self.tick, occupant, space_id, grace
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// A walk-in still driving to the reserved bay gives it up. It is sent
    /// to another bay it can still reach on its route, or out of the
    /// facility when there is none.
    fn redirect_claimant(&mut self, space_id: SpaceId, claimant: DriverId) -> Result<()> {
        if self.config.reservations.eviction == EvictionPolicy::Disabled {
            return Ok(());
        }
        let Some(driver) = self.drivers.get_mut(&claimant) else {
            return Ok(());
        };
        if driver.class.is_vip() || driver.state != DriverState::DrivingToSpot {
            return Ok(());
        }
        let pos = driver
            .position
            .context("Driver heading for a bay is not on the grid")?;

        self.spaces.vacate(space_id, claimant)?;

        // Left of the bays any lane can be reached; on a lane only bays ahead
        let layout = &self.layout;
        let reachable = |cell: Cell| {
            pos.x < layout.parking_start_x
                || (pos.y == layout.lane_for_bay(cell) && cell.x >= pos.x)
        };
        let spare = self
            .spaces
            .best_space_where(driver.class, |s| s.id != space_id && reachable(s.cell));

        match spare {
            Some(spare) => {
                self.spaces.claim(spare, claimant)?;
                let cell = self.spaces.get(spare).context("Space not found")?.cell;
                driver.target_space_id = Some(spare);
                driver.lane_y = Some(layout.lane_for_bay(cell));
                debug!(
                    "Tick {}: {:?} sent from reserved {:?} to {:?}",
                    self.tick, claimant, space_id, spare
                );
            }
            None => {
                driver.target_space_id = None;
                driver.state = DriverState::Exiting;
                debug!(
                    "Tick {}: {:?} turned out before reaching reserved {:?}",
                    self.tick, claimant, space_id
                );
            }
        }
        self.counters.total_evictions += 1;
        Ok(())
    }

    /// One Bernoulli arrival trial followed by admission control
    fn maybe_arrive(&mut self) {
        let probability = self.profile.probability_at(self.tick);
        self.last_arrival_prob = probability;
        if !self.rng.random_bool(probability) {
            return;
        }

        self.counters.record_arrival();
        let wtp = self.wtp.sample(&mut self.rng);
        let rate = self
            .pricing
            .update(self.spaces.occupied_count(), self.spaces.total());
        let queue_len = self.cars_waiting_for_gate();

        match arrivals::admit(wtp, rate, queue_len, &self.config, &mut self.rng) {
            Admission::PriceTurnaway { .. } => self.counters.record_price_turnaway(),
            Admission::LongQueue { .. } => self.counters.record_long_queue_refusal(),
            Admission::Admit { wtp, rate } => {
                let class = arrivals::sample_class(&self.config.driver_mix, &mut self.rng);
                let dwell = arrivals::sample_dwell(&mut self.rng);
                let id = DriverId(self.next_sim_id());
                let driver = SimDriver::new(id, class, dwell, self.tick, wtp, rate);
                self.drivers.insert(id, driver);
            }
        }
    }

    /// Activate every live driver once, in a random order
    fn update_drivers(&mut self) {
        let mut driver_ids: Vec<DriverId> = self.drivers.keys().copied().collect();
        driver_ids.shuffle(&mut self.rng);

        for driver_id in driver_ids {
            let Some(mut driver) = self.drivers.remove(&driver_id) else {
                continue;
            };

            let result = {
                let mut ctx = FacilityContext {
                    tick: self.tick,
                    config: &self.config,
                    layout: &self.layout,
                    spaces: &mut self.spaces,
                    occupancy: &mut self.occupancy,
                    reservations: &mut self.reservations,
                    pricing: &self.pricing,
                    counters: &mut self.counters,
                    rng: &mut self.rng,
                };
                driver.update(&mut ctx)
            };

            match result {
                Ok(DriverUpdateResult::Continue) => {
                    self.drivers.insert(driver_id, driver);
                }
                Ok(DriverUpdateResult::Despawn) => self.despawn(&driver),
                Err(e) => {
                    warn!(
                        "Tick {}: driver {:?} in {} failed to update, removing it: {:#}",
                        self.tick,
                        driver_id,
                        driver.state.label(),
                        e
                    );
                    if driver.is_inside() {
                        self.counters.record_exit();
                    }
                    self.despawn(&driver);
                }
            }
        }
    }

    fn despawn(&mut self, driver: &SimDriver) {
        self.occupancy.remove(driver.id);
        self.spaces.forget_driver(driver.id);
    }

    fn record_metrics(&mut self) {
        let c = &self.counters;
        let record = MetricsRecord {
            tick: self.tick,
            occupied_spaces: self.spaces.occupied_count(),
            free_spaces: self.spaces.free_count(),
            num_drivers: self.drivers.len(),
            cars_inside: c.cars_inside,
            parked_count: c.parked_count,
            cars_waiting_at_gate: self.cars_waiting_for_gate(),
            total_arrivals: c.total_arrivals,
            turned_away: c.total_turned_away,
            not_entered_long_queue: c.total_not_entered_long_queue,
            price_turnaways: c.total_price_turnaways,
            balked: c.total_balked,
            total_queue_time: c.total_queue_time,
            total_queued_drivers: c.total_queued_drivers,
            avg_queue_time: c.average_queue_time(),
            arrival_prob: self.last_arrival_prob,
            current_rate: self.pricing.current_rate(),
            total_revenue: c.total_revenue,
            reservations_scheduled: c.total_reservations,
            reservations_fulfilled: c.total_reservations_fulfilled,
            reservations_released: c.total_reservations_released,
            reserved_idle_spaces: self.spaces.reserved_idle_count(),
            evictions: c.total_evictions,
        };
        self.history.push(record);
    }

    fn end_of_day(&mut self) {
        let day = self.tick / self.config.day_length;
        let records = &self.history[self.day_start..];
        if let Some(exporter) = &mut self.exporter {
            if let Err(e) = exporter.export(day, records) {
                warn!("Export of day {} failed: {:#}", day, e);
            }
        }
        debug!("Day {} complete after tick {}", day, self.tick);
        self.day_start = self.history.len();
    }

    /// Read-only view for renderers
    pub fn snapshot(&self) -> WorldSnapshot {
        let spaces = self
            .spaces
            .spaces()
            .iter()
            .map(|s| SpaceView {
                id: s.id,
                cell: s.cell,
                category: s.category,
                occupied: s.occupied,
                occupant: s.occupant_id,
                is_reserved: s.is_reserved,
                held: s.held,
                held_until: s.held_until,
            })
            .collect();

        let drivers = self
            .drivers
            .values()
            .map(|d| DriverView {
                id: d.id,
                class: d.class,
                state: d.state,
                cell: d.position,
                target_space: d.target_space_id,
                current_space: d.current_space_id,
                waiting_for_gate: d.waiting_for_gate,
                remaining: d.remaining,
            })
            .collect();

        WorldSnapshot {
            tick: self.tick,
            width: self.layout.width,
            height: self.layout.height,
            gates: self.layout.gates(),
            spaces,
            drivers,
        }
    }

    /// Print a summary of the simulation state
    pub fn print_summary(&self) {
        let c = &self.counters;
        println!("=== Parking Simulation Summary ===");
        println!(
            "Tick: {} (day {})",
            self.tick,
            self.tick / self.config.day_length + 1
        );
        println!("Strategy: {}", self.config.pricing.strategy.label());
        println!(
            "Spaces: {} occupied / {} total, rate {:.3}/min",
            self.spaces.occupied_count(),
            self.spaces.total(),
            self.pricing.current_rate()
        );
        println!(
            "Drivers: {} live, {} inside, {} waiting at gate",
            self.drivers.len(),
            c.cars_inside,
            self.cars_waiting_for_gate()
        );
        println!("{}", c.summary());
        println!(
            "Turned away: {:.1}% (long queue={}, price={}, balked={})",
            c.turn_away_rate() * 100.0,
            c.total_not_entered_long_queue,
            c.total_price_turnaways,
            c.total_balked
        );
        if self.config.reservations_enabled() {
            println!(
                "Reservations: scheduled={}, fulfilled={}, released={}, evictions={}",
                c.total_reservations,
                c.total_reservations_fulfilled,
                c.total_reservations_released,
                c.total_evictions
            );
        }

        if !self.drivers.is_empty() {
            println!("--- Active Drivers ---");
            for driver in self.drivers.values() {
                println!(
                    "  Driver {}: {:?} {} at {:?}, remaining={}",
                    driver.id.0 .0,
                    driver.class,
                    driver.state.label(),
                    driver.position.map(|p| (p.x, p.y)),
                    driver.remaining
                );
            }
        }
    }

    /// Draw an ASCII map of the facility
    pub fn draw_map(&self) {
        let width = self.layout.width.max(0) as usize;
        let height = self.layout.height.max(0) as usize;
        let mut grid = vec![vec![' '; width]; height];

        let mut put = |cell: Cell, ch: char| {
            if self.layout.contains(cell) {
                grid[cell.y as usize][cell.x as usize] = ch;
            }
        };

        for x in 0..self.layout.width {
            put(Cell::new(x, self.layout.road_y), '=');
        }
        for &lane in &self.layout.belt_lanes {
            for x in self.layout.checkpoint_gate.cell.x..=self.layout.exit_gate.cell.x {
                put(Cell::new(x, lane), '-');
            }
        }
        for space in self.spaces.spaces() {
            let ch = if space.occupied {
                'P'
            } else if space.held {
                'h'
            } else if space.is_reserved {
                'r'
            } else {
                match space.category {
                    SpaceCategory::General => '.',
                    SpaceCategory::Ev => 'e',
                    SpaceCategory::Pmr => 'a',
                }
            };
            put(space.cell, ch);
        }
        put(self.layout.entry_gate.cell, 'E');
        put(self.layout.checkpoint_gate.cell, 'C');
        put(self.layout.exit_gate.cell, 'X');

        for driver in self.drivers.values() {
            if driver.state == DriverState::Parked {
                continue;
            }
            if let Some(cell) = driver.position {
                put(cell, if driver.class.is_vip() { 'V' } else { 'c' });
            }
        }

        println!("+{}+", "-".repeat(width));
        for row in grid {
            println!("|{}|", row.into_iter().collect::<String>());
        }
        println!("+{}+", "-".repeat(width));
        println!("Legend: E entry, C checkpoint, X exit, . free, r reservable, h held");
        println!("        P parked, c driver, V reservation holder");
    }
}
