//! Driver automaton
//!
//! ```text
//! ARRIVING -> APPROACHING_GATE -> (WAITING_AT_GATE) -> DRIVING_TO_SPOT
//!          -> PARKED -> EXITING -> EXITED
//! WAITING_AT_GATE -> BALKING
//! ```
//!
//! Each activation runs one step of the automaton to completion. Everything
//! a driver touches besides itself is reached through [`FacilityContext`].

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::Rng;

use super::config::ParkingConfig;
use super::layout::FacilityLayout;
use super::metrics::Counters;
use super::navigation;
use super::occupancy::OccupancyIndex;
use super::pricing::PricingEngine;
use super::reservation::ReservationCalendar;
use super::space::SpaceManager;
use super::types::{Cell, DriverClass, DriverId, DriverState, ReservationId, SpaceId};

/// Result of a driver update indicating what action should be taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverUpdateResult {
    Continue,
    /// Remove the driver from the grid and the active set
    Despawn,
}

/// Shared facility state a driver may read and mutate during its turn
pub struct FacilityContext<'a> {
    pub tick: u64,
    pub config: &'a ParkingConfig,
    pub layout: &'a FacilityLayout,
    pub spaces: &'a mut SpaceManager,
    pub occupancy: &'a mut OccupancyIndex,
    pub reservations: &'a mut ReservationCalendar,
    pub pricing: &'a PricingEngine,
    pub counters: &'a mut Counters,
    pub rng: &'a mut StdRng,
}

/// A driver in the parking simulation
#[derive(Debug, Clone)]
pub struct SimDriver {
    pub id: DriverId,
    pub class: DriverClass,
    pub state: DriverState,
    /// `None` before placement and after leaving the grid
    pub position: Option<Cell>,
    /// Bay this driver is committed to for the current visit
    pub target_space_id: Option<SpaceId>,
    /// Bay this driver is parked on
    pub current_space_id: Option<SpaceId>,
    pub lane_y: Option<i32>,
    pub dwell: u64,
    pub remaining: u64,
    pub arrival_tick: u64,
    /// Set only while queueing
    pub queue_entry_tick: Option<u64>,
    pub wtp: f64,
    pub agreed_rate: f64,
    pub balked: bool,
    /// Currently standing in the gate queue
    pub waiting_for_gate: bool,
    pub reservation: Option<ReservationId>,
}

impl SimDriver {
    pub fn new(
        id: DriverId,
        class: DriverClass,
        dwell: u64,
        arrival_tick: u64,
        wtp: f64,
        agreed_rate: f64,
    ) -> Self {
        Self {
            id,
            class,
            state: DriverState::Arriving,
            position: None,
            target_space_id: None,
            current_space_id: None,
            lane_y: None,
            dwell,
            remaining: dwell,
            arrival_tick,
            queue_entry_tick: None,
            wtp,
            agreed_rate,
            balked: false,
            waiting_for_gate: false,
            reservation: None,
        }
    }

    /// A reservation holder bound to `reservation`
    pub fn new_reserved(
        id: DriverId,
        reservation: ReservationId,
        dwell: u64,
        arrival_tick: u64,
        agreed_rate: f64,
    ) -> Self {
        let mut driver = Self::new(
            id,
            DriverClass::Vip,
            dwell,
            arrival_tick,
            agreed_rate,
            agreed_rate,
        );
        driver.reservation = Some(reservation);
        driver
    }

    /// Past the checkpoint and not yet out of the exit
    pub fn is_inside(&self) -> bool {
        matches!(
            self.state,
            DriverState::DrivingToSpot | DriverState::Parked | DriverState::Exiting
        )
    }

    /// Run one activation
    pub fn update(&mut self, ctx: &mut FacilityContext) -> Result<DriverUpdateResult> {
        match self.state {
            DriverState::Arriving => {
                let entry = ctx.layout.entry_gate.cell;
                ctx.occupancy.place(self.id, entry);
                self.position = Some(entry);
                self.state = DriverState::ApproachingGate;
            }
            DriverState::ApproachingGate => self.approach_gate(ctx)?,
            DriverState::WaitingAtGate => self.wait_at_gate(ctx)?,
            DriverState::DrivingToSpot => self.drive_to_spot(ctx)?,
            DriverState::Parked => {
                self.remaining = self.remaining.saturating_sub(1);
                if self.remaining == 0 {
                    self.state = DriverState::Exiting;
                }
            }
            DriverState::Exiting => self.drive_to_exit(ctx)?,
            DriverState::Exited | DriverState::Balking => return Ok(DriverUpdateResult::Despawn),
        }
        Ok(DriverUpdateResult::Continue)
    }

    fn current_cell(&self) -> Result<Cell> {
        self.position.context("Driver is not on the grid")
    }

    fn approach_gate(&mut self, ctx: &mut FacilityContext) -> Result<()> {
        let pos = self.current_cell()?;
        if pos == ctx.layout.checkpoint_gate.cell {
            if !self.try_commit(ctx)? {
                self.waiting_for_gate = true;
                self.start_queueing(ctx.tick);
                self.state = DriverState::WaitingAtGate;
            }
            return Ok(());
        }

        if self.step_towards_checkpoint(ctx, pos)? {
            self.waiting_for_gate = false;
        } else {
            self.waiting_for_gate = true;
            self.start_queueing(ctx.tick);
            self.state = DriverState::WaitingAtGate;
        }
        Ok(())
    }

    fn wait_at_gate(&mut self, ctx: &mut FacilityContext) -> Result<()> {
        let pos = self.current_cell()?;
        if pos == ctx.layout.checkpoint_gate.cell {
            if ctx.config.gate_balking && self.should_balk(ctx) {
                self.balk(ctx);
                return Ok(());
            }
            if self.try_commit(ctx)? {
                self.stop_queueing(ctx.tick, true, ctx.counters);
            } else {
                self.waiting_for_gate = true;
            }
            return Ok(());
        }

        if self.should_balk(ctx) {
            self.balk(ctx);
            return Ok(());
        }

        if self.step_towards_checkpoint(ctx, pos)? {
            self.waiting_for_gate = false;
        } else {
            self.waiting_for_gate = true;
            self.start_queueing(ctx.tick);
        }
        Ok(())
    }

    fn step_towards_checkpoint(&mut self, ctx: &mut FacilityContext, pos: Cell) -> Result<bool> {
        let next = navigation::next_step_to_checkpoint(pos, ctx.layout);
        self.try_move(ctx, pos, next, None)
    }

    /// Admission at the checkpoint. On success the driver is committed to a
    /// bay and heads for it.
    fn try_commit(&mut self, ctx: &mut FacilityContext) -> Result<bool> {
        let space_id = if self.class.is_vip() {
            let reservation = self
                .reservation
                .context("Reservation holder without a reservation")?;
            let space_id = ctx
                .reservations
                .get(reservation)
                .context("Reservation not found")?
                .space_id;
            let bay = ctx.spaces.get(space_id).context("Reserved space not found")?.cell;
            let available = ctx.spaces.reserved_space_available_for(space_id, self.id)
                && !ctx.occupancy.has_other_driver(bay, self.id);
            if !available {
                return Ok(false);
            }
            space_id
        } else {
            if ctx.spaces.free_capacity_for(self.class) == 0 {
                return Ok(false);
            }
            ctx.spaces
                .best_space_for(self.class)
                .context("Free capacity reported but no space found")?
        };

        if let Some(committed) = self.target_space_id {
            if committed != space_id {
                bail!("Driver already committed to {:?}", committed);
            }
        }
        ctx.spaces.claim(space_id, self.id)?;
        self.target_space_id = Some(space_id);

        let bay = ctx.spaces.get(space_id).context("Space not found")?.cell;
        self.lane_y = Some(ctx.layout.lane_for_bay(bay));
        ctx.counters.record_entry();
        self.waiting_for_gate = false;
        self.state = DriverState::DrivingToSpot;
        Ok(true)
    }

    fn drive_to_spot(&mut self, ctx: &mut FacilityContext) -> Result<()> {
        let space_id = self.target_space_id.context("Driving without a target space")?;
        let bay = ctx.spaces.get(space_id).context("Target space not found")?.cell;
        let pos = self.current_cell()?;

        if pos != bay {
            let lane_y = self.lane_y.unwrap_or(ctx.layout.road_y);
            let next = navigation::next_step_to_spot(pos, bay, lane_y, ctx.layout);
            self.try_move(ctx, pos, next, Some(bay))?;
        }

        if self.position == Some(bay) {
            let free = ctx.spaces.get(space_id).is_some_and(|s| !s.occupied);
            if free {
                self.park(ctx, space_id)?;
            }
        }
        Ok(())
    }

    fn park(&mut self, ctx: &mut FacilityContext, space_id: SpaceId) -> Result<()> {
        ctx.spaces.occupy(space_id, self.id)?;
        self.current_space_id = Some(space_id);
        self.state = DriverState::Parked;

        let leave_by = match self.reservation {
            Some(reservation) => {
                ctx.reservations
                    .get(reservation)
                    .context("Reservation not found")?
                    .leave_by
            }
            None => None,
        };
        if let Some(leave_by) = leave_by {
            // the next booking of this bay starts soon after `leave_by`
            self.dwell = self.dwell.min(leave_by.saturating_sub(ctx.tick).max(1));
            self.remaining = self.dwell;
        }

        let revenue = ctx
            .pricing
            .charge(self.dwell, self.agreed_rate, self.reservation.is_some());
        ctx.counters.record_parked(revenue);

        if let Some(reservation) = self.reservation {
            if ctx.reservations.mark_fulfilled(reservation) {
                ctx.counters.total_reservations_fulfilled += 1;
            }
        }
        Ok(())
    }

    fn drive_to_exit(&mut self, ctx: &mut FacilityContext) -> Result<()> {
        let exit = ctx.layout.exit_gate.cell;
        let pos = self.current_cell()?;
        if pos == exit {
            self.finish_exit(ctx);
            return Ok(());
        }

        let lane_y = self.lane_y.unwrap_or(ctx.layout.road_y);
        let next = navigation::next_step_to_exit(pos, lane_y, ctx.layout);
        let moved = self.try_move(ctx, pos, next, None)?;

        if moved {
            if let Some(space_id) = self.current_space_id {
                let bay = ctx.spaces.get(space_id).context("Parked space not found")?.cell;
                if pos == bay {
                    ctx.spaces.vacate(space_id, self.id)?;
                    self.current_space_id = None;
                    self.target_space_id = None;
                }
            }
        }

        if self.position == Some(exit) {
            self.finish_exit(ctx);
        }
        Ok(())
    }

    fn finish_exit(&mut self, ctx: &mut FacilityContext) {
        self.state = DriverState::Exited;
        ctx.counters.record_exit();
    }

    fn try_move(
        &mut self,
        ctx: &mut FacilityContext,
        from: Cell,
        to: Cell,
        target_bay: Option<Cell>,
    ) -> Result<bool> {
        let moved = navigation::try_move(
            self.id,
            self.state,
            target_bay,
            from,
            to,
            ctx.layout,
            ctx.spaces,
            ctx.occupancy,
        )?;
        if moved {
            self.position = Some(to);
        }
        Ok(moved)
    }

    fn should_balk(&self, ctx: &mut FacilityContext) -> bool {
        let Some(entered) = self.queue_entry_tick else {
            return false;
        };
        let waited = ctx.tick.saturating_sub(entered);
        waited >= ctx.config.max_wait_time && ctx.rng.random_bool(ctx.config.balk_probability)
    }

    /// Leave the queue and the grid. Removed on the next activation.
    fn balk(&mut self, ctx: &mut FacilityContext) {
        self.balked = true;
        self.stop_queueing(ctx.tick, false, ctx.counters);
        ctx.counters.record_balk();
        self.waiting_for_gate = false;
        self.state = DriverState::Balking;
        ctx.occupancy.remove(self.id);
        self.position = None;
    }

    fn start_queueing(&mut self, tick: u64) {
        if self.queue_entry_tick.is_none() {
            self.queue_entry_tick = Some(tick);
        }
    }

    fn stop_queueing(&mut self, tick: u64, entered: bool, counters: &mut Counters) {
        if let Some(entered_at) = self.queue_entry_tick.take() {
            counters.record_queue_time(tick.saturating_sub(entered_at), entered);
        }
    }
}
