//! Reservation calendar
//!
//! Reservable bays get non-overlapping booking windows for every simulated
//! day. The tick driver asks the calendar which bookings are due and marks
//! them handled, so a booking fires at most once.

use rand::rngs::StdRng;
use rand::Rng;

use super::config::{ReservationConfig, RESERVATION_CHANGEOVER_TICKS};
use super::types::{ReservationId, SpaceId};

/// A booking of one bay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: ReservationId,
    pub space_id: SpaceId,
    /// Tick at which the holder shows up (or fails to)
    pub trigger_tick: u64,
    pub duration: Option<u64>,
    pub handled: bool,
    /// The holder actually parked
    pub fulfilled: bool,
    pub no_show: bool,
    /// Tick at which the no-show hold expired
    pub released_at: Option<u64>,
    /// Last tick the holder may stay parked, so the bay is clear before the
    /// next booking of it. `None` leaves the stay uncapped.
    pub leave_by: Option<u64>,
}

#[derive(Debug, Default, Clone)]
pub struct ReservationCalendar {
    /// Kept sorted by trigger tick
    reservations: Vec<Reservation>,
}

impl ReservationCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book windows on `spaces` for day `day` (0-based) of `day_length` ticks.
    ///
    /// Each bay gets `config.per_space` windows, one per equal slot of the
    /// day. A window is placed early enough in its slot that a fixed stay or
    /// a no-show hold ends before the next slot starts. Every holder must
    /// leave a few ticks before its slot ends, across day boundaries too.
    pub fn schedule_day(
        &mut self,
        spaces: &[SpaceId],
        day: u64,
        day_length: u64,
        config: &ReservationConfig,
        rng: &mut StdRng,
    ) -> usize {
        let per_space = u64::from(config.per_space.max(1));
        let slot = (day_length / per_space).max(1);
        let gap = config.duration.unwrap_or(0) + config.hold_time + RESERVATION_CHANGEOVER_TICKS;
        let span = (slot - 1).saturating_sub(gap);
        let day_start = day * day_length + 1;

        let mut added = 0;
        for &space_id in spaces {
            for k in 0..per_space {
                let slot_start = day_start + k * slot;
                let slot_end = slot_start + slot - 1;
                let trigger_tick = slot_start + rng.random_range(0..=span);
                let id = ReservationId(self.reservations.len());
                self.reservations.push(Reservation {
                    id,
                    space_id,
                    trigger_tick,
                    duration: config.duration,
                    handled: false,
                    fulfilled: false,
                    no_show: false,
                    released_at: None,
                    leave_by: Some(slot_end.saturating_sub(RESERVATION_CHANGEOVER_TICKS)),
                });
                added += 1;
            }
        }

        self.reservations.sort_by_key(|r| (r.trigger_tick, r.id));
        added
    }

    /// Add a single booking. Used to set up specific scenarios.
    pub fn add(
        &mut self,
        space_id: SpaceId,
        trigger_tick: u64,
        duration: Option<u64>,
    ) -> ReservationId {
        let id = ReservationId(self.reservations.len());
        self.reservations.push(Reservation {
            id,
            space_id,
            trigger_tick,
            duration,
            handled: false,
            fulfilled: false,
            no_show: false,
            released_at: None,
            leave_by: None,
        });
        self.reservations.sort_by_key(|r| (r.trigger_tick, r.id));
        id
    }

    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub fn scheduled_count(&self) -> usize {
        self.reservations.len()
    }

    pub fn get(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    fn get_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Unhandled bookings whose trigger tick is `tick`
    pub fn due(&self, tick: u64) -> Vec<ReservationId> {
        let start = self.reservations.partition_point(|r| r.trigger_tick < tick);
        self.reservations[start..]
            .iter()
            .take_while(|r| r.trigger_tick == tick)
            .filter(|r| !r.handled)
            .map(|r| r.id)
            .collect()
    }

    /// Mark a booking handled. Returns false if it already was.
    pub fn mark_handled(&mut self, id: ReservationId, no_show: bool) -> bool {
        match self.get_mut(id) {
            Some(r) if !r.handled => {
                r.handled = true;
                r.no_show = no_show;
                true
            }
            _ => false,
        }
    }

    /// Mark a booking fulfilled. Returns true only the first time.
    pub fn mark_fulfilled(&mut self, id: ReservationId) -> bool {
        match self.get_mut(id) {
            Some(r) if !r.fulfilled => {
                r.fulfilled = true;
                true
            }
            _ => false,
        }
    }

    /// Record the expiry of the no-show hold on `space_id`
    pub fn mark_released(&mut self, space_id: SpaceId, tick: u64) -> Option<ReservationId> {
        let reservation = self
            .reservations
            .iter_mut()
            .find(|r| r.space_id == space_id && r.no_show && r.released_at.is_none())?;
        reservation.released_at = Some(tick);
        Some(reservation.id)
    }
}
