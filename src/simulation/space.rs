//! Parking-space resource manager
//!
//! Owns every bay of the facility and decides who may use which one. A bay
//! moves between free, claimed (some driver committed to it at the gate),
//! occupied (that driver is parked on it) and held (a no-show reservation
//! keeps it out of the pool until the hold expires).

use anyhow::{bail, Context, Result};
use std::collections::HashMap;

use super::layout::BayPlan;
use super::types::{Cell, DriverClass, DriverId, SpaceCategory, SpaceId};

/// Ordered list of bay categories a driver class accepts, best first.
pub trait AllocationPriority: std::fmt::Debug {
    fn acceptable(&self, class: DriverClass) -> &'static [SpaceCategory];
}

/// Dedicated bays are kept for their own class; EV and PMR drivers fall back
/// to general bays, general drivers never take dedicated bays.
#[derive(Debug, Clone, Copy, Default)]
pub struct DedicatedBaysFirst;

impl AllocationPriority for DedicatedBaysFirst {
    fn acceptable(&self, class: DriverClass) -> &'static [SpaceCategory] {
        match class {
            DriverClass::General => &[SpaceCategory::General],
            DriverClass::Ev => &[SpaceCategory::Ev, SpaceCategory::General],
            DriverClass::Pmr => &[SpaceCategory::Pmr, SpaceCategory::General],
            DriverClass::Vip => &[],
        }
    }
}

/// Every class may end up on any bay, its own category first.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyBayFallback;

impl AllocationPriority for AnyBayFallback {
    fn acceptable(&self, class: DriverClass) -> &'static [SpaceCategory] {
        match class {
            DriverClass::General => &[
                SpaceCategory::General,
                SpaceCategory::Ev,
                SpaceCategory::Pmr,
            ],
            DriverClass::Ev => &[
                SpaceCategory::Ev,
                SpaceCategory::General,
                SpaceCategory::Pmr,
            ],
            DriverClass::Pmr => &[
                SpaceCategory::Pmr,
                SpaceCategory::General,
                SpaceCategory::Ev,
            ],
            DriverClass::Vip => &[],
        }
    }
}

/// A single bay
#[derive(Debug, Clone)]
pub struct ParkingSpace {
    pub id: SpaceId,
    pub cell: Cell,
    pub category: SpaceCategory,
    pub occupied: bool,
    pub occupant_id: Option<DriverId>,
    /// Reservable bay. Never cleared once set.
    pub is_reserved: bool,
    pub held: bool,
    pub held_until: Option<u64>,
    /// Live driver committed to this bay
    pub claimed_by: Option<DriverId>,
}

impl ParkingSpace {
    fn new(id: SpaceId, plan: BayPlan) -> Self {
        Self {
            id,
            cell: plan.cell,
            category: plan.category,
            occupied: false,
            occupant_id: None,
            is_reserved: false,
            held: false,
            held_until: None,
            claimed_by: None,
        }
    }
}

#[derive(Debug)]
pub struct SpaceManager {
    spaces: Vec<ParkingSpace>,
    index_by_id: HashMap<SpaceId, usize>,
    index_by_cell: HashMap<Cell, usize>,
    priority: Box<dyn AllocationPriority>,
    walk_ins_use_reserved: bool,
}

impl SpaceManager {
    /// Create one bay per plan entry, ids assigned in plan order
    pub fn new(
        plans: &[BayPlan],
        mut next_id: impl FnMut() -> SpaceId,
        priority: Box<dyn AllocationPriority>,
        walk_ins_use_reserved: bool,
    ) -> Self {
        let spaces: Vec<ParkingSpace> = plans
            .iter()
            .map(|plan| ParkingSpace::new(next_id(), *plan))
            .collect();
        let index_by_id = spaces.iter().enumerate().map(|(i, s)| (s.id, i)).collect();
        let index_by_cell = spaces.iter().enumerate().map(|(i, s)| (s.cell, i)).collect();

        Self {
            spaces,
            index_by_id,
            index_by_cell,
            priority,
            walk_ins_use_reserved,
        }
    }

    pub fn spaces(&self) -> &[ParkingSpace] {
        &self.spaces
    }

    pub fn get(&self, space_id: SpaceId) -> Option<&ParkingSpace> {
        self.index_by_id.get(&space_id).map(|&i| &self.spaces[i])
    }

    fn get_mut(&mut self, space_id: SpaceId) -> Result<&mut ParkingSpace> {
        let index = *self
            .index_by_id
            .get(&space_id)
            .context("Parking space not found")?;
        Ok(&mut self.spaces[index])
    }

    pub fn space_at(&self, cell: Cell) -> Option<&ParkingSpace> {
        self.index_by_cell.get(&cell).map(|&i| &self.spaces[i])
    }

    pub fn is_parking_cell(&self, cell: Cell) -> bool {
        self.index_by_cell.contains_key(&cell)
    }

    pub fn total(&self) -> usize {
        self.spaces.len()
    }

    pub fn occupied_count(&self) -> usize {
        self.spaces.iter().filter(|s| s.occupied).count()
    }

    pub fn free_count(&self) -> usize {
        self.total() - self.occupied_count()
    }

    /// Reservable bays standing empty and not on hold
    pub fn reserved_idle_count(&self) -> usize {
        self.spaces
            .iter()
            .filter(|s| s.is_reserved && !s.occupied && !s.held)
            .count()
    }

    fn open_to_walk_ins(&self, space: &ParkingSpace) -> bool {
        !space.occupied
            && space.claimed_by.is_none()
            && !space.held
            && (!space.is_reserved || self.walk_ins_use_reserved)
    }

    /// Bays any ordinary driver could be given right now, regardless of class
    pub fn free_unreserved_capacity(&self) -> usize {
        self.spaces
            .iter()
            .filter(|s| self.open_to_walk_ins(s))
            .count()
    }

    /// Bays a driver of `class` could be given right now
    pub fn free_capacity_for(&self, class: DriverClass) -> usize {
        let acceptable = self.priority.acceptable(class);
        self.spaces
            .iter()
            .filter(|s| acceptable.contains(&s.category) && self.open_to_walk_ins(s))
            .count()
    }

    /// Nearest eligible bay in the first acceptable category that has one
    pub fn best_space_for(&self, class: DriverClass) -> Option<SpaceId> {
        self.best_space_where(class, |_| true)
    }

    /// Like [`best_space_for`](Self::best_space_for), among bays passing `filter`
    pub fn best_space_where(
        &self,
        class: DriverClass,
        filter: impl Fn(&ParkingSpace) -> bool,
    ) -> Option<SpaceId> {
        self.priority.acceptable(class).iter().find_map(|category| {
            self.spaces
                .iter()
                .enumerate()
                .filter(|(_, s)| {
                    s.category == *category && self.open_to_walk_ins(s) && filter(s)
                })
                .min_by_key(|(i, s)| (s.cell.x, *i))
                .map(|(_, s)| s.id)
        })
    }

    /// Whether a reservation holder may commit to its booked bay
    pub fn reserved_space_available_for(&self, space_id: SpaceId, driver_id: DriverId) -> bool {
        self.get(space_id).is_some_and(|s| {
            !s.occupied && s.claimed_by.map_or(true, |holder| holder == driver_id)
        })
    }

    /// Commit `driver_id` to a bay. Fails if someone else already holds it.
    pub fn claim(&mut self, space_id: SpaceId, driver_id: DriverId) -> Result<()> {
        let space = self.get_mut(space_id)?;
        match space.claimed_by {
            Some(holder) if holder != driver_id => {
                bail!("Space {:?} already claimed by {:?}", space_id, holder)
            }
            _ => {
                space.claimed_by = Some(driver_id);
                Ok(())
            }
        }
    }

    /// Clear every trace of a driver that is leaving the simulation
    pub fn forget_driver(&mut self, driver_id: DriverId) {
        for space in &mut self.spaces {
            if space.claimed_by == Some(driver_id) {
                space.claimed_by = None;
            }
            if space.occupant_id == Some(driver_id) {
                space.occupied = false;
                space.occupant_id = None;
            }
        }
    }

    /// Mark a claimed bay as occupied by its claimant
    pub fn occupy(&mut self, space_id: SpaceId, driver_id: DriverId) -> Result<()> {
        let space = self.get_mut(space_id)?;
        if space.occupied {
            bail!("Space {:?} is already occupied", space_id);
        }
        if space.claimed_by != Some(driver_id) {
            bail!("Space {:?} is not claimed by {:?}", space_id, driver_id);
        }
        space.occupied = true;
        space.occupant_id = Some(driver_id);
        Ok(())
    }

    /// Free a bay when its occupant drives off it. Also drops the claim.
    pub fn vacate(&mut self, space_id: SpaceId, driver_id: DriverId) -> Result<()> {
        let space = self.get_mut(space_id)?;
        if space.occupant_id == Some(driver_id) {
            space.occupied = false;
            space.occupant_id = None;
        }
        if space.claimed_by == Some(driver_id) {
            space.claimed_by = None;
        }
        Ok(())
    }

    /// Pre-vacate a bay for an incoming reservation holder.
    /// Returns the driver that was parked on it.
    pub fn evict(&mut self, space_id: SpaceId) -> Result<Option<DriverId>> {
        let space = self.get_mut(space_id)?;
        let occupant = space.occupant_id.take();
        space.occupied = false;
        if space.claimed_by.is_some() && space.claimed_by == occupant {
            space.claimed_by = None;
        }
        Ok(occupant)
    }

    /// Mark `count` bays as reservable, leftmost first. Returns their ids.
    pub fn mark_reserved(&mut self, count: usize) -> Vec<SpaceId> {
        let mut order: Vec<usize> = (0..self.spaces.len()).collect();
        order.sort_by_key(|&i| (self.spaces[i].cell.x, self.spaces[i].cell.y));

        order
            .into_iter()
            .take(count)
            .map(|i| {
                let space = &mut self.spaces[i];
                space.is_reserved = true;
                space.held = false;
                space.held_until = None;
                space.id
            })
            .collect()
    }

    pub fn set_reservable(&mut self, space_id: SpaceId) -> Result<()> {
        self.get_mut(space_id)?.is_reserved = true;
        Ok(())
    }

    /// Keep a bay out of the pool until `until`
    pub fn place_hold(&mut self, space_id: SpaceId, until: u64) -> Result<()> {
        let space = self.get_mut(space_id)?;
        space.held = true;
        space.held_until = Some(until);
        Ok(())
    }

    /// Release every hold that has run out by `tick`. Returns the released bays.
    pub fn release_expired_holds(&mut self, tick: u64) -> Vec<SpaceId> {
        self.spaces
            .iter_mut()
            .filter(|s| s.held && s.held_until.is_some_and(|until| tick >= until))
            .map(|s| {
                s.held = false;
                s.held_until = None;
                s.id
            })
            .collect()
    }
}
