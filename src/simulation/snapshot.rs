//! Read-only view of the world for renderers and dashboards

use super::types::{Cell, DriverClass, DriverId, DriverState, Gate, SpaceCategory, SpaceId};

#[derive(Debug, Clone, PartialEq)]
pub struct SpaceView {
    pub id: SpaceId,
    pub cell: Cell,
    pub category: SpaceCategory,
    pub occupied: bool,
    pub occupant: Option<DriverId>,
    pub is_reserved: bool,
    pub held: bool,
    pub held_until: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverView {
    pub id: DriverId,
    pub class: DriverClass,
    pub state: DriverState,
    /// `None` before the first activation and after balking
    pub cell: Option<Cell>,
    pub target_space: Option<SpaceId>,
    pub current_space: Option<SpaceId>,
    pub waiting_for_gate: bool,
    pub remaining: u64,
}

/// Positions and states of everything on the grid at the end of a tick
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub width: i32,
    pub height: i32,
    pub gates: [Gate; 3],
    pub spaces: Vec<SpaceView>,
    /// Sorted by driver id
    pub drivers: Vec<DriverView>,
}

impl WorldSnapshot {
    pub fn driver(&self, id: DriverId) -> Option<&DriverView> {
        self.drivers.iter().find(|d| d.id == id)
    }

    pub fn drivers_in_state(&self, state: DriverState) -> usize {
        self.drivers.iter().filter(|d| d.state == state).count()
    }
}
