//! Core types for the parking simulation
//!
//! These are standalone types shared by every part of the facility model.

/// A unique identifier for simulation entities
/// This is a simple wrapper around a usize for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimId(pub usize);

/// A wrapper type for driver IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DriverId(pub SimId);

/// A wrapper type for parking space IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpaceId(pub SimId);

/// A wrapper type for gate IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GateId(pub SimId);

/// Index into the reservation calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReservationId(pub usize);

/// A cell on the facility grid. `x` grows towards the exit, `y` is the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance, the number of single-cell moves between two cells
    pub fn manhattan(&self, other: &Cell) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// One step from `self` towards `target` along the vertical axis
    pub fn step_vertical(&self, target_y: i32) -> Cell {
        let y = match self.y.cmp(&target_y) {
            std::cmp::Ordering::Less => self.y + 1,
            std::cmp::Ordering::Greater => self.y - 1,
            std::cmp::Ordering::Equal => self.y,
        };
        Cell::new(self.x, y)
    }

    /// One step from `self` towards `target` along the horizontal axis
    pub fn step_horizontal(&self, target_x: i32) -> Cell {
        let x = match self.x.cmp(&target_x) {
            std::cmp::Ordering::Less => self.x + 1,
            std::cmp::Ordering::Greater => self.x - 1,
            std::cmp::Ordering::Equal => self.x,
        };
        Cell::new(x, self.y)
    }
}

/// Kind of driver arriving at the facility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverClass {
    General,
    /// Electric vehicle, prefers charging bays
    Ev,
    /// Reduced mobility, prefers accessible bays
    Pmr,
    /// Holder of a reservation, created by the reservation calendar
    Vip,
}

impl DriverClass {
    pub fn is_vip(&self) -> bool {
        matches!(self, DriverClass::Vip)
    }
}

/// Category painted on a parking space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpaceCategory {
    General,
    Ev,
    Pmr,
}

/// Direction of a gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateKind {
    Entry,
    Exit,
}

/// A gate landmark. Immutable after the layout is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gate {
    pub id: GateId,
    pub cell: Cell,
    pub kind: GateKind,
}

/// Per-driver automaton state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverState {
    Arriving,
    ApproachingGate,
    WaitingAtGate,
    DrivingToSpot,
    Parked,
    Exiting,
    Exited,
    /// Left the queue before entering, removed on its next activation
    Balking,
}

impl DriverState {
    pub fn label(&self) -> &'static str {
        match self {
            DriverState::Arriving => "ARRIVING",
            DriverState::ApproachingGate => "APPROACHING_GATE",
            DriverState::WaitingAtGate => "WAITING_AT_GATE",
            DriverState::DrivingToSpot => "DRIVING_TO_SPOT",
            DriverState::Parked => "PARKED",
            DriverState::Exiting => "EXITING",
            DriverState::Exited => "EXITED",
            DriverState::Balking => "BALKING",
        }
    }
}

/// Row offsets of belt centres relative to the main road row
pub const BELT_OFFSETS: [i32; 5] = [-6, -3, 0, 3, 6];

/// Empty columns between the checkpoint gate and the first parking column, plus one
pub const CHECKPOINT_TO_PARKING: i32 = 3;

/// Columns between the last parking column and the exit gate
pub const PARKING_TO_EXIT: i32 = 3;

/// Horizontal cells the facility needs besides the parking columns
pub const LAYOUT_OVERHEAD_COLUMNS: i32 = 6;
