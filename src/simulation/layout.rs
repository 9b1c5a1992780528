//! Facility geometry
//!
//! The lot is a single main road row with an entry gate at the left edge, a
//! checkpoint gate where drivers are admitted, belts of bays to the right of
//! the checkpoint and an exit gate in the rightmost column.
//!
//! ```text
//!  entry   checkpoint      bays         exit
//!    E . . . . C . . [ B B B B ] . . .  X     <- road row
//! ```
//!
//! Each belt is a travel lane with one row of bays above and one below.

use anyhow::{ensure, Result};

use super::config::ParkingConfig;
use super::types::{
    Cell, Gate, GateId, GateKind, SimId, SpaceCategory, BELT_OFFSETS, CHECKPOINT_TO_PARKING,
    LAYOUT_OVERHEAD_COLUMNS, PARKING_TO_EXIT,
};

/// A bay to be created, in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BayPlan {
    pub cell: Cell,
    pub category: SpaceCategory,
}

/// Static geometry of the facility
#[derive(Debug, Clone)]
pub struct FacilityLayout {
    pub width: i32,
    pub height: i32,
    /// Row of the main road
    pub road_y: i32,
    pub entry_gate: Gate,
    /// Second entry gate where admission is decided
    pub checkpoint_gate: Gate,
    pub exit_gate: Gate,
    pub parking_start_x: i32,
    pub parking_end_x: i32,
    /// Centre (lane) rows of the belts that fit in the grid
    pub belt_lanes: Vec<i32>,
    pub bays: Vec<BayPlan>,
}

impl FacilityLayout {
    /// Lay out the facility for the given configuration.
    ///
    /// Gate ids are taken from `next_id` so they share the id space with
    /// everything else in the world.
    pub fn build(config: &ParkingConfig, mut next_id: impl FnMut() -> SimId) -> Result<Self> {
        let width = config.width;
        let height = config.height;
        let n_spaces = config.n_spaces as i32;
        let road_y = height / 2;

        let checkpoint_x = width - (n_spaces + LAYOUT_OVERHEAD_COLUMNS);
        ensure!(
            checkpoint_x >= 0,
            "grid width {width} too small for {n_spaces} spaces"
        );
        let parking_start_x = checkpoint_x + CHECKPOINT_TO_PARKING;
        let parking_end_x = parking_start_x + n_spaces - 1;
        let exit_x = parking_end_x + PARKING_TO_EXIT;

        let entry_gate = Gate {
            id: GateId(next_id()),
            cell: Cell::new(0, road_y),
            kind: GateKind::Entry,
        };
        let checkpoint_gate = Gate {
            id: GateId(next_id()),
            cell: Cell::new(checkpoint_x, road_y),
            kind: GateKind::Entry,
        };
        let exit_gate = Gate {
            id: GateId(next_id()),
            cell: Cell::new(exit_x, road_y),
            kind: GateKind::Exit,
        };

        let in_grid = |y: i32| (0..height).contains(&y);

        let mut belt_lanes = Vec::new();
        let mut bay_rows = Vec::new();
        for offset in BELT_OFFSETS {
            let lane = road_y + offset;
            if !in_grid(lane) {
                continue;
            }
            let rows: Vec<i32> = [lane - 1, lane + 1].into_iter().filter(|y| in_grid(*y)).collect();
            if rows.is_empty() {
                continue;
            }
            belt_lanes.push(lane);
            bay_rows.extend(rows);
        }

        let cells: Vec<Cell> = bay_rows
            .iter()
            .flat_map(|&y| (0..n_spaces).map(move |i| Cell::new(parking_start_x + i, y)))
            .collect();
        ensure!(!cells.is_empty(), "no bay row fits in a grid of height {height}");

        let bays = assign_categories(&cells, road_y, config.n_pmr_spaces, config.n_ev_spaces);

        Ok(Self {
            width,
            height,
            road_y,
            entry_gate,
            checkpoint_gate,
            exit_gate,
            parking_start_x,
            parking_end_x,
            belt_lanes,
            bays,
        })
    }

    pub fn gates(&self) -> [Gate; 3] {
        [self.entry_gate, self.checkpoint_gate, self.exit_gate]
    }

    pub fn contains(&self, cell: Cell) -> bool {
        (0..self.width).contains(&cell.x) && (0..self.height).contains(&cell.y)
    }

    /// Lane a driver heading for `bay` should travel on.
    /// Falls back to the road row when the bay is not next to any belt lane.
    pub fn lane_for_bay(&self, bay: Cell) -> i32 {
        self.belt_lanes
            .iter()
            .copied()
            .find(|lane| (bay.y - lane).abs() == 1)
            .unwrap_or(self.road_y)
    }
}

/// Accessible bays go nearest the entry, then EV bays, the rest are general.
fn assign_categories(cells: &[Cell], road_y: i32, n_pmr: usize, n_ev: usize) -> Vec<BayPlan> {
    let pmr = n_pmr.min(cells.len());
    let ev = n_ev.min(cells.len() - pmr);

    let mut order: Vec<usize> = (0..cells.len()).collect();
    order.sort_by_key(|&i| (cells[i].x, (cells[i].y - road_y).abs(), i));

    let mut categories = vec![SpaceCategory::General; cells.len()];
    for (rank, &i) in order.iter().enumerate() {
        if rank < pmr {
            categories[i] = SpaceCategory::Pmr;
        } else if rank < pmr + ev {
            categories[i] = SpaceCategory::Ev;
        }
    }

    cells
        .iter()
        .zip(categories)
        .map(|(&cell, category)| BayPlan { cell, category })
        .collect()
}
