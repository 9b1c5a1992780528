//! Single-cell movement protocol
//!
//! Drivers move one cell per tick. The route is axis-prioritised: onto the
//! belt lane first, along the lane to the bay's column, then into the bay.
//! Leaving reverses it: out to the lane, along it past the last parking
//! column, down (or up) to the road, then along the road to the exit gate.
//!
//! A move is vetoed when the destination is somebody else's bay or already
//! holds another driver. Queues form naturally from vetoed moves.

use anyhow::Result;

use super::layout::FacilityLayout;
use super::occupancy::OccupancyIndex;
use super::space::SpaceManager;
use super::types::{Cell, DriverId, DriverState};

/// Next cell on the road towards the checkpoint gate. Drivers never bypass
/// each other on the approach.
pub fn next_step_to_checkpoint(pos: Cell, layout: &FacilityLayout) -> Cell {
    let checkpoint = layout.checkpoint_gate.cell;
    if pos.y != checkpoint.y {
        pos.step_vertical(checkpoint.y)
    } else {
        pos.step_horizontal(checkpoint.x)
    }
}

/// Next cell towards the committed bay `target` using belt lane `lane_y`
pub fn next_step_to_spot(pos: Cell, target: Cell, lane_y: i32, layout: &FacilityLayout) -> Cell {
    if pos.x <= layout.parking_start_x && pos.y != lane_y {
        // before the parking columns: climb or drop onto the lane
        pos.step_vertical(lane_y)
    } else if pos.y == lane_y && pos.x != target.x {
        pos.step_horizontal(target.x)
    } else if pos.x == target.x && pos.y != target.y {
        pos.step_vertical(target.y)
    } else if pos.x != target.x {
        pos.step_horizontal(target.x)
    } else {
        pos.step_vertical(target.y)
    }
}

/// Next cell towards the exit gate for a driver whose belt lane is `lane_y`
pub fn next_step_to_exit(pos: Cell, lane_y: i32, layout: &FacilityLayout) -> Cell {
    let exit = layout.exit_gate.cell;
    let road_y = layout.road_y;

    if pos.x <= layout.parking_end_x && pos.y != lane_y {
        pos.step_vertical(lane_y)
    } else if pos.x <= layout.parking_end_x {
        Cell::new(pos.x + 1, pos.y)
    } else if pos.y != road_y {
        pos.step_vertical(road_y)
    } else {
        pos.step_horizontal(exit.x)
    }
}

/// Whether `driver_id` may enter `to` this tick
pub fn can_enter(
    driver_id: DriverId,
    state: DriverState,
    target_bay: Option<Cell>,
    to: Cell,
    layout: &FacilityLayout,
    spaces: &SpaceManager,
    occupancy: &OccupancyIndex,
) -> bool {
    if !layout.contains(to) {
        return false;
    }

    if spaces.is_parking_cell(to) {
        let own_bay = state == DriverState::DrivingToSpot && target_bay == Some(to);
        if !own_bay {
            return false;
        }
    }

    !occupancy.has_other_driver(to, driver_id)
}

/// Move the driver if the protocol allows it. Returns whether it moved.
#[allow(clippy::too_many_arguments)]
pub fn try_move(
    driver_id: DriverId,
    state: DriverState,
    target_bay: Option<Cell>,
    from: Cell,
    to: Cell,
    layout: &FacilityLayout,
    spaces: &SpaceManager,
    occupancy: &mut OccupancyIndex,
) -> Result<bool> {
    if from == to || !can_enter(driver_id, state, target_bay, to, layout, spaces, occupancy) {
        return Ok(false);
    }
    occupancy.move_driver(driver_id, to)?;
    Ok(true)
}
