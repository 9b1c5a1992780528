//! Grid occupancy index
//!
//! Tracks which drivers stand on which cell. No business logic lives here;
//! collision rules are decided by the navigation protocol.

use anyhow::{Context, Result};
use std::collections::HashMap;

use super::types::{Cell, DriverId};

#[derive(Debug, Default, Clone)]
pub struct OccupancyIndex {
    /// Drivers per cell. Only the entry gate cell ever holds more than one.
    cells: HashMap<Cell, Vec<DriverId>>,
    positions: HashMap<DriverId, Cell>,
}

impl OccupancyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a driver on the grid without any collision check
    pub fn place(&mut self, driver_id: DriverId, cell: Cell) {
        if let Some(previous) = self.positions.insert(driver_id, cell) {
            self.detach(driver_id, previous);
        }
        self.cells.entry(cell).or_default().push(driver_id);
    }

    /// Move an already placed driver
    pub fn move_driver(&mut self, driver_id: DriverId, to: Cell) -> Result<()> {
        let from = *self
            .positions
            .get(&driver_id)
            .context("Driver is not on the grid")?;
        if from == to {
            return Ok(());
        }
        self.detach(driver_id, from);
        self.cells.entry(to).or_default().push(driver_id);
        self.positions.insert(driver_id, to);
        Ok(())
    }

    /// Take a driver off the grid. Returns the cell it was on, if any.
    pub fn remove(&mut self, driver_id: DriverId) -> Option<Cell> {
        let cell = self.positions.remove(&driver_id)?;
        self.detach(driver_id, cell);
        Some(cell)
    }

    pub fn position_of(&self, driver_id: DriverId) -> Option<Cell> {
        self.positions.get(&driver_id).copied()
    }

    pub fn drivers_at(&self, cell: Cell) -> &[DriverId] {
        self.cells.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether a driver other than `except` stands on `cell`
    pub fn has_other_driver(&self, cell: Cell, except: DriverId) -> bool {
        self.drivers_at(cell).iter().any(|id| *id != except)
    }

    pub fn driver_count(&self) -> usize {
        self.positions.len()
    }

    /// Cells holding more than one driver
    pub fn shared_cells(&self) -> impl Iterator<Item = (Cell, &[DriverId])> {
        self.cells
            .iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(cell, ids)| (*cell, ids.as_slice()))
    }

    fn detach(&mut self, driver_id: DriverId, cell: Cell) {
        if let Some(ids) = self.cells.get_mut(&cell) {
            ids.retain(|id| *id != driver_id);
            if ids.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }
}
