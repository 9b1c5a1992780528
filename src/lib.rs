//! Parking Facility Simulation Library
//!
//! A tick-based simulation of drivers queueing at a gated parking lot,
//! finding a bay, paying for their stay and leaving. Runs headlessly.

pub mod simulation;
