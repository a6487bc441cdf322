//! Intersection Traffic Simulation Library
//!
//! A deterministic physics-and-safety engine for autonomous cars crossing a
//! network of road intersections. Decisions come from an external oracle;
//! the world turns them into speeds and keeps the cars apart.

pub mod simulation;
