//! Standalone intersection simulation module
//!
//! This module contains the physics-and-safety engine: the road network,
//! the safety policy, cars and the world that ticks them. It has no
//! rendering dependencies and can be driven from the console.

mod car;
mod decision;
mod guard;
mod intersection;
mod layout;
mod policy;
mod road_network;
mod signal;
mod spawner;
mod types;
mod world;

// Re-export public types for external use
pub use car::{Car, CarSnapshot, CarState, MlPayload, Waypoints, DEFAULT_SPEED_LIMIT_KMH};
pub use decision::{Decision, DecisionKind, DecisionOracle, FailOpen};
pub use guard::{min_pair_distance, resolve_overlaps, GuardContext};
pub use intersection::{IntersectionNode, SemaphoreState};
pub use layout::default_network;
pub use policy::{
    approach_ramp_kmh, braking_distance_m, danger_score, pair_safe_distance_m, SafetyPolicy,
};
pub use road_network::{RoadNetwork, RoadSegment};
pub use signal::VirtualSignal;
pub use spawner::{emergency_quota, spawn_cars};
pub use types::{
    kmh_to_mps, Arm, Axis, CarId, IntersectionId, LightColor, LightPhase, Maneuver,
    Position, Role, Sign, SimId, INTERSECTION_SEPARATION, ROAD_HALF_WIDTH, TERMINAL_ARM_LENGTH,
};
pub use world::{World, WorldStats};
