//! Safety policy: tunable physics constants and pure scoring functions
//!
//! The policy is read-only once a world is built. Everything here is a pure
//! function of its arguments so the guard and the scheduler can share it.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use super::car::Car;
use super::types::kmh_to_mps;

/// Tunable constants for geometry, longitudinal control, the safety
/// envelope, signal timing and spawning.
///
/// Speeds are km/h, rates km/h per second, distances metres.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SafetyPolicy {
    // Geometry
    pub lane_offset_m: f64,
    pub stop_line_offset_m: f64,
    /// Cars aim to stop this far before the stop line
    pub stop_line_buffer_m: f64,
    pub pass_threshold_m: f64,
    /// A passed car this far past its centre is parked
    pub exit_distance_m: f64,

    // Longitudinal control
    pub max_accel_kmh_s: f64,
    pub coast_decel_kmh_s: f64,
    pub max_brake_kmh_s: f64,
    /// Deceleration assumed when ramping toward a stop point
    pub comfort_decel_kmh_s: f64,
    pub launch_boost: f64,
    pub launch_speed_kmh: f64,
    pub anti_creep_kmh: f64,
    /// Speed deficit above which the full brake is used
    pub urgent_brake_delta_kmh: f64,

    // Safety envelope
    pub base_collision_radius_m: f64,
    pub reaction_time_s: f64,
    pub horizon_s: f64,
    pub min_pair_distance_m: f64,
    pub max_pair_distance_m: f64,
    pub guard_projection_steps: usize,
    pub conflict_window_s: f64,
    pub guard_hard_margin_m: f64,
    pub stop_line_hold_m: f64,
    pub lane_tolerance_m: f64,
    pub follow_hard_margin_m: f64,

    // Overlap resolver
    pub overlap_hard_radius_m: f64,
    pub overlap_max_passes: usize,
    pub overlap_floor_speed_kmh: f64,

    // Decisions
    pub ml_stop_target_speed_kmh: f64,

    // Priority model
    pub speed_limit_kmh: f64,
    pub wait_speed_kmh: f64,
    pub wait_decay_rate: f64,

    // Signs
    pub stop_wait_s: f64,
    pub yield_wait_s: f64,
    pub stop_speed_eps_kmh: f64,
    pub stop_zone_m: f64,

    // Fixed-cycle semaphores
    pub sem_green_s: f64,
    pub sem_yellow_s: f64,
    pub sem_all_red_s: f64,
    pub sem_stagger_s: f64,

    // Virtual signal scheduler
    pub signal_window_s: f64,
    pub signal_switch_margin: f64,
    pub signal_control_radius_m: f64,
    pub red_soft_speed_kmh: f64,
    pub red_hard_radius_m: f64,

    // Turning
    pub right_turn_radius_m: f64,
    pub left_turn_trigger_m: f64,
    pub turn_waypoints: usize,

    // Spawn envelope
    pub spawn_min_radius_m: f64,
    pub spawn_max_radius_m: f64,
    pub spawn_min_gap_m: f64,
    pub spawn_max_attempts: usize,
    pub cruise_min_kmh: f64,
    pub cruise_max_kmh: f64,
    pub emergency_cruise_kmh: f64,

    // Scenario
    pub max_scenario_s: f64,
    pub max_tracked_neighbors: usize,

    // Feature toggles
    pub collision_guard_enabled: bool,
    pub overlap_resolver_enabled: bool,
    pub semaphores_enabled: bool,
    pub virtual_signal_enabled: bool,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            lane_offset_m: 7.0,
            stop_line_offset_m: 12.0,
            stop_line_buffer_m: 0.8,
            pass_threshold_m: 10.0,
            exit_distance_m: 90.0,

            max_accel_kmh_s: 18.0,
            coast_decel_kmh_s: 60.0,
            max_brake_kmh_s: 90.0,
            comfort_decel_kmh_s: 30.0,
            launch_boost: 2.0,
            launch_speed_kmh: 6.0,
            anti_creep_kmh: 0.8,
            urgent_brake_delta_kmh: 15.0,

            base_collision_radius_m: 2.2,
            reaction_time_s: 0.55,
            horizon_s: 0.65,
            min_pair_distance_m: 4.8,
            max_pair_distance_m: 11.0,
            guard_projection_steps: 4,
            conflict_window_s: 2.5,
            guard_hard_margin_m: 1.5,
            stop_line_hold_m: 3.0,
            lane_tolerance_m: 1.5,
            follow_hard_margin_m: 1.0,

            overlap_hard_radius_m: 4.85,
            overlap_max_passes: 6,
            overlap_floor_speed_kmh: 3.0,

            ml_stop_target_speed_kmh: 0.0,

            speed_limit_kmh: 42.0,
            wait_speed_kmh: 2.0,
            wait_decay_rate: 2.0,

            stop_wait_s: 1.0,
            yield_wait_s: 0.4,
            stop_speed_eps_kmh: 1.0,
            stop_zone_m: 4.0,

            sem_green_s: 8.0,
            sem_yellow_s: 2.5,
            sem_all_red_s: 1.5,
            sem_stagger_s: 3.0,

            signal_window_s: 2.6,
            signal_switch_margin: 0.45,
            signal_control_radius_m: 36.0,
            red_soft_speed_kmh: 8.0,
            red_hard_radius_m: 18.0,

            right_turn_radius_m: 3.0,
            left_turn_trigger_m: 4.0,
            turn_waypoints: 8,

            spawn_min_radius_m: 70.0,
            spawn_max_radius_m: 140.0,
            spawn_min_gap_m: 18.0,
            spawn_max_attempts: 300,
            cruise_min_kmh: 28.0,
            cruise_max_kmh: 42.0,
            emergency_cruise_kmh: 55.0,

            max_scenario_s: 180.0,
            max_tracked_neighbors: 6,

            collision_guard_enabled: true,
            overlap_resolver_enabled: true,
            semaphores_enabled: true,
            virtual_signal_enabled: false,
        }
    }
}

impl SafetyPolicy {
    /// Load a policy from a JSON file; missing keys keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read policy file {}", path.display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("Invalid policy file {}", path.display()))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let policy: SafetyPolicy =
            serde_json::from_str(text).context("Policy JSON does not parse")?;
        policy.validate()?;
        Ok(policy)
    }

    /// Reject combinations that can never be simulated safely
    pub fn validate(&self) -> Result<()> {
        if self.min_pair_distance_m <= 0.0 || self.min_pair_distance_m > self.max_pair_distance_m {
            bail!(
                "min_pair_distance_m ({}) must be positive and not exceed max_pair_distance_m ({})",
                self.min_pair_distance_m,
                self.max_pair_distance_m
            );
        }
        if self.max_brake_kmh_s <= 0.0 || self.max_accel_kmh_s <= 0.0 || self.comfort_decel_kmh_s <= 0.0 {
            bail!("acceleration and braking rates must be positive");
        }
        if self.spawn_min_radius_m > self.spawn_max_radius_m {
            bail!("spawn_min_radius_m exceeds spawn_max_radius_m");
        }
        if self.cruise_min_kmh > self.cruise_max_kmh {
            bail!("cruise_min_kmh exceeds cruise_max_kmh");
        }
        if self.right_turn_radius_m <= 0.0 || self.turn_waypoints == 0 {
            bail!("turn geometry needs a positive radius and at least one waypoint");
        }
        // A right turn must finish before the pass threshold is reached.
        if self.lane_offset_m + self.right_turn_radius_m >= self.stop_line_offset_m {
            bail!("right turn arc starts beyond the stop line");
        }
        Ok(())
    }

    /// Length of one full fixed-cycle (both axes)
    pub fn semaphore_cycle_s(&self) -> f64 {
        2.0 * (self.sem_green_s + self.sem_yellow_s + self.sem_all_red_s)
    }

    /// Axial distance at which a right turn begins
    pub fn right_turn_trigger_m(&self) -> f64 {
        self.lane_offset_m + self.right_turn_radius_m + 1.0
    }
}

/// Stopping distance with constant deceleration.
pub fn braking_distance_m(speed_kmh: f64, max_brake_kmh_s: f64) -> f64 {
    let v = kmh_to_mps(speed_kmh);
    let decel_mps2 = (max_brake_kmh_s / 3.6).max(0.1);
    (v * v) / (2.0 * decel_mps2)
}

/// Highest speed (km/h) from which a car can still stop within `distance_m`
/// at `decel_kmh_s`. Zero when the stop point is reached or behind.
pub fn approach_ramp_kmh(distance_m: f64, decel_kmh_s: f64) -> f64 {
    if distance_m <= 0.0 {
        return 0.0;
    }
    let decel_mps2 = (decel_kmh_s / 3.6).max(0.1);
    (2.0 * decel_mps2 * distance_m).sqrt() * 3.6
}

/// Dynamic pair distance based on speed and braking ability.
pub fn pair_safe_distance_m(car_a: &Car, car_b: &Car, policy: &SafetyPolicy) -> f64 {
    let va = kmh_to_mps(car_a.speed);
    let vb = kmh_to_mps(car_b.speed);
    let reaction = (va + vb) * policy.reaction_time_s * 0.5;
    let braking = (braking_distance_m(car_a.speed, policy.max_brake_kmh_s)
        + braking_distance_m(car_b.speed, policy.max_brake_kmh_s))
        * 0.5;
    let base = policy
        .min_pair_distance_m
        .max(policy.base_collision_radius_m * 2.0);
    let safe = base + reaction + 0.35 * braking;
    safe.min(policy.max_pair_distance_m)
        .max(policy.min_pair_distance_m)
}

/// Higher score means the car should receive right of way first.
pub fn danger_score(car: &Car, policy: &SafetyPolicy) -> f64 {
    let speed = car.speed.max(0.0);
    let speed_limit = car.speed_limit_kmh.max(1.0);
    let speed_factor = (speed / speed_limit).min(2.0);
    let overspeed = (speed - speed_limit).max(0.0) / speed_limit;
    let stop_dist = braking_distance_m(speed, policy.max_brake_kmh_s);
    let wait_s = car.wait_seconds.max(0.0);
    car.role.weight()
        + speed_factor
        + 1.2 * overspeed
        + (stop_dist / 35.0).min(2.0)
        + (wait_s / 6.0).min(2.0)
}
