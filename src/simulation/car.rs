//! Car entity: kinematic state, waypoint-following motion and turn geometry
//!
//! Standalone implementation with no rendering concerns. Positions are in
//! world space; anything intersection-relative takes the centre explicitly.

use serde::Serialize;
use smallvec::SmallVec;

use super::policy::SafetyPolicy;
use super::types::{
    kmh_to_mps, Arm, CarId, IntersectionId, LightColor, Maneuver, Position, Role, Sign,
};

/// Speed limit assumed for a car that was never given one
pub const DEFAULT_SPEED_LIMIT_KMH: f64 = 42.0;

/// Pending turn waypoints, consumed head-first
pub type Waypoints = SmallVec<[Position; 8]>;

/// A car in the traffic simulation
#[derive(Debug, Clone, PartialEq)]
pub struct Car {
    pub id: CarId,
    pub position: Position,
    /// Unit velocity; cardinal except while following turn waypoints
    pub heading: Position,
    /// Current speed in km/h
    pub speed: f64,
    /// Free-flow target speed in km/h
    pub cruise_speed: f64,
    pub speed_limit_kmh: f64,

    /// Intended manoeuvre at the current intersection
    pub maneuver: Maneuver,
    /// Arm the car entered its current intersection from
    pub approach: Arm,
    pub current_intersection: IntersectionId,

    pub role: Role,
    pub priority: bool,

    /// Cleared its last intersection and heading for the network edge
    pub passed: bool,
    /// Parked for the rest of the scenario
    pub stopped: bool,
    pub stop_wait_seconds: f64,
    /// Mandatory STOP/YIELD dwell satisfied at the current intersection
    pub stop_completed: bool,
    pub has_turned: bool,
    /// Time spent nearly stationary, feeds the danger score
    pub wait_seconds: f64,

    pub waypoints: Waypoints,
}

impl Car {
    pub fn new(
        id: CarId,
        position: Position,
        heading: Position,
        speed: f64,
        approach: Arm,
        current_intersection: IntersectionId,
    ) -> Self {
        Self {
            id,
            position,
            heading: heading.normalized().unwrap_or_else(|| approach.entry_heading()),
            speed: speed.max(0.0),
            cruise_speed: speed.max(0.0),
            speed_limit_kmh: DEFAULT_SPEED_LIMIT_KMH,
            maneuver: Maneuver::Forward,
            approach,
            current_intersection,
            role: Role::Civilian,
            priority: false,
            passed: false,
            stopped: false,
            stop_wait_seconds: 0.0,
            stop_completed: false,
            has_turned: false,
            wait_seconds: 0.0,
            waypoints: Waypoints::new(),
        }
    }

    /// Set the role; emergency roles carry priority
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self.priority = role.is_emergency();
        self
    }

    pub fn with_maneuver(mut self, maneuver: Maneuver) -> Self {
        self.maneuver = maneuver;
        self
    }

    pub fn with_cruise_speed(mut self, cruise_speed: f64) -> Self {
        self.cruise_speed = cruise_speed.max(0.0);
        self
    }

    pub fn with_speed_limit(mut self, speed_limit_kmh: f64) -> Self {
        self.speed_limit_kmh = speed_limit_kmh;
        self
    }

    pub fn with_passed(mut self, passed: bool) -> Self {
        self.passed = passed;
        self
    }

    /// True while turn waypoints remain
    pub fn is_turning(&self) -> bool {
        !self.waypoints.is_empty()
    }

    /// Signed distance to `center` along the current heading, positive while
    /// approaching.
    pub fn axial_distance(&self, center: &Position) -> f64 {
        let heading = self.heading.snap_cardinal();
        -self.position.sub(center).dot(&heading)
    }

    /// Signed distance to `center` along the entry direction of the approach
    /// arm. Stays meaningful through a turn, unlike `axial_distance`.
    pub fn approach_distance(&self, center: &Position) -> f64 {
        -self.position.sub(center).dot(&self.approach.entry_heading())
    }

    /// Metres left before the stop line; zero or negative once committed
    pub fn distance_to_stop_line(&self, center: &Position, policy: &SafetyPolicy) -> f64 {
        self.approach_distance(center) - policy.stop_line_offset_m
    }

    /// Offset from the lane centreline perpendicular to the heading
    pub fn lateral_offset(&self, other: &Car) -> f64 {
        other.position.sub(&self.position).cross(&self.heading).abs()
    }

    /// Advance along the heading, or along the waypoint queue while turning.
    ///
    /// Travel left over after reaching a waypoint carries on to the next one
    /// in the same step. The heading snaps to cardinal when the queue empties.
    pub fn advance(&mut self, delta_secs: f64) {
        if self.stopped {
            return;
        }
        let mut remaining = kmh_to_mps(self.speed) * delta_secs.max(0.0);

        while remaining > 0.0 {
            let Some(target) = self.waypoints.first().copied() else {
                self.position = self.position.add(&self.heading.scale(remaining));
                return;
            };

            let to_target = target.sub(&self.position);
            let gap = to_target.length();
            if let Some(direction) = to_target.normalized() {
                self.heading = direction;
            }

            if gap > remaining {
                self.position = self.position.add(&self.heading.scale(remaining));
                return;
            }

            self.position = target;
            remaining -= gap;
            self.waypoints.remove(0);
            if self.waypoints.is_empty() {
                self.heading = self.heading.snap_cardinal();
                self.has_turned = true;
            }
        }
    }

    /// Queue the arc for a LEFT or RIGHT manoeuvre once the car is inside
    /// the trigger zone of `center`. Returns true when waypoints were added.
    ///
    /// Geometry is laid out for a car entering from the west in the
    /// eastbound lane, then rotated onto the actual heading.
    pub fn assign_turn(&mut self, center: &Position, policy: &SafetyPolicy) -> bool {
        if self.maneuver == Maneuver::Forward
            || self.has_turned
            || self.is_turning()
            || self.passed
            || self.stopped
        {
            return false;
        }

        let axial = self.axial_distance(center);
        let trigger = match self.maneuver {
            Maneuver::Right => policy.right_turn_trigger_m(),
            Maneuver::Left => policy.left_turn_trigger_m,
            Maneuver::Forward => return false,
        };
        // Too early, or already through the box
        if axial > trigger || axial < -policy.lane_offset_m {
            return false;
        }

        let heading = self.heading.snap_cardinal();
        let lane = policy.lane_offset_m;
        let count = policy.turn_waypoints.max(1);

        let (arc_center, radius, start_deg, end_deg) = match self.maneuver {
            Maneuver::Right => {
                let r = policy.right_turn_radius_m;
                (Position::new(-lane - r, -lane - r), r, 90.0_f64, 0.0_f64)
            }
            _ => {
                let t = policy.left_turn_trigger_m;
                // Tangent to the entry lane at x = -t and to the exit lane at x = +lane
                (Position::new(-t, t), lane + t, -90.0_f64, 0.0_f64)
            }
        };

        self.waypoints = turn_arc(&arc_center, radius, start_deg, end_deg, count)
            .into_iter()
            .map(|p| center.add(&p.rotated_by(&heading)))
            .collect();
        !self.waypoints.is_empty()
    }

    /// Clear per-intersection state after moving on to a new intersection
    pub fn enter_intersection(&mut self, id: IntersectionId, approach: Arm, maneuver: Maneuver) {
        self.current_intersection = id;
        self.approach = approach;
        self.maneuver = maneuver;
        self.waypoints.clear();
        self.has_turned = false;
        self.stop_completed = false;
        self.stop_wait_seconds = 0.0;
        self.passed = false;
    }

    /// Park the car for the rest of the scenario
    pub fn park(&mut self) {
        self.stopped = true;
        self.speed = 0.0;
        self.waypoints.clear();
    }

    /// Snapshot in the shape the decision oracle expects, relative to `center`
    pub fn snapshot(&self, center: &Position) -> CarSnapshot {
        let local = self.position.sub(center);
        CarSnapshot {
            x: local.x,
            y: local.y,
            speed: self.speed,
            direction: self.maneuver,
        }
    }

    /// Decision input: this car, what it sees, and its nearest neighbours.
    ///
    /// Neighbours exclude this car and parked cars, sorted by distance and
    /// capped at `max_neighbors`.
    pub fn ml_payload(
        &self,
        center: &Position,
        sign: Sign,
        light: Option<LightColor>,
        others: &[Car],
        max_neighbors: usize,
    ) -> MlPayload {
        let mut nearby: Vec<&Car> = others
            .iter()
            .filter(|other| other.id != self.id && !other.stopped)
            .collect();
        nearby.sort_by(|a, b| {
            let da = a.position.distance(&self.position);
            let db = b.position.distance(&self.position);
            da.total_cmp(&db).then(a.id.cmp(&b.id))
        });
        nearby.truncate(max_neighbors);

        MlPayload {
            my_car: self.snapshot(center),
            sign,
            semaphore: light,
            traffic: nearby.iter().map(|other| other.snapshot(center)).collect(),
        }
    }

    /// Full state for renderers and logs
    pub fn state_payload(&self) -> CarState {
        CarState {
            id: self.id,
            intersection: self.current_intersection,
            x: self.position.x,
            y: self.position.y,
            vx: self.heading.x,
            vy: self.heading.y,
            speed: self.speed,
            cruise_speed: self.cruise_speed,
            direction: self.maneuver,
            approach: self.approach,
            role: self.role,
            priority: self.priority,
            passed: self.passed,
            stopped: self.stopped,
            turning: self.is_turning(),
            stop_completed: self.stop_completed,
            wait_seconds: self.wait_seconds,
        }
    }
}

/// `count` points along a circular arc, excluding the start angle and
/// including the end angle.
fn turn_arc(center: &Position, radius: f64, start_deg: f64, end_deg: f64, count: usize) -> Waypoints {
    (1..=count)
        .map(|k| {
            let t = k as f64 / count as f64;
            let angle = (start_deg + (end_deg - start_deg) * t).to_radians();
            Position::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
        })
        .collect()
}

/// One car as seen by the decision oracle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarSnapshot {
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub direction: Maneuver,
}

/// Everything the decision oracle gets for one car
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MlPayload {
    pub my_car: CarSnapshot,
    pub sign: Sign,
    pub semaphore: Option<LightColor>,
    pub traffic: Vec<CarSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarState {
    pub id: CarId,
    pub intersection: IntersectionId,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub speed: f64,
    pub cruise_speed: f64,
    pub direction: Maneuver,
    pub approach: Arm,
    pub role: Role,
    pub priority: bool,
    pub passed: bool,
    pub stopped: bool,
    pub turning: bool,
    pub stop_completed: bool,
    pub wait_seconds: f64,
}
