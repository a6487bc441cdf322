//! Core types for the traffic simulation
//!
//! Ids, planar geometry and the small enums shared by every module.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A unique identifier for simulation entities
/// This is a simple wrapper around a usize for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimId(pub usize);

/// A wrapper type for intersection IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntersectionId(pub SimId);

impl IntersectionId {
    pub fn new(index: usize) -> Self {
        Self(SimId(index))
    }
}

impl fmt::Display for IntersectionId {
    /// `INT_A`, `INT_B`, ... then `INT_26`, `INT_27` once letters run out.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = (self.0).0;
        if index < 26 {
            write!(f, "INT_{}", (b'A' + index as u8) as char)
        } else {
            write!(f, "INT_{}", index)
        }
    }
}

/// A wrapper type for car IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CarId(pub SimId);

impl CarId {
    pub fn new(index: usize) -> Self {
        Self(SimId(index))
    }

    /// Parse the `CAR_<n>` form used in decision payloads (case-insensitive).
    pub fn parse(text: &str) -> Option<Self> {
        let upper = text.trim().to_ascii_uppercase();
        let digits = upper.strip_prefix("CAR_")?;
        digits.parse::<usize>().ok().map(CarId::new)
    }
}

impl fmt::Display for CarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CAR_{}", (self.0).0)
    }
}

impl Serialize for CarId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Serialize for IntersectionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A 2D position (or direction) in world-space metres
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const ZERO: Position = Position { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn lerp(&self, other: &Position, t: f64) -> Position {
        Position {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    pub fn sub(&self, other: &Position) -> Position {
        Position::new(self.x - other.x, self.y - other.y)
    }

    pub fn add(&self, other: &Position) -> Position {
        Position::new(self.x + other.x, self.y + other.y)
    }

    pub fn scale(&self, factor: f64) -> Position {
        Position::new(self.x * factor, self.y * factor)
    }

    pub fn dot(&self, other: &Position) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// z component of the 3D cross product
    pub fn cross(&self, other: &Position) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// Unit vector in the same direction, or `None` for a (near) zero vector
    pub fn normalized(&self) -> Option<Position> {
        let len = self.length();
        if len > 1e-9 {
            Some(self.scale(1.0 / len))
        } else {
            None
        }
    }

    /// Rotate counter-clockwise by the angle whose cosine/sine are the
    /// components of `unit`.
    pub fn rotated_by(&self, unit: &Position) -> Position {
        Position::new(
            self.x * unit.x - self.y * unit.y,
            self.x * unit.y + self.y * unit.x,
        )
    }

    /// Snap to the cardinal axis of the dominant component.
    pub fn snap_cardinal(&self) -> Position {
        if self.x.abs() >= self.y.abs() {
            if self.x == 0.0 {
                Position::ZERO
            } else {
                Position::new(self.x.signum(), 0.0)
            }
        } else {
            Position::new(0.0, self.y.signum())
        }
    }
}

/// One of the four roads entering an intersection.
///
/// `N` is the +y side, `E` the +x side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Arm {
    N,
    S,
    E,
    W,
}

impl Arm {
    pub const ALL: [Arm; 4] = [Arm::N, Arm::S, Arm::E, Arm::W];

    /// Unit velocity of a car entering along this arm (toward the centre)
    pub fn entry_heading(self) -> Position {
        match self {
            Arm::W => Position::new(1.0, 0.0),
            Arm::E => Position::new(-1.0, 0.0),
            Arm::N => Position::new(0.0, -1.0),
            Arm::S => Position::new(0.0, 1.0),
        }
    }

    /// Arm a car leaves through when travelling with `heading`
    pub fn exit_for_heading(heading: &Position) -> Arm {
        let snapped = heading.snap_cardinal();
        if snapped.x > 0.0 {
            Arm::E
        } else if snapped.x < 0.0 {
            Arm::W
        } else if snapped.y > 0.0 {
            Arm::N
        } else {
            Arm::S
        }
    }

    pub fn opposite(self) -> Arm {
        match self {
            Arm::N => Arm::S,
            Arm::S => Arm::N,
            Arm::E => Arm::W,
            Arm::W => Arm::E,
        }
    }

    pub fn axis(self) -> Axis {
        match self {
            Arm::E | Arm::W => Axis::EW,
            Arm::N | Arm::S => Axis::NS,
        }
    }
}

impl fmt::Display for Arm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Arm::N => "N",
            Arm::S => "S",
            Arm::E => "E",
            Arm::W => "W",
        };
        f.write_str(s)
    }
}

/// Road axis through an intersection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Axis {
    #[default]
    EW,
    NS,
}

impl Axis {
    pub fn other(self) -> Axis {
        match self {
            Axis::EW => Axis::NS,
            Axis::NS => Axis::EW,
        }
    }

    /// Unknown strings fall back to `EW`
    pub fn parse_lossy(text: &str) -> Axis {
        match text.trim().to_ascii_uppercase().as_str() {
            "NS" => Axis::NS,
            _ => Axis::EW,
        }
    }
}

/// Manoeuvre a car intends to make at its current intersection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Maneuver {
    Forward,
    Left,
    Right,
}

impl Maneuver {
    pub const ALL: [Maneuver; 3] = [Maneuver::Forward, Maneuver::Left, Maneuver::Right];

    pub fn parse_lossy(text: &str) -> Maneuver {
        match text.trim().to_ascii_uppercase().as_str() {
            "LEFT" => Maneuver::Left,
            "RIGHT" => Maneuver::Right,
            _ => Maneuver::Forward,
        }
    }
}

/// Vehicle role, which drives priority weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Civilian,
    Bus,
    Taxi,
    Police,
    Ambulance,
    Fire,
}

impl Role {
    pub const EMERGENCY: [Role; 3] = [Role::Ambulance, Role::Police, Role::Fire];
    pub const ORDINARY: [Role; 3] = [Role::Civilian, Role::Bus, Role::Taxi];

    pub fn is_emergency(self) -> bool {
        matches!(self, Role::Ambulance | Role::Police | Role::Fire)
    }

    /// Scheduling weight added to the danger score
    pub fn weight(self) -> f64 {
        match self {
            Role::Civilian => 0.0,
            Role::Bus => 0.4,
            Role::Taxi => 0.2,
            Role::Police => 2.0,
            Role::Ambulance => 2.5,
            Role::Fire => 2.3,
        }
    }

    pub fn parse_lossy(text: &str) -> Role {
        match text.trim().to_ascii_lowercase().as_str() {
            "bus" => Role::Bus,
            "taxi" => Role::Taxi,
            "police" => Role::Police,
            "ambulance" => Role::Ambulance,
            "fire" => Role::Fire,
            _ => Role::Civilian,
        }
    }
}

/// Traffic sign facing one approach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sign {
    Stop,
    Yield,
    Priority,
    NoSign,
}

impl Sign {
    /// Right-of-way rank, higher wins
    pub fn rank(self) -> u8 {
        match self {
            Sign::Priority => 3,
            Sign::NoSign => 2,
            Sign::Yield => 1,
            Sign::Stop => 0,
        }
    }

    /// Unknown strings fall back to `NO_SIGN`
    pub fn parse_lossy(text: &str) -> Sign {
        match text.trim().to_ascii_uppercase().as_str() {
            "STOP" => Sign::Stop,
            "YIELD" => Sign::Yield,
            "PRIORITY" => Sign::Priority,
            _ => Sign::NoSign,
        }
    }
}

/// Phase of a fixed-cycle semaphore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LightPhase {
    Green,
    Yellow,
    /// All-red clearance between the two axes
    Red,
}

/// Colour shown to one approach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LightColor {
    Green,
    Yellow,
    Red,
}

impl LightColor {
    pub fn rank(self) -> u8 {
        match self {
            LightColor::Green => 3,
            LightColor::Yellow => 2,
            LightColor::Red => 0,
        }
    }
}

/// Centre-to-centre distance between neighbouring grid intersections
pub const INTERSECTION_SEPARATION: f64 = 150.0;

/// Length drawn for a dead-end arm
pub const TERMINAL_ARM_LENGTH: f64 = 80.0;

/// Half width of a two-lane road
pub const ROAD_HALF_WIDTH: f64 = 10.0;

pub fn kmh_to_mps(speed_kmh: f64) -> f64 {
    speed_kmh.max(0.0) / 3.6
}
