//! Intersection nodes: sign layout and the fixed-cycle semaphore
//!
//! Standalone implementation with no rendering concerns.

use serde::Serialize;
use std::collections::BTreeMap;

use super::policy::SafetyPolicy;
use super::types::{Arm, Axis, IntersectionId, LightColor, LightPhase, Position, Sign};

/// Shortest phase the semaphore will ever hold, so a zeroed timing policy
/// still makes progress.
const MIN_PHASE_S: f64 = 0.05;

/// A single crossroads in the network
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionNode {
    pub id: IntersectionId,
    pub center: Position,
    /// Traffic lights instead of signs
    pub has_semaphore: bool,
    /// Axis whose approaches get PRIORITY signs (and the first green)
    pub priority_axis: Axis,

    // Runtime semaphore state, mutated by the world every tick
    pub sem_green_axis: Axis,
    pub sem_phase: LightPhase,
    /// Seconds left in the current phase
    pub sem_timer: f64,
}

/// Snapshot of one intersection's semaphore for renderers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemaphoreState {
    pub enabled: bool,
    pub green_axis: Axis,
    pub phase: LightPhase,
    pub timer: f64,
    pub colors: BTreeMap<Arm, LightColor>,
}

impl IntersectionNode {
    pub fn new(id: IntersectionId, cx: f64, cy: f64, has_semaphore: bool, priority_axis: Axis) -> Self {
        Self {
            id,
            center: Position::new(cx, cy),
            has_semaphore,
            priority_axis,
            sem_green_axis: priority_axis,
            sem_phase: LightPhase::Green,
            sem_timer: 0.0,
        }
    }

    /// Sign facing cars that arrive from `approach`.
    ///
    /// The priority axis gets PRIORITY on both arms; the minor axis gets
    /// STOP on one arm and YIELD on the other.
    pub fn sign_for(&self, approach: Arm) -> Sign {
        match (self.priority_axis, approach) {
            (Axis::EW, Arm::E | Arm::W) => Sign::Priority,
            (Axis::EW, Arm::N) => Sign::Stop,
            (Axis::EW, Arm::S) => Sign::Yield,
            (Axis::NS, Arm::N | Arm::S) => Sign::Priority,
            (Axis::NS, Arm::E) => Sign::Stop,
            (Axis::NS, Arm::W) => Sign::Yield,
        }
    }

    pub fn signs(&self) -> BTreeMap<Arm, Sign> {
        Arm::ALL.iter().map(|arm| (*arm, self.sign_for(*arm))).collect()
    }

    /// Put the semaphore at the start of its cycle, then run it forward by
    /// `offset_s` so neighbouring intersections don't switch in lockstep.
    pub fn reset_semaphore(&mut self, policy: &SafetyPolicy, offset_s: f64) {
        self.sem_green_axis = self.priority_axis;
        self.sem_phase = LightPhase::Green;
        self.sem_timer = policy.sem_green_s.max(MIN_PHASE_S);
        if offset_s > 0.0 {
            self.advance_semaphore(offset_s % policy.semaphore_cycle_s().max(MIN_PHASE_S), policy);
        }
    }

    /// GREEN -> YELLOW -> RED (all-red) -> GREEN on the other axis
    pub fn advance_semaphore(&mut self, delta_secs: f64, policy: &SafetyPolicy) {
        let mut remaining = delta_secs.max(0.0);
        while remaining > 0.0 {
            if self.sem_timer > remaining {
                self.sem_timer -= remaining;
                return;
            }
            remaining -= self.sem_timer.max(0.0);
            let (next_phase, duration) = match self.sem_phase {
                LightPhase::Green => (LightPhase::Yellow, policy.sem_yellow_s),
                LightPhase::Yellow => (LightPhase::Red, policy.sem_all_red_s),
                LightPhase::Red => {
                    self.sem_green_axis = self.sem_green_axis.other();
                    (LightPhase::Green, policy.sem_green_s)
                }
            };
            self.sem_phase = next_phase;
            self.sem_timer = duration.max(MIN_PHASE_S);
        }
    }

    /// Colour shown to cars arriving from `approach`
    pub fn light_for(&self, approach: Arm) -> LightColor {
        let on_green_axis = approach.axis() == self.sem_green_axis;
        match self.sem_phase {
            LightPhase::Green if on_green_axis => LightColor::Green,
            LightPhase::Yellow if on_green_axis => LightColor::Yellow,
            _ => LightColor::Red,
        }
    }

    pub fn semaphore_state(&self, enabled: bool) -> SemaphoreState {
        let enabled = enabled && self.has_semaphore;
        let colors = if enabled {
            Arm::ALL.iter().map(|arm| (*arm, self.light_for(*arm))).collect()
        } else {
            BTreeMap::new()
        };
        SemaphoreState {
            enabled,
            green_axis: self.sem_green_axis,
            phase: self.sem_phase,
            timer: self.sem_timer,
            colors,
        }
    }
}
