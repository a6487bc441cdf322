//! Virtual signal scheduler
//!
//! A score-based stand-in for real traffic lights: each intersection hands
//! green to the approach whose waiting cars carry the highest combined
//! danger score, with hysteresis so it doesn't flap.

use log::debug;
use std::collections::BTreeMap;

use super::car::Car;
use super::policy::{approach_ramp_kmh, danger_score, SafetyPolicy};
use super::road_network::RoadNetwork;
use super::types::{Arm, IntersectionId};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct SignalSlot {
    green: Option<Arm>,
    /// Seconds since the last switch
    held_s: f64,
}

#[derive(Debug, Clone, Default)]
pub struct VirtualSignal {
    slots: BTreeMap<IntersectionId, SignalSlot>,
}

impl VirtualSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Approach currently holding green at `id`
    pub fn green_for(&self, id: IntersectionId) -> Option<Arm> {
        self.slots.get(&id).and_then(|slot| slot.green)
    }

    /// Re-score every intersection. Green moves only when the best approach
    /// beats the current one by the switch margin and the current one has
    /// held green for at least the signal window.
    pub fn update(&mut self, delta_secs: f64, cars: &[Car], network: &RoadNetwork, policy: &SafetyPolicy) {
        for node in network.intersections() {
            let mut scores: BTreeMap<Arm, f64> = BTreeMap::new();
            for car in cars {
                if car.current_intersection != node.id || car.passed || car.stopped {
                    continue;
                }
                let distance = car.approach_distance(&node.center);
                if distance < 0.0 || distance > policy.signal_control_radius_m {
                    continue;
                }
                *scores.entry(car.approach).or_insert(0.0) += danger_score(car, policy);
            }

            let slot = self.slots.entry(node.id).or_default();
            slot.held_s += delta_secs.max(0.0);

            let best = scores
                .iter()
                .fold(None::<(Arm, f64)>, |best, (arm, score)| match best {
                    Some((_, top)) if top >= *score => best,
                    _ => Some((*arm, *score)),
                });
            let Some((best_arm, best_score)) = best else {
                continue;
            };

            match slot.green {
                None => {
                    slot.green = Some(best_arm);
                    slot.held_s = 0.0;
                }
                Some(current) if current != best_arm => {
                    let current_score = scores.get(&current).copied().unwrap_or(0.0);
                    if best_score > current_score + policy.signal_switch_margin
                        && slot.held_s >= policy.signal_window_s
                    {
                        debug!("{}: virtual green {} -> {}", node.id, current, best_arm);
                        slot.green = Some(best_arm);
                        slot.held_s = 0.0;
                    }
                }
                Some(_) => {}
            }
        }
    }

    /// Speed cap for a car held by a virtual red, if any.
    ///
    /// Cars past their stop line, priority cars and cars on the green
    /// approach are never capped.
    pub fn cap_for(&self, car: &Car, network: &RoadNetwork, policy: &SafetyPolicy) -> Option<f64> {
        if car.priority || car.passed {
            return None;
        }
        let green = self.green_for(car.current_intersection)?;
        if green == car.approach {
            return None;
        }
        let node = network.intersection(car.current_intersection)?;
        let to_line = car.distance_to_stop_line(&node.center, policy);
        if to_line <= 0.0 || car.approach_distance(&node.center) > policy.signal_control_radius_m {
            return None;
        }

        let mut cap = policy.red_soft_speed_kmh;
        if car.approach_distance(&node.center) <= policy.red_hard_radius_m {
            cap = cap.min(approach_ramp_kmh(
                to_line - policy.stop_line_buffer_m,
                policy.comfort_decel_kmh_s,
            ));
        }
        Some(cap)
    }
}
