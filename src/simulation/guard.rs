//! Collision guard, right-of-way arbitration and the overlap resolver
//!
//! The guard is predictive: it caps target speeds before cars move. The
//! overlap resolver is reactive and runs after motion as a last resort.
//! Parked cars are out of the scenario and ignored by both.

use log::trace;
use ordered_float::OrderedFloat;
use sorted_vec::SortedVec;
use std::collections::BTreeMap;

use super::car::Car;
use super::policy::{approach_ramp_kmh, danger_score, pair_safe_distance_m, SafetyPolicy};
use super::road_network::RoadNetwork;
use super::types::{kmh_to_mps, Maneuver, Position};

const EPS: f64 = 1e-6;

/// Read-only view the guard needs
#[derive(Debug, Clone, Copy)]
pub struct GuardContext<'a> {
    pub network: &'a RoadNetwork,
    pub policy: &'a SafetyPolicy,
}

impl<'a> GuardContext<'a> {
    pub fn new(network: &'a RoadNetwork, policy: &'a SafetyPolicy) -> Self {
        Self { network, policy }
    }

    /// Centre of the car's current intersection
    pub fn center_of(&self, car: &Car) -> Position {
        self.network
            .intersection(car.current_intersection)
            .map(|node| node.center)
            .unwrap_or(Position::ZERO)
    }

    pub fn distance_to_stop_line(&self, car: &Car) -> f64 {
        car.distance_to_stop_line(&self.center_of(car), self.policy)
    }

    /// Past the stop line but not yet through the intersection
    fn is_committed(&self, car: &Car) -> bool {
        !car.passed && self.distance_to_stop_line(car) <= 0.0
    }

    /// Right-of-way rank of whatever controls the car's approach.
    ///
    /// Priority cars rank as PRIORITY. At an active semaphore the light
    /// colour ranks instead of the sign.
    pub fn control_rank(&self, car: &Car) -> u8 {
        if car.priority {
            return 3;
        }
        let Some(node) = self.network.intersection(car.current_intersection) else {
            return 2;
        };
        if self.policy.semaphores_enabled && node.has_semaphore {
            node.light_for(car.approach).rank()
        } else {
            node.sign_for(car.approach).rank()
        }
    }

    /// Both cars in one lane heading the same way
    fn same_lane(&self, a: &Car, b: &Car) -> bool {
        a.heading.dot(&b.heading) > 0.9 && a.lateral_offset(b) < self.policy.lane_tolerance_m
    }

    /// Seconds until the car reaches its stop line at its projected speed;
    /// zero once committed.
    fn time_to_stop_line(&self, car: &Car, target: f64) -> f64 {
        let remaining = self.distance_to_stop_line(car);
        if remaining <= 0.0 {
            return 0.0;
        }
        let speed = kmh_to_mps(car.speed.max(target));
        if speed < 0.1 {
            f64::INFINITY
        } else {
            remaining / speed
        }
    }

    /// Does this pair need a speed cap this tick?
    ///
    /// True when the cars are already inside their safe distance, when a
    /// short forward projection brings them inside it, or when both are
    /// crossing the same intersection on perpendicular paths and will reach
    /// their stop lines within the conflict window.
    pub fn needs_guard(&self, a: &Car, b: &Car, target_a: f64, target_b: f64) -> bool {
        let safe = pair_safe_distance_m(a, b, self.policy);
        if a.position.distance(&b.position) <= safe {
            return true;
        }

        let steps = self.policy.guard_projection_steps.max(1);
        let va = a.heading.scale(kmh_to_mps(a.speed.max(target_a)));
        let vb = b.heading.scale(kmh_to_mps(b.speed.max(target_b)));
        for k in 1..=steps {
            let t = self.policy.horizon_s * k as f64 / steps as f64;
            let pa = a.position.add(&va.scale(t));
            let pb = b.position.add(&vb.scale(t));
            if pa.distance(&pb) <= safe {
                return true;
            }
        }

        if a.passed || b.passed || a.current_intersection != b.current_intersection {
            return false;
        }
        if a.heading.dot(&b.heading).abs() >= 0.5 {
            return false;
        }
        let center = self.center_of(a);
        if a.approach_distance(&center) <= 0.0 || b.approach_distance(&center) <= 0.0 {
            return false;
        }
        let window = self.policy.conflict_window_s;
        self.time_to_stop_line(a, target_a) <= window && self.time_to_stop_line(b, target_b) <= window
    }

    /// Which of the two cars gives way. Rules apply in order until one
    /// separates them.
    pub fn pick_yielder<'c>(&self, a: &'c Car, b: &'c Car) -> &'c Car {
        // 1. committed cars keep going
        let (a_committed, b_committed) = (self.is_committed(a), self.is_committed(b));
        let (a_before, b_before) = (
            !a.passed && self.distance_to_stop_line(a) > 0.0,
            !b.passed && self.distance_to_stop_line(b) > 0.0,
        );
        if a_committed && b_before {
            return b;
        }
        if b_committed && a_before {
            return a;
        }

        // 2. cleared cars never yield
        if a.passed != b.passed {
            return if a.passed { b } else { a };
        }

        // 3. rear-end: the trailing car yields
        if self.same_lane(a, b) {
            let b_ahead = b.position.sub(&a.position).dot(&a.heading) > 0.0;
            return if b_ahead { a } else { b };
        }

        // 4. control rank at a shared intersection
        if a.current_intersection == b.current_intersection {
            let (rank_a, rank_b) = (self.control_rank(a), self.control_rank(b));
            if rank_a != rank_b {
                return if rank_a < rank_b { a } else { b };
            }
        }

        // 5. a car mid left turn yields
        let a_left = a.maneuver == Maneuver::Left && a.is_turning();
        let b_left = b.maneuver == Maneuver::Left && b.is_turning();
        if a_left != b_left {
            return if a_left { a } else { b };
        }

        // 6. right-hand rule
        let cross = a.heading.cross(&b.heading);
        if cross.abs() > 0.5 {
            return if cross > 0.0 { a } else { b };
        }

        // 7. lower danger score
        let (score_a, score_b) = (danger_score(a, self.policy), danger_score(b, self.policy));
        if (score_a - score_b).abs() > EPS {
            return if score_a < score_b { a } else { b };
        }

        // 8. farther from its centre
        let far_a = a.position.distance(&self.center_of(a));
        let far_b = b.position.distance(&self.center_of(b));
        if (far_a - far_b).abs() > EPS {
            return if far_a > far_b { a } else { b };
        }

        // 9. stable by id
        if a.id > b.id {
            a
        } else {
            b
        }
    }

    /// Cap the yielder of every guarded pair. Returns how many targets
    /// were lowered.
    pub fn apply_pair_guard(&self, cars: &[Car], targets: &mut [f64]) -> u64 {
        let mut interventions = 0;
        for i in 0..cars.len() {
            for j in (i + 1)..cars.len() {
                let (a, b) = (&cars[i], &cars[j]);
                if a.stopped || b.stopped || (a.passed && b.passed) {
                    continue;
                }
                if !self.needs_guard(a, b, targets[i], targets[j]) {
                    continue;
                }

                let yielder = self.pick_yielder(a, b);
                let (yi, other) = if yielder.id == a.id { (i, b) } else { (j, a) };
                let cap = self.yield_cap(yielder, other);
                trace!("{} yields to {} (cap {:.1} km/h)", yielder.id, other.id, cap);

                if cap < targets[yi] - EPS {
                    targets[yi] = cap;
                    interventions += 1;
                }
            }
        }
        interventions
    }

    /// Hard stop when very close or at the line, a ramp to the line while
    /// still approaching, otherwise half the other car's speed.
    fn yield_cap(&self, yielder: &Car, other: &Car) -> f64 {
        let policy = self.policy;
        let gap = yielder.position.distance(&other.position);
        let to_line = self.distance_to_stop_line(yielder);

        if gap <= policy.min_pair_distance_m + policy.guard_hard_margin_m {
            return 0.0;
        }
        if !yielder.passed && (0.0..=policy.stop_line_hold_m).contains(&to_line) {
            return 0.0;
        }
        if !yielder.passed && to_line > 0.0 {
            return approach_ramp_kmh(to_line - policy.stop_line_buffer_m, policy.comfort_decel_kmh_s);
        }
        other.speed * 0.5
    }

    /// Following-distance bands within each lane, leader first, so a
    /// leader's hard stop reaches its follower in the same pass.
    pub fn apply_lane_following(&self, cars: &[Car], targets: &mut [f64]) -> u64 {
        let policy = self.policy;
        let mut interventions = 0;

        for lane in lanes(cars, policy.lane_tolerance_m) {
            let order: Vec<usize> = lane.iter().map(|(_, index)| *index).collect();
            for pair in order.windows(2) {
                let (leader_index, follower_index) = (pair[0], pair[1]);
                let (leader, follower) = (&cars[leader_index], &cars[follower_index]);

                let gap = leader.position.distance(&follower.position);
                let safe = pair_safe_distance_m(leader, follower, policy);
                let ramp = approach_ramp_kmh(gap - policy.min_pair_distance_m, policy.comfort_decel_kmh_s);

                let leader_halted = targets[leader_index] <= 0.0 && gap <= 2.0 * safe;
                let cap = if gap <= policy.min_pair_distance_m + policy.follow_hard_margin_m || leader_halted {
                    Some(0.0)
                } else if gap <= safe {
                    Some((leader.speed * 0.5).min(ramp))
                } else if gap <= 2.0 * safe {
                    Some(leader.speed.min(ramp))
                } else {
                    None
                };

                if let Some(cap) = cap {
                    if cap < targets[follower_index] - EPS {
                        trace!("{} follows {} (cap {:.1} km/h)", follower.id, leader.id, cap);
                        targets[follower_index] = cap;
                        interventions += 1;
                    }
                }
            }
        }
        interventions
    }
}

/// Group moving, non-turning cars into lanes: same cardinal heading and
/// lateral offset within `tolerance`. Each lane is ordered leader first.
fn lanes(cars: &[Car], tolerance: f64) -> Vec<SortedVec<(OrderedFloat<f64>, usize)>> {
    let mut by_heading: BTreeMap<(i8, i8), Vec<usize>> = BTreeMap::new();
    for (index, car) in cars.iter().enumerate() {
        if car.stopped || car.is_turning() {
            continue;
        }
        let h = car.heading.snap_cardinal();
        by_heading
            .entry((h.x as i8, h.y as i8))
            .or_default()
            .push(index);
    }

    let mut out = Vec::new();
    for ((hx, hy), members) in by_heading {
        let heading = Position::new(hx as f64, hy as f64);

        // (lateral reference, cars ordered by descending progress)
        let mut groups: Vec<(f64, SortedVec<(OrderedFloat<f64>, usize)>)> = Vec::new();
        for index in members {
            let position = cars[index].position;
            let lateral = position.cross(&heading);
            let progress = position.dot(&heading);
            let key = (OrderedFloat(-progress), index);
            match groups.iter_mut().find(|(lane, _)| (lane - lateral).abs() < tolerance) {
                Some((_, group)) => {
                    group.insert(key);
                }
                None => {
                    let mut group = SortedVec::new();
                    group.insert(key);
                    groups.push((lateral, group));
                }
            }
        }
        out.extend(groups.into_iter().filter(|(_, g)| g.len() > 1).map(|(_, g)| g));
    }
    out
}

/// Push apart any pair closer than the hard radius and cap the faster car.
/// Returns how many pushes were made.
pub fn resolve_overlaps(cars: &mut [Car], policy: &SafetyPolicy) -> u64 {
    let radius = policy.overlap_hard_radius_m.max(policy.min_pair_distance_m);
    let mut resolutions = 0;

    for _ in 0..policy.overlap_max_passes.max(1) {
        let mut moved = false;
        for i in 0..cars.len() {
            for j in (i + 1)..cars.len() {
                if cars[i].stopped || cars[j].stopped {
                    continue;
                }
                let offset = cars[i].position.sub(&cars[j].position);
                let distance = offset.length();
                if distance >= radius {
                    continue;
                }

                let direction = offset.normalized().unwrap_or(Position::new(1.0, 0.0));
                let push = (radius - distance) / 2.0 + 0.001;
                cars[i].position = cars[i].position.add(&direction.scale(push));
                cars[j].position = cars[j].position.sub(&direction.scale(push));

                let (fast, slow) = if cars[i].speed >= cars[j].speed { (i, j) } else { (j, i) };
                let ceiling = cars[slow].speed.max(policy.overlap_floor_speed_kmh);
                if cars[fast].speed > ceiling {
                    cars[fast].speed = ceiling;
                }

                trace!("Separated {} and {} ({:.2} m)", cars[i].id, cars[j].id, distance);
                resolutions += 1;
                moved = true;
            }
        }
        if !moved {
            break;
        }
    }
    resolutions
}

/// Smallest distance between any two cars still in the scenario
pub fn min_pair_distance(cars: &[Car]) -> Option<f64> {
    let mut best: Option<f64> = None;
    for i in 0..cars.len() {
        for j in (i + 1)..cars.len() {
            if cars[i].stopped || cars[j].stopped {
                continue;
            }
            let d = cars[i].position.distance(&cars[j].position);
            best = Some(best.map_or(d, |b| b.min(d)));
        }
    }
    best
}
