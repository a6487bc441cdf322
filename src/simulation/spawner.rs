//! Scenario spawning: placement on terminal arms, roles and priority cadence
//!
//! This module places the cars for one scenario. It separates spawn logic
//! from the per-tick world pipeline.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use std::collections::BTreeSet;

use super::car::Car;
use super::policy::SafetyPolicy;
use super::road_network::RoadNetwork;
use super::types::{Arm, CarId, IntersectionId, Maneuver, Position, Role};

/// Number of emergency vehicles for a scenario.
///
/// Odd scenarios get none, even ones get one, and every fourth gets two
/// when the cars are spread over at least two intersections.
pub fn emergency_quota(scenario_index: u64, distinct_intersections: usize) -> usize {
    if scenario_index % 2 == 1 {
        0
    } else if scenario_index % 4 == 0 {
        distinct_intersections.min(2)
    } else {
        distinct_intersections.min(1)
    }
}

/// Place `num_cars` cars on terminal arms, then hand out roles.
///
/// Each car gets up to `spawn_max_attempts` random placements that keep
/// `spawn_min_gap_m` from every car already placed; after that it falls
/// back to a radial spread by index. Always returns exactly `num_cars`.
pub fn spawn_cars(
    num_cars: usize,
    network: &RoadNetwork,
    policy: &SafetyPolicy,
    scenario_index: u64,
    rng: &mut StdRng,
) -> Vec<Car> {
    let mut arms = network.terminal_arms();
    if arms.is_empty() {
        warn!("Network has no terminal arms, spawning on every arm");
        arms = network
            .intersection_ids()
            .into_iter()
            .flat_map(|id| Arm::ALL.into_iter().map(move |arm| (id, arm)))
            .collect();
    }

    let mut cars: Vec<Car> = Vec::with_capacity(num_cars);
    if arms.is_empty() {
        return cars;
    }

    for index in 0..num_cars {
        let placement = random_placement(&cars, &arms, network, policy, rng).or_else(|| {
            let (id, arm) = arms[index % arms.len()];
            let distance = policy.spawn_min_radius_m + index as f64 * policy.spawn_min_gap_m;
            warn!(
                "No clear spawn spot for CAR_{} after {} attempts, using {}:{} at {:.0} m",
                index, policy.spawn_max_attempts, id, arm, distance
            );
            network
                .arm_spawn_position(id, arm, distance, policy.lane_offset_m)
                .map(|(position, heading)| (id, arm, position, heading))
        });

        let Some((intersection, arm, position, heading)) = placement else {
            continue;
        };

        let cruise = sample(rng, policy.cruise_min_kmh, policy.cruise_max_kmh);
        let maneuver = *Maneuver::ALL.choose(rng).unwrap_or(&Maneuver::Forward);
        let role = ordinary_role(rng);

        cars.push(
            Car::new(CarId::new(index), position, heading, cruise, arm, intersection)
                .with_role(role)
                .with_maneuver(maneuver)
                .with_speed_limit(policy.speed_limit_kmh),
        );
    }

    let emergencies = assign_emergency_roles(&mut cars, policy, scenario_index, rng);
    info!(
        "Scenario {}: spawned {} cars ({} emergency) on {} terminal arms",
        scenario_index,
        cars.len(),
        emergencies,
        arms.len()
    );
    cars
}

fn random_placement(
    placed: &[Car],
    arms: &[(IntersectionId, Arm)],
    network: &RoadNetwork,
    policy: &SafetyPolicy,
    rng: &mut StdRng,
) -> Option<(IntersectionId, Arm, Position, Position)> {
    for _ in 0..policy.spawn_max_attempts {
        let &(id, arm) = arms.choose(rng)?;
        let distance = sample(rng, policy.spawn_min_radius_m, policy.spawn_max_radius_m);
        let Some((position, heading)) =
            network.arm_spawn_position(id, arm, distance, policy.lane_offset_m)
        else {
            continue;
        };
        let clear = placed
            .iter()
            .all(|car| car.position.distance(&position) >= policy.spawn_min_gap_m);
        if clear {
            return Some((id, arm, position, heading));
        }
    }
    None
}

/// Civilian 70%, bus 15%, taxi 15%
fn ordinary_role(rng: &mut StdRng) -> Role {
    Role::ORDINARY
        .choose_weighted(rng, |role| match role {
            Role::Civilian => 0.70,
            _ => 0.15,
        })
        .copied()
        .unwrap_or_default()
}

/// Promote cars to emergency roles, at most one per intersection.
/// Returns how many were promoted.
fn assign_emergency_roles(
    cars: &mut [Car],
    policy: &SafetyPolicy,
    scenario_index: u64,
    rng: &mut StdRng,
) -> usize {
    let distinct: BTreeSet<IntersectionId> = cars.iter().map(|c| c.current_intersection).collect();
    let quota = emergency_quota(scenario_index, distinct.len());
    if quota == 0 {
        return 0;
    }

    let mut order: Vec<usize> = (0..cars.len()).collect();
    order.shuffle(rng);

    let mut used = BTreeSet::new();
    let mut promoted = 0;
    for index in order {
        if promoted >= quota {
            break;
        }
        let car = &mut cars[index];
        if !used.insert(car.current_intersection) {
            continue;
        }
        let role = *Role::EMERGENCY.choose(rng).unwrap_or(&Role::Ambulance);
        car.role = role;
        car.priority = true;
        car.cruise_speed = policy.emergency_cruise_kmh;
        car.speed = policy.emergency_cruise_kmh;
        debug!("{} is a {:?} approaching {}", car.id, role, car.current_intersection);
        promoted += 1;
    }
    promoted
}

/// Uniform sample that tolerates an empty or inverted range
fn sample(rng: &mut StdRng, low: f64, high: f64) -> f64 {
    if high > low {
        rng.random_range(low..=high)
    } else {
        low
    }
}
