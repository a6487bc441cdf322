//! Main simulation world that ties everything together
//!
//! One `update_physics` call is one complete tick: signals, target speeds,
//! the collision guard, integration, turns, transitions, overlap
//! resolution and finish detection, always in that order.

use anyhow::{bail, Result};
use log::{debug, info, warn};
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::car::Car;
use super::decision::{Decision, DecisionKind, DecisionOracle};
use super::guard::{min_pair_distance, resolve_overlaps, GuardContext};
use super::intersection::SemaphoreState;
use super::layout::default_network;
use super::policy::{approach_ramp_kmh, braking_distance_m, SafetyPolicy};
use super::road_network::RoadNetwork;
use super::signal::VirtualSignal;
use super::spawner::spawn_cars;
use super::types::{Arm, Axis, CarId, IntersectionId, LightColor, Maneuver, Position, Role, Sign};

/// Counters for one scenario, for logs and the console summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldStats {
    pub scenario: u64,
    pub time: f64,
    pub cars: usize,
    pub parked: usize,
    pub passed: usize,
    pub safety_interventions: u64,
    pub collision_resolutions: u64,
    pub transitions: u64,
    pub priority_demotions: u64,
    pub min_distance_m: Option<f64>,
    pub guard_min_distance_m: Option<f64>,
}

/// The main simulation world
#[derive(Debug, Clone)]
pub struct World {
    network: RoadNetwork,
    pub policy: SafetyPolicy,
    cars: Vec<Car>,

    num_cars: usize,
    seed: u64,
    rng: StdRng,
    /// Starts at 1, bumped by every `reset`
    scenario_index: u64,

    /// Simulated seconds in the current scenario
    pub time: f64,
    finished: bool,
    signal: VirtualSignal,

    pub safety_interventions: u64,
    pub collision_resolutions: u64,
    pub transitions: u64,
    pub priority_demotions: u64,
    /// Closest approach between two cars still in the scenario
    pub min_distance_m: Option<f64>,
    /// Closest approach left by the guard alone, measured before the
    /// overlap resolver runs
    pub guard_min_distance_m: Option<f64>,
}

impl World {
    /// World on the seeded default grid
    pub fn new(num_cars: usize, seed: u64, policy: SafetyPolicy) -> Self {
        Self::build(num_cars, seed, policy, default_network(seed))
    }

    /// World on a caller-supplied network
    pub fn with_network(num_cars: usize, seed: u64, policy: SafetyPolicy, network: RoadNetwork) -> Result<Self> {
        if network.intersection_count() == 0 {
            bail!("Cannot build a world on a network without intersections");
        }
        Ok(Self::build(num_cars, seed, policy, network))
    }

    fn build(num_cars: usize, seed: u64, policy: SafetyPolicy, network: RoadNetwork) -> Self {
        let scenario_index = 1;
        let mut world = Self {
            network,
            policy,
            cars: Vec::new(),
            num_cars,
            seed,
            rng: StdRng::seed_from_u64(scenario_seed(seed, scenario_index)),
            scenario_index,
            time: 0.0,
            finished: false,
            signal: VirtualSignal::new(),
            safety_interventions: 0,
            collision_resolutions: 0,
            transitions: 0,
            priority_demotions: 0,
            min_distance_m: None,
            guard_min_distance_m: None,
        };
        world.start_scenario();
        world
    }

    /// Respawn every car for the next scenario
    pub fn reset(&mut self) {
        self.scenario_index += 1;
        self.rng = StdRng::seed_from_u64(scenario_seed(self.seed, self.scenario_index));
        self.time = 0.0;
        self.finished = false;
        self.safety_interventions = 0;
        self.collision_resolutions = 0;
        self.transitions = 0;
        self.priority_demotions = 0;
        self.min_distance_m = None;
        self.guard_min_distance_m = None;
        self.signal.clear();
        self.start_scenario();
    }

    fn start_scenario(&mut self) {
        let policy = &self.policy;
        for (k, node) in self
            .network
            .intersections_mut()
            .filter(|node| node.has_semaphore)
            .enumerate()
        {
            node.reset_semaphore(policy, k as f64 * policy.sem_stagger_s);
        }

        self.cars = spawn_cars(self.num_cars, &self.network, &self.policy, self.scenario_index, &mut self.rng);
        self.normalize_priorities();

        let (count, cols, rows) = self.network.grid_info();
        info!(
            "Scenario {} ready: {} intersections ({}x{}), {} roads, {} cars",
            self.scenario_index,
            count,
            cols,
            rows,
            self.network.road_count(),
            self.cars.len()
        );
    }

    pub fn network(&self) -> &RoadNetwork {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut RoadNetwork {
        &mut self.network
    }

    /// Read-only snapshot of every car
    pub fn all_cars(&self) -> &[Car] {
        &self.cars
    }

    pub fn car(&self, id: CarId) -> Option<&Car> {
        self.cars.iter().find(|car| car.id == id)
    }

    /// Swap in a hand-built set of cars; the scenario is live again
    pub fn replace_cars(&mut self, cars: Vec<Car>) {
        self.cars = cars;
        self.finished = false;
        self.min_distance_m = None;
        self.guard_min_distance_m = None;
    }

    pub fn scenario_index(&self) -> u64 {
        self.scenario_index
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Sign tables for every intersection
    pub fn get_signs(&self) -> BTreeMap<IntersectionId, BTreeMap<Arm, Sign>> {
        self.network
            .intersections()
            .map(|node| (node.id, node.signs()))
            .collect()
    }

    /// Sign table for one intersection; empty when the id is unknown
    pub fn get_signs_for(&self, id: IntersectionId) -> BTreeMap<Arm, Sign> {
        self.network
            .intersection(id)
            .map(|node| node.signs())
            .unwrap_or_default()
    }

    pub fn semaphore_state_for(&self, id: IntersectionId) -> Option<SemaphoreState> {
        self.network
            .intersection(id)
            .map(|node| node.semaphore_state(self.policy.semaphores_enabled))
    }

    fn semaphore_active(&self, id: IntersectionId) -> bool {
        self.policy.semaphores_enabled
            && self
                .network
                .intersection(id)
                .is_some_and(|node| node.has_semaphore)
    }

    /// Sign the car sees; `NoSign` at an active semaphore
    pub fn sign_for_car(&self, car: &Car) -> Sign {
        if self.semaphore_active(car.current_intersection) {
            return Sign::NoSign;
        }
        self.network
            .intersection(car.current_intersection)
            .map(|node| node.sign_for(car.approach))
            .unwrap_or(Sign::NoSign)
    }

    /// Light the car sees, if its intersection runs an active semaphore
    pub fn light_for_car(&self, car: &Car) -> Option<LightColor> {
        if !self.semaphore_active(car.current_intersection) {
            return None;
        }
        self.network
            .intersection(car.current_intersection)
            .map(|node| node.light_for(car.approach))
    }

    /// Approach holding the virtual green at `id`, when that scheduler runs
    pub fn virtual_green_for(&self, id: IntersectionId) -> Option<Arm> {
        if !self.policy.virtual_signal_enabled {
            return None;
        }
        self.signal.green_for(id)
    }

    /// Which of two cars gives way in a conflict
    pub fn pick_yielder(&self, a: &Car, b: &Car) -> CarId {
        GuardContext::new(&self.network, &self.policy).pick_yielder(a, b).id
    }

    /// Ask `oracle` about every car still in the scenario
    pub fn decisions_from(&self, oracle: &mut impl DecisionOracle) -> HashMap<CarId, Decision> {
        self.cars
            .iter()
            .filter(|car| !car.stopped)
            .map(|car| {
                let center = self.center_of(car);
                let payload = car.ml_payload(
                    &center,
                    self.sign_for_car(car),
                    self.light_for_car(car),
                    &self.cars,
                    self.policy.max_tracked_neighbors,
                );
                (car.id, oracle.decide(&payload))
            })
            .collect()
    }

    fn center_of(&self, car: &Car) -> Position {
        self.network
            .intersection(car.current_intersection)
            .map(|node| node.center)
            .unwrap_or(Position::ZERO)
    }

    /// Advance the world by `delta_secs`. Cars without an entry in
    /// `decisions` are treated as having no decision.
    pub fn update_physics(&mut self, delta_secs: f64, decisions: &HashMap<CarId, Decision>) {
        if self.finished {
            return;
        }
        let delta_secs = delta_secs.max(0.0);
        self.time += delta_secs;
        self.normalize_priorities();

        // Signals
        if self.policy.virtual_signal_enabled {
            self.signal.update(delta_secs, &self.cars, &self.network, &self.policy);
        }
        if self.policy.semaphores_enabled {
            let policy = &self.policy;
            for node in self.network.intersections_mut().filter(|node| node.has_semaphore) {
                node.advance_semaphore(delta_secs, policy);
            }
        }

        // Target speeds
        let signal = self.policy.virtual_signal_enabled.then_some(&self.signal);
        let mut targets: Vec<f64> = self
            .cars
            .iter_mut()
            .map(|car| {
                let decision = decisions.get(&car.id).copied().unwrap_or_default();
                target_speed(car, &decision, delta_secs, &self.network, &self.policy, signal)
            })
            .collect();

        // Collision guard
        if self.policy.collision_guard_enabled {
            let guard = GuardContext::new(&self.network, &self.policy);
            self.safety_interventions += guard.apply_pair_guard(&self.cars, &mut targets);
            self.safety_interventions += guard.apply_lane_following(&self.cars, &mut targets);
        }

        // Speed and position
        for (car, target) in self.cars.iter_mut().zip(&targets) {
            integrate_speed(car, *target, delta_secs, &self.policy);
            car.advance(delta_secs);
        }

        // Turns
        for car in self.cars.iter_mut().filter(|car| !car.passed && !car.stopped) {
            let Some(node) = self.network.intersection(car.current_intersection) else {
                continue;
            };
            if car.assign_turn(&node.center, &self.policy) {
                debug!("{} turning {:?} at {}", car.id, car.maneuver, node.id);
            }
        }

        self.update_progress();
        self.normalize_priorities();

        if let Some(distance) = min_pair_distance(&self.cars) {
            if distance < self.policy.min_pair_distance_m {
                debug!("t={:.2}s: guard left a pair {:.2} m apart", self.time, distance);
            }
            self.guard_min_distance_m = Some(self.guard_min_distance_m.map_or(distance, |d| d.min(distance)));
        }
        if self.policy.overlap_resolver_enabled {
            self.collision_resolutions += resolve_overlaps(&mut self.cars, &self.policy);
        }
        if let Some(distance) = min_pair_distance(&self.cars) {
            self.min_distance_m = Some(self.min_distance_m.map_or(distance, |d| d.min(distance)));
        }

        self.check_finished();
    }

    /// Pass detection, transitions onto neighbouring intersections and
    /// parking once a car is well clear of the network.
    fn update_progress(&mut self) {
        let policy = &self.policy;
        for car in self.cars.iter_mut().filter(|car| !car.stopped) {
            let Some(center) = self
                .network
                .intersection(car.current_intersection)
                .map(|node| node.center)
            else {
                continue;
            };
            let beyond = -car.axial_distance(&center);

            if car.passed {
                if beyond > policy.exit_distance_m {
                    debug!("{} left the network, parking", car.id);
                    car.park();
                }
                continue;
            }
            if car.is_turning() || beyond < policy.pass_threshold_m {
                continue;
            }

            let exit = Arm::exit_for_heading(&car.heading);
            match self.network.connected_arm(car.current_intersection, exit) {
                Some((next, arrival)) => {
                    let maneuver = *Maneuver::ALL.choose(&mut self.rng).unwrap_or(&Maneuver::Forward);
                    debug!(
                        "{} {} -> {} arriving on {} ({:?})",
                        car.id, car.current_intersection, next, arrival, maneuver
                    );
                    car.enter_intersection(next, arrival, maneuver);
                    self.transitions += 1;
                }
                None => {
                    car.passed = true;
                    car.waypoints.clear();
                    car.heading = car.heading.snap_cardinal();
                }
            }
        }
    }

    /// Keep `priority` and emergency roles in step, and allow at most one
    /// priority car per intersection.
    fn normalize_priorities(&mut self) {
        for car in &mut self.cars {
            if car.role.is_emergency() {
                car.priority = true;
            } else if car.priority {
                car.role = Role::Ambulance;
            }
        }

        let mut by_intersection: BTreeMap<IntersectionId, Vec<usize>> = BTreeMap::new();
        for (index, car) in self.cars.iter().enumerate().filter(|(_, car)| car.priority) {
            by_intersection.entry(car.current_intersection).or_default().push(index);
        }

        for (id, mut indices) in by_intersection {
            if indices.len() < 2 {
                continue;
            }
            let center = self
                .network
                .intersection(id)
                .map(|node| node.center)
                .unwrap_or(Position::ZERO);
            indices.sort_by_key(|&index| {
                let car = &self.cars[index];
                (car.passed, OrderedFloat(car.position.distance(&center)), car.id)
            });
            for &index in &indices[1..] {
                let car = &mut self.cars[index];
                warn!("{} demoted: another priority vehicle already holds {}", car.id, id);
                car.role = Role::Civilian;
                car.priority = false;
                self.priority_demotions += 1;
            }
        }
    }

    fn check_finished(&mut self) {
        if !self.cars.iter().all(|car| car.stopped) && self.time >= self.policy.max_scenario_s {
            warn!(
                "Scenario {} hit the {:.0}s limit, parking remaining cars",
                self.scenario_index, self.policy.max_scenario_s
            );
            for car in &mut self.cars {
                car.park();
            }
        }
        if self.cars.iter().all(|car| car.stopped) {
            self.finished = true;
            info!(
                "Scenario {} finished after {:.1}s ({} interventions, {} resolutions)",
                self.scenario_index, self.time, self.safety_interventions, self.collision_resolutions
            );
        }
    }

    pub fn stats(&self) -> WorldStats {
        WorldStats {
            scenario: self.scenario_index,
            time: self.time,
            cars: self.cars.len(),
            parked: self.cars.iter().filter(|car| car.stopped).count(),
            passed: self.cars.iter().filter(|car| car.passed).count(),
            safety_interventions: self.safety_interventions,
            collision_resolutions: self.collision_resolutions,
            transitions: self.transitions,
            priority_demotions: self.priority_demotions,
            min_distance_m: self.min_distance_m,
            guard_min_distance_m: self.guard_min_distance_m,
        }
    }

    /// Print a summary of the world state
    pub fn print_summary(&self) {
        let stats = self.stats();
        println!("=== Intersection Simulation Summary ===");
        println!("Scenario: {}  Time: {:.2}s", stats.scenario, stats.time);
        println!(
            "Intersections: {}  Roads: {}",
            self.network.intersection_count(),
            self.network.road_count()
        );
        println!(
            "Cars: {} (parked {}, passed {})",
            stats.cars, stats.parked, stats.passed
        );
        println!(
            "Safety interventions: {}  Collision resolutions: {}  Transitions: {}",
            stats.safety_interventions, stats.collision_resolutions, stats.transitions
        );
        if let Some(distance) = stats.min_distance_m {
            println!("Closest approach: {:.2} m", distance);
        }
        if let Some(distance) = stats.guard_min_distance_m {
            println!("Closest approach before resolution: {:.2} m", distance);
        }
        println!();

        println!("--- Intersections ---");
        for node in self.network.intersections() {
            let control = if self.policy.semaphores_enabled && node.has_semaphore {
                format!("semaphore {:?} {:?} ({:.1}s)", node.sem_green_axis, node.sem_phase, node.sem_timer)
            } else {
                format!("signs, priority {:?}", node.priority_axis)
            };
            println!(
                "  {} at ({:.0}, {:.0}): {}",
                node.id, node.center.x, node.center.y, control
            );
        }

        let active: Vec<&Car> = self.cars.iter().filter(|car| !car.stopped).collect();
        if !active.is_empty() {
            println!("--- Active Cars ---");
            for car in active {
                println!(
                    "  {} {:?} at ({:.1}, {:.1}) {:.1} km/h via {} {} {:?}{}",
                    car.id,
                    car.role,
                    car.position.x,
                    car.position.y,
                    car.speed,
                    car.current_intersection,
                    car.approach,
                    car.maneuver,
                    if car.passed { " passed" } else { "" }
                );
            }
        }
    }

    /// Draw the network and cars as ASCII art, one character per 5 m
    pub fn draw_map(&self) {
        const METRES_PER_CELL: f64 = 5.0;
        let arm = self.network.terminal_arm_length;

        let mut min_x = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for node in self.network.intersections() {
            min_x = min_x.min(node.center.x - arm);
            max_x = max_x.max(node.center.x + arm);
            min_y = min_y.min(node.center.y - arm);
            max_y = max_y.max(node.center.y + arm);
        }
        if !min_x.is_finite() {
            return;
        }

        let width = ((max_x - min_x) / METRES_PER_CELL) as usize + 1;
        let height = ((max_y - min_y) / METRES_PER_CELL) as usize + 1;
        let mut grid = vec![vec![' '; width]; height];

        // North is up
        let to_grid = |p: &Position| -> Option<(usize, usize)> {
            let col = ((p.x - min_x) / METRES_PER_CELL).round();
            let row = ((max_y - p.y) / METRES_PER_CELL).round();
            if col < 0.0 || row < 0.0 || col as usize >= width || row as usize >= height {
                None
            } else {
                Some((row as usize, col as usize))
            }
        };

        for node in self.network.intersections() {
            for arm_dir in Arm::ALL {
                let Some(end) = self.network.arm_exit_position(node.id, arm_dir) else {
                    continue;
                };
                let glyph = if arm_dir.axis() == Axis::EW { '-' } else { '|' };
                let steps = (node.center.distance(&end) / METRES_PER_CELL).ceil() as usize;
                for step in 0..=steps {
                    let t = step as f64 / steps.max(1) as f64;
                    if let Some((row, col)) = to_grid(&node.center.lerp(&end, t)) {
                        if grid[row][col] == ' ' {
                            grid[row][col] = glyph;
                        }
                    }
                }
            }
        }

        for node in self.network.intersections() {
            if let Some((row, col)) = to_grid(&node.center) {
                grid[row][col] = if node.has_semaphore { 'S' } else { '+' };
            }
        }

        for car in self.cars.iter().filter(|car| !car.stopped) {
            if let Some((row, col)) = to_grid(&car.position) {
                grid[row][col] = if car.priority { 'E' } else { 'C' };
            }
        }

        println!("\n=== World Map (t={:.1}s) ===", self.time);
        println!("Legend: S=Semaphore, +=Signed intersection, C=Car, E=Emergency, -|=Road");
        println!();
        for row in &grid {
            let line: String = row.iter().collect();
            println!("{}", line.trim_end());
        }
        println!();
    }
}

/// Per-scenario RNG seed
fn scenario_seed(seed: u64, scenario_index: u64) -> u64 {
    seed ^ scenario_index.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Desired speed for one car this tick, before the collision guard.
///
/// Starts from the decision (explicit target, else STOP target, else
/// cruise), never above cruise, then caps it by whatever controls the
/// car's approach. Priority cars skip every control.
fn target_speed(
    car: &mut Car,
    decision: &Decision,
    delta_secs: f64,
    network: &RoadNetwork,
    policy: &SafetyPolicy,
    signal: Option<&VirtualSignal>,
) -> f64 {
    if car.stopped {
        return 0.0;
    }
    if car.priority {
        car.stop_completed = true;
        return car.cruise_speed;
    }

    let requested = match (decision.target_speed_kmh, decision.kind) {
        (Some(speed), _) => speed,
        (None, DecisionKind::Stop) => policy.ml_stop_target_speed_kmh,
        _ => car.cruise_speed,
    };
    let mut target = requested.clamp(0.0, car.cruise_speed.max(0.0));

    if car.passed {
        return target;
    }
    let Some(node) = network.intersection(car.current_intersection) else {
        return target;
    };

    if let Some(cap) = signal.and_then(|s| s.cap_for(car, network, policy)) {
        target = target.min(cap);
    }

    let to_line = car.distance_to_stop_line(&node.center, policy);
    let ramp = approach_ramp_kmh(to_line - policy.stop_line_buffer_m, policy.comfort_decel_kmh_s);

    if policy.semaphores_enabled && node.has_semaphore {
        let light = node.light_for(car.approach);
        if light != LightColor::Green && to_line > 0.0 {
            // On yellow, go if stopping comfortably is no longer possible
            let committed_on_yellow = light == LightColor::Yellow
                && braking_distance_m(car.speed, policy.comfort_decel_kmh_s) > to_line;
            if !committed_on_yellow {
                target = target.min(ramp);
            }
        }
        return target;
    }

    let dwell = match node.sign_for(car.approach) {
        Sign::Stop => policy.stop_wait_s,
        Sign::Yield => policy.yield_wait_s,
        Sign::Priority | Sign::NoSign => return target,
    };
    if car.stop_completed {
        return target;
    }
    if to_line < -policy.lane_offset_m {
        // Already through the box without stopping; nothing left to enforce
        car.stop_completed = true;
        return target;
    }

    // The dwell must be one continuous halt
    if car.speed > policy.stop_speed_eps_kmh {
        car.stop_wait_seconds = 0.0;
    } else if to_line <= policy.stop_zone_m {
        car.stop_wait_seconds += delta_secs;
        if car.stop_wait_seconds >= dwell {
            car.stop_completed = true;
            debug!("{} completed its stop at {}", car.id, node.id);
            return target;
        }
    }
    target.min(ramp)
}

/// Move the car's speed toward `target` with asymmetric rates
fn integrate_speed(car: &mut Car, target: f64, delta_secs: f64, policy: &SafetyPolicy) {
    if car.stopped {
        car.speed = 0.0;
        return;
    }
    let target = target.max(0.0);

    if car.speed < target {
        let mut accel = policy.max_accel_kmh_s;
        if car.speed < policy.launch_speed_kmh {
            accel *= policy.launch_boost;
        }
        car.speed = (car.speed + accel * delta_secs).min(target);
    } else if car.speed > target {
        let decel = if target <= 0.5 || car.speed - target > policy.urgent_brake_delta_kmh {
            policy.max_brake_kmh_s
        } else {
            policy.coast_decel_kmh_s
        };
        car.speed = (car.speed - decel * delta_secs).max(target);
    }

    if target < 0.5 && car.speed < policy.anti_creep_kmh {
        car.speed = 0.0;
    }

    if car.speed < policy.wait_speed_kmh {
        car.wait_seconds += delta_secs;
    } else {
        car.wait_seconds = (car.wait_seconds - policy.wait_decay_rate * delta_secs).max(0.0);
    }
}
