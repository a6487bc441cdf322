//! Car motion, turn geometry and decision payloads

use crossroads_sim::simulation::{
    Arm, Car, CarId, IntersectionId, LightColor, Maneuver, Position, Role, SafetyPolicy, Sign,
};

fn approx(a: &Position, b: &Position) -> bool {
    a.distance(b) < 1e-6
}

fn eastbound(x: f64, speed: f64) -> Car {
    Car::new(
        CarId::new(0),
        Position::new(x, -7.0),
        Position::new(1.0, 0.0),
        speed,
        Arm::W,
        IntersectionId::new(0),
    )
}

#[test]
fn test_car_ids() {
    assert_eq!(CarId::new(7).to_string(), "CAR_7");
    assert_eq!(CarId::parse("car_12"), Some(CarId::new(12)));
    assert_eq!(CarId::parse("BUS_1"), None);
}

#[test]
fn test_straight_motion() {
    let mut car = eastbound(-50.0, 36.0);
    car.advance(1.0);
    assert!(approx(&car.position, &Position::new(-40.0, -7.0)));
    assert!(!car.is_turning());
}

#[test]
fn test_stopped_car_never_moves() {
    let mut car = eastbound(-50.0, 36.0);
    car.park();
    car.advance(1.0);
    assert_eq!(car.speed, 0.0);
    assert!(approx(&car.position, &Position::new(-50.0, -7.0)));
}

#[test]
fn test_waypoints_consumed_in_one_step() {
    let mut car = Car::new(
        CarId::new(1),
        Position::ZERO,
        Position::new(1.0, 0.0),
        9.0,
        Arm::W,
        IntersectionId::new(0),
    );
    car.waypoints.push(Position::new(1.0, 0.0));
    car.waypoints.push(Position::new(1.0, 1.0));
    assert!(car.is_turning());

    // 2.5 m of travel covers both one-metre legs, the rest goes straight on
    car.advance(1.0);
    assert!(!car.is_turning());
    assert!(car.has_turned);
    assert_eq!(car.heading, Position::new(0.0, 1.0));
    assert!(car.position.distance(&Position::new(1.0, 1.5)) < 1e-6);
}

#[test]
fn test_heading_follows_next_waypoint() {
    let mut car = Car::new(
        CarId::new(1),
        Position::ZERO,
        Position::new(1.0, 0.0),
        3.6,
        Arm::W,
        IntersectionId::new(0),
    );
    car.waypoints.push(Position::new(3.0, 4.0));
    car.advance(1.0);

    assert!(car.is_turning());
    assert!(approx(&car.heading, &Position::new(0.6, 0.8)));
    assert!(approx(&car.position, &Position::new(0.6, 0.8)));
}

#[test]
fn test_right_turn_arc_from_west() {
    let policy = SafetyPolicy::default();
    let center = Position::ZERO;
    let mut car = eastbound(-10.5, 30.0).with_maneuver(Maneuver::Right);

    assert!(car.assign_turn(&center, &policy));
    assert_eq!(car.waypoints.len(), policy.turn_waypoints);

    let last = *car.waypoints.last().unwrap();
    assert!(approx(&last, &Position::new(-7.0, -10.0)), "ended at {:?}", last);

    // Already turning: no second assignment
    assert!(!car.assign_turn(&center, &policy));
}

#[test]
fn test_left_turn_arc_from_north() {
    let policy = SafetyPolicy::default();
    let center = Position::new(150.0, 0.0);
    let mut car = Car::new(
        CarId::new(2),
        Position::new(143.0, 3.5),
        Position::new(0.0, -1.0),
        20.0,
        Arm::N,
        IntersectionId::new(1),
    )
    .with_maneuver(Maneuver::Left);

    assert!(car.assign_turn(&center, &policy));

    // Southbound turning left ends eastbound, in the lane south of centre
    let last = *car.waypoints.last().unwrap();
    assert!(approx(&last, &Position::new(154.0, -7.0)), "ended at {:?}", last);
}

#[test]
fn test_turn_not_assigned_outside_trigger_zone() {
    let policy = SafetyPolicy::default();
    let center = Position::ZERO;

    let mut far = eastbound(-30.0, 30.0).with_maneuver(Maneuver::Right);
    assert!(!far.assign_turn(&center, &policy));

    let mut left_early = eastbound(-8.0, 30.0).with_maneuver(Maneuver::Left);
    assert!(!left_early.assign_turn(&center, &policy));

    let mut straight = eastbound(-2.0, 30.0);
    assert!(!straight.assign_turn(&center, &policy));
}

#[test]
fn test_full_right_turn_snaps_heading() {
    let policy = SafetyPolicy::default();
    let center = Position::ZERO;
    let mut car = eastbound(-10.5, 18.0).with_maneuver(Maneuver::Right);
    assert!(car.assign_turn(&center, &policy));

    for _ in 0..200 {
        car.advance(0.05);
        if !car.is_turning() {
            break;
        }
    }
    assert!(car.has_turned);
    assert_eq!(car.heading, Position::new(0.0, -1.0));
}

#[test]
fn test_stop_line_distance() {
    let policy = SafetyPolicy::default();
    let car = eastbound(-30.0, 30.0);
    assert!((car.axial_distance(&Position::ZERO) - 30.0).abs() < 1e-9);
    assert!((car.distance_to_stop_line(&Position::ZERO, &policy) - 18.0).abs() < 1e-9);

    let past = eastbound(15.0, 30.0);
    assert!(past.axial_distance(&Position::ZERO) < 0.0);
}

#[test]
fn test_role_sets_priority() {
    assert!(eastbound(0.0, 10.0).with_role(Role::Police).priority);
    assert!(!eastbound(0.0, 10.0).with_role(Role::Bus).priority);
    assert!(!eastbound(0.0, 10.0).priority);
}

#[test]
fn test_ml_payload_neighbours() {
    let center = Position::new(150.0, 0.0);
    let me = Car::new(
        CarId::new(0),
        Position::new(120.0, -7.0),
        Position::new(1.0, 0.0),
        30.0,
        Arm::W,
        IntersectionId::new(1),
    );
    let mut others = vec![me.clone()];
    for (index, x) in [100.0, 60.0, 110.0, 40.0].into_iter().enumerate() {
        others.push(Car::new(
            CarId::new(index + 1),
            Position::new(x, -7.0),
            Position::new(1.0, 0.0),
            20.0,
            Arm::W,
            IntersectionId::new(1),
        ));
    }
    others[4].park();

    let payload = me.ml_payload(&center, Sign::Stop, Some(LightColor::Red), &others, 2);

    assert_eq!(payload.my_car.x, -30.0);
    assert_eq!(payload.my_car.y, -7.0);
    assert_eq!(payload.traffic.len(), 2);
    // Nearest first, relative to the intersection centre
    assert_eq!(payload.traffic[0].x, -40.0);
    assert_eq!(payload.traffic[1].x, -50.0);

    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json["sign"], "STOP");
    assert_eq!(json["semaphore"], "RED");
    assert_eq!(json["my_car"]["direction"], "FORWARD");
    assert_eq!(json["traffic"].as_array().unwrap().len(), 2);
}

#[test]
fn test_state_payload() {
    let car = eastbound(-20.0, 30.0).with_role(Role::Ambulance);
    let state = serde_json::to_value(car.state_payload()).unwrap();

    assert_eq!(state["id"], "CAR_0");
    assert_eq!(state["intersection"], "INT_A");
    assert_eq!(state["role"], "ambulance");
    assert_eq!(state["priority"], true);
    assert_eq!(state["approach"], "W");
}
