//! Safety policy defaults, JSON overrides and the scoring functions

use crossroads_sim::simulation::{
    approach_ramp_kmh, braking_distance_m, danger_score, pair_safe_distance_m, Arm, Car, CarId,
    IntersectionId, Position, Role, SafetyPolicy,
};

fn car_at_speed(speed: f64) -> Car {
    Car::new(
        CarId::new(0),
        Position::new(-50.0, -7.0),
        Position::new(1.0, 0.0),
        speed,
        Arm::W,
        IntersectionId::new(0),
    )
}

#[test]
fn test_braking_distance() {
    // 36 km/h = 10 m/s, 90 km/h/s = 25 m/s^2
    assert!((braking_distance_m(36.0, 90.0) - 2.0).abs() < 1e-9);
    assert_eq!(braking_distance_m(0.0, 90.0), 0.0);

    // Deceleration is floored so a zero rate never divides by zero
    let floored = braking_distance_m(10.0, 0.0);
    assert!(floored.is_finite() && floored > 0.0);
}

#[test]
fn test_approach_ramp_stops_within_distance() {
    assert_eq!(approach_ramp_kmh(0.0, 30.0), 0.0);
    assert_eq!(approach_ramp_kmh(-3.0, 30.0), 0.0);

    for distance in [1.0, 5.0, 20.0] {
        let ramp = approach_ramp_kmh(distance, 30.0);
        assert!((braking_distance_m(ramp, 30.0) - distance).abs() < 1e-6);
    }
}

#[test]
fn test_pair_safe_distance_bounds() {
    let policy = SafetyPolicy::default();

    let parked = pair_safe_distance_m(&car_at_speed(0.0), &car_at_speed(0.0), &policy);
    assert!((parked - policy.min_pair_distance_m).abs() < 1e-9);

    let fast = pair_safe_distance_m(&car_at_speed(120.0), &car_at_speed(120.0), &policy);
    assert!((fast - policy.max_pair_distance_m).abs() < 1e-9);

    let moderate = pair_safe_distance_m(&car_at_speed(20.0), &car_at_speed(10.0), &policy);
    assert!(moderate > parked && moderate < fast);
}

#[test]
fn test_danger_score_role_weights() {
    let policy = SafetyPolicy::default();
    let roles = [
        (Role::Civilian, 0.0),
        (Role::Bus, 0.4),
        (Role::Taxi, 0.2),
        (Role::Police, 2.0),
        (Role::Ambulance, 2.5),
        (Role::Fire, 2.3),
    ];
    for (role, weight) in roles {
        let score = danger_score(&car_at_speed(0.0).with_role(role), &policy);
        assert!((score - weight).abs() < 1e-9, "{:?} scored {}", role, score);
    }
}

#[test]
fn test_danger_score_speed_and_wait_terms() {
    let policy = SafetyPolicy::default();

    // Twice the speed limit: speed factor capped at 2, overspeed 1.0
    let speeding = car_at_speed(84.0);
    let expected = 2.0 + 1.2 + braking_distance_m(84.0, policy.max_brake_kmh_s) / 35.0;
    assert!((danger_score(&speeding, &policy) - expected).abs() < 1e-9);

    let mut waiting = car_at_speed(0.0);
    waiting.wait_seconds = 3.0;
    assert!((danger_score(&waiting, &policy) - 0.5).abs() < 1e-9);

    waiting.wait_seconds = 600.0;
    assert!((danger_score(&waiting, &policy) - 2.0).abs() < 1e-9);
}

#[test]
fn test_default_policy_is_valid() {
    let policy = SafetyPolicy::default();
    policy.validate().unwrap();
    assert_eq!(policy.semaphore_cycle_s(), 24.0);
    assert!(policy.right_turn_trigger_m() < policy.stop_line_offset_m);
    assert!(policy.overlap_hard_radius_m >= policy.min_pair_distance_m);
}

#[test]
fn test_partial_json_keeps_defaults() {
    let policy = SafetyPolicy::from_json_str(
        r#"{"max_accel_kmh_s": 24.0, "virtual_signal_enabled": true}"#,
    )
    .unwrap();

    assert_eq!(policy.max_accel_kmh_s, 24.0);
    assert!(policy.virtual_signal_enabled);
    assert_eq!(policy.lane_offset_m, SafetyPolicy::default().lane_offset_m);
    assert_eq!(policy.min_pair_distance_m, 4.8);
}

#[test]
fn test_invalid_policy_rejected() {
    assert!(SafetyPolicy::from_json_str("not json").is_err());
    assert!(SafetyPolicy::from_json_str(r#"{"min_pair_distance_m": 20.0}"#).is_err());
    assert!(SafetyPolicy::from_json_str(r#"{"right_turn_radius_m": 8.0}"#).is_err());
}
