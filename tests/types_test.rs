//! Lossy parsing of the string enums carried in payloads

use crossroads_sim::simulation::{Axis, Maneuver, Role, Sign};

#[test]
fn test_axis_parse_lossy() {
    assert_eq!(Axis::parse_lossy("NS"), Axis::NS);
    assert_eq!(Axis::parse_lossy(" ns "), Axis::NS);
    assert_eq!(Axis::parse_lossy("ew"), Axis::EW);
    assert_eq!(Axis::parse_lossy("diag"), Axis::EW);
    assert_eq!(Axis::parse_lossy(""), Axis::EW);
}

#[test]
fn test_sign_parse_lossy() {
    assert_eq!(Sign::parse_lossy("STOP"), Sign::Stop);
    assert_eq!(Sign::parse_lossy("  yield\n"), Sign::Yield);
    assert_eq!(Sign::parse_lossy("Priority"), Sign::Priority);
    assert_eq!(Sign::parse_lossy("NO_SIGN"), Sign::NoSign);
    assert_eq!(Sign::parse_lossy("bogus"), Sign::NoSign);
}

#[test]
fn test_role_parse_lossy() {
    assert_eq!(Role::parse_lossy("ambulance"), Role::Ambulance);
    assert_eq!(Role::parse_lossy(" FIRE "), Role::Fire);
    assert_eq!(Role::parse_lossy("Police"), Role::Police);
    assert_eq!(Role::parse_lossy("bus"), Role::Bus);
    assert_eq!(Role::parse_lossy("taxi"), Role::Taxi);
    assert_eq!(Role::parse_lossy("tractor"), Role::Civilian);
    assert_eq!(Role::parse_lossy(""), Role::Civilian);

    assert!(Role::parse_lossy("ambulance").is_emergency());
    assert!(Role::ORDINARY.iter().all(|role| !role.is_emergency()));
}

#[test]
fn test_maneuver_parse_lossy() {
    assert_eq!(Maneuver::parse_lossy("LEFT"), Maneuver::Left);
    assert_eq!(Maneuver::parse_lossy(" right "), Maneuver::Right);
    assert_eq!(Maneuver::parse_lossy("Forward"), Maneuver::Forward);
    assert_eq!(Maneuver::parse_lossy("u-turn"), Maneuver::Forward);
}
