//! Road network construction, lookups and the seeded default layout

use crossroads_sim::simulation::{
    default_network, Arm, Axis, IntersectionId, IntersectionNode, Position, RoadNetwork, RoadSegment,
    INTERSECTION_SEPARATION,
};

fn node(index: usize, x: f64, y: f64) -> IntersectionNode {
    IntersectionNode::new(IntersectionId::new(index), x, y, false, Axis::EW)
}

fn pair_network() -> RoadNetwork {
    RoadNetwork::new(
        vec![node(0, 0.0, 0.0), node(1, 150.0, 0.0)],
        vec![RoadSegment::new(IntersectionId::new(0), Arm::E, IntersectionId::new(1), Arm::W)],
    )
    .unwrap()
}

#[test]
fn test_intersection_ids_display() {
    assert_eq!(IntersectionId::new(0).to_string(), "INT_A");
    assert_eq!(IntersectionId::new(2).to_string(), "INT_C");
    assert_eq!(IntersectionId::new(30).to_string(), "INT_30");
}

#[test]
fn test_connected_arm_both_directions() {
    let network = pair_network();
    let a = IntersectionId::new(0);
    let b = IntersectionId::new(1);

    assert_eq!(network.connected_arm(a, Arm::E), Some((b, Arm::W)));
    assert_eq!(network.connected_arm(b, Arm::W), Some((a, Arm::E)));
    assert_eq!(network.connected_arm(a, Arm::N), None);
    assert!(network.is_terminal(a, Arm::W));
    assert!(!network.is_terminal(a, Arm::E));
    assert_eq!(network.neighbors(a), vec![b]);
}

#[test]
fn test_terminal_arms_exclude_connections() {
    let network = pair_network();
    let terminals = network.terminal_arms();

    assert_eq!(terminals.len(), 6);
    assert!(!terminals.contains(&(IntersectionId::new(0), Arm::E)));
    assert!(!terminals.contains(&(IntersectionId::new(1), Arm::W)));
    assert!(terminals.contains(&(IntersectionId::new(1), Arm::E)));
}

#[test]
fn test_arm_spawn_positions_use_right_hand_lanes() {
    let network = RoadNetwork::new(vec![node(0, 10.0, 20.0)], vec![]).unwrap();
    let id = IntersectionId::new(0);

    let cases = [
        (Arm::W, Position::new(-40.0, 13.0), Position::new(1.0, 0.0)),
        (Arm::E, Position::new(60.0, 27.0), Position::new(-1.0, 0.0)),
        (Arm::N, Position::new(3.0, 70.0), Position::new(0.0, -1.0)),
        (Arm::S, Position::new(17.0, -30.0), Position::new(0.0, 1.0)),
    ];
    for (arm, expected_position, expected_heading) in cases {
        let (position, heading) = network.arm_spawn_position(id, arm, 50.0, 7.0).unwrap();
        assert_eq!(position, expected_position, "arm {}", arm);
        assert_eq!(heading, expected_heading, "arm {}", arm);
    }

    assert!(network
        .arm_spawn_position(IntersectionId::new(9), Arm::W, 50.0, 7.0)
        .is_none());
}

#[test]
fn test_arm_exit_positions() {
    let network = pair_network();
    let a = IntersectionId::new(0);

    // Connected arm ends at the neighbour's centre
    assert_eq!(network.arm_exit_position(a, Arm::E), Some(Position::new(150.0, 0.0)));
    // Terminal arm ends at the stub length
    assert_eq!(
        network.arm_exit_position(a, Arm::N),
        Some(Position::new(0.0, network.terminal_arm_length))
    );
}

#[test]
fn test_rejects_self_referential_segment() {
    let result = RoadNetwork::new(
        vec![node(0, 0.0, 0.0)],
        vec![RoadSegment::new(IntersectionId::new(0), Arm::E, IntersectionId::new(0), Arm::W)],
    );
    let error = result.unwrap_err().to_string();
    assert!(error.contains("itself"), "unexpected error: {}", error);
}

#[test]
fn test_rejects_arm_used_twice() {
    let result = RoadNetwork::new(
        vec![node(0, 0.0, 0.0), node(1, 150.0, 0.0), node(2, 0.0, 150.0)],
        vec![
            RoadSegment::new(IntersectionId::new(0), Arm::E, IntersectionId::new(1), Arm::W),
            RoadSegment::new(IntersectionId::new(0), Arm::E, IntersectionId::new(2), Arm::S),
        ],
    );
    assert!(result.is_err());
}

#[test]
fn test_rejects_unknown_and_duplicate_intersections() {
    let unknown = RoadNetwork::new(
        vec![node(0, 0.0, 0.0)],
        vec![RoadSegment::new(IntersectionId::new(0), Arm::E, IntersectionId::new(5), Arm::W)],
    );
    assert!(unknown.is_err());

    let duplicate = RoadNetwork::new(vec![node(0, 0.0, 0.0), node(0, 150.0, 0.0)], vec![]);
    assert!(duplicate.is_err());
}

#[test]
fn test_bounds_and_grid_info() {
    let network = pair_network();
    assert_eq!(network.grid_info(), (2, 2, 1));

    let ((min_x, max_x), (min_y, max_y)) = network.get_bounds(1280.0, 720.0, 50.0);
    assert!(min_x <= -50.0 && max_x >= 200.0);
    assert!(min_y <= -50.0 && max_y >= 50.0);
    // Widened vertically toward the screen aspect ratio
    assert!(max_y - min_y > 101.0);
}

#[test]
fn test_default_network_is_deterministic() {
    let first = default_network(42);
    let second = default_network(42);

    let first_nodes: Vec<IntersectionNode> = first.intersections().cloned().collect();
    let second_nodes: Vec<IntersectionNode> = second.intersections().cloned().collect();
    assert_eq!(first_nodes, second_nodes);
    assert_eq!(first.roads(), second.roads());
}

#[test]
fn test_default_network_shape() {
    for seed in 0..64 {
        let network = default_network(seed);
        let count = network.intersection_count();

        assert!((2..=9).contains(&count), "seed {}: {} intersections", seed, count);
        assert_eq!(count % 2, 0, "seed {}: odd intersection count {}", seed, count);
        assert!(network.is_connected(), "seed {}: disconnected", seed);
        assert!(!network.terminal_arms().is_empty(), "seed {}: no spawn arms", seed);
        assert_eq!(network.first_intersection_id(), Some(IntersectionId::new(0)));

        for road in network.roads() {
            let a = network.intersection(road.from_id).unwrap().center;
            let b = network.intersection(road.to_id).unwrap().center;
            assert!(
                (a.distance(&b) - INTERSECTION_SEPARATION).abs() < 1e-9,
                "seed {}: road between non-adjacent cells",
                seed
            );
            assert_eq!(road.from_arm.opposite(), road.to_arm);
        }

        if count > 2 {
            for (index, node) in network.intersections().enumerate() {
                assert_eq!(node.has_semaphore, index % 2 == 0, "seed {}", seed);
            }
        }
    }
}

#[test]
fn test_default_network_is_centred() {
    for seed in [1, 5, 9] {
        let network = default_network(seed);
        for node in network.intersections() {
            assert!(node.center.x.abs() <= INTERSECTION_SEPARATION, "seed {}", seed);
            assert!(node.center.y.abs() <= INTERSECTION_SEPARATION, "seed {}", seed);
        }
    }
}
