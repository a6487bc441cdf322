use std::process::Command;

fn run_headless(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "--"])
        .args(args)
        .env("RUST_LOG", "warn,crossroads_sim=info")
        .output()
        .expect("Failed to execute simulation")
}

/// Test that the simulation runs in headless mode and finishes its scenario
#[test]
fn test_headless_simulation_completes() {
    let output = run_headless(&["--cars", "4", "--seed", "7"]);

    assert!(
        output.status.success(),
        "Simulation failed to run in headless mode. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("SIMULATION COMPLETE"),
        "Simulation did not complete properly. stderr: {}",
        stderr
    );
    assert!(stderr.contains("Finished: true"), "Scenario did not finish");

    // Format: "[2026-01-01T00:00:00Z INFO  crossroads_sim] Cars parked: 4/4"
    let parked_line = stderr
        .lines()
        .find(|line| line.contains("Cars parked:"))
        .expect("Could not find 'Cars parked' line");
    let parts: Vec<&str> = parked_line.split("Cars parked:").collect();
    let counts: Vec<u32> = parts
        .get(1)
        .map(|s| s.trim().split('/').filter_map(|n| n.trim().parse().ok()).collect())
        .unwrap_or_default();
    assert_eq!(counts, vec![4, 4], "Unexpected parked count: {}", parked_line);
}

/// Test that simulation statistics are logged
#[test]
fn test_simulation_statistics_logged() {
    let output = run_headless(&["--cars", "3", "--scenarios", "2"]);
    assert!(output.status.success(), "Simulation failed to run");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(
        stderr.matches("SIMULATION COMPLETE").count(),
        2,
        "Expected one summary per scenario. stderr: {}",
        stderr
    );
    for statistic in [
        "Simulated time:",
        "Intersection transitions:",
        "Safety interventions:",
        "Collision resolutions:",
        "Minimum pair distance:",
    ] {
        assert!(stderr.contains(statistic), "Missing '{}' statistic", statistic);
    }
    assert!(stderr.contains("Scenario: 2"), "Second scenario was not run");
}

/// Test that a missing policy file is reported as an error
#[test]
fn test_missing_policy_file_fails() {
    let output = run_headless(&["--policy", "does/not/exist.json"]);
    assert!(!output.status.success(), "Missing policy file was accepted");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Failed to read policy file"),
        "Unexpected error output: {}",
        stderr
    );
}
