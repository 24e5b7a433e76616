//! Hold (acquire, heartbeat, release) specs

use crate::prelude::*;

#[test]
fn hold_for_a_duration_then_release() {
    let temp = Project::empty();

    temp.relsem()
        .args(&[
            "hold", "db-slots", "--permits", "2", "--capacity", "3", "--duration", "200ms",
        ])
        .passes()
        .stdout_has("Holding 2 permits of db-slots as");

    temp.relsem()
        .args(&["pool", "show", "db-slots"])
        .passes()
        .stdout_has("Available: 3")
        .stdout_has("Holders: none");
    temp.relsem()
        .args(&["heartbeats"])
        .passes()
        .stdout_has("No heartbeats");
}

#[test]
fn hold_reads_capacity_of_existing_pool() {
    let temp = Project::empty();
    temp.relsem()
        .args(&["pool", "create", "db-slots", "--permits", "2"])
        .passes();

    temp.relsem()
        .args(&["hold", "db-slots", "--permits", "2", "--duration", "10ms"])
        .passes()
        .stdout_has("Holding 2 permits");
}

#[test]
fn hold_times_out_when_pool_is_exhausted() {
    let temp = Project::empty();
    let _holder = temp.spawn_hold(&["db-slots", "--capacity", "1"]);

    temp.relsem()
        .args(&["hold", "db-slots", "--timeout", "300ms"])
        .fails()
        .stderr_has("Could not acquire permits of 'db-slots'")
        .stderr_has("timed out")
        .stderr_has("relsem reap");
}

#[test]
fn hold_with_wrong_capacity_conflicts() {
    let temp = Project::empty();
    temp.relsem()
        .args(&["pool", "create", "db-slots", "--permits", "2"])
        .passes();

    temp.relsem()
        .args(&["hold", "db-slots", "--capacity", "5", "--duration", "10ms"])
        .fails()
        .stderr_has("already exists with 2 permits")
        .stderr_has("Use --capacity 2");
}

#[test]
fn hold_recovers_permits_of_crashed_holder() {
    let temp = Project::fast_heartbeats();
    let holder = temp.spawn_hold(&["db-slots", "--capacity", "1"]);
    holder.crash();

    // Contention reaping frees the permit once the grace window passes
    temp.relsem()
        .args(&["hold", "db-slots", "--timeout", "5s", "--duration", "10ms"])
        .passes()
        .stdout_has("Holding 1 permits of db-slots");
}

#[test]
fn hold_as_json() {
    let temp = Project::empty();

    let run = temp
        .relsem()
        .args(&[
            "--format", "json", "hold", "db-slots", "--capacity", "1", "--duration", "10ms",
        ])
        .passes();
    let json = run.json();
    assert_eq!(json["semaphore"], "db-slots");
    assert_eq!(json["permits"], 1);
    assert!(json["owner"].as_str().is_some_and(|o| o.starts_with("pid-")));
}
