//! Reaper specs

use crate::prelude::*;

#[test]
fn reap_with_nothing_stale() {
    let temp = Project::initialized();

    temp.relsem()
        .args(&["reap"])
        .passes()
        .stdout_has("No stale owners");
}

#[test]
fn reap_leaves_live_holder_alone() {
    let temp = Project::fast_heartbeats();
    let _holder = temp.spawn_hold(&["db-slots", "--capacity", "1"]);
    std::thread::sleep(FAST_GRACE_WINDOW);

    temp.relsem()
        .args(&["reap"])
        .passes()
        .stdout_has("No stale owners");
    temp.relsem()
        .args(&["pool", "show", "db-slots"])
        .passes()
        .stdout_has("Available: 0");
}

#[test]
fn reap_returns_permits_of_crashed_holder() {
    let temp = Project::fast_heartbeats();
    let holder = temp.spawn_hold(&["db-slots", "--permits", "2", "--capacity", "3"]);
    let owner = holder.owner.clone();
    holder.crash();
    std::thread::sleep(FAST_GRACE_WINDOW);

    temp.relsem()
        .args(&["reap"])
        .passes()
        .stdout_has("Stale owners: 1")
        .stdout_has(&format!("reclaimed 2 permits of db-slots from {}", owner))
        .stdout_has("Reclaimed 2 permits");

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
fn scoped_reap_keeps_heartbeat_of_owner_with_other_holdings() {
    let temp = Project::fast_heartbeats();
    let holder = temp.spawn_hold(&["db-slots", "--capacity", "1"]);
    holder.crash();
    std::thread::sleep(FAST_GRACE_WINDOW);

    temp.relsem()
        .args(&["reap", "--pool", "other"])
        .passes()
        .stdout_has("Reclaimed 0 permits");

    let run = temp
        .relsem()
        .args(&["--format", "json", "reap", "--pool", "db-slots"])
        .passes();
    let json = run.json();
    assert_eq!(json["reclaimed"][0]["semaphore"], "db-slots");
    assert_eq!(json["reclaimed"][0]["permits"], 1);
    assert_eq!(json["removed_owners"].as_array().map(Vec::len), Some(1));
}
