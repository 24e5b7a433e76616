//! Heartbeat listing specs

use crate::prelude::*;

#[test]
fn no_heartbeats_on_fresh_database() {
    let temp = Project::empty();

    temp.relsem()
        .args(&["heartbeats"])
        .passes()
        .stdout_has("No heartbeats");
}

#[test]
fn live_holder_has_a_live_heartbeat() {
    let temp = Project::fast_heartbeats();
    let holder = temp.spawn_hold(&["db-slots", "--capacity", "1"]);

    temp.relsem()
        .args(&["heartbeats"])
        .passes()
        .stdout_has(&holder.owner)
        .stdout_has("live");
}

#[test]
fn crashed_holder_goes_stale() {
    let temp = Project::fast_heartbeats();
    let holder = temp.spawn_hold(&["db-slots", "--capacity", "1"]);
    let owner = holder.owner.clone();
    holder.crash();
    std::thread::sleep(FAST_GRACE_WINDOW);

    let run = temp
        .relsem()
        .args(&["--format", "json", "heartbeats"])
        .passes();
    let json = run.json();
    assert_eq!(json[0]["owner"], owner.as_str());
    assert_eq!(json[0]["interval_millis"], 100);
    assert_eq!(json[0]["stale"], true);
}
