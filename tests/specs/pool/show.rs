//! Pool detail specs

use crate::prelude::*;

#[test]
fn show_fresh_pool_has_no_holders() {
    let temp = Project::empty();
    temp.relsem()
        .args(&["pool", "create", "db-slots", "--permits", "3"])
        .passes();

    temp.relsem()
        .args(&["pool", "show", "db-slots"])
        .passes()
        .stdout_has("Total: 3")
        .stdout_has("Available: 3")
        .stdout_has("Holders: none")
        .stdout_has("Accounting: consistent");
}

#[test]
fn show_lists_a_live_holder() {
    let temp = Project::empty();
    let holder = temp.spawn_hold(&["db-slots", "--permits", "2", "--capacity", "3"]);

    temp.relsem()
        .args(&["pool", "show", "db-slots"])
        .passes()
        .stdout_has("Available: 1")
        .stdout_has(&holder.owner)
        .stdout_has("Accounting: consistent");
}

#[test]
fn show_as_json_includes_ledger() {
    let temp = Project::empty();
    let holder = temp.spawn_hold(&["db-slots", "--capacity", "2"]);

    let run = temp
        .relsem()
        .args(&["--format", "json", "pool", "show", "db-slots"])
        .passes();
    let json = run.json();
    assert_eq!(json["pool"]["available_permits"], 1);
    assert_eq!(json["ledger"][0]["owner"], holder.owner.as_str());
    assert_eq!(json["ledger"][0]["held_permits"], 1);
    assert_eq!(json["consistent"], true);
}
