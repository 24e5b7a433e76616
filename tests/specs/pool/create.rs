//! Pool creation and listing specs

use crate::prelude::*;

#[test]
fn create_reports_capacity() {
    let temp = Project::empty();

    temp.relsem()
        .args(&["pool", "create", "db-slots", "--permits", "4"])
        .passes()
        .stdout_has("Semaphore db-slots ready with 4 permits");
}

#[test]
fn create_is_idempotent_for_same_capacity() {
    let temp = Project::empty();
    temp.relsem()
        .args(&["pool", "create", "db-slots", "--permits", "4"])
        .passes();

    temp.relsem()
        .args(&["pool", "create", "db-slots", "--permits", "4"])
        .passes()
        .stdout_has("ready with 4 permits");
}

#[test]
fn create_with_other_capacity_conflicts() {
    let temp = Project::empty();
    temp.relsem()
        .args(&["pool", "create", "db-slots", "--permits", "4"])
        .passes();

    temp.relsem()
        .args(&["pool", "create", "db-slots", "--permits", "5"])
        .fails()
        .stderr_has("already exists with 4 permits");
}

#[test]
fn list_is_empty_on_fresh_database() {
    let temp = Project::empty();

    temp.relsem()
        .args(&["pool", "list"])
        .passes()
        .stdout_has("No semaphores");
}

#[test]
fn list_shows_every_pool() {
    let temp = Project::empty();
    temp.relsem()
        .args(&["pool", "create", "alpha", "--permits", "2"])
        .passes();
    temp.relsem()
        .args(&["pool", "create", "beta", "--permits", "7"])
        .passes();

    temp.relsem()
        .args(&["pool", "list"])
        .passes()
        .stdout_has("NAME")
        .stdout_has("alpha")
        .stdout_has("beta");
}

#[test]
fn list_as_json() {
    let temp = Project::empty();
    temp.relsem()
        .args(&["pool", "create", "alpha", "--permits", "2"])
        .passes();

    let run = temp
        .relsem()
        .args(&["--format", "json", "pool", "list"])
        .passes();
    let json = run.json();
    assert_eq!(json[0]["name"], "alpha");
    assert_eq!(json[0]["total_permits"], 2);
    assert_eq!(json[0]["available_permits"], 2);
}
