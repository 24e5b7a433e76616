//! Error reporting specs

use crate::prelude::*;

#[test]
fn unknown_pool_suggests_creating_it() {
    let temp = Project::initialized();

    temp.relsem()
        .args(&["pool", "show", "db-slots"])
        .fails()
        .stderr_has("'db-slots' not found")
        .stderr_has("relsem pool create db-slots --permits <n>");
}

#[test]
fn hold_on_new_pool_needs_capacity() {
    let temp = Project::initialized();

    temp.relsem()
        .args(&["hold", "db-slots"])
        .fails()
        .stderr_has("does not exist yet")
        .stderr_has("--capacity <total>");
}

#[test]
fn zero_permits_are_rejected() {
    let temp = Project::empty();

    temp.relsem()
        .args(&["pool", "create", "db-slots", "--permits", "0"])
        .fails();
    temp.relsem()
        .args(&["hold", "db-slots", "--permits", "0", "--capacity", "1"])
        .fails();
}

#[test]
fn invalid_config_is_reported() {
    let temp = Project::empty();
    let config = temp.file("bad.toml", "[heartbeat]\ngrace_multiplier = 1\n");

    temp.relsem()
        .args(&["init"])
        .env("RELSEM_CONFIG", &config)
        .fails()
        .stderr_has("failed to load config")
        .stderr_has("grace_multiplier must be at least 2");
}

#[test]
fn reap_rejects_grace_below_two() {
    let temp = Project::initialized();

    temp.relsem()
        .args(&["reap", "--grace", "1"])
        .fails()
        .stderr_has("--grace must be at least 2");
}
