//! Schema installation specs

use crate::prelude::*;

#[test]
fn init_creates_the_tables() {
    let temp = Project::empty();

    temp.relsem()
        .args(&["init"])
        .passes()
        .stdout_has("Initialized")
        .stdout_has("OWNER_HEARTBEAT, SEMAPHORE_POOL, SEMAPHORE_LEDGER");

    assert!(temp.db().is_file());
}

#[test]
fn init_is_idempotent() {
    let temp = Project::initialized();

    temp.relsem().args(&["init"]).passes().stdout_has("Initialized");
}

#[test]
fn init_honors_custom_table_names() {
    let temp = Project::empty();
    let config = temp.file(
        "relsem.toml",
        "[schema]\nheartbeat_table = \"JOB_HEARTBEAT\"\npool_table = \"JOB_POOL\"\n",
    );

    let run = temp
        .relsem()
        .args(&["--format", "json", "init"])
        .env("RELSEM_CONFIG", &config)
        .passes();
    let json = run.json();
    assert_eq!(json["heartbeat_table"], "JOB_HEARTBEAT");
    assert_eq!(json["pool_table"], "JOB_POOL");
    assert_eq!(json["ledger_table"], "SEMAPHORE_LEDGER");
}
