//! Help output specs

use crate::prelude::*;

#[test]
fn help_lists_every_command() {
    let temp = Project::empty();

    temp.relsem()
        .args(&["--help"])
        .passes()
        .stdout_has("init")
        .stdout_has("pool")
        .stdout_has("heartbeats")
        .stdout_has("reap")
        .stdout_has("hold")
        .stdout_has("completions");
}

#[test]
fn hold_help_shows_timeout_and_capacity() {
    let temp = Project::empty();

    temp.relsem()
        .args(&["hold", "--help"])
        .passes()
        .stdout_has("--timeout")
        .stdout_has("--capacity")
        .stdout_has("--permits");
}

#[test]
fn completions_generate_for_bash() {
    let temp = Project::empty();

    temp.relsem()
        .args(&["completions", "bash"])
        .passes()
        .stdout_has("relsem");
}
