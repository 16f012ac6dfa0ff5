use super::*;
use crate::cli_args::RegistryArgs;
use crate::commands::load_world;

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should be monotonic")
        .as_nanos();
    std::env::temp_dir().join(format!("bh-cli-{}-{}.json", name, nanos))
}

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
        .to_string_lossy()
        .to_string()
}

fn registry(max_inherit_depth: usize) -> RegistryArgs {
    RegistryArgs {
        min_capacity: 16,
        max_inherit_depth,
    }
}

#[test]
fn load_world_resolves_fixture_references() {
    let world = load_world(&fixture("library.json"), &registry(255)).expect("world");
    let ok = world.find_object("home", Some(3001)).expect("ok button");
    let counter = world
        .find_object("LIBRARY", Some(2001))
        .expect("behavior button");
    let library = world.find_object("Library", None).expect("library stack");
    assert_eq!(world.behavior_chain(ok), vec![counter, library]);
    assert_eq!(world.behaviors().capacity(), 16);
}

#[test]
fn load_world_reports_missing_and_invalid_files() {
    let missing = temp_path("missing");
    let error = load_world(&missing.to_string_lossy(), &registry(255)).expect_err("missing");
    assert_eq!(error.code, "CLI_WORLD_READ");

    let invalid = temp_path("invalid");
    fs::write(&invalid, "{\"stacks\": [").expect("write");
    let error = load_world(&invalid.to_string_lossy(), &registry(255)).expect_err("invalid");
    assert_eq!(error.code, "CLI_WORLD_INVALID");
    let _ = fs::remove_file(invalid);
}

#[test]
fn cyclic_saved_references_hit_the_depth_guard() {
    let error = load_world(&fixture("cycle.json"), &registry(8)).expect_err("cycle");
    assert_eq!(error.code, "BEHAVIOR_INHERIT_DEPTH");
}

#[test]
fn invalid_registry_options_are_reported() {
    let args = RegistryArgs {
        min_capacity: 100,
        max_inherit_depth: 255,
    };
    let error = load_world(&fixture("library.json"), &args).expect_err("options");
    assert_eq!(error.code, "BEHAVIOR_OPTIONS");
}

#[test]
fn run_cli_from_args_maps_outcomes_to_exit_codes() {
    let world = fixture("library.json");
    assert_eq!(
        run_cli_from_args(["bh-cli", "inspect", "--world", world.as_str()]),
        0
    );
    assert_eq!(
        run_cli_from_args([
            "bh-cli",
            "send",
            "--world",
            world.as_str(),
            "--stack",
            "Home",
            "--id",
            "9999",
            "--message",
            "mouseUp",
        ]),
        1
    );
    assert_ne!(run_cli_from_args(["bh-cli", "explode"]), 0);
}
