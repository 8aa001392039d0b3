//! CLI smoke tests through the real binary in an isolated world.

use taskloom_testing::{TaskFixture, TestWorld, task_id};

const T0: i64 = 1_735_732_800_000;

fn seeded_world() -> TestWorld {
    let world = TestWorld::new();
    world
        .add_task(
            TaskFixture::new(task_id(1))
                .instruction("Hello, please coordinate the documentation overhaul")
                .delegates("code", "Rewrite the getting-started guide with runnable examples")
                .created_at_ms(T0),
        )
        .unwrap();
    world
        .add_task(
            TaskFixture::new(task_id(2))
                .instruction("Rewrite the getting-started guide with runnable examples")
                .created_at_ms(T0 + 3_600_000),
        )
        .unwrap();
    world
}

#[test]
fn scan_lists_discovered_tasks() {
    let world = seeded_world();
    let result = world.run(&["scan"]).unwrap();
    assert!(result.success(), "stderr: {}", result.stderr());
    assert!(result.stdout().contains(&task_id(1)));
    assert!(result.stdout().contains("2 task directories"));
}

#[test]
fn build_then_list_and_show() {
    let world = seeded_world();
    assert!(world.run(&["build"]).unwrap().success());

    let list = world.run(&["list"]).unwrap();
    assert!(list.success());
    assert!(list.stdout().contains("2 skeletons"));

    let show = world.run(&["show", &task_id(1)]).unwrap();
    assert!(show.success());
    assert!(show.stdout().contains("delegations:"));
}

#[test]
fn reconstruct_builds_the_tree() {
    let world = seeded_world();
    assert!(world.run(&["build"]).unwrap().success());

    let reconstruct = world.run(&["reconstruct"]).unwrap();
    assert!(reconstruct.success(), "stderr: {}", reconstruct.stderr());
    assert!(reconstruct.stdout().contains("1 resolved"));

    let tree = world.run(&["tree"]).unwrap();
    assert!(tree.success());
    // The child renders indented under its reconstructed parent
    let indented_child = format!("  {}", task_id(2));
    assert!(tree.stdout().contains(&indented_child));
}

#[test]
fn scan_json_output_is_parseable() {
    let world = seeded_world();
    let result = world.run(&["--format", "json", "scan"]).unwrap();
    assert!(result.success());
    let value = result.json().unwrap();
    assert_eq!(value.as_array().unwrap().len(), 2);
}

#[test]
fn index_dry_run_prints_decisions_offline() {
    let world = seeded_world();
    assert!(world.run(&["build"]).unwrap().success());

    let result = world.run(&["index", "--dry-run"]).unwrap();
    assert!(result.success(), "stderr: {}", result.stderr());
    assert!(result.stdout().contains("would be indexed"));
    assert!(result.stdout().contains("never indexed"));
}

#[test]
fn doctor_reports_unbuilt_tasks() {
    let world = seeded_world();
    let before = world.run(&["doctor"]).unwrap();
    assert!(before.success());
    assert!(before.stdout().contains("not yet built (2)"));

    assert!(world.run(&["build"]).unwrap().success());
    let after = world.run(&["doctor"]).unwrap();
    assert!(after.success());
    assert!(!after.stdout().contains("not yet built"));
}

#[test]
fn archive_write_list_and_import() {
    let world = seeded_world();
    assert!(world.run(&["build"]).unwrap().success());

    let dir = world.temp_dir().join("archives");
    let dir_arg = dir.to_string_lossy().to_string();
    assert!(
        world
            .run(&["archive", "write", &task_id(1), "--dir", &dir_arg])
            .unwrap()
            .success()
    );

    let listing = world.run(&["archive", "list", "--dir", &dir_arg]).unwrap();
    assert!(listing.success());
    assert!(listing.stdout().contains("1 archives"));

    // Import refuses to clobber an existing local skeleton
    let clash = world
        .run(&["archive", "import", &task_id(1), "--dir", &dir_arg])
        .unwrap();
    assert!(!clash.success());
    assert!(clash.stderr().contains("already has a local skeleton"));
}

#[test]
fn cache_stats_reports_counts() {
    let world = seeded_world();
    assert!(world.run(&["build"]).unwrap().success());

    let stats = world.run(&["cache", "stats"]).unwrap();
    assert!(stats.success());
    assert!(stats.stdout().contains("skeletons             2"));
}
