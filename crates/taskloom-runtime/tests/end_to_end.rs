//! Full build -> reconstruct -> navigate flow over synthetic task
//! directories, exercising the cache persistence contract on the way.

use taskloom_runtime::{
    ArchiveReader, ArchiveWriter, BuildService, ReconstructService, SkeletonCache, TaskNavigator,
};
use taskloom_testing::{TaskFixture, TestWorld, task_id};

const T0: i64 = 1_735_732_800_000;
const HOUR_MS: i64 = 3_600_000;

fn seeded_world() -> TestWorld {
    let world = TestWorld::new();
    world
        .add_task(
            TaskFixture::new(task_id(1))
                .instruction("Bonjour, on démarre le chantier de refactoring complet")
                .delegates("architect", "Design the new module layout for the storage crate")
                .delegates("code", "Implement the reader half of the storage split")
                .created_at_ms(T0),
        )
        .unwrap();
    world
        .add_task(
            TaskFixture::new(task_id(2))
                .instruction("Design the new module layout for the storage crate")
                .created_at_ms(T0 + HOUR_MS)
                .completed(),
        )
        .unwrap();
    world
        .add_task(
            TaskFixture::new(task_id(3))
                .instruction("Implement the reader half of the storage split")
                .created_at_ms(T0 + 2 * HOUR_MS),
        )
        .unwrap();
    world
}

fn detector(world: &TestWorld) -> taskloom_providers::TaskDetector {
    taskloom_providers::TaskDetector::with_root(world.tasks_root())
}

#[test]
fn build_reconstruct_navigate() {
    let world = seeded_world();
    let mut cache = SkeletonCache::open(world.tasks_root()).unwrap();

    let summary = BuildService::new(&mut cache, detector(&world))
        .run(false, |_| {})
        .unwrap();
    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.built, 3);
    assert_eq!(summary.failed, 0);

    let summary = ReconstructService::new(
        &mut cache,
        taskloom_engine::ReconstructionConfig::default(),
    )
    .run(|_| {})
    .unwrap();
    assert_eq!(summary.pass2.resolved, 2);
    assert_eq!(summary.pass2.roots_detected, 1);

    let navigator = TaskNavigator::new(cache.skeletons());
    assert_eq!(navigator.parent(&task_id(2)).unwrap().task_id, task_id(1));
    assert_eq!(navigator.parent(&task_id(3)).unwrap().task_id, task_id(1));
    assert_eq!(navigator.children(&task_id(1)).len(), 2);
    assert_eq!(navigator.subtree(&task_id(1), 5).len(), 3);

    // The completed child carries its completion marker through
    assert!(cache.get(&task_id(2)).unwrap().is_completed);
}

#[test]
fn second_build_is_incremental() {
    let world = seeded_world();
    let mut cache = SkeletonCache::open(world.tasks_root()).unwrap();
    BuildService::new(&mut cache, detector(&world))
        .run(false, |_| {})
        .unwrap();
    ReconstructService::new(
        &mut cache,
        taskloom_engine::ReconstructionConfig::default(),
    )
    .run(|_| {})
    .unwrap();

    // Reconstruction marked phase1_done; the next build run skips all
    let summary = BuildService::new(&mut cache, detector(&world))
        .run(false, |_| {})
        .unwrap();
    assert_eq!(summary.built, 0);
    assert_eq!(summary.unchanged, 3);

    // A forced run rebuilds everything
    let summary = BuildService::new(&mut cache, detector(&world))
        .run(true, |_| {})
        .unwrap();
    assert_eq!(summary.built, 3);
}

#[test]
fn reconstruction_survives_cache_reopen() {
    let world = seeded_world();
    {
        let mut cache = SkeletonCache::open(world.tasks_root()).unwrap();
        BuildService::new(&mut cache, detector(&world))
            .run(false, |_| {})
            .unwrap();
        ReconstructService::new(
            &mut cache,
            taskloom_engine::ReconstructionConfig::default(),
        )
        .run(|_| {})
        .unwrap();
    }

    // A fresh process sees the persisted reconstructed parents
    let cache = SkeletonCache::open(world.tasks_root()).unwrap();
    assert_eq!(
        cache.get(&task_id(2)).unwrap().reconstructed_parent_id.as_deref(),
        Some(task_id(1).as_str())
    );
}

#[test]
fn archive_round_trip_through_cache() {
    let world = seeded_world();
    let mut cache = SkeletonCache::open(world.tasks_root()).unwrap();
    BuildService::new(&mut cache, detector(&world))
        .run(false, |_| {})
        .unwrap();

    let archive_dir = world.temp_dir().join("archives");
    let writer = ArchiveWriter::new(&archive_dir, "machine-1", "host-1");
    writer.write(cache.get(&task_id(2)).unwrap()).unwrap();

    let reader = ArchiveReader::new(&archive_dir);
    let archived = reader.find(&task_id(2)).unwrap().unwrap();
    assert_eq!(archived.task_id, task_id(2));
    assert!(!archived.messages.is_empty());
    assert_eq!(reader.list().unwrap().len(), 1);
}
