//! Action-execution tests: versioned TTL mutations, RDF-level diffs,
//! derived SPARQL updates, and per-step logs over the Adairsville fixture.

mod common;

use seshat::error::SeshatError;
use seshat::ttl;

use common::loaded_engine;

#[test]
fn move_action_versions_diffs_and_updates_the_store() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut engine = loaded_engine(tmp.path());
    assert_eq!(engine.executed_action_count(), 0);

    let log = engine
        .execute_action("(move robot1 corridor_14 door_9)")
        .unwrap();
    assert_eq!(log.status, "success");
    assert_eq!(log.action_number, 1);
    assert_eq!(engine.executed_action_count(), 1);

    // the version chain grew by exactly one pair
    let world_dir = &engine.paths().world_dir;
    assert!(world_dir.join("dynamic_0.ttl").exists());
    assert!(world_dir.join("dynamic_1.ttl").exists());
    assert!(world_dir.join("static_1.ttl").exists());
    assert!(!world_dir.join("dynamic_2.ttl").exists());

    // RDF-level diff is exactly the one changed triple
    let (added, removed) = ttl::diff(
        &world_dir.join("dynamic_0.ttl"),
        &world_dir.join("dynamic_1.ttl"),
    )
    .unwrap();
    assert_eq!(added.len(), 1);
    assert_eq!(removed.len(), 1);
    let removed_triple = removed.iter().next().unwrap();
    assert!(removed_triple.subject.ends_with("robot1"));
    assert!(removed_triple.predicate.ends_with("robotIsInSpace"));
    let added_triple = added.iter().next().unwrap();
    assert!(matches!(
        &added_triple.object,
        ttl::ObjectTerm::Iri(iri) if iri.ends_with("door_9")
    ));

    // static copied verbatim
    assert_eq!(
        std::fs::read_to_string(world_dir.join("static_0.ttl")).unwrap(),
        std::fs::read_to_string(world_dir.join("static_1.ttl")).unwrap()
    );

    // the log records the action, files, and triple counts
    let log_json: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(engine.paths().log_dir.join("1.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(log_json["status"], "success");
    assert_eq!(log_json["action"]["robot"], "robot1");
    assert_eq!(log_json["action"]["from_location"], "corridor_14");
    assert_eq!(log_json["action"]["to_location"], "door_9");
    assert_eq!(log_json["updates"]["relationships"]["removed"], 1);
    assert_eq!(log_json["updates"]["relationships"]["added"], 1);
    assert_eq!(
        log_json["updates"]["ttl_files"]["updated"]["dynamic"],
        "dynamic_1.ttl"
    );

    // the store reflects the move
    let rows = engine
        .world()
        .execute_sparql_select("SELECT ?loc WHERE { :robot1 :robotIsInSpace ?loc }")
        .unwrap();
    assert_eq!(rows.count, 1);
    assert_eq!(rows.results[0][0].value, "door_9");

    // no residual projection edges toward the old location
    let projection = engine.projection();
    assert!(projection
        .objects_of("robot1", &["robotIsInSpace", "objectIsInSpace", "isInSpace"])
        .iter()
        .all(|t| t != "corridor_14"));
}

#[test]
fn sequential_moves_build_a_contiguous_version_chain() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut engine = loaded_engine(tmp.path());

    engine
        .execute_action("(move robot1 corridor_14 door_9)")
        .unwrap();
    engine
        .execute_action("(move robot1 door_9 kitchen_13)")
        .unwrap();
    assert_eq!(engine.executed_action_count(), 2);

    let world_dir = &engine.paths().world_dir;
    for n in 0..=2 {
        assert!(world_dir.join(format!("dynamic_{n}.ttl")).exists());
        assert!(world_dir.join(format!("static_{n}.ttl")).exists());
    }
    assert_eq!(ttl::next_version(world_dir, "dynamic"), 3);

    let rows = engine
        .world()
        .execute_sparql_select("SELECT ?loc WHERE { :robot1 :robotIsInSpace ?loc }")
        .unwrap();
    assert_eq!(rows.results[0][0].value, "kitchen_13");

    // each transition changed only its one triple
    for n in 0..2usize {
        let (added, removed) = ttl::diff(
            &world_dir.join(format!("dynamic_{n}.ttl")),
            &world_dir.join(format!("dynamic_{}.ttl", n + 1)),
        )
        .unwrap();
        assert_eq!(added.len(), 1, "transition {n}");
        assert_eq!(removed.len(), 1, "transition {n}");
    }
}

#[test]
fn failed_action_writes_a_failed_log_and_halts() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut engine = loaded_engine(tmp.path());

    // the robot is not in the kitchen, so the rewrite finds nothing
    let err = engine
        .execute_action("(move robot1 kitchen_13 door_9)")
        .unwrap_err();
    assert!(matches!(err, SeshatError::Action(_)));
    assert_eq!(engine.executed_action_count(), 0);

    let log_json: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(engine.paths().log_dir.join("1.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(log_json["status"], "failed");
    assert!(log_json["error"].as_str().unwrap().contains("rewrite"));

    // no new version was committed
    assert!(!engine.paths().world_dir.join("dynamic_1.ttl").exists());
}

#[test]
fn unsupported_action_is_rejected() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut engine = loaded_engine(tmp.path());
    let err = engine
        .execute_action("(pickup robot1 cup_6 left_hand)")
        .unwrap_err();
    assert!(matches!(err, SeshatError::Action(_)));
    assert_eq!(engine.executed_action_count(), 0);
}

#[test]
fn run_plan_file_executes_in_order() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut engine = loaded_engine(tmp.path());

    let plan_path = tmp.path().join("solution.plan");
    std::fs::write(
        &plan_path,
        "(move robot1 corridor_14 opening_2)\n\
         (move robot1 opening_2 living_room_23)\n\
         ; cost = 2 (unit cost)\n",
    )
    .unwrap();

    let logs = engine.run_plan_file(&plan_path).unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(engine.executed_action_count(), 2);

    let rows = engine
        .world()
        .execute_sparql_select("SELECT ?loc WHERE { :robot1 :robotIsInSpace ?loc }")
        .unwrap();
    assert_eq!(rows.results[0][0].value, "living_room_23");
}

#[test]
fn executor_resumes_version_counter_across_engines() {
    let tmp = tempfile::TempDir::new().unwrap();
    {
        let mut engine = loaded_engine(tmp.path());
        engine
            .execute_action("(move robot1 corridor_14 door_9)")
            .unwrap();
    }

    // a fresh engine over the same root picks up at version 1; the store
    // itself is reloaded from the latest versioned files on disk
    let config = common::test_config();
    let mut engine = seshat::engine::Engine::boot(config, tmp.path()).unwrap();
    let world_dir = engine.paths().world_dir.clone();
    engine
        .world_mut()
        .load_from_ttl(&world_dir.join("static_1.ttl"))
        .unwrap();
    engine
        .world_mut()
        .load_from_ttl(&world_dir.join("dynamic_1.ttl"))
        .unwrap();
    assert_eq!(engine.executed_action_count(), 1);

    engine
        .execute_action("(move robot1 door_9 kitchen_13)")
        .unwrap();
    assert!(engine.paths().world_dir.join("dynamic_2.ttl").exists());
}
