//! End-to-end tests over the Adairsville fixture environment: boot, load,
//! reason, project, query, synthesize, and mutate through SPARQL.

mod common;

use std::collections::BTreeMap;

use seshat::config::Config;
use seshat::engine::Engine;
use seshat::error::{EmbeddingError, PlanError, SeshatError, SparqlError};
use seshat::plan::Synthesizer;
use seshat::projection::vector::cosine_similarity;
use seshat::world::IndividualData;

use common::{loaded_engine, write_embedding_caches, write_project};

#[test]
fn boot_and_idle_status() {
    let tmp = tempfile::TempDir::new().unwrap();
    let engine = loaded_engine(tmp.path());

    let status = engine.status();
    assert_eq!(status.status, "running");
    assert_eq!(status.env_id.as_deref(), Some("Adairsville"));
    // at minimum: robot + two hands + the spaces + the artifacts
    let num_spaces = 4;
    let num_artifacts = 7;
    assert!(status.individuals_count >= 1 + num_spaces + num_artifacts + 2);
    assert!(status.individuals.contains(&"robot1".to_string()));
}

#[test]
fn projection_labels_carry_superclasses() {
    let tmp = tempfile::TempDir::new().unwrap();
    let engine = loaded_engine(tmp.path());
    let projection = engine.projection();

    let door_labels = projection.labels_of("door_9");
    for expected in ["Individual", "Door", "Portal", "Location"] {
        assert!(
            door_labels.contains(&expected.to_string()),
            "door_9 missing label {expected}: {door_labels:?}"
        );
    }

    let robot_labels = projection.labels_of("robot1");
    assert!(robot_labels.contains(&"Robot".to_string()));
}

#[test]
fn reasoner_derives_subproperty_inverse_and_chain_edges() {
    let tmp = tempfile::TempDir::new().unwrap();
    let engine = loaded_engine(tmp.path());
    let projection = engine.projection();

    // asserted
    assert_eq!(
        projection.objects_of("robot1", &["robotIsInSpace"]),
        vec!["corridor_14".to_string()]
    );
    // subproperty
    assert!(projection
        .objects_of("robot1", &["objectIsInSpace"])
        .contains(&"corridor_14".to_string()));
    // inverse
    assert!(projection
        .objects_of("corridor_14", &["spaceHasObject"])
        .contains(&"robot1".to_string()));
    // chain: objectIsInSpace ∘ spaceIsInStorey
    assert!(projection
        .objects_of("robot1", &["isInStorey"])
        .contains(&"floor_1".to_string()));
    // container chain feeds the same machinery for artifacts
    assert!(projection
        .objects_of("tv_52", &["isInStorey"])
        .contains(&"floor_1".to_string()));
}

#[test]
fn batch_add_then_sparql_select() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut engine = loaded_engine(tmp.path());

    let cup: IndividualData = serde_json::from_value(serde_json::json!({
        "id": "cup_X",
        "class": "Artifact",
        "data_properties": { "category": "cup" },
        "object_properties": { "objectIsInSpace": ["kitchen_13"] }
    }))
    .unwrap();

    let report = engine.world_mut().add_individuals_batch(vec![cup]).unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.failed, 0);

    let response = engine
        .world()
        .execute_sparql_select(
            "SELECT ?s ?o WHERE { ?s :objectIsInSpace ?o . FILTER(?s = :cup_X) }",
        )
        .unwrap();
    assert_eq!(response.count, 1);
    assert_eq!(response.results[0][0].value, "cup_X");
    assert_eq!(response.results[0][1].value, "kitchen_13");
}

#[test]
fn duplicate_add_is_rejected_with_store_unchanged() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut engine = loaded_engine(tmp.path());
    let before = engine.world().individuals_count();

    let duplicate = IndividualData {
        id: "tv_52".to_string(),
        class: "Artifact".to_string(),
        data_properties: BTreeMap::new(),
        object_properties: BTreeMap::new(),
    };
    let err = engine.world_mut().add_individual(duplicate, true).unwrap_err();
    assert!(matches!(err, SeshatError::World(_)));
    assert_eq!(engine.world().individuals_count(), before);
}

#[test]
fn goal_to_problem_over_adairsville() {
    let tmp = tempfile::TempDir::new().unwrap();
    let engine = loaded_engine(tmp.path());
    let projection = engine.projection();

    let synthesizer = Synthesizer::new(&projection, engine.domain());
    let result = synthesizer
        .synthesize(
            "(and (isON tv_52) (robotIsInSpace robot1 living_room_23))",
            None,
            "tv_goal",
        )
        .unwrap();

    // goal objects present
    for id in ["tv_52", "robot1", "living_room_23"] {
        assert!(result.types_map.contains_key(id), "missing {id}");
    }
    // every Space/Portal on the shortest corridor→living-room path
    for id in ["corridor_14", "opening_2"] {
        assert!(result.types_map.contains_key(id), "missing path node {id}");
    }
    let text = &result.problem_text;
    assert!(text.contains("(artifactIsOnFloorOf tv_52 living_room_23)"));
    assert!(text.contains("(Affordance_Power tv_52)"));
    assert!(text.contains("(robotIsInSpace robot1 corridor_14)"));
    assert!(text.contains("(hasHand robot1 left_hand)"));
    assert!(text.contains("(= (distance corridor_14 living_room_23) 2)"));
    // open kitchen door is a fact, the closed bedroom door is not
    assert!(!text.contains("(isOpenDoor door_3)"));
    assert!(text.contains("(:metric minimize (total-cost))"));
}

#[test]
fn goal_with_unknown_object_is_a_hard_error() {
    let tmp = tempfile::TempDir::new().unwrap();
    let engine = loaded_engine(tmp.path());
    let projection = engine.projection();
    let synthesizer = Synthesizer::new(&projection, engine.domain());

    let err = synthesizer
        .synthesize("(isON hologram_99)", None, "x")
        .unwrap_err();
    assert!(matches!(err, PlanError::UnknownObject { .. }));
}

#[test]
fn sparql_update_with_inferred_cleanup() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut engine = loaded_engine(tmp.path());

    let ns = common::NS;
    let update = format!(
        "DELETE {{ <{ns}robot1> <{ns}robotIsInSpace> <{ns}corridor_14> . }}\n\
         INSERT {{ <{ns}robot1> <{ns}robotIsInSpace> <{ns}kitchen_13> . }}\n\
         WHERE {{ }}"
    );
    engine.world_mut().execute_sparql_update(&update).unwrap();

    let projection = engine.projection();
    // no residual edge to the old location under any spatial predicate
    for predicate in ["robotIsInSpace", "objectIsInSpace", "isInSpace"] {
        assert!(
            !projection
                .objects_of("robot1", &[predicate])
                .contains(&"corridor_14".to_string()),
            "stale {predicate} edge to corridor_14"
        );
    }
    assert!(!projection
        .objects_of("corridor_14", &["spaceHasObject"])
        .contains(&"robot1".to_string()));
    // the new location is fully derived
    assert!(projection
        .objects_of("robot1", &["robotIsInSpace"])
        .contains(&"kitchen_13".to_string()));
    assert!(projection
        .objects_of("kitchen_13", &["spaceHasObject"])
        .contains(&"robot1".to_string()));

    let rows = engine
        .world()
        .execute_sparql_select("SELECT ?loc WHERE { :robot1 :robotIsInSpace ?loc }")
        .unwrap();
    assert_eq!(rows.count, 1);
    assert_eq!(rows.results[0][0].value, "kitchen_13");
}

#[test]
fn malformed_sparql_update_leaves_store_unchanged() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut engine = loaded_engine(tmp.path());

    let err = engine
        .world_mut()
        .execute_sparql_update("DELETE { ?s ?p ?o . } WHERE { }")
        .unwrap_err();
    assert!(matches!(
        err,
        SeshatError::Sparql(SparqlError::UnsupportedShape { .. })
    ));

    // robot still where it was
    let rows = engine
        .world()
        .execute_sparql_select("SELECT ?loc WHERE { :robot1 :robotIsInSpace ?loc }")
        .unwrap();
    assert_eq!(rows.results[0][0].value, "corridor_14");
}

#[test]
fn query_tools_over_loaded_world() {
    let tmp = tempfile::TempDir::new().unwrap();
    let engine = loaded_engine(tmp.path());

    let records = engine.with_query_tools(|tools| {
        tools.get_object_info(&["cup_6".to_string(), "robot1".to_string()])
    });
    assert_eq!(records.len(), 2);
    let cup = &records[0];
    assert_eq!(cup["category"], "cup");
    assert_eq!(cup["isInSpace"], "kitchen_13");
    assert!(!cup.contains_key("affords"));
    let robot = &records[1];
    assert_eq!(robot["isInSpace"], "corridor_14");
    assert_eq!(robot["isInStorey"], "floor_1");

    let couches = engine.with_query_tools(|tools| {
        tools.filter_objects(
            Some("Artifact"),
            Some("couch"),
            &BTreeMap::new(),
            &BTreeMap::new(),
        )
    });
    assert_eq!(couches.len(), 1);
    assert_eq!(couches[0]["id"], "couch_32");

    // artifact endpoints resolve to their containing spaces
    let path = engine
        .with_query_tools(|tools| tools.find_path("robot1", "tv_52"))
        .unwrap();
    assert_eq!(path.path.first().unwrap().id, "corridor_14");
    assert_eq!(path.path.last().unwrap().id, "living_room_23");
    assert_eq!(path.cost, 2);
}

#[test]
fn embedding_caches_load_and_index_builds() {
    let tmp = tempfile::TempDir::new().unwrap();
    write_project(tmp.path());
    write_embedding_caches(tmp.path());

    let config: Config = toml::from_str(
        r#"
active_env = "Adairsville"

[embedding]
generate = false

[embedding.category]
model = "text-embedding-3-small"
dimensions = 4

[embedding.description]
model = "text-embedding-3-small"
dimensions = 4
"#,
    )
    .unwrap();

    let mut engine = Engine::boot(config, tmp.path()).unwrap();
    engine.load_active_env().unwrap();

    let projection = engine.projection();
    assert!(projection.has_vector_index());
    assert_eq!(projection.vector_dimensions(), Some(4));

    // nearest neighbour of the couch-direction query is the couch
    let hits = projection.search_description(&[0.0, 0.1, 0.95, 0.0], 2).unwrap();
    assert_eq!(hits[0].0, "couch_32");
    assert!(hits[0].1 > hits[1].1);
    assert!(hits.iter().all(|(_, s)| (0.0..=1.0).contains(s)));

    // category map is live for in-process cosine search
    let categories = projection.category_embeddings();
    assert!(categories.contains_key("couch"));
    let score = cosine_similarity(&[0.0, 0.0, 1.0, 0.0], &categories["couch"]);
    assert!((score - 1.0).abs() < 1e-6);
}

#[test]
fn cache_mismatch_is_fatal_when_not_generating() {
    let tmp = tempfile::TempDir::new().unwrap();
    write_project(tmp.path());
    write_embedding_caches(tmp.path());

    // configured dimensions disagree with the caches
    let config: Config = toml::from_str(
        r#"
active_env = "Adairsville"

[embedding]
generate = false

[embedding.description]
model = "text-embedding-3-small"
dimensions = 8
"#,
    )
    .unwrap();

    let mut engine = Engine::boot(config, tmp.path()).unwrap();
    let err = engine.load_active_env().unwrap_err();
    assert!(matches!(
        err,
        SeshatError::Embedding(EmbeddingError::CacheMismatch { .. })
    ));
}

#[test]
fn semantic_search_without_index_reports_index_missing() {
    let tmp = tempfile::TempDir::new().unwrap();
    let engine = loaded_engine(tmp.path());
    let err = engine
        .semantic_search("comfortable place to sit", 3, seshat::embedding::SearchKind::Description)
        .unwrap_err();
    assert!(matches!(
        err,
        SeshatError::Embedding(EmbeddingError::IndexMissing { .. })
    ));
}

#[test]
fn env_listing_marks_active() {
    let tmp = tempfile::TempDir::new().unwrap();
    let engine = loaded_engine(tmp.path());
    let envs = engine.list_envs();
    assert_eq!(envs.len(), 1);
    assert_eq!(envs[0].env_id, "Adairsville");
    assert!(envs[0].is_active);
    assert!(envs[0].has_static);
    assert!(envs[0].has_dynamic);
}
