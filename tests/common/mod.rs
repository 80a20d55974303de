//! Shared test scaffolding: a temporary project root populated with the
//! Adairsville fixture environment.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::path::Path;

use seshat::config::Config;
use seshat::engine::Engine;

pub const SCHEMA_TTL: &str = include_str!("../fixtures/schema.ttl");
pub const STATIC_TTL: &str = include_str!("../fixtures/static.ttl");
pub const DYNAMIC_TTL: &str = include_str!("../fixtures/dynamic.ttl");
pub const DOMAIN_PDDL: &str = include_str!("../fixtures/domain.pddl");
pub const RELATIONSHIP_MAPPING: &str = include_str!("../fixtures/relationship_mapping.json");

pub const NS: &str = "https://seshat.dev/world#";

/// Lay out a project root with the Adairsville environment.
pub fn write_project(root: &Path) {
    let env_dir = root.join("data/envs/Adairsville");
    std::fs::create_dir_all(&env_dir).unwrap();
    std::fs::create_dir_all(root.join("action")).unwrap();

    std::fs::write(root.join("data/schema.ttl"), SCHEMA_TTL).unwrap();
    std::fs::write(root.join("data/domain.pddl"), DOMAIN_PDDL).unwrap();
    std::fs::write(env_dir.join("static.ttl"), STATIC_TTL).unwrap();
    std::fs::write(env_dir.join("dynamic.ttl"), DYNAMIC_TTL).unwrap();
    std::fs::write(
        root.join("action/relationship_mapping.json"),
        RELATIONSHIP_MAPPING,
    )
    .unwrap();
}

/// Default test config: embeddings in generate mode with no endpoint, so
/// syncs skip vector work without failing.
pub fn test_config() -> Config {
    toml::from_str(
        r#"
active_env = "Adairsville"

[embedding]
generate = true
"#,
    )
    .unwrap()
}

/// Boot an engine over a fresh project root and load the environment.
pub fn loaded_engine(root: &Path) -> Engine {
    write_project(root);
    let mut engine = Engine::boot(test_config(), root).unwrap();
    engine.load_active_env().unwrap();
    engine
}

/// Write embedding caches (4-dimensional) so `generate = false` sessions
/// can load them.
pub fn write_embedding_caches(root: &Path) {
    let env_dir = root.join("data/envs/Adairsville");

    let description = |entries: &[(&str, [f32; 4])]| {
        serde_json::json!({
            "metadata": {
                "description_model": "text-embedding-3-small",
                "description_dimensions": 4,
            },
            "embeddings": entries
                .iter()
                .map(|(id, v)| serde_json::json!({ "id": id, "description_embedding": v }))
                .collect::<Vec<_>>(),
        })
    };

    std::fs::write(
        env_dir.join("static_embeddings.json"),
        description(&[
            ("kitchen_13", [0.9, 0.1, 0.0, 0.0]),
            ("living_room_23", [0.1, 0.9, 0.0, 0.0]),
        ])
        .to_string(),
    )
    .unwrap();

    std::fs::write(
        env_dir.join("dynamic_embeddings.json"),
        description(&[
            ("couch_32", [0.0, 0.0, 1.0, 0.0]),
            ("tv_52", [0.0, 0.0, 0.0, 1.0]),
            ("cup_6", [0.5, 0.5, 0.0, 0.0]),
        ])
        .to_string(),
    )
    .unwrap();

    std::fs::write(
        env_dir.join("category_embeddings.json"),
        serde_json::json!({
            "metadata": {
                "category_model": "text-embedding-3-small",
                "category_dimensions": 4,
            },
            "embeddings": {
                "couch": [0.0, 0.0, 1.0, 0.0],
                "tv": [0.0, 0.0, 0.0, 1.0],
                "cup": [0.5, 0.5, 0.0, 0.0],
            },
        })
        .to_string(),
    )
    .unwrap();
}
