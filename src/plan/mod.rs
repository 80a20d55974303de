//! Goal-to-problem synthesis: from a symbolic goal formula to a grounded
//! PDDL problem over a *minimal sufficient* object universe.
//!
//! The pipeline: normalize the goal, extract and classify its objects,
//! close the location set over artifact anchors and the robot's position,
//! expand it along shortest `hasPathTo` paths (harvesting pairwise
//! distances on the way), pull in key/safe closures, collect affordance and
//! state facts, and emit the problem text. A debug record accompanies every
//! run, success or failure.

pub mod generate;
pub mod goal;
pub mod runner;
pub mod writer;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::PlannerConfig;
use crate::domain::Domain;
use crate::error::PlanError;
use crate::projection::Projection;

use generate::Harvester;
use runner::PlannerOutcome;
use writer::ProblemWriter;

// ---------------------------------------------------------------------------
// Debug record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractedObjects {
    pub goal_object_ids: Vec<String>,
    pub goal_types_map: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Classification {
    pub artifact_ids: Vec<String>,
    pub location_ids: Vec<String>,
    pub ungrouped: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PathStats {
    pub required_locations: usize,
    pub expanded_locations: usize,
    pub distances: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unreachable_pairs: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AffordanceValidation {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub all_artifact_affordances: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DoorDebug {
    pub door_ids: Vec<String>,
    pub door_states: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct KeySafeDebug {
    pub unlocks_count: usize,
    pub requires_key_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keys_added: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProblemGeneration {
    pub total_objects: usize,
    pub artifacts: usize,
    pub locations: usize,
    pub robot_id: String,
    pub robot_location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlannerDebug {
    pub command: String,
    pub search: String,
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DebugFiles {
    pub problem: Option<String>,
    pub solution: Option<String>,
    pub log: Option<String>,
}

/// The debug.json document written next to every generated problem.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DebugRecord {
    pub status: String,
    pub goal_formula: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_description: Option<String>,
    pub extracted_objects: ExtractedObjects,
    pub classification: Classification,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub location_warnings: Vec<String>,
    pub path_expansion: PathStats,
    pub affordance_validation: AffordanceValidation,
    pub door_debug: DoorDebug,
    /// Stored isOpen / isLocked attributes per goal artifact.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub artifact_states: BTreeMap<String, BTreeMap<String, bool>>,
    pub key_safe: KeySafeDebug,
    pub problem_generation: ProblemGeneration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planner: Option<PlannerDebug>,
    pub files: DebugFiles,
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

/// The in-memory result of a synthesis run.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub problem_text: String,
    pub normalized_goal: String,
    pub types_map: BTreeMap<String, String>,
    pub debug: DebugRecord,
}

/// Synthesizer over a projection and a fixed domain.
pub struct Synthesizer<'a> {
    projection: &'a Projection,
    domain: &'a Domain,
}

impl<'a> Synthesizer<'a> {
    pub fn new(projection: &'a Projection, domain: &'a Domain) -> Self {
        Self { projection, domain }
    }

    /// Run the full pipeline and render the problem text.
    pub fn synthesize(
        &self,
        goal_formula: &str,
        description: Option<&str>,
        problem_name: &str,
    ) -> Result<Synthesis, PlanError> {
        let harvester = Harvester::new(self.projection, self.domain);
        let mut debug = DebugRecord {
            status: "started".to_string(),
            task_description: description.map(str::to_string),
            ..Default::default()
        };

        // 1. Normalize and validate.
        goal::validate(goal_formula)?;
        let normalized = goal::normalize(goal_formula);
        goal::validate(&normalized)?;
        debug.goal_formula = normalized.clone();

        // 2. Extract goal objects; every argument id must exist.
        let argument_ids = goal::extract_argument_identifiers(&normalized);
        for id in &argument_ids {
            if !self.projection.has_node(id) {
                return Err(PlanError::UnknownObject { id: id.clone() });
            }
        }
        let goal_object_ids: Vec<String> = argument_ids.iter().cloned().collect();
        let goal_types = harvester.types(&goal_object_ids);
        debug.extracted_objects = ExtractedObjects {
            goal_object_ids: goal_object_ids.clone(),
            goal_types_map: goal_types.clone(),
        };

        // 3. Classification.
        let (held_artifacts, hand_args) = goal::is_held_by_arguments(&normalized);
        let mut artifact_ids: Vec<String> = Vec::new();
        let mut location_ids: BTreeSet<String> = BTreeSet::new();
        let mut classification = Classification::default();

        for id in &goal_object_ids {
            match goal_types.get(id).map(String::as_str) {
                Some(t)
                    if t == "Location" || self.domain.is_subtype_of(t, "Location") =>
                {
                    location_ids.insert(id.clone());
                }
                Some("Artifact") => artifact_ids.push(id.clone()),
                Some(t) if self.domain.is_subtype_of(t, "Artifact") => {
                    artifact_ids.push(id.clone())
                }
                Some(_) => {} // Robot / Hand objects join the universe later
                None => {
                    classification.ungrouped.push(id.clone());
                    if hand_args.contains(id) {
                        // the hand argument of isHeldBy is a Hand, not an artifact
                        continue;
                    }
                    if held_artifacts.contains(id) {
                        artifact_ids.push(id.clone());
                        continue;
                    }
                    classification.warnings.push(format!(
                        "could not classify {id}; treating it as an Artifact"
                    ));
                    tracing::warn!(id = %id, "unclassified goal object, defaulting to Artifact");
                    artifact_ids.push(id.clone());
                }
            }
        }

        // 4. Location universe closure over artifact anchors.
        let mut anchors = harvester.artifact_anchors(&artifact_ids);
        let container_ids: Vec<String> = anchors
            .values()
            .flat_map(|a| {
                a.is_inside_of
                    .iter()
                    .chain(a.is_ontop_of.iter())
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        let container_anchors = harvester.artifact_anchors(&container_ids);
        for anchor in anchors.values().chain(container_anchors.values()) {
            if let Some(space) = &anchor.is_in_space {
                location_ids.insert(space.clone());
            }
        }
        for (id, anchor) in &container_anchors {
            anchors.entry(id.clone()).or_insert_with(|| anchor.clone());
        }

        for (artifact, anchor) in &anchors {
            if anchor.is_empty() {
                debug
                    .location_warnings
                    .push(format!("artifact {artifact} has no spatial anchor"));
                tracing::warn!(artifact = %artifact, "goal artifact lacks any spatial anchor");
            }
        }

        // 5. Robot.
        let robot = harvester.robot_info().ok_or(PlanError::NoRobot)?;
        if let Some(location) = &robot.location {
            location_ids.insert(location.clone());
        } else {
            tracing::warn!(robot = %robot.robot_id, "robot has no current location");
        }

        // 6. Path expansion over all pairs.
        let required_count = location_ids.len();
        let mut expansion = harvester.expand_locations(&location_ids);

        // 7. Key/safe closure; discovered keys re-trigger a small expansion.
        let mut key_safe = harvester.key_safe(&artifact_ids);
        let keys_added: Vec<String> = key_safe
            .all_keys()
            .into_iter()
            .filter(|k| !artifact_ids.contains(k))
            .collect();
        if !keys_added.is_empty() {
            tracing::info!(keys = ?keys_added, "adding related keys to the problem");
            let key_anchors = harvester.artifact_anchors(&keys_added);
            let mut grew = false;
            for anchor in key_anchors.values() {
                if let Some(space) = &anchor.is_in_space {
                    grew |= expansion.locations.insert(space.clone());
                }
            }
            for (id, anchor) in key_anchors {
                anchors.insert(id, anchor);
            }
            artifact_ids.extend(keys_added.iter().cloned());
            if grew {
                let regrown = harvester.expand_locations(&expansion.locations);
                expansion.locations = regrown.locations;
                for (pair, dist) in regrown.distances {
                    expansion.distances.entry(pair).or_insert(dist);
                }
                expansion.unreachable_pairs = regrown.unreachable_pairs;
            }
            key_safe = harvester.key_safe(&artifact_ids);
        }
        debug.key_safe = KeySafeDebug {
            unlocks_count: key_safe.unlocks.values().map(Vec::len).sum(),
            requires_key_count: key_safe.requires_key.values().map(Vec::len).sum(),
            keys_added,
        };
        debug.path_expansion = PathStats {
            required_locations: required_count,
            expanded_locations: expansion.locations.len(),
            distances: expansion.distances.len(),
            unreachable_pairs: expansion.unreachable_pairs.clone(),
        };

        // 8. Object universe.
        let mut universe: BTreeSet<String> = artifact_ids.iter().cloned().collect();
        universe.extend(anchors.keys().cloned());
        universe.extend(expansion.locations.iter().cloned());
        universe.insert(robot.robot_id.clone());
        universe.extend(robot.hands.iter().cloned());
        universe.extend(goal_object_ids.iter().cloned());

        // 9. Types for the whole universe, with fallbacks for ids the
        // projection cannot classify.
        let universe_list: Vec<String> = universe.iter().cloned().collect();
        let mut types_map = harvester.types(&universe_list);
        for id in &universe_list {
            if types_map.contains_key(id) {
                continue;
            }
            let fallback = if *id == robot.robot_id {
                "Robot".to_string()
            } else if robot.hands.contains(id) || hand_args.contains(id) {
                "Hand".to_string()
            } else if expansion.locations.contains(id) {
                generate::infer_type_from_id(id).unwrap_or_else(|| "Space".to_string())
            } else {
                classification
                    .warnings
                    .push(format!("no type found for {id}; defaulting to Artifact"));
                "Artifact".to_string()
            };
            types_map.insert(id.clone(), fallback);
        }

        classification.artifact_ids = artifact_ids.clone();
        classification.location_ids = expansion.locations.iter().cloned().collect();
        debug.classification = classification;

        // 10. Doors and their states.
        let door_ids: Vec<String> = expansion
            .locations
            .iter()
            .filter(|id| types_map.get(*id).map(String::as_str) == Some("Door"))
            .cloned()
            .collect();
        let door_states = harvester.door_states(&door_ids);
        debug.door_debug = DoorDebug {
            door_ids,
            door_states: door_states.clone(),
        };

        debug.artifact_states = harvester.artifact_states(&artifact_ids);

        // 11. Affordances + goal validation (warnings only).
        let affordances = harvester.affordances(&artifact_ids);
        let affordance_warnings =
            goal::validate_affordances(&normalized, &artifact_ids, &affordances);
        for warning in &affordance_warnings {
            tracing::warn!("{warning}");
        }
        debug.affordance_validation = AffordanceValidation {
            warnings: affordance_warnings,
            all_artifact_affordances: artifact_ids
                .iter()
                .map(|id| (id.clone(), affordances.get(id).cloned().unwrap_or_default()))
                .collect(),
        };

        // 12. Topology over the final universe.
        let topology = harvester.topology(&expansion.locations, &expansion.distances);

        // 13. Render.
        let writer = ProblemWriter::new(problem_name, self.domain.name());
        let problem_text = writer.render(
            &types_map,
            &topology,
            &robot,
            &anchors,
            &affordances,
            &normalized,
            &door_states,
            &key_safe,
        );

        debug.problem_generation = ProblemGeneration {
            total_objects: types_map.len(),
            artifacts: types_map.values().filter(|t| *t == "Artifact").count(),
            locations: types_map
                .values()
                .filter(|t| {
                    *t == "Location" || self.domain.is_subtype_of(t, "Location")
                })
                .count(),
            robot_id: robot.robot_id.clone(),
            robot_location: robot.location.clone(),
        };
        debug.status = "generated".to_string();

        tracing::info!(
            objects = types_map.len(),
            locations = expansion.locations.len(),
            "generated PDDL problem"
        );

        Ok(Synthesis {
            problem_text,
            normalized_goal: normalized,
            types_map,
            debug,
        })
    }
}

// ---------------------------------------------------------------------------
// Full plan run (synthesis + planner + artifacts)
// ---------------------------------------------------------------------------

/// Result of a synthesize-and-plan run.
#[derive(Debug, Clone)]
pub struct PlanReport {
    pub problem_path: PathBuf,
    pub solution_path: PathBuf,
    pub debug_path: PathBuf,
    pub outcome: PlannerOutcome,
    pub debug: DebugRecord,
}

/// Synthesize into `output_dir`, invoke the planner, and leave
/// `problem.pddl`, `solution.plan`, and `debug.json` behind. A nonzero
/// planner exit is reported in the outcome, not as an `Err`; only
/// infrastructure failures (timeout, missing binary, I/O) are errors — and
/// the debug record is written in every case.
#[allow(clippy::too_many_arguments)]
pub fn synthesize_and_plan(
    projection: &Projection,
    domain: &Domain,
    planner: &PlannerConfig,
    domain_path: &Path,
    goal_formula: &str,
    description: Option<&str>,
    problem_name: &str,
    output_dir: &Path,
) -> Result<PlanReport, PlanError> {
    std::fs::create_dir_all(output_dir).map_err(|e| PlanError::Io { source: e })?;

    let synthesizer = Synthesizer::new(projection, domain);
    let mut synthesis = synthesizer.synthesize(goal_formula, description, problem_name)?;

    let problem_path = output_dir.join("problem.pddl");
    let solution_path = output_dir.join("solution.plan");
    let debug_path = output_dir.join("debug.json");
    std::fs::write(&problem_path, &synthesis.problem_text)
        .map_err(|e| PlanError::Io { source: e })?;
    synthesis.debug.files = DebugFiles {
        problem: Some(problem_path.display().to_string()),
        solution: Some(solution_path.display().to_string()),
        log: Some(debug_path.display().to_string()),
    };

    let write_debug = |debug: &DebugRecord| {
        if let Ok(json) = serde_json::to_string_pretty(debug) {
            let _ = std::fs::write(&debug_path, json);
        }
    };

    let outcome = match runner::run_planner(
        planner,
        domain_path,
        &problem_path,
        output_dir,
        &solution_path,
    ) {
        Ok(outcome) => outcome,
        Err(e) => {
            synthesis.debug.status = match &e {
                PlanError::PlannerTimeout { .. } => "timeout".to_string(),
                _ => "error".to_string(),
            };
            write_debug(&synthesis.debug);
            return Err(e);
        }
    };

    synthesis.debug.planner = Some(PlannerDebug {
        command: planner.command.clone(),
        search: planner.search_command(),
        returncode: outcome.returncode,
        stdout: outcome.stdout.clone(),
        stderr: outcome.stderr.clone(),
    });
    synthesis.debug.status = if outcome.returncode == 0 {
        "success".to_string()
    } else {
        "failed".to_string()
    };
    write_debug(&synthesis.debug);

    Ok(PlanReport {
        problem_path,
        solution_path,
        debug_path,
        outcome,
        debug: synthesis.debug,
    })
}
