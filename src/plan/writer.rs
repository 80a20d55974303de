//! PDDL problem file emission.
//!
//! Renders the harvested snapshot into a textual problem: objects grouped
//! by domain type, an `:init` in a fixed section order (cost, topology,
//! distances, robot structure, artifact locations, affordances, door
//! states, key/safe facts), the goal formula, and the total-cost metric.

use std::collections::BTreeMap;

use super::generate::{ArtifactAnchor, KeySafe, RobotInfo, Topology};

/// Writer configured with the problem and domain names.
pub struct ProblemWriter {
    problem_name: String,
    domain_name: String,
}

impl ProblemWriter {
    pub fn new(problem_name: impl Into<String>, domain_name: impl Into<String>) -> Self {
        Self {
            problem_name: problem_name.into(),
            domain_name: domain_name.into(),
        }
    }

    fn banner(lines: &mut Vec<String>, title: &str) {
        lines.push("    ; ====================================================================".to_string());
        lines.push(format!("    ; {title}"));
        lines.push("    ; ====================================================================".to_string());
    }

    /// `:objects`, grouped by domain type with one comment per group.
    fn objects_section(&self, types_map: &BTreeMap<String, String>) -> String {
        let mut grouped: BTreeMap<&String, Vec<&String>> = BTreeMap::new();
        for (id, t) in types_map {
            grouped.entry(t).or_default().push(id);
        }

        let mut lines = vec!["  (:objects".to_string()];
        let mut first = true;
        for (obj_type, mut ids) in grouped {
            ids.sort();
            if !first {
                lines.push(String::new());
            }
            first = false;
            lines.push(format!("    ; {obj_type}"));
            let id_list = ids
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            lines.push(format!("    {id_list} - {obj_type}"));
        }
        lines.push("  )".to_string());
        lines.join("\n")
    }

    fn topology_section(&self, topology: &Topology) -> Vec<String> {
        let mut lines = Vec::new();
        Self::banner(&mut lines, "TOPOLOGY");
        for (from, to) in &topology.connections {
            lines.push(format!("    (hasPathTo {from} {to})"));
            lines.push(format!("    (hasPathTo {to} {from})"));
        }
        if !topology.distances.is_empty() {
            lines.push(String::new());
            Self::banner(&mut lines, "DISTANCES (Location->Location)");
            for ((from, to), dist) in &topology.distances {
                lines.push(format!("    (= (distance {from} {to}) {dist})"));
            }
        }
        lines
    }

    fn robot_section(&self, robot: &RobotInfo) -> Vec<String> {
        let mut lines = Vec::new();
        Self::banner(&mut lines, "ROBOT STRUCTURE");
        let mut hands = robot.hands.clone();
        hands.sort();
        for hand in &hands {
            lines.push(format!("    (hasHand {} {hand})", robot.robot_id));
        }
        if let Some(location) = &robot.location {
            lines.push(format!("    (robotIsInSpace {} {location})", robot.robot_id));
        }
        lines
    }

    fn artifact_locations_section(
        &self,
        anchors: &BTreeMap<String, ArtifactAnchor>,
    ) -> Vec<String> {
        let mut lines = Vec::new();
        Self::banner(&mut lines, "ARTIFACT LOCATIONS");
        for (artifact, anchor) in anchors {
            // the graph's isInSpace becomes the domain's floor predicate
            if let Some(space) = &anchor.is_in_space {
                lines.push(format!("    (artifactIsOnFloorOf {artifact} {space})"));
            }
            if let Some(container) = &anchor.is_inside_of {
                lines.push(format!("    (isInsideOf {artifact} {container})"));
            }
            if let Some(surface) = &anchor.is_ontop_of {
                lines.push(format!("    (isOntopOf {artifact} {surface})"));
            }
        }
        lines
    }

    fn affordances_section(&self, affordances: &BTreeMap<String, Vec<String>>) -> Vec<String> {
        let mut lines = Vec::new();
        Self::banner(&mut lines, "AFFORDANCES");
        for (artifact, affs) in affordances {
            let mut affs = affs.clone();
            affs.sort();
            for affordance in affs {
                lines.push(format!("    ({affordance} {artifact})"));
            }
        }
        lines
    }

    fn door_states_section(&self, door_states: &BTreeMap<String, bool>) -> Vec<String> {
        let mut lines = Vec::new();
        if door_states.is_empty() {
            return lines;
        }
        Self::banner(&mut lines, "DOOR STATES");
        for (door, open) in door_states {
            // closed doors are represented by the predicate's absence
            if *open {
                lines.push(format!("    (isOpenDoor {door})"));
            }
        }
        lines
    }

    fn key_safe_section(&self, key_safe: &KeySafe) -> Vec<String> {
        let mut lines = Vec::new();
        if key_safe.is_empty() {
            return lines;
        }
        Self::banner(&mut lines, "KEY-SAFE RELATIONSHIPS");
        for (key, safes) in &key_safe.unlocks {
            let mut safes = safes.clone();
            safes.sort();
            for safe in safes {
                lines.push(format!("    (unlocks {key} {safe})"));
            }
        }

        lines.push(String::new());
        Self::banner(&mut lines, "SAFE KEY ATTRIBUTES (hasRequiredKey)");
        for (safe, keys) in &key_safe.requires_key {
            let mut keys = keys.clone();
            keys.sort();
            for key in keys {
                lines.push(format!("    (hasRequiredKey {safe} {key})"));
            }
        }

        lines.push(String::new());
        Self::banner(&mut lines, "LOCKED STATES");
        // a safe that requires a key starts locked
        for safe in key_safe.requires_key.keys() {
            lines.push(format!("    (isLocked {safe})"));
        }
        lines
    }

    fn init_section(
        &self,
        topology: &Topology,
        robot: &RobotInfo,
        anchors: &BTreeMap<String, ArtifactAnchor>,
        affordances: &BTreeMap<String, Vec<String>>,
        door_states: &BTreeMap<String, bool>,
        key_safe: &KeySafe,
    ) -> String {
        let mut lines = vec!["  (:init".to_string()];
        lines.push("    (= (total-cost) 0)".to_string());
        lines.push(String::new());

        lines.extend(self.topology_section(topology));
        lines.push(String::new());
        lines.extend(self.robot_section(robot));
        lines.push(String::new());
        lines.extend(self.artifact_locations_section(anchors));
        lines.push(String::new());
        lines.extend(self.affordances_section(affordances));

        let doors = self.door_states_section(door_states);
        if !doors.is_empty() {
            lines.push(String::new());
            lines.extend(doors);
        }
        let keys = self.key_safe_section(key_safe);
        if !keys.is_empty() {
            lines.push(String::new());
            lines.extend(keys);
        }

        lines.push("  )".to_string());
        lines.join("\n")
    }

    fn goal_section(&self, goal_formula: &str) -> String {
        let indented: Vec<String> = goal_formula
            .trim()
            .lines()
            .map(|line| format!("    {}", line.trim()))
            .collect();
        format!("  (:goal\n{}\n  )", indented.join("\n"))
    }

    /// Render the full problem text.
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &self,
        types_map: &BTreeMap<String, String>,
        topology: &Topology,
        robot: &RobotInfo,
        anchors: &BTreeMap<String, ArtifactAnchor>,
        affordances: &BTreeMap<String, Vec<String>>,
        goal_formula: &str,
        door_states: &BTreeMap<String, bool>,
        key_safe: &KeySafe,
    ) -> String {
        let mut lines = Vec::new();
        lines.push(";; ====================================================================".to_string());
        lines.push(format!(";; PDDL Problem: {}", self.problem_name));
        lines.push(";; Auto-generated from knowledge graph".to_string());
        lines.push(";; ====================================================================".to_string());
        lines.push(String::new());
        lines.push(format!("(define (problem {})", self.problem_name));
        lines.push(format!("  (:domain {})", self.domain_name));
        lines.push(String::new());
        lines.push(self.objects_section(types_map));
        lines.push(String::new());
        lines.push(self.init_section(topology, robot, anchors, affordances, door_states, key_safe));
        lines.push(String::new());
        lines.push(self.goal_section(goal_formula));
        lines.push(String::new());
        lines.push("  (:metric minimize (total-cost))".to_string());
        lines.push(")".to_string());
        lines.join("\n") + "\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (
        BTreeMap<String, String>,
        Topology,
        RobotInfo,
        BTreeMap<String, ArtifactAnchor>,
        BTreeMap<String, Vec<String>>,
    ) {
        let types: BTreeMap<String, String> = [
            ("corridor_14", "Space"),
            ("kitchen_13", "Space"),
            ("door_9", "Door"),
            ("robot1", "Robot"),
            ("left_hand", "Hand"),
            ("cup_6", "Artifact"),
        ]
        .into_iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();

        let mut topology = Topology::default();
        topology.connections = vec![
            ("corridor_14".into(), "door_9".into()),
            ("door_9".into(), "kitchen_13".into()),
        ];
        topology
            .distances
            .insert(("corridor_14".into(), "kitchen_13".into()), 2);
        topology
            .distances
            .insert(("kitchen_13".into(), "corridor_14".into()), 2);

        let robot = RobotInfo {
            robot_id: "robot1".into(),
            hands: vec!["left_hand".into()],
            location: Some("corridor_14".into()),
        };

        let mut anchors = BTreeMap::new();
        anchors.insert(
            "cup_6".to_string(),
            ArtifactAnchor {
                is_in_space: Some("kitchen_13".into()),
                is_inside_of: None,
                is_ontop_of: Some("table_1".into()),
            },
        );

        let mut affordances = BTreeMap::new();
        affordances.insert(
            "cup_6".to_string(),
            vec!["Affordance_PickupOneHand".to_string()],
        );

        (types, topology, robot, anchors, affordances)
    }

    #[test]
    fn renders_complete_problem() {
        let (types, topology, robot, anchors, affordances) = sample();
        let writer = ProblemWriter::new("test_problem", "robot");
        let text = writer.render(
            &types,
            &topology,
            &robot,
            &anchors,
            &affordances,
            "(and (isOntopOf cup_6 table_1))",
            &BTreeMap::new(),
            &KeySafe::default(),
        );

        assert!(text.contains("(define (problem test_problem)"));
        assert!(text.contains("(:domain robot)"));
        // objects grouped by type
        assert!(text.contains("    ; Space"));
        assert!(text.contains("corridor_14 kitchen_13 - Space"));
        assert!(text.contains("cup_6 - Artifact"));
        // init ordering facts
        assert!(text.contains("(= (total-cost) 0)"));
        assert!(text.contains("(hasPathTo corridor_14 door_9)"));
        assert!(text.contains("(hasPathTo door_9 corridor_14)"));
        assert!(text.contains("(= (distance corridor_14 kitchen_13) 2)"));
        assert!(text.contains("(hasHand robot1 left_hand)"));
        assert!(text.contains("(robotIsInSpace robot1 corridor_14)"));
        // isInSpace mapped onto the floor predicate
        assert!(text.contains("(artifactIsOnFloorOf cup_6 kitchen_13)"));
        assert!(text.contains("(isOntopOf cup_6 table_1)"));
        assert!(text.contains("(Affordance_PickupOneHand cup_6)"));
        assert!(text.contains("(:metric minimize (total-cost))"));
    }

    #[test]
    fn closed_doors_emit_nothing() {
        let (types, topology, robot, anchors, affordances) = sample();
        let mut doors = BTreeMap::new();
        doors.insert("door_9".to_string(), false);
        doors.insert("door_8".to_string(), true);

        let writer = ProblemWriter::new("p", "robot");
        let text = writer.render(
            &types,
            &topology,
            &robot,
            &anchors,
            &affordances,
            "(and)",
            &doors,
            &KeySafe::default(),
        );
        assert!(text.contains("(isOpenDoor door_8)"));
        assert!(!text.contains("(isOpenDoor door_9)"));
    }

    #[test]
    fn key_safe_facts_and_default_locks() {
        let (types, topology, robot, anchors, affordances) = sample();
        let mut key_safe = KeySafe::default();
        key_safe
            .unlocks
            .insert("key_215".into(), vec!["safe_214".into()]);
        key_safe
            .requires_key
            .insert("safe_214".into(), vec!["key_215".into()]);

        let writer = ProblemWriter::new("p", "robot");
        let text = writer.render(
            &types,
            &topology,
            &robot,
            &anchors,
            &affordances,
            "(and)",
            &BTreeMap::new(),
            &key_safe,
        );
        assert!(text.contains("(unlocks key_215 safe_214)"));
        assert!(text.contains("(hasRequiredKey safe_214 key_215)"));
        assert!(text.contains("(isLocked safe_214)"));
    }

    #[test]
    fn goal_is_indented_into_section() {
        let (types, topology, robot, anchors, affordances) = sample();
        let writer = ProblemWriter::new("p", "robot");
        let text = writer.render(
            &types,
            &topology,
            &robot,
            &anchors,
            &affordances,
            "(and\n  (isON tv_52)\n)",
            &BTreeMap::new(),
            &KeySafe::default(),
        );
        assert!(text.contains("  (:goal\n    (and\n    (isON tv_52)\n    )\n  )"));
    }
}
