use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::protocol::Command;

/// Named joint-space motion sequences, run step by step with `MovJ`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoseLibrary {
    poses: BTreeMap<String, Vec<[f64; 6]>>,
}

impl Default for PoseLibrary {
    fn default() -> Self {
        let mut poses = BTreeMap::new();
        poses.insert("home".to_string(), vec![[0.0, 0.0, 0.0, 0.0, 0.0, 0.0]]);
        poses.insert("pack".to_string(), vec![[-90.0, 0.0, -140.0, -40.0, 0.0, 0.0]]);
        poses.insert(
            "place".to_string(),
            vec![[9.0, -47.0, -70.0, 26.0, 91.0, -2.0]],
        );
        poses.insert(
            "wave".to_string(),
            vec![
                [176.5, 5.6, -52.9, -32.2, 87.8, 11.8],
                [176.5, 5.6, -52.9, 32.2, 87.8, 11.8],
                [270.0, 30.0, -60.0, -10.0, 0.0, 0.0],
                [270.0, 60.0, -30.0, 30.0, 0.0, 0.0],
                [270.0, 30.0, -60.0, -10.0, 0.0, 0.0],
                [270.0, 60.0, -30.0, 30.0, 0.0, 0.0],
                [270.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            ],
        );
        poses.insert(
            "wiggle".to_string(),
            vec![
                [180.0, 0.0, -50.0, -20.0, 90.0, 0.0],
                [180.0, 0.0, -50.0, 50.0, 90.0, 0.0],
                [270.0, 0.0, 50.0, -50.0, 0.0, 0.0],
                [270.0, 30.0, -50.0, 50.0, 0.0, -30.0],
                [270.0, 0.0, 50.0, -50.0, 0.0, 0.0],
                [270.0, 30.0, -50.0, 50.0, 0.0, -30.0],
                [270.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            ],
        );
        poses.insert(
            "greet".to_string(),
            vec![
                [101.3473, -16.468, 19.3994, -1.0746, 4.137, 0.0],
                [101.3473, -16.468, 19.3994, -1.0746, 4.137, -15.0],
                [101.3473, -16.468, 19.3994, -1.0746, 4.137, 15.0],
                [101.3473, -16.468, 19.3994, -1.0746, 4.137, 0.0],
            ],
        );
        Self { poses }
    }
}

impl PoseLibrary {
    pub fn new(poses: BTreeMap<String, Vec<[f64; 6]>>) -> Self {
        Self { poses }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.poses.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.poses.keys().map(String::as_str)
    }

    /// `MovJ` commands for the named sequence, in order.
    pub fn commands(&self, name: &str) -> Option<Vec<Command>> {
        self.poses.get(name).map(|steps| {
            steps
                .iter()
                .map(|joints| Command::move_joint_absolute(*joints))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_is_a_single_joint_move() {
        let library = PoseLibrary::default();
        let commands = library.commands("pack").unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(
            commands[0].to_string(),
            "MovJ(joint={-90,0,-140,-40,0,0})"
        );
        assert!(library.commands("moonwalk").is_none());
    }

    #[test]
    fn pose_table_round_trips_through_toml() {
        let library = PoseLibrary::default();
        let text = toml::to_string(&library).unwrap();
        let parsed: PoseLibrary = toml::from_str(&text).unwrap();
        assert_eq!(parsed, library);
        assert!(parsed.names().any(|name| name == "wave"));
    }
}
