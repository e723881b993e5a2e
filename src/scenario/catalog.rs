// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! Scenario definitions and their command strings.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::ScenarioAction;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioCommands {
    pub start: String,
    pub stop: String,
    pub status: String,
    pub reset: String,
}

impl ScenarioCommands {
    pub fn get(&self, action: ScenarioAction) -> &str {
        match action {
            ScenarioAction::Start => &self.start,
            ScenarioAction::Stop => &self.stop,
            ScenarioAction::Status => &self.status,
            ScenarioAction::Reset => &self.reset,
        }
    }

    /// `<root>/<scenario>/<action>.sh` for each action.
    fn scripts_under(root: &Path, scenario_id: &str) -> Self {
        let script = |action: ScenarioAction| {
            let path = root.join(scenario_id).join(format!("{}.sh", action));
            format!("bash {}", shell_quote(&path.to_string_lossy()))
        };
        Self {
            start: script(ScenarioAction::Start),
            stop: script(ScenarioAction::Stop),
            status: script(ScenarioAction::Status),
            reset: script(ScenarioAction::Reset),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDef {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub locked: bool,
    #[serde(skip_serializing)]
    pub commands: ScenarioCommands,
}

/// Static set of scenarios, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct ScenarioCatalog {
    scenarios: Vec<ScenarioDef>,
}

struct Builtin {
    id: &'static str,
    title: &'static str,
    description: &'static str,
    category: &'static str,
    difficulty: &'static str,
    duration_minutes: u32,
    locked: bool,
}

const BUILTIN_SCENARIOS: &[Builtin] = &[
    Builtin {
        id: "apt28-part1",
        title: "APT28: Link to Trouble - Part 1",
        description: "Partners have been consistently targeted by APT28 over the past few weeks. Investigate the initial compromise.",
        category: "Network Security",
        difficulty: "Easy",
        duration_minutes: 15,
        locked: false,
    },
    Builtin {
        id: "apt28-part2",
        title: "APT28: Link to Trouble - Part 2",
        description: "The organisation itself has been compromised by APT28. Analyse the malware and find the C2 server.",
        category: "Network Security",
        difficulty: "Easy",
        duration_minutes: 15,
        locked: false,
    },
    Builtin {
        id: "apt28-part3",
        title: "APT28: Link to Trouble - Part 3",
        description: "The attacker has established communication with a host inside the network infrastructure.",
        category: "Network Security",
        difficulty: "Easy",
        duration_minutes: 15,
        locked: false,
    },
    Builtin {
        id: "apt28-part4",
        title: "APT28: Link to Trouble - Part 4",
        description: "APT28 moves deeper, mapping what the organisation is built upon.",
        category: "Network Security",
        difficulty: "Easy",
        duration_minutes: 15,
        locked: true,
    },
    Builtin {
        id: "web-exploit-1",
        title: "SQL Injection Masterclass",
        description: "Exploit a vulnerable web application with advanced SQL injection techniques.",
        category: "Web Security",
        difficulty: "Medium",
        duration_minutes: 45,
        locked: false,
    },
    Builtin {
        id: "forensics-1",
        title: "Digital Crime Scene Investigation",
        description: "Analyse evidence from a compromised system and reconstruct the attack timeline.",
        category: "Forensics",
        difficulty: "Hard",
        duration_minutes: 60,
        locked: false,
    },
    Builtin {
        id: "malware-1",
        title: "Reverse Engineering Challenge",
        description: "Dissect malicious software to understand its behaviour and develop countermeasures.",
        category: "Malware Analysis",
        difficulty: "Hard",
        duration_minutes: 90,
        locked: true,
    },
    Builtin {
        id: "social-eng-1",
        title: "Phishing Campaign Analysis",
        description: "Investigate a phishing campaign and trace the attack vectors used by the threat actors.",
        category: "Social Engineering",
        difficulty: "Medium",
        duration_minutes: 30,
        locked: false,
    },
];

impl ScenarioCatalog {
    pub fn new(scenarios: Vec<ScenarioDef>) -> Self {
        Self { scenarios }
    }

    /// Built-in scenarios with one script per action under `scripts_root`.
    pub fn builtin(scripts_root: &Path) -> Self {
        let scenarios = BUILTIN_SCENARIOS
            .iter()
            .map(|b| ScenarioDef {
                id: b.id.to_string(),
                title: b.title.to_string(),
                description: b.description.to_string(),
                category: b.category.to_string(),
                difficulty: b.difficulty.to_string(),
                duration_minutes: b.duration_minutes,
                locked: b.locked,
                commands: ScenarioCommands::scripts_under(scripts_root, b.id),
            })
            .collect();
        Self { scenarios }
    }

    /// Parse a JSON array of scenario definitions.
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let scenarios: Vec<ScenarioDef> = serde_json::from_str(raw)?;
        for scenario in &scenarios {
            if !crate::security::validate_identifier(&scenario.id) {
                anyhow::bail!("Invalid scenario id '{}'", scenario.id);
            }
        }
        Ok(Self { scenarios })
    }

    pub fn get(&self, id: &str) -> Option<&ScenarioDef> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    pub fn command(&self, id: &str, action: ScenarioAction) -> Option<&str> {
        self.get(id).map(|s| s.commands.get(action))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScenarioDef> {
        self.scenarios.iter()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_commands() {
        let catalog = ScenarioCatalog::builtin(Path::new("/opt/lab/scripts"));
        assert_eq!(catalog.len(), 8);
        assert_eq!(
            catalog.command("apt28-part1", ScenarioAction::Start),
            Some("bash '/opt/lab/scripts/apt28-part1/start.sh'")
        );
        assert!(catalog.command("nope", ScenarioAction::Start).is_none());
        assert!(catalog.get("malware-1").unwrap().locked);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/a b/c"), "'/a b/c'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_from_json() {
        let raw = r#"[{
            "id": "demo",
            "title": "Demo",
            "commands": {"start": "echo up", "stop": "echo down", "status": "echo ok", "reset": "true"}
        }]"#;
        let catalog = ScenarioCatalog::from_json(raw).unwrap();
        assert_eq!(catalog.command("demo", ScenarioAction::Stop), Some("echo down"));

        let listed = serde_json::to_value(catalog.get("demo").unwrap()).unwrap();
        assert!(listed.get("commands").is_none());

        let bad = r#"[{"id": "../x", "title": "x", "commands": {"start": "", "stop": "", "status": "", "reset": ""}}]"#;
        assert!(ScenarioCatalog::from_json(bad).is_err());
    }
}
