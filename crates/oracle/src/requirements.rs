use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// What a script needs to run inside a container, as reported by the
/// analysis step. Built once per run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRequirements {
    pub language: String,
    #[serde(default, deserialize_with = "version_map")]
    pub version_requirements: BTreeMap<String, String>,
    #[serde(default)]
    pub system_dependencies: Vec<String>,
    #[serde(default)]
    pub environment_variables: Vec<String>,
    #[serde(default)]
    pub execution_pattern: ExecutionPattern,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPattern {
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "step_list")]
    pub steps: Vec<ExecutionStep>,
    #[serde(default)]
    pub example: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub step: u32,
    pub description: String,
}

impl ScriptRequirements {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

/// Models occasionally answer `{"python": 3.9}`; keep the value as text.
fn version_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .map(|(name, value)| {
            let spec = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (name, spec)
        })
        .collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawStep {
    Text(String),
    Numbered {
        #[serde(default)]
        step: Option<Value>,
        #[serde(default)]
        description: String,
    },
}

fn step_list<'de, D>(deserializer: D) -> Result<Vec<ExecutionStep>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<RawStep>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(index, step)| {
            let position = index as u32 + 1;
            match step {
                RawStep::Text(description) => ExecutionStep {
                    step: position,
                    description,
                },
                RawStep::Numbered { step, description } => {
                    let number = step
                        .and_then(|v| match v {
                            Value::Number(n) => n.as_u64(),
                            Value::String(s) => s.trim().parse().ok(),
                            _ => None,
                        })
                        .filter(|n| *n > 0)
                        .and_then(|n| u32::try_from(n).ok())
                        .unwrap_or(position);
                    ExecutionStep {
                        step: number,
                        description,
                    }
                }
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_document_parses() {
        let raw = r#"{
            "language": "Bash",
            "version_requirements": {"bash": ">= 3.0"},
            "system_dependencies": ["wc"],
            "environment_variables": [],
            "execution_pattern": {
                "description": "counts lines",
                "steps": [{"step": 1, "description": "check args"}],
                "example": "./line_counter.sh \"a\""
            }
        }"#;
        let req: ScriptRequirements = serde_json::from_str(raw).unwrap();
        assert_eq!(req.language, "Bash");
        assert_eq!(req.version_requirements["bash"], ">= 3.0");
        assert_eq!(req.system_dependencies, vec!["wc"]);
        assert_eq!(req.execution_pattern.steps[0].description, "check args");
    }

    #[test]
    fn loose_values_are_normalized() {
        let raw = r#"{
            "language": "Python",
            "version_requirements": {"python": 3.9, "pip": null},
            "execution_pattern": {"steps": ["read input", {"description": "print"}]}
        }"#;
        let req: ScriptRequirements = serde_json::from_str(raw).unwrap();
        assert_eq!(req.version_requirements["python"], "3.9");
        assert_eq!(req.version_requirements["pip"], "");
        assert!(req.system_dependencies.is_empty());

        let steps = &req.execution_pattern.steps;
        assert_eq!(steps[0].step, 1);
        assert_eq!(steps[1].step, 2);
        assert_eq!(steps[1].description, "print");
    }

    #[test]
    fn out_of_range_step_numbers_fall_back_to_position() {
        let raw = r#"{
            "language": "Go",
            "execution_pattern": {"steps": [
                {"step": 4294967297, "description": "too big"},
                {"step": "7", "description": "quoted"},
                {"step": -1, "description": "negative"}
            ]}
        }"#;
        let req: ScriptRequirements = serde_json::from_str(raw).unwrap();

        let numbers: Vec<u32> = req.execution_pattern.steps.iter().map(|s| s.step).collect();
        assert_eq!(numbers, [1, 7, 3]);
    }

    #[test]
    fn language_is_required() {
        let result = serde_json::from_str::<ScriptRequirements>(r#"{"system_dependencies": []}"#);
        assert!(result.is_err());
    }
}
