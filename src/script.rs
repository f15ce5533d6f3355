//! Script loading and operation records.
//!
//! A script is a JSON array of objects. Each object names its operation in
//! the `operation` key and carries that operation's fields next to it, plus
//! the optional `skip` and `wait` flags:
//!
//! ```json
//! [
//!   { "operation": "DEFINE_CONSTANT", "pairs": [{ "key": "NAME", "value": "app" }] },
//!   { "operation": "COPY", "source": "src/${NAME}.txt", "destination": "out/${NAME}.txt" }
//! ]
//! ```
//!
//! Records are decoded into the closed [`Operation`] enum at load time. A
//! record with an unknown operation or a missing required field does not fail
//! the load; the step keeps its [`DefinitionError`] and the interpreter raises
//! it when the step is reached, so every step before it still runs.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::constants::{ConstantStore, SubstitutionMode};
use crate::error::{CommanderError, DefinitionError, Result};

/// The seven operation kinds a script can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    DefineConstant,
    Copy,
    ReplaceText,
    RunShell,
    RunCommanderScript,
    ExtractZip,
    Regex,
}

impl OperationKind {
    /// Fields that must be present (and non-null) in a record of this kind.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            OperationKind::DefineConstant => &["pairs"],
            OperationKind::Copy => &["source", "destination"],
            OperationKind::ReplaceText => &["filePath", "oldValue", "newValue"],
            OperationKind::RunShell => &["command"],
            OperationKind::RunCommanderScript => &["filePath"],
            OperationKind::ExtractZip => &["source", "destination"],
            OperationKind::Regex => &["source", "regexPattern", "text"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConstantPair {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DefineConstantArgs {
    pub pairs: Vec<ConstantPair>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyArgs {
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub pass_if_exists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceTextArgs {
    pub file_path: String,
    pub old_value: String,
    pub new_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunShellArgs {
    pub command: String,
    #[serde(default)]
    pub working_directory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunScriptArgs {
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtractZipArgs {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegexArgs {
    pub source: String,
    pub regex_pattern: String,
    pub text: String,
    #[serde(default)]
    pub append: bool,
    /// Allow `$1` / `${name}` capture references in `text` (replace mode only).
    #[serde(default)]
    pub expand_captures: bool,
}

/// A decoded operation with its kind-specific fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    DefineConstant(DefineConstantArgs),
    Copy(CopyArgs),
    ReplaceText(ReplaceTextArgs),
    RunShell(RunShellArgs),
    RunCommanderScript(RunScriptArgs),
    ExtractZip(ExtractZipArgs),
    Regex(RegexArgs),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::DefineConstant(_) => OperationKind::DefineConstant,
            Operation::Copy(_) => OperationKind::Copy,
            Operation::ReplaceText(_) => OperationKind::ReplaceText,
            Operation::RunShell(_) => OperationKind::RunShell,
            Operation::RunCommanderScript(_) => OperationKind::RunCommanderScript,
            Operation::ExtractZip(_) => OperationKind::ExtractZip,
            Operation::Regex(_) => OperationKind::Regex,
        }
    }

    /// Decode a record whose `operation` tag is `name`.
    pub fn decode(name: &str, record: Map<String, Value>) -> std::result::Result<Self, DefinitionError> {
        let kind = OperationKind::from_str(name)
            .map_err(|_| DefinitionError::UnknownOperation(name.to_string()))?;

        for &field in kind.required_fields() {
            if record.get(field).is_none_or(Value::is_null) {
                return Err(DefinitionError::MissingField {
                    operation: name.to_string(),
                    field,
                });
            }
        }

        let record = Value::Object(record);
        let invalid = |e: serde_json::Error| DefinitionError::InvalidField {
            operation: name.to_string(),
            reason: e.to_string(),
        };

        let operation = match kind {
            OperationKind::DefineConstant => {
                Operation::DefineConstant(serde_json::from_value(record).map_err(invalid)?)
            }
            OperationKind::Copy => Operation::Copy(serde_json::from_value(record).map_err(invalid)?),
            OperationKind::ReplaceText => {
                Operation::ReplaceText(serde_json::from_value(record).map_err(invalid)?)
            }
            OperationKind::RunShell => {
                Operation::RunShell(serde_json::from_value(record).map_err(invalid)?)
            }
            OperationKind::RunCommanderScript => {
                Operation::RunCommanderScript(serde_json::from_value(record).map_err(invalid)?)
            }
            OperationKind::ExtractZip => {
                Operation::ExtractZip(serde_json::from_value(record).map_err(invalid)?)
            }
            OperationKind::Regex => Operation::Regex(serde_json::from_value(record).map_err(invalid)?),
        };

        Ok(operation)
    }

    /// Return a copy with every string field expanded against `store`.
    ///
    /// `DEFINE_CONSTANT` is returned unchanged: its pairs are expanded one at
    /// a time by the interpreter so later pairs can use earlier ones.
    pub fn resolve(&self, store: &ConstantStore, mode: SubstitutionMode) -> Operation {
        let sub = |text: &str| store.substitute(text, mode);

        match self {
            Operation::DefineConstant(args) => Operation::DefineConstant(args.clone()),
            Operation::Copy(args) => Operation::Copy(CopyArgs {
                source: sub(&args.source),
                destination: sub(&args.destination),
                pass_if_exists: args.pass_if_exists,
            }),
            Operation::ReplaceText(args) => Operation::ReplaceText(ReplaceTextArgs {
                file_path: sub(&args.file_path),
                old_value: sub(&args.old_value),
                new_value: sub(&args.new_value),
            }),
            Operation::RunShell(args) => Operation::RunShell(RunShellArgs {
                command: sub(&args.command),
                working_directory: args.working_directory.as_deref().map(sub),
            }),
            Operation::RunCommanderScript(args) => Operation::RunCommanderScript(RunScriptArgs {
                file_path: sub(&args.file_path),
            }),
            Operation::ExtractZip(args) => Operation::ExtractZip(ExtractZipArgs {
                source: sub(&args.source),
                destination: sub(&args.destination),
            }),
            Operation::Regex(args) => Operation::Regex(RegexArgs {
                source: sub(&args.source),
                regex_pattern: sub(&args.regex_pattern),
                text: sub(&args.text),
                append: args.append,
                expand_captures: args.expand_captures,
            }),
        }
    }

    /// Labelled field values for console output.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        match self {
            Operation::DefineConstant(args) => args
                .pairs
                .iter()
                .map(|pair| ("Pair", format!("{}: {}", pair.key, pair.value)))
                .collect(),
            Operation::Copy(args) => {
                let mut fields = vec![
                    ("Source", args.source.clone()),
                    ("Destination", args.destination.clone()),
                ];
                if args.pass_if_exists {
                    fields.push(("Pass if exists", "true".to_string()));
                }
                fields
            }
            Operation::ReplaceText(args) => vec![
                ("File path", args.file_path.clone()),
                ("Old value", args.old_value.clone()),
                ("New value", args.new_value.clone()),
            ],
            Operation::RunShell(args) => {
                let mut fields = vec![("Shell command", args.command.clone())];
                if let Some(dir) = &args.working_directory {
                    fields.push(("Working directory", dir.clone()));
                }
                fields
            }
            Operation::RunCommanderScript(args) => vec![("File path", args.file_path.clone())],
            Operation::ExtractZip(args) => vec![
                ("Source", args.source.clone()),
                ("Destination", args.destination.clone()),
            ],
            Operation::Regex(args) => vec![
                ("Source", args.source.clone()),
                ("Regex pattern", args.regex_pattern.clone()),
                ("Text", args.text.clone()),
                ("Append", args.append.to_string()),
            ],
        }
    }
}

/// One step of a script, immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Zero-based position in the script.
    pub index: usize,
    /// The raw `operation` tag, kept for logging even when it is unknown.
    pub name: String,
    pub skip: bool,
    pub wait: bool,
    operation: std::result::Result<Operation, DefinitionError>,
}

impl Step {
    fn from_record(index: usize, record: Value) -> std::result::Result<Self, String> {
        let position = index + 1;
        let Value::Object(map) = record else {
            return Err(format!("step {position}: expected an object"));
        };

        let name = match map.get("operation") {
            Some(Value::String(name)) => name.clone(),
            Some(_) => return Err(format!("step {position}: `operation` must be a string")),
            None => return Err(format!("step {position}: missing `operation` field")),
        };

        let skip = read_flag(&map, "skip", position)?;
        let wait = read_flag(&map, "wait", position)?;
        let operation = Operation::decode(&name, map);

        Ok(Step {
            index,
            name,
            skip,
            wait,
            operation,
        })
    }

    /// The decoded operation, or the reason the record could not be decoded.
    pub fn operation(&self) -> std::result::Result<&Operation, &DefinitionError> {
        self.operation.as_ref()
    }
}

fn read_flag(map: &Map<String, Value>, key: &str, position: usize) -> std::result::Result<bool, String> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(other) => Err(format!(
            "step {position}: `{key}` must be a boolean, found {other}"
        )),
    }
}

/// An ordered sequence of steps loaded from one script file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    source: Option<PathBuf>,
    steps: Vec<Step>,
}

impl Script {
    /// Load a script from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| CommanderError::load(path, format!("failed to read file: {e}")))?;

        let steps = parse_steps(&content).map_err(|reason| CommanderError::load(path, reason))?;
        tracing::debug!("Loaded {} step(s) from {}", steps.len(), path.display());

        Ok(Script {
            source: Some(path.to_path_buf()),
            steps,
        })
    }

    /// File the script was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every step whose record failed to decode, with its error.
    pub fn definition_errors(&self) -> Vec<(&Step, &DefinitionError)> {
        self.steps
            .iter()
            .filter_map(|step| step.operation().err().map(|err| (step, err)))
            .collect()
    }
}

impl FromStr for Script {
    type Err = CommanderError;

    fn from_str(content: &str) -> Result<Self> {
        let steps =
            parse_steps(content).map_err(|reason| CommanderError::load("<inline>", reason))?;
        Ok(Script {
            source: None,
            steps,
        })
    }
}

fn parse_steps(content: &str) -> std::result::Result<Vec<Step>, String> {
    let root: Value =
        serde_json::from_str(content).map_err(|e| format!("invalid JSON: {e}"))?;

    let Value::Array(records) = root else {
        return Err("expected a list of operations at the root".to_string());
    };

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| Step::from_record(index, record))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_operation_kind_names() {
        assert_eq!(OperationKind::DefineConstant.to_string(), "DEFINE_CONSTANT");
        assert_eq!(
            OperationKind::from_str("RUN_COMMANDER_SCRIPT").unwrap(),
            OperationKind::RunCommanderScript
        );
        assert_eq!(OperationKind::ExtractZip.as_ref(), "EXTRACT_ZIP");
        assert!(OperationKind::from_str("COPY_FILE").is_err());
    }

    #[test]
    fn test_every_kind_requires_fields() {
        for kind in OperationKind::iter() {
            assert!(!kind.required_fields().is_empty(), "{kind} has no required fields");
        }
    }

    #[test]
    fn test_parse_scenario_script() {
        let script: Script = r#"[
            {"operation":"DEFINE_CONSTANT","pairs":[{"key":"NAME","value":"app"}]},
            {"operation":"COPY","source":"src/${NAME}.txt","destination":"out/${NAME}.txt","wait":true}
        ]"#
        .parse()
        .unwrap();

        assert_eq!(script.len(), 2);
        let copy = &script.steps()[1];
        assert!(copy.wait);
        assert!(!copy.skip);
        match copy.operation().unwrap() {
            Operation::Copy(args) => {
                assert_eq!(args.source, "src/${NAME}.txt");
                assert!(!args.pass_if_exists);
            }
            other => panic!("Expected Copy, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_operation_kept_on_step() {
        let script: Script = r#"[{"operation":"UNKNOWN_OP"}]"#.parse().unwrap();
        assert_eq!(
            script.steps()[0].operation().unwrap_err(),
            &DefinitionError::UnknownOperation("UNKNOWN_OP".to_string())
        );
        assert_eq!(script.definition_errors().len(), 1);
    }

    #[test]
    fn test_missing_required_field() {
        let script: Script = r#"[{"operation":"REPLACE_TEXT","filePath":"a.txt","oldValue":"x"}]"#
            .parse()
            .unwrap();
        assert_eq!(
            script.steps()[0].operation().unwrap_err(),
            &DefinitionError::MissingField {
                operation: "REPLACE_TEXT".to_string(),
                field: "newValue",
            }
        );
    }

    #[test]
    fn test_null_counts_as_missing() {
        let script: Script = r#"[{"operation":"DEFINE_CONSTANT","pairs":null}]"#.parse().unwrap();
        assert!(matches!(
            script.steps()[0].operation(),
            Err(DefinitionError::MissingField { field: "pairs", .. })
        ));
    }

    #[test]
    fn test_wrong_field_type_is_invalid() {
        let script: Script = r#"[{"operation":"RUN_SHELL","command":42}]"#.parse().unwrap();
        assert!(matches!(
            script.steps()[0].operation(),
            Err(DefinitionError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            "{\"operation\":\"COPY\"}".parse::<Script>(),
            Err(CommanderError::Load { .. })
        ));
        assert!(matches!("not json".parse::<Script>(), Err(CommanderError::Load { .. })));
        assert!(matches!(
            r#"[{"source":"a"}]"#.parse::<Script>(),
            Err(CommanderError::Load { .. })
        ));
        assert!(matches!(
            r#"[{"operation":"COPY","source":"a","destination":"b","skip":"yes"}]"#.parse::<Script>(),
            Err(CommanderError::Load { .. })
        ));
        assert!(matches!(
            Script::load("/definitely/not/here.json"),
            Err(CommanderError::Load { .. })
        ));
    }

    #[test]
    fn test_resolve_does_not_touch_record() {
        let script: Script =
            r#"[{"operation":"RUN_SHELL","command":"echo ${V}","workingDirectory":"${D}"}]"#
                .parse()
                .unwrap();
        let store: ConstantStore = [("V", "1"), ("D", "/tmp")].into_iter().collect();

        let original = script.steps()[0].operation().unwrap();
        let resolved = original.resolve(&store, SubstitutionMode::Chained);

        assert_eq!(
            resolved,
            Operation::RunShell(RunShellArgs {
                command: "echo 1".to_string(),
                working_directory: Some("/tmp".to_string()),
            })
        );
        match original {
            Operation::RunShell(args) => assert_eq!(args.command, "echo ${V}"),
            other => panic!("Expected RunShell, got {other:?}"),
        }
    }
}
