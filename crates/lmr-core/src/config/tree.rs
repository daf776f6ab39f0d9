use crate::domain::{LmrError, LmrResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Nested key-value job description. Sections map names to children, leaves
/// hold the raw text of a value; coercion to numbers and flags happens in the
/// normalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigTree {
    Leaf(String),
    Section(BTreeMap<String, ConfigTree>),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigTreeError {
    #[error("failed to read job file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse job file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("job file root must be an object of sections")]
    RootNotSection,
    #[error("value at '{path}' is a list; only sections and scalar values are supported")]
    UnsupportedList { path: String },
}

impl From<ConfigTreeError> for LmrError {
    fn from(error: ConfigTreeError) -> Self {
        LmrError::configuration("CONFIG.JOB_FILE", error.to_string())
    }
}

impl ConfigTree {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigTreeError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigTreeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigTreeError> {
        let value: Value = serde_json::from_str(content)?;
        Self::from_json_value(value)
    }

    pub fn from_json_value(value: Value) -> Result<Self, ConfigTreeError> {
        match value {
            Value::Object(_) => convert(value, ""),
            _ => Err(ConfigTreeError::RootNotSection),
        }
    }

    pub fn child(&self, name: &str) -> Option<&ConfigTree> {
        match self {
            Self::Section(children) => children.get(name),
            Self::Leaf(_) => None,
        }
    }

    /// Root view used by the normalizer for path-aware lookups.
    pub fn root(&self) -> Section<'_> {
        Section {
            path: String::new(),
            node: self,
        }
    }
}

fn convert(value: Value, path: &str) -> Result<ConfigTree, ConfigTreeError> {
    match value {
        Value::Object(entries) => {
            let mut children = BTreeMap::new();
            for (key, child) in entries {
                // null behaves like an absent key so optional fields fall back to defaults
                if child.is_null() {
                    continue;
                }
                let child_path = join_path(path, &key);
                children.insert(key, convert(child, &child_path)?);
            }
            Ok(ConfigTree::Section(children))
        }
        Value::String(text) => Ok(ConfigTree::Leaf(text.trim().to_string())),
        Value::Bool(flag) => Ok(ConfigTree::Leaf(flag.to_string())),
        Value::Number(number) => Ok(ConfigTree::Leaf(number.to_string())),
        Value::Array(_) => Err(ConfigTreeError::UnsupportedList {
            path: path.to_string(),
        }),
        Value::Null => Ok(ConfigTree::Leaf(String::new())),
    }
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", parent, key)
    }
}

/// Borrowed view of one section that remembers where it sits in the tree, so
/// missing-field errors can name the full path.
#[derive(Debug, Clone)]
pub struct Section<'a> {
    path: String,
    node: &'a ConfigTree,
}

impl<'a> Section<'a> {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn section(&self, name: &str) -> LmrResult<Section<'a>> {
        let path = join_path(&self.path, name);
        match self.node.child(name) {
            Some(node) if matches!(node, ConfigTree::Section(_)) => Ok(Section { path, node }),
            Some(_) => Err(LmrError::configuration(
                "CONFIG.EXPECTED_SECTION",
                format!("'{}' must be a section, found a plain value", path),
            )),
            None => Err(LmrError::configuration(
                "CONFIG.MISSING_SECTION",
                format!("required section '{}' is missing from the job file", path),
            )),
        }
    }

    pub fn optional(&self, name: &str) -> LmrResult<Option<&'a str>> {
        match self.node.child(name) {
            Some(ConfigTree::Leaf(text)) => Ok(Some(text.as_str())),
            Some(ConfigTree::Section(_)) => Err(LmrError::configuration(
                "CONFIG.EXPECTED_VALUE",
                format!(
                    "'{}' must be a plain value, found a section",
                    join_path(&self.path, name)
                ),
            )),
            None => Ok(None),
        }
    }

    pub fn required(&self, name: &str) -> LmrResult<&'a str> {
        self.optional(name)?.ok_or_else(|| {
            LmrError::configuration(
                "CONFIG.MISSING_FIELD",
                format!(
                    "required field '{}' is missing from the job file",
                    join_path(&self.path, name)
                ),
            )
        })
    }

    pub fn integer<T: std::str::FromStr>(&self, name: &str) -> LmrResult<T> {
        let raw = self.required(name)?;
        parse_integer(raw, &join_path(&self.path, name))
    }

    pub fn optional_integer<T: std::str::FromStr>(&self, name: &str) -> LmrResult<Option<T>> {
        match self.optional(name)? {
            Some(raw) => parse_integer(raw, &join_path(&self.path, name)).map(Some),
            None => Ok(None),
        }
    }

    pub fn float(&self, name: &str) -> LmrResult<f64> {
        let raw = self.required(name)?;
        raw.parse::<f64>().map_err(|_| {
            LmrError::configuration(
                "CONFIG.INVALID_NUMBER",
                format!(
                    "'{}' must be a number, got '{}'",
                    join_path(&self.path, name),
                    raw
                ),
            )
        })
    }

    /// Only the exact lowercase token `true` is true.
    pub fn flag(&self, name: &str) -> LmrResult<bool> {
        self.required(name).map(is_true)
    }

    pub fn optional_flag(&self, name: &str) -> LmrResult<Option<bool>> {
        self.optional(name).map(|value| value.map(is_true))
    }
}

fn is_true(raw: &str) -> bool {
    raw == "true"
}

fn parse_integer<T: std::str::FromStr>(raw: &str, path: &str) -> LmrResult<T> {
    raw.parse::<T>().map_err(|_| {
        LmrError::configuration(
            "CONFIG.INVALID_INTEGER",
            format!("'{}' must be a non-negative integer, got '{}'", path, raw),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::{ConfigTree, ConfigTreeError};
    use crate::domain::LmrErrorCategory;

    #[test]
    fn scalars_become_text_leaves() {
        let tree = ConfigTree::from_json_str(
            r#"{ "Output_Controls": { "description": " run ", "write_log_file": true, "model_resolution": { "x": 64 } } }"#,
        )
        .expect("tree should parse");

        let output = tree.root().section("Output_Controls").expect("section exists");
        assert_eq!(output.required("description").expect("leaf"), "run");
        assert_eq!(output.required("write_log_file").expect("leaf"), "true");
        let resolution = output.section("model_resolution").expect("nested section");
        assert_eq!(resolution.integer::<u32>("x").expect("integer"), 64);
        assert_eq!(resolution.path(), "Output_Controls/model_resolution");
    }

    #[test]
    fn null_values_are_treated_as_absent() {
        let tree = ConfigTree::from_json_str(r#"{ "Restarting_Controls": { "restart": "false", "restart_from_step": null } }"#)
            .expect("tree should parse");
        let restarting = tree.root().section("Restarting_Controls").expect("section");
        assert_eq!(restarting.optional("restart_from_step").expect("lookup"), None);
    }

    #[test]
    fn flags_only_accept_lowercase_true() {
        let tree = ConfigTree::from_json_str(
            r#"{ "S": { "a": "true", "b": "True", "c": "yes", "d": false } }"#,
        )
        .expect("tree should parse");
        let section = tree.root().section("S").expect("section");
        assert!(section.flag("a").expect("flag"));
        assert!(!section.flag("b").expect("flag"));
        assert!(!section.flag("c").expect("flag"));
        assert!(!section.flag("d").expect("flag"));
    }

    #[test]
    fn missing_entries_name_their_full_path() {
        let tree = ConfigTree::from_json_str(r#"{ "Solver_Details": { "linear_solver": {} } }"#)
            .expect("tree should parse");

        let missing_section = tree
            .root()
            .section("Output_Controls")
            .expect_err("absent section should fail");
        assert_eq!(missing_section.code(), "CONFIG.MISSING_SECTION");
        assert!(missing_section.message().contains("'Output_Controls'"));

        let linear = tree
            .root()
            .section("Solver_Details")
            .and_then(|solver| solver.section("linear_solver"))
            .expect("nested section exists");
        let missing_field = linear
            .float("tolerance")
            .expect_err("absent field should fail");
        assert_eq!(missing_field.category(), LmrErrorCategory::Configuration);
        assert_eq!(missing_field.code(), "CONFIG.MISSING_FIELD");
        assert!(
            missing_field
                .message()
                .contains("Solver_Details/linear_solver/tolerance")
        );
    }

    #[test]
    fn negative_integers_are_rejected() {
        let tree = ConfigTree::from_json_str(r#"{ "R": { "x": -4 } }"#).expect("tree should parse");
        let error = tree
            .root()
            .section("R")
            .and_then(|section| section.integer::<u32>("x"))
            .expect_err("negative resolution should fail");
        assert_eq!(error.code(), "CONFIG.INVALID_INTEGER");
    }

    #[test]
    fn lists_and_scalar_roots_are_rejected() {
        assert!(matches!(
            ConfigTree::from_json_str(r#"{ "A": { "b": [1, 2] } }"#),
            Err(ConfigTreeError::UnsupportedList { ref path }) if path == "A/b"
        ));
        assert!(matches!(
            ConfigTree::from_json_str("3"),
            Err(ConfigTreeError::RootNotSection)
        ));
    }
}
