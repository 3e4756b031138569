//! PT-016: Hierarchy file parsing and validation.
//!
//! Parses hierarchy.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - Names must not be blank
//! - Children must be allowed by the project's template
//! - No two siblings of the same type share a name
//! - Frame fields are integers and frame_out >= frame_in

use super::rules::{self, Template};
use super::types::*;
use crate::{Error, Result};
use rustc_hash::FxHashSet;
use serde_json::Value;
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a hierarchy file from disk.
pub fn parse_hierarchy_file(path: &Path) -> Result<HierarchyFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Input(format!("failed to read {}: {}", path.display(), e)))?;
    parse_hierarchy(&content)
}

/// Parse a hierarchy file from a string.
pub fn parse_hierarchy(yaml: &str) -> Result<HierarchyFile> {
    serde_yaml_ng::from_str(yaml).map_err(|e| Error::Input(format!("YAML parse error: {}", e)))
}

/// Parse and validate; any validation error fails the load.
pub fn load_hierarchy(path: &Path) -> Result<HierarchyFile> {
    let file = parse_hierarchy_file(path)?;
    let errors = validate_hierarchy(&file);
    if errors.is_empty() {
        return Ok(file);
    }
    let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
    Err(Error::Input(format!(
        "{} has {} validation error(s): {}",
        path.display(),
        errors.len(),
        joined.join("; ")
    )))
}

/// Template the compiler will use for this tree.
pub fn template_for(file: &HierarchyFile) -> Template {
    if file.root.kind != EntityType::Project {
        return Template::Custom;
    }
    let pt = match file.root.property_str("production_type") {
        None => file.settings.default_production_type,
        Some(raw) => ProductionType::parse(raw).unwrap_or(ProductionType::Custom),
    };
    Template::for_production(pt)
}

/// Validate a parsed hierarchy. Returns a list of errors (empty = valid).
pub fn validate_hierarchy(file: &HierarchyFile) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if file.version != "1.0" {
        errors.push(ValidationError {
            message: format!("version must be \"1.0\", got \"{}\"", file.version),
        });
    }

    let template = template_for(file);
    validate_node(&file.root, &file.root.name, template, &mut errors);
    errors
}

fn validate_node(node: &AuthoredNode, path: &str, template: Template, errors: &mut Vec<ValidationError>) {
    if node.name.trim().is_empty() {
        errors.push(ValidationError {
            message: format!("{} at '{}' has a blank name", node.kind, path),
        });
    }

    validate_properties(node, path, errors);

    let mut seen: FxHashSet<(EntityType, &str)> = FxHashSet::default();
    for child in &node.children {
        let child_path = format!("{}/{}", path, child.name);
        if !rules::allows_child(template, node.kind, child.kind) {
            errors.push(ValidationError {
                message: format!(
                    "{} '{}' is not allowed under {} in a {} project",
                    child.kind, child_path, node.kind, template
                ),
            });
        }
        if !seen.insert((child.kind, child.name.as_str())) {
            errors.push(ValidationError {
                message: format!("duplicate {} '{}' under '{}'", child.kind, child.name, path),
            });
        }
        validate_node(child, &child_path, template, errors);
    }
}

fn validate_properties(node: &AuthoredNode, path: &str, errors: &mut Vec<ValidationError>) {
    let mut int_field = |key: &str| -> Option<i64> {
        let value = node.properties.get(key).filter(|v| !v.is_null())?;
        match value.as_i64() {
            Some(n) => Some(n),
            None => {
                errors.push(ValidationError {
                    message: format!("{} '{}': {} must be an integer, got {}", node.kind, path, key, value),
                });
                None
            }
        }
    };
    let frame_in = int_field("frame_in");
    let frame_out = int_field("frame_out");
    int_field("nb_frames");
    if let (Some(fi), Some(fo)) = (frame_in, frame_out) {
        if fo < fi {
            errors.push(ValidationError {
                message: format!(
                    "{} '{}': frame_out ({}) is before frame_in ({})",
                    node.kind, path, fo, fi
                ),
            });
        }
    }

    if let Some(tasks) = node.properties.get("tasks") {
        let ok = tasks
            .as_array()
            .is_some_and(|a| a.iter().all(Value::is_string));
        if !ok {
            errors.push(ValidationError {
                message: format!("{} '{}': tasks must be a list of names", node.kind, path),
            });
        }
    }

    if let Some(custom) = node.properties.get("custom_data") {
        if !custom.is_object() {
            errors.push(ValidationError {
                message: format!("{} '{}': custom_data must be a mapping", node.kind, path),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
version: "1.0"
root:
  type: project
  name: Feature
  properties:
    production_type: film
  children:
    - type: sequence
      name: SQ10
      children:
        - type: shot
          name: SH10
          properties: {frame_in: 1001, frame_out: 1100, tasks: [Compositing, Lighting]}
        - type: shot
          name: SH20
    - type: asset_type
      name: Character
      children:
        - type: asset
          name: Hero
          properties:
            custom_data: {rig: {value: v2}}
"#;

    fn messages(file: &HierarchyFile) -> Vec<String> {
        validate_hierarchy(file)
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[test]
    fn test_pt016_parse_valid() {
        let file = parse_hierarchy(VALID).unwrap();
        assert_eq!(file.root.count(), 5);
        assert!(validate_hierarchy(&file).is_empty());
        assert_eq!(template_for(&file), Template::FeatureFilm);
    }

    #[test]
    fn test_pt016_parse_error() {
        let err = parse_hierarchy("root: [").unwrap_err();
        assert!(matches!(err, Error::Input(_)));
        assert!(err.to_string().contains("YAML parse error"));
    }

    #[test]
    fn test_pt016_unknown_entity_type() {
        let yaml = "version: \"1.0\"\nroot: {type: camera, name: A}\n";
        assert!(parse_hierarchy(yaml).is_err());
    }

    #[test]
    fn test_pt016_bad_version() {
        let mut file = parse_hierarchy(VALID).unwrap();
        file.version = "2.0".to_string();
        assert!(messages(&file)[0].contains("version must be \"1.0\""));
    }

    #[test]
    fn test_pt016_template_violation() {
        let mut file = parse_hierarchy(VALID).unwrap();
        file.root
            .children
            .push(AuthoredNode::new(EntityType::Episode, "EP1"));
        let msgs = messages(&file);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].contains("episode 'Feature/EP1' is not allowed under project in a Feature Film project"));
    }

    #[test]
    fn test_pt016_duplicates_and_blank_names() {
        let mut file = parse_hierarchy(VALID).unwrap();
        file.root
            .children
            .push(AuthoredNode::new(EntityType::Sequence, "SQ10"));
        file.root.children.push(AuthoredNode::new(EntityType::Sequence, " "));
        let msgs = messages(&file);
        assert!(msgs.iter().any(|m| m.contains("duplicate sequence 'SQ10' under 'Feature'")));
        assert!(msgs.iter().any(|m| m.contains("blank name")));
    }

    #[test]
    fn test_pt016_same_name_different_type_ok() {
        let mut file = parse_hierarchy(VALID).unwrap();
        file.root
            .children
            .push(AuthoredNode::new(EntityType::AssetType, "SQ10"));
        assert!(validate_hierarchy(&file).is_empty());
    }

    #[test]
    fn test_pt016_frame_checks() {
        let yaml = r#"
version: "1.0"
root:
  type: sequence
  name: SQ1
  children:
    - type: shot
      name: A
      properties: {frame_in: 1100, frame_out: 1001}
    - type: shot
      name: B
      properties: {frame_in: "1001", tasks: Compositing}
"#;
        let file = parse_hierarchy(yaml).unwrap();
        let msgs = messages(&file);
        assert_eq!(msgs.len(), 3, "{:?}", msgs);
        assert!(msgs[0].contains("frame_out (1001) is before frame_in (1100)"));
        assert!(msgs[1].contains("frame_in must be an integer"));
        assert!(msgs[2].contains("tasks must be a list"));
    }

    #[test]
    fn test_pt016_load_hierarchy_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.yaml");
        std::fs::write(&good, VALID).unwrap();
        assert_eq!(load_hierarchy(&good).unwrap().root.name, "Feature");

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, VALID.replace("\"1.0\"", "\"0.9\"")).unwrap();
        let err = load_hierarchy(&bad).unwrap_err();
        assert!(err.to_string().contains("1 validation error(s)"));

        assert!(load_hierarchy(&dir.path().join("missing.yaml")).is_err());
    }
}
