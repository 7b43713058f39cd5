//! Data models module
//!
//! Defines the rule record and detection-section structures shared by the
//! compiler, the search evaluator, and the loader.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One loaded Sigma rule as the browser sees it.
///
/// `content` is the authoritative raw YAML source; the other fields are
/// derived at load time and may lag behind an edited `content`, but they are
/// always present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleRecord {
    /// Rule title
    #[serde(default)]
    pub title: String,

    /// Rule description
    #[serde(default)]
    pub description: String,

    /// Rule tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Unique path relative to the rules directory, forward-slash separated
    #[serde(default)]
    pub file_path: String,

    /// Log source definition
    #[serde(default)]
    pub logsource: LogSource,

    /// Raw YAML source of the rule
    #[serde(default)]
    pub content: String,
}

/// Sigma log source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSource {
    /// Category (e.g., process_creation, network_connection)
    #[serde(default)]
    pub category: Option<String>,

    /// Product (e.g., windows)
    #[serde(default)]
    pub product: Option<String>,

    /// Service (e.g., sysmon)
    #[serde(default)]
    pub service: Option<String>,
}

/// Detection definition
///
/// Selection groups keep their decoded YAML values; the compiler classifies
/// them via [`SelectionValue`]. A `BTreeMap` keeps group iteration (and with
/// it the compiled clause order) stable across runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Detection {
    /// Condition string for boolean logic evaluation
    #[serde(default)]
    pub condition: Option<String>,

    /// Selection groups (can be multiple selections, plus `timeframe`)
    #[serde(flatten)]
    pub selections: BTreeMap<String, serde_yaml::Value>,
}

/// Classified shape of one selection group's value.
///
/// Sigma detection values are loosely typed: a mapping of field expressions,
/// a list of such mappings, or (in broken rules) a bare string. Classifying
/// up front makes the soft-failure paths explicit instead of scattering type
/// probes through the compiler.
#[derive(Debug, Clone)]
pub enum SelectionValue {
    /// Field-expression -> match-value(s) mapping; AND across keys.
    Fields(serde_yaml::Mapping),

    /// List of field mappings; OR across items, AND within one item.
    /// Non-mapping list entries (e.g. keyword lists) carry no field logic
    /// and are dropped.
    Items(Vec<serde_yaml::Mapping>),

    /// A bare string that looks like a field expression missing its trailing
    /// colon (`Field|contains` instead of `Field|contains:`). This is a rule
    /// syntax error; the whole compile degrades to a diagnostic.
    MissingColon(String),

    /// Any other value shape; logged and skipped.
    Unexpected(serde_yaml::Value),
}

impl SelectionValue {
    /// Classify a decoded selection group value.
    pub fn classify(value: &serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Mapping(map) => SelectionValue::Fields(map.clone()),
            serde_yaml::Value::Sequence(seq) => {
                let items: Vec<serde_yaml::Mapping> = seq
                    .iter()
                    .filter_map(|item| item.as_mapping().cloned())
                    .collect();
                SelectionValue::Items(items)
            }
            serde_yaml::Value::String(s) => {
                if looks_like_missing_colon(s) {
                    SelectionValue::MissingColon(s.clone())
                } else {
                    SelectionValue::Unexpected(value.clone())
                }
            }
            _ => SelectionValue::Unexpected(value.clone()),
        }
    }
}

/// Heuristic for the classic YAML mistake of `Field|contains` without the
/// colon, which folds the whole block into one string value.
fn looks_like_missing_colon(value: &str) -> bool {
    if !value.contains('|') {
        return false;
    }
    let trimmed = value.trim();
    value.contains('-')
        || trimmed.ends_with("|contains")
        || trimmed.ends_with("|startswith")
        || trimmed.ends_with("|endswith")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_decodes_flattened_selections() {
        let yaml = r#"
selection:
  Image: whoami.exe
filter:
  User: SYSTEM
condition: selection and not filter
"#;
        let detection: Detection = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            detection.condition.as_deref(),
            Some("selection and not filter")
        );
        assert_eq!(detection.selections.len(), 2);
        assert!(detection.selections.contains_key("selection"));
        assert!(detection.selections.contains_key("filter"));
    }

    #[test]
    fn test_classify_mapping() {
        let value: serde_yaml::Value = serde_yaml::from_str("Image: cmd.exe").unwrap();
        assert!(matches!(
            SelectionValue::classify(&value),
            SelectionValue::Fields(_)
        ));
    }

    #[test]
    fn test_classify_list_of_mappings() {
        let value: serde_yaml::Value =
            serde_yaml::from_str("- Image: cmd.exe\n- Image: powershell.exe").unwrap();
        match SelectionValue::classify(&value) {
            SelectionValue::Items(items) => assert_eq!(items.len(), 2),
            other => panic!("Expected Items, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_keyword_list_has_no_items() {
        let value: serde_yaml::Value = serde_yaml::from_str("- mimikatz\n- sekurlsa").unwrap();
        match SelectionValue::classify(&value) {
            SelectionValue::Items(items) => assert!(items.is_empty()),
            other => panic!("Expected Items, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_missing_colon() {
        let value = serde_yaml::Value::String("CommandLine|contains".to_string());
        assert!(matches!(
            SelectionValue::classify(&value),
            SelectionValue::MissingColon(_)
        ));

        let value = serde_yaml::Value::String("just a comment".to_string());
        assert!(matches!(
            SelectionValue::classify(&value),
            SelectionValue::Unexpected(_)
        ));
    }
}
