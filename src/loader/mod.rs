//! Rule loading module
//!
//! Walks a rules directory recursively and builds the in-memory rule
//! records the core components operate on. Individual bad files are logged
//! and skipped; only a missing directory is an error.

use crate::models::{Detection, LogSource, RuleRecord};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Files larger than this are not detection rules; skip them outright.
const MAX_RULE_FILE_BYTES: u64 = 1024 * 1024;

/// Load all rules under `rules_dir` (recursively).
pub fn load_rules<P: AsRef<Path>>(rules_dir: P) -> Result<Vec<RuleRecord>> {
    let rules_dir = rules_dir.as_ref();

    if !rules_dir.exists() {
        anyhow::bail!("Rules directory does not exist: {:?}", rules_dir);
    }

    info!("Loading Sigma rules from: {:?} (recursive)", rules_dir);

    let mut records = Vec::new();
    load_rules_recursive(rules_dir, rules_dir, &mut records)?;

    info!("Loaded {} Sigma rules total", records.len());
    Ok(records)
}

fn load_rules_recursive(root: &Path, dir: &Path, records: &mut Vec<RuleRecord>) -> Result<()> {
    let entries = fs::read_dir(dir).context("Failed to read directory")?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            load_rules_recursive(root, &path, records)?;
            continue;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if ext != "yml" && ext != "yaml" {
            continue;
        }

        if let Ok(meta) = fs::metadata(&path) {
            if meta.len() > MAX_RULE_FILE_BYTES {
                warn!("Skipping oversized rule file: {:?}", path);
                continue;
            }
        }

        match load_rule(root, &path) {
            Ok(Some(record)) => {
                debug!("Loaded rule: {}", record.file_path);
                records.push(record);
            }
            Ok(None) => {
                debug!("Skipped non-rule YAML file: {:?}", path);
            }
            Err(e) => {
                warn!("Failed to load rule {:?}: {}", path, e);
            }
        }
    }

    Ok(())
}

/// Load one rule file. Returns `Ok(None)` for YAML files that are not rules
/// (no `title` and no `detection` key).
fn load_rule(root: &Path, path: &Path) -> Result<Option<RuleRecord>> {
    let content = fs::read_to_string(path).context("Failed to read rule file")?;

    let doc: serde_yaml::Value =
        serde_yaml::from_str(&content).context("Failed to parse YAML")?;
    if doc.as_mapping().is_none() {
        return Ok(None);
    }
    if doc.get("title").is_none() && doc.get("detection").is_none() {
        return Ok(None);
    }

    let relative = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");

    let title = doc
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let description = doc
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let tags = doc
        .get("tags")
        .and_then(|v| v.as_sequence())
        .map(|seq| {
            seq.iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let logsource = doc
        .get("logsource")
        .and_then(|v| serde_yaml::from_value::<LogSource>(v.clone()).ok())
        .unwrap_or_default();

    Ok(Some(RuleRecord {
        title,
        description,
        tags,
        file_path: relative,
        logsource,
        content,
    }))
}

/// Re-decode the detection section from a record's authoritative content.
pub fn detection_of(record: &RuleRecord) -> Option<Detection> {
    let doc: serde_yaml::Value = serde_yaml::from_str(&record.content).ok()?;
    let detection = doc.get("detection")?;
    serde_yaml::from_value(detection.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const RULE_YAML: &str = "title: Suspicious Whoami\n\
                             description: Detects whoami execution\n\
                             tags:\n    - attack.discovery\n\
                             logsource:\n    product: windows\n\
                             detection:\n    selection:\n        Image: whoami.exe\n    condition: selection\n";

    #[test]
    fn test_load_rules_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("windows").join("process_creation");
        fs::create_dir_all(&sub).unwrap();

        fs::write(sub.join("win_whoami.yml"), RULE_YAML).unwrap();
        fs::write(sub.join(".hidden.yml"), RULE_YAML).unwrap();
        fs::write(sub.join("notes.txt"), "not a rule").unwrap();
        fs::write(sub.join("not_a_rule.yml"), "just: data\n").unwrap();

        let records = load_rules(dir.path()).unwrap();
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.title, "Suspicious Whoami");
        assert_eq!(record.tags, vec!["attack.discovery"]);
        assert_eq!(
            record.file_path,
            "windows/process_creation/win_whoami.yml"
        );
        assert_eq!(record.logsource.product.as_deref(), Some("windows"));
        assert_eq!(record.content, RULE_YAML);
    }

    #[test]
    fn test_load_rules_missing_directory_errors() {
        let result = load_rules("definitely/not/a/real/dir");
        assert!(result.is_err());
    }

    #[test]
    fn test_unparseable_yaml_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.yml"), "title: [unclosed\n").unwrap();
        fs::write(dir.path().join("good.yml"), RULE_YAML).unwrap();

        let records = load_rules(dir.path()).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_detection_of_roundtrip() {
        let record = RuleRecord {
            content: RULE_YAML.to_string(),
            ..Default::default()
        };
        let detection = detection_of(&record).unwrap();
        assert_eq!(detection.condition.as_deref(), Some("selection"));
        assert!(detection.selections.contains_key("selection"));

        let no_detection = RuleRecord {
            content: "title: only a title\n".to_string(),
            ..Default::default()
        };
        assert!(detection_of(&no_detection).is_none());
    }
}
