//! Rule grouping for the browse view
//!
//! Groups and sorts rule records for listing: by subcategory when a category
//! filter is active, by logsource product otherwise. Pure in-memory
//! transformation; the web layer only renders the result.

use crate::models::RuleRecord;
use std::collections::BTreeMap;

/// Top-level categories whose trees mix products, so grouping by logsource
/// reads better than grouping by path segment.
const SPECIAL_CATEGORIES: [&str; 5] = [
    "customs",
    "rules-emerging-threats",
    "rules-threat-hunting",
    "rules-compliance",
    "rules-dfir",
];

/// Products pinned to the top of the ungrouped listing.
const PRIORITY_PRODUCTS: [&str; 3] = ["Windows", "Linux", "Antivirus"];

/// Group rules for display. `category` is the active category filter, if
/// any. Groups come back in display order; rules within a group sort by
/// title (file path as fallback), case-insensitively.
pub fn group_rules(
    rules: &[RuleRecord],
    category: Option<&str>,
) -> Vec<(String, Vec<RuleRecord>)> {
    match category {
        Some(cat) if SPECIAL_CATEGORIES.contains(&cat.to_lowercase().as_str()) => {
            group_sorted(rules, logsource_group_key)
        }
        Some(cat) => {
            let cat = cat.to_string();
            group_sorted(rules, move |rule| extract_subcategory(&rule.file_path, &cat))
        }
        None => group_by_product_priority(rules),
    }
}

/// Group by an arbitrary key, groups in alphabetical order.
fn group_sorted<F>(rules: &[RuleRecord], key_of: F) -> Vec<(String, Vec<RuleRecord>)>
where
    F: Fn(&RuleRecord) -> String,
{
    let mut grouped: BTreeMap<String, Vec<RuleRecord>> = BTreeMap::new();
    for rule in rules {
        grouped.entry(key_of(rule)).or_default().push(rule.clone());
    }

    grouped
        .into_iter()
        .map(|(key, mut group)| {
            sort_rules(&mut group);
            (key, group)
        })
        .collect()
}

/// Ungrouped listing: priority products first, then the rest alphabetically,
/// Unknown always last.
fn group_by_product_priority(rules: &[RuleRecord]) -> Vec<(String, Vec<RuleRecord>)> {
    let mut grouped: BTreeMap<String, Vec<RuleRecord>> = BTreeMap::new();
    for rule in rules {
        grouped
            .entry(logsource_group_key(rule))
            .or_default()
            .push(rule.clone());
    }

    let mut ordered: Vec<String> = PRIORITY_PRODUCTS
        .iter()
        .filter(|p| grouped.contains_key(**p))
        .map(|p| p.to_string())
        .collect();
    ordered.extend(
        grouped
            .keys()
            .filter(|k| !PRIORITY_PRODUCTS.contains(&k.as_str()) && *k != "Unknown")
            .cloned(),
    );
    if grouped.contains_key("Unknown") {
        ordered.push("Unknown".to_string());
    }

    ordered
        .into_iter()
        .map(|key| {
            let mut group = grouped.remove(&key).unwrap_or_default();
            sort_rules(&mut group);
            (key, group)
        })
        .collect()
}

/// Grouping key from the logsource: product, else category, else Unknown.
fn logsource_group_key(rule: &RuleRecord) -> String {
    if let Some(product) = rule.logsource.product.as_deref() {
        if !product.trim().is_empty() {
            return capitalize(product.trim());
        }
    }
    if let Some(category) = rule.logsource.category.as_deref() {
        if !category.trim().is_empty() {
            return capitalize(category.trim());
        }
    }
    "Unknown".to_string()
}

/// Subcategory is the path segment right after the category segment.
fn extract_subcategory(file_path: &str, category: &str) -> String {
    let category = category.to_lowercase();
    let parts: Vec<String> = file_path.to_lowercase().split('/').map(str::to_string).collect();
    if let Some(idx) = parts.iter().position(|part| *part == category) {
        if idx + 1 < parts.len() {
            return format_subcategory(&parts[idx + 1]);
        }
    }
    "Other".to_string()
}

/// `process_creation` -> `Process Creation`
fn format_subcategory(subcategory: &str) -> String {
    subcategory
        .replace('_', " ")
        .split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// First letter upper, rest lower.
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

fn sort_rules(rules: &mut [RuleRecord]) {
    rules.sort_by_key(|rule| {
        if rule.title.is_empty() {
            rule.file_path.to_lowercase()
        } else {
            rule.title.to_lowercase()
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogSource;

    fn rule(title: &str, path: &str, product: Option<&str>, category: Option<&str>) -> RuleRecord {
        RuleRecord {
            title: title.to_string(),
            file_path: path.to_string(),
            logsource: LogSource {
                product: product.map(str::to_string),
                category: category.map(str::to_string),
                service: None,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_priority_products_first_unknown_last() {
        let rules = vec![
            rule("Z", "macos/a.yml", Some("macos"), None),
            rule("A", "windows/a.yml", Some("windows"), None),
            rule("B", "other/b.yml", None, None),
            rule("C", "linux/c.yml", Some("linux"), None),
        ];

        let grouped = group_rules(&rules, None);
        let keys: Vec<&str> = grouped.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["Windows", "Linux", "Macos", "Unknown"]);
    }

    #[test]
    fn test_category_fallback_for_missing_product() {
        let rules = vec![rule(
            "A",
            "windows/a.yml",
            Some("  "),
            Some("process_creation"),
        )];
        let grouped = group_rules(&rules, None);
        assert_eq!(grouped[0].0, "Process_creation");
    }

    #[test]
    fn test_subcategory_grouping() {
        let rules = vec![
            rule("B", "windows/process_creation/b.yml", Some("windows"), None),
            rule("A", "windows/process_creation/a.yml", Some("windows"), None),
            rule("C", "windows/registry/c.yml", Some("windows"), None),
            rule("D", "deprecated/d.yml", Some("windows"), None),
        ];

        let grouped = group_rules(&rules, Some("windows"));
        let keys: Vec<&str> = grouped.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["Other", "Process Creation", "Registry"]);

        let process_creation = &grouped[1].1;
        assert_eq!(process_creation[0].title, "A");
        assert_eq!(process_creation[1].title, "B");
    }

    #[test]
    fn test_special_category_groups_by_product() {
        let rules = vec![
            rule("A", "rules-dfir/windows/a.yml", Some("windows"), None),
            rule("B", "rules-dfir/linux/b.yml", Some("linux"), None),
        ];

        let grouped = group_rules(&rules, Some("rules-dfir"));
        let keys: Vec<&str> = grouped.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["Linux", "Windows"]);
    }

    #[test]
    fn test_sort_falls_back_to_file_path() {
        let rules = vec![
            rule("", "windows/zzz.yml", Some("windows"), None),
            rule("", "windows/aaa.yml", Some("windows"), None),
        ];
        let grouped = group_rules(&rules, None);
        assert_eq!(grouped[0].1[0].file_path, "windows/aaa.yml");
    }
}
