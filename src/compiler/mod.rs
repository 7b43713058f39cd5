//! Detection condition compiler
//!
//! Turns a rule's detection section into a single Stellar boolean query
//! string: selection groups compile to comparison clauses, then the
//! condition string decides how the groups combine.
//!
//! Compilation never fails. Malformed detections degrade to a diagnostic
//! string and unsupported aggregation modifiers render as inert comment
//! placeholders, so the caller always gets something it can display.

use crate::catalog;
use crate::models::{Detection, SelectionValue};
use crate::util::{is_fully_parenthesized, split_top_level};
use tracing::{error, warn};

/// Fixed diagnostic returned when no clause can be extracted at all.
pub const NO_DETECTION_LOGIC: &str =
    "# No detection logic found. Check YAML syntax - missing colons after field expressions?";

/// Ordered table of selection-group name -> compiled clause list.
///
/// Insertion order is what the condition quantifiers (`1 of`, `all of`,
/// `them`) and the implicit no-condition join iterate in, so it must be
/// stable; `Detection` hands us groups in sorted order and `filter` is
/// appended last.
#[derive(Debug, Default)]
pub struct ClauseTable {
    groups: Vec<(String, Vec<String>)>,
}

impl ClauseTable {
    fn insert(&mut self, name: String, clauses: Vec<String>) {
        self.groups.push((name, clauses));
    }

    fn get(&self, name: &str) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|(group, _)| group == name)
            .map(|(_, clauses)| clauses.as_slice())
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.groups
            .iter()
            .map(|(name, clauses)| (name.as_str(), clauses.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Compile a detection section into a Stellar query string.
pub fn compile(detection: &Detection) -> String {
    let table = extract_clauses(detection);
    if table.is_empty() {
        return NO_DETECTION_LOGIC.to_string();
    }

    match detection.condition.as_deref() {
        Some(cond) if !cond.trim().is_empty() => {
            parse_condition(cond, &table).unwrap_or_else(|| NO_DETECTION_LOGIC.to_string())
        }
        _ => implicit_join(&table),
    }
}

/// Extract the clause table from every selection group.
///
/// A missing-colon malformation aborts extraction entirely (the resulting
/// empty table makes `compile` return the diagnostic); other unexpected
/// shapes are logged and skipped.
pub fn extract_clauses(detection: &Detection) -> ClauseTable {
    let mut table = ClauseTable::default();
    let mut filter_groups: Vec<(String, Vec<String>)> = Vec::new();

    for (name, value) in &detection.selections {
        if name == "condition" || name == "timeframe" {
            continue;
        }

        let clauses = match SelectionValue::classify(value) {
            SelectionValue::Fields(fields) => compile_field_mapping(&fields),
            SelectionValue::Items(items) => compile_item_list(&items),
            SelectionValue::MissingColon(text) => {
                error!(
                    group = %name,
                    value = %text,
                    "YAML syntax error: missing colon after field expression \
                     (expected 'Field|operator:' not 'Field|operator')"
                );
                return ClauseTable::default();
            }
            SelectionValue::Unexpected(other) => {
                warn!(group = %name, value = ?other, "Unexpected value in detection section");
                Vec::new()
            }
        };

        if clauses.is_empty() {
            continue;
        }

        // Filter clauses join the same table, but last: the condition string
        // decides whether they actually subtract anything.
        if name == "filter" {
            filter_groups.push((name.clone(), clauses));
        } else {
            table.insert(name.clone(), clauses);
        }
    }

    for (name, clauses) in filter_groups {
        table.insert(name, clauses);
    }

    table
}

/// Mapping group: one clause per field expression, AND-combined later.
fn compile_field_mapping(fields: &serde_yaml::Mapping) -> Vec<String> {
    let mut clauses = Vec::new();
    for (key, value) in fields {
        let Some(field_expr) = key.as_str() else {
            warn!(key = ?key, "Non-string field expression in selection group");
            continue;
        };
        if let Some(clause) = field_expression_clause(field_expr, value) {
            clauses.push(clause);
        }
    }
    clauses
}

/// List group: AND within each item, OR across items, collapsed to a single
/// combined clause.
fn compile_item_list(items: &[serde_yaml::Mapping]) -> Vec<String> {
    let mut item_clauses = Vec::new();
    for item in items {
        let sub = compile_field_mapping(item);
        if !sub.is_empty() {
            item_clauses.push(join_with(&sub, " AND "));
        }
    }

    if item_clauses.is_empty() {
        Vec::new()
    } else {
        vec![join_with(&item_clauses, " OR ")]
    }
}

/// Compile one `Field|modifier|...` expression and its match value(s) into a
/// clause, or `None` when nothing renderable remains.
fn field_expression_clause(field_expr: &str, values: &serde_yaml::Value) -> Option<String> {
    // Aggregations have no boolean-logic equivalent in the target syntax;
    // render a marked placeholder instead of dropping them silently.
    if field_expr.contains('|') && field_expr.contains("count()") {
        return Some(aggregation_placeholder("Count", field_expr, values));
    }
    if field_expr.contains('|') && field_expr.contains("near") {
        return Some(aggregation_placeholder("Near", field_expr, values));
    }

    let (field_name, modifiers) = split_field_expression(field_expr);
    let stellar_field = catalog::lookup_field(field_name.trim());

    // `|all` over a list: every element must match, contains semantics.
    if modifiers.iter().any(|m| m == "all") {
        let serde_yaml::Value::Sequence(seq) = values else {
            return None;
        };
        let clauses: Vec<String> = seq
            .iter()
            .filter_map(render_scalar)
            .map(|val| format!("{} contains {}", stellar_field, val))
            .collect();
        if clauses.is_empty() {
            return None;
        }
        return Some(format!("({})", clauses.join(" AND ")));
    }

    let operator = match modifiers.first() {
        Some(modifier) => catalog::operator_for(modifier),
        // No modifier: generic substring matching.
        None => "contains",
    };

    match values {
        serde_yaml::Value::Sequence(seq) => {
            let sub_clauses: Vec<String> = seq
                .iter()
                .filter_map(render_scalar)
                .map(|val| {
                    if modifiers.iter().any(|m| m == "startswith") {
                        format!("{}:\"{}*\"", stellar_field, unquote(&val))
                    } else if modifiers.iter().any(|m| m == "endswith") {
                        format!("{}:\"*{}\"", stellar_field, unquote(&val))
                    } else {
                        format!("{} {} {}", stellar_field, operator, val)
                    }
                })
                .collect();
            if sub_clauses.is_empty() {
                None
            } else {
                Some(format!("({})", sub_clauses.join(" OR ")))
            }
        }
        scalar => render_scalar(scalar).map(|val| format!("{} {} {}", stellar_field, operator, val)),
    }
}

fn aggregation_placeholder(kind: &str, field_expr: &str, values: &serde_yaml::Value) -> String {
    let rendered = serde_json::to_string(values).unwrap_or_else(|_| "?".to_string());
    format!("# {} aggregation: {} - {}", kind, field_expr, rendered)
}

/// Split `Field|mod1|mod2` into the field name and lower-cased modifiers.
fn split_field_expression(field_expr: &str) -> (&str, Vec<String>) {
    let mut parts = field_expr.split('|');
    let field_name = parts.next().unwrap_or(field_expr);
    let modifiers = parts.map(|m| m.trim().to_lowercase()).collect();
    (field_name, modifiers)
}

/// Render a scalar match value for the target syntax: strings are quoted
/// with backslashes doubled, numbers and booleans stay bare. Anything else
/// has no rendering.
fn render_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(format!("\"{}\"", s.replace('\\', "\\\\"))),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Strip the surrounding quotes added by [`render_scalar`] so wildcard
/// renderings can re-quote with the `*` inside.
fn unquote(rendered: &str) -> &str {
    rendered
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(rendered)
}

/// Implicit default when the rule has no condition: AND-join every group.
fn implicit_join(table: &ClauseTable) -> String {
    let group_queries: Vec<String> = table
        .iter()
        .map(|(_, clauses)| join_group(clauses))
        .collect();
    group_queries.join(" AND ")
}

/// Recursively compile a condition string against the clause table.
///
/// Precedence, highest first: fully parenthesized whole -> leading `not` ->
/// top-level `and not` -> top-level `or` (lowest binding) -> top-level `and`
/// -> atomic terms. All splits are parenthesis- and quote-depth aware.
pub fn parse_condition(condition: &str, table: &ClauseTable) -> Option<String> {
    let cond = condition.trim();
    let lower = cond.to_lowercase();

    if is_fully_parenthesized(cond) {
        return parse_condition(&cond[1..cond.len() - 1], table);
    }

    if lower.starts_with("not ") {
        // Slice the original to preserve casing of group names.
        if let Some(positive) = parse_condition(&cond[4..], table) {
            return Some(format!("NOT ({})", positive));
        }
    }

    if lower.contains(" and not ") {
        let parts = split_top_level(cond, " and not ", true);
        if parts.len() == 2 {
            let left = parse_condition(&parts[0], table);
            let right = parse_condition(&parts[1], table);
            if let (Some(left), Some(right)) = (left, right) {
                return Some(format!("({}) AND NOT ({})", left, right));
            }
        }
    }

    let or_parts = split_top_level(cond, " or ", true);
    if or_parts.len() > 1 {
        let compiled: Vec<String> = or_parts
            .iter()
            .filter_map(|part| parse_condition(part, table))
            .collect();
        if !compiled.is_empty() {
            return Some(join_with(&compiled, " OR "));
        }
    }

    let and_parts = split_top_level(cond, " and ", true);
    if and_parts.len() > 1 {
        let compiled: Vec<String> = and_parts
            .iter()
            .filter_map(|part| parse_condition(part, table))
            .collect();
        if !compiled.is_empty() {
            return Some(join_with(&compiled, " AND "));
        }
    }

    parse_atomic(cond, table)
}

/// Atomic terms: `1 of <pattern>`, `all of <pattern>`, bare group names.
fn parse_atomic(cond: &str, table: &ClauseTable) -> Option<String> {
    let cond = cond.trim();
    let lower = cond.to_lowercase();

    if lower.starts_with("1 of ") {
        let pattern = cond[5..].trim();
        let collected = collect_groups(table, pattern);
        if !collected.is_empty() {
            return Some(join_with(&collected, " OR "));
        }
    }

    if lower.starts_with("all of ") {
        let pattern = cond[7..].trim();
        let collected = collect_groups(table, pattern);
        if !collected.is_empty() {
            return Some(format!("({})", collected.join(" AND ")));
        }
    }

    if let Some(clauses) = table.get(cond) {
        return Some(join_group(clauses));
    }

    None
}

/// Collect the joined clause expression of every group matching `pattern`:
/// a trailing `*` is a prefix wildcard, the keyword `them` means every group
/// except `filter`, anything else matches exactly.
fn collect_groups(table: &ClauseTable, pattern: &str) -> Vec<String> {
    if pattern == "them" {
        return table
            .iter()
            .filter(|(name, _)| *name != "filter")
            .map(|(_, clauses)| join_group(clauses))
            .collect();
    }

    table
        .iter()
        .filter(|(name, _)| match pattern.strip_suffix('*') {
            Some(prefix) => name.starts_with(prefix),
            None => *name == pattern,
        })
        .map(|(_, clauses)| join_group(clauses))
        .collect()
}

/// AND-join a group's clause list, parenthesized only when needed.
fn join_group(clauses: &[String]) -> String {
    if clauses.len() == 1 {
        clauses[0].clone()
    } else {
        format!("({})", clauses.join(" AND "))
    }
}

/// Join parts with `sep`, parenthesizing the whole only for real joins.
fn join_with(parts: &[String], sep: &str) -> String {
    if parts.len() == 1 {
        parts[0].clone()
    } else {
        format!("({})", parts.join(sep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Detection;

    fn detection(yaml: &str) -> Detection {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_single_field_no_condition() {
        let d = detection("selection:\n  Field: x\n");
        assert_eq!(compile(&d), "Field contains \"x\"");
    }

    #[test]
    fn test_mapped_field_uses_stellar_path() {
        let d = detection("selection:\n  CommandLine: whoami\n");
        assert_eq!(compile(&d), "event_data.CommandLine contains \"whoami\"");
    }

    #[test]
    fn test_multiple_fields_and_joined() {
        let d = detection("selection:\n  Image: cmd.exe\n  User: admin\n");
        assert_eq!(
            compile(&d),
            "(event_data.Image contains \"cmd.exe\" AND event_data.User contains \"admin\")"
        );
    }

    #[test]
    fn test_no_condition_joins_groups_with_and() {
        let d = detection("sel_a:\n  Field: x\nsel_b:\n  Other: y\n");
        assert_eq!(compile(&d), "Field contains \"x\" AND Other contains \"y\"");
    }

    #[test]
    fn test_list_value_or_joined() {
        let d = detection("selection:\n  Image:\n    - cmd.exe\n    - powershell.exe\n");
        assert_eq!(
            compile(&d),
            "(event_data.Image contains \"cmd.exe\" OR event_data.Image contains \"powershell.exe\")"
        );
    }

    #[test]
    fn test_equals_modifier_renders_is() {
        let d = detection("selection:\n  Image|equals: cmd.exe\n");
        assert_eq!(compile(&d), "event_data.Image is \"cmd.exe\"");
    }

    #[test]
    fn test_contains_all_modifier() {
        let d = detection("selection:\n  CommandLine|contains|all:\n    - -enc\n    - -nop\n");
        assert_eq!(
            compile(&d),
            "(event_data.CommandLine contains \"-enc\" AND event_data.CommandLine contains \"-nop\")"
        );
    }

    #[test]
    fn test_startswith_list_wildcard_rendering() {
        let d = detection("selection:\n  Image|startswith:\n    - C:\\Tools\n");
        assert_eq!(compile(&d), "(event_data.Image:\"C:\\\\Tools*\")");

        let d = detection("selection:\n  Image|endswith:\n    - cmd.exe\n");
        assert_eq!(compile(&d), "(event_data.Image:\"*cmd.exe\")");
    }

    #[test]
    fn test_startswith_scalar_uses_operator() {
        let d = detection("selection:\n  Image|startswith: C:\\Windows\n");
        assert_eq!(
            compile(&d),
            "event_data.Image starts with \"C:\\\\Windows\""
        );
    }

    #[test]
    fn test_numeric_and_bool_render_unquoted() {
        let d = detection("selection:\n  EventID: 4624\n");
        assert_eq!(compile(&d), "event_id contains 4624");

        let d = detection("selection:\n  Signed|equals: true\n");
        assert_eq!(compile(&d), "Signed is true");
    }

    #[test]
    fn test_backslashes_doubled() {
        let d = detection("selection:\n  Image: C:\\Windows\\cmd.exe\n");
        assert_eq!(
            compile(&d),
            "event_data.Image contains \"C:\\\\Windows\\\\cmd.exe\""
        );
    }

    #[test]
    fn test_list_of_mappings_or_across_items() {
        let d = detection(
            "selection:\n  - Image: cmd.exe\n    User: a\n  - Image: powershell.exe\n",
        );
        assert_eq!(
            compile(&d),
            "((event_data.Image contains \"cmd.exe\" AND event_data.User contains \"a\") \
             OR event_data.Image contains \"powershell.exe\")"
        );
    }

    #[test]
    fn test_condition_one_of_wildcard() {
        let d = detection(
            "selection_a:\n  Field: x\nselection_b:\n  Other: y\ncondition: 1 of selection_*\n",
        );
        assert_eq!(
            compile(&d),
            "(Field contains \"x\" OR Other contains \"y\")"
        );
    }

    #[test]
    fn test_condition_all_of_wildcard() {
        let d = detection(
            "selection_a:\n  Field: x\nselection_b:\n  Other: y\ncondition: all of selection_*\n",
        );
        assert_eq!(
            compile(&d),
            "(Field contains \"x\" AND Other contains \"y\")"
        );
    }

    #[test]
    fn test_condition_one_of_them_excludes_filter() {
        let d = detection(
            "filter:\n  User: SYSTEM\nselection:\n  Field: x\ncondition: 1 of them\n",
        );
        assert_eq!(compile(&d), "Field contains \"x\"");
    }

    #[test]
    fn test_condition_and_not_filter() {
        let d = detection(
            "selection:\n  Field: x\nfilter:\n  User: SYSTEM\ncondition: selection and not filter\n",
        );
        assert_eq!(
            compile(&d),
            "(Field contains \"x\") AND NOT (event_data.User contains \"SYSTEM\")"
        );
    }

    #[test]
    fn test_condition_unreferenced_filter_still_merged() {
        // Filter is opt-in: a condition that never mentions it leaves its
        // clauses merged but unused.
        let d = detection(
            "selection:\n  Field: x\nfilter:\n  User: SYSTEM\ncondition: selection\n",
        );
        assert_eq!(compile(&d), "Field contains \"x\"");
    }

    #[test]
    fn test_condition_or_and_precedence() {
        let d = detection(
            "a:\n  F1: x\nb:\n  F2: y\nc:\n  F3: z\ncondition: a or b and c\n",
        );
        // OR splits first: a OR (b AND c).
        assert_eq!(
            compile(&d),
            "(F1 contains \"x\" OR (F2 contains \"y\" AND F3 contains \"z\"))"
        );
    }

    #[test]
    fn test_condition_parenthesized() {
        let d = detection("a:\n  F1: x\nb:\n  F2: y\ncondition: (a and b)\n");
        assert_eq!(
            compile(&d),
            "(F1 contains \"x\" AND F2 contains \"y\")"
        );
    }

    #[test]
    fn test_condition_leading_not() {
        let d = detection("a:\n  F1: x\ncondition: not a\n");
        assert_eq!(compile(&d), "NOT (F1 contains \"x\")");
    }

    #[test]
    fn test_count_aggregation_placeholder() {
        let d = detection("selection:\n  \"selection|count() by User\": 5\n");
        let query = compile(&d);
        assert!(query.starts_with("# Count aggregation:"), "got: {}", query);
    }

    #[test]
    fn test_missing_colon_diagnostic() {
        let d = detection("selection: CommandLine|contains\n");
        assert_eq!(compile(&d), NO_DETECTION_LOGIC);
    }

    #[test]
    fn test_empty_detection_diagnostic() {
        let d = detection("condition: selection\n");
        assert_eq!(compile(&d), NO_DETECTION_LOGIC);
    }

    #[test]
    fn test_unknown_group_reference_diagnostic() {
        let d = detection("selection:\n  Field: x\ncondition: nonexistent\n");
        assert_eq!(compile(&d), NO_DETECTION_LOGIC);
    }

    #[test]
    fn test_timeframe_skipped() {
        let d = detection("selection:\n  Field: x\ntimeframe: 5m\n");
        assert_eq!(compile(&d), "Field contains \"x\"");
    }
}
