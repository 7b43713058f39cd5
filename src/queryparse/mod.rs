//! Query string parser
//!
//! Parses a Stellar boolean query string (typically one produced by the
//! compiler, but any hand-written query works) into a structured tree of
//! condition and group nodes for the rule-detail UI.
//!
//! Parsing is total: fragments that match none of the known shapes degrade
//! to a raw condition leaf carrying the original text.

use crate::catalog;
use crate::util::{is_fully_parenthesized, split_top_level};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

// ============================================================================
// Field-expression patterns, tried in order; first match wins.
// ============================================================================
// The order is load-bearing: later patterns are broader and would shadow the
// earlier ones if tried first.

/// `field operator "value"` / `field operator value`
static COMPLEX_OPERATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^([\w-]+(?:\.[\w-]+)*)\s+(contains|startswith|endswith|equals|is|matches)\s+(.+)$"#)
        .expect("COMPLEX_OPERATOR pattern is valid")
});

/// `field:value`
static COLON_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([\w-]+(?:\.[\w-]+)*):(.+)$").expect("COLON_FORM pattern is valid")
});

/// `field operator value` with an unquoted single-token value
static COMPLEX_OPERATOR_NO_QUOTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^([\w-]+(?:\.[\w-]+)*)\s+(contains|startswith|endswith|equals|is|matches)\s+([^"\s]+)$"#,
    )
    .expect("COMPLEX_OPERATOR_NO_QUOTES pattern is valid")
});

/// A standalone quoted string
static QUOTED_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^["'](.+)["']$"#).expect("QUOTED_VALUE pattern is valid"));

/// `*value*` wildcard form
static WILDCARD_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*(.+)\*$").expect("WILDCARD_VALUE pattern is valid"));

/// A bare identifier with no value at all
static BARE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+(?:\.\w+)*$").expect("BARE_FIELD pattern is valid"));

/// Best-effort extraction patterns for raw text that matched nothing above:
/// Sigma `field | modifier` remnants and natural-language phrasings like
/// `field ends with "value"`. Ordered; first match wins.
static RAW_FIELD_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    let patterns: [(&str, &str); 10] = [
        (
            r#"(?i)^([\w-]+(?:\.[\w-]+)*)\s+\|\s*(contains?|startswith|endswith|equals?|is|matches?)(?:\s*\|\s*(all))?\s*:\s*"#,
            "contains",
        ),
        (
            r#"(?i)^([\w-]+(?:\.[\w-]+)*)\s+(ends?\s+with)\s+["']([^"']+)["']"#,
            "endswith",
        ),
        (
            r#"(?i)^([\w-]+(?:\.[\w-]+)*)\s+(starts?\s+with)\s+["']([^"']+)["']"#,
            "startswith",
        ),
        (
            r#"(?i)^([\w-]+(?:\.[\w-]+)*)\s+(contains?)\s+["']([^"']+)["']"#,
            "contains",
        ),
        (
            r#"(?i)^([\w-]+(?:\.[\w-]+)*)\s+(equals?|is)\s+["']([^"']+)["']"#,
            "equals",
        ),
        (
            r#"(?i)^([\w-]+(?:\.[\w-]+)*)\s+(ends?\s+with)\s+([^"\s]+)"#,
            "endswith",
        ),
        (
            r#"(?i)^([\w-]+(?:\.[\w-]+)*)\s+(starts?\s+with)\s+([^"\s]+)"#,
            "startswith",
        ),
        (
            r#"(?i)^([\w-]+(?:\.[\w-]+)*)\s+(contains?)\s+([^"\s]+)"#,
            "contains",
        ),
        (
            r#"(?i)^([\w-]+(?:\.[\w-]+)*)\s+(equals?|is)\s+([^"\s]+)"#,
            "equals",
        ),
        (
            r#"(?i)^([\w-]+(?:\.[\w-]+)*)\s*\|\s*(contains?|startswith|endswith|equals?|is|matches?)(?:\s*\|\s*(all))?"#,
            "contains",
        ),
    ];

    patterns
        .iter()
        .map(|(pattern, operator)| {
            (
                Regex::new(pattern).expect("RAW_FIELD_PATTERNS patterns are valid"),
                *operator,
            )
        })
        .collect()
});

// ============================================================================
// Expression tree
// ============================================================================

/// One node of the parsed query tree.
///
/// Leaves are always conditions; groups carry AND/OR/NOT over ordered
/// children (NOT has exactly one). Serializes to the display-oriented
/// nested structure consumed by the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueryNode {
    Condition {
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        /// Human label for `field`, resolved via the field catalog.
        #[serde(skip_serializing_if = "Option::is_none")]
        field_display: Option<String>,
        operator: String,
        value: String,
    },
    Group {
        operator: String,
        children: Vec<QueryNode>,
    },
}

impl QueryNode {
    fn condition(field: Option<&str>, operator: &str, value: &str) -> Self {
        QueryNode::Condition {
            field: field.map(str::to_string),
            field_display: field.map(catalog::display_name),
            operator: operator.to_string(),
            value: value.to_string(),
        }
    }

    fn group(operator: &str, children: Vec<QueryNode>) -> Self {
        QueryNode::Group {
            operator: operator.to_string(),
            children,
        }
    }

    fn raw(value: &str) -> Self {
        QueryNode::condition(None, "raw", value)
    }
}

/// Parse a Stellar query string into an expression tree.
pub fn parse(query: &str) -> QueryNode {
    let query = query.trim();
    if query.is_empty() {
        return QueryNode::raw("");
    }
    parse_expression(query)
}

/// Recursive descent over the query text.
///
/// Precedence, high to low: NOT, parentheses, AND, OR — so OR splits first
/// (it builds the top-level structure), then AND, then the leaf patterns.
fn parse_expression(expression: &str) -> QueryNode {
    let expression = expression.trim();

    if let Some(rest) = expression.strip_prefix("NOT ") {
        let mut inner = rest.trim();
        // Drop one wrapping paren pair if present.
        if inner.starts_with('(') && inner.ends_with(')') {
            inner = &inner[1..inner.len() - 1];
        }
        return QueryNode::group("NOT", vec![parse_expression(inner)]);
    }

    if is_fully_parenthesized(expression) {
        let inner = expression[1..expression.len() - 1].trim();
        return parse_expression(inner);
    }

    let or_parts = split_top_level(expression, " OR ", false);
    if or_parts.len() > 1 {
        let children = or_parts.iter().map(|p| parse_expression(p)).collect();
        return QueryNode::group("OR", children);
    }

    let and_parts = split_top_level(expression, " AND ", false);
    if and_parts.len() > 1 {
        let children = and_parts.iter().map(|p| parse_expression(p)).collect();
        return QueryNode::group("AND", children);
    }

    parse_field_expression(expression)
}

/// Leaf parsing through the ordered pattern ladder.
fn parse_field_expression(expression: &str) -> QueryNode {
    let expression = expression.trim();

    if let Some(caps) = COMPLEX_OPERATOR.captures(expression) {
        let value = strip_quotes(caps[3].trim());
        return QueryNode::condition(Some(&caps[1]), &caps[2], value);
    }

    if let Some(caps) = COLON_FORM.captures(expression) {
        let value = strip_quotes(caps[2].trim());
        return QueryNode::condition(Some(&caps[1]), "contains", value);
    }

    if let Some(caps) = COMPLEX_OPERATOR_NO_QUOTES.captures(expression) {
        return QueryNode::condition(Some(&caps[1]), &caps[2], caps[3].trim());
    }

    if let Some(caps) = QUOTED_VALUE.captures(expression) {
        return QueryNode::condition(Some("text"), "contains", &caps[1]);
    }

    if let Some(caps) = WILDCARD_VALUE.captures(expression) {
        return QueryNode::condition(Some("text"), "contains", &caps[1]);
    }

    if BARE_FIELD.is_match(expression) {
        return QueryNode::condition(Some(expression), "exists", "");
    }

    if let Some(node) = extract_field_info_from_raw(expression) {
        return node;
    }

    QueryNode::raw(expression)
}

/// Last-resort extraction of field/operator/value from text the main ladder
/// rejected.
fn extract_field_info_from_raw(expression: &str) -> Option<QueryNode> {
    for (pattern, operator) in RAW_FIELD_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(expression) {
            let value = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            return Some(QueryNode::condition(Some(&caps[1]), operator, value));
        }
    }

    // field:value as a final attempt, quotes stripped.
    if let Some(caps) = COLON_FORM.captures(expression) {
        let value = strip_quotes(caps[2].trim());
        return Some(QueryNode::condition(Some(&caps[1]), "contains", value));
    }

    None
}

/// Remove one pair of surrounding double quotes, if both are present.
fn strip_quotes(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}
