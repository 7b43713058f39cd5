//! Rule search evaluator
//!
//! Evaluates user-typed filter expressions against the in-memory rule
//! collection. Supports field-specific atoms (`author:Nextron`,
//! `date:2025`), quoted phrases, case-insensitive AND/OR/NOT, and
//! parentheses; adjacent bare terms get an implicit AND.
//!
//! The expression is tokenized, converted to postfix (Shunting-Yard), and
//! evaluated per record with a boolean stack. Input order is preserved and
//! an empty query matches everything.

use crate::models::RuleRecord;
use tracing::debug;

/// Filter `records` by `query`, preserving input order.
pub fn search(records: &[RuleRecord], query: &str) -> Vec<RuleRecord> {
    let query = query.trim();
    if query.is_empty() {
        return records.to_vec();
    }

    let tokens = tokenize(query);
    if tokens.is_empty() {
        return records.to_vec();
    }

    let has_operators = tokens.iter().any(|t| is_boolean_keyword(t));
    let has_parentheses = tokens.iter().any(|t| t == "(" || t == ")");

    // Fast path: plain term or single field:value, no tree construction.
    if !has_operators && !has_parentheses {
        let (field, value) = parse_field_query(query);
        return records
            .iter()
            .filter(|record| match &field {
                Some(field) => match_field(record, field, &value),
                None => match_general(record, &value),
            })
            .cloned()
            .collect();
    }

    let postfix = to_postfix(&tokens);
    debug!(query = %query, postfix = ?postfix, "Evaluating search expression");

    records
        .iter()
        .filter(|record| matches_record(record, &postfix))
        .cloned()
        .collect()
}

fn is_boolean_keyword(token: &str) -> bool {
    matches!(token.to_uppercase().as_str(), "AND" | "OR" | "NOT")
}

fn is_operator_or_paren(token: &str) -> bool {
    is_boolean_keyword(token) || token == "(" || token == ")"
}

/// Tokenize a query: pad parentheses, split on whitespace outside quotes
/// (quotes stripped), re-merge a trailing-colon token with its value, then
/// insert the implicit ANDs.
fn tokenize(query: &str) -> Vec<String> {
    let padded = query.replace('(', " ( ").replace(')', " ) ");

    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quote_char = '"';

    for ch in padded.chars() {
        if (ch == '"' || ch == '\'') && !in_quotes {
            in_quotes = true;
            quote_char = ch;
        } else if in_quotes && ch == quote_char {
            in_quotes = false;
        } else if ch.is_whitespace() && !in_quotes {
            if !current.trim().is_empty() {
                tokens.push(current.trim().to_string());
            }
            current.clear();
        } else {
            current.push(ch);
        }
    }
    if !current.trim().is_empty() {
        tokens.push(current.trim().to_string());
    }

    // "date: 2025" arrives as ["date:", "2025"]; glue the pair back together.
    let mut combined: Vec<String> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i].ends_with(':')
            && i + 1 < tokens.len()
            && !is_operator_or_paren(&tokens[i + 1])
        {
            combined.push(format!("{}{}", tokens[i], tokens[i + 1]));
            i += 2;
        } else {
            combined.push(tokens[i].clone());
            i += 1;
        }
    }

    // Implicit AND between consecutive non-operator tokens.
    let mut processed: Vec<String> = Vec::new();
    for (i, token) in combined.iter().enumerate() {
        processed.push(token.clone());
        if i + 1 < combined.len()
            && !is_operator_or_paren(token)
            && !is_operator_or_paren(&combined[i + 1])
        {
            processed.push("AND".to_string());
        }
    }

    processed
}

/// Split a `field:value` atom; returns `(None, term)` for bare terms, URLs,
/// and dangling colons with no value.
fn parse_field_query(term: &str) -> (Option<String>, String) {
    if term.contains(':') && !term.starts_with("http") {
        if let Some((field, value)) = term.split_once(':') {
            let field = field.trim().to_lowercase();
            let value = value
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .to_string();
            if value.is_empty() {
                return (None, term.to_string());
            }
            return (Some(field), value);
        }
    }
    (None, term.to_string())
}

/// Infix to postfix via Shunting-Yard. Precedence: OR < AND < NOT, with the
/// left-associative pop rule (stack top >= incoming pops).
fn to_postfix(tokens: &[String]) -> Vec<String> {
    let mut output: Vec<String> = Vec::new();
    let mut stack: Vec<String> = Vec::new();

    for token in tokens {
        if is_boolean_keyword(token) {
            let upper = token.to_uppercase();
            while let Some(top) = stack.last() {
                if top == "(" || precedence(top) < precedence(&upper) {
                    break;
                }
                output.push(stack.pop().unwrap());
            }
            stack.push(upper);
        } else if token == "(" {
            stack.push(token.clone());
        } else if token == ")" {
            while let Some(top) = stack.last() {
                if top == "(" {
                    break;
                }
                output.push(stack.pop().unwrap());
            }
            stack.pop();
        } else {
            output.push(token.clone());
        }
    }

    while let Some(op) = stack.pop() {
        output.push(op);
    }

    output
}

fn precedence(op: &str) -> u8 {
    match op {
        "OR" => 1,
        "AND" => 2,
        "NOT" => 3,
        _ => 0,
    }
}

/// Evaluate a postfix token queue against one record.
fn matches_record(record: &RuleRecord, postfix: &[String]) -> bool {
    let mut stack: Vec<bool> = Vec::new();

    for token in postfix {
        match token.to_uppercase().as_str() {
            "NOT" => {
                if let Some(operand) = stack.pop() {
                    stack.push(!operand);
                }
            }
            "AND" | "OR" => {
                if stack.len() >= 2 {
                    let right = stack.pop().unwrap();
                    let left = stack.pop().unwrap();
                    if token.eq_ignore_ascii_case("AND") {
                        stack.push(left && right);
                    } else {
                        stack.push(left || right);
                    }
                }
            }
            _ => {
                let (field, value) = parse_field_query(token);
                let matched = match &field {
                    Some(field) => match_field(record, field, &value),
                    None => match_general(record, &value),
                };
                stack.push(matched);
            }
        }
    }

    stack.first().copied().unwrap_or(false)
}

/// Resolve a known search field to its extracted text, or `None` for
/// unrecognized fields (which fall back to content search).
fn field_value(record: &RuleRecord, field: &str) -> Option<String> {
    match field {
        "title" => Some(record.title.clone()),
        "description" => Some(record.description.clone()),
        "tags" => Some(record.tags.join(" ")),
        "author" | "date" | "modified" | "id" | "status" | "level" => {
            Some(extract_content_field(&record.content, field))
        }
        "product" => Some(record.logsource.product.clone().unwrap_or_default()),
        "category" => Some(record.logsource.category.clone().unwrap_or_default()),
        "service" => Some(record.logsource.service.clone().unwrap_or_default()),
        "content" => Some(record.content.clone()),
        "filename" => Some(
            record
                .file_path
                .rsplit('/')
                .next()
                .unwrap_or("")
                .to_string(),
        ),
        "path" => Some(record.file_path.clone()),
        _ => None,
    }
}

/// Extract `key: value` from the raw rule source, first matching line wins,
/// quotes stripped.
fn extract_content_field(content: &str, key: &str) -> String {
    let prefix = format!("{}:", key);
    if !content.contains(&prefix) {
        return String::new();
    }

    for line in content.lines() {
        if let Some(rest) = line.trim().strip_prefix(&prefix) {
            return rest
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .to_string();
        }
    }

    String::new()
}

/// Check one `field:value` atom against a record, case-insensitively.
///
/// `date`/`modified` get year-aware matching: a 4-digit numeric value
/// matches only when it appears as a year (followed by `-` or `/`, at the
/// start, or preceded by a space), so `date:2025` does not match `120259`.
fn match_field(record: &RuleRecord, field: &str, value: &str) -> bool {
    let Some(extracted) = field_value(record, field) else {
        return record
            .content
            .to_lowercase()
            .contains(&value.to_lowercase());
    };

    let field_content = extracted.to_lowercase();
    let value_lower = value.to_lowercase();

    if field == "date" || field == "modified" {
        if value.len() == 4 && value.chars().all(|c| c.is_ascii_digit()) {
            return field_content.contains(&format!("{}-", value))
                || field_content.contains(&format!("{}/", value))
                || field_content.starts_with(value)
                || field_content.contains(&format!(" {}", value));
        }
        return field_content.contains(&value_lower);
    }

    field_content.contains(&value_lower)
}

/// Bare-term matching across the common searchable fields.
fn match_general(record: &RuleRecord, term: &str) -> bool {
    let term_lower = term.to_lowercase();
    let author = extract_content_field(&record.content, "author");
    let tags = record.tags.join(" ");

    [
        record.title.as_str(),
        record.description.as_str(),
        tags.as_str(),
        record.content.as_str(),
        author.as_str(),
        record.file_path.as_str(),
    ]
    .iter()
    .any(|content| content.to_lowercase().contains(&term_lower))
}
