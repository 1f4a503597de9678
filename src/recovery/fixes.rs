//! Pure query rewrites bound to error patterns.
//!
//! Every function takes the failing query and the capture groups of the
//! matched error message and returns the rewritten query together with a
//! description of each change. They never execute SQL. Returning the input
//! unchanged means "no fix".

use std::sync::LazyLock;

use regex::{NoExpand, Regex};

use super::{Corrections, RecoveryFn};
use crate::{config::RecoveryConfig, schema::SchemaCache};

/// LIMIT value substituted for a dangling `LIMIT`
const SYNTAX_DEFAULT_LIMIT: u64 = 100;

/// Truncation typos seen in generated column names
const COMMON_COLUMN_FIXES: [(&str, &str); 8] = [
    ("nam", "name"),
    ("emai", "email"),
    ("user_i", "user_id"),
    ("product_i", "product_id"),
    ("id_user", "user_id"),
    ("id_product", "product_id"),
    ("usr", "user"),
    ("prod", "product")
];

/// Function synonyms; `swallow_parens` entries replace the whole call
const FUNCTION_FIXES: [(&str, &str, bool); 8] = [
    ("len", "LENGTH", false),
    ("substr", "SUBSTRING", false),
    ("isnull", "COALESCE", false),
    ("ifnull", "COALESCE", false),
    ("nvl", "COALESCE", false),
    ("now", "NOW()", true),
    ("getdate", "NOW()", true),
    ("today", "CURRENT_DATE", true)
];

const AGGREGATES: [&str; 5] = ["COUNT", "SUM", "AVG", "MAX", "MIN"];

/// Read-only inputs shared by the rewrites
pub struct FixContext<'a> {
    pub schema: &'a SchemaCache,
    pub config: &'a RecoveryConfig
}

pub fn apply(
    recovery: RecoveryFn,
    query: &str,
    captures: &[String],
    ctx: &FixContext<'_>
) -> (String, Corrections) {
    match recovery {
        RecoveryFn::FixColumnName => fix_column_name(query, captures, ctx),
        RecoveryFn::FixTableName => fix_table_name(query, captures, ctx),
        RecoveryFn::FixSyntaxError => fix_syntax_error(query),
        RecoveryFn::FixFunctionError => fix_function_error(query, captures),
        RecoveryFn::FixTypeMismatch => fix_type_mismatch(query, captures),
        RecoveryFn::OptimizeForTimeout => optimize_for_timeout(query, ctx.config),
        RecoveryFn::FixGroupBy => fix_group_by(query)
    }
}

fn unchanged(query: &str) -> (String, Corrections) {
    (query.to_string(), Corrections::new())
}

/// Drop a `schema.` or `alias.` qualifier
fn bare_identifier(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Case-insensitive whole-word replacement
pub fn replace_word(query: &str, word: &str, replacement: &str) -> String {
    match Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word))) {
        Ok(regex) => regex.replace_all(query, NoExpand(replacement)).into_owned(),
        Err(_) => query.to_string()
    }
}

fn common_column_fix(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    COMMON_COLUMN_FIXES
        .iter()
        .find(|(typo, _)| *typo == lower)
        .map(|(_, fix)| *fix)
}

fn fix_column_name(query: &str, captures: &[String], ctx: &FixContext<'_>) -> (String, Corrections) {
    let Some(raw) = captures.first() else {
        return unchanged(query);
    };
    let invalid = bare_identifier(raw);
    let available = ctx.schema.columns_for_query(query);

    let (best, note) = if available.is_empty() {
        match common_column_fix(invalid) {
            Some(fix) => (fix.to_string(), ""),
            None => return unchanged(query)
        }
    } else {
        let candidates = crate::schema::closest_matches(
            invalid,
            &available,
            ctx.config.similarity_cutoff,
            ctx.config.max_candidates
        );
        match candidates.into_iter().next() {
            Some(best) => (best, ""),
            None => match common_column_fix(invalid) {
                Some(fix) => (fix.to_string(), " (common pattern)"),
                None => return unchanged(query)
            }
        }
    };

    let corrected = replace_word(query, invalid, &best);
    let mut corrections = Corrections::new();
    corrections.push(format!("Replaced '{}' with '{}'{}", invalid, best, note));
    (corrected, corrections)
}

fn fix_table_name(query: &str, captures: &[String], ctx: &FixContext<'_>) -> (String, Corrections) {
    let Some(raw) = captures.first() else {
        return unchanged(query);
    };
    let invalid = bare_identifier(raw);
    let candidates = ctx.schema.closest_tables(
        invalid,
        ctx.config.similarity_cutoff,
        ctx.config.max_candidates
    );
    let Some(best) = candidates.into_iter().next() else {
        return unchanged(query);
    };

    let corrected = replace_word(query, invalid, &best);
    let mut corrections = Corrections::new();
    corrections.push(format!("Replaced table '{}' with '{}'", invalid, best));
    (corrected, corrections)
}

static MISSING_COMMA: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\bSELECT\s+(\w+)\s+(\w+)\s+FROM\b").ok());
// Leading zeros mark codes ('02134'), not numbers
static QUOTED_NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"['"](0|[1-9]\d*)['"]"#).ok());
static SPACED_PARENS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\w+)\s*\(\s*\)").ok());
static DANGLING_LIMIT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\s*(;?)\s*$").ok());

const SELECT_MODIFIERS: [&str; 4] = ["DISTINCT", "ALL", "AS", "TOP"];

/// Insert the comma missing between the first two SELECT items
pub(crate) fn add_select_comma(query: &str) -> Option<String> {
    let regex = MISSING_COMMA.as_ref()?;
    let caps = regex.captures(query)?;
    let is_modifier = |s: &str| SELECT_MODIFIERS.iter().any(|m| m.eq_ignore_ascii_case(s));
    if is_modifier(&caps[1]) || is_modifier(&caps[2]) {
        return None;
    }
    Some(regex.replace(query, "SELECT $1, $2 FROM").into_owned())
}

/// Strip quotes around purely numeric literals
pub(crate) fn unquote_numbers(query: &str) -> Option<String> {
    Some(QUOTED_NUMBER.as_ref()?.replace_all(query, "$1").into_owned())
}

/// Apply the first syntax fix that changes the query, and only that one.
fn fix_syntax_error(query: &str) -> (String, Corrections) {
    let steps: [(&str, fn(&str) -> Option<String>); 5] = [
        ("Added missing comma in SELECT", add_select_comma),
        ("Removed quotes from numeric literal", unquote_numbers),
        ("Fixed function parentheses", |q| {
            Some(SPACED_PARENS.as_ref()?.replace_all(q, "$1()").into_owned())
        }),
        ("Added default LIMIT value", |q| {
            let replacement = format!("LIMIT {}$1", SYNTAX_DEFAULT_LIMIT);
            Some(
                DANGLING_LIMIT
                    .as_ref()?
                    .replace(q, replacement.as_str())
                    .into_owned()
            )
        }),
        ("Added missing semicolon", |q| {
            let trimmed = q.trim_end();
            (!trimmed.ends_with(';')).then(|| format!("{};", trimmed))
        })
    ];

    for (description, step) in steps {
        if let Some(candidate) = step(query)
            && candidate != query
        {
            let mut corrections = Corrections::new();
            corrections.push(description.to_string());
            return (candidate, corrections);
        }
    }
    unchanged(query)
}

fn fix_function_error(query: &str, captures: &[String]) -> (String, Corrections) {
    let Some(raw) = captures.first() else {
        return unchanged(query);
    };
    let wrong = bare_identifier(raw);
    let Some((_, correct, swallow_parens)) = FUNCTION_FIXES
        .iter()
        .find(|(name, _, _)| name.eq_ignore_ascii_case(wrong))
    else {
        return unchanged(query);
    };

    let escaped = regex::escape(wrong);
    let (pattern, replacement) = if *swallow_parens {
        (format!(r"(?i)\b{}\b(?:\s*\(\s*\))?", escaped), correct.to_string())
    } else {
        (format!(r"(?i)\b{}(\s*\()", escaped), format!("{}${{1}}", correct))
    };
    let Ok(regex) = Regex::new(&pattern) else {
        return unchanged(query);
    };

    let corrected = regex.replace_all(query, replacement.as_str()).into_owned();
    let mut corrections = Corrections::new();
    if corrected != query {
        corrections.push(format!("Replaced function '{}' with '{}'", wrong, correct));
    }
    (corrected, corrections)
}

fn fix_type_mismatch(query: &str, captures: &[String]) -> (String, Corrections) {
    let [target_type, invalid_value, ..] = captures else {
        return unchanged(query);
    };
    let literal = format!("'{}'", invalid_value);
    let mut corrections = Corrections::new();

    match target_type.to_lowercase().as_str() {
        "integer" | "int" | "bigint" | "smallint" => {
            let digits: String = invalid_value
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if digits.is_empty() || !query.contains(&literal) {
                return unchanged(query);
            }
            corrections.push(format!(
                "Converted '{}' to numeric {}",
                invalid_value, digits
            ));
            (query.replace(&literal, &digits), corrections)
        }
        kind @ ("date" | "timestamp") => {
            if !query.contains(&literal) || query.contains(&format!("{}::", literal)) {
                return unchanged(query);
            }
            let cast = format!("{}::{}", literal, kind.to_uppercase());
            corrections.push(format!(
                "Added {} casting for '{}'",
                kind, invalid_value
            ));
            (query.replace(&literal, &cast), corrections)
        }
        _ => unchanged(query)
    }
}

static HAS_LIMIT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\b").ok());
static SELECT_STAR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\bSELECT\s+\*").ok());

fn optimize_for_timeout(query: &str, config: &RecoveryConfig) -> (String, Corrections) {
    let mut corrected = query.to_string();
    let mut corrections = Corrections::new();

    if HAS_LIMIT.as_ref().is_some_and(|r| !r.is_match(&corrected)) {
        let body = corrected.trim_end().trim_end_matches(';').trim_end();
        corrected = format!("{} LIMIT {};", body, config.timeout_limit);
        corrections.push(format!(
            "Added LIMIT {} to prevent timeout",
            config.timeout_limit
        ));
    }

    if let Some(regex) = SELECT_STAR.as_ref()
        && regex.is_match(&corrected)
        && !config.fallback_columns.is_empty()
    {
        let replacement = format!("SELECT {}", config.fallback_columns.join(", "));
        corrected = regex
            .replace(&corrected, NoExpand(&replacement))
            .into_owned();
        corrections.push("Replaced SELECT * with specific columns".to_string());
    }

    (corrected, corrections)
}

static SELECT_LIST: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)\bSELECT\s+(.*?)\s+FROM\b").ok());
static GROUP_BY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\bGROUP\s+BY\b").ok());
static TRAILING_CLAUSE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:HAVING|ORDER\s+BY|LIMIT)\b").ok());
static ALIAS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)\s+AS\s+\w+$").ok());

/// Split on commas that are not nested in parentheses
pub fn split_top_level(list: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in list.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn is_aggregate(expr: &str) -> bool {
    let upper = expr.to_uppercase();
    AGGREGATES.iter().any(|agg| {
        upper.match_indices(agg).any(|(i, _)| {
            let before_ok = upper[..i]
                .chars()
                .next_back()
                .is_none_or(|c| !c.is_alphanumeric() && c != '_');
            let after = upper[i + agg.len()..].trim_start();
            before_ok && after.starts_with('(')
        })
    })
}

/// Non-aggregate SELECT expressions, aliases removed, capped at three
pub fn group_by_columns(query: &str) -> Vec<String> {
    let Some(caps) = SELECT_LIST.as_ref().and_then(|r| r.captures(query)) else {
        return Vec::new();
    };
    let list = caps[1].trim();
    let list = list
        .strip_prefix("DISTINCT ")
        .or_else(|| list.strip_prefix("distinct "))
        .unwrap_or(list);

    split_top_level(list)
        .into_iter()
        .filter(|expr| expr != "*" && !is_aggregate(expr))
        .map(|expr| match ALIAS.as_ref() {
            Some(alias) => alias.replace(&expr, "").into_owned(),
            None => expr
        })
        .take(3)
        .collect()
}

pub(crate) fn fix_group_by(query: &str) -> (String, Corrections) {
    let columns = group_by_columns(query);
    if columns.is_empty() {
        return unchanged(query);
    }
    let list = columns.join(", ");
    let clause = format!("GROUP BY {}", list);

    let trimmed = query.trim_end();
    let (body, terminator) = match trimmed.strip_suffix(';') {
        Some(body) => (body.trim_end(), ";"),
        None => (trimmed, "")
    };

    let corrected = match GROUP_BY.as_ref().and_then(|r| r.find(body)) {
        Some(existing) => {
            let rest = &body[existing.end()..];
            let end = TRAILING_CLAUSE
                .as_ref()
                .and_then(|r| r.find(rest))
                .map_or(body.len(), |m| existing.end() + m.start());
            let tail = body[end..].trim_start();
            if tail.is_empty() {
                format!("{}{}{}", &body[..existing.start()], clause, terminator)
            } else {
                format!("{}{} {}{}", &body[..existing.start()], clause, tail, terminator)
            }
        }
        None => match TRAILING_CLAUSE.as_ref().and_then(|r| r.find(body)) {
            Some(m) => format!(
                "{}{} {}{}",
                &body[..m.start()],
                clause,
                &body[m.start()..],
                terminator
            ),
            None => format!("{} {}{}", body, clause, terminator)
        }
    };

    let mut corrections = Corrections::new();
    corrections.push(format!("Added/fixed GROUP BY clause with columns: {}", list));
    (corrected, corrections)
}
