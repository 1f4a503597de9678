//! Cleanup of generated SQL before it reaches validation.
//!
//! Language models wrap SQL in markdown fences, sprinkle backticks and break
//! lines arbitrarily. [`clean`] removes those artifacts so rule matching sees
//! one normalized statement.
//!
//! # Example
//!
//! ```
//! use sql_query_guard::preprocessor::clean;
//!
//! let raw = "```sql\nSELECT id\n  FROM `users`\nLIMIT 5\n```";
//!
//! assert_eq!(clean(raw), "SELECT id FROM users LIMIT 5;");
//! ```

use std::sync::LazyLock;

use regex::Regex;

static FENCE_OPEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^```(?:sql|SQL)?[ \t]*").ok());

static FENCE_CLOSE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?m)```\s*$").ok());

static WHITESPACE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\s+").ok());

/// Strip markdown fences and backticks, collapse whitespace and terminate
/// the statement with `;`. Blank input stays blank.
#[must_use]
pub fn clean(sql: &str) -> String {
    let mut cleaned = sql.to_string();

    for regex in [&*FENCE_OPEN, &*FENCE_CLOSE].into_iter().flatten() {
        cleaned = regex.replace_all(&cleaned, "").into_owned();
    }
    cleaned = cleaned.replace('`', "");

    cleaned = match WHITESPACE.as_ref() {
        Some(regex) => regex.replace_all(&cleaned, " ").trim().to_string(),
        None => cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
    };

    if !cleaned.is_empty() && !cleaned.ends_with(';') {
        cleaned.push(';');
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_plain_query() {
        assert_eq!(clean("SELECT 1"), "SELECT 1;");
        assert_eq!(clean("SELECT 1;"), "SELECT 1;");
    }

    #[test]
    fn test_clean_fenced_block() {
        let raw = "```SQL\nSELECT name\nFROM users;\n```\n";
        assert_eq!(clean(raw), "SELECT name FROM users;");
    }

    #[test]
    fn test_clean_blank() {
        assert_eq!(clean("  \n\t "), "");
    }

    #[test]
    fn test_clean_idempotent() {
        let once = clean("```\nSELECT `id` FROM t\n```");
        assert_eq!(clean(&once), once);
    }
}
