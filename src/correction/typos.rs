//! Literal typo and operator repair.
//!
//! Both tables apply only outside single-quoted string literals.

use std::sync::LazyLock;

use regex::Regex;

/// Misspelled keywords and function names
pub const KEYWORD_TYPOS: [(&str, &str); 18] = [
    ("SELCET", "SELECT"),
    ("FORM", "FROM"),
    ("WEHRE", "WHERE"),
    ("GROPU BY", "GROUP BY"),
    ("OREDER BY", "ORDER BY"),
    ("HAVIN", "HAVING"),
    ("JION", "JOIN"),
    ("INNE JOIN", "INNER JOIN"),
    ("LEFY JOIN", "LEFT JOIN"),
    ("RIGH JOIN", "RIGHT JOIN"),
    ("LENGHT", "LENGTH"),
    ("SUBSTRIN", "SUBSTRING"),
    ("CONCATE", "CONCAT"),
    ("CONUT", "COUNT"),
    ("SUMM", "SUM"),
    ("AVRAGE", "AVG"),
    ("MAXIMU", "MAX"),
    ("MINIMU", "MIN")
];

/// Operators borrowed from programming languages, in application order.
///
/// `!=` and `||` are valid SQL (inequality and concatenation) and are left
/// alone; a bare `!` only becomes `NOT` when it is not part of `!=`.
const OPERATOR_FIXES: [(&str, &str); 5] = [
    (r"=<", "<="),
    (r"=>", ">="),
    (r"==", "="),
    (r"\s*&&\s*", " AND "),
    (r"!\s*([^=\s!])", "NOT ${1}")
];

struct Fix {
    typo:        &'static str,
    regex:       Regex,
    replacement: &'static str
}

fn compile(table: &[(&'static str, &'static str)], to_pattern: fn(&str) -> String) -> Vec<Fix> {
    table
        .iter()
        .filter_map(|&(typo, replacement)| match Regex::new(&to_pattern(typo)) {
            Ok(regex) => Some(Fix {
                typo,
                regex,
                replacement
            }),
            Err(e) => {
                tracing::warn!(typo, error = %e, "typo rule skipped");
                None
            }
        })
        .collect()
}

static KEYWORD_FIXES: LazyLock<Vec<Fix>> = LazyLock::new(|| {
    compile(&KEYWORD_TYPOS, |typo| {
        let words: Vec<String> = typo.split(' ').map(regex::escape).collect();
        format!(r"(?i)\b{}\b", words.join(r"\s+"))
    })
});

static OPERATOR_RULES: LazyLock<Vec<Fix>> =
    LazyLock::new(|| compile(&OPERATOR_FIXES, |pattern| pattern.to_string()));

/// Apply `f` to every part of `query` outside single-quoted literals.
///
/// Doubled quotes inside a literal toggle twice and stay inside it.
pub fn map_outside_literals(query: &str, mut f: impl FnMut(&str) -> String) -> String {
    let mut out = String::with_capacity(query.len());
    let mut in_literal = false;
    for (i, segment) in query.split('\'').enumerate() {
        if i > 0 {
            out.push('\'');
        }
        if in_literal {
            out.push_str(segment);
        } else {
            out.push_str(&f(segment));
        }
        in_literal = !in_literal;
    }
    out
}

/// Rewrite every known keyword typo and operator slip.
pub fn fix_common_typos(query: &str) -> String {
    map_outside_literals(query, |segment| {
        let mut fixed = segment.to_string();
        for fix in KEYWORD_FIXES.iter().chain(OPERATOR_RULES.iter()) {
            if fix.regex.is_match(&fixed) {
                fixed = fix.regex.replace_all(&fixed, fix.replacement).into_owned();
            }
        }
        fixed
    })
}

/// Keyword typos present in `query`, in table order
pub fn find_typos(query: &str) -> Vec<&'static str> {
    let mut outside = String::new();
    map_outside_literals(query, |segment| {
        outside.push_str(segment);
        outside.push(' ');
        String::new()
    });
    KEYWORD_FIXES
        .iter()
        .filter(|fix| fix.regex.is_match(&outside))
        .map(|fix| fix.typo)
        .collect()
}
