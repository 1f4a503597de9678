//! Rule based rewrites grouped by category.
//!
//! Every rule pairs a detector with a rewrite. Detection and rewriting are
//! kept apart so the same table drives both [`correct`] and the advisory
//! suggestions.
//!
//! [`correct`]: super::CorrectionService::correct

use std::sync::LazyLock;

use regex::{NoExpand, Regex};
use serde::Serialize;

use crate::{recovery, schema::SchemaCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Performance,
    Syntax,
    Semantic
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFix {
    AddMissingLimit,
    OptimizeSelectStar,
    AddWhereConditions,
    FixMissingCommas,
    FixQuoteConsistency,
    FixAggregationWithoutGroupBy,
    FixHavingWithoutGroupBy
}

#[derive(Debug, Clone, Copy)]
pub struct CorrectionRule {
    pub fix:         RuleFix,
    pub category:    RuleCategory,
    pub confidence:  f64,
    pub description: &'static str
}

impl CorrectionRule {
    pub fn name(&self) -> &'static str {
        self.fix.as_str()
    }
}

pub const CORRECTION_RULES: [CorrectionRule; 7] = [
    CorrectionRule {
        fix:         RuleFix::AddMissingLimit,
        category:    RuleCategory::Performance,
        confidence:  0.9,
        description: "Add LIMIT clause to prevent large result sets"
    },
    CorrectionRule {
        fix:         RuleFix::OptimizeSelectStar,
        category:    RuleCategory::Performance,
        confidence:  0.7,
        description: "Replace SELECT * with specific columns"
    },
    CorrectionRule {
        fix:         RuleFix::AddWhereConditions,
        category:    RuleCategory::Performance,
        confidence:  0.5,
        description: "Suggest WHERE clause to filter results"
    },
    CorrectionRule {
        fix:         RuleFix::FixMissingCommas,
        category:    RuleCategory::Syntax,
        confidence:  0.8,
        description: "Add missing commas in SELECT clause"
    },
    CorrectionRule {
        fix:         RuleFix::FixQuoteConsistency,
        category:    RuleCategory::Syntax,
        confidence:  0.9,
        description: "Remove unnecessary quotes from numeric values"
    },
    CorrectionRule {
        fix:         RuleFix::FixAggregationWithoutGroupBy,
        category:    RuleCategory::Semantic,
        confidence:  0.7,
        description: "Add GROUP BY clause for aggregate functions"
    },
    CorrectionRule {
        fix:         RuleFix::FixHavingWithoutGroupBy,
        category:    RuleCategory::Semantic,
        confidence:  0.8,
        description: "Fix HAVING clause without GROUP BY"
    }
];

/// Inputs a rewrite may consult
pub struct RuleContext<'a> {
    pub schema:        &'a SchemaCache,
    pub default_limit: u64
}

fn regex(source: &str) -> Option<Regex> {
    match Regex::new(source) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(pattern = source, error = %e, "correction rule disabled");
            None
        }
    }
}

static SELECT_FROM: LazyLock<Option<Regex>> = LazyLock::new(|| regex(r"(?is)^\s*SELECT\b.*\bFROM\b"));
static ROW_BOUND: LazyLock<Option<Regex>> = LazyLock::new(|| regex(r"(?i)\b(?:LIMIT|TOP)\b"));
static SELECT_STAR_FROM: LazyLock<Option<Regex>> =
    LazyLock::new(|| regex(r"(?i)\bSELECT\s+\*\s+FROM\b"));
static FROM_TABLE: LazyLock<Option<Regex>> = LazyLock::new(|| regex(r"(?i)\bFROM\s+\w+"));
static WHERE_OR_JOIN: LazyLock<Option<Regex>> = LazyLock::new(|| regex(r"(?i)\b(?:WHERE|JOIN)\b"));
static WHERE: LazyLock<Option<Regex>> = LazyLock::new(|| regex(r"(?i)\bWHERE\b"));
static AGGREGATE_CALL: LazyLock<Option<Regex>> =
    LazyLock::new(|| regex(r"(?i)\b(?:COUNT|SUM|AVG|MAX|MIN)\s*\("));
static GROUP_BY: LazyLock<Option<Regex>> = LazyLock::new(|| regex(r"(?i)\bGROUP\s+BY\b"));
static HAVING_CONDITION: LazyLock<Option<Regex>> =
    LazyLock::new(|| regex(r"(?is)\bHAVING\s+(.*?)(?:\s+ORDER\b|\s+LIMIT\b|;|$)"));
static HAVING_KEYWORD: LazyLock<Option<Regex>> = LazyLock::new(|| regex(r"(?i)\s+HAVING\s+"));

fn matches(regex: &Option<Regex>, query: &str) -> bool {
    regex.as_ref().is_some_and(|r| r.is_match(query))
}

impl RuleFix {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddMissingLimit => "add_missing_limit",
            Self::OptimizeSelectStar => "optimize_select_star",
            Self::AddWhereConditions => "add_where_conditions",
            Self::FixMissingCommas => "fix_missing_commas",
            Self::FixQuoteConsistency => "fix_quote_consistency",
            Self::FixAggregationWithoutGroupBy => "fix_aggregation_without_group_by",
            Self::FixHavingWithoutGroupBy => "fix_having_without_group_by"
        }
    }

    /// Whether the rule has something to say about `query`
    pub fn detect(self, query: &str) -> bool {
        match self {
            Self::AddMissingLimit => matches(&SELECT_FROM, query) && !matches(&ROW_BOUND, query),
            Self::OptimizeSelectStar => matches(&SELECT_STAR_FROM, query),
            Self::AddWhereConditions => {
                matches(&SELECT_FROM, query)
                    && matches(&FROM_TABLE, query)
                    && !matches(&WHERE_OR_JOIN, query)
            }
            Self::FixMissingCommas => recovery::add_select_comma(query).is_some(),
            Self::FixQuoteConsistency => {
                recovery::unquote_numbers(query).is_some_and(|fixed| fixed != query)
            }
            Self::FixAggregationWithoutGroupBy => {
                matches(&AGGREGATE_CALL, query)
                    && !matches(&GROUP_BY, query)
                    && !recovery::group_by_columns(query).is_empty()
            }
            Self::FixHavingWithoutGroupBy => having_without_aggregate(query)
        }
    }

    /// Rewrite `query`; returns it unchanged when nothing applies.
    pub fn apply(self, query: &str, ctx: &RuleContext<'_>) -> String {
        if !self.detect(query) {
            return query.to_string();
        }
        match self {
            Self::AddMissingLimit => {
                let body = query.trim_end().trim_end_matches(';').trim_end();
                format!("{} LIMIT {};", body, ctx.default_limit)
            }
            Self::OptimizeSelectStar => optimize_select_star(query, ctx.schema),
            // No filter can be invented; the rule only ever suggests
            Self::AddWhereConditions => query.to_string(),
            Self::FixMissingCommas => {
                recovery::add_select_comma(query).unwrap_or_else(|| query.to_string())
            }
            Self::FixQuoteConsistency => {
                recovery::unquote_numbers(query).unwrap_or_else(|| query.to_string())
            }
            Self::FixAggregationWithoutGroupBy => recovery::fix_group_by(query).0,
            Self::FixHavingWithoutGroupBy => {
                let replacement = if matches(&WHERE, query) {
                    " AND "
                } else {
                    " WHERE "
                };
                match HAVING_KEYWORD.as_ref() {
                    Some(regex) => regex.replace(query, NoExpand(replacement)).into_owned(),
                    None => query.to_string()
                }
            }
        }
    }
}

fn having_without_aggregate(query: &str) -> bool {
    if matches(&GROUP_BY, query) {
        return false;
    }
    HAVING_CONDITION
        .as_ref()
        .and_then(|r| r.captures(query))
        .is_some_and(|caps| !matches(&AGGREGATE_CALL, &caps[1]))
}

fn optimize_select_star(query: &str, schema: &SchemaCache) -> String {
    let columns = schema.columns_for_query(query);
    let list = if columns.is_empty() {
        "id, name".to_string()
    } else {
        columns.join(", ")
    };
    match SELECT_STAR_FROM.as_ref() {
        Some(regex) => regex
            .replace(query, NoExpand(&format!("SELECT {} FROM", list)))
            .into_owned(),
        None => query.to_string()
    }
}
