use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, DbErr, QueryResult, Statement, Value};

use crate::policy::errors::PolicyError;
use crate::policy::types::{PolicyRule, ResourceFilter};

const KIND: &str = "database";

/// Clauses that must stay after an injected predicate.
const TRAILING_CLAUSES: [&str; 4] = ["GROUP BY", "ORDER BY", "LIMIT", "OFFSET"];

/// Run a rule query. Rows need `id`, `role_id`, `resource_code` and `action_code`.
pub async fn load_rules(
    db: &DatabaseConnection,
    query: &str,
    filter: &ResourceFilter,
) -> Result<Vec<PolicyRule>, PolicyError> {
    let stmt = build_statement(db.get_database_backend(), query, filter);
    tracing::debug!(sql = %stmt.sql, resources = ?filter.codes(), "Loading policy rules from database");

    let rows = db
        .query_all(stmt)
        .await
        .map_err(|e| PolicyError::unavailable(KIND, e))?;

    let rules = rows
        .iter()
        .map(row_to_rule)
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(count = rules.len(), "Loaded policy rules from database");
    Ok(rules)
}

/// Build the statement for `query`, binding filter values as parameters.
pub fn build_statement(backend: DbBackend, query: &str, filter: &ResourceFilter) -> Statement {
    let base = query.trim().trim_end_matches(';').trim_end();
    if filter.is_empty() {
        return Statement::from_string(backend, base.to_string());
    }

    let placeholders = (1..=filter.codes().len())
        .map(|n| match backend {
            DbBackend::Postgres => format!("${n}"),
            _ => "?".to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    let predicate = format!("resource_code IN ({placeholders})");
    let sql = with_predicate(base, &predicate);
    let values = filter
        .codes()
        .iter()
        .map(|c| Value::from(c.clone()))
        .collect::<Vec<_>>();

    Statement::from_sql_and_values(backend, sql, values)
}

/// Add `predicate` to the outermost WHERE clause, or introduce one, keeping
/// any trailing GROUP BY / ORDER BY / LIMIT / OFFSET after it. Keywords inside
/// parentheses or quotes belong to subqueries and literals and are ignored.
fn with_predicate(base: &str, predicate: &str) -> String {
    let top = top_level_view(base);
    let where_at = rfind_keyword(&top, "WHERE");
    let search_from = where_at.unwrap_or(0);
    let tail_at = TRAILING_CLAUSES
        .iter()
        .filter_map(|kw| find_keyword(&top, kw, search_from))
        .min();

    let (head, tail) = match tail_at {
        Some(at) => (base[..at].trim_end(), &base[at..]),
        None => (base, ""),
    };

    let mut sql = match where_at {
        Some(at) => {
            let condition = head[at + "WHERE".len()..].trim();
            format!("{} WHERE ({condition}) AND {predicate}", head[..at].trim_end())
        }
        None => format!("{head} WHERE {predicate}"),
    };
    if !tail.is_empty() {
        sql.push(' ');
        sql.push_str(tail);
    }
    sql
}

/// Upper-cased copy of `sql` with every byte inside quotes or parentheses
/// blanked out. Byte offsets line up with `sql`.
fn top_level_view(sql: &str) -> String {
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;
    let masked = sql
        .bytes()
        .map(|b| match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
                b' '
            }
            None => match b {
                b'\'' | b'"' | b'`' => {
                    quote = Some(b);
                    b' '
                }
                b'(' => {
                    depth += 1;
                    b' '
                }
                b')' => {
                    depth = depth.saturating_sub(1);
                    b' '
                }
                _ if depth > 0 || !b.is_ascii() => b' ',
                _ => b.to_ascii_uppercase(),
            },
        })
        .collect::<Vec<u8>>();
    // Only ASCII bytes survive the mask
    String::from_utf8(masked).unwrap_or_default()
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_keyword_at(haystack: &str, at: usize, keyword: &str) -> bool {
    let bytes = haystack.as_bytes();
    let end = at + keyword.len();
    let before_ok = at == 0 || !is_word_byte(bytes[at - 1]);
    let after_ok = end >= bytes.len() || !is_word_byte(bytes[end]);
    before_ok && after_ok
}

fn find_keyword(haystack: &str, keyword: &str, from: usize) -> Option<usize> {
    haystack
        .match_indices(keyword)
        .map(|(at, _)| at)
        .find(|&at| at >= from && is_keyword_at(haystack, at, keyword))
}

fn rfind_keyword(haystack: &str, keyword: &str) -> Option<usize> {
    haystack
        .rmatch_indices(keyword)
        .map(|(at, _)| at)
        .find(|&at| is_keyword_at(haystack, at, keyword))
}

fn row_to_rule(row: &QueryResult) -> Result<PolicyRule, PolicyError> {
    let id = get_i64(row, "id")?;
    let role_id = get_i64(row, "role_id")?;
    let resource_code: String = row.try_get("", "resource_code").map_err(malformed)?;
    let action_code: String = row.try_get("", "action_code").map_err(malformed)?;

    if resource_code.trim().is_empty() || action_code.trim().is_empty() {
        return Err(PolicyError::MalformedRuleData(format!(
            "rule {id} has an empty resource_code or action_code"
        )));
    }

    Ok(PolicyRule::new(id, role_id, &resource_code, &action_code))
}

// INTEGER columns come back as i32 on some backends
fn get_i64(row: &QueryResult, column: &str) -> Result<i64, PolicyError> {
    match row.try_get::<i64>("", column) {
        Ok(v) => Ok(v),
        Err(_) => row
            .try_get::<i32>("", column)
            .map(i64::from)
            .map_err(malformed),
    }
}

fn malformed(e: DbErr) -> PolicyError {
    PolicyError::MalformedRuleData(e.to_string())
}
