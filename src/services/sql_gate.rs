use crate::errors::QueryError;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

static MUTATION_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(drop|insert|update|truncate|delete|copy\s+into|alter|create|upsert|merge)\b")
        .expect("mutation keyword pattern must compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationMethod {
    /// Mutations are allowed by configuration; nothing was inspected.
    Permitted,
    Parsed,
    KeywordScan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlClassification {
    pub safe: bool,
    pub reason: Option<String>,
    pub method: ClassificationMethod,
}

impl SqlClassification {
    fn safe(method: ClassificationMethod) -> Self {
        Self {
            safe: true,
            reason: None,
            method,
        }
    }

    fn unsafe_because(method: ClassificationMethod, reason: String) -> Self {
        Self {
            safe: false,
            reason: Some(reason),
            method,
        }
    }
}

fn is_read_only_query(query: &Query) -> bool {
    let ctes_read_only = query
        .with
        .as_ref()
        .map(|with| with.cte_tables.iter().all(|cte| is_read_only_query(&cte.query)))
        .unwrap_or(true);
    ctes_read_only && is_read_only_body(&query.body)
}

fn is_read_only_body(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => is_read_only_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            is_read_only_body(left) && is_read_only_body(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        _ => false,
    }
}

fn statement_keyword(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase()
}

fn classify_statements(statements: &[Statement]) -> SqlClassification {
    if statements.is_empty() {
        return SqlClassification::unsafe_because(
            ClassificationMethod::Parsed,
            "no statement found".to_string(),
        );
    }
    for statement in statements {
        let read_only = match statement {
            Statement::Query(query) => is_read_only_query(query),
            _ => false,
        };
        if !read_only {
            return SqlClassification::unsafe_because(
                ClassificationMethod::Parsed,
                format!("{} statements are not read-only", statement_keyword(statement)),
            );
        }
    }
    SqlClassification::safe(ClassificationMethod::Parsed)
}

fn scan_keywords(sql: &str) -> SqlClassification {
    match MUTATION_KEYWORDS.find(sql) {
        Some(found) => SqlClassification::unsafe_because(
            ClassificationMethod::KeywordScan,
            format!(
                "statement could not be parsed and contains '{}'",
                found.as_str().to_uppercase()
            ),
        ),
        None => SqlClassification::safe(ClassificationMethod::KeywordScan),
    }
}

/// Classifies SQL as read-only or mutating. A parsed statement list is safe
/// only when every statement is a query (SELECT, WITH, set operations). When
/// parsing fails the text is scanned for mutation keywords instead.
pub fn check(sql: &str, allow_mutations: bool) -> SqlClassification {
    if allow_mutations {
        return SqlClassification::safe(ClassificationMethod::Permitted);
    }
    match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) => classify_statements(&statements),
        Err(_) => scan_keywords(sql),
    }
}

pub fn ensure_allowed(sql: &str, allow_mutations: bool) -> Result<SqlClassification, QueryError> {
    let classification = check(sql, allow_mutations);
    if classification.safe {
        Ok(classification)
    } else {
        Err(QueryError::UnsafeQueryRejected {
            reason: classification.reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_safe(sql: &str) {
        let classification = check(sql, false);
        assert!(classification.safe, "should be allowed: {} ({:?})", sql, classification);
    }

    fn assert_unsafe(sql: &str) {
        let classification = check(sql, false);
        assert!(!classification.safe, "should be rejected: {}", sql);
        assert!(classification.reason.is_some());
    }

    #[test]
    fn basic_select_and_drop() {
        let select = check("SELECT * FROM t", false);
        assert!(select.safe);
        assert_eq!(select.method, ClassificationMethod::Parsed);

        let drop = check("DROP TABLE t", false);
        assert!(!drop.safe);
        assert_eq!(drop.method, ClassificationMethod::Parsed);

        let permitted = check("DROP TABLE t", true);
        assert!(permitted.safe);
        assert_eq!(permitted.method, ClassificationMethod::Permitted);
    }

    #[test]
    fn keywords_inside_literals_do_not_trip_parsed_selects() {
        assert_safe("select id from t where x='drop this'");
        assert_safe("SELECT COUNT(*) AS total FROM \"eu-central-1-glue\".salesforce.opportunity WHERE is_deleted = false");
        assert_safe("select 'update' as action, \"delete\" from audit");
    }

    #[test]
    fn read_only_query_shapes_are_allowed() {
        assert_safe("SELECT u.name, p.title FROM users u INNER JOIN posts p ON u.id = p.user_id WHERE u.active = true;");
        assert_safe(
            "WITH monthly AS (SELECT DATE_TRUNC('month', order_date) AS m, SUM(total) AS s FROM orders GROUP BY 1) \
             SELECT * FROM monthly WHERE s > 10",
        );
        assert_safe(
            "WITH RECURSIVE h AS (SELECT id, manager_id, 0 AS lvl FROM employees WHERE manager_id IS NULL \
             UNION ALL SELECT e.id, e.manager_id, h.lvl + 1 FROM employees e JOIN h ON e.manager_id = h.id) \
             SELECT * FROM h ORDER BY lvl",
        );
        assert_safe("SELECT 'active' AS kind, COUNT(*) FROM users WHERE active = true UNION ALL SELECT 'total', COUNT(*) FROM users");
        assert_safe("SELECT name FROM users WHERE id IN (SELECT user_id FROM orders WHERE total > 100)");
    }

    #[test]
    fn mutating_statements_are_rejected() {
        assert_unsafe("INSERT INTO users (name, age) VALUES ('John', 30)");
        assert_unsafe("INSERT INTO audit (user_id) SELECT id FROM users");
        assert_unsafe("UPDATE users SET last_login = CURRENT_TIMESTAMP WHERE id = 123");
        assert_unsafe("DELETE FROM temp_data WHERE created_at < CURRENT_DATE");
        assert_unsafe("CREATE TABLE categories (id INT PRIMARY KEY, name VARCHAR(100))");
        assert_unsafe("CREATE VIEW v AS SELECT * FROM users");
        assert_unsafe("ALTER TABLE products ADD COLUMN sku VARCHAR(20)");
        assert_unsafe("DROP TABLE IF EXISTS temp_imports CASCADE");
        assert_unsafe("TRUNCATE TABLE logs");
        assert_unsafe("CREATE OR REPLACE FUNCTION f(x DECIMAL) RETURNS DECIMAL AS $$ BEGIN RETURN x; END; $$ LANGUAGE plpgsql");
        assert_unsafe(
            "COPY INTO \"lake\".\"us\".\"jobs\" FROM '@stage/us/jobs_json/2025-05-29' FILE_FORMAT 'json'",
        );
        assert_unsafe("UPSERT INTO prefs (user_id, v) VALUES (1, 'x')");
    }

    #[test]
    fn every_statement_in_a_batch_must_be_read_only() {
        assert_unsafe("BEGIN; UPDATE accounts SET balance = balance - 100 WHERE id = 1; COMMIT;");
        assert_unsafe("SELECT 1; DROP TABLE t");
        assert_safe("SELECT 1; SELECT 2");
    }

    #[test]
    fn select_into_creates_a_table() {
        assert_unsafe("SELECT * INTO backup FROM users");
    }

    #[test]
    fn unparseable_text_falls_back_to_keyword_scan() {
        let harmless = check("SELEC * FRM t", false);
        assert!(harmless.safe);
        assert_eq!(harmless.method, ClassificationMethod::KeywordScan);

        let dangerous = check("SELEC * FRM t; DROP TABLE t", false);
        assert!(!dangerous.safe);
        assert_eq!(dangerous.method, ClassificationMethod::KeywordScan);
        assert!(dangerous.reason.unwrap_or_default().contains("DROP"));
    }

    #[test]
    fn ensure_allowed_reports_fixed_message() {
        let err = ensure_allowed("DROP TABLE t", false).expect_err("rejected");
        assert_eq!(
            err.to_string(),
            "The query contains a DML statement. Only select queries are allowed"
        );
        assert!(ensure_allowed("SELECT 1", false).is_ok());
    }
}
