use super::*;
use crate::error::RecordError;
use crate::test_support::RecordingClient;

#[test]
fn test_simple_select() {
    assert_eq!(Query::new("users").to_sql(), "SELECT * FROM users");
}

#[test]
fn test_select_with_columns() {
    let q = Query::new("users").select(&["id", "name"]);
    assert_eq!(q.to_sql(), "SELECT id, name FROM users");
    assert_eq!(q.select(&[]).to_sql(), "SELECT * FROM users");
}

#[test]
fn test_where_and_or() {
    let q = Query::new("users")
        .filter("status", FilterOp::Eq, "active")
        .and("age", FilterOp::Gt, 18)
        .or("role", FilterOp::Ne, "guest");
    assert_eq!(
        q.to_sql(),
        "SELECT * FROM users WHERE status = $1 AND age > $2 OR role <> $3"
    );
    assert_eq!(
        q.args(),
        &[Value::from("active"), Value::from(18), Value::from("guest")]
    );
}

#[test]
fn test_and_without_where_is_ignored() {
    let q = Query::new("users")
        .and("age", FilterOp::Gt, 18)
        .or("id", FilterOp::In, "not a list");
    assert_eq!(q.to_sql(), "SELECT * FROM users");
    assert!(q.args().is_empty());
    assert!(q.error().is_none());
}

#[test]
fn test_filter_replaces_where_and_restarts_numbering() {
    let q = Query::new("users")
        .filter("a", FilterOp::Eq, 1)
        .and("b", FilterOp::Eq, 2)
        .filter("c", FilterOp::Lte, 3);
    assert_eq!(q.to_sql(), "SELECT * FROM users WHERE c <= $1");
    assert_eq!(q.args(), &[Value::from(3)]);
}

#[test]
fn test_in_expands_placeholders() {
    let q = Query::new("users")
        .filter("tenant", FilterOp::Eq, 7)
        .and("id", FilterOp::In, vec![10, 11, 12]);
    assert_eq!(
        q.to_sql(),
        "SELECT * FROM users WHERE tenant = $1 AND id IN ($2,$3,$4)"
    );
    assert_eq!(q.args().len(), 4);
}

#[test]
fn test_not_in_and_not_between() {
    let q = Query::new("t")
        .filter("x", FilterOp::NotIn, vec!["a", "b"])
        .and("y", FilterOp::NotBetween, vec![1, 5]);
    assert_eq!(
        q.to_sql(),
        "SELECT * FROM t WHERE x NOT IN ($1,$2) AND y NOT BETWEEN $3 AND $4"
    );
}

#[test]
fn test_between_binds_two_values() {
    let q = Query::new("orders").filter("total", FilterOp::Between, vec![10, 100]);
    assert_eq!(q.to_sql(), "SELECT * FROM orders WHERE total BETWEEN $1 AND $2");
    assert_eq!(q.args(), &[Value::from(10), Value::from(100)]);
}

#[test]
fn test_in_requires_a_list() {
    let q = Query::new("users").filter("id", FilterOp::In, 5);
    assert_eq!(
        q.error(),
        Some(&FilterError::NotASequence {
            column: "id".into(),
            op: "IN",
        })
    );
}

#[test]
fn test_in_rejects_empty_list() {
    let q = Query::new("users")
        .filter("a", FilterOp::Eq, 1)
        .and("id", FilterOp::In, Vec::<i64>::new());
    assert!(matches!(q.error(), Some(FilterError::EmptySequence { .. })));
    // The rejected term leaves the clause untouched.
    assert_eq!(q.to_sql(), "SELECT * FROM users WHERE a = $1");
}

#[test]
fn test_between_requires_exactly_two_bounds() {
    let q = Query::new("t").filter("x", FilterOp::Between, vec![1]);
    assert_eq!(
        q.error(),
        Some(&FilterError::IncompleteRange {
            column: "x".into(),
            op: "BETWEEN",
            got: 1,
        })
    );

    let q = Query::new("t").filter("x", FilterOp::Between, vec![1, 2, 3]);
    assert!(matches!(
        q.error(),
        Some(FilterError::IncompleteRange { got: 3, .. })
    ));
}

#[test]
fn test_first_error_is_kept() {
    let q = Query::new("t")
        .filter("x", FilterOp::In, 1)
        .filter("y", FilterOp::Between, vec![1]);
    assert!(matches!(q.error(), Some(FilterError::NotASequence { .. })));
}

#[test]
fn test_joins_keep_order() {
    let q = Query::new("orders o")
        .select(&["o.id", "c.name"])
        .join(JoinKind::Inner, "customers c", "c.id = o.customer_id")
        .join(JoinKind::Full, "notes n", "n.order_id = o.id")
        .filter("o.id", FilterOp::Eq, 1);
    assert_eq!(
        q.to_sql(),
        "SELECT o.id, c.name FROM orders o \
         INNER JOIN customers c ON c.id = o.customer_id \
         FULL OUTER JOIN notes n ON n.order_id = o.id \
         WHERE o.id = $1"
    );
}

#[test]
fn test_clause_order() {
    let q = Query::new("sales")
        .select(&["region", "SUM(amount)"])
        .filter("year", FilterOp::Eq, 2024)
        .group_by(&["region"])
        .order_by(&["region"])
        .limit_offset(10, 20);
    assert_eq!(
        q.to_sql(),
        "SELECT region, SUM(amount) FROM sales WHERE year = $1 \
         GROUP BY region ORDER BY region LIMIT 10 OFFSET 20"
    );
}

#[test]
fn test_empty_group_by_is_noop() {
    let q = Query::new("t").group_by(&["a", "b"]).group_by(&[]);
    assert_eq!(q.to_sql(), "SELECT * FROM t GROUP BY a,b");
}

#[test]
fn test_limit_and_top_override_each_other() {
    assert_eq!(
        Query::new("t").limit_offset(5, 5).top(3).to_sql(),
        "SELECT * FROM t LIMIT 3"
    );
    assert_eq!(
        Query::new("t").top(3).limit_offset(5, 10).to_sql(),
        "SELECT * FROM t LIMIT 5 OFFSET 10"
    );
    assert_eq!(Query::new("t").limit_one().to_sql(), "SELECT * FROM t LIMIT 1");
}

#[test]
fn test_raw_ignores_composition() {
    let q = Query::new("users")
        .filter("id", FilterOp::Eq, 1)
        .with_raw("SELECT now() WHERE $1::int > 0", vec![Value::from(5)]);
    assert!(q.is_raw());
    assert_eq!(q.to_sql(), "SELECT now() WHERE $1::int > 0");
    assert_eq!(q.args(), &[Value::from(5)]);
}

#[test]
fn test_reset_keeps_table() {
    let q = Query::new("users")
        .select(&["id"])
        .filter("id", FilterOp::In, 3)
        .limit(4)
        .reset();
    assert_eq!(q, Query::new("users"));
}

#[test]
fn test_display_renders_sql() {
    let q = Query::new("users").filter("id", FilterOp::Like, "a%");
    assert_eq!(q.to_string(), "SELECT * FROM users WHERE id LIKE $1");
}

#[tokio::test]
async fn stored_error_surfaces_before_any_round_trip() {
    let client = RecordingClient::default();
    let err = Query::new("users")
        .filter("id", FilterOp::In, Vec::<i64>::new())
        .fetch_in(&client)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RecordError::Filter(FilterError::EmptySequence { .. })
    ));
    assert!(client.executed().is_empty());
}

#[tokio::test]
async fn fetch_in_sends_rendered_sql() {
    let client = RecordingClient::default();
    let rows = Query::new("users")
        .filter("id", FilterOp::Eq, 1)
        .fetch_in(&client)
        .await
        .unwrap();
    assert!(rows.is_empty());
    assert!(rows.one().is_empty());
    assert_eq!(
        client.executed(),
        vec!["SELECT * FROM users WHERE id = $1".to_string()]
    );
}

#[tokio::test]
async fn execute_in_runs_raw_statements() {
    let client = RecordingClient::default();
    let affected = Query::raw("CALL refresh_totals($1)", vec![Value::from(3)])
        .execute_in(&client)
        .await
        .unwrap();
    assert_eq!(affected, 1);
    assert_eq!(client.executed(), vec!["CALL refresh_totals($1)".to_string()]);
}
