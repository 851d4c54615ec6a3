use dql_compiler::dql_parser::ast::{ClauseKind, ConditionKind, JoinKind};
use dql_compiler::dql_parser::parse_query;
use dql_compiler::QueryError;

#[test]
fn test_clause_keywords_are_case_insensitive() {
    let query =
        parse_query("select u.name from User u left join u.Phonenumber p where u.id = ? order by u.name").unwrap();
    assert_eq!(query.select.unwrap().text, "u.name");
    assert_eq!(query.from.len(), 2);
    assert_eq!(query.from[1].join, Some(JoinKind::Left));
    assert_eq!(query.where_clause.unwrap().text, "u.id = ?");
    assert_eq!(query.order_by.unwrap().text, "u.name");
}

#[test]
fn test_join_condition_kinds() {
    let query = parse_query(
        "FROM User u LEFT JOIN u.Phonenumber p ON p.phonenumber = '123 123' INNER JOIN u.Email e WITH e.address = ?",
    )
    .unwrap();
    let phone = query.from[1].condition.as_ref().unwrap();
    assert_eq!(phone.kind, ConditionKind::On);
    assert_eq!(phone.segment.text, "p.phonenumber = '123 123'");
    let email = query.from[2].condition.as_ref().unwrap();
    assert_eq!(email.kind, ConditionKind::With);
    assert_eq!(email.segment.first_param, 0);
    assert_eq!(query.placeholders, 1);
}

#[test]
fn test_placeholders_are_numbered_across_clauses() {
    let query = parse_query(
        "SELECT u.name FROM User u LEFT JOIN u.Phonenumber p WITH p.phonenumber = ? WHERE u.id > ? HAVING COUNT(p.id) > ?",
    )
    .unwrap();
    assert_eq!(query.where_clause.unwrap().first_param, 1);
    assert_eq!(query.having.unwrap().first_param, 2);
    assert_eq!(query.placeholders, 3);
}

#[test]
fn test_index_by_on_root() {
    let query = parse_query("FROM User u INDEXBY u.name").unwrap();
    assert_eq!(query.from[0].index_by.as_deref(), Some("u.name"));
}

#[test]
fn test_negative_limit_is_a_syntax_error() {
    let err = parse_query("FROM User u LIMIT -1").unwrap_err();
    assert!(matches!(err, QueryError::Syntax { clause: ClauseKind::Limit, .. }));
}

#[test]
fn test_repeated_clause_is_rejected() {
    let err = parse_query("FROM User u WHERE u.id = 1 WHERE u.id = 2").unwrap_err();
    assert_eq!(err.clause(), ClauseKind::Where);
}
