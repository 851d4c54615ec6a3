use dql_compiler::dql_parser::parse_query;
use dql_compiler::Query;
use serde_json::json;

#[test]
fn test_builder_output_parses_back() {
    let query = Query::create()
        .select("u.name, COUNT(p.id) total")
        .from("User u")
        .left_join("u.Phonenumber p")
        .group_by("u.id")
        .having("total > ?", vec![json!(2)])
        .order_by("u.name");
    let dql = query.to_dql();
    assert_eq!(
        dql,
        "SELECT u.name, COUNT(p.id) total FROM User u LEFT JOIN u.Phonenumber p GROUP BY u.id HAVING total > ? ORDER BY u.name"
    );
    let parsed = parse_query(&dql).unwrap();
    assert_eq!(parsed.placeholders, query.params().len());
}

#[test]
fn test_where_replaces_and_and_where_appends() {
    let query = Query::for_component("User", "u")
        .where_("u.id = ?", vec![json!(1)])
        .where_("u.name = ?", vec![json!("zYne")])
        .and_where("u.loginname = ?", vec![json!("zyne")]);
    assert_eq!(query.to_dql(), "FROM User u WHERE (u.name = ?) AND (u.loginname = ?)");
    assert_eq!(query.params(), vec![json!("zYne"), json!("zyne")]);
}

#[test]
fn test_where_params_precede_having_params() {
    let query = Query::for_component("User", "u")
        .select("u.name")
        .inner_join("u.Group g")
        .having("COUNT(g.id) > ?", vec![json!(1)])
        .where_("u.id > ?", vec![json!(10)])
        .distinct()
        .limit(5)
        .offset(10);
    assert_eq!(
        query.to_dql(),
        "SELECT DISTINCT u.name FROM User u INNER JOIN u.Group g WHERE u.id > ? HAVING COUNT(g.id) > ? LIMIT 5 OFFSET 10"
    );
    assert_eq!(query.params(), vec![json!(10), json!(1)]);
}
