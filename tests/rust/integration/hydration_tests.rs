use dql_compiler::sql_generator::MysqlDialect;
use dql_compiler::{compile, hydrate, HydratedResult, HydrationMode, Related, ResultRow};
use serde_json::{json, Value};

use super::fixture_catalog;

fn rows(values: Vec<Value>) -> Vec<ResultRow> {
    values
        .into_iter()
        .map(|value| match value {
            Value::Object(object) => object.into_iter().collect(),
            other => panic!("row fixture must be an object, got {}", other),
        })
        .collect()
}

#[test]
fn test_users_with_groups_and_email() {
    let catalog = fixture_catalog();
    let compiled = compile(
        &catalog,
        &MysqlDialect,
        "SELECT u.name, g.name, m.address FROM User u LEFT JOIN u.Group g LEFT JOIN u.Email m",
        &[],
    )
    .unwrap();
    let data = rows(vec![
        json!({"e__id": 4, "e__name": "zYne", "e2__id": 1, "e2__name": "Action Actors", "e3__id": 7, "e3__address": "zyne@example.com"}),
        json!({"e__id": 4, "e__name": "zYne", "e2__id": 2, "e2__name": "Stunt Men", "e3__id": 7, "e3__address": "zyne@example.com"}),
        json!({"e__id": 5, "e__name": "Arnold", "e2__id": 1, "e2__name": "Action Actors", "e3__id": null, "e3__address": null}),
    ]);

    let users = match hydrate(data, &compiled.hydration_plan, HydrationMode::Record).unwrap() {
        HydratedResult::Records(users) => users,
        other => panic!("unexpected result {:?}", other),
    };
    assert_eq!(users.len(), 2);

    let zyne = users.get(0).unwrap();
    assert_eq!(zyne.get("name"), Some(&json!("zYne")));
    let groups: Vec<&Value> = zyne.many("Group").unwrap().iter().filter_map(|g| g.get("name")).collect();
    assert_eq!(groups, vec![&json!("Action Actors"), &json!("Stunt Men")]);
    assert_eq!(zyne.one("Email").and_then(|e| e.get("address")), Some(&json!("zyne@example.com")));

    let arnold = users.get(1).unwrap();
    assert_eq!(arnold.many("Group").unwrap().len(), 1);
    assert_eq!(arnold.related("Email"), Some(&Related::One(None)));
}

#[test]
fn test_array_mode_with_index_by() {
    let catalog = fixture_catalog();
    let compiled = compile(
        &catalog,
        &MysqlDialect,
        "SELECT u.name, p.phonenumber FROM User u INDEXBY u.name LEFT JOIN u.Phonenumber p",
        &[],
    )
    .unwrap();
    let data = rows(vec![
        json!({"e__id": 4, "e__name": "zYne", "p__id": 1, "p__phonenumber": "123 123"}),
        json!({"e__id": 5, "e__name": "Arnold", "p__id": null, "p__phonenumber": null}),
    ]);
    let value = hydrate(data, &compiled.hydration_plan, HydrationMode::Array)
        .unwrap()
        .into_value();
    assert_eq!(
        value,
        json!({
            "zYne": {"id": 4, "name": "zYne", "Phonenumber": [{"id": 1, "phonenumber": "123 123"}]},
            "Arnold": {"id": 5, "name": "Arnold", "Phonenumber": []}
        })
    );
}

#[test]
fn test_scalar_mode_is_one_map_per_row() {
    let catalog = fixture_catalog();
    let compiled = compile(&catalog, &MysqlDialect, "SELECT u.name FROM User u", &[]).unwrap();
    let data = rows(vec![json!({"e__id": 4, "e__name": "zYne"}), json!({"e__id": 4, "e__name": "zYne"})]);
    let result = hydrate(data, &compiled.hydration_plan, HydrationMode::Scalar).unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result.into_value(), json!([{"u_id": 4, "u_name": "zYne"}, {"u_id": 4, "u_name": "zYne"}]));
}
