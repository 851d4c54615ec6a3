//! Row-by-row reconstruction of record graphs.
//!
//! Every record created so far is kept in an arena. Per hydration node an
//! identity map goes from (parent record, primary key values) to the arena
//! slot, so a root repeated over several fanned-out rows is materialized once
//! and only its new children are attached.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::errors::HydrationError;
use super::plan::{FieldBinding, HydrationNode, HydrationPlan};
use super::record::{Collection, Record, Related};
use super::{HydratedResult, HydrationMode, ResultRow};

enum Slot {
    One(Option<usize>),
    Many {
        entries: Vec<usize>,
        /// INDEXBY key of each entry, when the collection is indexed.
        keys: Vec<String>,
    },
}

impl Slot {
    fn many() -> Self {
        Slot::Many {
            entries: Vec::new(),
            keys: Vec::new(),
        }
    }
}

struct Instance {
    node: usize,
    data: Map<String, Value>,
    /// One slot per child of the hydration node, in the same order.
    slots: Vec<Slot>,
}

type IdentityKey = (Option<usize>, Vec<String>);

/// Row handling and result assembly of one [`HydrationMode`].
struct ModeStrategy {
    push_row: fn(&mut Hydrator<'_>, &ResultRow) -> Result<(), HydrationError>,
    finish: fn(Hydrator<'_>) -> HydratedResult,
}

const RECORD_STRATEGY: ModeStrategy = ModeStrategy {
    push_row: push_graph_row,
    finish: finish_records,
};

const ARRAY_STRATEGY: ModeStrategy = ModeStrategy {
    push_row: push_graph_row,
    finish: finish_array,
};

const SCALAR_STRATEGY: ModeStrategy = ModeStrategy {
    push_row: push_scalar_row,
    finish: finish_scalar,
};

fn strategy(mode: HydrationMode) -> &'static ModeStrategy {
    match mode {
        HydrationMode::Record => &RECORD_STRATEGY,
        HydrationMode::Array => &ARRAY_STRATEGY,
        HydrationMode::Scalar => &SCALAR_STRATEGY,
    }
}

pub struct Hydrator<'p> {
    plan: &'p HydrationPlan,
    mode: HydrationMode,
    strategy: &'static ModeStrategy,
    instances: Vec<Instance>,
    identities: Vec<HashMap<IdentityKey, usize>>,
    roots: Slot,
    scalar_rows: Vec<Map<String, Value>>,
    rows_seen: usize,
}

impl<'p> Hydrator<'p> {
    pub fn new(plan: &'p HydrationPlan, mode: HydrationMode) -> Self {
        Hydrator {
            plan,
            mode,
            strategy: strategy(mode),
            instances: Vec::new(),
            identities: vec![HashMap::new(); plan.nodes.len()],
            roots: Slot::many(),
            scalar_rows: Vec::new(),
            rows_seen: 0,
        }
    }

    pub fn mode(&self) -> HydrationMode {
        self.mode
    }

    pub fn rows_seen(&self) -> usize {
        self.rows_seen
    }

    pub fn push_row(&mut self, row: &ResultRow) -> Result<(), HydrationError> {
        self.rows_seen += 1;
        (self.strategy.push_row)(self, row)
    }

    pub fn finish(self) -> HydratedResult {
        log::debug!(
            "Hydrated {} row(s) into {} record(s) ({:?} mode)",
            self.rows_seen,
            self.instances.len(),
            self.mode
        );
        (self.strategy.finish)(self)
    }

    fn create_instance(&mut self, n: usize, row: &ResultRow) -> Result<usize, HydrationError> {
        let node = &self.plan.nodes[n];
        let mut data = Map::new();
        for binding in node.fields.iter().chain(&node.aggregates) {
            data.insert(binding.key.clone(), read(node, binding, row)?.clone());
        }
        let slots = node
            .children
            .iter()
            .map(|child| {
                if self.plan.nodes[*child].is_collection() {
                    Slot::many()
                } else {
                    Slot::One(None)
                }
            })
            .collect();
        self.instances.push(Instance {
            node: n,
            data,
            slots,
        });
        log::trace!("New {} record for alias `{}`", node.component, node.alias);
        Ok(self.instances.len() - 1)
    }

    fn attach(&mut self, parent: Option<usize>, n: usize, instance: usize, row: &ResultRow) -> Result<(), HydrationError> {
        let node = &self.plan.nodes[n];
        let key = match &node.index_by {
            Some(output) => {
                let binding = FieldBinding {
                    key: output.clone(),
                    output: output.clone(),
                };
                Some(index_key(read(node, &binding, row)?))
            }
            None => None,
        };

        let slot = match parent {
            None => &mut self.roots,
            Some(parent) => {
                let parent_node = &self.plan.nodes[self.instances[parent].node];
                let Some(position) = parent_node.children.iter().position(|child| *child == n) else {
                    return Ok(());
                };
                &mut self.instances[parent].slots[position]
            }
        };

        match slot {
            Slot::One(current) => *current = Some(instance),
            Slot::Many { entries, keys } => match key {
                Some(key) => match keys.iter().position(|existing| *existing == key) {
                    Some(position) => {
                        log::warn!(
                            "INDEXBY key `{}` of alias `{}` is not unique; the later record replaces the earlier one",
                            key,
                            node.alias
                        );
                        entries[position] = instance;
                    }
                    None => {
                        keys.push(key);
                        entries.push(instance);
                    }
                },
                None => entries.push(instance),
            },
        }
        Ok(())
    }

    fn build_record(&mut self, instance: usize) -> Record {
        let plan = self.plan;
        let node = &plan.nodes[self.instances[instance].node];
        let mut record = Record::new(node.component.clone());
        record.data = std::mem::take(&mut self.instances[instance].data);

        let slots = std::mem::take(&mut self.instances[instance].slots);
        for (slot, child) in slots.into_iter().zip(&node.children) {
            let child_node = &plan.nodes[*child];
            let name = child_node
                .relation
                .clone()
                .unwrap_or_else(|| child_node.alias.clone());
            let related = match slot {
                Slot::One(entry) => Related::One(entry.map(|entry| Box::new(self.build_record(entry)))),
                Slot::Many { entries, keys } => Related::Many(self.build_collection(child_node, entries, keys)),
            };
            record.relations.push((name, related));
        }
        record
    }

    fn build_collection(&mut self, node: &HydrationNode, entries: Vec<usize>, keys: Vec<String>) -> Collection {
        let mut collection = if node.index_by.is_some() {
            Collection::indexed(node.component.clone())
        } else {
            Collection::new(node.component.clone())
        };
        let mut keys = keys.into_iter();
        for entry in entries {
            let record = self.build_record(entry);
            collection.push(keys.next(), record);
        }
        collection
    }

    fn root_collection(&mut self) -> Collection {
        let plan = self.plan;
        let Some(root) = plan.root() else {
            return Collection::default();
        };
        match std::mem::replace(&mut self.roots, Slot::many()) {
            Slot::Many { entries, keys } => self.build_collection(root, entries, keys),
            Slot::One(_) => Collection::new(root.component.clone()),
        }
    }
}

fn read<'r>(node: &HydrationNode, binding: &FieldBinding, row: &'r ResultRow) -> Result<&'r Value, HydrationError> {
    row.get(&binding.output).ok_or_else(|| HydrationError::Shape {
        alias: node.alias.clone(),
        column: binding.output.clone(),
    })
}

fn index_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Identity of the node's record in `row`, `None` when the row carries no
/// record for it (an outer join without a match).
fn identity(node: &HydrationNode, row: &ResultRow, row_number: usize) -> Result<Option<Vec<String>>, HydrationError> {
    if node.identifier.is_empty() {
        let mut all_null = true;
        for binding in &node.fields {
            all_null &= read(node, binding, row)?.is_null();
        }
        if all_null && node.parent.is_some() {
            return Ok(None);
        }
        return Ok(Some(vec![format!("#{}", row_number)]));
    }

    let mut values = Vec::with_capacity(node.identifier.len());
    let mut all_null = true;
    for binding in &node.identifier {
        let value = read(node, binding, row)?;
        all_null &= value.is_null();
        values.push(value.to_string());
    }
    Ok(if all_null { None } else { Some(values) })
}

fn push_graph_row(hydrator: &mut Hydrator<'_>, row: &ResultRow) -> Result<(), HydrationError> {
    let plan = hydrator.plan;
    let mut current: Vec<Option<usize>> = vec![None; plan.nodes.len()];

    for (n, node) in plan.nodes.iter().enumerate() {
        let parent = match node.parent {
            None => None,
            Some(parent) => match current[parent] {
                Some(instance) => Some(instance),
                None => continue,
            },
        };
        let Some(identity) = identity(node, row, hydrator.rows_seen)? else {
            continue;
        };
        let key = (parent, identity);
        if let Some(existing) = hydrator.identities[n].get(&key) {
            current[n] = Some(*existing);
            continue;
        }

        let instance = hydrator.create_instance(n, row)?;
        hydrator.attach(parent, n, instance, row)?;
        hydrator.identities[n].insert(key, instance);
        current[n] = Some(instance);
    }
    Ok(())
}

fn finish_records(mut hydrator: Hydrator<'_>) -> HydratedResult {
    HydratedResult::Records(hydrator.root_collection())
}

fn finish_array(mut hydrator: Hydrator<'_>) -> HydratedResult {
    HydratedResult::Array(hydrator.root_collection().to_value())
}

fn push_scalar_row(hydrator: &mut Hydrator<'_>, row: &ResultRow) -> Result<(), HydrationError> {
    let mut flat = Map::new();
    for node in &hydrator.plan.nodes {
        for binding in node.fields.iter().chain(&node.aggregates) {
            let value = read(node, binding, row)?;
            flat.insert(format!("{}_{}", node.alias, binding.key), value.clone());
        }
    }
    hydrator.scalar_rows.push(flat);
    Ok(())
}

fn finish_scalar(hydrator: Hydrator<'_>) -> HydratedResult {
    HydratedResult::Scalar(hydrator.scalar_rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::query_planner::plan_dql;
    use crate::schema_catalog::testing::fixture_catalog;
    use serde_json::json;

    fn hydration_plan(dql: &str) -> HydrationPlan {
        let catalog = fixture_catalog();
        let plan = plan_dql(&catalog, &CompilerConfig::default(), dql).unwrap();
        HydrationPlan::from_query_plan(&plan)
    }

    fn row(value: Value) -> ResultRow {
        match value {
            Value::Object(object) => object.into_iter().collect(),
            _ => panic!("row fixture must be an object"),
        }
    }

    fn hydrate_records(plan: &HydrationPlan, rows: Vec<Value>) -> Collection {
        let mut hydrator = Hydrator::new(plan, HydrationMode::Record);
        for value in rows {
            hydrator.push_row(&row(value)).unwrap();
        }
        match hydrator.finish() {
            HydratedResult::Records(collection) => collection,
            other => panic!("unexpected result {:?}", other),
        }
    }

    const USERS_WITH_PHONES: &str = "SELECT u.name, p.phonenumber FROM User u LEFT JOIN u.Phonenumber p";

    #[test]
    fn test_fanned_out_root_is_deduplicated() {
        let plan = hydration_plan(USERS_WITH_PHONES);
        for n in 1..=5 {
            let rows = (0..n)
                .map(|i| json!({"e__id": 4, "e__name": "zYne", "p__id": i, "p__phonenumber": format!("123 {}", i)}))
                .collect();
            let users = hydrate_records(&plan, rows);
            assert_eq!(users.len(), 1);
            let phones = users.get(0).and_then(|u| u.many("Phonenumber")).unwrap();
            assert_eq!(phones.len(), n as usize);
        }
    }

    #[test]
    fn test_null_child_key_contributes_no_child() {
        let plan = hydration_plan(USERS_WITH_PHONES);
        let users = hydrate_records(
            &plan,
            vec![
                json!({"e__id": 4, "e__name": "zYne", "p__id": null, "p__phonenumber": null}),
                json!({"e__id": 5, "e__name": "Arnold", "p__id": 1, "p__phonenumber": "555"}),
            ],
        );
        assert_eq!(users.len(), 2);
        assert!(users.get(0).and_then(|u| u.many("Phonenumber")).unwrap().is_empty());
        assert_eq!(users.get(1).and_then(|u| u.many("Phonenumber")).unwrap().len(), 1);
    }

    #[test]
    fn test_one_to_one_slot_defaults_to_null() {
        let plan = hydration_plan("SELECT u.name, e.address FROM User u LEFT JOIN u.Email e");
        let users = hydrate_records(
            &plan,
            vec![
                json!({"e__id": 4, "e__name": "zYne", "e2__id": null, "e2__address": null}),
                json!({"e__id": 5, "e__name": "Arnold", "e2__id": 9, "e2__address": "arnold@example.com"}),
            ],
        );
        let first = users.get(0).unwrap();
        assert_eq!(first.related("Email"), Some(&Related::One(None)));
        let email = users.get(1).and_then(|u| u.one("Email")).unwrap();
        assert_eq!(email.get("address"), Some(&json!("arnold@example.com")));
    }

    #[test]
    fn test_shared_target_attaches_under_each_parent() {
        let plan = hydration_plan("SELECT u.name, g.name FROM User u LEFT JOIN u.Group g");
        let users = hydrate_records(
            &plan,
            vec![
                json!({"e__id": 4, "e__name": "zYne", "e2__id": 1, "e2__name": "Action Actors"}),
                json!({"e__id": 5, "e__name": "Arnold", "e2__id": 1, "e2__name": "Action Actors"}),
            ],
        );
        for user in users.iter() {
            assert_eq!(user.many("Group").unwrap().len(), 1);
        }
    }

    #[test]
    fn test_index_by_collision_overwrites() {
        let plan = hydration_plan("SELECT u.name FROM User u INDEXBY u.name");
        let users = hydrate_records(
            &plan,
            vec![
                json!({"e__id": 4, "e__name": "zYne"}),
                json!({"e__id": 5, "e__name": "Arnold"}),
                json!({"e__id": 6, "e__name": "zYne"}),
            ],
        );
        assert_eq!(users.len(), 2);
        assert_eq!(users.keys().unwrap(), &["zYne".to_string(), "Arnold".to_string()]);
        assert_eq!(users.get_by_key("zYne").and_then(|u| u.get("id")), Some(&json!(6)));
    }

    #[test]
    fn test_missing_column_is_a_shape_error() {
        let plan = hydration_plan(USERS_WITH_PHONES);
        let mut hydrator = Hydrator::new(&plan, HydrationMode::Record);
        let err = hydrator
            .push_row(&row(json!({"e__id": 4, "p__id": 1, "p__phonenumber": "1"})))
            .unwrap_err();
        assert_eq!(
            err,
            HydrationError::Shape {
                alias: "u".to_string(),
                column: "e__name".to_string()
            }
        );
    }

    #[test]
    fn test_array_mode() {
        let plan = hydration_plan(USERS_WITH_PHONES);
        let mut hydrator = Hydrator::new(&plan, HydrationMode::Array);
        hydrator
            .push_row(&row(json!({"e__id": 4, "e__name": "zYne", "p__id": 1, "p__phonenumber": "123 123"})))
            .unwrap();
        match hydrator.finish() {
            HydratedResult::Array(value) => assert_eq!(
                value,
                json!([{"id": 4, "name": "zYne", "Phonenumber": [{"id": 1, "phonenumber": "123 123"}]}])
            ),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_scalar_mode_keeps_every_row() {
        let plan = hydration_plan(USERS_WITH_PHONES);
        let mut hydrator = Hydrator::new(&plan, HydrationMode::Scalar);
        for i in 0..2 {
            hydrator
                .push_row(&row(json!({"e__id": 4, "e__name": "zYne", "p__id": i, "p__phonenumber": "1"})))
                .unwrap();
        }
        match hydrator.finish() {
            HydratedResult::Scalar(rows) => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[1]["u_name"], json!("zYne"));
                assert_eq!(rows[1]["p_id"], json!(1));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_grouped_rows_without_keys_are_one_record_each() {
        let plan = hydration_plan("SELECT u.name FROM User u GROUP BY u.name");
        assert!(plan.nodes[0].identifier.is_empty());
        let users = hydrate_records(&plan, vec![json!({"e__name": "arnold"}), json!({"e__name": "zYne"})]);
        assert_eq!(users.len(), 2);
        assert_eq!(users.get(1).and_then(|u| u.get("name")), Some(&json!("zYne")));
    }

    #[test]
    fn test_aggregates_attach_to_owner() {
        let plan = hydration_plan("SELECT u.name, COUNT(p.id) total FROM User u LEFT JOIN u.Phonenumber p GROUP BY u.id");
        let users = hydrate_records(&plan, vec![json!({"e__id": 4, "e__name": "zYne", "p__0": 3})]);
        assert_eq!(users.get(0).and_then(|u| u.get("total")), Some(&json!(3)));
    }
}
