//! Hydrated component records.

use serde::Serialize;
use serde_json::{Map, Value};

/// One materialized row of a component, with its related records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub component: String,
    pub data: Map<String, Value>,
    /// Related records keyed by relation name, in join order.
    pub relations: Vec<(String, Related)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Related {
    One(Option<Box<Record>>),
    Many(Collection),
}

impl Record {
    pub fn new(component: impl Into<String>) -> Self {
        Record {
            component: component.into(),
            data: Map::new(),
            relations: Vec::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn related(&self, relation: &str) -> Option<&Related> {
        self.relations
            .iter()
            .find(|(name, _)| name == relation)
            .map(|(_, related)| related)
    }

    /// The record of a to-one relation, `None` when unset or not joined.
    pub fn one(&self, relation: &str) -> Option<&Record> {
        match self.related(relation) {
            Some(Related::One(Some(record))) => Some(record),
            _ => None,
        }
    }

    pub fn many(&self, relation: &str) -> Option<&Collection> {
        match self.related(relation) {
            Some(Related::Many(collection)) => Some(collection),
            _ => None,
        }
    }

    /// Plain associative form: fields, then relations as nested objects,
    /// arrays or `null`.
    pub fn to_value(&self) -> Value {
        let mut object = self.data.clone();
        for (name, related) in &self.relations {
            let value = match related {
                Related::One(Some(record)) => record.to_value(),
                Related::One(None) => Value::Null,
                Related::Many(collection) => collection.to_value(),
            };
            object.insert(name.clone(), value);
        }
        Value::Object(object)
    }
}

/// Ordered records of one component, optionally keyed by an INDEXBY column.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Collection {
    pub component: String,
    records: Vec<Record>,
    /// Key of each record when the collection is indexed.
    keys: Option<Vec<String>>,
}

impl Collection {
    pub fn new(component: impl Into<String>) -> Self {
        Collection {
            component: component.into(),
            records: Vec::new(),
            keys: None,
        }
    }

    pub fn indexed(component: impl Into<String>) -> Self {
        Collection {
            component: component.into(),
            records: Vec::new(),
            keys: Some(Vec::new()),
        }
    }

    pub(crate) fn push(&mut self, key: Option<String>, record: Record) {
        if let (Some(keys), Some(key)) = (self.keys.as_mut(), key) {
            keys.push(key);
        }
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_indexed(&self) -> bool {
        self.keys.is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn get(&self, position: usize) -> Option<&Record> {
        self.records.get(position)
    }

    pub fn get_by_key(&self, key: &str) -> Option<&Record> {
        let keys = self.keys.as_ref()?;
        keys.iter()
            .position(|k| k == key)
            .and_then(|position| self.records.get(position))
    }

    pub fn keys(&self) -> Option<&[String]> {
        self.keys.as_deref()
    }

    /// An array, or an object keyed by the INDEXBY column when indexed.
    pub fn to_value(&self) -> Value {
        match &self.keys {
            Some(keys) => Value::Object(
                keys.iter()
                    .cloned()
                    .zip(self.records.iter().map(Record::to_value))
                    .collect(),
            ),
            None => Value::Array(self.records.iter().map(Record::to_value).collect()),
        }
    }
}

impl IntoIterator for Collection {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
