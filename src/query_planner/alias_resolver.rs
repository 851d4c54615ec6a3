//! SQL alias allocation.
//!
//! Every table occurrence in a compiled statement gets a short alias seeded by
//! the first letter of its table name: `entity` becomes `e`, the next `entity`
//! (or `email`) becomes `e2`, and so on. User-facing DQL aliases map onto these
//! internal ids through a stack of scopes, one per (sub)query.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Handle for one table occurrence, stable for the lifetime of a compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AliasId(pub usize);

/// Rendered SQL alias for every [`AliasId`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasNames(Vec<String>);

impl AliasNames {
    pub fn get(&self, id: AliasId) -> &str {
        self.0.get(id.0).map(String::as_str).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AliasResolver {
    names: Vec<String>,
    tables: Vec<String>,
    seeds: HashMap<char, usize>,
    scopes: Vec<HashMap<String, AliasId>>,
}

impl Default for AliasResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasResolver {
    pub fn new() -> Self {
        AliasResolver {
            names: Vec::new(),
            tables: Vec::new(),
            seeds: HashMap::new(),
            scopes: vec![HashMap::new()],
        }
    }

    /// Allocates a fresh alias for a table occurrence that has no user alias.
    pub fn assign(&mut self, table_name: &str) -> AliasId {
        let name = self.generate(table_name);
        self.names.push(name);
        self.tables.push(table_name.to_string());
        AliasId(self.names.len() - 1)
    }

    /// Binds `user_alias` in the current scope, reusing the existing id when the
    /// alias is already bound there.
    pub fn bind(&mut self, user_alias: &str, table_name: &str) -> AliasId {
        if let Some(id) = self.lookup_local(user_alias) {
            return id;
        }
        let id = self.assign(table_name);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(user_alias.to_string(), id);
        }
        id
    }

    /// Resolves a user alias, innermost scope first.
    pub fn lookup(&self, user_alias: &str) -> Option<AliasId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(user_alias).copied())
    }

    pub fn lookup_local(&self, user_alias: &str) -> Option<AliasId> {
        self.scopes
            .last()
            .and_then(|scope| scope.get(user_alias).copied())
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn name(&self, id: AliasId) -> &str {
        self.names.get(id.0).map(String::as_str).unwrap_or_default()
    }

    pub fn names(&self) -> AliasNames {
        AliasNames(self.names.clone())
    }

    /// Copy of the current names where each of `ids` is replaced by a fresh
    /// alias from the same seed, for statements that repeat the same joins
    /// inside a subquery.
    pub fn shadow(&mut self, ids: &[AliasId]) -> AliasNames {
        let mut names = self.names.clone();
        for id in ids {
            let Some(table) = self.tables.get(id.0).cloned() else {
                continue;
            };
            let fresh = self.generate(&table);
            names[id.0] = fresh;
        }
        AliasNames(names)
    }

    fn generate(&mut self, table_name: &str) -> String {
        let prefix = table_name
            .chars()
            .find(|c| c.is_ascii_alphabetic())
            .map(|c| c.to_ascii_lowercase())
            .unwrap_or('t');
        let seed = self.seeds.entry(prefix).or_insert(0);
        *seed += 1;
        if *seed == 1 {
            prefix.to_string()
        } else {
            format!("{}{}", prefix, seed)
        }
    }
}
