use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToMany,
}

impl RelationKind {
    /// True when one source row may match several target rows.
    pub fn is_to_many(&self) -> bool {
        matches!(self, RelationKind::OneToMany | RelationKind::ManyToMany)
    }
}

fn default_column_type() -> String {
    "string".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Physical column name.
    pub name: String,
    /// Name the column is exposed under in hydrated records; defaults to `name`.
    #[serde(default)]
    pub field: Option<String>,
    #[serde(rename = "type", default = "default_column_type")]
    pub column_type: String,
    #[serde(default)]
    pub primary: bool,
}

impl ColumnDef {
    pub fn field_name(&self) -> &str {
        self.field.as_deref().unwrap_or(&self.name)
    }
}

/// Single-table inheritance: every row of the component carries `column = value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discriminator {
    pub column: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    pub target: String,
    /// Column on the owning side. For many-to-many, the bridge column that
    /// points back at the owner.
    pub local: String,
    /// Column on the target side. For many-to-many, the bridge column that
    /// points at the target.
    pub foreign: String,
    /// Association component of a many-to-many relation.
    #[serde(default)]
    pub bridge: Option<String>,
    #[serde(default)]
    pub order_by: Option<String>,
    /// Ordering applied on the bridge of a many-to-many relation.
    #[serde(default)]
    pub ref_order_by: Option<String>,
    #[serde(default)]
    pub cascade_delete: bool,
    /// Self-referential relations are symmetric unless marked directed.
    #[serde(default)]
    pub directed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentMetadata {
    pub name: String,
    #[serde(rename = "table")]
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub inheritance: Option<Discriminator>,
    /// Default ordering, in DQL with bare column names.
    #[serde(default)]
    pub order_by: Option<String>,
}

impl ComponentMetadata {
    pub fn primary_keys(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|column| column.primary)
    }

    pub fn primary_key_names(&self) -> Vec<String> {
        self.primary_keys().map(|column| column.name.clone()).collect()
    }

    /// First primary key column, used where only a single identifier fits.
    pub fn identifier(&self) -> Option<&ColumnDef> {
        self.primary_keys().next()
    }

    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_keys().any(|c| c.name == column)
    }

    /// Looks a column up by field name or physical name, falling back to a
    /// case-insensitive match.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.field_name() == name || c.name == name)
            .or_else(|| {
                self.columns.iter().find(|c| {
                    c.field_name().eq_ignore_ascii_case(name) || c.name.eq_ignore_ascii_case(name)
                })
            })
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn is_self_referential(&self, relation: &Relation) -> bool {
        relation.target == self.name
    }
}
