//! Index manager - ordered composite-key indexes
//!
//! One index per `(table, key columns)` pair. Entries map a typed key plus
//! the owning rid to nothing; range probes walk entries in key order and
//! support prefix keys, so a probe on the leading column of a composite
//! index sees every entry whose key starts with the probed values.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::sql::Value;
use crate::storage::{Rid, StorageError, StorageResult};

/// One component of an index key, with a total order
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPart {
    Int(i32),
    Float(f32),
    Str(String),
}

impl Eq for KeyPart {}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Int(a), KeyPart::Int(b)) => a.cmp(b),
            (KeyPart::Float(a), KeyPart::Float(b)) => a.total_cmp(b),
            (KeyPart::Int(a), KeyPart::Float(b)) => (*a as f32).total_cmp(b),
            (KeyPart::Float(a), KeyPart::Int(b)) => a.total_cmp(&(*b as f32)),
            (KeyPart::Str(a), KeyPart::Str(b)) => a.cmp(b),
            (KeyPart::Str(_), _) => Ordering::Greater,
            (_, KeyPart::Str(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&Value> for KeyPart {
    fn from(value: &Value) -> Self {
        match value {
            Value::Int(i) => KeyPart::Int(*i),
            Value::Float(x) => KeyPart::Float(*x),
            // Char values index with trailing pad spaces stripped so that
            // key order matches the comparison semantics
            Value::Str(s) => KeyPart::Str(s.trim_end_matches(' ').to_string()),
            Value::Bool(b) => KeyPart::Int(*b as i32),
        }
    }
}

/// A composite index key; may be a prefix of the full key in probes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexKey(pub Vec<KeyPart>);

impl IndexKey {
    pub fn from_values(values: &[Value]) -> Self {
        IndexKey(values.iter().map(KeyPart::from).collect())
    }

    /// Compare an entry key against a probe key on the probe's length only
    fn prefix_cmp(&self, probe: &IndexKey) -> Ordering {
        for (a, b) in self.0.iter().zip(probe.0.iter()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        if self.0.len() >= probe.0.len() {
            Ordering::Equal
        } else {
            Ordering::Less
        }
    }
}

/// One ordered index on a table
#[derive(Debug)]
pub struct Index {
    /// Ordered key columns
    pub columns: Vec<String>,
    entries: RwLock<BTreeMap<(IndexKey, Rid), ()>>,
}

impl Index {
    fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add an entry
    pub fn insert(&self, key: IndexKey, rid: Rid) {
        self.entries.write().insert((key, rid), ());
    }

    /// Remove an entry; missing entries are ignored
    pub fn delete(&self, key: &IndexKey, rid: Rid) {
        self.entries.write().remove(&(key.clone(), rid));
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Probe for every rid whose key falls inside `[lo, hi]` under the
    /// given inclusivity, in key order. Prefix keys match all entries that
    /// start with the probed components.
    pub fn range_probe(&self, lo: Bound<IndexKey>, hi: Bound<IndexKey>) -> Vec<Rid> {
        let entries = self.entries.read();
        let start: Bound<(IndexKey, Rid)> = match &lo {
            Bound::Included(k) | Bound::Excluded(k) => {
                Bound::Included((k.clone(), Rid::MIN))
            }
            Bound::Unbounded => Bound::Unbounded,
        };

        let mut rids = Vec::new();
        for ((key, rid), _) in entries.range((start, Bound::Unbounded)) {
            if let Bound::Excluded(k) = &lo {
                if key.prefix_cmp(k) == Ordering::Equal {
                    continue;
                }
            }
            match &hi {
                Bound::Included(k) => {
                    if key.prefix_cmp(k) == Ordering::Greater {
                        break;
                    }
                }
                Bound::Excluded(k) => {
                    if key.prefix_cmp(k) != Ordering::Less {
                        break;
                    }
                }
                Bound::Unbounded => {}
            }
            rids.push(*rid);
        }
        rids
    }
}

/// Registry of the indexes defined on each table
#[derive(Debug, Default)]
pub struct IndexManager {
    indexes: RwLock<HashMap<String, Vec<Arc<Index>>>>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty index on `table(columns)`
    pub fn create(&self, table: &str, columns: Vec<String>) -> StorageResult<Arc<Index>> {
        let mut map = self.indexes.write();
        let list = map.entry(table.to_string()).or_default();
        if list.iter().any(|ix| ix.columns == columns) {
            return Err(StorageError::IndexExists {
                table: table.to_string(),
                columns,
            });
        }
        let index = Arc::new(Index::new(columns));
        list.push(index.clone());
        Ok(index)
    }

    /// Drop the index on `table(columns)`
    pub fn drop(&self, table: &str, columns: &[String]) -> StorageResult<()> {
        let mut map = self.indexes.write();
        let list = map
            .get_mut(table)
            .ok_or_else(|| StorageError::IndexNotFound {
                table: table.to_string(),
                columns: columns.to_vec(),
            })?;
        let pos = list
            .iter()
            .position(|ix| ix.columns == columns)
            .ok_or_else(|| StorageError::IndexNotFound {
                table: table.to_string(),
                columns: columns.to_vec(),
            })?;
        list.remove(pos);
        Ok(())
    }

    /// Look up the index on `table(columns)`
    pub fn get(&self, table: &str, columns: &[String]) -> Option<Arc<Index>> {
        self.indexes
            .read()
            .get(table)
            .and_then(|list| list.iter().find(|ix| ix.columns == columns).cloned())
    }

    /// All indexes defined on a table
    pub fn indexes_on(&self, table: &str) -> Vec<Arc<Index>> {
        self.indexes.read().get(table).cloned().unwrap_or_default()
    }

    /// Remove every index on a table (DROP TABLE)
    pub fn drop_all(&self, table: &str) {
        self.indexes.write().remove(table);
    }
}
