//! Property merge semantics shared by deduplication and consolidation.
//!
//! Merging never loses information silently: empty values never overwrite,
//! list values are unioned, and disagreeing non-empty values are resolved by
//! a [`ConflictPolicy`] and reported as a [`MergeConflict`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::TesseraError;
use crate::graph::{EdgeKey, Properties, SourceRef};
use crate::identity::normalize;

/// How disagreeing non-empty property values are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Empty values are filled by later sources; among non-empty values the
    /// earliest source wins.
    #[default]
    PreferNonEmpty,
    /// The earliest source wins, even when its value is empty.
    FirstWins,
    /// The latest non-empty value wins.
    LastWins,
    /// Disagreeing values are kept together as a list.
    KeepBoth,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::PreferNonEmpty => "prefer_non_empty",
            ConflictPolicy::FirstWins => "first_wins",
            ConflictPolicy::LastWins => "last_wins",
            ConflictPolicy::KeepBoth => "keep_both",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "prefer_non_empty" => Ok(ConflictPolicy::PreferNonEmpty),
            "first_wins" => Ok(ConflictPolicy::FirstWins),
            "last_wins" => Ok(ConflictPolicy::LastWins),
            "keep_both" => Ok(ConflictPolicy::KeepBoth),
            other => Err(TesseraError::Configuration(format!(
                "unknown conflict policy '{}'",
                other
            ))),
        }
    }
}

/// Resolution applied to a recorded conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resolution {
    FirstWins,
    LastWins,
    KeptBothAsList,
}

/// The node or edge a conflict was found on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSubject {
    Node(String),
    Edge(EdgeKey),
}

impl fmt::Display for ConflictSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictSubject::Node(id) => f.write_str(id),
            ConflictSubject::Edge(key) => write!(f, "{}", key),
        }
    }
}

/// A property value disagreement, with the sources that disagreed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConflict {
    pub subject: ConflictSubject,
    pub field: String,
    /// Disagreeing values in discovery order.
    pub values: Vec<(SourceRef, Value)>,
    pub resolution: Resolution,
}

impl MergeConflict {
    /// Id of the node the conflict is on; for edges, the edge's source node.
    pub fn node_id(&self) -> &str {
        match &self.subject {
            ConflictSubject::Node(id) => id,
            ConflictSubject::Edge(key) => &key.source_id,
        }
    }

    pub fn is_edge_conflict(&self) -> bool {
        matches!(self.subject, ConflictSubject::Edge(_))
    }

    /// Sources that took part in the disagreement.
    pub fn sources(&self) -> BTreeSet<&SourceRef> {
        self.values.iter().map(|(s, _)| s).collect()
    }
}

/// Ordered conflict report; repeated disagreements on the same field are
/// folded into one entry.
#[derive(Debug, Clone, Default)]
pub struct ConflictLog {
    conflicts: Vec<MergeConflict>,
    index: HashMap<(ConflictSubject, String), usize>,
}

impl ConflictLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, conflict: MergeConflict) {
        let key = (conflict.subject.clone(), conflict.field.clone());
        match self.index.get(&key) {
            Some(&i) => {
                let entry = &mut self.conflicts[i];
                for (source, value) in conflict.values {
                    if !entry.values.iter().any(|(_, v)| same_value(v, &value)) {
                        entry.values.push((source, value));
                    }
                }
                debug!(subject = %entry.subject, field = %entry.field, "Extended merge conflict");
            }
            None => {
                warn!(
                    subject = %conflict.subject,
                    field = %conflict.field,
                    resolution = ?conflict.resolution,
                    "Merge conflict"
                );
                self.index.insert(key, self.conflicts.len());
                self.conflicts.push(conflict);
            }
        }
    }

    pub fn extend(&mut self, conflicts: impl IntoIterator<Item = MergeConflict>) {
        for conflict in conflicts {
            self.record(conflict);
        }
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MergeConflict> {
        self.conflicts.iter()
    }

    pub fn into_vec(self) -> Vec<MergeConflict> {
        self.conflicts
    }
}

/// Anything carrying properties with per-property provenance.
pub trait Provenanced {
    fn properties(&self) -> &Properties;
    fn properties_mut(&mut self) -> &mut Properties;
    fn property_sources_mut(&mut self) -> &mut BTreeMap<String, SourceRef>;
    /// Source of one property, falling back to the record's first source.
    fn property_source(&self, field: &str) -> SourceRef;
    fn source_refs_mut(&mut self) -> &mut BTreeSet<SourceRef>;
    fn source_refs(&self) -> &BTreeSet<SourceRef>;
}

/// Whether a value carries no information.
pub fn is_empty_value(value: &Value) -> bool {
    normalize(value).is_none()
}

/// Value equality after normalization, so `3360` matches `3360.0`.
pub fn same_value(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| same_value(l, r))
        }
        (Value::Array(_), _) | (_, Value::Array(_)) => false,
        _ => normalize(a) == normalize(b),
    }
}

/// Merge `incoming` into `target`, returning the disagreements found.
///
/// Properties are visited in name order, so the result is deterministic.
/// Provenance sets are unioned.
pub fn merge_into<T: Provenanced>(
    target: &mut T,
    incoming: &T,
    policy: ConflictPolicy,
    subject: &ConflictSubject,
) -> Vec<MergeConflict> {
    let mut conflicts = Vec::new();

    for (field, value) in incoming.properties() {
        if is_empty_value(value) {
            continue;
        }
        let source = incoming.property_source(field);

        let existing = match target.properties().get(field) {
            Some(existing) => existing.clone(),
            None => {
                assign(target, field, value.clone(), source);
                continue;
            }
        };
        if same_value(&existing, value) {
            continue;
        }
        if is_empty_value(&existing) && policy != ConflictPolicy::FirstWins {
            assign(target, field, value.clone(), source);
            continue;
        }

        match (&existing, value) {
            (Value::Array(list), Value::Array(items)) => {
                let mut merged = list.clone();
                union_into(&mut merged, items.iter().cloned());
                target.properties_mut().insert(field.clone(), Value::Array(merged));
                continue;
            }
            (Value::Array(list), scalar) if list.iter().any(|v| same_value(v, scalar)) => continue,
            _ => {}
        }

        let existing_source = target.property_source(field);
        let resolution = match policy {
            ConflictPolicy::PreferNonEmpty | ConflictPolicy::FirstWins => Resolution::FirstWins,
            ConflictPolicy::LastWins => {
                assign(target, field, value.clone(), source.clone());
                Resolution::LastWins
            }
            ConflictPolicy::KeepBoth => {
                let mut merged = into_list(existing.clone());
                union_into(&mut merged, into_list(value.clone()));
                target.properties_mut().insert(field.clone(), Value::Array(merged));
                Resolution::KeptBothAsList
            }
        };

        let mut values: Vec<(SourceRef, Value)> = into_list(existing)
            .into_iter()
            .map(|v| (existing_source.clone(), v))
            .collect();
        values.push((source, value.clone()));

        debug!(subject = %subject, field = %field, "Conflicting property values");
        conflicts.push(MergeConflict {
            subject: subject.clone(),
            field: field.clone(),
            values,
            resolution,
        });
    }

    let refs: Vec<SourceRef> = incoming.source_refs().iter().cloned().collect();
    target.source_refs_mut().extend(refs);

    conflicts
}

fn assign<T: Provenanced>(target: &mut T, field: &str, value: Value, source: SourceRef) {
    target.properties_mut().insert(field.to_string(), value);
    target.property_sources_mut().insert(field.to_string(), source);
}

fn into_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

fn union_into(list: &mut Vec<Value>, items: impl IntoIterator<Item = Value>) {
    for item in items {
        if is_empty_value(&item) {
            continue;
        }
        if !list.iter().any(|v| same_value(v, &item)) {
            list.push(item);
        }
    }
}
