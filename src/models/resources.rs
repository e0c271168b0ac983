//! The resource algebra: an extensible, open bag of named scalar resources
//!
//! The teacher's `Resources` struct (`thorium::models::images::Resources`) is a closed record of
//! fixed fields (`cpu`, `memory`, `ephemeral_storage`, `worker_slots`, `nvidia_gpu`, `amd_gpu`).
//! That shape can't grow a new resource kind (an accelerator, a custom quota) without a schema
//! change, so here the same `enough`/`consume`/`some`-style method vocabulary is kept but backed
//! by an open map instead, per the resource-vector-extensibility design note.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The tolerance used when comparing resource quantities for equality
const EPSILON: f64 = 1e-9;

/// A named, extensible bag of non-negative scalar resources
///
/// Kinds absent from the map are treated as zero everywhere in this algebra. All quantities are
/// non-negative; [`ResourceVector::subtract`] saturates at zero rather than going negative.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ResourceVector(BTreeMap<String, f64>);

impl ResourceVector {
    /// Creates an empty resource vector
    pub fn new() -> Self {
        ResourceVector(BTreeMap::new())
    }

    /// Creates a resource vector from a list of `(kind, value)` pairs
    ///
    /// # Arguments
    ///
    /// * `kinds` - The kind/value pairs to seed the vector with
    pub fn from_pairs<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (kind, value) in kinds {
            map.insert(kind.into(), value.max(0.0));
        }
        ResourceVector(map)
    }

    /// Returns the value stored for `kind`, or `0.0` if it's absent
    ///
    /// # Arguments
    ///
    /// * `kind` - The resource kind to look up
    pub fn get(&self, kind: &str) -> f64 {
        self.0.get(kind).copied().unwrap_or(0.0)
    }

    /// Sets the value for `kind`, clamping negatives to zero
    ///
    /// # Arguments
    ///
    /// * `kind` - The resource kind to set
    /// * `value` - The value to store
    pub fn set<T: Into<String>>(&mut self, kind: T, value: f64) {
        self.0.insert(kind.into(), value.max(0.0));
    }

    /// Returns true if this vector has no kinds with a value above zero
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| v.abs() < EPSILON)
    }

    /// Returns an iterator over every kind present in either this vector or `other`
    fn all_kinds<'a>(&'a self, other: &'a ResourceVector) -> impl Iterator<Item = &'a str> {
        let mut kinds: Vec<&str> = self.0.keys().map(String::as_str).collect();
        for kind in other.0.keys() {
            if !self.0.contains_key(kind) {
                kinds.push(kind.as_str());
            }
        }
        kinds.into_iter()
    }

    /// Adds `other` into this vector, per-kind, returning a new vector
    ///
    /// # Arguments
    ///
    /// * `other` - The vector to add
    #[must_use]
    pub fn add(&self, other: &ResourceVector) -> ResourceVector {
        let mut out = self.clone();
        for kind in self.all_kinds(other) {
            let sum = self.get(kind) + other.get(kind);
            out.set(kind, sum);
        }
        out
    }

    /// Subtracts `other` from this vector, per-kind, saturating at zero
    ///
    /// Kinds present only on `other` are ignored: subtracting an unknown kind is a no-op, not an
    /// error, and this vector's own kind set is preserved.
    ///
    /// # Arguments
    ///
    /// * `other` - The vector to subtract
    #[must_use]
    pub fn subtract(&self, other: &ResourceVector) -> ResourceVector {
        let mut out = self.clone();
        for (kind, value) in &self.0 {
            let diff = value - other.get(kind);
            out.set(kind.clone(), diff.max(0.0));
        }
        out
    }

    /// Returns true if every kind in `other` is dominated by this vector (self ≥ other)
    ///
    /// Kinds absent from either side are treated as zero.
    ///
    /// # Arguments
    ///
    /// * `other` - The vector that must be dominated
    pub fn dominates(&self, other: &ResourceVector) -> bool {
        self.all_kinds(other)
            .all(|kind| self.get(kind) + EPSILON >= other.get(kind))
    }

    /// Returns true if this vector equals `other`, within [`EPSILON`], across all kinds
    ///
    /// # Arguments
    ///
    /// * `other` - The vector to compare against
    pub fn is_equal(&self, other: &ResourceVector) -> bool {
        self.all_kinds(other)
            .all(|kind| (self.get(kind) - other.get(kind)).abs() < EPSILON)
    }

    /// Subtracts `other` from this vector, returning `None` if any resulting component would be
    /// negative rather than saturating at zero
    ///
    /// Used by the scheduling node's scoring operations, where an underflow means "doesn't fit"
    /// rather than "fits with zero to spare".
    ///
    /// # Arguments
    ///
    /// * `other` - The vector to subtract
    pub fn checked_subtract(&self, other: &ResourceVector) -> Option<ResourceVector> {
        if self.dominates(other) {
            Some(self.subtract(other))
        } else {
            None
        }
    }

    /// Removes `kind` entirely from this vector, returning a new vector
    ///
    /// # Arguments
    ///
    /// * `kind` - The resource kind to drop
    #[must_use]
    pub fn remove_kind(&self, kind: &str) -> ResourceVector {
        let mut out = self.clone();
        out.0.remove(kind);
        out
    }

    /// Projects this vector to a `{kind: value}` JSON object
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.0).unwrap_or(Value::Null)
    }
}
