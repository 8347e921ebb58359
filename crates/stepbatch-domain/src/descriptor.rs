//! Request descriptors and the scope tags they carry.
//!
//! A [`RequestDescriptor`] is created once per call site and never mutated.
//! Equality and hashing only look at `(data_source, identity)`; the sequence
//! group and the idempotent/mutation flags steer scheduling but never make
//! two requests "different" for deduplication.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Cache and invalidation scope a request belongs to.
///
/// All cache entries under one data source are cleared together when a
/// mutation in that data source succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataSource(Arc<str>);

impl DataSource {
    /// Creates a data source tag.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Returns the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DataSource {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for DataSource {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Serialization domain of a request.
///
/// Requests sharing a sequence group are prepared one at a time, in
/// submission order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceGroup(Arc<str>);

impl SequenceGroup {
    /// Creates a sequence group tag.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Returns the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SequenceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SequenceGroup {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for SequenceGroup {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Immutable metadata attached to one requested unit of work.
#[derive(Debug, Clone)]
pub struct RequestDescriptor<K> {
    identity: K,
    data_source: DataSource,
    sequence_group: SequenceGroup,
    idempotent: bool,
    mutation: bool,
}

impl<K> RequestDescriptor<K> {
    /// Creates a descriptor that is neither idempotent nor a mutation.
    pub fn new(
        identity: K,
        data_source: impl Into<DataSource>,
        sequence_group: impl Into<SequenceGroup>,
    ) -> Self {
        Self {
            identity,
            data_source: data_source.into(),
            sequence_group: sequence_group.into(),
            idempotent: false,
            mutation: false,
        }
    }

    /// Creates an idempotent, non-mutating read. Its result may be cached.
    pub fn read(
        identity: K,
        data_source: impl Into<DataSource>,
        sequence_group: impl Into<SequenceGroup>,
    ) -> Self {
        Self::new(identity, data_source, sequence_group).with_idempotent(true)
    }

    /// Creates a mutation. Its success invalidates the data source.
    pub fn mutation(
        identity: K,
        data_source: impl Into<DataSource>,
        sequence_group: impl Into<SequenceGroup>,
    ) -> Self {
        Self::new(identity, data_source, sequence_group).with_mutation(true)
    }

    /// Sets the idempotent flag.
    pub fn with_idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    /// Sets the mutation flag.
    pub fn with_mutation(mut self, mutation: bool) -> Self {
        self.mutation = mutation;
        self
    }

    pub fn identity(&self) -> &K {
        &self.identity
    }

    pub fn data_source(&self) -> &DataSource {
        &self.data_source
    }

    pub fn sequence_group(&self) -> &SequenceGroup {
        &self.sequence_group
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }

    pub fn is_mutation(&self) -> bool {
        self.mutation
    }

    /// Whether a completed result of this request may live in the cache.
    ///
    /// Mutations always bypass the read cache, even when flagged idempotent.
    pub fn is_cacheable(&self) -> bool {
        self.idempotent && !self.mutation
    }
}

impl<K: PartialEq> PartialEq for RequestDescriptor<K> {
    fn eq(&self, other: &Self) -> bool {
        self.data_source == other.data_source && self.identity == other.identity
    }
}

impl<K: Eq> Eq for RequestDescriptor<K> {}

impl<K: Hash> Hash for RequestDescriptor<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data_source.hash(state);
        self.identity.hash(state);
    }
}
