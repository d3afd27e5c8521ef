//! Ordered, deduplicated relationship collection.

use std::collections::HashSet;

use crate::models::{Relationship, RelationshipKey};

/// Relationships in first-seen order, unique by id triple.
///
/// A relationship whose triple is already present is discarded, even if its
/// value fields differ from the stored one.
#[derive(Debug, Default)]
pub struct RelationshipSet {
    seen: HashSet<RelationshipKey>,
    items: Vec<Relationship>,
}

impl RelationshipSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a relationship. Returns `false` if its triple was already present.
    pub fn insert(&mut self, relationship: Relationship) -> bool {
        if !self.seen.insert(relationship.key()) {
            return false;
        }
        self.items.push(relationship);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn into_vec(self) -> Vec<Relationship> {
        self.items
    }
}

impl Extend<Relationship> for RelationshipSet {
    fn extend<T: IntoIterator<Item = Relationship>>(&mut self, iter: T) {
        for relationship in iter {
            self.insert(relationship);
        }
    }
}
