//! Deduplicated accumulation of discovered members.
//!
//! The enumeration strategies overlap heavily; [`DedupStore`] unions their
//! results by member identity while preserving first-discovery order. The
//! first sighting wins: a later sighting may fill optional fields that are
//! still empty, but never overwrites a value, and provenance stays with the
//! strategy that saw the identity first.

use std::collections::HashMap;

use crate::models::Member;

/// Insertion-idempotent, order-preserving member set.
#[derive(Debug, Default)]
pub struct DedupStore {
    members: Vec<Member>,
    index: HashMap<i64, usize>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a sighting. Returns true when the identity is new.
    ///
    /// For an already-known identity, only still-empty optional fields are
    /// filled from the new sighting; everything else, including
    /// `discovered_via`, is left untouched.
    pub fn insert(&mut self, member: Member) -> bool {
        match self.index.get(&member.id) {
            Some(&pos) => {
                fill_missing(&mut self.members[pos], member);
                false
            }
            None => {
                self.index.insert(member.id, self.members.len());
                self.members.push(member);
                true
            }
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in first-discovery order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Consumes the store, yielding members in first-discovery order.
    pub fn into_members(self) -> Vec<Member> {
        self.members
    }
}

fn fill_missing(existing: &mut Member, later: Member) {
    if existing.username.is_none() {
        existing.username = later.username;
    }
    if existing.first_name.is_none() {
        existing.first_name = later.first_name;
    }
    if existing.last_name.is_none() {
        existing.last_name = later.last_name;
    }
    if existing.phone.is_none() {
        existing.phone = later.phone;
    }
    if existing.lang_code.is_none() {
        existing.lang_code = later.lang_code;
    }
    if existing.bio.is_none() {
        existing.bio = later.bio;
    }
    if existing.joined_at.is_none() {
        existing.joined_at = later.joined_at;
    }
}
