//! Static named broadcast groups.
//!
//! Groups are fixed at construction (loaded from configuration), so the
//! recipients of a logged group message never change and replay stays
//! deterministic.

use std::collections::{BTreeSet, HashMap};

use crate::participant::{GroupName, ParticipantId};

#[derive(Debug, Default, Clone)]
pub struct GroupDirectory {
    groups: HashMap<GroupName, BTreeSet<ParticipantId>>,
}

impl GroupDirectory {
    pub fn new() -> Self {
        GroupDirectory::default()
    }

    /// Builder-style insert; replaces any existing group of the same name.
    pub fn with_group(mut self, name: GroupName, members: impl IntoIterator<Item = ParticipantId>) -> Self {
        self.insert(name, members);
        self
    }

    pub fn insert(&mut self, name: GroupName, members: impl IntoIterator<Item = ParticipantId>) {
        self.groups.insert(name, members.into_iter().collect());
    }

    pub fn contains(&self, name: &GroupName) -> bool {
        self.groups.contains_key(name)
    }

    pub fn members(&self, name: &GroupName) -> Option<&BTreeSet<ParticipantId>> {
        self.groups.get(name)
    }

    pub fn is_member(&self, name: &GroupName, participant: &ParticipantId) -> bool {
        self.groups
            .get(name)
            .map_or(false, |members| members.contains(participant))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
