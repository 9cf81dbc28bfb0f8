//! Name tables for nodes and groups.
//!
//! Both registries live inside a [`Simulation`](crate::Simulation) behind
//! their own `RwLock`. When both are needed, the node registry is always
//! locked first.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::Arc;

use crate::error::{SimError, SimResult};
use crate::node::NodeCell;

/// Name → node table.
pub(crate) struct NodeRegistry<M> {
    nodes: HashMap<String, Arc<NodeCell<M>>>,
}

impl<M> NodeRegistry<M> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Registers a node. Leaves the table untouched on collision.
    pub(crate) fn insert(&mut self, cell: Arc<NodeCell<M>>) -> SimResult<()> {
        if self.nodes.contains_key(cell.name()) {
            return Err(SimError::DuplicateName {
                name: cell.name().to_string(),
            });
        }
        self.nodes.insert(cell.name().to_string(), cell);
        Ok(())
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Arc<NodeCell<M>>> {
        self.nodes.remove(name)
    }

    pub(crate) fn get(&self, name: &str) -> SimResult<Arc<NodeCell<M>>> {
        self.nodes
            .get(name)
            .cloned()
            .ok_or_else(|| SimError::UnknownRecipient {
                name: name.to_string(),
            })
    }

    pub(crate) fn find(&self, name: &str) -> Option<Arc<NodeCell<M>>> {
        self.nodes.get(name).cloned()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nodes.keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn cells(&self) -> impl Iterator<Item = &Arc<NodeCell<M>>> {
        self.nodes.values()
    }
}

/// A named, ordered set of node names used as a broadcast target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    name: String,
    members: Vec<String>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members in the order they were added.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }

    /// Appends a member. Fails with `DuplicateMember` if already present.
    pub fn add_member(&mut self, member: impl Into<String>) -> SimResult<()> {
        let member = member.into();
        if self.contains(&member) {
            return Err(SimError::DuplicateMember {
                group: self.name.clone(),
                member,
            });
        }
        self.members.push(member);
        Ok(())
    }
}

impl Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group[name={}, members={:?}]", self.name, self.members)
    }
}

/// Name → group table.
#[derive(Debug, Default)]
pub(crate) struct GroupRegistry {
    groups: HashMap<String, Group>,
}

impl GroupRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub(crate) fn insert(&mut self, group: Group) -> SimResult<()> {
        if self.groups.contains_key(group.name()) {
            return Err(SimError::DuplicateName {
                name: group.name().to_string(),
            });
        }
        self.groups.insert(group.name().to_string(), group);
        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> SimResult<&Group> {
        self.groups
            .get(name)
            .ok_or_else(|| SimError::UnknownRecipient {
                name: name.to_string(),
            })
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> SimResult<&mut Group> {
        self.groups
            .get_mut(name)
            .ok_or_else(|| SimError::UnknownRecipient {
                name: name.to_string(),
            })
    }
}
