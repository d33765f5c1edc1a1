//! Round-robin connection set.
//!
//! The set keeps its members in insertion order and hands them out one after
//! another.  Any membership change resets the rotation to the first member, so
//! the cursor can never point past the end of the current set.
//!
//! # Fairness (for beginners)
//!
//! Over a *stable* set of N members, N consecutive calls to
//! [`ConnectionSet::next`] return every member exactly once.  Fairness is not
//! promised across a membership change: adding or removing a connection
//! starts a fresh rotation from the first member.
//!
//! The set is generic over the handle type so it can be tested without sockets.

use uuid::Uuid;

/// Identifier assigned to each accepted connection.
pub type ConnectionId = Uuid;

/// Members plus a rotation cursor.
#[derive(Debug, Clone)]
pub struct ConnectionSet<T> {
    members: Vec<(ConnectionId, T)>,
    cursor: usize,
}

impl<T> Default for ConnectionSet<T> {
    fn default() -> Self {
        Self {
            members: Vec::new(),
            cursor: 0,
        }
    }
}

impl<T: Clone> ConnectionSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member and restarts the rotation.
    pub fn add(&mut self, id: ConnectionId, handle: T) {
        self.members.push((id, handle));
        self.cursor = 0;
    }

    /// Removes a member and restarts the rotation.  Returns the removed handle.
    pub fn remove(&mut self, id: ConnectionId) -> Option<T> {
        let index = self.members.iter().position(|(member, _)| *member == id)?;
        let (_, handle) = self.members.remove(index);
        self.cursor = 0;
        Some(handle)
    }

    /// Returns the next member in rotation, or `None` if the set is empty.
    pub fn next(&mut self) -> Option<(ConnectionId, T)> {
        if self.members.is_empty() {
            return None;
        }
        if self.cursor >= self.members.len() {
            self.cursor = 0;
        }
        let (id, handle) = &self.members[self.cursor];
        self.cursor += 1;
        Some((*id, handle.clone()))
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.iter().any(|(member, _)| *member == id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member ids in rotation order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.members.iter().map(|(id, _)| *id).collect()
    }
}
