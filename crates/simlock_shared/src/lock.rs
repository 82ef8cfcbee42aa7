//! Lock kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of simulation lock a client can hold on an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LockKind {
    /// Only one client may drive the entity; blocks every other request.
    Exclusive = 0,
    /// Short-lived hold after an interaction ends. Never blocks anyone.
    Transient = 1,
}

impl LockKind {
    /// Returns true for [`LockKind::Exclusive`].
    #[inline]
    #[must_use]
    pub const fn is_exclusive(self) -> bool {
        matches!(self, Self::Exclusive)
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exclusive => f.write_str("EXCLUSIVE"),
            Self::Transient => f.write_str("TRANSIENT"),
        }
    }
}
