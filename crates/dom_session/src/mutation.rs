//! Bounded, lossy queue of document mutations reported by the guest.

use log::{trace, warn};
use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{Receiver, Sender, channel};

/// Number of undrained mutations kept before new ones are dropped.
pub const MUTATION_CAPACITY: usize = 100;

/// Kind codes used by the DOM shim's mutation handler.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MutationKind {
    ValueChange = 1,
    AttrSet = 2,
    AttrRemove = 3,
    NodeRemove = 4,
    NodeMove = 5,
    NodeInsert = 6,
}

impl TryFrom<i64> for MutationKind {
    type Error = i64;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => Self::ValueChange,
            2 => Self::AttrSet,
            3 => Self::AttrRemove,
            4 => Self::NodeRemove,
            5 => Self::NodeMove,
            6 => Self::NodeInsert,
            other => return Err(other),
        })
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ValueChange => "Value",
            Self::AttrSet => "Attr",
            Self::AttrRemove => "RmAttr",
            Self::NodeRemove => "Rm",
            Self::NodeMove => "Mv",
            Self::NodeInsert => "Insert",
        })
    }
}

/// One reported change to the synthetic document.
#[derive(Clone, Debug)]
pub struct Mutation {
    pub timestamp: SystemTime,
    pub kind: MutationKind,
    /// Target path with the first literal `undefined` removed.
    pub path: String,
    pub tag: String,
    pub attributes: HashMap<String, String>,
}

impl Mutation {
    /// Whether the mutated node is a script element.
    #[inline]
    pub fn is_script(&self) -> bool {
        self.tag.eq_ignore_ascii_case("script")
    }
}

/// Producer half of the mutation queue, handed to the host surface.
///
/// Reporting never waits: once the queue holds [`MUTATION_CAPACITY`]
/// entries further mutations are dropped until the tracker drains it.
#[derive(Clone)]
pub struct MutationCollector {
    sender: Sender<Mutation>,
}

impl MutationCollector {
    /// Create a collector and the receiving end drained by the change tracker.
    pub fn new() -> (Self, Receiver<Mutation>) {
        let (sender, receiver) = channel(MUTATION_CAPACITY);
        (Self { sender }, receiver)
    }

    /// Stamp and enqueue a mutation. Returns whether it was kept.
    pub fn report(
        &self,
        kind: MutationKind,
        target: &str,
        tag: &str,
        attributes: HashMap<String, String>,
    ) -> bool {
        let mutation = Mutation {
            timestamp: SystemTime::now(),
            kind,
            path: target.replacen("undefined", "", 1),
            tag: tag.to_owned(),
            attributes,
        };
        trace!("mutation {} {} <{}>", mutation.kind, mutation.path, mutation.tag);
        match self.sender.try_send(mutation) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("dom changes backlog full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                trace!("mutation dropped: tracker gone");
                false
            }
        }
    }
}
