//! Arena-index newtypes.
//!
//! The relationship graph and every graph derived from it (buffer graph,
//! termination graph, scheduling graphs) are arenas keyed by these
//! indices rather than owning pointers. Edges store indices, not
//! references, so the graphs are trivially `Clone`/`Serialize` and never
//! form reference cycles.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }

        impl From<usize> for $name {
            fn from(v: usize) -> Self {
                $name(v as u32)
            }
        }
    };
}

arena_id!(KernelId);
arena_id!(StreamSetId);
arena_id!(BindingId);
arena_id!(ScalarId);
arena_id!(CalleeId);
arena_id!(PartitionId);
