use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    Producer,
    Consumer,
}

impl WorkerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerRole::Producer => "producer",
            WorkerRole::Consumer => "consumer",
        }
    }
}

/// Identity of a worker thread, e.g. `producer-1` or `consumer-3`.
///
/// Indices are 1-based so the rendered names match what an operator counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId {
    pub role: WorkerRole,
    pub index: usize,
}

impl WorkerId {
    pub fn producer(index: usize) -> Self {
        Self {
            role: WorkerRole::Producer,
            index,
        }
    }

    pub fn consumer(index: usize) -> Self {
        Self {
            role: WorkerRole::Consumer,
            index,
        }
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.role.as_str(), self.index)
    }
}

/// A unit of production. Consumers treat it as opaque; the metadata exists for
/// logging and for accounting which items were consumed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub producer: WorkerId,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(producer: WorkerId, sequence: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            producer,
            sequence,
            created_at: Utc::now(),
        }
    }
}
