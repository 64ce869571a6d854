//! Node-state ledger DTOs (§3/§4.8).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStateSample {
    pub id: i64,
    pub node_id: i64,
    pub hostname: String,
    pub cluster: String,
    pub subcluster: String,
    pub time_stamp: i64,
    pub node_state: String,
    pub health_state: String,
    pub cpus_allocated: i32,
    pub memory_allocated: i64,
    pub gpus_allocated: i32,
    pub jobs_running: i32,
}
