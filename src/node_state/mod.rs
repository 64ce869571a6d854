//! Node-State Ledger (§4.8): append-only per-node state/health samples, with "current
//! state" defined as the sample with the maximum `time_stamp` per node.
//!
//! Grounded on `services/cleanup.rs`'s cutoff-based retention sweep idiom, generalized
//! from "delete everything before cutoff" to "delete everything before cutoff except the
//! latest sample per node" — the one genuinely new SQL shape in this module.

use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::entity::{node, node_state};
use crate::error::{RepoError, RepoResult};
use crate::models::node_state::NodeStateSample;
use crate::store::Store;

fn decode(node_row: &node::Model, state_row: node_state::Model) -> NodeStateSample {
    NodeStateSample {
        id: state_row.id,
        node_id: state_row.node_id,
        hostname: node_row.hostname.clone(),
        cluster: node_row.cluster.clone(),
        subcluster: node_row.subcluster.clone(),
        time_stamp: state_row.time_stamp,
        node_state: state_row.node_state,
        health_state: state_row.health_state,
        cpus_allocated: state_row.cpus_allocated,
        memory_allocated: state_row.memory_allocated,
        gpus_allocated: state_row.gpus_allocated,
        jobs_running: state_row.jobs_running,
    }
}

/// The Node-State Ledger (§4.8).
pub struct NodeStateLedger {
    store: Store,
}

impl NodeStateLedger {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Finds the node identified by `(hostname, cluster)`, creating it (with the given
    /// `subcluster`) if it does not already exist. Used by every write path in this
    /// module so callers never have to manage node identity themselves.
    async fn find_or_create_node(
        &self,
        hostname: &str,
        cluster: &str,
        subcluster: &str,
    ) -> RepoResult<node::Model> {
        let existing = node::Entity::find()
            .filter(node::Column::Hostname.eq(hostname))
            .filter(node::Column::Cluster.eq(cluster))
            .one(self.store.conn())
            .await?;
        if let Some(row) = existing {
            return Ok(row);
        }

        let active = node::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            hostname: Set(hostname.to_string()),
            cluster: Set(cluster.to_string()),
            subcluster: Set(subcluster.to_string()),
        };
        match active.insert(self.store.conn()).await {
            Ok(row) => Ok(row),
            Err(e) if e.to_string().to_lowercase().contains("unique") => node::Entity::find()
                .filter(node::Column::Hostname.eq(hostname))
                .filter(node::Column::Cluster.eq(cluster))
                .one(self.store.conn())
                .await?
                .ok_or(RepoError::NotFound("node".into())),
            Err(e) => Err(RepoError::Database(e)),
        }
    }

    /// **UpdateNodeState** (§4.8): appends a new sample for the node identified by
    /// `(hostname, cluster)`, creating the node record if this is its first sample.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_node_state(
        &self,
        hostname: &str,
        cluster: &str,
        subcluster: &str,
        time_stamp: i64,
        node_state: &str,
        health_state: &str,
        cpus_allocated: i32,
        memory_allocated: i64,
        gpus_allocated: i32,
        jobs_running: i32,
    ) -> RepoResult<NodeStateSample> {
        let node_row = self.find_or_create_node(hostname, cluster, subcluster).await?;
        let active = node_state::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            node_id: Set(node_row.id),
            time_stamp: Set(time_stamp),
            node_state: Set(node_state.to_string()),
            health_state: Set(health_state.to_string()),
            cpus_allocated: Set(cpus_allocated),
            memory_allocated: Set(memory_allocated),
            gpus_allocated: Set(gpus_allocated),
            jobs_running: Set(jobs_running),
        };
        let inserted = active.insert(self.store.conn()).await?;
        Ok(decode(&node_row, inserted))
    }

    /// **UpdateHealthState(hostname, cluster, state)** (§4.8/§9): the spec's original
    /// function referenced an undefined `id`; this crate resolves the node id the same
    /// way `update_node_state` does rather than require the node id as an input (§9 Open
    /// Question, recorded in DESIGN.md). Appends a sample that carries the existing
    /// latest sample's other fields forward, with only `health_state` changed.
    pub async fn update_health_state(
        &self,
        hostname: &str,
        cluster: &str,
        health_state: &str,
        time_stamp: i64,
    ) -> RepoResult<NodeStateSample> {
        let node_row = node::Entity::find()
            .filter(node::Column::Hostname.eq(hostname))
            .filter(node::Column::Cluster.eq(cluster))
            .one(self.store.conn())
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("node {hostname}@{cluster}")))?;

        let latest = node_state::Entity::find()
            .filter(node_state::Column::NodeId.eq(node_row.id))
            .order_by_desc(node_state::Column::TimeStamp)
            .one(self.store.conn())
            .await?;

        let active = match latest {
            Some(prev) => node_state::ActiveModel {
                id: sea_orm::ActiveValue::NotSet,
                node_id: Set(node_row.id),
                time_stamp: Set(time_stamp),
                node_state: Set(prev.node_state),
                health_state: Set(health_state.to_string()),
                cpus_allocated: Set(prev.cpus_allocated),
                memory_allocated: Set(prev.memory_allocated),
                gpus_allocated: Set(prev.gpus_allocated),
                jobs_running: Set(prev.jobs_running),
            },
            None => node_state::ActiveModel {
                id: sea_orm::ActiveValue::NotSet,
                node_id: Set(node_row.id),
                time_stamp: Set(time_stamp),
                node_state: Set(String::new()),
                health_state: Set(health_state.to_string()),
                cpus_allocated: Set(0),
                memory_allocated: Set(0),
                gpus_allocated: Set(0),
                jobs_running: Set(0),
            },
        };
        let inserted = active.insert(self.store.conn()).await?;
        Ok(decode(&node_row, inserted))
    }

    /// Every node's current sample: the row with `MAX(time_stamp)` per node, joined with
    /// the node identity (§4.8: "current state ... GROUP BY node.id ... MAX(time_stamp)").
    pub async fn current_states(&self) -> RepoResult<Vec<NodeStateSample>> {
        let nodes = node::Entity::find().all(self.store.conn()).await?;
        let mut out = Vec::with_capacity(nodes.len());
        for node_row in &nodes {
            let latest = node_state::Entity::find()
                .filter(node_state::Column::NodeId.eq(node_row.id))
                .order_by_desc(node_state::Column::TimeStamp)
                .one(self.store.conn())
                .await?;
            if let Some(row) = latest {
                out.push(decode(node_row, row));
            }
        }
        Ok(out)
    }

    /// **FindNodeStatesBefore(cutoff)** (§4.8): the deletable set — samples older than
    /// `cutoff` excluding each node's single latest sample — joined with the node table.
    pub async fn find_node_states_before(&self, cutoff: i64) -> RepoResult<Vec<NodeStateSample>> {
        let nodes = node::Entity::find().all(self.store.conn()).await?;
        let mut out = Vec::new();
        for node_row in &nodes {
            let samples = node_state::Entity::find()
                .filter(node_state::Column::NodeId.eq(node_row.id))
                .order_by_desc(node_state::Column::TimeStamp)
                .all(self.store.conn())
                .await?;
            for (i, row) in samples.into_iter().enumerate() {
                // i == 0 is the latest sample for this node; never eligible for deletion
                // even if it is itself older than cutoff.
                if i > 0 && row.time_stamp < cutoff {
                    out.push(decode(node_row, row));
                }
            }
        }
        Ok(out)
    }

    /// **DeleteNodeStatesBefore(cutoff)** (§4.8): deletes every sample returned by
    /// `find_node_states_before`, preserving each node's latest sample unconditionally.
    /// Returns the number of rows deleted.
    pub async fn delete_node_states_before(&self, cutoff: i64) -> RepoResult<u64> {
        let victims = self.find_node_states_before(cutoff).await?;
        let ids: Vec<i64> = victims.iter().map(|v| v.id).collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let count = ids.len() as u64;
        node_state::Entity::delete_many()
            .filter(node_state::Column::Id.is_in(ids))
            .exec(self.store.conn())
            .await?;
        tracing::info!(count, cutoff, "deleted node states before cutoff");
        Ok(count)
    }
}
