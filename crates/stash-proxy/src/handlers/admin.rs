//! Cache inspection handlers.

use axum::{Json, extract::State};
use serde::Serialize;
use stash_cache::{Phase, StatsSnapshot};
use std::sync::Arc;

use crate::error::ProxyError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct StatsResponse {
    pub cache_version: String,
    pub phase: Phase,
    pub pending_background: usize,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let worker = &state.worker;
    Json(StatsResponse {
        cache_version: worker.version().to_string(),
        phase: worker.phase(),
        pending_background: worker.pending_background(),
        stats: worker.stats(),
    })
}

#[derive(Serialize)]
pub struct PartitionSummary {
    pub name: String,
    pub entries: usize,
    /// Belongs to the running version.
    pub current: bool,
}

#[derive(Serialize)]
pub struct ListPartitionsResponse {
    pub partitions: Vec<PartitionSummary>,
    pub total: usize,
}

pub async fn partitions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListPartitionsResponse>, ProxyError> {
    let storage = state.worker.storage();
    let current = state.worker.partitions();

    let mut partitions = vec![];
    for name in storage.partitions().await? {
        let entries = storage.keys(&name).await?.len();
        partitions.push(PartitionSummary {
            current: current.contains(&name),
            name,
            entries,
        });
    }

    Ok(Json(ListPartitionsResponse {
        total: partitions.len(),
        partitions,
    }))
}
