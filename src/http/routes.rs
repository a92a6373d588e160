//! HTTP routes: trail submission, territory listing, regions, health.

use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;

use super::{AppState, error::ApiError};
use crate::{
    grid::{CellId, GeoPoint},
    ledger::{MAX_LIST, MIN_TRAIL_POINTS},
    store::{CellRecord, Region},
    util::id::new_region_id,
};

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
}

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// Body of `POST /runs`.
#[derive(Debug, Deserialize)]
pub struct RunSubmission {
    pub user_id: String,
    pub points: Vec<GeoPoint>,
}

impl RunSubmission {
    fn validate(&self) -> Result<(), ApiError> {
        if self.user_id.trim().is_empty() {
            return Err(ApiError::invalid_payload("user_id is required"));
        }
        if self.points.len() < MIN_TRAIL_POINTS {
            return Err(ApiError::invalid_payload(format!(
                "at least {MIN_TRAIL_POINTS} points are required"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct RunAccepted {
    status: &'static str,
    hexes_captured: usize,
    hexes: Vec<CellId>,
}

pub async fn submit_run(
    State(state): State<AppState>,
    payload: Result<Json<RunSubmission>, JsonRejection>,
) -> Result<Json<RunAccepted>, ApiError> {
    let Json(run) = payload?;
    run.validate()?;
    let RunSubmission { user_id, points } = run;
    let ledger = state.ledger.clone();
    let claimant = user_id.clone();
    // claims are synced to disk before they are acknowledged
    let claim = blocking(move || ledger.submit_trail(&claimant, &points)).await??;
    info!(%user_id, hexes = claim.captured, "run accepted");
    Ok(Json(RunAccepted { status: "ok", hexes_captured: claim.captured, hexes: claim.cells }))
}

/// One row of `GET /hexes`.
#[derive(Debug, Serialize)]
pub struct HexView {
    h3_index: CellId,
    owner_user_id: String,
    control_score: u64,
    #[serde(with = "time::serde::rfc3339")]
    last_defended_at: OffsetDateTime,
}

impl From<CellRecord> for HexView {
    fn from(record: CellRecord) -> Self {
        Self {
            h3_index: record.cell_id,
            owner_user_id: record.owner_id,
            control_score: record.control_score,
            last_defended_at: record.last_claimed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    limit: Option<usize>,
}

pub async fn list_hexes(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<HexView>>, ApiError> {
    let Query(ListQuery { limit }) = query?;
    let records = state.ledger.list_recent(limit.unwrap_or(MAX_LIST))?;
    Ok(Json(records.into_iter().map(HexView::from).collect()))
}

/// Body of `POST /capturePolygon`. The polygon is stored as sent.
#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    polygon: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct CaptureAccepted {
    status: &'static str,
    id: String,
}

pub async fn capture_polygon(
    State(state): State<AppState>,
    payload: Result<Json<CaptureRequest>, JsonRejection>,
) -> Result<Json<CaptureAccepted>, ApiError> {
    let Json(req) = payload?;
    let (Some(user_id), Some(polygon)) = (req.user_id.filter(|u| !u.trim().is_empty()), req.polygon) else {
        return Err(ApiError::BadRequest {
            error: "need user_id and polygon",
            detail: "user_id and polygon must both be present".into(),
        });
    };

    let region = Region { id: new_region_id(), user_id, polygon, created_at: OffsetDateTime::now_utc() };
    let id = region.id.clone();
    let regions = state.regions.clone();
    blocking(move || regions.append_region(region)).await??;
    info!(%id, "region captured");
    Ok(Json(CaptureAccepted { status: "ok", id }))
}

pub async fn list_polygons(State(state): State<AppState>) -> Result<Json<Vec<Region>>, ApiError> {
    Ok(Json(state.regions.recent_regions(MAX_LIST)?))
}

/// Runs a store write on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ApiError::Internal(format!("store task failed: {err}")))
}
