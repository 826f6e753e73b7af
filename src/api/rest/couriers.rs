use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::put;
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::locations::{record_sample, SampleOutcome};
use crate::error::AppError;
use crate::models::courier::CourierLocationSample;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/couriers/:courier_id/location", put(report_location))
}

#[derive(Deserialize)]
pub struct ReportLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
    /// Device timestamp; the server clock is used when absent.
    pub observed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct ReportLocationResponse {
    pub outcome: SampleOutcome,
    pub accepted: bool,
    pub sample: CourierLocationSample,
}

async fn report_location(
    State(state): State<Arc<AppState>>,
    Path(courier_id): Path<Uuid>,
    Json(payload): Json<ReportLocationRequest>,
) -> Result<Json<ReportLocationResponse>, AppError> {
    if !(-90.0..=90.0).contains(&payload.latitude) {
        return Err(AppError::BadRequest(format!(
            "latitude {} out of range",
            payload.latitude
        )));
    }
    if !(-180.0..=180.0).contains(&payload.longitude) {
        return Err(AppError::BadRequest(format!(
            "longitude {} out of range",
            payload.longitude
        )));
    }

    let sample = CourierLocationSample {
        courier_id,
        latitude: payload.latitude,
        longitude: payload.longitude,
        observed_at: payload.observed_at.unwrap_or_else(Utc::now),
    };

    let outcome = record_sample(&state, sample.clone());
    Ok(Json(ReportLocationResponse {
        outcome,
        accepted: outcome == SampleOutcome::Accepted,
        sample,
    }))
}
