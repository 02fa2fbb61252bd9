//! Schedule management endpoints under `/api/schedule`.
//!
//! Handlers validate input, then delegate to the job store or the scheduler.
//! The engine loop itself never goes through this module.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use oneclick_scheduler::{Clock, Job, JobStatus, ListFilter, NewJob, SchedulerError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{api_error, error_body, ApiError};
use crate::app::AppState;

pub const DEFAULT_LIST_LIMIT: u32 = 100;
pub const MAX_LIST_LIMIT: u32 = 1000;

/// The employee record forwarded to the provisioning workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub work_email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub personal_email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub department: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub job_title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
}

/// Body of `POST /api/schedule`.
#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    #[serde(default)]
    pub employee: Employee,
    /// Which applications to provision; passed through untouched.
    #[serde(default = "empty_object")]
    pub applications: Value,
    pub schedule_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn empty_object() -> Value {
    json!({})
}

impl CreateScheduleRequest {
    /// Check the request and build the job to insert.
    pub fn into_new_job(self, now: DateTime<Utc>) -> Result<NewJob, SchedulerError> {
        if self.employee.full_name.trim().is_empty() || self.employee.work_email.trim().is_empty() {
            return Err(SchedulerError::Validation(
                "employee fullName and workEmail are required".into(),
            ));
        }
        let schedule_time = self
            .schedule_time
            .ok_or_else(|| SchedulerError::Validation("schedule_time is required".into()))?;
        if schedule_time <= now {
            return Err(SchedulerError::Validation(
                "schedule_time must be in the future".into(),
            ));
        }

        let mut tags = self.tags;
        tags.retain(|t| !t.trim().is_empty());
        tags.sort();
        tags.dedup();

        Ok(NewJob {
            payload: json!({
                "employee": self.employee,
                "applications": self.applications,
            }),
            schedule_time,
            tags,
        })
    }
}

/// Query string of `GET /api/schedule`.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub tag: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListParams {
    pub fn into_filter(self) -> Result<ListFilter, SchedulerError> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => Some(s.parse::<JobStatus>().map_err(SchedulerError::Validation)?),
        };
        Ok(ListFilter {
            status,
            tag: self.tag.filter(|t| !t.trim().is_empty()),
            limit: self
                .limit
                .unwrap_or(DEFAULT_LIST_LIMIT)
                .clamp(1, MAX_LIST_LIMIT),
            offset: self.offset.unwrap_or(0),
        })
    }
}

fn bad_request(message: String) -> ApiError {
    error_body(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
}

fn job_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|_| bad_request("invalid ID format".into()))
}

/// POST /api/schedule
pub async fn create_schedule(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateScheduleRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    let Json(req) = body.map_err(|e| bad_request(format!("invalid request body: {}", e.body_text())))?;

    let now = state.scheduler.clock().now();
    let new_job = req.into_new_job(now).map_err(api_error)?;
    let job = state.scheduler.store().insert(new_job, now).map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/schedule?status=&tag=&limit=&offset=
pub async fn list_schedules(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<Job>>, ApiError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    let filter = params.into_filter().map_err(api_error)?;
    let jobs = state.scheduler.store().list(&filter).map_err(api_error)?;
    Ok(Json(jobs))
}

/// GET /api/schedule/{id}
pub async fn get_schedule(
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Job>, ApiError> {
    let id = job_id(path)?;
    state
        .scheduler
        .store()
        .get_by_id(id)
        .map_err(api_error)?
        .map(Json)
        .ok_or_else(|| api_error(SchedulerError::JobNotFound { id }))
}

/// DELETE /api/schedule/{id}: cancel a job that has not started yet.
pub async fn cancel_schedule(
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = job_id(path)?;
    let now = state.scheduler.clock().now();
    state
        .scheduler
        .store()
        .cancel_if_pending(id, now)
        .map_err(api_error)?;
    info!(job_id = %id, "schedule cancelled via API");
    Ok(Json(json!({
        "id": id,
        "status": JobStatus::Cancelled,
        "message": "schedule cancelled",
    })))
}

/// POST /api/schedule/{id}/execute: run a pending job now.
pub async fn execute_schedule(
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    let id = job_id(path)?;
    let job = state.scheduler.execute_now(id).map_err(api_error)?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}
