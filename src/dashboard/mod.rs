use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::scheduler::{JobSpec, ScheduleOptions, Scheduler};
use crate::store::JobStore;

#[derive(Clone)]
pub struct DashboardState {
    pub scheduler: Scheduler,
    pub store: Arc<dyn JobStore>,
}

#[derive(Serialize)]
struct JobResponse {
    id: String,
    #[serde(rename = "type")]
    job_type: String,
    schedule: Option<String>,
    priority: i64,
    concurrency: i64,
    due: Option<DateTime<Utc>>,
    permits: i64,
    workers: Vec<String>,
    completed: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct SubmitJobResponse {
    success: bool,
    id: Option<String>,
    error: Option<String>,
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState) {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/api/jobs", get(list_jobs_handler))
        .route("/api/jobs", post(submit_job_handler))
        .layer(cors)
        .with_state(state);

    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(addr = %addr, error = %err, "Failed to bind dashboard server");
            return;
        }
    };

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!(error = %err, "Dashboard server failed");
    }
}

async fn index_handler() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

async fn list_jobs_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    match state.store.list() {
        Ok(records) => {
            let jobs: Vec<JobResponse> = records
                .into_iter()
                .map(|record| JobResponse {
                    id: record.job.id,
                    job_type: record.job.job_type,
                    schedule: record.job.schedule,
                    priority: record.job.priority,
                    concurrency: record.job.concurrency,
                    due: record.due,
                    permits: record.permits,
                    workers: record.workers,
                    completed: record.completed,
                })
                .collect();
            Json(jobs).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to list jobs");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn submit_job_handler(
    State(state): State<DashboardState>,
    Json(spec): Json<JobSpec>,
) -> impl IntoResponse {
    match state
        .scheduler
        .schedule(spec, ScheduleOptions { immediate: true })
    {
        Ok(record) => Json(SubmitJobResponse {
            success: true,
            id: Some(record.job.id),
            error: None,
        }),
        Err(err) => Json(SubmitJobResponse {
            success: false,
            id: None,
            error: Some(err.to_string()),
        }),
    }
}
