use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;
use validator::Validate;

use crate::core::MatchingOrchestrator;
use crate::models::{
    AcceptResponse, CancelResponse, ErrorResponse, HealthResponse, MatchStatusResponse,
    SubmitMatchRequest, SubmitMatchResponse,
};
use crate::services::{RedisBus, RedisPool};

/// The concrete engine this service runs
pub type Engine = MatchingOrchestrator<RedisPool, RedisBus>;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Engine>,
}

/// Configure all match-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/matches", web::post().to(submit_match))
        .route("/matches/{request_id}", web::get().to(match_status))
        .route("/matches/{request_id}", web::delete().to(cancel_match))
        .route("/matches/{request_id}/accept", web::post().to(accept_match));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let redis_healthy = state.orchestrator.healthy().await;

    let status = if redis_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Submit a match request
///
/// POST /api/v1/matches
///
/// Request body:
/// ```json
/// {
///   "userId": "string",
///   "topics": ["graphs"],
///   "difficulties": ["easy"]
/// }
/// ```
async fn submit_match(
    state: web::Data<AppState>,
    req: web::Json<SubmitMatchRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for submit request: {:?}", errors);
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: format!("{}", errors),
            status_code: 400,
        });
    }

    let preference = req.into_inner().into_preference();
    match state.orchestrator.submit(preference).await {
        Ok(submitted) => {
            let status = *submitted.status.borrow();
            HttpResponse::Ok().json(SubmitMatchResponse {
                request_id: submitted.request_id,
                status,
            })
        }
        Err(e) => {
            tracing::error!("Submit failed: {}", e);
            HttpResponse::BadGateway().json(ErrorResponse {
                error: "pool_unavailable".to_string(),
                message: format!("Match submission failed: {}", e),
                status_code: 502,
            })
        }
    }
}

/// Current status of a request
///
/// GET /api/v1/matches/{requestId}
async fn match_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let request_id = path.into_inner();
    match state.orchestrator.status_detail(&request_id) {
        Some((status, counterpart_request_id)) => HttpResponse::Ok().json(MatchStatusResponse {
            request_id,
            status,
            counterpart_request_id,
        }),
        None => HttpResponse::NotFound().json(ErrorResponse {
            error: "not_found".to_string(),
            message: format!("No record of request {}", request_id),
            status_code: 404,
        }),
    }
}

/// Withdraw a pending or matched request
///
/// DELETE /api/v1/matches/{requestId}
async fn cancel_match(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let request_id = path.into_inner();
    match state.orchestrator.cancel(&request_id).await {
        Ok(cancelled) => HttpResponse::Ok().json(CancelResponse { cancelled }),
        Err(e) => {
            tracing::error!("Cancel failed for {}: {}", request_id, e);
            HttpResponse::BadGateway().json(ErrorResponse {
                error: "pool_unavailable".to_string(),
                message: format!("Cancel failed: {}", e),
                status_code: 502,
            })
        }
    }
}

/// Record one party's acceptance of a confirmed pairing
///
/// POST /api/v1/matches/{requestId}/accept
async fn accept_match(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let request_id = path.into_inner();
    let accepted = state.orchestrator.record_acceptance(&request_id);

    if accepted {
        HttpResponse::Ok().json(AcceptResponse { accepted: true })
    } else {
        // Unknown here, or not (or no longer) in a pending pairing
        HttpResponse::Conflict().json(ErrorResponse {
            error: "not_acceptable".to_string(),
            message: format!("Request {} has no pending pairing on this instance", request_id),
            status_code: 409,
        })
    }
}
