use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::access::AccessPolicy;
use super::domain::{
    ApprovalStatus, DonorFilter, DonorId, DonorSubmission, RecipientSubmission, RequestFilter,
    RequestId, RequestStatus, UserId,
};
use super::error::RegistryError;
use super::events::EventPublisher;
use super::lifecycle::TransitionCommand;
use super::repository::{ProfileStore, StoreError};
use super::service::RegistryService;

/// Header carrying the authenticated user id, set by the fronting auth layer.
pub const ACTOR_HEADER: &str = "x-actor-id";

type SharedService<S, P, A> = Arc<RegistryService<S, P, A>>;

/// Router builder exposing the registry operations over HTTP.
pub fn registry_router<S, P, A>(service: SharedService<S, P, A>) -> Router
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    Router::new()
        .route(
            "/api/v1/donors",
            post(submit_donor_handler::<S, P, A>).get(list_donors_handler::<S, P, A>),
        )
        .route(
            "/api/v1/donors/:donor_id",
            get(get_donor_handler::<S, P, A>)
                .put(update_donor_handler::<S, P, A>)
                .delete(delete_donor_handler::<S, P, A>),
        )
        .route(
            "/api/v1/donors/:donor_id/availability",
            post(availability_handler::<S, P, A>),
        )
        .route(
            "/api/v1/donors/:donor_id/transition",
            post(transition_donor_handler::<S, P, A>),
        )
        .route(
            "/api/v1/requests",
            post(submit_request_handler::<S, P, A>).get(list_requests_handler::<S, P, A>),
        )
        .route(
            "/api/v1/requests/:request_id",
            get(get_request_handler::<S, P, A>)
                .put(update_request_handler::<S, P, A>)
                .delete(delete_request_handler::<S, P, A>),
        )
        .route(
            "/api/v1/requests/:request_id/matches",
            get(matches_handler::<S, P, A>),
        )
        .route(
            "/api/v1/requests/:request_id/transition",
            post(transition_request_handler::<S, P, A>),
        )
        .route(
            "/api/v1/requests/:request_id/fulfill",
            post(fulfill_handler::<S, P, A>),
        )
        .route("/api/v1/me/donors", get(my_donors_handler::<S, P, A>))
        .route("/api/v1/me/requests", get(my_requests_handler::<S, P, A>))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransitionBody<T> {
    pub(crate) target: T,
    pub(crate) expected: Option<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AvailabilityBody {
    pub(crate) available: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FulfillBody {
    pub(crate) donor_id: DonorId,
}

fn actor_from(headers: &HeaderMap) -> Result<UserId, Response> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(UserId::new)
        .ok_or_else(|| {
            let payload = json!({ "error": format!("missing {ACTOR_HEADER} header") });
            (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
        })
}

/// Render a registry error with the status code the presentation layer acts on.
pub fn error_response(error: RegistryError) -> Response {
    match &error {
        RegistryError::Validation(_) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
        RegistryError::NotFound { .. } => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        RegistryError::Unauthorized { .. } => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::FORBIDDEN, Json(payload)).into_response()
        }
        RegistryError::IllegalTransition { from, to, .. } => {
            let payload = json!({
                "error": error.to_string(),
                "current": from,
                "requested": to,
            });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        RegistryError::Conflict { .. } => {
            let payload = json!({ "error": error.to_string(), "retry": true });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        RegistryError::Store(StoreError::Unavailable(_)) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::SERVICE_UNAVAILABLE, Json(payload)).into_response()
        }
        RegistryError::Store(_) | RegistryError::RollbackFailed { .. } => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, RegistryError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_donor_handler<S, P, A>(
    State(service): State<SharedService<S, P, A>>,
    headers: HeaderMap,
    Json(submission): Json<DonorSubmission>,
) -> Response
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        service.create_donor_profile(&actor, submission),
    )
}

pub(crate) async fn list_donors_handler<S, P, A>(
    State(service): State<SharedService<S, P, A>>,
    headers: HeaderMap,
    Query(filter): Query<DonorFilter>,
) -> Response
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(StatusCode::OK, service.list_donors(&actor, filter))
}

pub(crate) async fn get_donor_handler<S, P, A>(
    State(service): State<SharedService<S, P, A>>,
    headers: HeaderMap,
    Path(donor_id): Path<u64>,
) -> Response
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.donor_profile(&actor, DonorId(donor_id)),
    )
}

pub(crate) async fn update_donor_handler<S, P, A>(
    State(service): State<SharedService<S, P, A>>,
    headers: HeaderMap,
    Path(donor_id): Path<u64>,
    Json(submission): Json<DonorSubmission>,
) -> Response
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.update_donor_profile(&actor, DonorId(donor_id), submission),
    )
}

pub(crate) async fn delete_donor_handler<S, P, A>(
    State(service): State<SharedService<S, P, A>>,
    headers: HeaderMap,
    Path(donor_id): Path<u64>,
) -> Response
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.delete_donor_profile(&actor, DonorId(donor_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn availability_handler<S, P, A>(
    State(service): State<SharedService<S, P, A>>,
    headers: HeaderMap,
    Path(donor_id): Path<u64>,
    Json(body): Json<AvailabilityBody>,
) -> Response
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.set_availability(&actor, DonorId(donor_id), body.available),
    )
}

pub(crate) async fn transition_donor_handler<S, P, A>(
    State(service): State<SharedService<S, P, A>>,
    headers: HeaderMap,
    Path(donor_id): Path<u64>,
    Json(body): Json<TransitionBody<ApprovalStatus>>,
) -> Response
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let command = TransitionCommand::DonorProfile {
        id: DonorId(donor_id),
        target: body.target,
        expected: body.expected,
    };
    respond(StatusCode::OK, service.transition(command, &actor))
}

pub(crate) async fn submit_request_handler<S, P, A>(
    State(service): State<SharedService<S, P, A>>,
    headers: HeaderMap,
    Json(submission): Json<RecipientSubmission>,
) -> Response
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        service.create_recipient_request(&actor, submission),
    )
}

pub(crate) async fn list_requests_handler<S, P, A>(
    State(service): State<SharedService<S, P, A>>,
    headers: HeaderMap,
    Query(filter): Query<RequestFilter>,
) -> Response
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(StatusCode::OK, service.list_requests(&actor, filter))
}

pub(crate) async fn get_request_handler<S, P, A>(
    State(service): State<SharedService<S, P, A>>,
    headers: HeaderMap,
    Path(request_id): Path<u64>,
) -> Response
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.recipient_request(&actor, RequestId(request_id)),
    )
}

pub(crate) async fn update_request_handler<S, P, A>(
    State(service): State<SharedService<S, P, A>>,
    headers: HeaderMap,
    Path(request_id): Path<u64>,
    Json(submission): Json<RecipientSubmission>,
) -> Response
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.update_recipient_request(&actor, RequestId(request_id), submission),
    )
}

pub(crate) async fn delete_request_handler<S, P, A>(
    State(service): State<SharedService<S, P, A>>,
    headers: HeaderMap,
    Path(request_id): Path<u64>,
) -> Response
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.delete_recipient_request(&actor, RequestId(request_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn matches_handler<S, P, A>(
    State(service): State<SharedService<S, P, A>>,
    headers: HeaderMap,
    Path(request_id): Path<u64>,
) -> Response
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.matches_for(&actor, RequestId(request_id)),
    )
}

pub(crate) async fn transition_request_handler<S, P, A>(
    State(service): State<SharedService<S, P, A>>,
    headers: HeaderMap,
    Path(request_id): Path<u64>,
    Json(body): Json<TransitionBody<RequestStatus>>,
) -> Response
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let command = TransitionCommand::RecipientRequest {
        id: RequestId(request_id),
        target: body.target,
        expected: body.expected,
    };
    respond(StatusCode::OK, service.transition(command, &actor))
}

pub(crate) async fn fulfill_handler<S, P, A>(
    State(service): State<SharedService<S, P, A>>,
    headers: HeaderMap,
    Path(request_id): Path<u64>,
    Json(body): Json<FulfillBody>,
) -> Response
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.fulfill_request(&actor, RequestId(request_id), body.donor_id),
    )
}

pub(crate) async fn my_donors_handler<S, P, A>(
    State(service): State<SharedService<S, P, A>>,
    headers: HeaderMap,
) -> Response
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(StatusCode::OK, service.list_my_donor_profiles(&actor))
}

pub(crate) async fn my_requests_handler<S, P, A>(
    State(service): State<SharedService<S, P, A>>,
    headers: HeaderMap,
) -> Response
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(StatusCode::OK, service.list_my_requests(&actor))
}
