use axum::{
    extract::{FromRef, Request},
    http::HeaderName,
    Router,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod reconciliation;
pub mod repository;

// Routing segregation (Public, Sales Cases).
pub mod routes;
use auth::AuthUser;
use routes::{public, sales_cases};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{ApiError, RepositoryError};
pub use memory::InMemoryRepository;
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for the service, served at `/api-docs/openapi.json` and browsable
/// through Swagger UI.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_sales_case, handlers::list_sales_cases,
        handlers::get_sales_case, handlers::return_sales_case
    ),
    components(
        schemas(
            models::SalesCase, models::SalesCaseItem, models::SalesCaseStatus,
            models::SalesCaseCreate, models::SalesCaseItemCreate,
            models::SalesCaseReturnRequest, models::SalesCaseReturnItem,
            models::SalesCaseReturnReport, models::ReturnReportLine, models::ErrorDetail,
        )
    ),
    tags(
        (name = "Sales Cases", description = "Stock consignments assigned to sales representatives")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// Shared, immutable container of the services every request needs.
#[derive(Clone)]
pub struct AppState {
    /// CRUD layer (Postgres in production, in-memory in tests).
    pub repo: RepositoryState,
    /// The loaded environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects unauthenticated requests with 401 before any handler runs. The resolved
/// identity is stored in the request extensions so the handlers' guards reuse it
/// instead of decoding the token again.
async fn auth_middleware(auth_user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, applies global and scoped middleware, and registers
/// the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            sales_cases::sales_case_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state);

    // Request id generation runs first so the trace span can record it.
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer`: method, uri and the `x-request-id`, so every log line of a
/// request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
