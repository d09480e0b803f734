use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    http::HeaderName,
    middleware,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::Span;

// --- Module Structure ---

pub mod auth;
pub mod codegen;
pub mod config;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod password;
pub mod repository;
pub mod response;
pub mod server;
pub mod validation;

// Routing segregated by required access (public, authenticated, role-gated).
pub mod routes;

// --- Public Re-exports ---

pub use auth::{AuthState, AuthStrategy, AuthUser, JwtKeys, JwtStrategy};
pub use config::AppConfig;
pub use error::AppError;
pub use repository::{InMemoryRepository, PostgresRepository, Repository, RepositoryState};
pub use response::Envelope;
pub use server::Application;

/// Prefix every versioned route is mounted under.
pub const API_PREFIX: &str = "/api/v1";

/// Largest request body the JSON extractors will buffer.
const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// ApiDoc
///
/// OpenAPI document for every handler annotated with `#[utoipa::path]`, served at
/// `/api-docs/openapi.json` and browsable at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health, handlers::register, handlers::login, handlers::get_me,
        handlers::list_persons, handlers::get_person, handlers::create_person,
        handlers::update_person, handlers::delete_person
    ),
    components(
        schemas(
            models::Role, models::Gender, models::RegisterRequest, models::LoginRequest,
            models::CreatePersonRequest, models::UpdatePersonRequest, models::PersonResponse,
            models::LoginResponse, models::MessageResponse, error::FieldError,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "person-api", description = "Authenticated person management API")
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// AppState
///
/// The single container of shared services handed to every request. Cloning is cheap:
/// every field is an `Arc` or a small immutable value.
#[derive(Clone)]
pub struct AppState {
    /// Persistence boundary.
    pub repo: RepositoryState,
    /// Credential verification used by the authentication middleware.
    pub auth: AuthState,
    /// Token signing material used by the login handler.
    pub keys: JwtKeys,
    pub config: AppConfig,
}

impl AppState {
    /// Wires the JWT strategy to `repo` using the secret from `config`.
    pub fn new(config: AppConfig, repo: RepositoryState) -> Self {
        let keys = JwtKeys::from_config(&config);
        let auth = Arc::new(JwtStrategy::new(keys.clone(), repo.clone())) as AuthState;
        Self {
            repo,
            auth,
            keys,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(app_state: &AppState) -> AuthState {
        app_state.auth.clone()
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(app_state: &AppState) -> JwtKeys {
        app_state.keys.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the full application: documentation, the versioned API, the envelope
/// fallback for unknown routes, and the outer layers.
///
/// Outer layers, first to last on the way in: CORS, body limit, request id, trace span,
/// request logger. Authentication and role guards live inside `routes::api_routes`.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest(API_PREFIX, routes::api_routes(&state))
        .fallback(route_not_found)
        .with_state(state);

    base_router
        .layer(middleware::from_fn(logging::log_request))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // Span only; the request logger writes the completion line.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_request(())
                        .on_response(()),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors)
}

async fn route_not_found() -> AppError {
    AppError::not_found("Route not found")
}

/// trace_span_logger
///
/// Builds the per-request span so every log line of one request carries its
/// `x-request-id`.
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
