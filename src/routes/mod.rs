/// Router Module Index
///
/// Routes are split by the access they require. Each group gets its access control
/// as a layer on the whole group, so a handler can never be mounted without it.
///
/// Layer order inside `/api/v1` is fixed: authentication wraps the guarded groups,
/// and each guard wraps only its own group. A request therefore always passes
/// authenticate → authorize → handler.
use axum::{Router, middleware};

use crate::{AppState, auth::authenticate, error::AppError};

/// Routes accessible to anonymous clients.
pub mod public;

/// Routes that need a valid bearer token but no particular role.
pub mod authenticated;

/// Routes gated by a role guard on top of authentication.
pub mod admin;

/// api_routes
///
/// The versioned route table, mounted by `create_router` under `/api/v1`.
pub fn api_routes(state: &AppState) -> Router<AppState> {
    let protected = authenticated::authenticated_routes()
        .merge(admin::member_routes())
        .merge(admin::admin_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .merge(public::public_routes())
        .merge(protected)
        .method_not_allowed_fallback(method_not_allowed)
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
