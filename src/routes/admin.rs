use crate::{
    AppState,
    guard::{RoleGuard, authorize},
    handlers,
    models::Role,
};
use axum::{
    Router, middleware,
    routing::{get, post},
};

/// Role-Gated Router Module
///
/// Person CRUD. Reads are open to every known role; writes require `admin`. Each group
/// carries its own `RoleGuard`, and both sit inside the authentication layer applied by
/// `api_routes`.
pub fn member_routes() -> Router<AppState> {
    Router::new()
        // GET /persons
        .route("/persons", get(handlers::list_persons))
        // GET /persons/{id}
        .route("/persons/{id}", get(handlers::get_person))
        .route_layer(middleware::from_fn_with_state(
            RoleGuard::new([Role::Admin, Role::User]),
            authorize,
        ))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // POST /persons
        .route("/persons", post(handlers::create_person))
        // PUT/DELETE /persons/{id}
        .route(
            "/persons/{id}",
            axum::routing::put(handlers::update_person).delete(handlers::delete_person),
        )
        .route_layer(middleware::from_fn_with_state(
            RoleGuard::new([Role::Admin]),
            authorize,
        ))
}
