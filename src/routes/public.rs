use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a token: the liveness probe and the two entry points of
/// the identity flow.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        .route("/health", get(handlers::health))
        // POST /auth/register
        // Creates a `user` account. Admin accounts are only created through /persons.
        .route("/auth/register", post(handlers::register))
        // POST /auth/login
        // Returns a signed bearer token carrying the person's id.
        .route("/auth/login", post(handlers::login))
}
