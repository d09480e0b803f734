use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{auth::AuthUser, error::AppError, models::{Person, Role}};

/// RoleGuard
///
/// A reusable allow-list of roles. The guard holds no per-request state, so one value
/// can gate any number of routers and always gives the same answer for the same user.
#[derive(Clone, Debug)]
pub struct RoleGuard {
    permitted: Arc<[Role]>,
}

impl RoleGuard {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            permitted: roles.into_iter().collect(),
        }
    }

    pub fn permitted(&self) -> &[Role] {
        &self.permitted
    }

    /// Whether `user` may pass. An absent user never passes.
    pub fn permits(&self, user: Option<&Person>) -> bool {
        user.is_some_and(|person| self.permitted.iter().any(|role| role.as_str() == person.role))
    }
}

/// authorize
///
/// Middleware mounted with `from_fn_with_state(guard, authorize)` inside the
/// authentication layer. Short-circuits with the 403 envelope when the attached user's
/// role is not on the guard's list.
pub async fn authorize(
    State(guard): State<RoleGuard>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = request.extensions().get::<AuthUser>().map(|AuthUser(person)| person);

    if user.is_none() {
        tracing::error!(
            path = %request.uri().path(),
            "role guard reached without an authenticated user; check layer order"
        );
    }

    if !guard.permits(user) {
        if let Some(person) = user {
            tracing::debug!(user_id = person.id, role = %person.role, permitted = ?guard.permitted(), "role not permitted");
        }
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}
