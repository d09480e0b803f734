use axum::extract::{Path, State, rejection::PathRejection};

use crate::{
    AppState,
    auth::{AuthError, AuthUser},
    error::AppError,
    models::{
        CreatePersonRequest, LoginRequest, LoginResponse, MessageResponse, NewPerson,
        PersonChanges, PersonResponse, RegisterRequest, Role, UpdatePersonRequest,
    },
    password::{hash_password, verify_password},
    repository::EMAIL_TAKEN,
    response::Envelope,
    validation::ValidatedJson,
};

type ApiResult<T> = Result<Envelope<T>, AppError>;

fn person_not_found(id: i64) -> AppError {
    AppError::not_found(format!("Person {} not found", id))
}

// --- Public Handlers ---

/// health
///
/// [Public Route] Liveness probe.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health() -> Envelope<&'static str> {
    Envelope::ok("ok")
}

/// register
///
/// [Public Route] Self-service sign-up. New accounts always receive the `user` role.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = PersonResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> ApiResult<PersonResponse> {
    if state.repo.find_by_email(&payload.email).await?.is_some() {
        return Err(AppError::Conflict(EMAIL_TAKEN.to_string()));
    }

    let person = state
        .repo
        .create(NewPerson {
            name: payload.name,
            email: payload.email,
            password_hash: hash_password(&payload.password)?,
            role: Role::User,
            gender: payload.gender,
        })
        .await?;

    tracing::info!(person_id = person.id, "person registered");
    Ok(Envelope::created(person.into()))
}

/// login
///
/// [Public Route] Exchanges email and password for a bearer token. Unknown email and
/// wrong password produce the same 401 so accounts cannot be enumerated.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 401, description = "Invalid email or password")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let person = state
        .repo
        .find_by_email(&payload.email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !verify_password(&payload.password, &person.password)? {
        return Err(AuthError::InvalidCredentials.into());
    }

    let token = state.keys.issue(person.id)?;
    Ok(Envelope::ok(LoginResponse {
        token,
        person: person.into(),
    }))
}

// --- Authenticated Handlers ---

/// get_me
///
/// [Authenticated Route] The account the bearer token belongs to.
#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "Current person", body = PersonResponse),
        (status = 401, description = "Unauthenticated")
    ),
    security(("bearer" = []))
)]
pub async fn get_me(AuthUser(person): AuthUser) -> Envelope<PersonResponse> {
    Envelope::ok(person.into())
}

/// list_persons
///
/// [Authenticated Route, roles: admin, user] Every person, ordered by id.
#[utoipa::path(
    get,
    path = "/api/v1/persons",
    responses(
        (status = 200, description = "All persons", body = [PersonResponse]),
        (status = 403, description = "Insufficient permission")
    ),
    security(("bearer" = []))
)]
pub async fn list_persons(State(state): State<AppState>) -> ApiResult<Vec<PersonResponse>> {
    let persons = state.repo.list().await?;
    Ok(Envelope::ok(persons.into_iter().map(Into::into).collect()))
}

/// get_person
///
/// [Authenticated Route, roles: admin, user] One person by id.
#[utoipa::path(
    get,
    path = "/api/v1/persons/{id}",
    params(("id" = i64, Path, description = "Person ID")),
    responses(
        (status = 200, description = "Found", body = PersonResponse),
        (status = 404, description = "Not Found")
    ),
    security(("bearer" = []))
)]
pub async fn get_person(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<PersonResponse> {
    let Path(id) = path?;
    let person = state
        .repo
        .find_by_primary_key(id)
        .await?
        .ok_or_else(|| person_not_found(id))?;
    Ok(Envelope::ok(person.into()))
}

// --- Admin Handlers ---

/// create_person
///
/// [Admin Route] Creates an account with an explicit role.
#[utoipa::path(
    post,
    path = "/api/v1/persons",
    request_body = CreatePersonRequest,
    responses(
        (status = 201, description = "Created", body = PersonResponse),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Insufficient permission"),
        (status = 409, description = "Email already registered")
    ),
    security(("bearer" = []))
)]
pub async fn create_person(
    AuthUser(admin): AuthUser,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreatePersonRequest>,
) -> ApiResult<PersonResponse> {
    let person = state
        .repo
        .create(NewPerson {
            name: payload.name,
            email: payload.email,
            password_hash: hash_password(&payload.password)?,
            role: payload.role,
            gender: payload.gender,
        })
        .await?;

    tracing::info!(person_id = person.id, created_by = admin.id, "person created");
    Ok(Envelope::created(person.into()))
}

/// update_person
///
/// [Admin Route] Partial update; omitted fields keep their value.
#[utoipa::path(
    put,
    path = "/api/v1/persons/{id}",
    params(("id" = i64, Path, description = "Person ID")),
    request_body = UpdatePersonRequest,
    responses(
        (status = 200, description = "Updated", body = PersonResponse),
        (status = 404, description = "Not Found")
    ),
    security(("bearer" = []))
)]
pub async fn update_person(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    ValidatedJson(payload): ValidatedJson<UpdatePersonRequest>,
) -> ApiResult<PersonResponse> {
    let Path(id) = path?;
    let password_hash = payload
        .password
        .as_deref()
        .map(hash_password)
        .transpose()?;

    let changes = PersonChanges {
        name: payload.name,
        email: payload.email,
        password_hash,
        role: payload.role,
        gender: payload.gender,
    };

    let person = state
        .repo
        .update(id, changes)
        .await?
        .ok_or_else(|| person_not_found(id))?;
    Ok(Envelope::ok(person.into()))
}

/// delete_person
///
/// [Admin Route] Removes an account. Tokens issued to it stop working immediately
/// because authentication re-reads the person on every request.
#[utoipa::path(
    delete,
    path = "/api/v1/persons/{id}",
    params(("id" = i64, Path, description = "Person ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Not Found")
    ),
    security(("bearer" = []))
)]
pub async fn delete_person(
    AuthUser(admin): AuthUser,
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<MessageResponse> {
    let Path(id) = path?;
    if !state.repo.delete(id).await? {
        return Err(person_not_found(id));
    }

    tracing::info!(person_id = id, deleted_by = admin.id, "person deleted");
    Ok(Envelope::ok(MessageResponse::new(format!("Person {} deleted", id))))
}
