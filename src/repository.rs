use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, postgres::PgPoolOptions};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::{NewPerson, Person, PersonChanges};

/// Message used whenever an insert or update collides with an existing email.
pub const EMAIL_TAKEN: &str = "Email is already registered";

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A unique constraint rejected the write.
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Repository Trait
///
/// The persistence boundary. Handlers and the authentication middleware only ever see
/// `Arc<dyn Repository>`, so the Postgres implementation can be swapped for the
/// in-memory one in tests.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Primary-key lookup used by the authentication middleware on every protected request.
    async fn find_by_primary_key(&self, id: i64) -> Result<Option<Person>, RepositoryError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Person>, RepositoryError>;
    // Ordered by id.
    async fn list(&self) -> Result<Vec<Person>, RepositoryError>;
    async fn create(&self, person: NewPerson) -> Result<Person, RepositoryError>;
    // None when no row has this id.
    async fn update(&self, id: i64, changes: PersonChanges) -> Result<Option<Person>, RepositoryError>;
    // false when no row has this id.
    async fn delete(&self, id: i64) -> Result<bool, RepositoryError>;

    /// Releases the underlying connections. Called once during shutdown.
    async fn disconnect(&self) {}
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const PERSON_COLUMNS: &str = "id, name, email, password, role, gender, created_at, updated_at";

/// PostgresRepository
///
/// The `Repository` implementation backed by a sqlx connection pool.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// connect
    ///
    /// Opens the pool and brings the schema up to date with the embedded migrations.
    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("database connection established");
        Ok(Self::new(pool))
    }
}

fn map_write_error(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(EMAIL_TAKEN.to_string())
        }
        _ => RepositoryError::Database(err),
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_by_primary_key(&self, id: i64) -> Result<Option<Person>, RepositoryError> {
        let query = format!("SELECT {PERSON_COLUMNS} FROM persons WHERE id = $1");
        let person = sqlx::query_as::<_, Person>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(person)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Person>, RepositoryError> {
        let query = format!("SELECT {PERSON_COLUMNS} FROM persons WHERE email = $1");
        let person = sqlx::query_as::<_, Person>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(person)
    }

    async fn list(&self) -> Result<Vec<Person>, RepositoryError> {
        let query = format!("SELECT {PERSON_COLUMNS} FROM persons ORDER BY id");
        let persons = sqlx::query_as::<_, Person>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(persons)
    }

    async fn create(&self, person: NewPerson) -> Result<Person, RepositoryError> {
        let query = format!(
            "INSERT INTO persons (name, email, password, role, gender) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {PERSON_COLUMNS}"
        );
        sqlx::query_as::<_, Person>(&query)
            .bind(person.name)
            .bind(person.email)
            .bind(person.password_hash)
            .bind(person.role.as_str())
            .bind(person.gender.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)
    }

    /// Uses `COALESCE` so that `None` fields keep their stored value.
    async fn update(&self, id: i64, changes: PersonChanges) -> Result<Option<Person>, RepositoryError> {
        let query = format!(
            "UPDATE persons SET \
                name = COALESCE($2, name), \
                email = COALESCE($3, email), \
                password = COALESCE($4, password), \
                role = COALESCE($5, role), \
                gender = COALESCE($6, gender), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {PERSON_COLUMNS}"
        );
        sqlx::query_as::<_, Person>(&query)
            .bind(id)
            .bind(changes.name)
            .bind(changes.email)
            .bind(changes.password_hash)
            .bind(changes.role.map(|role| role.as_str()))
            .bind(changes.gender.map(|gender| gender.as_str()))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_write_error)
    }

    async fn delete(&self, id: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM persons WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn disconnect(&self) {
        self.pool.close().await;
        tracing::info!("database connection closed");
    }
}

/// InMemoryRepository
///
/// A process-local `Repository` used by the test suite and for running the server
/// without Postgres. Mirrors the database behaviour that matters to callers: serial
/// ids, unique emails and timestamp maintenance.
#[derive(Default)]
pub struct InMemoryRepository {
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    last_id: i64,
    persons: BTreeMap<i64, Person>,
}

impl MemoryState {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.persons
            .values()
            .any(|p| p.email == email && Some(p.id) != except)
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_by_primary_key(&self, id: i64) -> Result<Option<Person>, RepositoryError> {
        Ok(self.state.read().await.persons.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Person>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.persons.values().find(|p| p.email == email).cloned())
    }

    async fn list(&self) -> Result<Vec<Person>, RepositoryError> {
        Ok(self.state.read().await.persons.values().cloned().collect())
    }

    async fn create(&self, person: NewPerson) -> Result<Person, RepositoryError> {
        let mut state = self.state.write().await;
        if state.email_taken(&person.email, None) {
            return Err(RepositoryError::Conflict(EMAIL_TAKEN.to_string()));
        }
        state.last_id += 1;
        let now = Utc::now();
        let created = Person {
            id: state.last_id,
            name: person.name,
            email: person.email,
            password: person.password_hash,
            role: person.role.as_str().to_string(),
            gender: person.gender.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };
        state.persons.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i64, changes: PersonChanges) -> Result<Option<Person>, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.persons.contains_key(&id) {
            return Ok(None);
        }
        if let Some(email) = &changes.email {
            if state.email_taken(email, Some(id)) {
                return Err(RepositoryError::Conflict(EMAIL_TAKEN.to_string()));
            }
        }
        let Some(person) = state.persons.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            person.name = name;
        }
        if let Some(email) = changes.email {
            person.email = email;
        }
        if let Some(hash) = changes.password_hash {
            person.password = hash;
        }
        if let Some(role) = changes.role {
            person.role = role.as_str().to_string();
        }
        if let Some(gender) = changes.gender {
            person.gender = gender.as_str().to_string();
        }
        person.updated_at = Utc::now();
        Ok(Some(person.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool, RepositoryError> {
        Ok(self.state.write().await.persons.remove(&id).is_some())
    }
}
