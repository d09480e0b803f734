use chrono::Utc;
use person_api::{
    models::{Gender, NewPerson, PersonChanges, Role},
    repository::{
        EMAIL_TAKEN, InMemoryRepository, PostgresRepository, Repository, RepositoryError,
    },
};
use sqlx::PgPool;

// --- Test Context and Setup ---

/// A simple structure to hold the database pool for testing
struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

/// Emails are unique per run so the Postgres tests can share a database.
fn unique_email(label: &str) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{}-{}@test.com", label, nanos)
}

fn new_person(email: &str, role: Role) -> NewPerson {
    NewPerson {
        name: "Repository Test".to_string(),
        email: email.to_string(),
        password_hash: "$argon2id$stub".to_string(),
        role,
        gender: Gender::Other,
    }
}

// --- Shared Behaviour ---

async fn check_create_and_find(repo: &dyn Repository) {
    let email = unique_email("create");
    let created = repo.create(new_person(&email, Role::User)).await.unwrap();
    assert_eq!(created.email, email);
    assert_eq!(created.role, "user");
    assert_eq!(created.gender, "other");

    let by_id = repo.find_by_primary_key(created.id).await.unwrap();
    assert_eq!(by_id.as_ref().map(|p| p.id), Some(created.id));

    let by_email = repo.find_by_email(&email).await.unwrap();
    assert_eq!(by_email.map(|p| p.id), Some(created.id));

    assert!(repo.find_by_primary_key(i64::MAX).await.unwrap().is_none());
}

async fn check_duplicate_email_conflicts(repo: &dyn Repository) {
    let email = unique_email("dup");
    repo.create(new_person(&email, Role::User)).await.unwrap();

    let result = repo.create(new_person(&email, Role::Admin)).await;

    match result {
        Err(RepositoryError::Conflict(message)) => assert_eq!(message, EMAIL_TAKEN),
        other => panic!("expected a conflict, got {:?}", other.map(|p| p.id)),
    }
}

async fn check_partial_update(repo: &dyn Repository) {
    let email = unique_email("update");
    let created = repo.create(new_person(&email, Role::User)).await.unwrap();

    let updated = repo
        .update(
            created.id,
            PersonChanges {
                name: Some("Updated".to_string()),
                role: Some(Role::Admin),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .expect("person should exist");

    assert_eq!(updated.name, "Updated");
    assert_eq!(updated.role, "admin");
    // Untouched fields keep their values
    assert_eq!(updated.email, email);
    assert_eq!(updated.password, created.password);
    assert!(updated.updated_at >= created.updated_at);

    let missing = repo
        .update(i64::MAX, PersonChanges::default())
        .await
        .unwrap();
    assert!(missing.is_none());
}

async fn check_delete(repo: &dyn Repository) {
    let created = repo
        .create(new_person(&unique_email("delete"), Role::User))
        .await
        .unwrap();

    assert!(repo.delete(created.id).await.unwrap());
    assert!(repo.find_by_primary_key(created.id).await.unwrap().is_none());
    assert!(!repo.delete(created.id).await.unwrap());
}

// --- In-Memory Tests ---

#[tokio::test]
async fn test_in_memory_create_and_find() {
    check_create_and_find(&InMemoryRepository::new()).await;
}

#[tokio::test]
async fn test_in_memory_duplicate_email() {
    check_duplicate_email_conflicts(&InMemoryRepository::new()).await;
}

#[tokio::test]
async fn test_in_memory_partial_update() {
    check_partial_update(&InMemoryRepository::new()).await;
}

#[tokio::test]
async fn test_in_memory_delete() {
    check_delete(&InMemoryRepository::new()).await;
}

#[tokio::test]
async fn test_in_memory_ids_are_serial_and_list_is_ordered() {
    let repo = InMemoryRepository::new();
    let first = repo.create(new_person("a@test.com", Role::User)).await.unwrap();
    let second = repo.create(new_person("b@test.com", Role::User)).await.unwrap();
    repo.delete(first.id).await.unwrap();
    let third = repo.create(new_person("c@test.com", Role::User)).await.unwrap();

    // Ids are never reused
    assert!(third.id > second.id);
    let ids: Vec<i64> = repo.list().await.unwrap().iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![second.id, third.id]);
}

#[tokio::test]
async fn test_in_memory_update_to_taken_email_conflicts() {
    let repo = InMemoryRepository::new();
    repo.create(new_person("taken@test.com", Role::User)).await.unwrap();
    let other = repo.create(new_person("other@test.com", Role::User)).await.unwrap();

    let result = repo
        .update(
            other.id,
            PersonChanges {
                email: Some("taken@test.com".to_string()),
                ..Default::default()
            },
        )
        .await;

    assert!(matches!(result, Err(RepositoryError::Conflict(_))));
}

#[tokio::test]
async fn test_in_memory_update_missing_id_is_none_even_with_taken_email() {
    let repo = InMemoryRepository::new();
    let existing = repo.create(new_person("taken@test.com", Role::User)).await.unwrap();

    let result = repo
        .update(
            existing.id + 100,
            PersonChanges {
                email: Some("taken@test.com".to_string()),
                ..Default::default()
            },
        )
        .await;

    assert!(matches!(result, Ok(None)));
}

// --- Postgres Tests (need DATABASE_URL) ---

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn test_postgres_create_and_find() {
    let ctx = DbTestContext::setup().await;
    check_create_and_find(&ctx.repository()).await;
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn test_postgres_duplicate_email() {
    let ctx = DbTestContext::setup().await;
    check_duplicate_email_conflicts(&ctx.repository()).await;
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn test_postgres_partial_update() {
    let ctx = DbTestContext::setup().await;
    check_partial_update(&ctx.repository()).await;
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn test_postgres_delete() {
    let ctx = DbTestContext::setup().await;
    check_delete(&ctx.repository()).await;
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn test_postgres_list_is_ordered_by_id() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    repo.create(new_person(&unique_email("list"), Role::User))
        .await
        .unwrap();

    let ids: Vec<i64> = repo.list().await.unwrap().iter().map(|p| p.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
}
