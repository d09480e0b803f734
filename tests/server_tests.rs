use async_trait::async_trait;
use person_api::{
    AppConfig, Application, InMemoryRepository,
    models::{NewPerson, Person, PersonChanges},
    repository::{Repository, RepositoryError, RepositoryState},
    server::StartupError,
};
use serde_json::Value;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::oneshot;

// --- Repository that records shutdown ---

#[derive(Default)]
struct TrackingRepo {
    inner: InMemoryRepository,
    disconnected: AtomicBool,
}

#[async_trait]
impl Repository for TrackingRepo {
    async fn find_by_primary_key(&self, id: i64) -> Result<Option<Person>, RepositoryError> {
        self.inner.find_by_primary_key(id).await
    }
    async fn find_by_email(&self, email: &str) -> Result<Option<Person>, RepositoryError> {
        self.inner.find_by_email(email).await
    }
    async fn list(&self) -> Result<Vec<Person>, RepositoryError> {
        self.inner.list().await
    }
    async fn create(&self, person: NewPerson) -> Result<Person, RepositoryError> {
        self.inner.create(person).await
    }
    async fn update(
        &self,
        id: i64,
        changes: PersonChanges,
    ) -> Result<Option<Person>, RepositoryError> {
        self.inner.update(id, changes).await
    }
    async fn delete(&self, id: i64) -> Result<bool, RepositoryError> {
        self.inner.delete(id).await
    }
    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

fn config_on_port(port: u16) -> AppConfig {
    AppConfig {
        port,
        ..AppConfig::default()
    }
}

// --- Tests ---

#[tokio::test]
async fn test_server_serves_and_shuts_down_gracefully() {
    let repo = Arc::new(TrackingRepo::default());
    let app = Application::build(config_on_port(0), repo.clone() as RepositoryState)
        .await
        .expect("server should bind an ephemeral port");
    let port = app.local_addr().port();
    assert_ne!(port, 0);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(app.run_until(async {
        shutdown_rx.await.ok();
    }));

    let response = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/health", port))
        .send()
        .await
        .expect("req fail");
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["payload"], "ok");
    assert!(!repo.disconnected.load(Ordering::SeqCst));

    shutdown_tx.send(()).unwrap();
    server.await.unwrap().expect("server should stop cleanly");

    assert!(repo.disconnected.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_bind_failure_disconnects_repository() {
    // Hold the port so the server cannot take it
    let occupied = tokio::net::TcpListener::bind("0.0.0.0:0").await.unwrap();
    let port = occupied.local_addr().unwrap().port();

    let repo = Arc::new(TrackingRepo::default());
    let result = Application::build(config_on_port(port), repo.clone() as RepositoryState).await;

    match result {
        Err(StartupError::Bind { port: failed, .. }) => assert_eq!(failed, port),
        Err(other) => panic!("expected a bind error, got {}", other),
        Ok(_) => panic!("expected a bind error, server started"),
    }
    assert!(repo.disconnected.load(Ordering::SeqCst));
}
