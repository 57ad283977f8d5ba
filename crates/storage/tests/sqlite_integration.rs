use chrono::Duration;
use chronicle_core::time::fixed_now;
use storage::repository::{SaveSlotRepository, Storage, StorageError};
use storage::sqlite::SqliteRepository;

#[tokio::test]
async fn sqlite_roundtrip_replaces_payload() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_roundtrip?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    assert!(repo.read_slot("cat-chronicles-save").await.unwrap().is_none());

    repo.write_slot("cat-chronicles-save", r#"{"v":1}"#, fixed_now())
        .await
        .unwrap();
    let later = fixed_now() + Duration::seconds(30);
    repo.write_slot("cat-chronicles-save", r#"{"v":2}"#, later)
        .await
        .unwrap();

    let slot = repo
        .read_slot("cat-chronicles-save")
        .await
        .unwrap()
        .expect("slot stored");
    assert_eq!(slot.key, "cat-chronicles-save");
    assert_eq!(slot.payload, r#"{"v":2}"#);
    assert_eq!(slot.updated_at, later);
}

#[tokio::test]
async fn sqlite_migrations_are_idempotent() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_migrate?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("first migrate");
    repo.migrate().await.expect("second migrate");

    let versions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(versions, 1);
}

#[tokio::test]
async fn sqlite_remove_missing_slot_is_not_found() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_remove?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    repo.write_slot("slot", "{}", fixed_now()).await.unwrap();
    repo.remove_slot("slot").await.unwrap();
    assert!(matches!(
        repo.remove_slot("slot").await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn storage_sqlite_builds_migrated_backend() {
    let storage = Storage::sqlite("sqlite:file:memdb_storage?mode=memory&cache=shared")
        .await
        .expect("storage");
    storage
        .slots
        .write_slot("slot", "{}", fixed_now())
        .await
        .unwrap();
    assert!(storage.slots.read_slot("slot").await.unwrap().is_some());
}
