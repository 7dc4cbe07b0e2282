use accounts::types::User;
use accounts::SessionStore;
use tempfile::tempdir;

use super::*;

fn user() -> User {
    serde_json::from_value(serde_json::json!({ "id": 7, "email": "a@b.com", "first_name": "Анна" })).unwrap()
}

#[test]
fn missing_file_reads_as_empty() {
    let dir = tempdir().unwrap();
    let storage = FileStorage::new(dir.path().join("session.json"));
    assert_eq!(storage.get("auth_token").unwrap(), None);
    storage.remove("auth_token").unwrap();
    assert!(!storage.path().exists());
}

#[test]
fn values_survive_a_new_handle() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("session.json");
    FileStorage::new(&path).set("auth_token", "tok").unwrap();

    assert_eq!(FileStorage::new(&path).get("auth_token").unwrap().as_deref(), Some("tok"));
}

#[test]
fn session_round_trip_then_clear_removes_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("session.json");
    let session = SessionStore::new(FileStorage::new(&path));

    session.save("tok", &user()).unwrap();
    let reopened = SessionStore::new(FileStorage::new(&path));
    assert_eq!(reopened.token().as_deref(), Some("tok"));
    assert_eq!(reopened.user().map(|u| u.email), Some("a@b.com".to_owned()));

    reopened.clear().unwrap();
    assert!(!path.exists());
    assert!(!session.is_authenticated());
}

#[test]
fn corrupt_file_is_an_access_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, "not json").unwrap();

    let err = FileStorage::new(&path).get("auth_token").unwrap_err();
    assert!(matches!(err, StorageError::Access(_)), "{err:?}");
}
