use super::*;
use crate::state::test_helpers;

#[tokio::test]
async fn create_space_assigns_key_and_lists_it() {
    let store = InMemorySpaceStore::new();
    let (key, space) = store.create_space(test_helpers::dummy_space("earth")).await.unwrap();

    let listed = store.list_spaces().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed.get(&key), Some(&space));
    assert_eq!(store.create_calls(), 1);
    assert_eq!(store.list_calls(), 1);
}

#[tokio::test]
async fn create_space_stamps_where_hashes() {
    let store = InMemorySpaceStore::new();
    let mut spec = test_helpers::dummy_multi_space("earth");
    spec.wheres.push(test_helpers::dummy_where("a", 1.0, 1.0));
    spec.wheres.push(test_helpers::dummy_where("a", 1.0, 1.0));

    let (_, created) = store.create_space(spec).await.unwrap();
    assert!(created.wheres.iter().all(WhereEntry::is_persisted));
    assert_ne!(created.wheres[0].hash, created.wheres[1].hash, "identical placements get distinct hashes");
    assert_eq!(created.wheres[0].hash.len(), 64);
}

#[tokio::test]
async fn create_space_rejects_short_name_and_empty_size() {
    let store = InMemorySpaceStore::new();

    let err = store.create_space(test_helpers::dummy_space("ab")).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidSpec(_)));

    let mut spec = test_helpers::dummy_space("earth");
    spec.surface.size = crate::state::Coord::default();
    let err = store.create_space(spec).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidSpec(_)));

    assert!(store.list_spaces().await.unwrap().is_empty());
}

#[tokio::test]
async fn offline_store_fails_every_call() {
    let store = InMemorySpaceStore::new();
    store.set_offline(true);

    assert!(matches!(store.list_spaces().await, Err(StoreError::BackendUnavailable(_))));
    assert!(matches!(
        store.create_space(test_helpers::dummy_space("earth")).await,
        Err(StoreError::BackendUnavailable(_))
    ));

    store.set_offline(false);
    assert!(store.list_spaces().await.is_ok());
}

#[tokio::test]
async fn add_and_delete_where_emit_signals() {
    let store = InMemorySpaceStore::new();
    let (key, _) = store.create_space(test_helpers::dummy_space("earth")).await.unwrap();
    let mut rx = store.subscribe();

    let hash = store.add_where(&key, test_helpers::dummy_where("a", 5.0, 6.0)).await.unwrap();
    match rx.recv().await.unwrap() {
        StoreSignal::NewWhere { space_key, entry } => {
            assert_eq!(space_key, key);
            assert_eq!(entry.hash, hash);
        }
        other => panic!("unexpected signal: {other:?}"),
    }

    store.delete_where(&key, &hash).await.unwrap();
    assert_eq!(rx.recv().await.unwrap(), StoreSignal::DeleteWhere { space_key: key.clone(), hash });

    let listed = store.list_spaces().await.unwrap();
    assert!(listed[&key].wheres.is_empty());
}

#[tokio::test]
async fn add_where_to_unknown_space_is_not_found() {
    let store = InMemorySpaceStore::new();
    let err = store.add_where("missing", test_helpers::dummy_where("a", 0.0, 0.0)).await.unwrap_err();
    assert!(matches!(err, StoreError::SpaceNotFound(k) if k == "missing"));
}

#[tokio::test]
async fn delete_unknown_hash_is_silent() {
    let store = InMemorySpaceStore::new();
    let (key, _) = store.create_space(test_helpers::dummy_space("earth")).await.unwrap();
    let mut rx = store.subscribe();

    store.delete_where(&key, "nope").await.unwrap();
    assert!(rx.try_recv().is_err());
}

#[test]
fn backend_unavailable_is_retryable() {
    use crate::error::ErrorCode;

    let err = StoreError::BackendUnavailable("down".into());
    assert_eq!(err.error_code(), "E_BACKEND_UNAVAILABLE");
    assert!(err.retryable());
    assert!(!StoreError::InvalidSpec("bad".into()).retryable());
}
