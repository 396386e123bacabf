use std::sync::Arc;
use std::time::Duration;

use listy_shared::capabilities::MemoryStore;
use listy_shared::{
    ClientConfig, ErrorKind, InMemoryBackend, ListyCore, Procedure, RecipeApi, RpcError,
    RpcErrorCode, ToastKind,
};

fn offline_core(backend: Arc<InMemoryBackend>) -> ListyCore {
    ListyCore::assemble(
        ClientConfig::default(),
        backend.clone(),
        backend,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
        true,
    )
    .unwrap()
}

#[tokio::test]
async fn test_shopping_trip() {
    let backend = Arc::new(InMemoryBackend::new());
    let core = offline_core(backend.clone());
    core.list.refresh().await.unwrap();

    for name in ["milk", "eggs", "flour"] {
        core.list.add_item(name).await.unwrap();
    }
    let list = core.list.list().await.unwrap();
    assert_eq!(list.len(), 3);
    assert!(list.ingredients.iter().all(|i| !i.id.is_placeholder()));

    // tick off two items, then clear them
    core.list.check(&list.ingredients[0].id, true).await.unwrap();
    core.list.check(&list.ingredients[2].id, true).await.unwrap();
    core.list.remove_checked().await.unwrap();

    let list = core.list.list().await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list.ingredients[0].name, "eggs");
    assert_eq!(list, backend.list_by_user_id().await.unwrap());
    assert!(core.toasts.is_empty());
}

#[tokio::test]
async fn test_check_all_then_uncheck_all() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.seed_list(&["milk", "eggs", "salt"]).await.unwrap();
    let core = offline_core(backend.clone());

    let observed = core.list.refresh().await.unwrap();
    core.list.check_all(&observed).await.unwrap();
    let checked = core.list.list().await.unwrap();
    assert!(checked.all_checked());

    core.list.check_all(&checked).await.unwrap();
    assert!(core.list.list().await.unwrap().none_checked());
    assert_eq!(backend.call_count(Procedure::ListCheckMany).await, 2);
    assert_eq!(backend.call_count(Procedure::ListCheck).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_interleaved_mutations_settle_to_server_state() {
    let backend = Arc::new(InMemoryBackend::new().with_latency(Duration::from_millis(20)));
    backend.seed_list(&["milk", "eggs"]).await.unwrap();
    let core = offline_core(backend.clone());
    let list = core.list.refresh().await.unwrap();
    let (milk, eggs) = (list.ingredients[0].id.clone(), list.ingredients[1].id.clone());

    let (a, b, c) = tokio::join!(
        core.list.add_item("bread"),
        core.list.check(&milk, true),
        core.list.check(&eggs, true),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();
    core.list.refresh().await.unwrap();

    assert_eq!(core.list.list().await.unwrap(), backend.list_by_user_id().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_slow_failure_after_newer_write_settles_to_server_state() {
    let backend = Arc::new(
        InMemoryBackend::new().with_delay(Procedure::ListCheck, Duration::from_millis(100)),
    );
    backend.seed_list(&["milk", "eggs"]).await.unwrap();
    backend
        .fail_next(Procedure::ListCheck, RpcError::new(RpcErrorCode::Network, "offline"))
        .await;
    let core = offline_core(backend.clone());
    let list = core.list.refresh().await.unwrap();
    let milk = list.ingredients[0].id.clone();

    let (checked, added) = tokio::join!(core.list.check(&milk, true), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        core.list.add_item("bread").await
    });
    assert!(checked.is_err());
    added.unwrap();

    // no manual refresh: the failed check must not leave the older list behind
    let server = backend.list_by_user_id().await.unwrap();
    let names: Vec<&str> = server.ingredients.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["milk", "eggs", "bread"]);
    assert_eq!(core.list.list().await.unwrap(), server);
    assert!(!core.list.is_stale().await);
    assert_eq!(core.toasts.drain().len(), 1);
}

#[tokio::test]
async fn test_failure_mid_session_keeps_earlier_edits() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.seed_list(&["milk"]).await.unwrap();
    let core = offline_core(backend.clone());
    let list = core.list.refresh().await.unwrap();
    core.list.check(&list.ingredients[0].id, true).await.unwrap();
    let before = core.list.list().await.unwrap();

    backend
        .fail_next(Procedure::ListClear, RpcError::new(RpcErrorCode::Network, "offline"))
        .await;
    let err = core.list.remove_checked().await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(core.list.list().await.unwrap(), before);
    let toasts = core.toasts.drain();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].kind, ToastKind::Error);

    // retrying by hand works once the backend recovers
    core.list.remove_checked().await.unwrap();
    assert!(core.list.list().await.unwrap().is_empty());
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_by_recipe_preference_persists_across_restarts() {
    use listy_shared::capabilities::SqliteStore;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.db");
    let backend = Arc::new(InMemoryBackend::new());

    let open = |backend: Arc<InMemoryBackend>| {
        ListyCore::assemble(
            ClientConfig::default(),
            backend.clone(),
            backend,
            Arc::new(SqliteStore::open(&path).unwrap()),
            Arc::new(MemoryStore::new()),
            true,
        )
        .unwrap()
    };

    let first = open(backend.clone());
    assert!(!first.list.by_recipe());
    first.list.set_by_recipe(true).unwrap();
    drop(first);

    let second = open(backend);
    assert!(second.list.by_recipe());
}
