#![forbid(unsafe_code)]

use chrono::{TimeZone, Utc};
use quarry_kernel_contracts::audit::{
    OperationHistoryId, OperationHistoryInput, OperationType, ServiceHistoryId,
    ServiceHistoryInput,
};
use quarry_storage::repo::{AuditHistoryRepo, UserRepo};
use quarry_storage::{InMemoryStore, StorageError};

#[derive(Debug, Clone, PartialEq)]
struct Operator {
    login: String,
}

fn operator(login: &str) -> Operator {
    Operator {
        login: login.to_string(),
    }
}

fn session(secs: i64, by: Option<u64>) -> ServiceHistoryInput<u64> {
    ServiceHistoryInput::v1(
        "IInvoiceService\\Approve".to_string(),
        Utc.timestamp_opt(secs, 0).unwrap(),
        by,
        by.map(|_| "Ada".to_string()),
    )
    .unwrap()
}

fn operation(
    session: ServiceHistoryId,
    table: &str,
    entity_id: i64,
    kind: OperationType,
) -> OperationHistoryInput {
    OperationHistoryInput::v1(
        session,
        table.to_string(),
        "Invoice".to_string(),
        Some(entity_id),
        kind,
        "{\"total\":1}".to_string(),
        "{\"total\":2}".to_string(),
    )
    .unwrap()
}

async fn store_with_operator() -> InMemoryStore<Operator, u64> {
    let store = InMemoryStore::new_in_memory();
    store.insert_user(1, operator("ada")).await.unwrap();
    store
}

#[tokio::test]
async fn at_audit_db_01_session_chain_is_append_only() {
    let store = store_with_operator().await;
    let repo: &dyn AuditHistoryRepo<u64> = &store;

    let s = repo.append_service_history(session(100, Some(1))).await.unwrap();
    let first = repo
        .append_operation_history(operation(s.id, "invoices", 5, OperationType::Added))
        .await
        .unwrap();
    let second = repo
        .append_operation_history(operation(s.id, "invoices", 5, OperationType::Modified))
        .await
        .unwrap();
    assert_eq!(first.id, OperationHistoryId(1));
    assert_eq!(second.id, OperationHistoryId(2));

    assert!(matches!(
        store.attempt_overwrite_operation_history(first.id),
        Err(StorageError::AppendOnlyViolation { .. })
    ));
    assert!(matches!(
        store.attempt_overwrite_service_history(s.id),
        Err(StorageError::AppendOnlyViolation { .. })
    ));
    assert_eq!(store.service_history_rows().await.len(), 1);
    assert_eq!(store.operation_history_rows().await.len(), 2);
}

#[tokio::test]
async fn at_audit_db_02_operation_fk_to_session_enforced() {
    let store = store_with_operator().await;
    let repo: &dyn AuditHistoryRepo<u64> = &store;
    let err = repo
        .append_operation_history(operation(
            ServiceHistoryId(42),
            "invoices",
            5,
            OperationType::Deleted,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ForeignKeyViolation { .. }));
}

#[tokio::test]
async fn at_audit_db_03_session_fk_to_user_enforced() {
    let store = store_with_operator().await;
    let repo: &dyn AuditHistoryRepo<u64> = &store;
    let err = repo
        .append_service_history(session(1, Some(77)))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ForeignKeyViolation { .. }));
    assert!(repo.append_service_history(session(1, None)).await.is_ok());
}

#[tokio::test]
async fn at_audit_db_04_entity_sessions_are_newest_first_and_scoped_by_table() {
    let store = store_with_operator().await;
    let repo: &dyn AuditHistoryRepo<u64> = &store;

    let older = repo.append_service_history(session(100, Some(1))).await.unwrap();
    let newer = repo.append_service_history(session(200, Some(1))).await.unwrap();
    let same_time = repo.append_service_history(session(200, None)).await.unwrap();
    let unrelated = repo.append_service_history(session(300, None)).await.unwrap();

    for s in [&older, &newer, &same_time] {
        repo.append_operation_history(operation(s.id, "invoices", 5, OperationType::Modified))
            .await
            .unwrap();
    }
    repo.append_operation_history(operation(unrelated.id, "orders", 5, OperationType::Modified))
        .await
        .unwrap();

    let ids: Vec<ServiceHistoryId> = repo
        .service_histories_for_entity("invoices", 5)
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.id)
        .collect();
    assert_eq!(ids, vec![same_time.id, newer.id, older.id]);
    assert!(repo
        .service_histories_for_entity("invoices", 6)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn at_audit_db_05_operation_chain_read_in_append_order() {
    let store = store_with_operator().await;
    let repo: &dyn AuditHistoryRepo<u64> = &store;
    let a = repo.append_service_history(session(1, None)).await.unwrap();
    let b = repo.append_service_history(session(2, None)).await.unwrap();
    repo.append_operation_history(operation(a.id, "invoices", 1, OperationType::Added))
        .await
        .unwrap();
    repo.append_operation_history(operation(b.id, "invoices", 1, OperationType::Modified))
        .await
        .unwrap();
    repo.append_operation_history(operation(a.id, "invoices", 2, OperationType::Deleted))
        .await
        .unwrap();

    let chain = repo.operation_histories(a.id).await.unwrap();
    let kinds: Vec<OperationType> = chain.iter().map(|o| o.operation_type.clone()).collect();
    assert_eq!(kinds, vec![OperationType::Added, OperationType::Deleted]);
    assert!(repo.service_history(ServiceHistoryId(9)).await.unwrap().is_none());
}

#[tokio::test]
async fn at_audit_db_06_user_lookup() {
    let store = store_with_operator().await;
    let users: &dyn UserRepo<Operator, u64> = &store;
    assert_eq!(users.find_user(&1).await.unwrap(), Some(operator("ada")));
    assert_eq!(users.find_user(&2).await.unwrap(), None);
    assert!(matches!(
        store.insert_user(1, operator("eve")).await,
        Err(StorageError::DuplicateKey { .. })
    ));
}
