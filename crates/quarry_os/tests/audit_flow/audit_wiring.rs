#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use quarry_engines::{Entity, EntityChange, EntityShape, FieldTable};
use quarry_kernel_contracts::audit::{ActionContext, ActionType, AuditUser, OperationType};
use quarry_kernel_contracts::filter::ListParameters;
use quarry_kernel_contracts::value::{FieldValue, ValueKind};
use quarry_os::{
    ActionTypeGate, AuditError, AuditServiceFactory, AuditWiringConfig, CancelSignal,
    CurrentUserProvider, ScopedCurrentUser,
};
use quarry_storage::InMemoryStore;

const SERVICE_USER: u64 = 1;
const ADMIN: u64 = 10;
const CLERK: u64 = 20;

#[derive(Debug, Clone)]
struct Staff {
    id: u64,
    name: String,
}

impl AuditUser<u64> for Staff {
    fn user_id(&self) -> u64 {
        self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
struct Invoice {
    id: i64,
    number: String,
    total: i64,
}

impl Entity for Invoice {
    fn shape() -> &'static EntityShape<Self> {
        static SHAPE: OnceLock<EntityShape<Invoice>> = OnceLock::new();
        SHAPE.get_or_init(|| {
            EntityShape::new(
                "invoices",
                "Invoice",
                FieldTable::new("Invoice")
                    .field("id", ValueKind::I64, |i: &Invoice| FieldValue::I64(i.id))
                    .field("number", ValueKind::Text, |i: &Invoice| {
                        FieldValue::text(i.number.clone())
                    })
                    .field("total", ValueKind::I64, |i: &Invoice| FieldValue::I64(i.total)),
            )
            .with_identity(|i| i.id)
        })
    }
}

fn invoice(id: i64, total: i64) -> Invoice {
    Invoice {
        id,
        number: format!("INV-{id}"),
        total,
    }
}

struct World {
    store: Arc<InMemoryStore<Staff, u64>>,
    factory: AuditServiceFactory<Staff, u64>,
}

async fn world(user: Option<u64>) -> (World, Arc<ScopedCurrentUser<u64>>) {
    let store: Arc<InMemoryStore<Staff, u64>> = Arc::new(InMemoryStore::new_in_memory());
    for (id, name) in [(SERVICE_USER, "system"), (ADMIN, "Ada"), (CLERK, "Linus")] {
        store
            .insert_user(
                id,
                Staff {
                    id,
                    name: name.to_string(),
                },
            )
            .await
            .unwrap();
    }
    store.insert_entity(invoice(100, 50)).await.unwrap();
    store.insert_entity(invoice(200, 75)).await.unwrap();

    let current = Arc::new(ScopedCurrentUser::new(user, SERVICE_USER));
    let gate = ActionTypeGate::new(current.clone(), BTreeSet::from([ADMIN]));
    let factory = AuditServiceFactory::new(
        AuditWiringConfig::mvp_v1(true),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(gate),
    );
    (World { store, factory }, current)
}

fn approve() -> ActionContext {
    ActionContext::v1("IInvoiceService", "Approve", ActionType::OnlyAdmins).unwrap()
}

#[tokio::test]
async fn at_flow_01_session_bracketed_mutations_are_readable_per_entity() {
    let (w, current) = world(Some(ADMIN)).await;
    let mut tracker = w.factory.scoped(current);
    let session = tracker
        .begin_session(Some(&approve()), &CancelSignal::never())
        .await
        .unwrap()
        .recorded()
        .unwrap();
    assert_eq!(session.changed_by_name.as_deref(), Some("Ada"));

    let before = invoice(100, 50);
    let after = invoice(100, 65);
    tracker
        .record_operation(
            &EntityChange::capture(OperationType::Modified, Some(&before), Some(&after)).unwrap(),
            &CancelSignal::never(),
        )
        .await
        .unwrap();
    let added = invoice(300, 10);
    tracker
        .record_operation(
            &EntityChange::capture(OperationType::Added, None, Some(&added)).unwrap(),
            &CancelSignal::never(),
        )
        .await
        .unwrap();

    let reader = w.factory.history_reader();
    let sessions = reader
        .list_service_histories_for_entity::<Invoice>(100, &ListParameters::default())
        .await
        .unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].name, "IInvoiceService\\Approve");

    let ops = reader
        .list_operation_histories_for_entity::<Invoice>(100, session.id, &ListParameters::default())
        .await
        .unwrap();
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[0].old_values, "{\"total\":50}");
    assert_eq!(ops[0].new_values, "{\"total\":65}");

    let untouched = reader
        .list_operation_histories_for_entity::<Invoice>(200, session.id, &ListParameters::default())
        .await
        .unwrap();
    assert!(untouched.is_empty());

    assert!(matches!(
        reader
            .list_operation_histories_for_entity::<Invoice>(
                999,
                session.id,
                &ListParameters::default()
            )
            .await,
        Err(AuditError::EntityNotFound { .. })
    ));
}

#[tokio::test]
async fn at_flow_02_denied_session_records_nothing() {
    let (w, current) = world(Some(CLERK)).await;
    let mut tracker = w.factory.scoped(current);
    let err = tracker
        .begin_session(Some(&approve()), &CancelSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::PermissionDenied(_)));
    assert!(w.store.service_history_rows().await.is_empty());

    let before = invoice(100, 50);
    let err = tracker
        .record_operation(
            &EntityChange::capture(OperationType::Deleted, Some(&before), None).unwrap(),
            &CancelSignal::never(),
        )
        .await
        .unwrap_err();
    assert_eq!(err, AuditError::MissingServiceHistory);
}

#[tokio::test]
async fn at_flow_03_service_user_mode_attributes_background_work() {
    let (w, current) = world(None).await;
    current.enable_service_user_mode();
    let mut tracker = w.factory.scoped(current.clone());
    let nightly = ActionContext::v1("IInvoiceService", "CloseDay", ActionType::default()).unwrap();
    let session = tracker
        .begin_session(Some(&nightly), &CancelSignal::never())
        .await
        .unwrap()
        .recorded()
        .unwrap();
    assert_eq!(session.changed_by, Some(SERVICE_USER));
    assert_eq!(session.changed_by_name.as_deref(), Some("system"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_flow_04_concurrent_invocations_get_independent_sessions() {
    let (w, _) = world(Some(ADMIN)).await;
    let factory = Arc::new(w.factory);
    let mut tasks = Vec::new();
    for total in [1i64, 2, 3, 4] {
        let factory = Arc::clone(&factory);
        tasks.push(tokio::spawn(async move {
            let current: Arc<dyn CurrentUserProvider<u64>> =
                Arc::new(ScopedCurrentUser::new(Some(ADMIN), SERVICE_USER));
            let mut tracker = factory.scoped(current);
            let session = tracker
                .begin_session(Some(&approve()), &CancelSignal::never())
                .await?
                .recorded()
                .ok_or(AuditError::MissingServiceHistory)?;
            let before = invoice(200, 75);
            let after = invoice(200, 75 + total);
            tracker
                .record_operation(
                    &EntityChange::capture(OperationType::Modified, Some(&before), Some(&after))?,
                    &CancelSignal::never(),
                )
                .await?;
            Ok::<_, AuditError>(session.id)
        }));
    }
    let mut ids = BTreeSet::new();
    for task in tasks {
        ids.insert(task.await.unwrap().unwrap());
    }
    assert_eq!(ids.len(), 4);
    assert_eq!(w.store.operation_history_rows().await.len(), 4);
}
