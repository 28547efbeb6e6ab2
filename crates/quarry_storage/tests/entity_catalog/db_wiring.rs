#![forbid(unsafe_code)]

use std::sync::OnceLock;

use quarry_engines::{Entity, EntityShape, FieldTable, Query, QueryError};
use quarry_kernel_contracts::filter::{CatalogParameters, Comparator, FilterSet, ListParameters};
use quarry_kernel_contracts::value::{FieldValue, ValueKind};
use quarry_storage::repo::{find_entity, run_catalog, run_query, EntityRepo};
use quarry_storage::InMemoryStore;
use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
struct Supplier {
    name: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Part {
    id: i64,
    title: String,
    weight: u32,
    supplier: Option<Supplier>,
}

impl Entity for Part {
    fn shape() -> &'static EntityShape<Self> {
        static SHAPE: OnceLock<EntityShape<Part>> = OnceLock::new();
        SHAPE.get_or_init(|| {
            let supplier = FieldTable::<Supplier>::new("Supplier").field(
                "name",
                ValueKind::Text,
                |s| FieldValue::text(s.name.clone()),
            );
            EntityShape::new(
                "parts",
                "Part",
                FieldTable::new("Part")
                    .field("id", ValueKind::I64, |p: &Part| FieldValue::I64(p.id))
                    .field("title", ValueKind::Text, |p: &Part| {
                        FieldValue::text(p.title.clone())
                    })
                    .field("weight", ValueKind::U32, |p: &Part| FieldValue::U32(p.weight))
                    .nested("supplier", |p: &Part| p.supplier.as_ref(), &supplier),
            )
            .with_identity(|p| p.id)
        })
    }
}

async fn seeded_store(n: i64) -> InMemoryStore<String, u32> {
    let store = InMemoryStore::new_in_memory();
    for id in 1..=n {
        store
            .insert_entity(Part {
                id,
                title: format!("bolt {id:02}"),
                weight: (id * 10) as u32,
                supplier: (id % 2 == 0).then(|| Supplier {
                    name: "Acme".to_string(),
                }),
            })
            .await
            .unwrap();
    }
    store
}

#[tokio::test]
async fn at_catalog_db_01_find_by_id_round_trips_typed_row() {
    let store = seeded_store(3).await;
    let repo: &dyn EntityRepo = &store;
    let part = find_entity::<Part>(repo, 2).await.unwrap().unwrap();
    assert_eq!(part.title, "bolt 02");
    assert!(find_entity::<Part>(repo, 99).await.unwrap().is_none());
}

#[tokio::test]
async fn at_catalog_db_02_list_filters_then_ranges() {
    let store = seeded_store(12).await;
    let repo: &dyn EntityRepo = &store;
    let filters = FilterSet::new()
        .with("supplierName", json!("acme"))
        .with("minWeight", json!("40"));
    let params = ListParameters {
        filters,
        ..ListParameters::range(1, 2)
    };
    let query = Query::<Part>::new()
        .try_filter_as(
            &params.filters,
            "supplier.name",
            "supplierName",
            Comparator::Like,
        )
        .unwrap()
        .try_filter_as(
            &params.filters,
            "weight",
            "minWeight",
            Comparator::GreaterThanOrEqual,
        )
        .unwrap()
        .apply_range(params.row_range());
    let ids: Vec<i64> = run_query(repo, &query)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    // 4, 6, 8, 10, 12 match; skip one, take two.
    assert_eq!(ids, vec![6, 8]);
}

#[tokio::test]
async fn at_catalog_db_03_bad_field_path_is_reported_before_execution() {
    let err = Query::<Part>::new()
        .try_filter(&FilterSet::new(), "supplier.city", Comparator::Equals)
        .unwrap_err();
    assert_eq!(
        err,
        QueryError::FieldNotFound {
            type_name: "Supplier",
            field: "city".to_string(),
        }
    );
}

#[tokio::test]
async fn at_catalog_db_04_catalog_overflow_policy() {
    let store = seeded_store(20).await;
    let repo: &dyn EntityRepo = &store;
    let all = Query::<Part>::new();

    let refused = run_catalog(
        repo,
        &all,
        &CatalogParameters::new(None, 10),
        |p| p.id,
        |p| Some(p.title.clone()),
    )
    .await
    .unwrap();
    assert!(refused.should_use_criteria);
    assert!(refused.entries.is_empty());

    let truncated = run_catalog(
        repo,
        &all,
        &CatalogParameters::new(Some("BOLT".to_string()), 10),
        |p| p.id,
        |p| Some(p.title.clone()),
    )
    .await
    .unwrap();
    assert!(!truncated.should_use_criteria);
    assert_eq!(truncated.entries.len(), 10);
    assert_eq!(truncated.entries[0].display.as_deref(), Some("bolt 01"));
    assert_eq!(truncated.entries[9].display.as_deref(), Some("bolt 10"));
}
