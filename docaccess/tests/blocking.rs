use docaccess::{
    memory::{InMemoryStore, InMemoryStoreBuilder},
    prelude::*,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    #[serde(rename = "_id")]
    id: i64,
    customer: String,
    #[serde(default)]
    lines: Vec<String>,
}

impl Entity for Order {
    type Id = i64;

    fn id(&self) -> &i64 {
        &self.id
    }
}

fn order(id: i64, customer: &str) -> Order {
    Order { id, customer: customer.to_string(), lines: Vec::new() }
}

fn open() -> BlockingDocumentStore<InMemoryStore> {
    BlockingDocumentStore::connect(InMemoryStore::builder().database("shop"), Decoder::lenient()).unwrap()
}

#[test]
fn blocking_calls_mirror_the_async_surface() {
    let store = open();
    let orders = store.collection::<Order>("orders").unwrap();

    orders.insert_many(&[order(1, "ann"), order(2, "bob")]).unwrap();
    assert!(orders.push(Filter::eq("_id", 1_i64), "lines", "widget").unwrap());
    assert!(!orders.add_to_set(Filter::eq("_id", 1_i64), "lines", "widget").unwrap());

    let ann = orders.find_one(Filter::eq("customer", "ann")).unwrap().unwrap();
    assert_eq!(ann.lines, vec!["widget"]);

    assert_eq!(orders.select_by_key_value("customer", "bob").unwrap(), vec![order(2, "bob")]);
    assert!(orders.delete_one(Filter::eq("_id", 2_i64)).unwrap());
    assert_eq!(orders.select_all().unwrap().len(), 1);
}

#[test]
fn blocking_bulk_write_upserts() {
    let store = open();
    let orders = store.collection::<Order>("orders").unwrap();

    assert!(orders
        .bulk_write(Order::id_filter, &[order(1, "ann"), order(2, "bob")])
        .unwrap());
    assert!(!orders.bulk_write(Order::id_filter, &[]).unwrap());
    assert_eq!(orders.select_with_limit(Filter::all(), 10).unwrap().len(), 2);
}

#[test]
fn collections_are_unavailable_after_shutdown() {
    let mut store = open();
    store
        .collection::<Order>("orders")
        .unwrap()
        .insert_one(&order(1, "ann"))
        .unwrap();

    store.shutdown().unwrap();

    assert!(matches!(
        store.collection::<Order>("orders"),
        Err(DocumentStoreError::Backend(_))
    ));
}

#[test]
fn stores_are_built_from_configuration() {
    let config = StoreConfig {
        ignore_unknown_fields: false,
        ..StoreConfig::new("memory://local", "inventory")
    };

    let store = BlockingDocumentStore::connect(
        InMemoryStoreBuilder::from_config(&config).unwrap(),
        config.decoder(),
    )
    .unwrap();

    assert_eq!(store.store().unwrap().backend().database(), "inventory");
    assert_eq!(store.store().unwrap().decoder().unknown_fields(), UnknownFields::Reject);
}

#[test]
fn malformed_configuration_is_rejected() {
    let config = StoreConfig::new("not a connection string", "inventory");

    let err = InMemoryStoreBuilder::from_config(&config).unwrap_err();

    assert!(matches!(err, DocumentStoreError::Configuration(_)));
}
