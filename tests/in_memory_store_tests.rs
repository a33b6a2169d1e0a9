use chrono::Utc;
use docwire::codec::{CodecError, DefaultJsonSerializer, JsonSerializer, RawStringTranscoder};
use docwire::prelude::*;
use docwire::result::SubdocStatus;
use docwire::{ErrorKind, Transcoder};
use serde_json::{Value, json};
use std::result::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn collection(dispatcher: Arc<InMemoryDispatcher>) -> Collection {
    let topology = StaticTopology::with_bucket(
        BucketConfig::new("travel", 1).with_capability(BucketCapability::CreateAsDeleted),
    );
    Collection::new(
        CollectionIdentifier::new("travel", "inventory", "hotel"),
        Arc::new(ClientEnvironment::new()),
        dispatcher,
        Arc::new(topology),
    )
}

/// Counts decodes and tags every decoded object so its use is visible.
#[derive(Default)]
struct TaggingSerializer {
    decoded: AtomicUsize,
}

impl JsonSerializer for TaggingSerializer {
    fn serialize(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        DefaultJsonSerializer.serialize(value)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        self.decoded.fetch_add(1, Ordering::SeqCst);
        let mut value = DefaultJsonSerializer.deserialize(bytes)?;
        if let Value::Object(map) = &mut value {
            map.insert("decoded_by".to_string(), json!("tagging"));
        }
        Ok(value)
    }
}

fn hotel() -> Value {
    json!({
        "name": "Hotel Ruby",
        "address": {"city": "Lisbon", "country": "PT"},
        "rooms": [101, 102, 103],
        "visits": 10
    })
}

#[tokio::test]
async fn test_insert_get_remove_lifecycle() {
    let coll = collection(Arc::new(InMemoryDispatcher::new()));

    let inserted = coll.insert("h1", hotel(), InsertOptions::new()).await.unwrap();
    assert!(!inserted.cas().is_none());

    let err = coll.insert("h1", hotel(), InsertOptions::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DocumentExists);

    let fetched = coll.get("h1", GetOptions::new()).await.unwrap();
    assert_eq!(fetched.cas(), inserted.cas());
    assert_eq!(fetched.content_as::<Value>().unwrap(), hotel());
    assert_eq!(fetched.expiry_time(), None);

    assert!(coll.exists("h1", ExistsOptions::new()).await.unwrap().exists());
    coll.remove("h1", RemoveOptions::new()).await.unwrap();
    let exists = coll.exists("h1", ExistsOptions::new()).await.unwrap();
    assert!(!exists.exists());
    assert!(!coll.exists("never", ExistsOptions::new()).await.unwrap().exists());

    let err = coll.get("h1", GetOptions::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DocumentNotFound);
}

#[tokio::test]
async fn test_replace_checks_cas() {
    let coll = collection(Arc::new(InMemoryDispatcher::new()));
    let first = coll.upsert("h1", hotel(), UpsertOptions::new()).await.unwrap();
    let second = coll
        .replace("h1", json!({"name": "Hotel Opal"}), ReplaceOptions::new())
        .await
        .unwrap();
    assert_ne!(first.cas(), second.cas());

    let err = coll
        .replace("h1", json!({"name": "stale"}), ReplaceOptions::new().cas(first.cas()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CasMismatch);

    coll.replace("h1", json!({"name": "fresh"}), ReplaceOptions::new().cas(second.cas()))
        .await
        .unwrap();
    let doc: Value = coll.get("h1", GetOptions::new()).await.unwrap().content_as().unwrap();
    assert_eq!(doc["name"], "fresh");

    let err = coll
        .remove("h1", RemoveOptions::new().cas(first.cas()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CasMismatch);
}

#[tokio::test]
async fn test_lock_blocks_writes_until_unlocked() {
    let coll = collection(Arc::new(InMemoryDispatcher::new()));
    coll.upsert("h1", hotel(), UpsertOptions::new()).await.unwrap();

    let locked = coll
        .get_and_lock("h1", Duration::from_secs(30), GetAndLockOptions::new())
        .await
        .unwrap();
    assert_eq!(locked.content_as::<Value>().unwrap(), hotel());

    let err = coll.upsert("h1", hotel(), UpsertOptions::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DocumentLocked);
    let err = coll
        .get_and_lock("h1", Duration::from_secs(30), GetAndLockOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DocumentLocked);

    let err = coll
        .unlock("h1", Cas::new(locked.cas().value() + 1000), UnlockOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CasMismatch);

    coll.unlock("h1", locked.cas(), UnlockOptions::new()).await.unwrap();
    coll.upsert("h1", hotel(), UpsertOptions::new()).await.unwrap();
}

#[tokio::test]
async fn test_locked_document_accepts_write_with_lock_cas() {
    let coll = collection(Arc::new(InMemoryDispatcher::new()));
    coll.upsert("h1", hotel(), UpsertOptions::new()).await.unwrap();
    let locked = coll
        .get_and_lock("h1", Duration::from_secs(30), GetAndLockOptions::new())
        .await
        .unwrap();

    coll.replace("h1", json!({"name": "Hotel Opal"}), ReplaceOptions::new().cas(locked.cas()))
        .await
        .unwrap();
    coll.upsert("h1", hotel(), UpsertOptions::new()).await.unwrap();
}

#[tokio::test]
async fn test_get_with_expiry_reports_absolute_time() {
    let coll = collection(Arc::new(InMemoryDispatcher::new()));
    let before = Utc::now().timestamp();
    coll.upsert(
        "h1",
        hotel(),
        UpsertOptions::new().expiry(Expiry::relative(Duration::from_secs(3600))),
    )
    .await
    .unwrap();

    let fetched = coll
        .get("h1", GetOptions::new().with_expiry(true))
        .await
        .unwrap();
    assert_eq!(fetched.content_as::<Value>().unwrap(), hotel());
    let expiry = fetched.expiry_time().expect("expiry requested").timestamp();
    assert!(expiry >= before + 3600 && expiry <= Utc::now().timestamp() + 3600);

    let touched = coll
        .get_and_touch("h1", Expiry::None, GetAndTouchOptions::new())
        .await
        .unwrap();
    assert_eq!(touched.content_as::<Value>().unwrap(), hotel());
    let fetched = coll
        .get("h1", GetOptions::new().with_expiry(true))
        .await
        .unwrap();
    assert_eq!(fetched.expiry_time(), None);
}

#[tokio::test]
async fn test_expiry_inclusive_get_keeps_document_format() {
    let coll = collection(Arc::new(InMemoryDispatcher::new()));
    let raw: Arc<dyn Transcoder> = Arc::new(RawStringTranscoder);
    coll.upsert(
        "note",
        "plain text, not json",
        UpsertOptions::new().transcoder(Arc::clone(&raw)),
    )
    .await
    .unwrap();

    let fetched = coll
        .get("note", GetOptions::new().with_expiry(true))
        .await
        .unwrap();
    assert_eq!(
        fetched.content(),
        &Content::Text("plain text, not json".to_string())
    );
}

#[tokio::test]
async fn test_projection_rebuilds_nested_paths() {
    let coll = collection(Arc::new(InMemoryDispatcher::new()));
    coll.upsert("h1", hotel(), UpsertOptions::new()).await.unwrap();

    let fetched = coll
        .get("h1", GetOptions::new().project(["name", "address.city", "missing"]))
        .await
        .unwrap();
    assert_eq!(
        fetched.content_as::<Value>().unwrap(),
        json!({"name": "Hotel Ruby", "address": {"city": "Lisbon"}})
    );
}

#[tokio::test]
async fn test_touch_expires_document() {
    let coll = collection(Arc::new(InMemoryDispatcher::new()));
    coll.upsert("h1", hotel(), UpsertOptions::new()).await.unwrap();
    coll.touch("h1", Expiry::relative(Duration::from_secs(1)), TouchOptions::new())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(2100)).await;
    let err = coll.get("h1", GetOptions::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DocumentNotFound);
}

#[tokio::test]
async fn test_lookup_in_returns_fields_in_submission_order() {
    let coll = collection(Arc::new(InMemoryDispatcher::new()));
    coll.upsert("h1", hotel(), UpsertOptions::new()).await.unwrap();

    let specs = vec![
        LookupInSpec::get("address.city"),
        LookupInSpec::count("rooms"),
        LookupInSpec::exists("pool"),
        LookupInSpec::get(docwire::subdoc::lookup_macros::IS_DELETED).xattr(),
        LookupInSpec::get(""),
    ];
    let result = coll.lookup_in("h1", &specs, LookupInOptions::new()).await.unwrap();

    assert_eq!(result.content_as::<String>(0).unwrap(), "Lisbon");
    assert_eq!(result.content_as::<u64>(1).unwrap(), 3);
    assert!(!result.exists(2));
    assert_eq!(result.status(2), Some(SubdocStatus::PathNotFound));
    assert!(!result.content_as::<bool>(3).unwrap());
    assert_eq!(result.content_as::<Value>(4).unwrap(), hotel());
    assert!(!result.is_deleted());

    let err = coll.lookup_in("h1", &[], LookupInOptions::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoCommands);
}

#[tokio::test]
async fn test_mutate_in_applies_every_command_or_none() {
    let coll = collection(Arc::new(InMemoryDispatcher::new()));
    coll.upsert("h1", hotel(), UpsertOptions::new()).await.unwrap();

    let specs = vec![
        MutateInSpec::upsert("address.zip", "1100"),
        MutateInSpec::increment("visits", 5),
        MutateInSpec::array_append("rooms", vec![json!(104), json!(105)]),
        MutateInSpec::remove("name"),
    ];
    let result = coll.mutate_in("h1", &specs, MutateInOptions::new()).await.unwrap();
    assert_eq!(result.content_as::<i64>(1).unwrap(), 15);

    let doc: Value = coll.get("h1", GetOptions::new()).await.unwrap().content_as().unwrap();
    assert_eq!(doc["address"]["zip"], "1100");
    assert_eq!(doc["rooms"], json!([101, 102, 103, 104, 105]));
    assert!(doc.get("name").is_none());

    let failing = vec![
        MutateInSpec::upsert("visits", 0),
        MutateInSpec::insert("address", json!({})),
    ];
    let err = coll.mutate_in("h1", &failing, MutateInOptions::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathExists);
    let after: Value = coll.get("h1", GetOptions::new()).await.unwrap().content_as().unwrap();
    assert_eq!(after["visits"], 15);
}

#[tokio::test]
async fn test_mutate_in_expands_cas_macro_into_xattr() {
    let coll = collection(Arc::new(InMemoryDispatcher::new()));
    let result = coll
        .mutate_in(
            "h1",
            &[
                MutateInSpec::upsert("name", "Hotel Ruby"),
                MutateInSpec::upsert_macro("written_at", MutateInMacro::Cas),
            ],
            MutateInOptions::new().store_semantics(StoreSemantics::Upsert),
        )
        .await
        .unwrap();

    let lookup = coll
        .lookup_in(
            "h1",
            &[
                LookupInSpec::get("written_at").xattr(),
                LookupInSpec::get("name"),
            ],
            LookupInOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(
        lookup.content_as::<String>(0).unwrap(),
        format!("0x{:016x}", result.cas().value())
    );
    assert_eq!(lookup.content_as::<String>(1).unwrap(), "Hotel Ruby");
}

#[tokio::test]
async fn test_mutate_in_store_semantics() {
    let coll = collection(Arc::new(InMemoryDispatcher::new()));
    let specs = [MutateInSpec::upsert("name", "Hotel Ruby")];

    let err = coll.mutate_in("h1", &specs, MutateInOptions::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DocumentNotFound);

    let insert = MutateInOptions::new().store_semantics(StoreSemantics::Insert);
    coll.mutate_in("h1", &specs, insert.clone()).await.unwrap();
    let err = coll.mutate_in("h1", &specs, insert).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DocumentExists);

    let err = coll
        .mutate_in(
            "h1",
            &specs,
            MutateInOptions::new().store_semantics(StoreSemantics::Insert).cas(7u64),
        )
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_create_as_deleted_needs_access_deleted_to_read() {
    let coll = collection(Arc::new(InMemoryDispatcher::new()));
    coll.mutate_in(
        "txn",
        &[MutateInSpec::upsert("staged", json!({"amount": 12}))],
        MutateInOptions::new()
            .store_semantics(StoreSemantics::Insert)
            .access_deleted(true)
            .create_as_deleted(true),
    )
    .await
    .unwrap();

    let err = coll
        .lookup_in("txn", &[LookupInSpec::get("staged")], LookupInOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DocumentNotFound);

    let tombstone = coll
        .lookup_in(
            "txn",
            &[LookupInSpec::get("staged.amount")],
            LookupInOptions::new().access_deleted(true),
        )
        .await
        .unwrap();
    assert!(tombstone.is_deleted());
    assert_eq!(tombstone.content_as::<u64>(0).unwrap(), 12);
    assert!(!coll.exists("txn", ExistsOptions::new()).await.unwrap().exists());
}

#[tokio::test]
async fn test_requests_are_recorded_as_framed() {
    let dispatcher = Arc::new(InMemoryDispatcher::new());
    let coll = collection(dispatcher.clone());
    coll.upsert("h1", hotel(), UpsertOptions::new()).await.unwrap();
    let _ = coll.get("h1", GetOptions::new().project(["name"])).await.unwrap();

    let recorded = dispatcher.recorded().await;
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].name, "upsert");
    assert_eq!(recorded[1].name, "lookup_in");
    assert_eq!(recorded[1].frame.key, "h1");
    assert_eq!(recorded[1].frame.collection, "hotel");
}

#[tokio::test]
async fn test_subdoc_results_decode_through_the_chosen_serializer() {
    let coll = collection(Arc::new(InMemoryDispatcher::new()));
    coll.upsert("h1", hotel(), UpsertOptions::new()).await.unwrap();

    let serializer = Arc::new(TaggingSerializer::default());
    let result = coll
        .lookup_in(
            "h1",
            &[LookupInSpec::get("address"), LookupInSpec::get("visits")],
            LookupInOptions::new().serializer(serializer.clone()),
        )
        .await
        .unwrap();
    let address: Value = result.content_as(0).unwrap();
    assert_eq!(address["city"], "Lisbon");
    assert_eq!(address["decoded_by"], "tagging");
    assert_eq!(result.content_as::<u64>(1).unwrap(), 10);
    assert_eq!(serializer.decoded.load(Ordering::SeqCst), 2);

    let plain = coll
        .lookup_in("h1", &[LookupInSpec::get("address")], LookupInOptions::new())
        .await
        .unwrap();
    assert!(plain.content_as::<Value>(0).unwrap().get("decoded_by").is_none());
    assert_eq!(serializer.decoded.load(Ordering::SeqCst), 2);

    let mutated = coll
        .mutate_in(
            "h1",
            &[MutateInSpec::increment("visits", 1)],
            MutateInOptions::new().serializer(serializer.clone()),
        )
        .await
        .unwrap();
    assert_eq!(mutated.content_as::<i64>(0).unwrap(), 11);
    assert_eq!(serializer.decoded.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_projected_get_keeps_array_elements_as_arrays() {
    let coll = collection(Arc::new(InMemoryDispatcher::new()));
    coll.upsert("h1", hotel(), UpsertOptions::new()).await.unwrap();

    let result = coll
        .get("h1", GetOptions::new().project(["rooms[1]", "name"]))
        .await
        .unwrap();
    let doc: Value = result.content_as().unwrap();
    assert_eq!(doc, json!({"rooms": [102], "name": "Hotel Ruby"}));
    assert!(doc.get("rooms[1]").is_none());
}
