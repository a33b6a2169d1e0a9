use docwire::prelude::*;
use docwire::subdoc::{
    SUBDOC_MAX_FIELDS, SubdocCommandKind, SubdocMutateCommand, lookup_macros, path_flags,
};
use docwire::{ErrorKind, KvOp};
use serde_json::json;
use std::sync::Arc;

fn collection() -> Collection {
    Collection::new(
        CollectionIdentifier::default_for("travel"),
        Arc::new(ClientEnvironment::new()),
        Arc::new(InMemoryDispatcher::new()),
        Arc::new(StaticTopology::with_bucket(BucketConfig::new("travel", 1))),
    )
}

/// Small deterministic generator so the ordering checks cover many shapes.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

fn mutate_commands(coll: &Collection, specs: &[MutateInSpec]) -> Vec<SubdocMutateCommand> {
    let request = tokio_test::block_on(coll.mutate_in_request(
        "doc",
        specs,
        &MutateInOptions::new().store_semantics(StoreSemantics::Upsert),
    ))
    .unwrap();
    match request.op {
        KvOp::SubdocMutate { commands, .. } => commands,
        other => panic!("expected a subdocument mutation, got {:?}", other),
    }
}

#[test]
fn test_xattr_commands_always_lead_and_keep_relative_order() {
    let coll = collection();
    let mut rng = Lcg(7);

    for _ in 0..200 {
        let len = 1 + (rng.next() as usize % SUBDOC_MAX_FIELDS);
        let pattern = (0..len).map(|_| rng.next() % 2 == 0).collect::<Vec<_>>();
        let specs = pattern
            .iter()
            .enumerate()
            .map(|(i, &xattr)| {
                let spec = MutateInSpec::upsert(format!("f{}", i), json!(i));
                if xattr { spec.xattr() } else { spec }
            })
            .collect::<Vec<_>>();

        let commands = mutate_commands(&coll, &specs);
        assert_eq!(commands.len(), len);

        let xattrs = pattern.iter().filter(|&&x| x).count();
        assert!(commands[..xattrs].iter().all(|c| c.xattr));
        assert!(commands[xattrs..].iter().all(|c| !c.xattr));

        let expected = (0..len as u32)
            .filter(|&i| pattern[i as usize])
            .chain((0..len as u32).filter(|&i| !pattern[i as usize]))
            .collect::<Vec<_>>();
        let actual = commands.iter().map(|c| c.original_index).collect::<Vec<_>>();
        assert_eq!(actual, expected);

        for command in &commands {
            assert_eq!(command.path, format!("f{}", command.original_index));
        }
    }
}

#[test]
fn test_lookup_commands_follow_the_same_ordering() {
    let coll = collection();
    let specs = vec![
        LookupInSpec::get("name"),
        LookupInSpec::exists("tags").xattr(),
        LookupInSpec::count("rooms"),
        LookupInSpec::get(lookup_macros::CAS).xattr(),
        LookupInSpec::get(""),
    ];
    let request = coll
        .lookup_in_request("doc", &specs, &LookupInOptions::new())
        .unwrap();
    let KvOp::SubdocGet { commands, doc_flags } = request.op else {
        panic!("expected a subdocument lookup");
    };
    assert_eq!(doc_flags, 0);
    let order = commands.iter().map(|c| c.original_index).collect::<Vec<_>>();
    assert_eq!(order, vec![1, 3, 0, 2, 4]);
    assert_eq!(commands[0].kind, SubdocCommandKind::Exists);
    assert_eq!(commands[1].path_flags(), path_flags::XATTR);
    assert_eq!(commands[4].kind, SubdocCommandKind::GetDoc);
}

#[test]
fn test_lookup_in_cardinality() {
    let coll = collection();
    let specs = (0..=SUBDOC_MAX_FIELDS)
        .map(|i| LookupInSpec::get(format!("f{}", i)))
        .collect::<Vec<_>>();

    let err = coll
        .lookup_in_request("doc", &specs, &LookupInOptions::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TooManyCommands);
    assert!(
        coll.lookup_in_request("doc", &specs[..SUBDOC_MAX_FIELDS], &LookupInOptions::new())
            .is_ok()
    );
}

#[test]
fn test_fragments_and_flags_are_encoded_per_command() {
    let coll = collection();
    let specs = vec![
        MutateInSpec::array_append("rooms", vec![json!(1), json!("two")]),
        MutateInSpec::increment("visits", 3),
        MutateInSpec::decrement("stock", 2),
        MutateInSpec::upsert("deep.path", json!({"a": [1]})).create_path(),
        MutateInSpec::upsert_macro("stamp", MutateInMacro::SeqNo),
        MutateInSpec::remove(""),
        MutateInSpec::replace("", json!({"fresh": true})),
    ];
    let commands = mutate_commands(&coll, &specs);
    let by_index = |i: u32| {
        commands
            .iter()
            .find(|c| c.original_index == i)
            .expect("every spec produces a command")
    };

    assert_eq!(by_index(0).fragment, b"1,\"two\"".to_vec());
    assert_eq!(by_index(0).kind, SubdocCommandKind::ArrayPushLast);
    assert_eq!(by_index(1).fragment, b"3".to_vec());
    assert_eq!(by_index(2).fragment, b"-2".to_vec());
    assert_eq!(by_index(3).path_flags(), path_flags::CREATE_PATH);
    assert_eq!(by_index(3).fragment, br#"{"a":[1]}"#.to_vec());

    let stamp = by_index(4);
    assert_eq!(stamp.path_flags(), path_flags::XATTR | path_flags::EXPAND_MACROS);
    assert_eq!(stamp.fragment, br#""${Mutation.seqno}""#.to_vec());
    assert_eq!(commands[0].original_index, 4);

    assert_eq!(by_index(5).kind, SubdocCommandKind::DeleteDoc);
    assert!(by_index(5).fragment.is_empty());
    assert_eq!(by_index(6).kind, SubdocCommandKind::SetDoc);
}

#[test]
fn test_expiry_projection_accounting_per_path() {
    let coll = collection();
    let request = coll
        .get_request(
            "doc",
            &GetOptions::new()
                .with_expiry(true)
                .project((0..15).map(|i| format!("f{}", i))),
        )
        .unwrap();
    let KvOp::SubdocGet { commands, .. } = request.op else {
        panic!("expected a subdocument lookup");
    };
    assert_eq!(commands.len(), SUBDOC_MAX_FIELDS);
    assert_eq!(commands[0].path, lookup_macros::EXPIRY_TIME);
    assert_eq!(commands[0].original_index, 15);
    assert!(commands[1..].iter().all(|c| !c.xattr && c.kind == SubdocCommandKind::Get));
}
