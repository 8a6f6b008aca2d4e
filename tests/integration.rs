//! Integration tests: specialize/abstract round trips, relationships, value memory, cycles,
//! backtracking limits and error reporting.

use protovocab::{
    abstract_data, internet_checksum, reset_value_memory, specialize, AbstractOptions, Ascii, BitArray, BitSeq,
    BoundKind, Codec, CodecConfig, CodecError, Endianness, Field, GenerationStrategy, Integer, Ipv4, Ipv4Net, Memory,
    Raw, RepeatCount, RepeatDecision, ResetScope, SizeRange, SpecializeOptions, Svas, Symbol, Value, Variable,
    VariableKind,
};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn u8_int() -> Integer {
    Integer::new().with_size(8)
}

fn u16_int() -> Integer {
    Integer::new().with_size(16)
}

/// ICMP-echo-like message: type, code, checksum over everything, id, seq, payload.
fn echo_symbol() -> Symbol {
    Symbol::new(
        "Echo",
        vec![
            Field::new("type", Variable::data(Integer::constant(8).with_size(8))),
            Field::new("code", Variable::data(Integer::constant(0).with_size(8))),
            Field::new("checksum", Variable::checksum(&["type", "code", "id", "seq", "payload"], u16_int())),
            Field::new("id", Variable::data_with(u16_int(), Svas::Persistent).expect("persistent id")),
            Field::new("seq", Variable::data(u16_int())),
            Field::new("payload", Variable::data(Raw::new().with_nb_bytes(SizeRange::between(0, 16)))),
        ],
    )
}

#[test]
fn specialize_then_abstract_round_trips() {
    init_tracing();
    let codec = Codec::new(echo_symbol()).expect("codec");
    let memory = Memory::new();
    for seed in 0..20u64 {
        let produced = codec
            .specialize_with(&memory, &SpecializeOptions::default().with_seed(seed))
            .expect("specialize");
        let bytes = produced.to_bytes();
        let parsed = codec.abstract_data(&memory, &bytes).expect("abstract");
        assert_eq!(parsed.to_bytes(), bytes);
        for (a, b) in produced.fields.iter().zip(&parsed.fields) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.bits, b.bits, "field {}", a.name);
        }
    }
}

#[test]
fn generated_checksum_verifies() {
    let codec = Codec::new(echo_symbol()).expect("codec");
    let memory = Memory::new();
    let bytes = codec.specialize(&memory).expect("specialize");
    assert_eq!(bytes[0], 8);
    assert_eq!(bytes[1], 0);
    // A correct Internet checksum makes the whole message sum to zero.
    assert_eq!(internet_checksum(&bytes), 0);
}

#[test]
fn checksum_matches_reference_example() {
    let symbol = Symbol::new(
        "Sample",
        vec![
            Field::new("a", Variable::data(Raw::constant(&[0x00, 0x06]))),
            Field::new("b", Variable::data(Raw::constant(&[0xa8, 0xf3, 0xf6, 0x53, 0, 0, 0, 0]))),
            Field::new("c", Variable::data(Raw::constant(&[0x00, 0x0c]))),
            Field::new("crc", Variable::checksum(&["a", "b", "c"], u16_int())),
        ],
    );
    let bytes = specialize(&symbol, &Memory::new(), Some(1)).expect("specialize");
    assert_eq!(&bytes[12..], &[0x60, 0xa6]);
}

#[test]
fn size_field_counts_target_bytes() {
    let symbol = Symbol::new(
        "Sized",
        vec![
            Field::new("len", Variable::size(&["body"], u8_int())),
            Field::new("body", Variable::data(Ascii::new().with_nb_chars(SizeRange::between(0, 40)))),
        ],
    );
    let codec = Codec::new(symbol).expect("codec");
    let memory = Memory::new();
    for seed in 0..30u64 {
        let tree = codec
            .specialize_with(&memory, &SpecializeOptions::default().with_seed(seed))
            .expect("specialize");
        let body_bytes = tree.field("body").expect("body").bits.len() / 8;
        let len = tree.field("len").and_then(|f| f.value()).and_then(Value::as_int).expect("len");
        assert_eq!(len as usize, body_bytes);
    }
}

#[test]
fn size_factor_and_offset_apply() {
    // Header length in 32-bit words, offset by one.
    let symbol = Symbol::new(
        "Words",
        vec![
            Field::new("hlen", Variable::size_with(&["opts"], u8_int(), 1.0 / 32.0, 1)),
            Field::new("opts", Variable::data(Raw::new().with_nb_bytes(SizeRange::exact(8)))),
        ],
    );
    let codec = Codec::new(symbol).expect("codec");
    let memory = Memory::new();
    let bytes = codec.specialize(&memory).expect("specialize");
    assert_eq!(bytes[0], 3);
    let mut wrong = bytes.clone();
    wrong[0] = 2;
    let err = codec.abstract_data(&memory, &wrong).expect_err("size mismatch");
    assert!(matches!(err, CodecError::MatchFailure { .. }), "{:?}", err);
}

#[test]
fn size_rejects_inconsistent_input() {
    let symbol = Symbol::new(
        "Sized",
        vec![
            Field::new("len", Variable::size(&["body"], u8_int())),
            Field::new("body", Variable::data(Raw::new().with_nb_bytes(SizeRange::between(0, 8)))),
        ],
    );
    let codec = Codec::new(symbol).expect("codec");
    let memory = Memory::new();
    let tree = codec.abstract_data(&memory, &[3, 1, 2, 3]).expect("abstract");
    assert_eq!(tree.field("body").expect("body").bits.to_bytes(), vec![1, 2, 3]);
    let err = codec.abstract_data(&memory, &[2, 1, 2, 3]).expect_err("len 2 with 3 bytes");
    assert!(matches!(err, CodecError::MatchFailure { .. }));
}

#[test]
fn alternate_generates_requested_child() {
    let alt = Variable::alternate(vec![
        Variable::data(Ascii::constant("A")),
        Variable::data(Ascii::constant("B")),
        Variable::data(Ascii::constant("C")),
    ]);
    let alt_id = alt.id;
    let symbol = Symbol::new("Choice", vec![Field::new("c", alt)]);
    let codec = Codec::new(symbol).expect("codec");
    let memory = Memory::new();
    let tree = codec
        .specialize_with(&memory, &SpecializeOptions::default().with_alternate(alt_id, 1))
        .expect("specialize");
    assert_eq!(tree.to_bytes(), b"B".to_vec());
    match &tree.field("c").expect("c").node.kind {
        BoundKind::Alternate { index, .. } => assert_eq!(*index, 1),
        other => panic!("expected alternate, got {:?}", other),
    }

    let parsed = codec.abstract_data(&memory, b"C").expect("abstract");
    match &parsed.field("c").expect("c").node.kind {
        BoundKind::Alternate { index, .. } => assert_eq!(*index, 2),
        other => panic!("expected alternate, got {:?}", other),
    }
}

#[test]
fn alternate_backtracks_into_later_branch() {
    // First branch matches a prefix but leaves the tail unparseable.
    let symbol = Symbol::new(
        "Backtrack",
        vec![
            Field::new(
                "head",
                Variable::alternate(vec![
                    Variable::data(Raw::constant(b"a")),
                    Variable::data(Raw::constant(b"ab")),
                ]),
            ),
            Field::new("tail", Variable::data(Raw::constant(b"c"))),
        ],
    );
    let codec = Codec::new(symbol).expect("codec");
    let tree = codec.abstract_data(&Memory::new(), b"abc").expect("abstract");
    assert_eq!(tree.field("head").expect("head").bits.to_bytes(), b"ab".to_vec());
}

#[test]
fn ranged_repeat_accepts_bounds_only() {
    let symbol = Symbol::new(
        "Repeated",
        vec![Field::new("items", Variable::repeat(Variable::data(Raw::constant(b"x")), RepeatCount::Range(0, 3)))],
    );
    let codec = Codec::new(symbol).expect("codec");
    let memory = Memory::new();
    for n in 0..=3 {
        let data = vec![b'x'; n];
        let tree = codec.abstract_data(&memory, &data).expect("within range");
        match &tree.field("items").expect("items").node.kind {
            BoundKind::Repeat(items) => assert_eq!(items.len(), n),
            other => panic!("expected repeat, got {:?}", other),
        }
    }
    let err = codec.abstract_data(&memory, b"xxxx").expect_err("four is above the maximum");
    assert!(matches!(err, CodecError::MatchFailure { .. }));

    for seed in 0..10u64 {
        let tree = codec
            .specialize_with(&memory, &SpecializeOptions::default().with_seed(seed))
            .expect("specialize");
        assert!(tree.to_bytes().len() <= 3);
    }
}

#[test]
fn fixed_repeat_with_delimiter() {
    let symbol = Symbol::new(
        "Csv",
        vec![Field::new(
            "cols",
            Variable::repeat_delimited(
                Variable::data(Ascii::new().with_nb_chars(SizeRange::exact(2))),
                RepeatCount::Fixed(3),
                BitSeq::from_bytes(b","),
            ),
        )],
    );
    let codec = Codec::new(symbol).expect("codec");
    let memory = Memory::new();
    let bytes = codec.specialize(&memory).expect("specialize");
    assert_eq!(bytes.len(), 8);
    assert_eq!(bytes[2], b',');
    assert_eq!(bytes[5], b',');
    let tree = codec.abstract_data(&memory, b"ab,cd,ef").expect("abstract");
    let values: Vec<String> = tree
        .leaves()
        .iter()
        .filter_map(|n| n.value().and_then(Value::as_text).map(str::to_string))
        .collect();
    assert_eq!(values, vec!["ab", "cd", "ef"]);
    assert!(codec.abstract_data(&memory, b"ab;cd;ef").is_err());
}

#[test]
fn until_repeat_stops_at_sentinel() {
    let symbol = Symbol::new(
        "Cstr",
        vec![
            Field::new(
                "chars",
                Variable::repeat(
                    Variable::data(Raw::new().with_nb_bytes(SizeRange::exact(1))),
                    RepeatCount::Until("nul".to_string()),
                ),
            ),
            Field::new("nul", Variable::data(Raw::constant(&[0]))),
        ],
    );
    let codec = Codec::new(symbol).expect("codec");
    let memory = Memory::new();
    let tree = codec.abstract_data(&memory, b"hi\0").expect("abstract");
    assert_eq!(tree.field("chars").expect("chars").bits.to_bytes(), b"hi".to_vec());

    for seed in 0..10u64 {
        let bytes = codec
            .specialize_with(&memory, &SpecializeOptions::default().with_seed(seed))
            .expect("specialize")
            .to_bytes();
        assert_eq!(bytes.last(), Some(&0));
        assert_eq!(bytes.iter().filter(|&&b| b == 0).count(), 1, "{:?}", bytes);
        codec.abstract_data(&memory, &bytes).expect("round trip");
    }
}

#[test]
fn until_sentinel_spanning_iterations_round_trips() {
    // Two-byte sentinel over one-byte items: "00 00" can form across an iteration boundary
    // or between the last iteration and the sentinel itself.
    let symbol = Symbol::new(
        "Pairs",
        vec![
            Field::new(
                "items",
                Variable::repeat(
                    Variable::alternate(vec![
                        Variable::data(Raw::constant(&[0x00])),
                        Variable::data(Raw::constant(&[0x01])),
                    ]),
                    RepeatCount::Until("end".to_string()),
                ),
            ),
            Field::new("end", Variable::data(Raw::constant(&[0x00, 0x00]))),
        ],
    );
    let codec = Codec::new(symbol).expect("codec");
    assert_eq!(codec.resolved().generation_order(), &[1, 0]);
    assert_eq!(codec.resolved().evaluation_order(), &[0, 1]);
    let memory = Memory::new();
    for seed in 0..50u64 {
        let produced = codec
            .specialize_with(&memory, &SpecializeOptions::default().with_seed(seed))
            .expect("specialize");
        let bytes = produced.to_bytes();
        assert!(bytes.ends_with(&[0x00, 0x00]), "seed {}: {:?}", seed, bytes);
        let parsed = codec
            .abstract_data(&memory, &bytes)
            .unwrap_or_else(|e| panic!("seed {}: {:?} -> {}", seed, bytes, e));
        assert_eq!(parsed.field("items").expect("items").bits, produced.field("items").expect("items").bits);
    }
}

#[test]
fn until_sentinel_with_delimiter_round_trips() {
    let symbol = Symbol::new(
        "Words",
        vec![
            Field::new(
                "words",
                Variable::repeat_delimited(
                    Variable::data(Raw::new().with_nb_bytes(SizeRange::exact(1)).with_alphabet(b"ab;")),
                    RepeatCount::Until("stop".to_string()),
                    BitSeq::from_bytes(b";"),
                ),
            ),
            Field::new("stop", Variable::data(Raw::constant(b";;"))),
        ],
    );
    let codec = Codec::new(symbol).expect("codec");
    let memory = Memory::new();
    for seed in 0..50u64 {
        let bytes = codec
            .specialize_with(&memory, &SpecializeOptions::default().with_seed(seed))
            .expect("specialize")
            .to_bytes();
        assert!(bytes.ends_with(b";;"), "seed {}: {:?}", seed, bytes);
        codec
            .abstract_data(&memory, &bytes)
            .unwrap_or_else(|e| panic!("seed {}: {:?} -> {}", seed, bytes, e));
    }
}

#[test]
fn predicate_repeat_consults_iterations() {
    // TLV-ish list: items continue while the previous one is not 0xff.
    let predicate = Arc::new(|seen: &[BitSeq]| match seen.last() {
        Some(last) if last.as_bytes() == Some(&[0xff][..]) => RepeatDecision::Stop,
        _ => RepeatDecision::Continue,
    });
    let symbol = Symbol::new(
        "Chain",
        vec![Field::new(
            "items",
            Variable::repeat(Variable::data(u8_int()), RepeatCount::Predicate(predicate)),
        )],
    );
    let codec = Codec::new(symbol).expect("codec");
    let memory = Memory::new();
    let tree = codec.abstract_data(&memory, &[1, 2, 0xff]).expect("abstract");
    match &tree.field("items").expect("items").node.kind {
        BoundKind::Repeat(items) => assert_eq!(items.len(), 3),
        other => panic!("expected repeat, got {:?}", other),
    }
    assert!(codec.abstract_data(&memory, &[1, 0xff, 2]).is_err());
}

#[test]
fn predicate_repeat_capped_by_max_repeat() {
    let forever = Arc::new(|_: &[BitSeq]| RepeatDecision::Continue);
    let symbol = Symbol::new(
        "Forever",
        vec![Field::new("items", Variable::repeat(Variable::data(u8_int()), RepeatCount::Predicate(forever)))],
    );
    let codec = Codec::with_config(symbol, CodecConfig::default().with_max_repeat(5)).expect("codec");
    let bytes = codec.specialize(&Memory::new()).expect("specialize");
    assert_eq!(bytes.len(), 5);
}

#[test]
fn constant_cannot_be_overwritten() {
    let var = Variable::data(Ascii::constant("OK"));
    let id = var.id;
    let symbol = Symbol::new("Const", vec![Field::new("tag", var)]);
    let codec = Codec::new(symbol).expect("codec");
    let memory = Memory::new();
    memory.write(id, Svas::Constant, BitSeq::from_bytes(b"OK")).expect("first write");
    let err = memory
        .write(id, Svas::Constant, BitSeq::from_bytes(b"NO"))
        .expect_err("second write");
    assert_eq!(err, CodecError::ImmutableWrite { variable: id });
    assert_eq!(memory.read(id), Some(BitSeq::from_bytes(b"OK")));
    assert_eq!(codec.specialize(&memory).expect("specialize"), b"OK".to_vec());
    assert!(codec.abstract_data(&memory, b"NO").is_err());
}

#[test]
fn constant_without_value_is_rejected() {
    let err = Variable::data_with(u8_int(), Svas::Constant).expect_err("no value");
    assert!(matches!(err, CodecError::InvalidGrammar(_)));
}

#[test]
fn cyclic_relationships_fail_before_any_bytes() {
    // `len` measures `body`, whose domain holds a checksum over `len`.
    let symbol = Symbol::new(
        "Cycle",
        vec![
            Field::new("len", Variable::size(&["body"], u8_int())),
            Field::new(
                "body",
                Variable::aggregate(vec![
                    Variable::checksum(&["len"], u16_int()),
                    Variable::data(Raw::new().with_nb_bytes(SizeRange::exact(2))),
                ]),
            ),
        ],
    );
    let err = Codec::new(symbol.clone()).expect_err("cycle");
    match &err {
        CodecError::CyclicDependency(path) => {
            assert!(path.contains(&"len".to_string()));
            assert!(path.contains(&"body".to_string()));
            assert_eq!(path.first(), path.last());
        }
        other => panic!("expected a cycle, got {:?}", other),
    }
    assert!(matches!(specialize(&symbol, &Memory::new(), Some(0)), Err(CodecError::CyclicDependency(_))));
}

#[test]
fn self_referencing_checksum_is_a_cycle() {
    let symbol = Symbol::new("SelfSum", vec![Field::new("crc", Variable::checksum(&["crc"], u16_int()))]);
    assert_eq!(
        Codec::new(symbol).expect_err("cycle"),
        CodecError::CyclicDependency(vec!["crc".to_string(), "crc".to_string()])
    );
}

#[test]
fn unknown_relationship_target_is_invalid() {
    let symbol = Symbol::new("Dangling", vec![Field::new("len", Variable::size(&["nope"], u8_int()))]);
    assert!(matches!(Codec::new(symbol), Err(CodecError::InvalidGrammar(_))));
}

/// Every split of a run of `a` into `a` / `aa` is tried before concluding no `b` follows.
fn pathological_symbol() -> Symbol {
    Symbol::new(
        "Pathological",
        vec![
            Field::new(
                "x",
                Variable::repeat(
                    Variable::alternate(vec![
                        Variable::data(Raw::constant(b"a")),
                        Variable::data(Raw::constant(b"aa")),
                    ]),
                    RepeatCount::Range(0, 64),
                ),
            ),
            Field::new("y", Variable::data(Raw::constant(b"b"))),
        ],
    )
}

#[test]
fn pathological_input_times_out() {
    init_tracing();
    let codec = Codec::new(pathological_symbol()).expect("codec");
    let data = vec![b'a'; 30];
    let err = codec
        .abstract_with(&Memory::new(), &data, AbstractOptions::default().with_backtrack_budget(1000))
        .expect_err("timeout");
    assert!(matches!(err, CodecError::AbstractionTimeout { .. }), "{:?}", err);

    let err = abstract_data(&pathological_symbol(), &Memory::new(), &data, Some(1000)).expect_err("timeout");
    assert!(matches!(err, CodecError::AbstractionTimeout { .. }));
}

#[test]
fn pathological_grammar_accepts_matching_input() {
    let codec = Codec::new(pathological_symbol()).expect("codec");
    let mut data = vec![b'a'; 30];
    data.push(b'b');
    let tree = codec.abstract_data(&Memory::new(), &data).expect("abstract");
    assert_eq!(tree.field("y").expect("y").bits.to_bytes(), b"b".to_vec());
}

#[test]
fn presets_replace_generated_fields() {
    let symbol = Symbol::new(
        "Preset",
        vec![
            Field::new("len", Variable::size(&["body"], u8_int())),
            Field::new("body", Variable::data(Raw::new().with_nb_bytes(SizeRange::between(1, 4)))),
        ],
    );
    let codec = Codec::new(symbol).expect("codec");
    let options = SpecializeOptions::default().with_seed(7).with_preset("body", b"hello world".to_vec());
    let tree = codec.specialize_with(&Memory::new(), &options).expect("specialize");
    let bytes = tree.to_bytes();
    // The size relationship measures the preset bits, even outside the declared range.
    assert_eq!(bytes[0], 11);
    assert_eq!(&bytes[1..], b"hello world");
    assert!(matches!(tree.field("body").expect("body").node.kind, BoundKind::Preset));

    let bad = SpecializeOptions::default().with_preset("missing", b"x".to_vec());
    assert!(matches!(codec.specialize_with(&Memory::new(), &bad), Err(CodecError::InvalidGrammar(_))));
}

#[test]
fn persistent_value_survives_until_reset() {
    let symbol = Symbol::new(
        "Session",
        vec![Field::new("token", Variable::data_with(u16_int(), Svas::Persistent).expect("persistent"))],
    );
    let codec = Codec::new(symbol).expect("codec");
    let memory = Memory::new();

    codec.abstract_data(&memory, &[0xbe, 0xef]).expect("first message sets the token");
    for seed in 0..5u64 {
        let bytes = codec
            .specialize_with(&memory, &SpecializeOptions::default().with_seed(seed))
            .expect("specialize")
            .to_bytes();
        assert_eq!(bytes, vec![0xbe, 0xef]);
    }
    let err = codec.abstract_data(&memory, &[0x00, 0x01]).expect_err("token is fixed");
    assert!(matches!(err, CodecError::MatchFailure { .. }));

    reset_value_memory(&memory, ResetScope::Session);
    codec.abstract_data(&memory, &[0x00, 0x01]).expect("fresh session");
}

#[test]
fn ephemeral_and_volatile_memory() {
    let eph = Variable::data(u16_int());
    let vol = Variable::data_with(u16_int(), Svas::Volatile).expect("volatile");
    let (eph_id, vol_id) = (eph.id, vol.id);
    let symbol = Symbol::new("Mem", vec![Field::new("e", eph), Field::new("v", vol)]);
    let codec = Codec::new(symbol).expect("codec");
    let memory = Memory::new();
    codec.abstract_data(&memory, &[1, 2, 3, 4]).expect("abstract");
    assert_eq!(memory.read(eph_id), Some(BitSeq::from_bytes(&[1, 2])));
    assert!(!memory.contains(vol_id));
    codec.abstract_data(&memory, &[5, 6, 7, 8]).expect("abstract");
    assert_eq!(memory.read(eph_id), Some(BitSeq::from_bytes(&[5, 6])));

    reset_value_memory(&memory, ResetScope::All);
    assert!(memory.is_empty());
}

#[test]
fn match_failure_names_deepest_field() {
    let symbol = Symbol::new(
        "Header",
        vec![
            Field::new("magic", Variable::data(Ascii::constant("PK"))),
            Field::new("version", Variable::data(Integer::constant(3).with_size(8))),
            Field::new("body", Variable::data(Raw::new().with_nb_bytes(SizeRange::exact(2)))),
        ],
    );
    let codec = Codec::new(symbol).expect("codec");
    let err = codec.abstract_data(&Memory::new(), b"PK\x04zz").expect_err("wrong version");
    assert_eq!(
        err,
        CodecError::MatchFailure {
            symbol: "Header".to_string(),
            field: "version".to_string(),
            offset: 16,
        }
    );

    let err = codec.abstract_data(&Memory::new(), b"PK\x03zzz").expect_err("trailing byte");
    match err {
        CodecError::MatchFailure { field, offset, .. } => {
            assert_eq!(field, "<end of symbol>");
            assert_eq!(offset, 40);
        }
        other => panic!("expected a match failure, got {:?}", other),
    }
}

#[test]
fn value_relationship_copies_target() {
    let symbol = Symbol::new(
        "Echoed",
        vec![
            Field::new("a", Variable::data(Raw::new().with_nb_bytes(SizeRange::exact(3)))),
            Field::new("copy", Variable::value("a", Raw::new().with_nb_bytes(SizeRange::exact(3)))),
        ],
    );
    let codec = Codec::new(symbol).expect("codec");
    let bytes = codec.specialize(&Memory::new()).expect("specialize");
    assert_eq!(bytes[..3], bytes[3..]);
    assert!(codec.abstract_data(&Memory::new(), b"abcabd").is_err());
}

#[test]
fn unaligned_fields_abstract_as_bits() {
    let symbol = Symbol::new(
        "Flags",
        vec![
            Field::new("version", Variable::data(BitArray::constant(BitSeq::from_uint(0b0100, 4)))),
            Field::new("ihl", Variable::data(BitArray::new().with_nb_bits(SizeRange::exact(4)))),
            Field::new("flags", Variable::data(BitArray::new().with_nb_bits(SizeRange::exact(3)))),
        ],
    );
    let codec = Codec::new(symbol).expect("codec");
    let memory = Memory::new();
    let tree = codec
        .specialize_with(&memory, &SpecializeOptions::default().with_seed(3))
        .expect("specialize");
    assert_eq!(tree.bits().len(), 11);
    let parsed = codec
        .abstract_bits(&memory, &tree.bits(), AbstractOptions::default())
        .expect("abstract");
    assert_eq!(parsed.bits(), tree.bits());
}

#[test]
fn little_endian_integer_on_the_wire() {
    let symbol = Symbol::new(
        "Le",
        vec![Field::new(
            "n",
            Variable::data(Integer::constant(0x1234).with_size(16).with_endianness(Endianness::Little)),
        )],
    );
    let bytes = specialize(&symbol, &Memory::new(), None).expect("specialize");
    assert_eq!(bytes, vec![0x34, 0x12]);
}

#[test]
fn specialization_errors_name_the_field() {
    // Interval cannot be represented on 4 bits.
    let symbol = Symbol::new(
        "Bad",
        vec![Field::new("n", Variable::data(Integer::new().with_size(4).with_interval(0, 100)))],
    );
    let codec = Codec::new(symbol).expect("codec");
    match codec.specialize(&Memory::new()) {
        Err(CodecError::Specialization { field, .. }) => assert_eq!(field, "n"),
        other => panic!("expected a specialization error, got {:?}", other),
    }
}

#[test]
fn seeds_make_specialization_reproducible() {
    let codec = Codec::new(echo_symbol()).expect("codec");
    let a = codec
        .specialize_with(&Memory::new(), &SpecializeOptions::default().with_seed(42))
        .expect("specialize")
        .to_bytes();
    let b = codec
        .specialize_with(&Memory::new(), &SpecializeOptions::default().with_seed(42))
        .expect("specialize")
        .to_bytes();
    assert_eq!(a, b);
}

#[test]
fn nested_aggregate_binds_named_leaves() {
    let symbol = Symbol::new(
        "Nested",
        vec![Field::new(
            "hdr",
            Variable::aggregate(vec![
                Variable::data(Integer::constant(1).with_size(8)).named("ver"),
                Variable::data(u16_int()).named("port"),
            ]),
        )],
    );
    let codec = Codec::new(symbol).expect("codec");
    let tree = codec.abstract_data(&Memory::new(), &[1, 0x1f, 0x90]).expect("abstract");
    assert_eq!(tree.value_of("port").and_then(Value::as_int), Some(8080));
    let root = &tree.field("hdr").expect("hdr").node;
    assert!(matches!(root.kind, BoundKind::Aggregate(ref c) if c.len() == 2));
    assert!(matches!(
        &codec.symbol().fields[0].domain.kind,
        VariableKind::Aggregate(children) if children.len() == 2
    ));
}

#[test]
fn boundary_strategy_generates_edge_values_only() {
    let net: Ipv4Net = "10.0.0.0/24".parse().expect("cidr");
    let symbol = Symbol::new(
        "Edges",
        vec![
            Field::new("num", Variable::data(Integer::new().with_interval(10, 20))),
            Field::new("addr", Variable::data(Ipv4::in_network(net))),
            Field::new("flags", Variable::data(BitArray::new().with_nb_bits(SizeRange::exact(8)))),
            Field::new(
                "items",
                Variable::repeat(Variable::data(u8_int().with_interval(0, 3)), RepeatCount::Range(2, 5)),
            ),
            Field::new("tail", Variable::data(Raw::new().with_nb_bytes(SizeRange::between(1, 3)).with_alphabet(b"az"))),
        ],
    );
    let codec = Codec::new(symbol).expect("codec");
    let memory = Memory::new();
    let mut nums = HashSet::new();
    for seed in 0..64u64 {
        let options = SpecializeOptions::default()
            .with_seed(seed)
            .with_strategy(GenerationStrategy::Boundary);
        let produced = codec.specialize_with(&memory, &options).expect("specialize");

        let num = produced.value_of("num").and_then(Value::as_int).expect("num");
        assert!([10, 11, 19, 20].contains(&num), "seed {}: {}", seed, num);
        nums.insert(num);
        let addr = produced.field("addr").and_then(|f| f.value()).and_then(Value::as_ipv4).expect("addr");
        assert!(addr == Ipv4Addr::new(10, 0, 0, 1) || addr == Ipv4Addr::new(10, 0, 0, 254), "{}", addr);
        let flags = produced.field("flags").expect("flags").bits.to_bytes();
        assert!(flags == [0x00] || flags == [0xff], "{:?}", flags);
        let items = produced.field("items").expect("items");
        assert!(matches!(&items.node.kind, BoundKind::Repeat(its) if its.len() == 2 || its.len() == 5));
        assert!(items.bits.to_bytes().iter().all(|b| [0, 1, 2, 3].contains(b)));
        let tail = produced.field("tail").expect("tail").bits.to_bytes();
        assert!([&b"a"[..], &b"z"[..], &b"aaa"[..], &b"zzz"[..]].contains(&tail.as_slice()), "{:?}", tail);

        let parsed = codec.abstract_data(&memory, &produced.to_bytes()).expect("abstract");
        assert_eq!(parsed.bits(), produced.bits());
    }
    assert!(nums.contains(&10) && nums.contains(&20), "{:?}", nums);
}

#[test]
fn boundary_strategy_is_reproducible() {
    let codec = Codec::new(echo_symbol()).expect("codec");
    let options = SpecializeOptions::default()
        .with_seed(7)
        .with_strategy(GenerationStrategy::Boundary);
    let a = codec.specialize_with(&Memory::new(), &options).expect("specialize").to_bytes();
    let b = codec.specialize_with(&Memory::new(), &options).expect("specialize").to_bytes();
    assert_eq!(a, b);
    let payload = a[8..].to_vec();
    assert!(payload.is_empty() || payload == vec![0xff; 16] || payload == vec![0x00; 16], "{:?}", payload);
}
