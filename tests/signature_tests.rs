use dbus_marshal::signature::{PrimitiveType, TypeDescriptor, parse_signature, parse_single};
use dbus_marshal::types::{
    DBusType, FieldSpec, GenericKind, HostType, StructDef, compile, compile_with, signature_of,
};
use dbus_marshal::{Error, ErrorKind, ObjectPath, RemoteObject, TypeSignature, Variant};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

fn prim(p: PrimitiveType) -> TypeDescriptor {
    TypeDescriptor::Primitive(p)
}

// ── Compiler ───────────────────────────────────────────────────────────────

#[test]
fn test_primitive_signatures() {
    assert_eq!(signature_of::<u8>().unwrap(), "y");
    assert_eq!(signature_of::<bool>().unwrap(), "b");
    assert_eq!(signature_of::<i16>().unwrap(), "n");
    assert_eq!(signature_of::<u16>().unwrap(), "q");
    assert_eq!(signature_of::<i32>().unwrap(), "i");
    assert_eq!(signature_of::<u32>().unwrap(), "u");
    assert_eq!(signature_of::<i64>().unwrap(), "x");
    assert_eq!(signature_of::<u64>().unwrap(), "t");
    assert_eq!(signature_of::<f64>().unwrap(), "d");
    assert_eq!(signature_of::<String>().unwrap(), "s");
    assert_eq!(signature_of::<&str>().unwrap(), "s");
}

#[test]
fn test_special_type_signatures() {
    assert_eq!(signature_of::<ObjectPath>().unwrap(), "o");
    assert_eq!(signature_of::<RemoteObject>().unwrap(), "o");
    assert_eq!(signature_of::<Variant>().unwrap(), "v");
    assert_eq!(signature_of::<TypeSignature>().unwrap(), "g");
}

#[test]
fn test_container_signatures() {
    assert_eq!(signature_of::<Vec<i32>>().unwrap(), "ai");
    assert_eq!(signature_of::<[u8; 4]>().unwrap(), "ay");
    assert_eq!(signature_of::<Vec<Vec<u8>>>().unwrap(), "aay");
    assert_eq!(signature_of::<HashMap<String, Variant>>().unwrap(), "a{sv}");
    assert_eq!(signature_of::<BTreeMap<u32, Vec<String>>>().unwrap(), "a{uas}");
    assert_eq!(signature_of::<Vec<HashMap<ObjectPath, u8>>>().unwrap(), "aa{oy}");
}

#[test]
fn test_map_with_container_key_is_signature_error() {
    let err = signature_of::<HashMap<Vec<u8>, String>>().unwrap_err();
    assert!(matches!(err, Error::NotBasic(_)));
    assert_eq!(err.kind(), ErrorKind::Signature);
}

#[test]
fn test_map_needs_two_parameters() {
    let ty = HostType::Generic {
        kind: GenericKind::Map,
        args: vec![u8::host_type()],
    };
    assert_eq!(compile(&ty).unwrap_err(), Error::MapArity(1));
}

#[test]
fn test_unbound_parameter_is_variant() {
    let ty = HostType::list(HostType::Param("T".into()));
    assert_eq!(compile(&ty).unwrap()[..], ["av"]);
}

#[test]
fn test_list_of_type_tokens_is_signature() {
    let ty = HostType::list(HostType::TypeToken);
    assert_eq!(compile(&ty).unwrap()[..], ["g"]);
}

#[test]
fn test_unknown_generic_is_not_exportable() {
    let ty = HostType::Generic {
        kind: GenericKind::Other("Future".into()),
        args: vec![u32::host_type()],
    };
    let err = compile(&ty).unwrap_err();
    assert!(matches!(err, Error::NonExportable(_)));
    assert_eq!(err.kind(), ErrorKind::Signature);
}

#[test]
fn test_struct_fields_ordered_by_position() {
    let ty = HostType::structure(StructDef::new(
        "PositionedTriple",
        vec![
            FieldSpec::at("count", 1, i32::host_type()),
            FieldSpec::at("label", 0, String::host_type()),
            FieldSpec::at("enabled", 2, bool::host_type()),
        ],
    ));
    assert_eq!(compile(&ty).unwrap()[..], ["(sib)"]);
}

#[test]
fn test_unpositioned_fields_are_not_on_the_wire() {
    let ty = HostType::structure(StructDef::new(
        "PartlyPositioned",
        vec![
            FieldSpec::unpositioned("cache", String::host_type()),
            FieldSpec::at("id", 0, u32::host_type()),
        ],
    ));
    assert_eq!(compile(&ty).unwrap()[..], ["(u)"]);
}

#[test]
fn test_duplicate_field_position() {
    let ty = HostType::structure(StructDef::new(
        "Clashing",
        vec![
            FieldSpec::at("a", 0, u8::host_type()),
            FieldSpec::at("b", 0, u8::host_type()),
        ],
    ));
    assert_eq!(
        compile(&ty).unwrap_err(),
        Error::DuplicatePosition {
            name: "Clashing".into(),
            position: 0
        }
    );
}

#[test]
fn test_same_name_with_other_positions_conflicts() {
    let first = HostType::structure(StructDef::new(
        "SharedName",
        vec![
            FieldSpec::at("a", 0, u8::host_type()),
            FieldSpec::at("b", 1, String::host_type()),
        ],
    ));
    let retyped = HostType::structure(StructDef::new(
        "SharedName",
        vec![
            FieldSpec::at("a", 0, u16::host_type()),
            FieldSpec::at("b", 1, String::host_type()),
        ],
    ));
    let reordered = HostType::structure(StructDef::new(
        "SharedName",
        vec![
            FieldSpec::at("a", 1, u8::host_type()),
            FieldSpec::at("b", 0, String::host_type()),
        ],
    ));
    assert_eq!(compile(&first).unwrap()[..], ["(ys)"]);
    assert_eq!(compile(&retyped).unwrap()[..], ["(qs)"]);

    let err = compile(&reordered).unwrap_err();
    assert_eq!(err, Error::LayoutConflict("SharedName".into()));
    assert_eq!(err.kind(), ErrorKind::Signature);
}

#[test]
fn test_multi_fragment_struct_field_rejected() {
    let ty = HostType::structure(StructDef::new(
        "HoldsTuple",
        vec![FieldSpec::at("pair", 0, <(u8, u8)>::host_type())],
    ));
    assert_eq!(compile(&ty).unwrap_err(), Error::MultiValued);
}

#[test]
fn test_tuple_yields_one_fragment_per_element() {
    let compiled = compile(&<(u8, String, Vec<i32>)>::host_type()).unwrap();
    assert_eq!(compiled[..], ["y", "s", "ai"]);
    assert!(compile(&<()>::host_type()).unwrap().is_empty());
    assert_eq!(signature_of::<(u8, String, Vec<i32>)>().unwrap(), "ysai");
}

#[test]
fn test_basic_mode_rejects_containers() {
    let err = compile_with(&Vec::<u8>::host_type(), true).unwrap_err();
    assert!(matches!(err, Error::NotBasic(_)));
    assert_eq!(compile_with(&u64::host_type(), true).unwrap(), ["t"]);
    assert_eq!(compile_with(&ObjectPath::host_type(), true).unwrap(), ["o"]);
}

#[test]
fn test_compiled_signatures_are_cached() {
    let ty = BTreeMap::<String, Vec<u16>>::host_type();
    let first = compile(&ty).unwrap();
    let second = compile(&ty).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_concurrent_compilation_is_consistent() {
    let expected = [
        ("a{sv}", HashMap::<String, Variant>::host_type()),
        ("aai", Vec::<Vec<i32>>::host_type()),
        ("a{oas}", BTreeMap::<ObjectPath, Vec<String>>::host_type()),
    ];
    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for (signature, ty) in &expected {
                    assert_eq!(compile(ty).unwrap()[..], [*signature]);
                }
            });
        }
    });
}

// ── Parser ─────────────────────────────────────────────────────────────────

#[test]
fn test_parse_dict() {
    assert_eq!(
        parse_single("a{sv}").unwrap(),
        TypeDescriptor::dict(prim(PrimitiveType::String), TypeDescriptor::Variant)
    );
}

#[test]
fn test_parse_struct() {
    assert_eq!(
        parse_single("(yi)").unwrap(),
        TypeDescriptor::Struct(vec![prim(PrimitiveType::Byte), prim(PrimitiveType::Int32)])
    );
}

#[test]
fn test_parse_nested() {
    let ty = parse_single("a(oa{s(ib)})").unwrap();
    assert_eq!(
        ty,
        TypeDescriptor::array(TypeDescriptor::Struct(vec![
            TypeDescriptor::ObjectReference,
            TypeDescriptor::dict(
                prim(PrimitiveType::String),
                TypeDescriptor::Struct(vec![
                    prim(PrimitiveType::Int32),
                    prim(PrimitiveType::Boolean)
                ]),
            ),
        ]))
    );
    assert_eq!(ty.to_string(), "a(oa{s(ib)})");
}

#[test]
fn test_parse_many() {
    let (types, consumed) = parse_signature("ya{sv}(ii)g", None).unwrap();
    assert_eq!(consumed, 11);
    assert_eq!(types.len(), 4);
    assert_eq!(types[3], TypeDescriptor::Signature);
}

#[test]
fn test_parse_empty_signature() {
    assert_eq!(parse_signature("", None).unwrap(), (vec![], 0));
}

#[test]
fn test_parse_unterminated_struct() {
    let err = parse_single("(yi").unwrap_err();
    assert!(matches!(err, Error::UnterminatedSignature { position: 0, .. }));
    assert_eq!(err.kind(), ErrorKind::Signature);
}

#[test]
fn test_parse_truncated_array() {
    let err = parse_single("aa").unwrap_err();
    assert!(matches!(err, Error::UnterminatedSignature { position: 2, .. }));
}

#[test]
fn test_parse_dict_missing_close() {
    assert!(matches!(
        parse_single("a{sv").unwrap_err(),
        Error::UnterminatedSignature { .. }
    ));
    assert!(matches!(
        parse_single("a{svi}").unwrap_err(),
        Error::UnexpectedToken { found: 'i', .. }
    ));
}

#[test]
fn test_parse_stray_brackets() {
    for signature in [")", "}", "{sv}", "i)"] {
        let err = parse_signature(signature, None).unwrap_err();
        assert!(
            matches!(err, Error::UnexpectedToken { .. }),
            "{signature}: {err:?}"
        );
        assert_eq!(err.kind(), ErrorKind::Signature);
    }
}

#[test]
fn test_parse_dict_key_must_be_basic() {
    let err = parse_single("a{(i)s}").unwrap_err();
    assert!(matches!(err, Error::NotBasic(_)));
    assert_eq!(err.kind(), ErrorKind::Signature);
}

#[test]
fn test_parse_unknown_type_code() {
    let err = parse_signature("iz", None).unwrap_err();
    assert_eq!(
        err,
        Error::UnknownTypeCode {
            signature: "iz".into(),
            position: 1,
            code: 'z'
        }
    );
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[test]
fn test_parse_rejects_oversized_signatures() {
    let deep = "a".repeat(20_000) + "i";
    let err = parse_signature(&deep, None).unwrap_err();
    assert!(matches!(err, Error::SignatureLimit { limit: "length", .. }));
    assert_eq!(err.kind(), ErrorKind::Signature);

    let err = parse_single(&("a".repeat(40) + "i")).unwrap_err();
    assert!(matches!(err, Error::SignatureLimit { limit: "array nesting", .. }));

    let structs = format!("{}y{}", "(".repeat(40), ")".repeat(40));
    let err = parse_single(&structs).unwrap_err();
    assert!(matches!(err, Error::SignatureLimit { limit: "struct nesting", .. }));

    assert!(parse_signature(&"i".repeat(255), None).is_ok());
    assert!(parse_signature(&"i".repeat(256), None).is_err());
}

#[test]
fn test_parse_single_rejects_trailing_types() {
    assert!(matches!(
        parse_single("ii").unwrap_err(),
        Error::UnexpectedToken { position: 1, .. }
    ));
}

#[test]
fn test_compile_then_parse_roundtrip() {
    let types = [
        u8::host_type(),
        Vec::<String>::host_type(),
        HashMap::<String, Variant>::host_type(),
        BTreeMap::<i64, Vec<Vec<ObjectPath>>>::host_type(),
        TypeSignature::host_type(),
        HostType::structure(StructDef::new(
            "RoundTripRecord",
            vec![
                FieldSpec::at("when", 0, u64::host_type()),
                FieldSpec::at("tags", 1, BTreeMap::<String, String>::host_type()),
            ],
        )),
    ];
    for ty in &types {
        let compiled = compile(ty).unwrap();
        let parsed = parse_single(&compiled[0]).unwrap();
        assert_eq!(parsed.to_string(), compiled[0], "{ty}");
    }
    assert_eq!(
        parse_single(&signature_of::<HashMap<String, Variant>>().unwrap()).unwrap(),
        TypeDescriptor::dict(prim(PrimitiveType::String), TypeDescriptor::Variant)
    );
}

#[test]
fn test_type_signature_parse_and_display() {
    let signature: TypeSignature = "a{sv}i".parse().unwrap();
    assert_eq!(signature.types().len(), 2);
    assert_eq!(signature.to_string(), "a{sv}i");
    assert!("a{".parse::<TypeSignature>().is_err());
}

#[test]
fn test_descriptor_from_str() {
    let ty: TypeDescriptor = "as".parse().unwrap();
    assert_eq!(ty, TypeDescriptor::array(prim(PrimitiveType::String)));
    assert!(ty.is_container());
    assert!(prim(PrimitiveType::Double).is_basic());
}
