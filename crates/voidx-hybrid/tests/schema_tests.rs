use voidx_core::config::IndexConfig;
use voidx_core::Error;
use voidx_hybrid::field::{IndexDefaults, CREATOR_ID, DEFAULT_PRIMARY_KEY};
use voidx_hybrid::{Field, FieldSet, FieldType};
use voidx_vector::DataType;

fn defaults() -> IndexDefaults {
    IndexDefaults {
        dense: IndexConfig::hnsw(30, 360),
        dense_metric: "IP".into(),
        sparse: IndexConfig::sparse_inverted(0.2),
        sparse_metric: "IP".into(),
    }
}

#[test]
fn reserved_fields_are_added() {
    let set = FieldSet::resolve(vec![Field::text("body").indexed()]).expect("resolve");
    let names: Vec<&str> = set.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec![DEFAULT_PRIMARY_KEY, "body", CREATOR_ID]);
    assert!(set.primary().is_primary);
    assert!(set.get(CREATOR_ID).expect("creator").nullable);

    let set = FieldSet::resolve(vec![Field::int64("doc_no").primary(), Field::int64(CREATOR_ID)])
        .expect("resolve");
    assert_eq!(set.primary().name, "doc_no");
    assert_eq!(set.fields().len(), 2, "caller's creator_id is kept as declared");
    assert!(!set.get(CREATOR_ID).expect("creator").nullable);
}

#[test]
fn invalid_field_lists_are_rejected() {
    let cases = vec![
        vec![Field::int64("a").primary(), Field::int64("b").primary()],
        vec![Field::int64("n").indexed()],
        vec![Field::text("t"), Field::text("t")],
        vec![Field::text("pk").primary()],
        vec![Field::new("x", FieldType::Unknown)],
        vec![Field::text("body").indexed(), Field::new("dense_body", FieldType::DenseVector)],
        vec![Field::text("id")],
        vec![Field::text(" ")],
    ];
    for fields in cases {
        let err = FieldSet::resolve(fields.clone()).expect_err("must be rejected");
        assert!(matches!(err, Error::InvalidArg(_)), "{fields:?}: {err}");
    }
}

#[test]
fn indexable_text_materializes_vector_columns() {
    let set = FieldSet::resolve(vec![Field::text("text_content").indexed(), Field::text("note")])
        .expect("resolve");

    let dense_only = set.to_schema(4, false);
    assert_eq!(
        dense_only.column_names(),
        vec!["id", "text_content", "dense_text_content", "note", "creator_id"]
    );
    let dense = dense_only.column("dense_text_content").expect("dense");
    assert_eq!(dense.data_type, DataType::FloatVector { dim: 4 });
    let text = dense_only.column("text_content").expect("text");
    assert_eq!(text.data_type, DataType::VarChar { max_length: 65535 });

    let hybrid = set.to_schema(4, true);
    let sparse = hybrid.column("sparse_text_content").expect("sparse");
    assert_eq!(sparse.data_type, DataType::SparseFloatVector);
    assert!(hybrid.column("sparse_note").is_none());

    let names: Vec<String> =
        set.index_specs(true, &defaults()).into_iter().map(|s| s.index_name).collect();
    assert_eq!(names, vec!["index_dense_text_content", "index_sparse_text_content"]);
    let specs = set.index_specs(false, &defaults());
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].config.index_type, "HNSW");
    assert_eq!(specs[0].metric, "IP");
}

#[test]
fn declared_vector_fields_get_their_own_index() {
    let set = FieldSet::resolve(vec![
        Field::new("emb", FieldType::DenseVector),
        Field::new("terms", FieldType::SparseVector),
    ])
    .expect("resolve");
    let specs = set.index_specs(false, &defaults());
    let names: Vec<&str> = specs.iter().map(|s| s.index_name.as_str()).collect();
    assert_eq!(names, vec!["index_emb", "index_terms"]);
    assert_eq!(specs[1].config.index_type, "SPARSE_INVERTED_INDEX");
    assert_eq!(set.scalar_names(), vec!["id", "creator_id"]);
}

#[test]
fn schema_round_trips_through_columns() {
    let set = FieldSet::resolve(vec![
        Field::int64("id").primary(),
        Field::text("title").indexed().described("headline"),
        Field::text("body").indexed(),
        Field::text("lang").nullable(),
    ])
    .expect("resolve");
    let rebuilt = FieldSet::from_schema(&set.to_schema(8, true)).expect("rebuild");
    assert_eq!(rebuilt, set);
}

#[test]
fn fields_deserialize_from_json() {
    let json = r#"[
        {"name": "id", "type": "int64", "is_primary": true},
        {"name": "text_content", "type": "text", "indexing": true, "description": "chunk"},
        {"name": "blob", "type": "binary"}
    ]"#;
    let fields: Vec<Field> = serde_json::from_str(json).expect("parse");
    assert!(fields[0].is_primary);
    assert!(fields[1].is_indexable());
    assert_eq!(fields[2].field_type, FieldType::Unknown);
    assert!(FieldSet::resolve(fields).is_err());
}
