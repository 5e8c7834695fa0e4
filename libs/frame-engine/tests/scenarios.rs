use frame_engine::{ColumnValues, FrameBuilder, Kind, Row, Value};
use serde_json::json;

#[test]
fn test_late_column_is_left_padded() {
    let mut builder = FrameBuilder::new("response");
    for i in 1..=5i32 {
        let mut pairs = vec![
            ("id".to_string(), Value::Int32(i)),
            ("active".to_string(), Value::Bool(i % 2 == 0)),
            ("tags".to_string(), Value::Structured(json!(["a", i]))),
        ];
        if i >= 3 {
            pairs.push(("note".to_string(), Value::String(format!("note {i}"))));
        }
        builder.push_row(Row::Named(pairs)).unwrap();
    }
    let frame = builder.finish();

    assert_eq!(frame.columns.len(), 4);
    for column in &frame.columns {
        assert_eq!(column.len(), 5, "column {}", column.name);
    }
    assert_eq!(frame.column("id").unwrap().values, ColumnValues::Int32(vec![1, 2, 3, 4, 5]));
    assert_eq!(frame.column("tags").unwrap().kind(), Kind::Structured);
    assert_eq!(
        frame.column("note").unwrap().values,
        ColumnValues::String(vec![
            String::new(),
            String::new(),
            "note 3".into(),
            "note 4".into(),
            "note 5".into(),
        ])
    );
}

#[test]
fn test_zero_rows_with_manifest_keeps_columns() {
    let frame = FrameBuilder::with_manifest("response", ["id", "email"]).finish();
    let names: Vec<_> = frame.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "email"]);
    assert!(frame.columns.iter().all(|c| c.is_empty()));
}

#[test]
fn test_zero_rows_without_manifest_is_empty_frame() {
    let frame = FrameBuilder::new("response").finish();
    assert_eq!(frame.row_count(), 0);
    assert!(frame.columns.is_empty());
}

#[test]
fn test_integer_then_text_promotes_without_fault() {
    let mut builder = FrameBuilder::new("response");
    builder.push_row(Row::named([("v", Value::Int32(42))])).unwrap();
    builder.push_row(Row::named([("v", Value::from("n/a"))])).unwrap();
    let frame = builder.finish();
    assert_eq!(
        frame.column("v").unwrap().values,
        ColumnValues::String(vec!["42".into(), "n/a".into()])
    );
}

#[test]
fn test_null_seeded_column_takes_booleans() {
    let flags = [true, false, true];
    let mut builder = FrameBuilder::new("response");
    builder.push_row(Row::named([("flag", Value::Null)])).unwrap();
    for flag in flags {
        builder.push_row(Row::named([("flag", flag)])).unwrap();
    }
    let frame = builder.finish();
    let column = frame.column("flag").unwrap();

    assert_eq!(column.len(), frame.row_count());
    let ColumnValues::Bool(values) = &column.values else {
        panic!("expected bool column, got {:?}", column.kind());
    };
    let real: Vec<bool> = values
        .iter()
        .enumerate()
        .filter(|(i, _)| !column.is_null(*i))
        .map(|(_, v)| *v)
        .collect();
    assert_eq!(real, flags);
}

#[test]
fn test_structured_text_decodes_to_original() {
    let nested = json!({
        "address": {"city": "Glendale", "zip": "91205"},
        "roles": ["admin", {"scope": [1, 2.5, null, true]}],
    });
    let mut builder = FrameBuilder::new("response");
    builder
        .push_row(Row::named([("profile", Value::Structured(nested.clone()))]))
        .unwrap();
    let frame = builder.finish();

    let ColumnValues::Structured(texts) = &frame.column("profile").unwrap().values else {
        panic!("expected structured column");
    };
    let decoded: serde_json::Value = serde_json::from_str(&texts[0]).unwrap();
    assert_eq!(decoded, nested);
}

#[test]
fn test_json_documents_convert_end_to_end() {
    let docs = [
        json!({"id": 1, "email": "a@x.io", "score": 10}),
        json!({"id": 2, "email": null, "score": 7.5}),
        json!({"id": 3, "score": 8_000_000_000i64, "address": {"city": "Oslo"}}),
    ];
    let mut builder = FrameBuilder::new("response");
    for doc in docs {
        let serde_json::Value::Object(map) = doc else { unreachable!() };
        builder.push_row(Row::named(map)).unwrap();
    }
    let frame = builder.finish();

    assert_eq!(frame.row_count(), 3);
    assert_eq!(frame.column("score").unwrap().values, ColumnValues::Float64(vec![10.0, 7.5, 8e9]));
    assert_eq!(
        frame.column("email").unwrap().values,
        ColumnValues::String(vec!["a@x.io".into(), String::new(), String::new()])
    );
    assert_eq!(
        frame.column("address").unwrap().values,
        ColumnValues::Structured(vec!["null".into(), "null".into(), r#"{"city":"Oslo"}"#.into()])
    );
}
