use super::*;

#[test]
fn push_keeps_texts_and_metadata_aligned() {
    let mut store = DocumentStore::new();
    assert!(store.is_empty());

    store.push("alpha".to_string(), SourceMetadata::new("a.txt"));
    store.push("beta".to_string(), SourceMetadata::new("b.txt"));

    assert_eq!(store.len(), 2);
    let record = store.get(1).expect("should find second record");
    assert_eq!(record.id, 1);
    assert_eq!(record.text, "beta");
    assert_eq!(record.metadata.source, "b.txt");
    assert!(store.get(2).is_none());
}

#[test]
fn iter_yields_records_in_insertion_order() {
    let mut store = DocumentStore::new();
    for name in ["c.txt", "a.txt", "b.txt"] {
        store.push(format!("text of {name}"), SourceMetadata::new(name));
    }

    for record in store.iter() {
        assert_eq!(record.text, format!("text of {}", record.metadata.source));
    }
    assert_eq!(
        store.sources().collect::<Vec<_>>(),
        vec!["c.txt", "a.txt", "b.txt"]
    );
}

#[test]
fn from_parts_rejects_misaligned_sequences() {
    let result = DocumentStore::from_parts(
        vec!["one".to_string(), "two".to_string()],
        vec![SourceMetadata::new("one.txt")],
    );
    assert_eq!(
        result,
        Err(MisalignedStore {
            documents: 2,
            metadatas: 1
        })
    );

    let store = DocumentStore::from_parts(
        vec!["one".to_string()],
        vec![SourceMetadata::new("one.txt")],
    )
    .expect("aligned parts should be accepted");
    assert_eq!(store.documents(), ["one".to_string()]);
    assert_eq!(store.metadatas(), [SourceMetadata::new("one.txt")]);
}

#[test]
fn metadata_serializes_as_source_object() {
    let json = serde_json::to_string(&SourceMetadata::new("report.pdf"))
        .expect("should serialize metadata");
    assert_eq!(json, r#"{"source":"report.pdf"}"#);
}
