use super::*;
use crate::store::IndexPersistence;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

const DIMENSION: usize = 3;

/// Embeds text as normalized counts over three keyword buckets:
/// product words, people words, and everything else.
#[derive(Default)]
struct KeywordEmbedder {
    fail: AtomicBool,
    wrong_dimension: bool,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    fn vector(&self, text: &str) -> Vec<f32> {
        let mut counts = vec![0.0_f32; DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = match word.to_lowercase().as_str() {
                "virtual" | "office" | "platform" | "vop" | "digital" | "workspace" => 0,
                "employee" | "roster" | "alice" | "bob" => 1,
                _ => 2,
            };
            counts[bucket] += 1.0;
        }
        let norm = counts.iter().map(|c| c * c).sum::<f32>().sqrt();
        if norm > 0.0 {
            counts.iter_mut().for_each(|c| *c /= norm);
        }
        if self.wrong_dimension {
            counts.push(0.0);
        }
        counts
    }
}

impl Embedder for KeywordEmbedder {
    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("embedding model unavailable");
        }
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

struct Fixture {
    _temp_dir: TempDir,
    documents: PathBuf,
    index: PathBuf,
}

impl Fixture {
    fn new(files: &[(&str, &[u8])]) -> Self {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let documents = temp_dir.path().join("documents");
        let index = temp_dir.path().join("faiss_db");
        fs::create_dir_all(&documents).expect("should create documents dir");
        for (name, contents) in files {
            fs::write(documents.join(name), contents).expect("should write document");
        }
        Self {
            _temp_dir: temp_dir,
            documents,
            index,
        }
    }

    fn scenario() -> Self {
        Self::new(&[
            ("a.txt", b"Virtual Office Platform is a digital workspace."),
            ("b.txt", b"Employee roster: Alice, Bob."),
            ("c.pdf", b"%PDF-1.4 truncated garbage"),
        ])
    }

    fn engine(&self, embedder: KeywordEmbedder) -> RetrievalEngine<KeywordEmbedder> {
        RetrievalEngine::new(embedder, FileProcessor::new(), &self.documents, &self.index)
    }
}

#[test]
fn builds_from_readable_files_and_skips_failures() {
    let fixture = Fixture::scenario();
    let mut engine = fixture.engine(KeywordEmbedder::default());

    let outcome = engine.build_or_load().expect("build should succeed");
    assert_eq!(
        outcome,
        BuildOutcome::Built {
            documents: 2,
            skipped: 1
        }
    );
    assert_eq!(engine.count(), 2);
    assert!(engine.persistence().exists());

    let result = engine.query("What is VOP?", 1);
    assert_eq!(result.len(), 1);
    assert_eq!(result.metadatas()[0].source, "a.txt");
    assert_eq!(
        result.documents()[0],
        "Virtual Office Platform is a digital workspace."
    );
}

#[test]
fn ranks_best_match_first() {
    let fixture = Fixture::scenario();
    let mut engine = fixture.engine(KeywordEmbedder::default());
    engine.build_or_load().expect("build should succeed");

    let result = engine.query("Who is on the employee roster?", 3);
    let sources: Vec<&str> = result.iter().map(|hit| hit.metadata.source.as_str()).collect();
    assert_eq!(sources, vec!["b.txt", "a.txt"]);
    assert!(result.iter().zip(result.iter().skip(1)).all(|(a, b)| a.distance <= b.distance));
}

#[test]
fn empty_documents_directory_fails_without_artifacts() {
    let fixture = Fixture::new(&[]);
    let mut engine = fixture.engine(KeywordEmbedder::default());

    match engine.build_or_load() {
        Err(DocQaError::NoDocumentsProcessed { attempted, .. }) => assert_eq!(attempted, 0),
        other => panic!("expected NoDocumentsProcessed, got {other:?}"),
    }
    assert!(!engine.is_ready());
    assert!(!fixture.index.exists());
}

#[test]
fn all_files_failing_is_fatal() {
    let fixture = Fixture::new(&[("broken.pdf", b"nope"), ("blank.txt", b"  \n\t ")]);
    let mut engine = fixture.engine(KeywordEmbedder::default());

    match engine.build_or_load() {
        Err(DocQaError::NoDocumentsProcessed { attempted, .. }) => assert_eq!(attempted, 2),
        other => panic!("expected NoDocumentsProcessed, got {other:?}"),
    }
    assert!(!fixture.index.exists());
}

#[test]
fn missing_documents_directory_is_created() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let documents = temp_dir.path().join("kb").join("documents");
    let mut engine = RetrievalEngine::new(
        KeywordEmbedder::default(),
        FileProcessor::new(),
        &documents,
        temp_dir.path().join("kb").join("faiss_db"),
    );

    assert!(engine.build_or_load().is_err());
    assert!(documents.is_dir());
}

#[test]
fn reuses_persisted_generation_unchanged() {
    let fixture = Fixture::scenario();
    let mut first = fixture.engine(KeywordEmbedder::default());
    first.build_or_load().expect("first build should succeed");

    let index_bytes = fs::read(first.persistence().index_file_path()).expect("should read index");
    let metadata_bytes =
        fs::read(first.persistence().metadata_file_path()).expect("should read metadata");

    let mut second = fixture.engine(KeywordEmbedder::default());
    let outcome = second.build_or_load().expect("reload should succeed");

    assert_eq!(outcome, BuildOutcome::Reused { documents: 2 });
    assert_eq!(second.count(), first.count());
    assert_eq!(second.embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        fs::read(second.persistence().index_file_path()).expect("should read index"),
        index_bytes
    );
    assert_eq!(
        fs::read(second.persistence().metadata_file_path()).expect("should read metadata"),
        metadata_bytes
    );
}

#[test]
fn documents_and_sources_stay_aligned() {
    let fixture = Fixture::new(&[
        ("zeta.txt", b"zeta notes"),
        ("alpha.txt", b"alpha notes"),
        ("mid.txt", b"mid notes"),
    ]);
    let mut engine = fixture.engine(KeywordEmbedder::default());
    engine.build_or_load().expect("build should succeed");

    let store = engine.store().expect("engine should be ready");
    let sources: Vec<&str> = store.sources().collect();
    assert_eq!(sources, vec!["alpha.txt", "mid.txt", "zeta.txt"]);
    for record in store.iter() {
        let stem = record
            .metadata
            .source
            .trim_end_matches(".txt");
        assert_eq!(record.text, format!("{stem} notes"));
    }
}

#[test]
fn subdirectories_are_not_ingested() {
    let fixture = Fixture::new(&[("a.txt", b"Virtual Office Platform")]);
    let nested = fixture.documents.join("archive.txt");
    fs::create_dir(&nested).expect("should create nested dir");
    fs::write(nested.join("old.txt"), "old roster").expect("should write nested file");

    let mut engine = fixture.engine(KeywordEmbedder::default());
    let outcome = engine.build_or_load().expect("build should succeed");
    assert_eq!(
        outcome,
        BuildOutcome::Built {
            documents: 1,
            skipped: 0
        }
    );
}

#[test]
fn result_size_is_bounded_by_top_k_and_count() {
    let fixture = Fixture::scenario();
    let mut engine = fixture.engine(KeywordEmbedder::default());
    engine.build_or_load().expect("build should succeed");

    assert_eq!(engine.query("platform", 10).len(), 2);
    assert_eq!(engine.query("platform", 1).len(), 1);
    assert!(engine.query("platform", 0).is_empty());

    let result = engine.query("platform", 10);
    assert_eq!(result.documents().len(), result.metadatas().len());
}

#[test]
fn query_before_build_is_empty() {
    let fixture = Fixture::scenario();
    let engine = fixture.engine(KeywordEmbedder::default());

    assert_eq!(engine.count(), 0);
    assert!(engine.query("What is VOP?", 3).is_empty());
    assert_eq!(engine.embedder.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn query_embedding_failure_degrades_to_empty() {
    let fixture = Fixture::scenario();
    let mut engine = fixture.engine(KeywordEmbedder::default());
    engine.build_or_load().expect("build should succeed");

    engine.embedder.fail.store(true, Ordering::SeqCst);
    let result = engine.query("What is VOP?", 3);
    assert!(result.is_empty());
    assert!(result.documents().is_empty());
    assert!(result.metadatas().is_empty());
}

#[test]
fn build_embedding_failure_propagates() {
    let fixture = Fixture::scenario();
    let embedder = KeywordEmbedder::default();
    embedder.fail.store(true, Ordering::SeqCst);
    let mut engine = fixture.engine(embedder);

    assert!(matches!(
        engine.build_or_load(),
        Err(DocQaError::Embedding(_))
    ));
    assert!(!fixture.index.exists());
}

#[test]
fn dimension_mismatch_fails_build() {
    let fixture = Fixture::scenario();
    let mut engine = fixture.engine(KeywordEmbedder {
        wrong_dimension: true,
        ..KeywordEmbedder::default()
    });

    match engine.build_or_load() {
        Err(DocQaError::DimensionMismatch { expected, actual }) => {
            assert_eq!(expected, DIMENSION);
            assert_eq!(actual, DIMENSION + 1);
        }
        other => panic!("expected DimensionMismatch, got {other:?}"),
    }
    assert!(!engine.is_ready());
    assert!(!fixture.index.exists());
}

#[test]
fn corrupt_generation_triggers_rebuild() {
    let fixture = Fixture::scenario();
    fs::create_dir_all(&fixture.index).expect("should create index dir");
    let persistence = IndexPersistence::new(&fixture.index);
    fs::write(persistence.index_file_path(), b"garbage").expect("should write index");
    fs::write(persistence.metadata_file_path(), b"garbage").expect("should write metadata");

    let mut engine = fixture.engine(KeywordEmbedder::default());
    let outcome = engine.build_or_load().expect("should rebuild");
    assert!(matches!(outcome, BuildOutcome::Built { documents: 2, .. }));
    assert!(persistence.load().is_ok());
}

#[test]
fn half_written_generation_triggers_rebuild() {
    let fixture = Fixture::scenario();
    let mut first = fixture.engine(KeywordEmbedder::default());
    first.build_or_load().expect("build should succeed");
    fs::remove_file(first.persistence().metadata_file_path()).expect("should remove metadata");
    assert!(!first.persistence().exists());

    let mut second = fixture.engine(KeywordEmbedder::default());
    let outcome = second.build_or_load().expect("should rebuild");
    assert!(matches!(outcome, BuildOutcome::Built { .. }));
    assert_eq!(second.embedder.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn generation_of_other_dimension_triggers_rebuild() {
    let fixture = Fixture::scenario();
    let mut index = FlatIndex::new(DIMENSION + 2).expect("should create index");
    index
        .add(&[vec![0.0; DIMENSION + 2]])
        .expect("should add vector");
    let mut store = DocumentStore::new();
    store.push("stale".to_string(), SourceMetadata::new("stale.txt"));
    IndexPersistence::new(&fixture.index)
        .save(&index, &store)
        .expect("should save stale generation");

    let mut engine = fixture.engine(KeywordEmbedder::default());
    let outcome = engine.build_or_load().expect("should rebuild");
    assert_eq!(
        outcome,
        BuildOutcome::Built {
            documents: 2,
            skipped: 1
        }
    );
}

#[test]
fn empty_generation_triggers_rebuild() {
    let fixture = Fixture::scenario();
    IndexPersistence::new(&fixture.index)
        .save(
            &FlatIndex::new(DIMENSION).expect("should create index"),
            &DocumentStore::new(),
        )
        .expect("should save empty generation");

    let mut engine = fixture.engine(KeywordEmbedder::default());
    assert!(matches!(
        engine.build_or_load(),
        Ok(BuildOutcome::Built { documents: 2, .. })
    ));
}

#[test]
fn failed_rebuild_keeps_previous_index() {
    let fixture = Fixture::scenario();
    let mut engine = fixture.engine(KeywordEmbedder::default());
    engine.build_or_load().expect("build should succeed");

    engine.embedder.fail.store(true, Ordering::SeqCst);
    assert!(engine.rebuild().is_err());
    engine.embedder.fail.store(false, Ordering::SeqCst);

    assert_eq!(engine.count(), 2);
    assert_eq!(engine.query("What is VOP?", 1).metadatas()[0].source, "a.txt");
}

#[test]
fn rebuild_picks_up_new_files() {
    let fixture = Fixture::scenario();
    let mut engine = fixture.engine(KeywordEmbedder::default());
    engine.build_or_load().expect("build should succeed");

    fs::write(fixture.documents.join("d.txt"), "Office handbook").expect("should write file");

    assert!(matches!(
        engine.build_or_load(),
        Ok(BuildOutcome::Reused { documents: 2 })
    ));
    assert!(matches!(
        engine.rebuild(),
        Ok(BuildOutcome::Built { documents: 3, .. })
    ));
    assert_eq!(engine.count(), 3);
}

#[test]
fn relevance_policy_filters_distant_hits() {
    let fixture = Fixture::scenario();
    let mut engine = fixture.engine(KeywordEmbedder::default());
    engine.build_or_load().expect("build should succeed");

    let strict = RelevancePolicy::MaxDistance { value: 0.1 };
    assert!(engine.query_with("What is VOP?", 2, &strict).is_empty());

    let loose = RelevancePolicy::MaxDistance { value: 1.0 };
    let result = engine.query_with("What is VOP?", 2, &loose);
    assert_eq!(result.len(), 1);
    assert_eq!(result.metadatas()[0].source, "a.txt");

    assert_eq!(
        engine
            .query_with("What is VOP?", 2, &RelevancePolicy::AcceptAll)
            .len(),
        2
    );
}

#[test]
fn configured_relevance_policy_applies_to_query() {
    let fixture = Fixture::scenario();
    let mut engine = fixture
        .engine(KeywordEmbedder::default())
        .with_relevance(RelevancePolicy::QueryLengthScaled {
            base: 0.7,
            step: 0.1,
            max_words: 5,
        });
    engine.build_or_load().expect("build should succeed");

    // Three words tighten the cutoff to 0.4, one word allows 0.6
    assert!(engine.query("What is VOP?", 2).is_empty());
    let result = engine.query("VOP", 2);
    assert_eq!(result.len(), 1);
    assert_eq!(result.metadatas()[0].source, "a.txt");
}

#[test]
fn relevance_policy_validation() {
    assert!(RelevancePolicy::AcceptAll.validate().is_ok());
    assert!(RelevancePolicy::MaxDistance { value: 0.5 }.validate().is_ok());
    assert!(RelevancePolicy::MaxDistance { value: -0.1 }.validate().is_err());
    assert!(
        RelevancePolicy::MaxDistance { value: f32::NAN }
            .validate()
            .is_err()
    );

    let scaled = |base, step, max_words| RelevancePolicy::QueryLengthScaled {
        base,
        step,
        max_words,
    };
    assert!(scaled(0.7, 0.1, 5).validate().is_ok());
    assert!(scaled(0.7, 0.1, 0).validate().is_err());
    assert!(scaled(0.3, 0.1, 5).validate().is_err());
    assert!(scaled(f32::INFINITY, 0.1, 5).validate().is_err());
}

#[test]
fn scaled_cutoff_caps_word_count() {
    let policy = RelevancePolicy::QueryLengthScaled {
        base: 0.7,
        step: 0.1,
        max_words: 5,
    };
    let cutoff = |q: &str| policy.cutoff(q).expect("scaled policy has a cutoff");

    assert!((cutoff("") - 0.7).abs() < 1e-6);
    assert!((cutoff("one two") - 0.5).abs() < 1e-6);
    assert!((cutoff("a b c d e f g h") - 0.2).abs() < 1e-6);
    assert!(policy.accepts("one two", 0.45));
    assert!(!policy.accepts("one two", 0.55));
    assert_eq!(RelevancePolicy::AcceptAll.cutoff("anything"), None);
    assert!(RelevancePolicy::AcceptAll.accepts("anything", f32::MAX));
}

#[test]
fn relevance_policy_display() {
    assert_eq!(RelevancePolicy::AcceptAll.to_string(), "accept all");
    assert_eq!(
        RelevancePolicy::MaxDistance { value: 0.5 }.to_string(),
        "max distance 0.5"
    );
}

#[test]
fn engine_cell_initializes_once() {
    let fixture = Fixture::scenario();
    let cell: EngineCell<KeywordEmbedder> = EngineCell::new();
    let created = AtomicUsize::new(0);

    for _ in 0..3 {
        let engine = cell
            .get_or_build(|| {
                created.fetch_add(1, Ordering::SeqCst);
                Ok(fixture.engine(KeywordEmbedder::default()))
            })
            .expect("initialization should succeed");
        assert_eq!(engine.count(), 2);
    }

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert!(cell.is_initialized());
}

#[test]
fn engine_cell_retries_after_failed_initialization() {
    let fixture = Fixture::new(&[]);
    let cell: EngineCell<KeywordEmbedder> = EngineCell::default();

    assert!(
        cell.get_or_build(|| Ok(fixture.engine(KeywordEmbedder::default())))
            .is_err()
    );
    assert!(cell.get().is_none());

    fs::write(fixture.documents.join("a.txt"), "Virtual Office Platform")
        .expect("should write document");
    let engine = cell
        .get_or_build(|| Ok(fixture.engine(KeywordEmbedder::default())))
        .expect("second initialization should succeed");
    assert_eq!(engine.count(), 1);
}
