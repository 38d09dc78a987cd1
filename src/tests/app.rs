use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use crate::app::AppContext;
use crate::corpus::Source;
use crate::retrieval::SourceFilter;
use crate::tests::support::{factory_for, VocabEmbedder, POSTS_JSON, WEEK1_NOTE};

/// A data directory laid out the way the default config expects.
fn create_app() -> (AppContext, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");

    std::fs::write(tmp.path().join("discourse_posts.json"), POSTS_JSON).unwrap();
    std::fs::create_dir_all(tmp.path().join("markdown_files")).unwrap();
    std::fs::write(tmp.path().join("markdown_files/week1.md"), WEEK1_NOTE).unwrap();
    std::fs::write(
        tmp.path().join("metadata.json"),
        r#"[{"title": "Week 1", "original_url": "https://notes.example/w1", "filename": "week1.md"}]"#,
    )
    .unwrap();

    let ctx = AppContext::load_with(tmp.path()).expect("failed to load app context");
    (ctx, tmp)
}

#[test]
fn test_build_then_search_through_context() {
    let (ctx, tmp) = create_app();
    let embedder = VocabEmbedder::default();

    let notes = ctx.build_index(&embedder, Source::Note, false).unwrap();
    let posts = ctx.build_index(&embedder, Source::Discourse, false).unwrap();
    assert_eq!(notes.indexed, 1);
    assert_eq!(posts.indexed, 5);
    assert!(tmp.path().join("note.index").exists());
    assert!(tmp.path().join("discourse.meta.json").exists());

    let retrieval = ctx.retrieval(factory_for(
        Arc::new(VocabEmbedder::default()),
        Arc::new(AtomicUsize::new(0)),
    ));
    let answers = retrieval
        .search("arrays", ctx.config.default_top_k, SourceFilter::Note)
        .unwrap();

    assert_eq!(answers.len(), 1);
    assert_eq!(
        answers[0].content,
        "Lecture 1 covers arrays.\nArrays store elements contiguously.\n"
    );
}

#[test]
fn test_build_with_missing_corpus_file_fails() {
    let (ctx, tmp) = create_app();
    std::fs::remove_file(tmp.path().join("discourse_posts.json")).unwrap();

    let result = ctx.build_index(&VocabEmbedder::default(), Source::Discourse, false);
    assert!(result.is_err());
    assert!(!tmp.path().join("discourse.index").exists());
}

#[test]
fn test_shared_state_uses_configured_defaults() {
    let (ctx, _tmp) = create_app();
    let state = ctx.shared_state(factory_for(
        Arc::new(VocabEmbedder::default()),
        Arc::new(AtomicUsize::new(0)),
    ));

    assert_eq!(state.default_top_k, 5);
    assert!(!state.retrieval.is_initialized());
}
