mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{filler, fixture, fixture_with, DIM};
use semdex_core::error::Error;
use semdex_embed::FakeEmbedder;
use semdex_engine::{PreviewKind, SearchRequest};

async fn index_docs(fx: &common::Fixture) {
    let job = fx.engine.start_reindex("docs", None).expect("start");
    let done = fx.engine.wait(&job).await.expect("wait");
    assert_eq!(done.error, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pages_cover_every_file_once_in_rank_order() {
    // small windows give every file several chunks, so hits must be folded
    let fx = fixture_with(
        |s| {
            s.limits.chunk_window = 50;
            s.limits.chunk_overlap = 10;
        },
        Arc::new(FakeEmbedder::new(DIM)),
    );
    for i in 0..7 {
        fx.write(&format!("doc{i}.txt"), &format!("common topic variant{i} {}", filler(40 * (i + 1))));
    }
    index_docs(&fx).await;

    let all = fx.engine.search(&SearchRequest::new("common topic").page(1, 7)).await.expect("all");
    assert_eq!(all.results.len(), 7);
    assert!(!all.has_next);
    assert!(all.results.windows(2).all(|w| w[0].distance <= w[1].distance));

    let mut paged = Vec::new();
    let mut flags = Vec::new();
    for page in 1..=3 {
        let p = fx.engine.search(&SearchRequest::new("common topic").page(page, 3)).await.expect("page");
        flags.push(p.has_next);
        paged.extend(p.results.into_iter().map(|h| h.path));
    }
    assert_eq!(flags, vec![true, true, false]);
    assert_eq!(paged, all.results.iter().map(|h| h.path.clone()).collect::<Vec<_>>());
    assert_eq!(paged.iter().collect::<HashSet<_>>().len(), 7);

    let beyond = fx.engine.search(&SearchRequest::new("common topic").page(4, 3)).await.expect("beyond");
    assert!(beyond.results.is_empty());
    assert!(!beyond.has_next);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn matching_file_ranks_first_and_threshold_filters() {
    let fx = fixture();
    let target = fx.write("target.txt", "zebra quokka");
    fx.write("other.txt", "completely unrelated words here");
    index_docs(&fx).await;

    let page = fx.engine.search(&SearchRequest::new("zebra quokka")).await.expect("search");
    assert_eq!(page.results[0].path, target);
    assert_eq!(page.directories, vec!["docs".to_string(), "empty".to_string()]);

    let mut strict = SearchRequest::new("zebra quokka");
    strict.max_distance = Some(0.1);
    let page = fx.engine.search(&strict).await.expect("search");
    assert_eq!(page.paths(), vec![target.as_str()]);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let fx = fixture();
    let err = |r: Result<semdex_engine::SearchPage, Error>| r.expect_err("should fail");

    assert!(matches!(err(fx.engine.search(&SearchRequest::new("   ")).await), Error::InvalidQuery(_)));
    assert!(matches!(err(fx.engine.search(&SearchRequest::new("x").page(0, 10)).await), Error::InvalidQuery(_)));
    assert!(matches!(err(fx.engine.search(&SearchRequest::new("x").page(1, 0)).await), Error::InvalidQuery(_)));
    assert!(matches!(err(fx.engine.search(&SearchRequest::new("x").page(1, 51)).await), Error::InvalidQuery(_)));
    assert!(matches!(err(fx.engine.search(&SearchRequest::new("x").page(usize::MAX, 10)).await), Error::InvalidQuery(_)));
    assert!(matches!(err(fx.engine.search(&SearchRequest::new("x").page(usize::MAX, 1)).await), Error::InvalidQuery(_)));
    assert!(matches!(err(fx.engine.search(&SearchRequest::new("x").in_directory("nope")).await), Error::DirectoryNotFound(_)));

    let never_indexed = fx.engine.search(&SearchRequest::new("x").in_directory("empty")).await.expect("search");
    assert!(never_indexed.results.is_empty());
    assert!(!never_indexed.has_next);
}

#[tokio::test]
async fn preview_stays_inside_configured_roots() {
    let fx = fixture();
    let a = fx.write("a.txt", "hello preview");
    std::fs::write(fx.tmp.path().join("secret.txt"), "top secret").expect("write secret");

    for path in ["../../etc/passwd", "docs/../secret.txt", "../secret.txt", "/etc/passwd", "docs/missing.txt"] {
        assert!(matches!(fx.engine.preview(path).await, Err(Error::NotFound(_))), "{path} must not be readable");
    }
    assert!(matches!(fx.engine.preview(&fx.tmp.path().join("secret.txt").to_string_lossy()).await, Err(Error::NotFound(_))));

    for path in ["docs/a.txt", "a.txt", a.as_str()] {
        let p = fx.engine.preview(path).await.expect("preview");
        assert_eq!(p.kind, PreviewKind::Text);
        assert_eq!(p.content, "hello preview");
        assert_eq!(p.name, "a.txt");
        assert_eq!(p.size, 13);
        assert!(!p.truncated);
        assert!(p.pages.is_none());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn search_results_preview_with_relative_base_dir() {
    // a base dir relative to the working directory, as in the sample config
    let tmp = tempfile::Builder::new().prefix("semdex-rel").tempdir_in(".").expect("tmp");
    assert!(tmp.path().is_relative());
    common::make_dirs(tmp.path());
    std::fs::write(tmp.path().join("docs/a.txt"), "zebra quokka").expect("write");
    let (engine, _store) = common::engine_for(common::settings(tmp.path()), Arc::new(FakeEmbedder::new(DIM)));

    let job = engine.start_reindex("docs", None).expect("start");
    assert_eq!(engine.wait(&job).await.expect("wait").error, None);
    let page = engine.search(&SearchRequest::new("zebra quokka")).await.expect("search");
    let path = &page.results[0].path;
    assert!(std::path::Path::new(path).is_absolute());

    let preview = engine.preview(path).await.expect("preview of a search result");
    assert_eq!(preview.content, "zebra quokka");
    assert_eq!(&preview.path, path);
}

#[tokio::test]
async fn large_text_preview_is_truncated() {
    let fx = fixture_with(|s| s.limits.max_preview_bytes = 100, Arc::new(FakeEmbedder::new(DIM)));
    fx.write("big.txt", &filler(1000));

    let p = fx.engine.preview("docs/big.txt").await.expect("preview");
    assert!(p.truncated);
    assert_eq!(p.content.len(), 100);
    assert_eq!(p.size, 1000);

    let json = serde_json::to_value(&p).expect("json");
    assert_eq!(json["type"], "text");
    assert!(json.get("pages").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pdf_preview_is_bounded_and_pdf_text_is_searchable() {
    let fx = fixture_with(|s| s.limits.preview_pages = 1, Arc::new(FakeEmbedder::new(DIM)));
    let manual = fx.docs.join("manual.pdf");
    common::write_pdf(&manual, &["zebra quokka", "second page", "third page"]);
    fx.write("other.txt", "completely unrelated words here");

    let p = fx.engine.preview("docs/manual.pdf").await.expect("preview");
    assert_eq!(p.kind, PreviewKind::Pdf);
    assert_eq!(p.pages, Some(3));
    assert_eq!(p.preview_pages, Some(1));
    assert!(p.truncated);
    assert_eq!(p.content.trim(), "zebra quokka");
    assert_eq!(p.size, std::fs::metadata(&manual).expect("meta").len());
    assert_eq!(serde_json::to_value(&p).expect("json")["type"], "pdf");

    index_docs(&fx).await;
    let page = fx.engine.search(&SearchRequest::new("zebra quokka")).await.expect("search");
    assert_eq!(page.results[0].path, manual.to_string_lossy());
}

#[tokio::test]
async fn unreadable_pdf_preview_is_an_extraction_failure() {
    let fx = fixture();
    fx.write("broken.pdf", "not a pdf");
    assert!(matches!(fx.engine.preview("docs/broken.pdf").await, Err(Error::ExtractionFailure { .. })));
}
