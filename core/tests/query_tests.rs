use search_core::docstore::DocumentStore;
use search_core::persist;
use search_core::{IndexConfig, IndexPaths, IndexRouter, Occurrences, Posting, QueryEngine, Ranking, RawDocument};
use tempfile::TempDir;

fn posting(doc: u32, text: u32) -> Posting {
    Posting::new(doc, Occurrences { text_count: text, ..Default::default() })
}

/// "a" in docs 1..=3, "b" in docs 2..=4, with a handful of filler tokens spread across shards.
fn fixture() -> (TempDir, IndexPaths) {
    let dir = tempfile::tempdir().unwrap();
    let paths = IndexPaths::new(dir.path());
    let mut router = IndexRouter::open(paths.clone(), IndexConfig::default().with_shard_count(4), true).unwrap();
    for (token, doc, text) in [
        ("a", 1, 1),
        ("a", 2, 2),
        ("a", 3, 3),
        ("b", 2, 5),
        ("b", 3, 1),
        ("b", 4, 1),
        ("m", 0, 1),
        ("q", 4, 2),
        ("z", 1, 1),
    ] {
        router.add_token(token, posting(doc, text)).unwrap();
    }
    router.save_index().unwrap();

    let mut docs = DocumentStore::new();
    for i in 0..5 {
        docs.register(&format!("https://www.ics.uci.edu/{i}"), Some(format!("Doc {i}")), None);
    }
    let mut save = persist::StagedSave::new(&paths).unwrap();
    persist::stage_docs(&mut save, &docs).unwrap();
    save.commit().unwrap();
    (dir, paths)
}

#[test]
fn intersection_keeps_documents_with_every_token() {
    let (_dir, paths) = fixture();
    let engine = QueryEngine::open(paths, 2).unwrap();
    let hits = engine.query(&["a", "b"]).unwrap();
    let ids: Vec<u32> = hits.iter().map(|h| h.document_id).collect();
    let scores: Vec<f64> = hits.iter().map(|h| h.score).collect();
    assert_eq!(ids, [3, 2]);
    assert_eq!(scores, [3.0, 2.0]);
}

#[test]
fn postings_come_back_by_ascending_text_count() {
    let (_dir, paths) = fixture();
    let engine = QueryEngine::open(paths, 1).unwrap();
    let ids: Vec<u32> = engine.query_token("b").unwrap().iter().map(|p| p.document_id).collect();
    assert_eq!(ids, [3, 4, 2]);
}

#[test]
fn absent_token_empties_the_result() {
    let (_dir, paths) = fixture();
    let engine = QueryEngine::open(paths, 4).unwrap();
    assert!(engine.query(&["a", "nothing"]).unwrap().is_empty());
    assert!(engine.query_token("nothing").unwrap().is_empty());
    assert!(engine.query::<&str>(&[]).unwrap().is_empty());
}

#[test]
fn score_ranking_orders_by_score() {
    let (_dir, paths) = fixture();
    let engine = QueryEngine::open(paths, 4).unwrap().with_ranking(Ranking::Score);
    let hits = engine.query(&["a"]).unwrap();
    let ids: Vec<u32> = hits.iter().map(|h| h.document_id).collect();
    assert_eq!(ids, [3, 2, 1]);
}

#[test]
fn tfidf_ranking_prefers_the_closer_document() {
    let (_dir, paths) = fixture();
    let engine = QueryEngine::open(paths, 4).unwrap().with_ranking(Ranking::TfIdf);
    let hits = engine.query(&["a", "b"]).unwrap();
    let ids: Vec<u32> = hits.iter().map(|h| h.document_id).collect();
    assert_eq!(ids, [2, 3]);
    // Both tokens share idf ln(5/3), so the weights cancel out of the cosine.
    let expected = [7.0 / (2f64.sqrt() * 29f64.sqrt()), 4.0 / (2f64.sqrt() * 10f64.sqrt())];
    for (hit, want) in hits.iter().zip(expected) {
        assert!((hit.score - want).abs() < 1e-9, "{} vs {want}", hit.score);
    }

    let single = engine.query(&["a"]).unwrap();
    assert_eq!(single.len(), 3);
    assert!(single.iter().all(|h| (h.score - 1.0).abs() < 1e-9));
}

#[test]
fn missing_index_cannot_be_opened() {
    let dir = tempfile::tempdir().unwrap();
    assert!(QueryEngine::open(IndexPaths::new(dir.path()), 4).is_err());
}

#[test]
fn search_after_ingestion() {
    let dir = tempfile::tempdir().unwrap();
    let paths = IndexPaths::new(dir.path());
    let mut router = IndexRouter::open(paths.clone(), IndexConfig::default().with_shard_count(16), true).unwrap();
    let pages = [
        ("https://www.ics.uci.edu/graphs", "Graph Mining", "graph mining lab studies networks clustering spectral methods community detection and scale"),
        ("https://www.ics.uci.edu/compilers", "Compilers", "compiler research group parsing optimization register allocation code generation and runtime systems"),
    ];
    for (url, title, body) in pages {
        let content = format!("<html><head><title>{title}</title></head><body><h1>{title}</h1><p>{body}</p></body></html>");
        let doc = RawDocument { url: url.to_string(), content, encoding: String::new() };
        router.add_document(&doc).unwrap();
    }
    router.save_index().unwrap();

    let engine = QueryEngine::open(paths, 8).unwrap();
    let results = engine.search("Mining graphs").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].url, "https://www.ics.uci.edu/graphs");
    assert_eq!(results[0].title, "Graph Mining");
    assert!(results[0].score >= 2.0);

    assert!(engine.search("graph compiler").unwrap().is_empty());
    assert_eq!(engine.search("and").unwrap().len(), 2);
}
