// Integration tests for semdex
use semdex::pipeline;
use semdex::prelude::*;
use semdex_core::ClusterConfig;
use std::io::Write;
use std::sync::Arc;

fn noise_parking_corpus() -> Vec<Document> {
    vec![
        Document::new("1", "Loud music and party noise next door"),
        Document::new("2", "Party noise and loud music all night"),
        Document::new("3", "Illegal parking blocking the driveway"),
        Document::new("4", "Car illegal parking blocking driveway"),
    ]
}

fn residential_parking_corpus() -> Vec<Document> {
    vec![
        Document::new("1", "noise residential loud music"),
        Document::new("2", "noise residential banging pounding"),
        Document::new("3", "illegal parking blocked hydrant"),
        Document::new("4", "illegal parking blocked sidewalk"),
    ]
}

fn small_config(min_df: usize) -> PipelineConfig {
    PipelineConfig {
        min_document_frequency: min_df,
        num_components: 2,
        num_clusters: 2,
        ..Default::default()
    }
}

fn mixed_corpus(n: usize) -> Vec<Document> {
    let templates = [
        "Noise - Residential - Loud Music/Party",
        "Noise - Street/Sidewalk - Loud Talking",
        "Illegal Parking - Blocked Hydrant",
        "Illegal Parking - Double Parked Blocking Traffic",
        "Blocked Driveway - No Access",
        "Heat/Hot Water - Entire Building",
        "Water System - Leak (Use Comments)",
    ];
    (0..n)
        .map(|i| Document::new(i as u64, templates[i % templates.len()]))
        .collect()
}

#[test]
fn test_scenario_separates_topics() {
    for min_df in [1, 2] {
        let state = pipeline::fit(noise_parking_corpus(), &small_config(min_df)).unwrap();

        let hits = state.similarity_search("loud party noise", 4).unwrap();
        assert_eq!(hits.len(), 4);
        let score = |id: &str| {
            hits.iter()
                .find(|h| h.document_id.as_str() == id)
                .map(|h| h.score)
                .unwrap()
        };
        let top = hits[0].document_id.as_str();
        assert!(top == "1" || top == "2");
        assert!(hits[0].score > score("3"));
        assert!(hits[0].score > score("4"));

        let cluster = |id: &str| state.assign_cluster(&DocumentId::from(id)).unwrap();
        assert_eq!(cluster("1"), cluster("2"));
        assert_eq!(cluster("3"), cluster("4"));
        assert_ne!(cluster("1"), cluster("3"));
    }
}

#[test]
fn test_residential_noise_matches_through_shared_term() {
    // min_df 2 keeps only noise/residential/illegal/parking/blocked
    for min_df in [1, 2] {
        let state = pipeline::fit(residential_parking_corpus(), &small_config(min_df)).unwrap();

        let cluster = |id: &str| state.assign_cluster(&DocumentId::from(id)).unwrap();
        assert_eq!(cluster("1"), cluster("2"));
        assert_eq!(cluster("3"), cluster("4"));
        assert_ne!(cluster("1"), cluster("3"));

        let top = state.similarity_search("loud party noise", 1).unwrap();
        assert_eq!(top.len(), 1);
        let best = top[0].document_id.as_str();
        assert!(best == "1" || best == "2", "min_df {min_df}: top hit {best}");

        let all = state.similarity_search("loud party noise", 4).unwrap();
        for parking in ["3", "4"] {
            let score = all
                .iter()
                .find(|h| h.document_id.as_str() == parking)
                .map(|h| h.score)
                .unwrap();
            assert!(top[0].score > score, "min_df {min_df}: {} vs {score}", top[0].score);
        }
    }
}

#[test]
fn test_cluster_membership_is_exact_partition() {
    let docs = mixed_corpus(70);
    let config = PipelineConfig {
        num_components: 5,
        num_clusters: 4,
        ..Default::default()
    };
    let state = pipeline::fit(docs.clone(), &config).unwrap();

    let mut seen: Vec<DocumentId> = state
        .clusters()
        .clusters()
        .iter()
        .flat_map(|c| c.members.iter().cloned())
        .collect();
    seen.sort();
    let mut expected: Vec<DocumentId> = docs.iter().map(|d| d.id.clone()).collect();
    expected.sort();
    assert_eq!(seen, expected);

    let report = state.cluster_report(3, 5).unwrap();
    assert_eq!(report.iter().map(|c| c.size).sum::<usize>(), 70);
    for summary in &report {
        assert!(summary.representative_document_ids.len() <= 3);
        assert!(summary.top_terms.len() <= 5);
        assert!(summary
            .top_terms
            .windows(2)
            .all(|w| w[0].weight >= w[1].weight));
    }
}

#[test]
fn test_seeded_fit_is_reproducible() {
    let config = PipelineConfig {
        num_components: 4,
        num_clusters: 3,
        ..Default::default()
    };
    let a = pipeline::fit(mixed_corpus(49), &config).unwrap();
    let b = pipeline::fit(mixed_corpus(49), &config).unwrap();

    assert_eq!(a.clusters().labels(), b.clusters().labels());
    assert_eq!(a.basis().singular_values(), b.basis().singular_values());
    let ha = a.similarity_search("loud music", 10).unwrap();
    let hb = b.similarity_search("loud music", 10).unwrap();
    assert_eq!(ha, hb);
}

#[test]
fn test_self_similarity_and_ordering() {
    let state = pipeline::fit(mixed_corpus(21), &PipelineConfig {
        num_components: 10,
        num_clusters: 3,
        ..Default::default()
    })
    .unwrap();

    for doc in state.documents().iter().take(7) {
        let hits = state.similarity_search(&doc.text, 21).unwrap();
        let own = hits.iter().find(|h| h.document_id == doc.id).unwrap();
        assert!((own.score - 1.0).abs() < 1e-4, "self score {}", own.score);
        assert!((hits[0].score - 1.0).abs() < 1e-4);
        assert!(hits.windows(2).all(|w| {
            w[0].score > w[1].score
                || (w[0].score == w[1].score && w[0].document_id < w[1].document_id)
        }));
    }

    assert_eq!(state.similarity_search("noise", 5).unwrap().len(), 5);
    assert_eq!(state.similarity_search("noise", 500).unwrap().len(), 21);
    assert!(state.similarity_search("noise", 0).unwrap().is_empty());
}

#[test]
fn test_degenerate_documents_and_queries() {
    let mut docs = noise_parking_corpus();
    docs.push(Document::new("5", "It is what it was, and so on!!"));
    docs.push(Document::new("6", "   "));
    let state = pipeline::fit(docs, &small_config(1)).unwrap();

    assert_eq!(state.info().dropped_blank, 1);
    assert_eq!(state.info().zero_vector_documents, 1);
    assert!(state.embedding(&DocumentId::from("5")).unwrap().is_zero());

    // out-of-vocabulary query: zero scores, ordered by id
    let hits = state.similarity_search("xylophone zebra 123", 5).unwrap();
    assert!(hits.iter().all(|h| h.score == 0.0));
    let ids: Vec<&str> = hits.iter().map(|h| h.document_id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
}

#[test]
fn test_component_count_clamped_to_rank() {
    let config = PipelineConfig {
        min_document_frequency: 1,
        num_components: 150,
        num_clusters: 2,
        ..Default::default()
    };
    let state = pipeline::fit(noise_parking_corpus(), &config).unwrap();
    assert_eq!(state.basis().requested_k(), 150);
    assert!(state.basis().effective_k() <= 4);
    assert_eq!(state.info().effective_components, state.basis().effective_k());
}

#[test]
fn test_fit_errors() {
    assert!(matches!(
        pipeline::fit(Vec::new(), &small_config(1)),
        Err(Error::EmptyCorpus)
    ));
    assert!(matches!(
        pipeline::fit(noise_parking_corpus(), &small_config(3)),
        Err(Error::EmptyVocabulary { min_document_frequency: 3, .. })
    ));
    let too_many = PipelineConfig {
        num_clusters: 5,
        ..small_config(1)
    };
    assert!(matches!(
        pipeline::fit(noise_parking_corpus(), &too_many),
        Err(Error::InvalidClusterCount { requested: 5, documents: 4 })
    ));
    assert!(matches!(
        ClusterModel::fit(&[], &[], &ClusterConfig::default()),
        Err(Error::EmptyCorpus)
    ));
}

#[test]
fn test_ingest_fit_save_reload() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let input = temp_dir.path().join("complaints.jsonl");
    let mut file = std::fs::File::create(&input).unwrap();
    for (key, kind, descriptor, borough) in [
        (1, "Noise - Residential", "Loud Music/Party", "BROOKLYN"),
        (2, "Noise - Residential", "Loud Talking", "QUEENS"),
        (3, "Illegal Parking", "Blocked Hydrant", "BRONX"),
        (4, "Illegal Parking", "Double Parked Blocking Traffic", "BRONX"),
        (5, "Illegal Parking", "", "BRONX"),
    ] {
        writeln!(
            file,
            "{}",
            serde_json::json!({
                "unique_key": key,
                "complaint_type": kind,
                "descriptor": descriptor,
                "borough": borough
            })
        )
        .unwrap();
    }
    drop(file);

    let report = semdex::read_documents_file(&input).unwrap();
    assert_eq!(report.documents.len(), 4);
    assert_eq!(report.skipped, vec![5]);

    let state = pipeline::fit(report.documents, &small_config(1)).unwrap();
    let store = ArtifactStore::open(temp_dir.path().join("model")).unwrap();
    store.save_state(&state).unwrap();
    let loaded = store.load_state().unwrap();

    let hits = loaded.similarity_search("loud music party", 2).unwrap();
    let summary = semdex::location_summary(&hits, 5);
    assert_eq!(summary.total, 2);
    assert!(summary.boroughs.iter().all(|b| b.value != "BRONX"));
    assert_eq!(
        loaded.assign_cluster(&DocumentId::from("3")).unwrap(),
        state.assign_cluster(&DocumentId::from("3")).unwrap()
    );
}

#[test]
fn test_records_without_ids_fit_alongside_numeric_ids() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let input = temp_dir.path().join("mixed.jsonl");
    std::fs::write(
        &input,
        "{\"id\": \"2\", \"text\": \"Loud music party\"}\n\
         {\"text\": \"Illegal parking blocked hydrant\"}\n\
         {\"id\": \"9\", \"text\": \"Loud party noise\"}\n",
    )
    .unwrap();

    let report = semdex::read_documents_file(&input).unwrap();
    let ids: Vec<&str> = report.documents.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "line-2", "9"]);

    let state = pipeline::fit(report.documents, &small_config(1)).unwrap();
    assert_eq!(state.len(), 3);
    assert!(state.assign_cluster(&DocumentId::from("line-2")).is_ok());
}

#[test]
fn test_handle_swap_under_concurrent_readers() {
    let handle = Arc::new(ModelHandle::with_state(
        pipeline::fit(noise_parking_corpus(), &small_config(1)).unwrap(),
    ));

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let handle = handle.clone();
            scope.spawn(move || {
                for _ in 0..50 {
                    let snapshot = handle.current().unwrap();
                    let hits = snapshot.similarity_search("parking", 3).unwrap();
                    assert_eq!(hits.len(), 3);
                }
            });
        }
        for _ in 0..3 {
            handle.publish(pipeline::fit(noise_parking_corpus(), &small_config(1)).unwrap());
        }
    });

    assert_eq!(handle.generation(), 4);
}
