//! Index accessor and subgraph retriever behavior.

mod common;

use std::sync::Arc;

use common::*;
use graphrag_core::{ErrorKind, SubgraphContext};
use graphrag_engine::config::RetrievalConfig;
use graphrag_engine::index::IndexAccessor;
use graphrag_engine::retriever::SubgraphRetriever;
use serde_json::json;

/// Every hit has `fan_out` neighbors; every neighbor has `fan_out` more.
fn star_graph(hits: usize, fan_out: usize) -> MockGraph {
    let mut graph = MockGraph::default();
    for h in 0..hits {
        let hit_id = format!("h{h}");
        graph
            .hits
            .push(hit(&hit_id, "Patient", 0.9 - h as f64 * 0.01, json!({ "id": hit_id })));
        let mut frontier = vec![hit_id];
        for depth in 0..2 {
            let mut next = Vec::new();
            for parent in &frontier {
                let children: Vec<_> = (0..fan_out)
                    .map(|i| {
                        let id = format!("{parent}-{depth}-{i}");
                        next.push(id.clone());
                        neighbor(&id, "Condition", json!({ "name": id }), rel(parent, "HAS_CONDITION", &id))
                    })
                    .collect();
                graph.neighbors.insert(parent.clone(), children);
            }
            frontier = next;
        }
    }
    graph
}

fn retrieval_config(depth: usize) -> RetrievalConfig {
    RetrievalConfig {
        depth,
        max_nodes: 20,
        max_relationships: 30,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_caps_hold_for_any_depth() {
    for depth in 1..=3 {
        let graph = Arc::new(star_graph(5, 12));
        let retriever = SubgraphRetriever::new(graph.clone(), &retrieval_config(depth));
        let mut context = SubgraphContext::default();

        assert!(retriever.retrieve(&graph.hits, &mut context).await);
        assert!(context.nodes.len() <= 20, "depth {depth}: {} nodes", context.nodes.len());
        assert!(context.relationships.len() <= 30);
        for r in &context.relationships {
            assert!(context.contains_node(&r.start) && context.contains_node(&r.end));
        }
    }
}

#[tokio::test]
async fn test_higher_ranked_hits_are_expanded_first() {
    let graph = Arc::new(star_graph(3, 10));
    let retriever = SubgraphRetriever::new(graph.clone(), &retrieval_config(1));
    let mut context = SubgraphContext::default();

    retriever.retrieve(&graph.hits, &mut context).await;

    let ids: Vec<&str> = context.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(&ids[..3], &["h0", "h1", "h2"]);
    // The remaining 17 slots go to the top hit's neighbors, then the next hit's.
    assert!(ids[3..13].iter().all(|id| id.starts_with("h0-")));
    assert!(ids[13..].iter().all(|id| id.starts_with("h1-")));
}

#[tokio::test]
async fn test_retrieval_is_deterministic() {
    let graph = Arc::new(star_graph(4, 6));
    let retriever = SubgraphRetriever::new(graph.clone(), &retrieval_config(2));

    let mut first = SubgraphContext::default();
    let mut second = SubgraphContext::default();
    retriever.retrieve(&graph.hits, &mut first).await;
    retriever.retrieve(&graph.hits, &mut second).await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_traversal_error_yields_empty_context() {
    let mut graph = star_graph(2, 3);
    graph.neighbor_failure = true;
    let graph = Arc::new(graph);
    let retriever = SubgraphRetriever::new(graph.clone(), &retrieval_config(1));
    let mut context = SubgraphContext::default();

    assert!(!retriever.retrieve(&graph.hits, &mut context).await);
    assert!(context.is_empty());
}

#[tokio::test]
async fn test_similarity_search_filters_and_orders_hits() {
    let mut graph = MockGraph::default();
    graph.hits = vec![
        hit("a", "Patient", 0.7, json!({})),
        hit("b", "Patient", 0.4, json!({})),
        hit("c", "Patient", 0.95, json!({})),
        hit("d", "Patient", 0.55, json!({})),
    ];
    let index = IndexAccessor::new(Arc::new(graph), Arc::new(FixedEmbedder), &RetrievalConfig::default());

    let hits = index.similarity_search("diabetes", 10).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["c", "a", "d"]);

    let top = index.similarity_search("diabetes", 2).await.unwrap();
    assert_eq!(top.len(), 2);
}

#[tokio::test]
async fn test_no_hit_above_threshold_is_empty_not_error() {
    let mut graph = MockGraph::default();
    graph.hits = vec![hit("a", "Patient", 0.1, json!({}))];
    let index = IndexAccessor::new(Arc::new(graph), Arc::new(FixedEmbedder), &RetrievalConfig::default());

    assert!(index.similarity_search("anything", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_embedding_failure_is_reported_as_embedding_error() {
    let index = IndexAccessor::new(
        Arc::new(MockGraph::clinical()),
        Arc::new(FailingEmbedder),
        &RetrievalConfig::default(),
    );

    let err = index.similarity_search("diabetes", 5).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmbeddingService);
}

#[tokio::test]
async fn test_schema_is_served_from_cache() {
    let index = IndexAccessor::new(
        Arc::new(MockGraph::clinical()),
        Arc::new(FixedEmbedder),
        &RetrievalConfig::default(),
    );

    let first = index.fetch_schema().await.unwrap();
    let second = index.fetch_schema().await.unwrap();
    assert_eq!(first, second);
    assert!(first.has_relationship_type("HAS_CONDITION"));
    let refreshed = index.refresh_schema().await.unwrap();
    assert_eq!(refreshed, first);
}

#[tokio::test]
async fn test_unreachable_schema_is_backend_unavailable() {
    let mut graph = MockGraph::clinical();
    graph.schema_unavailable = true;
    let index = IndexAccessor::new(Arc::new(graph), Arc::new(FixedEmbedder), &RetrievalConfig::default());

    let err = index.fetch_schema().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
}
