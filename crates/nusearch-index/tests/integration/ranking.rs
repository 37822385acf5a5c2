//! Integration tests for query ranking, sorting, paging and faceting.

use nusearch_index::{Package, SearchRequest, SearchResults, SearchSort};

use crate::common::{TestHarness, corpus, widgets};

fn ids(results: &SearchResults) -> Vec<&str> {
    results
        .hits
        .iter()
        .map(|h| h.package.id.as_str())
        .collect()
}

async fn indexed(packages: &[Package]) -> TestHarness {
    let harness = TestHarness::new();
    harness.index(packages).await.expect("cycle should succeed");
    harness
}

// ----------------------------------------------------------------------------
// Relevance
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_exact_id_outranks_popular_packages_in_any_casing() {
    let harness = indexed(&corpus()).await;
    let service = harness.service();

    for query in ["Newtonsoft.Json", "newtonsoft.json", "NEWTONSOFT.JSON"] {
        let results = service.search(&SearchRequest::new(query)).await.unwrap();

        assert_eq!(
            ids(&results)[0],
            "Newtonsoft.Json",
            "query {query:?} ranked {:?}",
            ids(&results)
        );
        assert!(ids(&results).contains(&"Newtonsoft.Json.Bson"));
        assert!(results.hits[0].score > results.hits[1].score);
    }
}

#[tokio::test]
async fn test_popularity_boost_is_capped() {
    let harness = indexed(&[
        Package::builder("Alpha.Widget").download_count(100_000_000).build(),
        Package::builder("Beta.Widget").download_count(600_000).build(),
        Package::builder("Gamma.Widget").download_count(100_000).build(),
    ])
    .await;

    let results = harness
        .service()
        .search(&SearchRequest::new("widget"))
        .await
        .unwrap();
    let scores: Vec<f64> = results.hits.iter().map(|h| h.score.unwrap()).collect();

    assert_eq!(ids(&results), vec!["Alpha.Widget", "Beta.Widget", "Gamma.Widget"]);
    // Both are past the cap, so download counts no longer separate them.
    assert_eq!(scores[0], scores[1]);
    assert!((scores[0] / scores[2] - 5.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_every_query_term_must_match() {
    let harness = indexed(&corpus()).await;

    let results = harness
        .service()
        .search(&SearchRequest::new("nodatime serialization"))
        .await
        .unwrap();

    assert_eq!(ids(&results), vec!["NodaTime.Serialization.JsonNet"]);
}

#[tokio::test]
async fn test_blank_query_matches_everything() {
    let harness = indexed(&corpus()).await;

    let results = harness
        .service()
        .search(&SearchRequest::new("   "))
        .await
        .unwrap();

    assert_eq!(results.total, corpus().len() as u64);
}

// ----------------------------------------------------------------------------
// Sorting
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_sort_by_downloads_is_non_increasing() {
    let harness = indexed(&widgets(30)).await;

    let results = harness
        .service()
        .search(
            &SearchRequest::new("widget")
                .with_page(1, 30)
                .with_sort(SearchSort::Downloads),
        )
        .await
        .unwrap();

    assert_eq!(results.hits.len(), 30);
    let downloads: Vec<u64> = results
        .hits
        .iter()
        .map(|h| h.package.download_count)
        .collect();
    assert!(downloads.windows(2).all(|w| w[0] >= w[1]), "{downloads:?}");
    assert!(results.hits.iter().all(|h| h.score.is_none()));
}

#[tokio::test]
async fn test_sort_by_recently_updated() {
    let harness = indexed(&corpus()).await;

    let results = harness
        .service()
        .search(&SearchRequest::new("").with_sort(SearchSort::RecentlyUpdated))
        .await
        .unwrap();

    let updated: Vec<_> = results
        .hits
        .iter()
        .map(|h| h.package.last_updated().unwrap())
        .collect();
    assert!(updated.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(ids(&results)[0], "Google.Protobuf");
    assert_eq!(ids(&results).last(), Some(&"Newtonsoft.Json.Bson"));
}

// ----------------------------------------------------------------------------
// Paging
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_second_page_returns_next_slice() {
    let harness = indexed(&widgets(60)).await;
    let service = harness.service();

    let results = service
        .search(
            &SearchRequest::new("widget")
                .with_page(2, 25)
                .with_sort(SearchSort::Downloads),
        )
        .await
        .unwrap();

    // Downloads are 10 * i, so ranks 26..=50 are Widget034 down to Widget010.
    let expected: Vec<String> = (10..=34).rev().map(|i| format!("Widget{i:03}")).collect();
    assert_eq!(ids(&results), expected);
    assert_eq!(results.total, 60);
    assert_eq!(results.total_pages, 3);

    let last = service
        .search(
            &SearchRequest::new("widget")
                .with_page(3, 25)
                .with_sort(SearchSort::Downloads),
        )
        .await
        .unwrap();
    assert_eq!(last.hits.len(), 10);

    let past_end = service
        .search(&SearchRequest::new("widget").with_page(4, 25))
        .await
        .unwrap();
    assert!(past_end.hits.is_empty());
    assert_eq!(past_end.total, 60);
}

// ----------------------------------------------------------------------------
// Author facet
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_author_filter_restricts_results() {
    let harness = indexed(&corpus()).await;

    let results = harness
        .service()
        .search(&SearchRequest::new("").with_author("Jon Skeet"))
        .await
        .unwrap();

    assert_eq!(results.total, 2);
    assert!(results.hits.iter().all(|h| h.package.has_author("Jon Skeet")));
    assert_eq!(results.author_facets.len(), 1);
    assert_eq!(results.author_facets["Jon Skeet"], 2);
}

#[tokio::test]
async fn test_author_filter_is_exact() {
    let harness = indexed(&corpus()).await;

    let results = harness
        .service()
        .search(&SearchRequest::new("").with_author("jon skeet"))
        .await
        .unwrap();

    assert_eq!(results.total, 0);
}

#[tokio::test]
async fn test_facet_counts_bounded_by_total() {
    let harness = indexed(&widgets(40)).await;

    let results = harness
        .service()
        .search(&SearchRequest::new("widget"))
        .await
        .unwrap();

    let facet_sum: u64 = results.author_facets.values().sum();
    assert_eq!(results.author_facets.len(), 7);
    assert!(facet_sum <= results.total);
    assert_eq!(facet_sum, 40);
}
