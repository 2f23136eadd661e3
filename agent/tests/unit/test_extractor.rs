//! Branch extraction and classifier cache tests

use std::sync::Arc;

use tempfile::tempdir;

use mepbot::extract::cache::DurableBranchCache;
use mepbot::extract::classifier::PrefixConvention;
use mepbot::extract::extractor::BranchExtractor;

use crate::support::{documents_in, FakeClassifier};

fn conventions() -> PrefixConvention {
    PrefixConvention {
        prefixes: vec!["GEO".to_string(), "ADM".to_string()],
        hints: vec!["v3 typically indicates GEO-".to_string()],
    }
}

#[tokio::test]
async fn test_direct_match_skips_classifier() {
    let classifier = Arc::new(FakeClassifier::answering(&["ADM-1"]));
    let extractor = BranchExtractor::new(conventions(), 50)
        .unwrap()
        .with_classifier(classifier.clone());

    let branches = extractor.extract("agent:deploy GEO-12").await;

    assert_eq!(branches, vec!["GEO-12"]);
    assert_eq!(classifier.call_count(), 0);
}

#[tokio::test]
async fn test_classifier_answer_is_cached_in_memory() {
    let classifier = Arc::new(FakeClassifier::answering(&[" GEO-3 ", "GEO-3", ""]));
    let extractor = BranchExtractor::new(conventions(), 50)
        .unwrap()
        .with_classifier(classifier.clone());

    let first = extractor.extract("agent:deploy the v3 fix").await;
    let second = extractor.extract("agent:deploy the v3 fix").await;

    assert_eq!(first, vec!["GEO-3"]);
    assert_eq!(second, first);
    assert_eq!(classifier.call_count(), 1);
}

#[tokio::test]
async fn test_cache_key_is_text_prefix() {
    let classifier = Arc::new(FakeClassifier::answering(&["GEO-3"]));
    let extractor = BranchExtractor::new(conventions(), 12)
        .unwrap()
        .with_classifier(classifier.clone());

    extractor.extract("agent:deploy the v3 fix").await;
    extractor.extract("agent:deploy something else").await;

    assert_eq!(classifier.call_count(), 1);
}

#[tokio::test]
async fn test_durable_cache_survives_restart() {
    let dir = tempdir().unwrap();
    let documents = documents_in(dir.path());

    let first_classifier = Arc::new(FakeClassifier::answering(&["GEO-9"]));
    let extractor = BranchExtractor::new(conventions(), 50)
        .unwrap()
        .with_classifier(first_classifier.clone())
        .with_durable_cache(DurableBranchCache::new(documents.clone()));
    assert_eq!(extractor.extract("ship the map fix").await, vec!["GEO-9"]);

    let second_classifier = Arc::new(FakeClassifier::answering(&["ADM-1"]));
    let restarted = BranchExtractor::new(conventions(), 50)
        .unwrap()
        .with_classifier(second_classifier.clone())
        .with_durable_cache(DurableBranchCache::new(documents));

    assert_eq!(restarted.extract("ship the map fix").await, vec!["GEO-9"]);
    assert_eq!(second_classifier.call_count(), 0);
}

#[tokio::test]
async fn test_classifier_failure_is_empty_and_not_cached() {
    let dir = tempdir().unwrap();
    let documents = documents_in(dir.path());
    let classifier = Arc::new(FakeClassifier::failing("HTTP 429"));
    let extractor = BranchExtractor::new(conventions(), 50)
        .unwrap()
        .with_classifier(classifier.clone())
        .with_durable_cache(DurableBranchCache::new(documents.clone()));

    assert!(extractor.extract("ship the map fix").await.is_empty());
    assert!(extractor.extract("ship the map fix").await.is_empty());

    assert_eq!(classifier.call_count(), 2);
    assert!(DurableBranchCache::new(documents)
        .get("ship the map fix")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_empty_answer_is_cached() {
    let classifier = Arc::new(FakeClassifier::answering(&[]));
    let extractor = BranchExtractor::new(conventions(), 50)
        .unwrap()
        .with_classifier(classifier.clone());

    assert!(extractor.extract("hello team").await.is_empty());
    assert!(extractor.extract("hello team").await.is_empty());
    assert_eq!(classifier.call_count(), 1);
}
