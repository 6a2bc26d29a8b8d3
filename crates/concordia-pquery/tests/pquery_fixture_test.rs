//! Paradigmatic query behaviour over a small reference-corpus fixture.

use std::sync::Arc;

use concordia_chain::{CodecConfig, Session};
use concordia_core::mock::{
    InMemoryHistoryApi, InMemoryOperationStore, MockFrequencyService, MockTaskFeed,
};
use concordia_core::{
    FreqItem, HistoryFilter, OperationKind, PQuerySpec, QueryOperation, SubQueryItem, Supertype,
};
use concordia_pquery::{ParadigmaticCombiner, SortColumn, SortDirection, SortState};
use concordia_tasks::{TaskWatcher, WatcherConfig};

const WORD_E: &str = "[word=\"e.*\"]";
const TAG_N: &str = "[tag=\"N.*\"]";
const LEMMA_E: &str = "[lemma=\".*e\"]";
const TAG_V: &str = "[tag=\"V.*\"]";

fn items(pairs: &[(&str, u64)]) -> Vec<FreqItem> {
    pairs.iter().map(|(v, f)| FreqItem::new(*v, *f)).collect()
}

fn reference_corpus() -> MockFrequencyService {
    MockFrequencyService::new()
        .with_list(
            WORD_E,
            items(&[
                ("eye", 40),
                ("edge", 12),
                ("end", 31),
                ("era", 6),
                ("earth", 9),
                ("east", 15),
                ("egg", 22),
                ("elf", 3),
                ("echo", 5),
            ]),
        )
        .with_list(
            TAG_N,
            items(&[
                ("eye", 11),
                ("edge", 20),
                ("end", 7),
                ("era", 2),
                ("earth", 18),
                ("east", 4),
                ("egg", 9),
                ("elf", 1),
                ("noun", 30),
            ]),
        )
        .with_list(
            LEMMA_E,
            items(&[
                ("eye", 14),
                ("edge", 3),
                ("end", 12),
                ("era", 1),
                ("earth", 2),
                ("east", 5),
                ("egg", 8),
                ("lake", 9),
            ]),
        )
        .with_list(TAG_V, items(&[("end", 1), ("go", 5)]))
}

fn combiner(freq: &MockFrequencyService) -> ParadigmaticCombiner {
    let watcher = TaskWatcher::new(Arc::new(MockTaskFeed::new()), WatcherConfig::default());
    ParadigmaticCombiner::new(Arc::new(freq.clone()), watcher)
}

fn three_way() -> PQuerySpec {
    PQuerySpec::new("susanne", "word")
        .with_subquery(SubQueryItem::required(WORD_E, 1))
        .with_subquery(SubQueryItem::required(TAG_N, 1))
        .with_subquery(SubQueryItem::required(LEMMA_E, 1))
}

#[tokio::test]
async fn test_three_subqueries_yield_seven_rows() {
    let freq = reference_corpus();
    let result = combiner(&freq).evaluate(&three_way()).await.unwrap();
    assert_eq!(result.len(), 7);
    assert_eq!(result.rows()[0].value, "eye");
    assert_eq!(result.rows()[0].per_subquery_freq, vec![40, 11, 14]);
    assert_eq!(result.rows()[0].total_freq, 65);
}

#[tokio::test]
async fn test_raising_min_freq_refilters_without_refetch() {
    let freq = reference_corpus();
    let c = combiner(&freq);
    assert_eq!(c.evaluate(&three_way()).await.unwrap().len(), 7);

    let mut stricter = three_way();
    stricter.subqueries[2].min_freq = 10;
    let result = c.evaluate(&stricter).await.unwrap();

    let values: Vec<&str> = result.rows().iter().map(|r| r.value.as_str()).collect();
    assert_eq!(values, vec!["eye", "end"]);
    for cql in [WORD_E, TAG_N, LEMMA_E] {
        assert_eq!(freq.freq_call_count(cql), 1, "{} fetched again", cql);
    }
}

#[tokio::test]
async fn test_negated_subquery_excludes_values() {
    let freq = reference_corpus();
    let spec = PQuerySpec::new("susanne", "word")
        .with_subquery(SubQueryItem::required(WORD_E, 1))
        .with_subquery(SubQueryItem::required(TAG_N, 1))
        .with_subquery(SubQueryItem::excluded(TAG_V));

    let result = combiner(&freq).evaluate(&spec).await.unwrap();
    let values: Vec<&str> = result.rows().iter().map(|r| r.value.as_str()).collect();
    // (e.* ∩ N.*) minus V.*
    assert_eq!(values, vec!["eye", "edge", "egg", "earth", "east", "era", "elf"]);
    assert!(result.rows().iter().all(|r| r.per_subquery_freq[2] == 0));
}

#[tokio::test]
async fn test_page_size_changes_indicator_only() {
    let values: Vec<String> = (0..53).map(|i| format!("w{:02}", i)).collect();
    let list_a: Vec<FreqItem> = values
        .iter()
        .enumerate()
        .map(|(i, v)| FreqItem::new(v.clone(), 100 - i as u64))
        .collect();
    let list_b: Vec<FreqItem> = values.iter().map(|v| FreqItem::new(v.clone(), 2)).collect();
    let freq = MockFrequencyService::new()
        .with_list("A", list_a)
        .with_list("B", list_b);
    let spec = PQuerySpec::new("susanne", "word")
        .with_subquery(SubQueryItem::required("A", 1))
        .with_subquery(SubQueryItem::required("B", 1));

    let result = combiner(&freq).evaluate(&spec).await.unwrap();
    let small = result.page(1, 5).unwrap();
    let large = result.page(1, 20).unwrap();

    assert!(small.indicator().ends_with("/ 11"));
    assert!(large.indicator().ends_with("/ 3"));
    assert_eq!(small.rows[..], large.rows[..5]);
    assert_eq!(result.page(11, 5).unwrap().rows.len(), 3);
    assert_eq!(freq.total_calls("freq_list"), 2);
}

#[tokio::test]
async fn test_sort_toggle_and_idempotence() {
    let freq = reference_corpus();
    let result = combiner(&freq).evaluate(&three_way()).await.unwrap();

    let by_tag = result.toggled(SortColumn::Subquery(1)).unwrap();
    assert_eq!(
        by_tag.sort_state(),
        SortState::new(SortColumn::Subquery(1), SortDirection::Descending)
    );
    assert_eq!(by_tag.rows()[0].value, "edge");

    let flipped = by_tag.toggled(SortColumn::Subquery(1)).unwrap();
    assert_eq!(flipped.sort_state().direction, SortDirection::Ascending);
    assert_eq!(flipped.rows()[0].value, "era");

    let again = flipped.sorted(flipped.sort_state()).unwrap();
    assert_eq!(again, flipped);

    let mut totals: Vec<u64> = flipped.rows().iter().map(|r| r.total_freq).collect();
    let mut original: Vec<u64> = result.rows().iter().map(|r| r.total_freq).collect();
    totals.sort_unstable();
    original.sort_unstable();
    assert_eq!(totals, original);
}

#[tokio::test]
async fn test_evaluation_recorded_in_chain_and_history() {
    let freq = reference_corpus();
    let spec = three_way();
    let result = combiner(&freq).evaluate(&spec).await.unwrap();

    let session = Session::new(
        Arc::new(InMemoryOperationStore::new()),
        Arc::new(InMemoryHistoryApi::new()),
        CodecConfig::default(),
    );
    let chain = session
        .submit(QueryOperation::new(
            OperationKind::Paradigmatic,
            spec.to_form_args(),
        ))
        .await
        .unwrap();
    session.attach_result_size(result.len() as u64).await.unwrap();

    let tail = session.chain().await;
    assert_eq!(tail.current_tail().unwrap().result_size, Some(7));

    let id = chain.current_tail().unwrap().persisted_id().unwrap().clone();
    let reopened = session.open(&id).await.unwrap();
    let restored = PQuerySpec::from_form_args(&reopened.chain.root().unwrap().form_args).unwrap();
    assert_eq!(restored, spec);

    let page = session
        .history()
        .await
        .list(&HistoryFilter::default().with_supertype(Supertype::ParadigmaticQuery))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert!(page.entries[0].description().starts_with("paradigmatic: word ["));
}
