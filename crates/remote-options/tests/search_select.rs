use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use query_sync::LoadError;
use remote_options::{FieldNames, OptionPayload, SearchSelect, SearchSettings};
use serde::Serialize;
use serde_json::json;
use test_timeout::tokio_timeout_test;
use tokio::time::sleep;

#[derive(Debug, Clone, PartialEq, Serialize)]
struct City {
    id: u32,
    name: String,
}

fn cities() -> Vec<City> {
    ["Paris", "Parma", "Oslo", "Lima"]
        .iter()
        .enumerate()
        .map(|(i, name)| City {
            id: i as u32 + 1,
            name: name.to_string(),
        })
        .collect()
}

type Terms = Arc<Mutex<Vec<String>>>;
type Pending = Pin<Box<dyn Future<Output = Result<OptionPayload<City>, LoadError>> + Send>>;

/// Prefix search over [`cities`] answering after `latency`.
fn directory(latency: Duration) -> (Terms, impl Fn(String) -> Pending + Send + Sync) {
    let terms: Terms = Arc::default();
    let seen = Arc::clone(&terms);
    let source = move |term: String| {
        seen.lock().push(term.clone());
        Box::pin(async move {
            sleep(latency).await;
            let hits = cities()
                .into_iter()
                .filter(|city| city.name.starts_with(&term))
                .collect();
            Ok(OptionPayload::List(hits))
        }) as Pending
    };
    (terms, source)
}

fn names() -> FieldNames<City> {
    FieldNames::new("name", "id")
}

fn labels(select: &SearchSelect<City>) -> Vec<String> {
    select
        .visible_options()
        .into_iter()
        .map(|option| option.label)
        .collect()
}

#[tokio_timeout_test(ms = 10_000, paused)]
async fn keystrokes_inside_the_debounce_window_search_once() {
    let (terms, source) = directory(Duration::from_millis(20));
    let select = SearchSelect::options(source)
        .field_names(names())
        .build()
        .unwrap();

    select.search("P");
    sleep(Duration::from_millis(100)).await;
    select.search("Pa");
    sleep(Duration::from_millis(100)).await;
    select.search("Par");
    assert!(select.is_searching());
    assert!(!select.allow_clear());

    sleep(Duration::from_millis(500)).await;
    assert_eq!(*terms.lock(), vec!["Par".to_string()]);
    assert_eq!(labels(&select), vec!["Paris", "Parma"]);
    assert!(!select.is_loading());
}

#[tokio_timeout_test(ms = 10_000, paused)]
async fn closing_discards_the_pending_search() {
    let (terms, source) = directory(Duration::from_secs(1));
    let select = SearchSelect::options(source)
        .field_names(names())
        .build()
        .unwrap();

    select.search("O");
    sleep(Duration::from_millis(350)).await;
    assert!(select.is_loading());
    assert_eq!(terms.lock().len(), 1);

    select.on_dropdown_visible_change(false);
    sleep(Duration::from_secs(2)).await;
    let state = select.state();
    assert!(!state.searching);
    assert!(!state.loading);
    assert!(state.search_data.is_empty());
    assert!(select.visible_options().is_empty());
}

#[tokio_timeout_test(ms = 10_000, paused)]
async fn reopening_after_close_starts_from_an_empty_list() {
    let (terms, source) = directory(Duration::from_millis(200));
    let select = SearchSelect::options(source)
        .field_names(names())
        .build()
        .unwrap();

    select.on_dropdown_visible_change(true);
    sleep(Duration::from_millis(600)).await;
    assert_eq!(labels(&select), vec!["Paris", "Parma", "Oslo", "Lima"]);

    select.on_dropdown_visible_change(false);
    select.on_dropdown_visible_change(true);
    assert!(select.visible_options().is_empty());

    sleep(Duration::from_millis(350)).await;
    assert!(select.is_loading());
    assert!(select.visible_options().is_empty());
    assert_eq!(terms.lock().len(), 2);

    sleep(Duration::from_millis(300)).await;
    assert!(!select.is_loading());
    assert_eq!(labels(&select), vec!["Paris", "Parma", "Oslo", "Lima"]);
}

#[tokio_timeout_test(ms = 10_000, paused)]
async fn selection_survives_closing_the_dropdown() {
    let (_, source) = directory(Duration::ZERO);
    let select = SearchSelect::options(source)
        .field_names(names())
        .build()
        .unwrap();

    select.search("Par");
    sleep(Duration::from_millis(400)).await;
    let picked = select.change(Some(&json!(2)));
    assert_eq!(picked.map(|city| city.name), Some("Parma".to_string()));

    select.on_dropdown_visible_change(false);
    assert_eq!(labels(&select), vec!["Parma"]);
    assert_eq!(select.selected_value(), Some(json!(2)));
    assert!(select.allow_clear());

    assert!(select.change(None).is_none());
    assert!(select.visible_options().is_empty());
    assert!(select.selected().is_none());
}

#[tokio_timeout_test(ms = 10_000, paused)]
async fn opening_searches_for_everything_unless_empty_search_is_off() {
    let (terms, source) = directory(Duration::ZERO);
    let select = SearchSelect::options(source)
        .field_names(names())
        .build()
        .unwrap();
    select.on_dropdown_visible_change(true);
    sleep(Duration::from_millis(400)).await;
    assert_eq!(*terms.lock(), vec![String::new()]);
    assert_eq!(select.visible_options().len(), 4);

    let (terms, source) = directory(Duration::ZERO);
    let strict = SearchSelect::options(source)
        .field_names(names())
        .settings(SearchSettings {
            allow_empty_search: false,
            ..SearchSettings::default()
        })
        .build()
        .unwrap();
    strict.on_dropdown_visible_change(true);
    strict.search("");
    sleep(Duration::from_millis(400)).await;
    assert!(terms.lock().is_empty());
    assert!(strict.visible_options().is_empty());
    assert!(!strict.is_loading());
}

#[tokio_timeout_test(ms = 10_000, paused)]
async fn a_preselected_value_is_offered_until_searching() {
    let (_, source) = directory(Duration::ZERO);
    let select = SearchSelect::options(source)
        .field_names(names())
        .value(cities()[3].clone())
        .build()
        .unwrap();
    assert_eq!(labels(&select), vec!["Lima"]);

    select.on_dropdown_visible_change(true);
    sleep(Duration::from_millis(400)).await;
    assert!(!select.is_searching());

    select.set_value(Some(cities()[2].clone())).unwrap();
    assert_eq!(labels(&select), vec!["Oslo"]);
}

#[tokio_timeout_test(ms = 10_000, paused)]
async fn wrapped_payloads_and_failures() {
    let select = SearchSelect::options(|term: String| async move {
        if term == "boom" {
            Err(LoadError::UnexpectedStatus {
                status: 502,
                body: "bad gateway".into(),
            })
        } else {
            Ok(OptionPayload::Wrapped { data: cities() })
        }
    })
    .field_names(names())
    .build()
    .unwrap();

    select.search("any");
    sleep(Duration::from_millis(400)).await;
    assert_eq!(select.visible_options().len(), 4);

    select.search("boom");
    sleep(Duration::from_millis(400)).await;
    let state = select.state();
    assert!(matches!(
        state.error,
        Some(LoadError::UnexpectedStatus { status: 502, .. })
    ));
    assert!(!state.loading);
}

#[test]
fn building_needs_a_runtime() {
    let (_, source) = directory(Duration::ZERO);
    let built = SearchSelect::options(source).field_names(names()).build();
    assert!(matches!(built, Err(remote_options::OptionError::NoRuntime)));
}
