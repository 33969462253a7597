//! Harvester tests against a mocked OAI-PMH endpoint
//!
//! Covers paging along the resumption token chain, staging of every page,
//! checkpoint advancement, and failure in the middle of a day.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arxiv_common::EtlError;
use arxiv_ingest::harvest::{Checkpoint, Harvester};
use arxiv_ingest::staging::read_updates;
use arxiv_ingest::storage::{MemoryStore, ObjectStore};
use chrono::NaiveDate;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{
    author, deleted_record_xml, init_tracing, list_records_xml, oai_config, oai_error_xml,
    record_xml, TestAuthor,
};

const CHECKPOINT_KEY: &str = "last_batch_date.txt";
const TOKEN: &str = "6960524|1001";

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

async fn store_with_checkpoint(last: &str) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .put(CHECKPOINT_KEY, last.as_bytes().to_vec())
        .await
        .unwrap();
    store
}

fn harvester(server: &MockServer, store: Arc<MemoryStore>, delay_secs: f64) -> Harvester {
    let checkpoint = Checkpoint::new(store.clone(), CHECKPOINT_KEY, None);
    Harvester::new(&oai_config(&server.uri(), delay_secs), store, checkpoint).unwrap()
}

async fn mount_first_page(server: &MockServer, day: &str, body: String) {
    Mock::given(method("GET"))
        .and(query_param("verb", "ListRecords"))
        .and(query_param("from", day))
        .and(query_param("until", day))
        .and(query_param("metadataPrefix", "arXiv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_resumed_page(server: &MockServer, token: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(query_param("verb", "ListRecords"))
        .and(query_param("resumptionToken", token))
        .respond_with(template)
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_day_with_two_pages_is_staged_and_checkpointed() {
    init_tracing();
    let server = MockServer::start().await;

    let berger = TestAuthor {
        keyname: "Berger",
        forenames: Some("Edmond L."),
        affiliations: &["Argonne National Laboratory"],
    };
    mount_first_page(
        &server,
        "2024-01-15",
        list_records_xml(
            &[
                record_xml(
                    "oai:arXiv.org:0704.0001",
                    "2024-01-15",
                    "Calculation of prompt diphoton production",
                    &[author("Balázs", "C."), berger],
                ),
                record_xml("oai:arXiv.org:0704.0002", "2024-01-15", "Sparsity-certifying graph decompositions", &[author("Streinu", "Ileana")]),
            ],
            Some(TOKEN),
        ),
    )
    .await;
    mount_resumed_page(
        &server,
        TOKEN,
        ResponseTemplate::new(200).set_body_string(list_records_xml(
            &[
                record_xml("oai:arXiv.org:0704.0003", "2024-01-15", "The evolution of the Earth-Moon system", &[author("Pan", "Hongjun")]),
                deleted_record_xml("oai:arXiv.org:0704.0004", "2024-01-15"),
            ],
            None,
        )),
    )
    .await;

    let store = store_with_checkpoint("2024-01-14").await;
    let harvester = harvester(&server, store.clone(), 0.0);

    let stats = harvester.run(date("2024-01-16"), None).await.unwrap();

    assert_eq!(stats.days, 1);
    assert_eq!(stats.pages, 2);
    assert_eq!(stats.records, 4);
    assert_eq!(stats.articles, 3);
    assert_eq!(stats.deletions, 1);
    assert_eq!(stats.last_date, Some(date("2024-01-15")));

    assert_eq!(
        store.keys().await,
        vec![
            "last_batch_date.txt",
            "metadata/2024-01-15_0.json",
            "metadata/2024-01-15_1001.json",
            "missing_metadata/2024-01-15_1001.json",
        ]
    );
    assert_eq!(
        harvester.checkpoint().read().await.unwrap(),
        Some(date("2024-01-15"))
    );

    let first = read_updates(store.as_ref(), "metadata/2024-01-15_0.json")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        first.identifiers,
        vec!["oai:arXiv.org:0704.0001", "oai:arXiv.org:0704.0002"]
    );
    assert_eq!(first.articles[0].abstract_text, "An abstract spanning lines.");
    assert_eq!(first.articles[0].set_spec, "physics:hep-ph");
    assert_eq!(first.authorships.len(), 3);
    assert_eq!(first.authorships[1].first_name.as_deref(), Some("edmond"));
    assert_eq!(first.affiliations.len(), 1);
    assert_eq!(first.affiliations[0].author_pos, 2);
}

#[tokio::test]
async fn test_protocol_error_on_second_page_keeps_checkpoint() {
    init_tracing();
    let server = MockServer::start().await;

    mount_first_page(
        &server,
        "2024-01-15",
        list_records_xml(
            &[record_xml("oai:arXiv.org:0704.0001", "2024-01-15", "Page one", &[author("Pan", "Hongjun")])],
            Some(TOKEN),
        ),
    )
    .await;
    mount_resumed_page(
        &server,
        TOKEN,
        ResponseTemplate::new(200).set_body_string(oai_error_xml(
            "badResumptionToken",
            "The value of the resumptionToken argument is invalid or expired.",
        )),
    )
    .await;

    let store = store_with_checkpoint("2024-01-14").await;
    let harvester = harvester(&server, store.clone(), 0.0);

    let err = harvester.run(date("2024-01-16"), None).await.unwrap_err();

    match &err {
        EtlError::Protocol { code, .. } => assert_eq!(code, "badResumptionToken"),
        other => panic!("expected a protocol error, got {other:?}"),
    }
    assert!(err.is_retryable());

    assert_eq!(
        harvester.checkpoint().read().await.unwrap(),
        Some(date("2024-01-14"))
    );
    assert!(store.exists("metadata/2024-01-15_0.json").await.unwrap());
}

#[tokio::test]
async fn test_http_failure_is_network_error() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = store_with_checkpoint("2024-01-14").await;
    let harvester = harvester(&server, store.clone(), 0.0);

    let err = harvester.run(date("2024-01-16"), None).await.unwrap_err();

    assert!(matches!(err, EtlError::Network(_)));
    assert_eq!(store.keys().await, vec![CHECKPOINT_KEY]);
}

#[tokio::test]
async fn test_empty_days_advance_checkpoint_up_to_yesterday() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("verb", "ListRecords"))
        .respond_with(ResponseTemplate::new(200).set_body_string(oai_error_xml(
            "noRecordsMatch",
            "No records match the request",
        )))
        .expect(2)
        .mount(&server)
        .await;

    let store = store_with_checkpoint("2024-01-13").await;
    let harvester = harvester(&server, store.clone(), 0.0);

    let stats = harvester.run(date("2024-01-16"), None).await.unwrap();

    assert_eq!(stats.days, 2);
    assert_eq!(stats.records, 0);
    assert_eq!(stats.files_written, 0);
    assert_eq!(
        harvester.checkpoint().read().await.unwrap(),
        Some(date("2024-01-15"))
    );

    // Nothing left before today.
    let stats = harvester.run(date("2024-01-16"), None).await.unwrap();
    assert_eq!(stats.days, 0);
}

#[tokio::test]
async fn test_max_days_bounds_the_run() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("verb", "ListRecords"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(oai_error_xml("noRecordsMatch", "No records match")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with_checkpoint("2024-01-10").await;
    let harvester = harvester(&server, store, 0.0);

    let stats = harvester.run(date("2024-01-16"), Some(1)).await.unwrap();

    assert_eq!(stats.days, 1);
    assert_eq!(
        harvester.checkpoint().read().await.unwrap(),
        Some(date("2024-01-11"))
    );
}

#[tokio::test]
async fn test_delay_between_pages_is_honored() {
    init_tracing();
    let server = MockServer::start().await;

    mount_first_page(
        &server,
        "2024-01-15",
        list_records_xml(&[], Some(TOKEN)),
    )
    .await;
    mount_resumed_page(
        &server,
        TOKEN,
        ResponseTemplate::new(200).set_body_string(list_records_xml(&[], None)),
    )
    .await;

    let store = store_with_checkpoint("2024-01-14").await;
    let harvester = harvester(&server, store, 0.2);

    let started = Instant::now();
    let day = harvester.harvest_day(date("2024-01-15")).await.unwrap();

    assert_eq!(day.pages, 2);
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_single_day_harvest_leaves_checkpoint_alone() {
    init_tracing();
    let server = MockServer::start().await;

    mount_first_page(
        &server,
        "2023-06-01",
        list_records_xml(
            &[record_xml("oai:arXiv.org:2306.00001", "2023-06-01", "Backfilled", &[author("Pan", "Hongjun")])],
            None,
        ),
    )
    .await;

    let store = store_with_checkpoint("2024-01-14").await;
    let harvester = harvester(&server, store.clone(), 0.0);

    let day = harvester.harvest_day(date("2023-06-01")).await.unwrap();

    assert_eq!(day.articles, 1);
    assert!(store.exists("metadata/2023-06-01_0.json").await.unwrap());
    assert_eq!(
        harvester.checkpoint().read().await.unwrap(),
        Some(date("2024-01-14"))
    );
}
