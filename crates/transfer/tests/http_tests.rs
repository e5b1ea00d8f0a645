//! HTTP fetcher and name lookup against a mock origin.

use httpmock::prelude::*;
use std::sync::Arc;
use strata_core::{Fingerprint, Range, Uri};
use strata_transfer::{FetchError, Fetcher, FetcherNameLookup, HttpFetcher, NameLookup};

fn fetcher() -> HttpFetcher {
    HttpFetcher::with_client(reqwest::Client::new())
}

fn uri_at(server: &MockServer, path: &str) -> Uri {
    Uri::new(Fingerprint::zero(), &server.url(path)).unwrap()
}

#[tokio::test]
async fn test_whole_file_fetch() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/asset.bin");
            then.status(200).body("full body");
        })
        .await;

    let got = fetcher()
        .fetch(&uri_at(&server, "/asset.bin"), Range::whole())
        .await
        .unwrap();
    assert_eq!(got.start(), 0);
    assert!(got.is_eof());
    assert_eq!(got.as_slice(), b"full body");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_bounded_range_fetch() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/asset.bin").header("range", "bytes=2-5");
            then.status(206)
                .header("content-range", "bytes 2-5/10")
                .body("2345");
        })
        .await;

    let got = fetcher()
        .fetch(&uri_at(&server, "/asset.bin"), Range::bounds(2, 6))
        .await
        .unwrap();
    assert_eq!(got.start(), 2);
    assert!(!got.is_eof());
    assert_eq!(got.as_slice(), b"2345");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_tail_range_reaches_eof() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/asset.bin").header("range", "bytes=6-");
            then.status(206)
                .header("content-range", "bytes 6-9/10")
                .body("6789");
        })
        .await;

    let got = fetcher()
        .fetch(&uri_at(&server, "/asset.bin"), Range::from_offset(6))
        .await
        .unwrap();
    assert_eq!(got.start(), 6);
    assert!(got.is_eof());
    assert_eq!(got.range(), strata_core::Range::bounds_to_eof(6, 10));
}

#[tokio::test]
async fn test_final_range_with_total_reaches_eof() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/asset.bin").header("range", "bytes=8-9");
            then.status(206)
                .header("content-range", "bytes 8-9/10")
                .body("89");
        })
        .await;

    let got = fetcher()
        .fetch(&uri_at(&server, "/asset.bin"), Range::bounds(8, 10))
        .await
        .unwrap();
    assert!(got.is_eof());
}

#[tokio::test]
async fn test_error_status_is_surfaced() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/missing.bin");
            then.status(404);
        })
        .await;

    match fetcher()
        .fetch(&uri_at(&server, "/missing.bin"), Range::whole())
        .await
    {
        Err(FetchError::Status { status }) => assert_eq!(status, 404),
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_name_lookup_roundtrip() {
    let id = Fingerprint::compute(b"the named asset");
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/names/logo");
            then.status(200)
                .body(format!("  /assets/{}\r\n", id.to_hex()));
        })
        .await;

    let lookup = FetcherNameLookup::new(Arc::new(fetcher()));
    let response = lookup.lookup(&uri_at(&server, "/names/logo")).await.unwrap();
    assert_eq!(response.fingerprint, id);
    assert_eq!(response.uri.filename(), id.to_hex());
    assert_eq!(response.uri.fingerprint(), id);
}

#[tokio::test]
async fn test_name_lookup_parse_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/names/bad");
            then.status(200).body("/assets/not-hex-at-all");
        })
        .await;

    let lookup = FetcherNameLookup::new(Arc::new(fetcher()));
    assert!(lookup.lookup(&uri_at(&server, "/names/bad")).await.is_err());
}

#[tokio::test]
async fn test_name_lookup_network_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/names/gone");
            then.status(500);
        })
        .await;

    let lookup = FetcherNameLookup::new(Arc::new(fetcher()));
    match lookup.lookup(&uri_at(&server, "/names/gone")).await {
        Err(FetchError::Status { status }) => assert_eq!(status, 500),
        other => panic!("expected status error, got {other:?}"),
    }
}
