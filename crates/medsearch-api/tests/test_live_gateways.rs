//! Smoke tests against deployed gateways.
//!
//! Run with:
//! ```bash
//! MEDSEARCH_THREADS_URL=... MEDSEARCH_THREADS_API_KEY=... MEDSEARCH_USER_UID=... \
//!   cargo test --package medsearch-api --test test_live_gateways -- --ignored --nocapture
//! ```

use std::sync::Arc;
use std::time::Duration;

use medsearch_api::{ApiEndpoints, ApiKeys, HttpApi, StaticIdentity, ThreadBackend};
use secrecy::SecretString;

fn env(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

fn live_api() -> HttpApi {
    let threads_url = env("MEDSEARCH_THREADS_URL");
    let key = |name: &str| SecretString::from(env(name));
    HttpApi::new(
        ApiEndpoints {
            search_url: threads_url.clone(),
            threads_url: threads_url.clone(),
            library_url: threads_url.clone(),
            chat_url: threads_url,
        },
        ApiKeys {
            search: key("MEDSEARCH_SEARCH_API_KEY"),
            threads: key("MEDSEARCH_THREADS_API_KEY"),
            library: key("MEDSEARCH_LIBRARY_API_KEY"),
            chat: key("MEDSEARCH_CHAT_API_KEY"),
        },
        Arc::new(StaticIdentity::new(env("MEDSEARCH_USER_UID"), None)),
        Duration::from_secs(30),
    )
    .expect("Failed to build API client")
}

#[tokio::test]
#[ignore] // Requires network access and credentials
async fn test_list_threads_and_fetch_first() {
    let api = live_api();
    let user = env("MEDSEARCH_USER_UID");

    let refs = api.list_threads(&user).await.expect("listing threads failed");
    println!("Found {} threads", refs.len());

    if let Some(first) = refs.first() {
        let status = api.thread_status(&first.thread_uid).await.expect("status failed");
        println!("{} -> {}", first.thread_name, status);
        let thread = api.fetch_thread(&first.thread_uid).await.expect("fetch failed");
        assert_eq!(thread.thread_uid, first.thread_uid);
    }
}

#[tokio::test]
#[ignore] // Requires network access and credentials
async fn test_unknown_thread_status_is_not_found() {
    let api = live_api();
    let err = api
        .thread_status("00000000-0000-0000-0000-000000000000")
        .await
        .expect_err("unknown thread should not have a status");
    println!("error: {err}");
}
