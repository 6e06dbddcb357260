//! IDN round-trips through the whole pipeline
//!
//! A Unicode source line and its Punycode form must converge on the same
//! set entry, and queries in either spelling must hit it. Also pins down
//! that the persisted bytes are the raw source, not the normalized form.

mod common;

use common::*;
use domainset_core::{DomainSetEngine, EngineOptions, MemoryStorageDriver};
use std::sync::Arc;

async fn engine_with(content: &'static str) -> (DomainSetEngine, Arc<MemoryStorageDriver>) {
    let storage = Arc::new(MemoryStorageDriver::new());
    let options = EngineOptions::new(storage.clone())
        .with_source("disposable", bytes_source(content, IDLE_INTERVAL));
    let engine = DomainSetEngine::new(options).await.unwrap();
    (engine, storage)
}

#[tokio::test]
async fn unicode_source_matches_punycode_and_unicode_queries() {
    let (engine, _) = engine_with("dé.net\n").await;

    assert!(engine.has_domain("disposable", "xn--d-eha.net").unwrap());
    assert!(engine.has_domain("disposable", "DÉ.NET").unwrap());
    assert!(engine.has_domain("disposable", "dé.net").unwrap());
    assert!(!engine.has_domain("disposable", "de.net").unwrap());
}

#[tokio::test]
async fn punycode_source_matches_unicode_queries() {
    let (engine, _) = engine_with("xn--bcher-kva.de\n").await;

    assert!(engine.has_domain("disposable", "bücher.de").unwrap());
    assert!(engine.has_domain("disposable", "BÜCHER.DE").unwrap());
    assert!(engine.has_domain("disposable", "xn--bcher-kva.de").unwrap());
}

#[tokio::test]
async fn persisted_bytes_are_the_raw_source() {
    let (_engine, storage) = engine_with("dé.net\n").await;

    // The tee writes pre-normalization bytes; the Punycode form only lives
    // in memory.
    let persisted = storage.database_bytes("disposable").await.unwrap();
    assert_eq!(persisted, "dé.net\n".as_bytes());
}

#[tokio::test]
async fn confusable_spellings_converge() {
    // Full-width dot and zero-width space in the query; plain form in the
    // source.
    let (engine, _) = engine_with("paypal.com\n").await;

    assert!(engine.has_domain("disposable", "paypal．com").unwrap());
    assert!(engine.has_domain("disposable", "pay\u{200b}pal.com").unwrap());
}
