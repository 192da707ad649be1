//! End-to-end behavior of a route's stage chain.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dyne_core::{DyneError, Request, Response};
use dyne_pipeline::{ExpectStage, InputStage, Location, OutputStage, StageChain, StageKind, TypedSchema};
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Book {
    title: String,
    pages: u32,
}

fn book_chain() -> StageChain {
    let mut chain = StageChain::new();
    chain
        .push(Arc::new(ExpectStage::new().response(404, "Book not found")))
        .unwrap();
    chain
        .push(Arc::new(InputStage::new(TypedSchema::<Book>::new(), Location::Body)))
        .unwrap();
    chain
        .push(Arc::new(OutputStage::new(TypedSchema::<Book>::new()).status(201)))
        .unwrap();
    chain
}

fn post(body: &str) -> Request {
    Request::new(Method::POST, "/books".parse().unwrap())
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
}

#[tokio::test]
async fn test_valid_input_round_trips_through_handler() {
    let chain = book_chain();
    let calls = AtomicUsize::new(0);

    let resp = chain
        .execute(post(r#"{"title": "Dune", "pages": 412}"#), |req| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let book = req.injected::<Book>("data").cloned().unwrap();
                assert_eq!(book, Book { title: "Dune".into(), pages: 412 });
                Ok(Response::new().with_object(serde_json::to_value(&book).unwrap()))
            }
        })
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(resp.status(), StatusCode::CREATED);
    let echoed: Book = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(echoed.title, "Dune");
}

#[tokio::test]
async fn test_invalid_input_never_reaches_handler() {
    let chain = book_chain();
    let calls = AtomicUsize::new(0);

    let err = chain
        .execute(post(r#"{"title": "Dune"}"#), |_req| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(Response::new()) }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(matches!(err, DyneError::Validation(ref v) if v.fields.get("body.pages").is_some()));
}

#[tokio::test]
async fn test_missing_object_is_server_error() {
    let chain = book_chain();
    let err = chain
        .execute(post(r#"{"title": "Dune", "pages": 1}"#), |_req| async {
            Ok(Response::text("forgot the object"))
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_handler_error_passes_through_unchanged() {
    let chain = book_chain();
    let err = chain
        .execute(post(r#"{"title": "Dune", "pages": 1}"#), |_req| async {
            Err(DyneError::http(StatusCode::NOT_FOUND, "Book not found"))
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
}

#[test]
fn test_chain_metadata_in_declaration_order() {
    let kinds: Vec<StageKind> = book_chain().metadata().into_iter().map(|m| m.kind).collect();
    assert_eq!(kinds, vec![StageKind::Expect, StageKind::Input, StageKind::Output]);
}

#[test]
fn test_second_body_input_on_same_key_is_rejected() {
    let mut chain = book_chain();
    let dup = InputStage::new(TypedSchema::<Book>::new(), Location::Form);
    assert!(chain.push(Arc::new(dup)).is_err());
}
