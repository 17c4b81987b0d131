use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::context::AppContext;
use crate::web::router;

use super::{context_with, sample_context, sample_movies};

// The context owns blocking HTTP clients, so it is built and dropped
// outside the runtime that drives the router.
fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

async fn send(ctx: &Arc<AppContext>, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router(ctx.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn parse(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[test]
fn test_lexical_search() {
    let ctx = Arc::new(sample_context(false));
    let (status, body) = block_on(send(
        &ctx,
        post_json("/api/search/lexical", json!({"query": "detective mystery"})),
    ));

    assert_eq!(status, StatusCode::OK);
    let results = parse(&body);
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["movie_title"], "Beta");
    assert_eq!(results[0]["rank"], 1);
    assert_eq!(results[2]["movie_title"], "Gamma");
    assert!(results[0].get("content").is_none());
}

#[test]
fn test_lexical_search_top_n() {
    let ctx = Arc::new(sample_context(false));
    let (status, body) = block_on(send(
        &ctx,
        post_json("/api/search/lexical", json!({"query": "detective", "top_n": 1})),
    ));

    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body).as_array().unwrap().len(), 1);
}

#[test]
fn test_semantic_disabled() {
    let ctx = Arc::new(sample_context(false));
    let (status, body) = block_on(send(
        &ctx,
        post_json("/api/search/semantic", json!({"query": "murder"})),
    ));

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(parse(&body)["error"], "semantic search is disabled");
}

#[test]
fn test_semantic_search_with_filters() {
    let ctx = Arc::new(sample_context(true));
    let (status, body) = block_on(send(
        &ctx,
        post_json(
            "/api/search/semantic",
            json!({
                "query": "a comedic mystery",
                "filters": {"genres": ["Drama", "Action"]}
            }),
        ),
    ));

    assert_eq!(status, StatusCode::OK);
    let results = parse(&body);
    let titles: Vec<&str> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["movie_title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Alpha", "Gamma"]);
    assert_eq!(results[0]["content"], "Alpha. a detective investigates a murder");
    assert!(results[0].get("commentary").is_none());
}

#[test]
fn test_semantic_inverted_range() {
    let ctx = Arc::new(sample_context(true));
    let (status, body) = block_on(send(
        &ctx,
        post_json(
            "/api/search/semantic",
            json!({"query": "murder", "filters": {"rating_min": 9.0, "rating_max": 8.0}}),
        ),
    ));

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(parse(&body)["error"]
        .as_str()
        .unwrap()
        .contains("rating range"));
}

#[test]
fn test_random() {
    let ctx = Arc::new(sample_context(false));
    let (status, body) = block_on(send(&ctx, get("/api/random?count=2")));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body).as_array().unwrap().len(), 2);

    let (_, body) = block_on(send(&ctx, get("/api/random")));
    assert_eq!(parse(&body).as_array().unwrap().len(), 3);
}

#[test]
fn test_filters() {
    let ctx = Arc::new(sample_context(false));
    let (status, body) = block_on(send(&ctx, get("/api/filters")));

    assert_eq!(status, StatusCode::OK);
    let vocabulary = parse(&body);
    assert_eq!(vocabulary["genres"], json!(["Action", "Comedy", "Drama"]));
    assert_eq!(vocabulary["years"], json!([1995, 2005, 2015]));
}

#[test]
fn test_poster_placeholder() {
    let ctx = Arc::new(sample_context(false));
    let (status, body) = block_on(send(&ctx, get("/api/poster?url=not-a-url")));

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(parse(&body), json!({"placeholder": "could not load image"}));
}

#[test]
fn test_poster_outside_catalog_is_not_fetched() {
    let ctx = Arc::new(sample_context(false));
    let (status, body) = block_on(send(
        &ctx,
        get("/api/poster?url=http://example.com/anything.jpg"),
    ));

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(parse(&body)["placeholder"], "could not load image");
}

#[test]
fn test_loopback_poster_is_not_fetched() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let url = format!("http://{}/poster.jpg", listener.local_addr().unwrap());

    let mut movies = sample_movies();
    movies[0].image_url = Some(url.clone());
    let ctx = Arc::new(context_with(movies, false));

    let (status, _) = block_on(send(&ctx, get(&format!("/api/poster?url={url}"))));
    assert_eq!(status, StatusCode::NOT_FOUND);

    let err = listener.accept().unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
}
