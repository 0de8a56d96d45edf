//! Concurrent requests over overlapping path sets.

use axum::http::{Method, StatusCode};
use std::collections::HashSet;
use std::sync::Arc;

use caching_proxy::cache::{CacheStore, Lookup};
use caching_proxy::http::{codec, X_CACHE_STATUS};

mod common;

use common::{expires_in, get, read_body, start_origin, t0, MockReply};

const TASKS: usize = 16;
const ROUNDS: usize = 20;
const SHARED: [&str; 3] = ["/shared/0", "/shared/1", "/shared/2"];

fn checksum(data: &[u8]) -> u32 {
    data.iter()
        .fold(0x811c9dc5u32, |h, b| (h ^ *b as u32).wrapping_mul(0x0100_0193))
}

fn body_for(target: &str) -> String {
    let path = target.split('?').next().unwrap_or(target);
    format!("{path}|{}", checksum(path.as_bytes()))
}

fn assert_intact(path: &str, body: &[u8]) {
    let text = std::str::from_utf8(body).unwrap();
    let (body_path, sum) = text.rsplit_once('|').expect("checksum suffix");
    assert_eq!(body_path, path, "body served for the wrong path");
    assert_eq!(sum.parse::<u32>().unwrap(), checksum(path.as_bytes()), "corrupted {path}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_keep_cache_consistent() {
    let origin = start_origin(|target| {
        MockReply::ok(body_for(target)).header("Expires", &expires_in(t0(), 600))
    })
    .await;
    let (handler, _clock) = common::handler_with_clock(origin.config());
    let handler = Arc::new(handler);

    let mut tasks = Vec::with_capacity(TASKS);
    for task in 0..TASKS {
        let handler = handler.clone();
        tasks.push(tokio::spawn(async move {
            for round in 0..ROUNDS {
                let path = if round % 2 == 0 {
                    format!("/own/{task}/{}", round % 5)
                } else {
                    SHARED[(task + round) % SHARED.len()].to_string()
                };

                let response = handler.handle(get(&path)).await;
                assert_eq!(response.status(), StatusCode::OK);
                let status = response.headers()[&X_CACHE_STATUS].to_str().unwrap().to_string();
                assert!(status == "HIT" || status == "MISS");

                let (body, _) = read_body(response).await;
                assert_intact(&path, &body);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut expected: HashSet<String> = SHARED.iter().map(|p| p.to_string()).collect();
    for task in 0..TASKS {
        for slot in 0..5 {
            if (0..ROUNDS).step_by(2).any(|round| round % 5 == slot) {
                expected.insert(format!("/own/{task}/{slot}"));
            }
        }
    }

    assert_eq!(handler.cache().len(), expected.len());
    for path in &expected {
        let Lookup::Hit(entry) = handler.cache().lookup(path) else {
            panic!("missing entry for {path}");
        };
        let stored = codec::decode(&entry.raw, &Method::GET).unwrap();
        assert_intact(path, &stored.body);
        assert!(handler.cache().store().get(path).is_some());
    }

    // Each path is fetched at least once, and never more often than it was requested
    assert!(origin.calls() >= expected.len());
    assert!(origin.calls() <= TASKS * ROUNDS);
}
