//! Replay of platform calls after transport failures.
//!
//! A request is replayed only when its method is idempotent: reads, PATCH and
//! DELETE filtered by primary key. POST inserts rows and fires functions, and
//! a timeout can hide a commit, so it goes out exactly once. A response with
//! any status, including 5xx, is handed back on the first try.

use std::time::Duration;

use reqwest::Method;

/// Replays after the first attempt of an idempotent request.
pub(crate) const MAX_REPLAYS: u32 = 3;

/// First backoff delay; doubles on each replay (200ms, 400ms, 800ms).
pub(crate) const BASE_DELAY_MS: u64 = 200;

/// Delay before replay number `replay` (zero-based).
pub(crate) fn backoff(replay: u32) -> Duration {
    Duration::from_millis(BASE_DELAY_MS * 2u64.pow(replay))
}

/// Number of replays allowed for `method`.
pub(crate) fn replays_for(method: &Method) -> u32 {
    match *method {
        Method::GET | Method::HEAD | Method::OPTIONS | Method::PUT | Method::PATCH | Method::DELETE => {
            MAX_REPLAYS
        }
        _ => 0,
    }
}

/// Send `builder`, replaying idempotent requests on transport errors.
pub(crate) async fn send(builder: reqwest::RequestBuilder) -> Result<reqwest::Response, reqwest::Error> {
    let (client, request) = builder.build_split();
    let request = request?;
    let method = request.method().clone();
    let replays = replays_for(&method);

    for replay in 0..replays {
        // Bodies are serialized JSON held in memory, so cloning never fails.
        let Some(copy) = request.try_clone() else {
            break;
        };
        match client.execute(copy).await {
            Ok(resp) => return Ok(resp),
            Err(e) => {
                let delay = backoff(replay);
                tracing::warn!(
                    %method,
                    url = %request.url().path(),
                    replay = replay + 1,
                    max_replays = replays,
                    "platform request failed, replaying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
    client.execute(request).await
}
