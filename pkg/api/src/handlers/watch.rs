use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct WatchQuery {
    /// Plural kind name, e.g. `resourcepoolclaims`.
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Raw key prefix; used when no kind is given.
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub seq: Option<u64>,
}

/// GET /api/v1/watch — SSE endpoint streaming watch events, replaying
/// buffered events after `seq` first.
pub async fn watch_events(
    State(state): State<AppState>,
    Query(query): Query<WatchQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let prefix = match query.kind.as_deref() {
        Some(plural) => state
            .registry
            .lookup(plural)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown kind '{}'", plural)))?
            .prefix(query.namespace.as_deref()),
        None => query.prefix.unwrap_or_default(),
    };
    let from_seq = query.seq.unwrap_or(0);

    info!(
        "Watch subscription: prefix='{}', from_seq={}",
        prefix, from_seq
    );

    // Subscribe before replaying so nothing falls between the two.
    let rx = state.store.event_log().subscribe();
    let buffered = state.store.event_log().events_since(from_seq, &prefix).await;
    let last_replayed = buffered.last().map(|e| e.seq).unwrap_or(from_seq);

    let buffered_stream = tokio_stream::iter(buffered.into_iter().filter_map(|e| {
        serde_json::to_string(&e)
            .ok()
            .map(|data| Ok::<_, Infallible>(Event::default().id(e.seq.to_string()).data(data)))
    }));

    let live_stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.seq > last_replayed && event.key.starts_with(&prefix) => {
            serde_json::to_string(&event)
                .ok()
                .map(|data| Ok::<_, Infallible>(Event::default().id(event.seq.to_string()).data(data)))
        }
        _ => None,
    });

    Ok(Sse::new(buffered_stream.chain(live_stream)).keep_alive(KeepAlive::default()))
}
