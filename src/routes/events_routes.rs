use std::convert::Infallible;

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, HeaderValue},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use futures_util::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::entities::PaymentTarget;
use crate::events::EngineEvent;
use crate::middleware::auth_context::AuthContext;
use crate::models::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(stream))
}

/// GET /api/v1/events: committed entities the caller is a party to.
pub async fn stream(State(state): State<AppState>, auth: AuthContext) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let events = committed_to_sse(state, auth);
    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn visible_to(state: &AppState, auth: &AuthContext, event: &EngineEvent) -> bool {
    match event {
        EngineEvent::Appointment(a) => a.involves(auth.account_id),
        EngineEvent::Case(c) => c.involves(auth.account_id),
        EngineEvent::Payment(p) => {
            let books = state.engine.snapshot();
            match p.target {
                PaymentTarget::Appointment(id) => books
                    .appointments
                    .get(&id)
                    .is_some_and(|a| a.involves(auth.account_id)),
                PaymentTarget::Case(id) => books
                    .cases
                    .get(&id)
                    .is_some_and(|c| c.involves(auth.account_id)),
            }
        }
    }
}

fn committed_to_sse(
    state: AppState,
    auth: AuthContext,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let rx = state.engine.subscribe();
    BroadcastStream::new(rx)
        .filter_map(move |msg| {
            let out = match msg {
                Ok(batch) => batch
                    .changes
                    .iter()
                    .filter(|event| visible_to(&state, &auth, event))
                    .filter_map(|event| {
                        serde_json::to_string(event)
                            .ok()
                            .map(|data| Ok(Event::default().event(event.kind()).data(data)))
                    })
                    .collect::<Vec<_>>(),
                Err(_) => Vec::new(), // lagged
            };
            async move { (!out.is_empty()).then(|| futures_util::stream::iter(out)) }
        })
        .flatten()
}
