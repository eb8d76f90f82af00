use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::dates::now;
use crate::models::BookingEvent;
use crate::services::auth;
use crate::state::AppState;

// GET /api/admin/bookings/events (SSE)
#[derive(Deserialize)]
pub struct SseQuery {
    pub token: Option<String>,
}

pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SseQuery>,
) -> AppResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    // EventSource can't set headers, so the token may come as a query param
    let pending = {
        let db = state.db()?;
        let admin = match query.token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => queries::get_session_user(&db, token, &now())?.ok_or(AppError::Unauthorized)?,
            None => auth::require_user(&db, &headers)?,
        };
        if !admin.is_admin() {
            return Err(AppError::Forbidden);
        }
        queries::get_all_bookings(&db, Some("pending"), 200)?
    };

    let rx = state.booking_tx.subscribe();

    // Open with the bookings still waiting on a payment.
    let snapshot = tokio_stream::iter(pending.into_iter().map(|booking| {
        let event = BookingEvent {
            booking_id: booking.id,
            room_id: booking.room_id,
            status: booking.status,
            payment_status: booking.payment_status,
            reason: "snapshot".to_string(),
            at: booking.updated_at,
        };
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok::<_, Infallible>(Event::default().data(data).event("booking_snapshot"))
    }));

    let live = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(Event::default().data(data).event("booking_event")))
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "admin event stream lagged");
            None
        }
    });

    Ok(Sse::new(snapshot.chain(live)).keep_alive(KeepAlive::default()))
}
