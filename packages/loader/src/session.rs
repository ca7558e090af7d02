//! One load session: the paging loop for a single load generation.
//!
//! A session alternates between a short critical section that decides the
//! next request (a [`Ticket`]), an unlocked fetch, and a second critical
//! section that commits the result only if the generation is still
//! current. At most one request per session is in flight, and each step
//! carries its own generation and offset rather than reading shared state
//! after the fact.

use std::sync::Arc;

use chrono::Utc;
use signal_map_signal_models::NarrowingQuery;
use signal_map_source::{Page, SourceError};

use crate::coordinator::{Inner, progress_units};
use crate::{LoadPhase, SessionOutcome};

/// Snapshot of what to request next.
struct Ticket {
    query: NarrowingQuery,
    offset: usize,
    limit: usize,
    /// Narrowed loads replace the collection in one request.
    narrowed: bool,
}

/// What the session does after a commit.
enum Step {
    /// Request the next page after the pacing delay.
    Next,
    /// Request the same page again after the retry backoff.
    Retry,
    Finish(SessionOutcome),
}

pub(crate) async fn run_session(inner: Arc<Inner>, generation: u64) -> SessionOutcome {
    let outcome = loop {
        let ticket = match next_ticket(&inner, generation) {
            Ok(ticket) => ticket,
            Err(outcome) => break outcome,
        };

        let result = inner
            .fetcher
            .fetch_page(&ticket.query, ticket.offset, ticket.limit)
            .await;

        match commit(&inner, generation, &ticket, result) {
            Step::Next => tokio::time::sleep(inner.config.pacing_delay()).await,
            Step::Retry => tokio::time::sleep(inner.config.retry_backoff()).await,
            Step::Finish(outcome) => break outcome,
        }
    };

    finish(&inner, generation, outcome);
    outcome
}

fn next_ticket(inner: &Inner, generation: u64) -> Result<Ticket, SessionOutcome> {
    let mut state = inner.state();

    if state.load_generation != generation {
        log::debug!("Session for generation {generation} superseded before request");
        return Err(SessionOutcome::Superseded);
    }

    if !state.narrowing.is_unconstrained() {
        return Ok(Ticket {
            query: state.narrowing.clone(),
            offset: 0,
            limit: inner.config.ceiling,
            narrowed: true,
        });
    }

    state.phase = LoadPhase::Streaming;

    let ceiling = inner.config.ceiling;
    if state.cursor >= ceiling {
        log::debug!("Cursor {} at ceiling {ceiling}; nothing to request", state.cursor);
        state.phase = LoadPhase::Complete;
        return Err(SessionOutcome::Complete);
    }

    Ok(Ticket {
        query: NarrowingQuery::default(),
        offset: state.cursor,
        limit: inner.config.chunk_size.min(ceiling - state.cursor),
        narrowed: false,
    })
}

fn commit(
    inner: &Inner,
    generation: u64,
    ticket: &Ticket,
    result: Result<Page, SourceError>,
) -> Step {
    let mut state = inner.state();

    if state.load_generation != generation {
        log::debug!(
            "Discarding page at offset {} from superseded generation {generation}",
            ticket.offset
        );
        return Step::Finish(SessionOutcome::Superseded);
    }

    let page = match result {
        Ok(page) => page,
        Err(e) if e.is_transient() => {
            log::warn!(
                "Page fetch at offset {} failed: {e}; retrying in {:?}",
                ticket.offset,
                inner.config.retry_backoff()
            );
            return Step::Retry;
        }
        Err(e) => {
            log::error!("Page fetch at offset {} failed permanently: {e}", ticket.offset);
            state.phase = LoadPhase::Failed;
            return Step::Finish(SessionOutcome::Failed);
        }
    };

    if ticket.narrowed {
        let kept = state.points.replace(page.items);
        state.cursor = page.returned;
        state.last_update = Some(Utc::now());
        state.phase = LoadPhase::Complete;
        inner.progress.set_position(progress_units(kept));
        log::info!("Narrowed load committed {kept} points ({:?})", ticket.query);
        return Step::Finish(SessionOutcome::Complete);
    }

    if state.cursor != ticket.offset {
        log::debug!(
            "Cursor moved from {} to {}; dropping page",
            ticket.offset,
            state.cursor
        );
        return Step::Finish(SessionOutcome::Superseded);
    }

    let appended = state.points.extend_page(page.items);
    state.cursor += page.returned;
    if page.returned > 0 {
        state.last_update = Some(Utc::now());
    }
    inner.progress.inc(progress_units(appended));

    log::debug!(
        "Committed page offset={} returned={} appended={appended} total={}",
        ticket.offset,
        page.returned,
        state.points.len()
    );

    if page.returned == 0
        || page.returned < ticket.limit
        || state.cursor >= inner.config.ceiling
    {
        state.phase = LoadPhase::Complete;
        log::info!(
            "Load complete: {} points, cursor {}",
            state.points.len(),
            state.cursor
        );
        Step::Finish(SessionOutcome::Complete)
    } else {
        Step::Next
    }
}

fn finish(inner: &Inner, generation: u64, outcome: SessionOutcome) {
    let total = {
        let mut state = inner.state();
        if state.active_session == Some(generation) {
            state.active_session = None;
        }
        state.points.len()
    };

    if outcome == SessionOutcome::Complete {
        inner.progress.finish(format!("{total} points loaded"));
    }
}
