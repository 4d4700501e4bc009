//! Entry points used by the host process: add, enqueue, retry, and poll.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use meetnews_shared::{MeetNewsError, MeetingRecord, NewMeeting, ProcessNewsRequest, Result, TaskId};
use meetnews_storage::Storage;

use crate::broker::Dispatcher;

/// Accepts enrichment work on behalf of callers.
///
/// Every method returns as soon as the task is queued; the outcome lands in
/// storage once a worker has run it. Records handed to the broker are
/// marked as queued so a polling worker does not pick them up twice.
pub struct EnrichmentService {
    dispatcher: Dispatcher,
    storage: Arc<Storage>,
}

impl EnrichmentService {
    pub fn new(dispatcher: Dispatcher, storage: Arc<Storage>) -> Self {
        Self {
            dispatcher,
            storage,
        }
    }

    /// Store a new meeting and queue its enrichment.
    pub async fn add_meeting(&self, meeting: &NewMeeting) -> Result<(i64, TaskId)> {
        let id = self.storage.insert_meeting_queued(meeting).await?;
        let task = self.submit(ProcessNewsRequest::new(
            id,
            meeting.user_id,
            meeting.summary_meeting.clone(),
            meeting.keywords.clone(),
        ))?;
        Ok((id, task))
    }

    /// Queue an orchestrator task for the stored record named by `request`.
    pub async fn enqueue(&self, request: ProcessNewsRequest) -> Result<TaskId> {
        if !self
            .storage
            .mark_queued(request.record_id, request.owner_id)
            .await?
        {
            return Err(MeetNewsError::not_found(format!("meeting {}", request.record_id)));
        }
        self.submit(request)
    }

    /// Queue the stored record `record_id` using its saved summary and keywords.
    pub async fn enrich_existing(&self, record_id: i64, owner_id: i64) -> Result<TaskId> {
        let request = stored_request(&self.storage, record_id, owner_id).await?;
        self.enqueue(request).await
    }

    /// Clear the record's news items and run enrichment again.
    #[instrument(skip(self))]
    pub async fn retry_news_analysis(&self, record_id: i64, owner_id: i64) -> Result<TaskId> {
        let request = stored_request(&self.storage, record_id, owner_id).await?;

        if !self.storage.clear_news_items(record_id, owner_id, true).await? {
            return Err(MeetNewsError::not_found(format!("meeting {record_id}")));
        }
        info!(record_id, "news items cleared for retry");

        self.submit(request)
    }

    /// Claim pending records from storage and queue them.
    ///
    /// Returns how many tasks were queued.
    pub async fn poll_pending(&self, limit: u32) -> Result<usize> {
        let claimed = self.storage.claim_pending(limit).await?;
        let mut queued = 0;
        for record in claimed {
            let id = record.id;
            match request_from_record(record) {
                Ok(request) => {
                    self.submit(request)?;
                    queued += 1;
                }
                Err(e) => warn!(record_id = id, error = %e, "pending record skipped"),
            }
        }
        Ok(queued)
    }

    /// Poll for pending records every `interval` until `shutdown` resolves.
    ///
    /// A failed poll is logged and retried on the next tick.
    pub async fn poll_until<F>(&self, interval: Duration, limit: u32, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => match self.poll_pending(limit).await {
                    Ok(0) => {}
                    Ok(queued) => info!(queued, "pending records queued"),
                    Err(e) => warn!(error = %e, "polling for pending records failed"),
                },
            }
        }
    }

    fn submit(&self, request: ProcessNewsRequest) -> Result<TaskId> {
        let record_id = request.record_id;
        let id = self.dispatcher.enqueue_process_news(request)?;
        info!(record_id, task_id = %id, "news enrichment accepted");
        Ok(id)
    }
}

/// Clear a record's news items and leave it pending for a polling worker.
///
/// Applies the same checks as [`EnrichmentService::retry_news_analysis`].
pub async fn reset_for_retry(storage: &Storage, record_id: i64, owner_id: i64) -> Result<()> {
    stored_request(storage, record_id, owner_id).await?;
    if !storage.clear_news_items(record_id, owner_id, false).await? {
        return Err(MeetNewsError::not_found(format!("meeting {record_id}")));
    }
    info!(record_id, "news items cleared, record pending");
    Ok(())
}

/// Build a request from the stored record, checking it can be enriched.
async fn stored_request(
    storage: &Storage,
    record_id: i64,
    owner_id: i64,
) -> Result<ProcessNewsRequest> {
    let record = storage
        .get_meeting(record_id, owner_id)
        .await?
        .ok_or_else(|| MeetNewsError::not_found(format!("meeting {record_id}")))?;
    request_from_record(record)
}

fn request_from_record(record: MeetingRecord) -> Result<ProcessNewsRequest> {
    let record_id = record.id;

    let summary = record
        .summary_meeting
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| MeetNewsError::validation(format!("meeting {record_id} has no summary")))?;

    let keywords = record
        .keywords
        .filter(|k| !k.is_empty())
        .ok_or_else(|| MeetNewsError::validation(format!("meeting {record_id} has no keywords")))?;

    Ok(ProcessNewsRequest::new(record_id, record.user_id, summary, keywords))
}
