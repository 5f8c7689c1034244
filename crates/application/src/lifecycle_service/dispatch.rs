use super::*;

/// Counters for one dispatched change batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Events that started a workflow.
    pub started: usize,
    /// Events that needed no workflow (field-only updates).
    pub ignored: usize,
    /// Redelivered events whose workflow already existed.
    pub suppressed: usize,
    /// Events returned to the feed for another delivery.
    pub released: usize,
    /// Events abandoned to the dead-letter channel.
    pub dead_lettered: usize,
}

/// Classifies one record mutation into at most one workflow start.
///
/// The decision is a pure function of the old/new image pair (plus the
/// clock for the scheduled/immediate split), so redelivery of the same
/// event always produces the same decision:
///
/// - insert of a pending request: approval workflow when approval is
///   required, otherwise grant (or schedule when the start is in the
///   future);
/// - transition to `approved`: grant, or schedule for a future start;
/// - transition to `rejected` or `cancelled`: reject;
/// - transition to `revoked`: revoke (the machine's status guard makes the
///   duplicate run a no-op);
/// - an end time or revoker marked on an in-progress record: revoke;
/// - anything else (comment edits, approver updates): no workflow.
#[must_use]
pub fn classify(
    old: Option<&Request>,
    new: &Request,
    now: DateTime<Utc>,
) -> Option<WorkflowKind> {
    let status_changed = old.map(|image| image.status) != Some(new.status);

    if status_changed {
        return match new.status {
            RequestStatus::Pending => {
                if old.is_some() {
                    return None;
                }
                if new.approval_required {
                    Some(WorkflowKind::Approval)
                } else if new.start_time > now {
                    Some(WorkflowKind::Schedule)
                } else {
                    Some(WorkflowKind::Grant)
                }
            }
            RequestStatus::Approved => {
                if new.start_time > now {
                    Some(WorkflowKind::Schedule)
                } else {
                    Some(WorkflowKind::Grant)
                }
            }
            RequestStatus::Rejected | RequestStatus::Cancelled => Some(WorkflowKind::Reject),
            RequestStatus::Revoked => Some(WorkflowKind::Revoke),
            _ => None,
        };
    }

    if new.status == RequestStatus::InProgress {
        let end_marked =
            new.end_time.is_some() && old.is_none_or(|image| image.end_time.is_none());
        let revoker_marked =
            new.revoker_id.is_some() && old.is_none_or(|image| image.revoker_id.is_none());
        if end_marked || revoker_marked {
            return Some(WorkflowKind::Revoke);
        }
    }

    None
}

/// Derives the idempotency key for a dispatcher-started workflow.
///
/// Keyed on the new image's status so redeliveries of the same event map
/// to the same execution, while distinct lifecycle moments stay distinct.
#[must_use]
pub fn dispatch_execution_key(kind: WorkflowKind, request: &Request) -> String {
    format!(
        "{}:{}:{}",
        kind.as_str(),
        request.id,
        request.status.as_str()
    )
}

impl LifecycleService {
    /// Polls the change feed once and dispatches the batch.
    pub async fn poll_and_dispatch(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> AppResult<DispatchSummary> {
        let events = self.change_feed.poll(limit).await?;
        self.dispatch_change_batch(events, now).await
    }

    /// Dispatches one batch of change events into workflow starts.
    ///
    /// Start failures are retried within the batch; an event that keeps
    /// failing is released for redelivery until its delivery budget is
    /// spent, then published to the dead-letter channel rather than
    /// dropped.
    pub async fn dispatch_change_batch(
        &self,
        events: Vec<RequestChangeEvent>,
        now: DateTime<Utc>,
    ) -> AppResult<DispatchSummary> {
        let mut summary = DispatchSummary::default();

        for event in events {
            let Some(kind) = classify(event.old.as_ref(), &event.new, now) else {
                self.ack_event(event.event_id.as_str()).await;
                summary.ignored += 1;
                continue;
            };

            let key = dispatch_execution_key(kind, &event.new);
            let started = self
                .with_invocation_retry("start workflow from change event", || {
                    self.start_workflow(kind, event.new.clone(), key.clone())
                })
                .await;

            match started {
                Ok(Some(execution)) => {
                    info!(
                        event_id = event.event_id.as_str(),
                        request_id = %event.new.id,
                        workflow = kind.as_str(),
                        execution_id = execution.execution_id.as_str(),
                        "workflow started for change event"
                    );
                    self.ack_event(event.event_id.as_str()).await;
                    summary.started += 1;
                }
                Ok(None) => {
                    debug!(
                        event_id = event.event_id.as_str(),
                        request_id = %event.new.id,
                        workflow = kind.as_str(),
                        "redelivered change event suppressed"
                    );
                    self.ack_event(event.event_id.as_str()).await;
                    summary.suppressed += 1;
                }
                Err(start_error) => {
                    if event.delivery_count >= self.max_dispatch_attempts {
                        error!(
                            event_id = event.event_id.as_str(),
                            request_id = %event.new.id,
                            error = %start_error,
                            "dispatch exhausted deliveries; dead-lettering event"
                        );
                        let entry = DeadLetterEntry {
                            event_id: event.event_id.clone(),
                            request_id: event.new.id,
                            reason: start_error.to_string(),
                            occurred_at: Utc::now(),
                        };
                        if let Err(publish_error) = self.dead_letter_sink.publish(entry).await {
                            error!(
                                event_id = event.event_id.as_str(),
                                error = %publish_error,
                                "failed to publish dead-letter entry"
                            );
                        }
                        self.ack_event(event.event_id.as_str()).await;
                        summary.dead_lettered += 1;
                    } else {
                        warn!(
                            event_id = event.event_id.as_str(),
                            request_id = %event.new.id,
                            error = %start_error,
                            "dispatch failed; releasing event for redelivery"
                        );
                        if let Err(release_error) =
                            self.change_feed.release(event.event_id.as_str()).await
                        {
                            warn!(
                                event_id = event.event_id.as_str(),
                                error = %release_error,
                                "failed to release change event"
                            );
                        }
                        summary.released += 1;
                    }
                }
            }
        }

        Ok(summary)
    }

    async fn ack_event(&self, event_id: &str) {
        if let Err(ack_error) = self.change_feed.ack(event_id).await {
            warn!(
                event_id = event_id,
                error = %ack_error,
                "failed to ack change event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use elevate_domain::{AccessDuration, Request, RequestDraft, RequestStatus};

    use crate::lifecycle_ports::WorkflowKind;

    use super::classify;

    fn request(status: RequestStatus, approval_required: bool) -> Request {
        let Ok(duration) = AccessDuration::from_hours(1) else {
            panic!("duration should validate");
        };
        let Ok(mut request) = Request::new(RequestDraft {
            email: "dev@example.com".to_owned(),
            username: "dev".to_owned(),
            user_id: "user-1".to_owned(),
            account_id: "111122223333".to_owned(),
            account_name: "Sandbox".to_owned(),
            role: "ReadOnlyAccess".to_owned(),
            role_id: "ps-1".to_owned(),
            start_time: Utc::now() - Duration::minutes(1),
            duration,
            approval_required,
            justification: None,
            ticket_no: None,
            approvers: Vec::new(),
            approver_ids: if approval_required {
                vec!["approver-1".to_owned()]
            } else {
                Vec::new()
            },
        }) else {
            panic!("draft should validate");
        };
        request.status = status;
        request
    }

    #[test]
    fn insert_without_approval_starts_grant() {
        let new = request(RequestStatus::Pending, false);
        assert_eq!(
            classify(None, &new, Utc::now()),
            Some(WorkflowKind::Grant)
        );
    }

    #[test]
    fn insert_with_future_start_starts_schedule() {
        let mut new = request(RequestStatus::Pending, false);
        new.start_time = Utc::now() + Duration::hours(2);
        assert_eq!(
            classify(None, &new, Utc::now()),
            Some(WorkflowKind::Schedule)
        );
    }

    #[test]
    fn insert_with_approval_starts_approval() {
        let new = request(RequestStatus::Pending, true);
        assert_eq!(
            classify(None, &new, Utc::now()),
            Some(WorkflowKind::Approval)
        );
    }

    #[test]
    fn approval_decision_starts_grant_or_schedule() {
        let old = request(RequestStatus::Pending, true);
        let mut new = old.clone();
        new.status = RequestStatus::Approved;
        assert_eq!(
            classify(Some(&old), &new, Utc::now()),
            Some(WorkflowKind::Grant)
        );

        new.start_time = Utc::now() + Duration::hours(1);
        assert_eq!(
            classify(Some(&old), &new, Utc::now()),
            Some(WorkflowKind::Schedule)
        );
    }

    #[test]
    fn rejection_and_cancellation_start_reject() {
        let old = request(RequestStatus::Pending, true);
        for terminal in [RequestStatus::Rejected, RequestStatus::Cancelled] {
            let mut new = old.clone();
            new.status = terminal;
            assert_eq!(
                classify(Some(&old), &new, Utc::now()),
                Some(WorkflowKind::Reject)
            );
        }
    }

    #[test]
    fn transition_to_revoked_starts_revoke() {
        let old = request(RequestStatus::InProgress, false);
        let mut new = old.clone();
        new.status = RequestStatus::Revoked;
        assert_eq!(
            classify(Some(&old), &new, Utc::now()),
            Some(WorkflowKind::Revoke)
        );
    }

    #[test]
    fn manual_revoke_marker_starts_revoke() {
        let old = request(RequestStatus::InProgress, false);
        let mut new = old.clone();
        new.revoker_id = Some("admin-1".to_owned());
        assert_eq!(
            classify(Some(&old), &new, Utc::now()),
            Some(WorkflowKind::Revoke)
        );

        let mut ended = old.clone();
        ended.end_time = Some(Utc::now());
        assert_eq!(
            classify(Some(&old), &ended, Utc::now()),
            Some(WorkflowKind::Revoke)
        );
    }

    #[test]
    fn field_only_update_is_ignored() {
        let old = request(RequestStatus::Pending, true);
        let mut new = old.clone();
        new.comment = Some("please expedite".to_owned());
        assert_eq!(classify(Some(&old), &new, Utc::now()), None);
    }

    #[test]
    fn scheduled_status_write_back_is_ignored() {
        let old = request(RequestStatus::Pending, false);
        let mut new = old.clone();
        new.status = RequestStatus::Scheduled;
        assert_eq!(classify(Some(&old), &new, Utc::now()), None);
    }

    #[test]
    fn classification_is_deterministic_under_redelivery() {
        let now = Utc::now();
        let old = request(RequestStatus::Pending, true);
        let mut new = old.clone();
        new.status = RequestStatus::Approved;

        let first = classify(Some(&old), &new, now);
        let second = classify(Some(&old), &new, now);
        assert_eq!(first, second);
        assert_eq!(first, Some(WorkflowKind::Grant));
    }
}
