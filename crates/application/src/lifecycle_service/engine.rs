use std::future::Future;

use super::*;

impl LifecycleService {
    /// Starts one workflow execution under an idempotency key.
    ///
    /// Returns `None` when an execution with the same key already exists,
    /// which is how redelivered triggers collapse into no-ops.
    pub async fn start_workflow(
        &self,
        kind: WorkflowKind,
        request: Request,
        execution_key: String,
    ) -> AppResult<Option<WorkflowExecution>> {
        let state = MachineState::initial(kind, &request);
        let new = NewWorkflowExecution {
            execution_key: execution_key.clone(),
            kind,
            input: WorkflowInput { request },
            state: serialize_state(&state)?,
        };

        let created = self.execution_store.create(new).await?;
        if created.is_none() {
            debug!(
                execution_key = execution_key.as_str(),
                "duplicate workflow start suppressed"
            );
        }

        Ok(created)
    }

    /// Claims due executions for one worker and drives each until it
    /// suspends, completes, or fails.
    pub async fn run_due(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<WorkflowExecution>> {
        if worker_id.trim().is_empty() {
            return Err(AppError::Validation(
                "worker_id must not be empty".to_owned(),
            ));
        }

        if limit == 0 {
            return Err(AppError::Validation(
                "limit must be greater than zero".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "lease_seconds must be greater than zero".to_owned(),
            ));
        }

        let claimed = self
            .execution_store
            .claim_due(worker_id, now, limit, lease_seconds)
            .await?;

        let mut finished = Vec::with_capacity(claimed.len());
        for execution in claimed {
            let execution_id = execution.execution_id.clone();
            match self.run_claimed(execution).await {
                Ok(result) => finished.push(result),
                Err(run_error) => warn!(
                    execution_id = execution_id.as_str(),
                    error = %run_error,
                    "failed to run claimed execution"
                ),
            }
        }

        Ok(finished)
    }

    /// Drives one claimed execution; unrecoverable engine errors mark it
    /// failed for operator attention instead of leaving it stuck.
    async fn run_claimed(&self, mut execution: WorkflowExecution) -> AppResult<WorkflowExecution> {
        match self.drive(&mut execution).await {
            Ok(()) => Ok(execution),
            Err(drive_error) => {
                error!(
                    execution_id = execution.execution_id.as_str(),
                    request_id = %execution.input.request.id,
                    error = %drive_error,
                    "workflow execution failed"
                );
                let message = drive_error.to_string();
                self.execution_store
                    .checkpoint(
                        execution.execution_id.as_str(),
                        ExecutionCheckpoint {
                            state: execution.state.clone(),
                            status: ExecutionStatus::Failed,
                            resume_at: None,
                            last_error: Some(message.clone()),
                        },
                    )
                    .await?;
                execution.status = ExecutionStatus::Failed;
                execution.last_error = Some(message);
                Ok(execution)
            }
        }
    }

    async fn drive(&self, execution: &mut WorkflowExecution) -> AppResult<()> {
        let mut state: MachineState =
            serde_json::from_value(execution.state.clone()).map_err(|serde_error| {
                AppError::Internal(format!(
                    "corrupt machine state for execution '{}': {serde_error}",
                    execution.execution_id
                ))
            })?;

        // A claim of a waiting execution means its deadline elapsed; the
        // first wait effect we see resolves as the fired timer.
        let mut timer_fired = execution.status == ExecutionStatus::Waiting;

        loop {
            let Some(effect) = state.effect() else {
                self.execution_store
                    .checkpoint(
                        execution.execution_id.as_str(),
                        ExecutionCheckpoint {
                            state: execution.state.clone(),
                            status: ExecutionStatus::Completed,
                            resume_at: None,
                            last_error: None,
                        },
                    )
                    .await?;
                execution.status = ExecutionStatus::Completed;
                execution.resume_at = None;
                info!(
                    execution_id = execution.execution_id.as_str(),
                    workflow = execution.kind.as_str(),
                    request_id = %execution.input.request.id,
                    "workflow execution completed"
                );
                return Ok(());
            };

            let outcome = if effect.is_wait() {
                if timer_fired {
                    timer_fired = false;
                    EffectOutcome::TimerFired
                } else {
                    let resume_at = self.wait_deadline(&effect, &execution.input).await?;
                    self.execution_store
                        .checkpoint(
                            execution.execution_id.as_str(),
                            ExecutionCheckpoint {
                                state: execution.state.clone(),
                                status: ExecutionStatus::Waiting,
                                resume_at: Some(resume_at),
                                last_error: None,
                            },
                        )
                        .await?;
                    execution.status = ExecutionStatus::Waiting;
                    execution.resume_at = Some(resume_at);
                    debug!(
                        execution_id = execution.execution_id.as_str(),
                        workflow = execution.kind.as_str(),
                        resume_at = %resume_at,
                        "execution suspended"
                    );
                    return Ok(());
                }
            } else {
                self.perform_effect(&effect, execution).await?
            };

            state = state.advance(&outcome)?;
            execution.state = serialize_state(&state)?;
            self.execution_store
                .checkpoint(
                    execution.execution_id.as_str(),
                    ExecutionCheckpoint {
                        state: execution.state.clone(),
                        status: ExecutionStatus::Runnable,
                        resume_at: None,
                        last_error: None,
                    },
                )
                .await?;
        }
    }

    /// Computes the wake-up deadline for a wait effect.
    ///
    /// The window wait is measured from entry into the wait state, not as
    /// an absolute deadline computed at grant time; the approval expiry is
    /// read from settings at suspension time so policy changes apply to
    /// requests already in flight.
    async fn wait_deadline(
        &self,
        effect: &Effect,
        input: &WorkflowInput,
    ) -> AppResult<DateTime<Utc>> {
        match effect {
            Effect::WaitForDuration => Ok(Utc::now() + input.request.duration.as_chrono()),
            Effect::WaitForApprovalExpiry => {
                let settings = self.settings_provider.current().await?;
                Ok(Utc::now() + settings.approval_expiry())
            }
            Effect::WaitUntilStartTime => Ok(input.request.start_time),
            _ => Err(AppError::Internal(
                "wait deadline requested for a non-wait effect".to_owned(),
            )),
        }
    }

    async fn perform_effect(
        &self,
        effect: &Effect,
        execution: &WorkflowExecution,
    ) -> AppResult<EffectOutcome> {
        let request = &execution.input.request;
        match effect {
            Effect::GrantAccess => {
                let assignment = Assignment::from_request(request);
                match self
                    .with_access_retry("create assignment", || {
                        let provider = Arc::clone(&self.access_provider);
                        let assignment = assignment.clone();
                        async move { provider.grant(&assignment).await }
                    })
                    .await
                {
                    Ok(()) => {
                        info!(
                            request_id = %request.id,
                            account_id = request.account_id.as_str(),
                            permission_set = request.role_id.as_str(),
                            "permission assignment created"
                        );
                        Ok(EffectOutcome::Succeeded)
                    }
                    Err(message) => {
                        warn!(
                            request_id = %request.id,
                            error = message.as_str(),
                            "grant failed permanently; capturing error"
                        );
                        Ok(EffectOutcome::Failed(message))
                    }
                }
            }
            Effect::RevokeAccess => {
                let assignment = Assignment::from_request(request);
                match self
                    .with_access_retry("delete assignment", || {
                        let provider = Arc::clone(&self.access_provider);
                        let assignment = assignment.clone();
                        async move { provider.revoke(&assignment).await }
                    })
                    .await
                {
                    Ok(()) => {
                        info!(
                            request_id = %request.id,
                            account_id = request.account_id.as_str(),
                            "permission assignment deleted"
                        );
                        Ok(EffectOutcome::Succeeded)
                    }
                    Err(message) => {
                        warn!(
                            request_id = %request.id,
                            error = message.as_str(),
                            "revoke failed permanently; capturing error"
                        );
                        Ok(EffectOutcome::Failed(message))
                    }
                }
            }
            Effect::UpdateStatus(status) => {
                self.update_request_absorbing(
                    "update status",
                    request,
                    RequestPatch::with_status(*status),
                )
                .await;
                Ok(EffectOutcome::Succeeded)
            }
            Effect::RecordStartTime { open_session } => {
                let started_at = Utc::now();
                let patch = RequestPatch {
                    start_time: Some(started_at),
                    session_duration: Some(request.duration.to_string()),
                    ..RequestPatch::default()
                };
                self.update_request_absorbing("record start time", request, patch)
                    .await;

                if *open_session {
                    let session = Session::open(request, started_at, self.session_ttl);
                    let create_result = self
                        .with_invocation_retry("create session", || {
                            let sessions = Arc::clone(&self.session_repository);
                            let session = session.clone();
                            async move { sessions.create(session).await }
                        })
                        .await;
                    if let Err(session_error) = create_result {
                        warn!(
                            request_id = %request.id,
                            error = %session_error,
                            "failed to open audit session; continuing"
                        );
                    }
                }

                Ok(EffectOutcome::Succeeded)
            }
            Effect::RecordEndTime => {
                let ended_at = Utc::now();
                let patch = RequestPatch {
                    end_time: Some(ended_at),
                    ..RequestPatch::default()
                };
                self.update_request_absorbing("record end time", request, patch)
                    .await;

                let close_result = self
                    .with_invocation_retry("close session", || {
                        let sessions = Arc::clone(&self.session_repository);
                        let request_id = request.id;
                        async move { sessions.close(request_id, ended_at).await }
                    })
                    .await;
                if let Err(session_error) = close_result {
                    warn!(
                        request_id = %request.id,
                        error = %session_error,
                        "failed to close audit session; continuing"
                    );
                }

                Ok(EffectOutcome::Succeeded)
            }
            Effect::ReadStatus => {
                let found = self
                    .with_invocation_retry("read request status", || {
                        let repository = Arc::clone(&self.repository);
                        let request_id = request.id;
                        async move { repository.get(request_id).await }
                    })
                    .await?;
                let current = found.ok_or_else(|| {
                    AppError::NotFound(format!("request '{}' no longer exists", request.id))
                })?;
                Ok(EffectOutcome::StatusRead(current.status))
            }
            Effect::Notify(kind) => {
                let notify_result = self
                    .with_invocation_retry("send notification", || {
                        let notifier = Arc::clone(&self.notifier);
                        let event = NotificationEvent {
                            kind: *kind,
                            request: request.clone(),
                        };
                        async move { notifier.notify(event).await }
                    })
                    .await;
                if let Err(notify_error) = notify_result {
                    warn!(
                        request_id = %request.id,
                        notification = kind.as_str(),
                        error = %notify_error,
                        "notification failed; continuing"
                    );
                }
                Ok(EffectOutcome::Succeeded)
            }
            Effect::StartWorkflow(kind) => {
                let key = successor_execution_key(*kind, request);
                self.with_invocation_retry("start successor workflow", || {
                    self.start_workflow(*kind, request.clone(), key.clone())
                })
                .await?;
                Ok(EffectOutcome::Succeeded)
            }
            Effect::WaitForDuration | Effect::WaitForApprovalExpiry | Effect::WaitUntilStartTime => {
                Err(AppError::Internal(
                    "wait effects are handled by the engine loop".to_owned(),
                ))
            }
        }
    }

    /// Bookkeeping write with bounded retries; exhaustion is logged and
    /// absorbed because the access action takes priority over bookkeeping.
    async fn update_request_absorbing(
        &self,
        operation: &str,
        request: &Request,
        patch: RequestPatch,
    ) {
        let update_result = self
            .with_invocation_retry(operation, || {
                let status_updater = Arc::clone(&self.status_updater);
                let patch = patch.clone();
                let request_id = request.id;
                async move { status_updater.update(request_id, patch).await }
            })
            .await;

        if let Err(update_error) = update_result {
            warn!(
                request_id = %request.id,
                operation = operation,
                error = %update_error,
                "status update failed after retries; continuing"
            );
        }
    }

    pub(super) async fn with_invocation_retry<T, F, Fut>(
        &self,
        operation: &str,
        mut call: F,
    ) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut last_error: Option<AppError> = None;
        for attempt in 1..=self.invocation_retry.max_attempts {
            match call().await {
                Ok(value) => return Ok(value),
                Err(AppError::Conflict(message)) => {
                    return Err(AppError::Conflict(message));
                }
                Err(call_error) => {
                    if attempt < self.invocation_retry.max_attempts {
                        warn!(
                            operation = operation,
                            attempt = attempt,
                            error = %call_error,
                            "invocation failed; backing off"
                        );
                        tokio::time::sleep(self.invocation_retry.delay_for(attempt)).await;
                    }
                    last_error = Some(call_error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AppError::Internal(format!("{operation} failed with no recorded error"))
        }))
    }

    async fn with_access_retry<F, Fut>(&self, operation: &str, mut call: F) -> Result<(), String>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), crate::lifecycle_ports::AccessProviderError>>,
    {
        for attempt in 1..=self.access_retry.max_attempts {
            match call().await {
                Ok(()) => return Ok(()),
                Err(provider_error) if provider_error.is_retryable() => {
                    if attempt >= self.access_retry.max_attempts {
                        return Err(provider_error.to_string());
                    }
                    warn!(
                        operation = operation,
                        attempt = attempt,
                        error = %provider_error,
                        "retryable provider error; backing off"
                    );
                    tokio::time::sleep(self.access_retry.delay_for(attempt)).await;
                }
                Err(provider_error) => return Err(provider_error.to_string()),
            }
        }

        Err(format!("{operation} exhausted provider retries"))
    }
}

fn serialize_state(state: &MachineState) -> AppResult<serde_json::Value> {
    serde_json::to_value(state)
        .map_err(|serde_error| AppError::Internal(format!("failed to serialize machine state: {serde_error}")))
}

fn successor_execution_key(kind: WorkflowKind, request: &Request) -> String {
    match kind {
        WorkflowKind::Revoke => format!("revoke:{}:window-elapsed", request.id),
        WorkflowKind::Grant => format!("grant:{}:scheduled-start", request.id),
        other => format!("{}:{}:successor", other.as_str(), request.id),
    }
}
