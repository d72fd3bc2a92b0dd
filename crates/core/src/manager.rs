// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The task manager: the supervisor tying every other module in this crate
//! into the launch → start → run → finalize lifecycle of a background task.
//!
//! All mutable state lives behind one `tokio::sync::Mutex`. No `.await`
//! point is ever reached while the guard is held — every method takes the
//! lock, does synchronous bookkeeping, drops it, and only then performs any
//! suspending work (host calls, permit acquisition, sleeps). Re-checks after
//! every suspension point close the races that introduces.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::config::ManagerConfig;
use crate::error::ManagerError;
use crate::event::{EventBus, EventKind, TaskEvent};
use crate::health::{counts_by_status, oldest_non_terminal_age_ms, HealthSnapshot};
use crate::host::{CreateSessionRequest, HostClient, PromptBody, PromptPart, PromptRequest, PromptTools, SessionStatusEvent, SessionStatusKind};
use crate::limiter::ConcurrencyLimiter;
use crate::metrics::MetricsCollector;
use crate::notification::{NotificationSender, NotificationService};
use crate::persistence::PersistenceAdapter;
use crate::resource::ResourceManager;
use crate::saga::{ClosureStep, Saga};
use crate::state_machine::{StateMachine, TransitionContext};
use crate::system_prompt::{append_background_tasks_block, effective_system_prompt, is_read_only_agent};
use crate::task::{is_valid_task_id, now_epoch_ms, now_iso8601, parse_iso8601_ms, truncate_result, Task, TaskStatus};

/// The closed subagent enumeration the manager accepts for launch.
pub const KNOWN_AGENTS: &[&str] = &["orchestrator", "explorer", "librarian", "oracle", "designer", "fixer"];

struct ManagerState {
    tasks: HashMap<String, Task>,
    by_session: HashMap<String, String>,
    by_parent: HashMap<String, HashSet<String>>,
    pending_retrieval: HashSet<String>,
    admission_queue: VecDeque<String>,
    queue_set: HashSet<String>,
    active_starts: u32,
    processing_queue: bool,
    pending_reprocess: bool,
    eviction_queue: VecDeque<String>,
    finalizing: HashSet<String>,
    idle_timers: HashMap<String, JoinHandle<()>>,
    waiters: HashMap<String, Vec<oneshot::Sender<Task>>>,
    held_permits: HashMap<String, crate::limiter::Permit>,
    paused: bool,
}

impl Default for ManagerState {
    fn default() -> Self {
        Self {
            tasks: HashMap::new(),
            by_session: HashMap::new(),
            by_parent: HashMap::new(),
            pending_retrieval: HashSet::new(),
            admission_queue: VecDeque::new(),
            queue_set: HashSet::new(),
            active_starts: 0,
            processing_queue: false,
            pending_reprocess: false,
            eviction_queue: VecDeque::new(),
            finalizing: HashSet::new(),
            idle_timers: HashMap::new(),
            waiters: HashMap::new(),
            held_permits: HashMap::new(),
            paused: false,
        }
    }
}

/// Supervises every background task from launch through terminal
/// finalization. Construct with [`TaskManager::new`] and share the returned
/// `Arc` with the tool-surface layer and the host event webhook.
pub struct TaskManager {
    state: Mutex<ManagerState>,
    config: Arc<ManagerConfig>,
    state_machine: StateMachine,
    events: Arc<EventBus>,
    limiter: Arc<ConcurrencyLimiter>,
    resources: Arc<ResourceManager>,
    notifications: Arc<NotificationService>,
    metrics: Arc<MetricsCollector>,
    persistence: Arc<PersistenceAdapter>,
    host: Arc<dyn HostClient>,
}

impl TaskManager {
    pub fn new(config: Arc<ManagerConfig>, host: Arc<dyn HostClient>, notification_sender: Arc<dyn NotificationSender>) -> Arc<Self> {
        let events = Arc::new(EventBus::new());
        let limiter = Arc::new(ConcurrencyLimiter::new(
            HashMap::new(),
            config.model_pattern_caps(),
            config.default_model_cap,
            Duration::from_secs(config.permit_acquire_timeout_secs),
        ));
        let notifications = Arc::new(NotificationService::new(
            notification_sender,
            Arc::clone(&events),
            config.notification_retries,
            Duration::from_millis(config.notification_retry_base_ms),
            config.breaker_failure_threshold,
            Duration::from_secs(config.breaker_recovery_secs),
            config.breaker_half_open_max_calls,
        ));
        let metrics = MetricsCollector::attach(&events);
        let persistence = Arc::new(PersistenceAdapter::new(config.persistence_path()));

        Arc::new(Self {
            state: Mutex::new(ManagerState::default()),
            config,
            state_machine: StateMachine::new(Arc::clone(&events)),
            events,
            limiter,
            resources: Arc::new(ResourceManager::new()),
            notifications,
            metrics,
            persistence,
            host,
        })
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    // ---- Launch ---------------------------------------------------------

    /// `caller_agent` is the agent of the session making the launch call
    /// (used for the read-only and nested-launch checks); `agent` is the
    /// subagent the new background task will run as.
    pub async fn launch(
        self: &Arc<Self>,
        parent_session_id: &str,
        caller_agent: &str,
        agent: &str,
        description: &str,
        prompt: &str,
        model: Option<String>,
    ) -> Result<Task, ManagerError> {
        if !KNOWN_AGENTS.contains(&agent) {
            return Err(ManagerError::InvalidAgent(agent.to_owned()));
        }
        if is_read_only_agent(caller_agent) {
            return Err(ManagerError::ReadOnlyAgent(caller_agent.to_owned()));
        }

        let task = {
            let mut state = self.state.lock().await;
            if state.paused {
                return Err(ManagerError::Paused);
            }
            if state.by_session.contains_key(parent_session_id) {
                let parent_task_id = state.by_session.get(parent_session_id).cloned();
                if let Some(parent_task_id) = parent_task_id {
                    if let Some(parent_task) = state.tasks.get(&parent_task_id) {
                        if !parent_task.status.is_terminal() {
                            return Err(ManagerError::NestedLaunch);
                        }
                    }
                }
            }

            let task = Task::new(parent_session_id, agent, description, prompt, model, Arc::clone(&self.config));
            state.tasks.insert(task.id.clone(), task.clone());
            state.by_parent.entry(parent_session_id.to_owned()).or_default().insert(task.id.clone());
            state.admission_queue.push_back(task.id.clone());
            state.queue_set.insert(task.id.clone());
            task
        };

        self.events.emit(TaskEvent::new(EventKind::Created, &task.id, task.state_version));

        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.pump_admission_queue().await });

        Ok(task)
    }

    // ---- Admission queue --------------------------------------------------

    async fn pump_admission_queue(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().await;
            if state.processing_queue {
                state.pending_reprocess = true;
                return;
            }
            state.processing_queue = true;
        }

        loop {
            let dispatched = self.dispatch_ready_tasks().await;
            let mut state = self.state.lock().await;
            if dispatched > 0 {
                continue;
            }
            if state.pending_reprocess {
                state.pending_reprocess = false;
                continue;
            }
            state.processing_queue = false;
            break;
        }
    }

    async fn dispatch_ready_tasks(self: &Arc<Self>) -> usize {
        let mut dispatched = 0;
        loop {
            let next = {
                let mut state = self.state.lock().await;
                if state.paused || state.active_starts >= self.config.max_concurrent_starts {
                    None
                } else {
                    let mut found = None;
                    while let Some(task_id) = state.admission_queue.pop_front() {
                        state.queue_set.remove(&task_id);
                        if matches!(state.tasks.get(&task_id).map(|t| t.status), Some(TaskStatus::Pending)) {
                            found = Some(task_id);
                            break;
                        }
                    }
                    if found.is_some() {
                        state.active_starts += 1;
                    }
                    found
                }
            };

            match next {
                Some(task_id) => {
                    dispatched += 1;
                    let manager = Arc::clone(self);
                    tokio::spawn(async move {
                        manager.start_task(task_id).await;
                        {
                            let mut state = manager.state.lock().await;
                            state.active_starts = state.active_starts.saturating_sub(1);
                        }
                        manager.pump_admission_queue().await;
                    });
                }
                None => break,
            }
        }
        dispatched
    }

    // ---- Start (two-phase commit) ----------------------------------------

    async fn start_task(self: &Arc<Self>, task_id: String) {
        let reserved = {
            let mut state = self.state.lock().await;
            let Some(task) = state.tasks.get_mut(&task_id) else { return };
            self.state_machine.transition(task, TaskStatus::Starting, TransitionContext::default()).is_ok()
        };
        if !reserved {
            return;
        }

        let model = {
            let state = self.state.lock().await;
            state.tasks.get(&task_id).map(|t| t.model.clone()).unwrap_or_default()
        };

        let permit = match self.limiter.acquire(&model).await {
            Ok(permit) => permit,
            Err(_) => {
                self.finalize(
                    &task_id,
                    TaskStatus::Failed,
                    TransitionContext { error: Some("timed out waiting for a concurrency permit".to_owned()), ..Default::default() },
                )
                .await;
                return;
            }
        };

        let still_starting = {
            let state = self.state.lock().await;
            matches!(state.tasks.get(&task_id).map(|t| t.status), Some(TaskStatus::Starting))
        };
        if !still_starting {
            self.limiter.release(permit);
            return;
        }

        let (description, prompt_text, parent_session_id) = {
            let state = self.state.lock().await;
            let Some(task) = state.tasks.get(&task_id) else {
                self.limiter.release(permit);
                return;
            };
            (task.description.clone(), task.prompt.clone(), task.parent_session_id.clone())
        };

        let created = self
            .host
            .create_session(CreateSessionRequest { parent_id: parent_session_id, title: format!("Background: {description}"), directory: None })
            .await;

        let session = match created {
            Ok(session) => session,
            Err(err) => {
                self.limiter.release(permit);
                self.finalize(&task_id, TaskStatus::Failed, TransitionContext { error: Some(format!("failed to create session: {err}")), ..Default::default() }).await;
                return;
            }
        };

        let committed_version = {
            let mut state = self.state.lock().await;
            let Some(task) = state.tasks.get_mut(&task_id) else { return };
            match self.state_machine.transition(task, TaskStatus::Running, TransitionContext::default()) {
                Ok(version) => {
                    task.session_id = Some(session.id.clone());
                    task.started_at = Some(now_iso8601());
                    state.by_session.insert(session.id.clone(), task_id.clone());
                    Some(version)
                }
                Err(_) => None,
            }
        };

        let Some(committed_version) = committed_version else {
            let _ = self.host.delete_session(&session.id, None).await;
            self.limiter.release(permit);
            return;
        };

        self.events.emit(TaskEvent::new(EventKind::Started, &task_id, committed_version));

        let (system_prompt, agent, prompt_parts) = {
            let state = self.state.lock().await;
            let Some(task) = state.tasks.get(&task_id) else { return };
            (effective_system_prompt(task, None), task.agent.clone(), vec![PromptPart { kind: "text".to_owned(), text: prompt_text }])
        };

        let prompt_result = self
            .host
            .send_prompt(PromptRequest {
                session_id: session.id.clone(),
                body: PromptBody {
                    agent,
                    tools: PromptTools { background_task: false, task: false },
                    parts: prompt_parts,
                    system: system_prompt,
                    variant: None,
                    model: Some(model),
                },
                directory: None,
            })
            .await;

        if let Err(err) = prompt_result {
            self.limiter.release(permit);
            self.finalize(&task_id, TaskStatus::Failed, TransitionContext { error: Some(format!("failed to send prompt: {err}")), ..Default::default() }).await;
            return;
        }

        let mut state = self.state.lock().await;
        let still_non_terminal = matches!(state.tasks.get(&task_id).map(|t| t.status.is_terminal()), Some(false));
        if still_non_terminal {
            state.held_permits.insert(task_id, permit);
        } else {
            drop(state);
            self.limiter.release(permit);
        }
    }

    // ---- Idle detection / resolve session ---------------------------------

    /// Dispatch a `session.status` event from the host.
    pub async fn on_session_status(self: &Arc<Self>, event: SessionStatusEvent) {
        let task_id = {
            let state = self.state.lock().await;
            state.by_session.get(&event.properties.session_id).cloned()
        };
        let Some(task_id) = task_id else { return };

        match event.properties.status.kind {
            SessionStatusKind::Idle => self.schedule_idle_debounce(task_id).await,
            SessionStatusKind::Busy => self.cancel_idle_timer(&task_id).await,
            SessionStatusKind::Other => {}
        }
    }

    async fn cancel_idle_timer(&self, task_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(handle) = state.idle_timers.remove(task_id) {
            handle.abort();
        }
    }

    async fn schedule_idle_debounce(self: &Arc<Self>, task_id: String) {
        self.cancel_idle_timer(&task_id).await;
        let manager = Arc::clone(self);
        let debounce = Duration::from_millis(self.config.idle_debounce_ms);
        let id_for_timer = task_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            manager.resolve_task_session(id_for_timer).await;
        });
        let mut state = self.state.lock().await;
        state.idle_timers.insert(task_id, handle);
    }

    async fn resolve_task_session(self: &Arc<Self>, task_id: String) {
        let session_id = {
            let mut state = self.state.lock().await;
            state.idle_timers.remove(&task_id);
            if state.finalizing.contains(&task_id) {
                return;
            }
            match state.tasks.get(&task_id) {
                Some(task) if task.status == TaskStatus::Running => task.session_id.clone(),
                _ => return,
            }
        };
        let Some(session_id) = session_id else { return };

        match self.host.list_messages(&session_id, None).await {
            Ok(messages) => match validate_and_extract(&messages) {
                Ok(result) => {
                    self.finalize(&task_id, TaskStatus::Completed, TransitionContext { result: Some(result), ..Default::default() }).await;
                }
                Err(reason) => {
                    let partial = crate::host::extract_last_assistant_message(&messages);
                    self.finalize(
                        &task_id,
                        TaskStatus::Failed,
                        TransitionContext { error: Some(format!("Validation failed: {reason}")), result: partial, ..Default::default() },
                    )
                    .await;
                }
            },
            Err(err) => {
                self.finalize(&task_id, TaskStatus::Failed, TransitionContext { error: Some(format!("failed to fetch messages: {err}")), ..Default::default() }).await;
            }
        }
    }

    // ---- Finalize -----------------------------------------------------------

    async fn finalize(self: &Arc<Self>, task_id: &str, outcome: TaskStatus, context: TransitionContext) {
        {
            let mut state = self.state.lock().await;
            if state.finalizing.contains(task_id) {
                return;
            }
            match state.tasks.get_mut(task_id) {
                Some(task) if task.status.is_terminal() => {
                    if task.status == TaskStatus::Cancelled && outcome == TaskStatus::Cancelled && task.completed_at.is_none() {
                        task.completed_at = Some(now_iso8601());
                    }
                    return;
                }
                Some(_) => {}
                None => return,
            }
            state.finalizing.insert(task_id.to_owned());
        }

        let (result, truncated) = match context.result {
            Some(raw) => {
                let (result, truncated) = truncate_result(&raw);
                (Some(result), truncated)
            }
            None => (None, false),
        };

        let transitioned = {
            let mut state = self.state.lock().await;
            let Some(task) = state.tasks.get_mut(task_id) else {
                state.finalizing.remove(task_id);
                return;
            };
            let ctx = TransitionContext { result, error: context.error, truncated: Some(truncated) };
            let outcome_result = self.state_machine.transition(task, outcome, ctx);
            if outcome_result.is_ok() {
                task.completed_at = Some(now_iso8601());
            }
            outcome_result.is_ok()
        };

        if !transitioned {
            let mut state = self.state.lock().await;
            state.finalizing.remove(task_id);
            return;
        }

        self.record_completion_duration(task_id).await;

        {
            let mut state = self.state.lock().await;
            if let Some(handle) = state.idle_timers.remove(task_id) {
                handle.abort();
            }
            if let Some(task) = state.tasks.get(task_id) {
                if let Some(session_id) = &task.session_id {
                    state.by_session.remove(session_id);
                }
            }
            state.eviction_queue.push_back(task_id.to_owned());
        }

        self.evict_if_needed().await;

        let snapshot = { self.state.lock().await.tasks.get(task_id).cloned() };
        if let Some(task) = snapshot {
            let saga = self.build_finalization_saga(task);
            let outcome_result = saga.run().await;
            if !outcome_result.succeeded() {
                tracing::warn!(task_id = %task_id, failed_step = ?outcome_result.failed_step, "finalization saga did not complete cleanly");
            }
        }

        {
            let mut state = self.state.lock().await;
            state.pending_retrieval.insert(task_id.to_owned());
        }

        let waiters = {
            let mut state = self.state.lock().await;
            state.waiters.remove(task_id).unwrap_or_default()
        };
        if !waiters.is_empty() {
            let final_task = self.state.lock().await.tasks.get(task_id).cloned();
            if let Some(final_task) = final_task {
                for waiter in waiters {
                    let _ = waiter.send(final_task.clone());
                }
            }
        }

        {
            let mut state = self.state.lock().await;
            if let Some(permit) = state.held_permits.remove(task_id) {
                self.limiter.release(permit);
            }
            state.finalizing.remove(task_id);
        }
    }

    async fn record_completion_duration(&self, task_id: &str) {
        let state = self.state.lock().await;
        let Some(task) = state.tasks.get(task_id) else { return };
        if let (Some(started), Some(completed)) = (&task.started_at, &task.completed_at) {
            if let (Some(started_ms), Some(completed_ms)) = (parse_iso8601_ms(started), parse_iso8601_ms(completed)) {
                self.metrics.record_completion_duration_ms(completed_ms.saturating_sub(started_ms));
            }
        }
    }

    fn build_finalization_saga(self: &Arc<Self>, task: Task) -> Saga {
        let manager_for_notify = Arc::clone(self);
        let task_for_notify = task.clone();
        let parent_session_id = task.parent_session_id.clone();

        let resources = Arc::clone(&self.resources);
        let task_id_for_release = task.id.clone();

        Saga::new()
            .add_step(Box::new(ClosureStep::without_compensation("extract-result", || Box::pin(async { Ok(()) }))))
            .add_step(Box::new(ClosureStep::best_effort("send-notification", move || {
                let manager = Arc::clone(&manager_for_notify);
                let parent_session_id = parent_session_id.clone();
                let task = task_for_notify.clone();
                Box::pin(async move {
                    let notification_state = manager.notifications.notify(&parent_session_id, &task).await;
                    let mut state = manager.state.lock().await;
                    if let Some(stored) = state.tasks.get_mut(&task.id) {
                        stored.notification_state = notification_state;
                    }
                    Ok(())
                })
            })))
            .add_step(Box::new(ClosureStep::without_compensation("release-resources", move || {
                let resources = Arc::clone(&resources);
                let task_id = task_id_for_release.clone();
                Box::pin(async move { resources.cleanup(&task_id, Duration::from_secs(10)).await.map_err(|err| err.to_string()) })
            })))
    }

    // ---- Cancel -------------------------------------------------------------

    /// Cancel a specific task, or every non-terminal task if `task_id` is
    /// `None`. Returns the number of tasks actually cancelled.
    pub async fn cancel(self: &Arc<Self>, task_id: Option<String>) -> usize {
        match task_id {
            Some(id) => usize::from(self.cancel_one(&id).await),
            None => {
                let ids: Vec<String> = { self.state.lock().await.tasks.keys().cloned().collect() };
                let mut count = 0;
                for id in ids {
                    if self.cancel_one(&id).await {
                        count += 1;
                    }
                }
                count
            }
        }
    }

    async fn cancel_one(self: &Arc<Self>, task_id: &str) -> bool {
        self.cancel_idle_timer(task_id).await;

        let transitioned = {
            let mut state = self.state.lock().await;
            let Some(task) = state.tasks.get_mut(task_id) else { return false };
            if task.status.is_terminal() {
                return false;
            }
            self.state_machine.transition(task, TaskStatus::Cancelled, TransitionContext::default()).is_ok()
        };
        if !transitioned {
            return false;
        }

        let session_id = {
            let mut state = self.state.lock().await;
            state.admission_queue.retain(|id| id != task_id);
            state.queue_set.remove(task_id);
            state.tasks.get(task_id).and_then(|t| t.session_id.clone())
        };

        match session_id {
            Some(session_id) => {
                let partial = match self.host.list_messages(&session_id, None).await {
                    Ok(messages) => crate::host::extract_last_assistant_message(&messages),
                    Err(_) => None,
                };
                if let Err(err) = self.host.delete_session(&session_id, None).await {
                    tracing::warn!(task_id = %task_id, %err, "failed to delete session on cancel");
                }
                let result = partial.unwrap_or_else(|| "(Task cancelled - no output)".to_owned());
                self.finalize(task_id, TaskStatus::Cancelled, TransitionContext { result: Some(result), ..Default::default() }).await;
            }
            None => {
                self.finalize(task_id, TaskStatus::Cancelled, TransitionContext::default()).await;
            }
        }

        true
    }

    // ---- Wait-for-completion --------------------------------------------

    pub async fn wait_for_completion(self: &Arc<Self>, task_id: &str, timeout: Duration) -> Option<Task> {
        let timeout = if timeout.is_zero() { Duration::from_secs(30 * 60) } else { timeout };

        let rx = {
            let mut state = self.state.lock().await;
            match state.tasks.get(task_id) {
                Some(task) if task.status.is_terminal() => return Some(task.clone()),
                Some(_) => {}
                None => return None,
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.entry(task_id.to_owned()).or_default().push(tx);
            rx
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(task)) => Some(task),
            _ => self.state.lock().await.tasks.get(task_id).cloned(),
        }
    }

    // ---- Orphan sweep -------------------------------------------------------

    pub fn spawn_orphan_sweep(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let interval = Duration::from_secs(self.config.orphan_sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                manager.orphan_sweep_tick().await;
            }
        });
    }

    async fn orphan_sweep_tick(self: &Arc<Self>) {
        let running_timeout = Duration::from_secs(self.config.running_timeout_secs);
        let now_ms = now_epoch_ms();

        let candidates: Vec<(String, String)> = {
            let state = self.state.lock().await;
            state
                .tasks
                .values()
                .filter(|t| matches!(t.status, TaskStatus::Running | TaskStatus::Starting) && !state.finalizing.contains(&t.id))
                .map(|t| (t.id.clone(), t.parent_session_id.clone()))
                .collect()
        };

        for (task_id, parent_session_id) in candidates {
            if !self.host.session_exists(&parent_session_id).await {
                let partial = self.best_effort_partial_result(&task_id).await;
                self.finalize(
                    &task_id,
                    TaskStatus::Failed,
                    TransitionContext { error: Some("Parent session was deleted while task was running".to_owned()), result: partial, ..Default::default() },
                )
                .await;
                continue;
            }

            let started_ms = { self.state.lock().await.tasks.get(&task_id).and_then(|t| t.started_at.as_deref().and_then(parse_iso8601_ms)) };
            if let Some(started_ms) = started_ms {
                if now_ms.saturating_sub(started_ms) > running_timeout.as_millis() as u64 {
                    self.finalize(&task_id, TaskStatus::Failed, TransitionContext { error: Some("Task exceeded maximum running time".to_owned()), ..Default::default() }).await;
                }
            }
        }
    }

    async fn best_effort_partial_result(&self, task_id: &str) -> Option<String> {
        let session_id = { self.state.lock().await.tasks.get(task_id).and_then(|t| t.session_id.clone()) };
        let session_id = session_id?;
        self.host.list_messages(&session_id, None).await.ok().as_deref().and_then(crate::host::extract_last_assistant_message)
    }

    // ---- Eviction ----------------------------------------------------------

    async fn evict_if_needed(self: &Arc<Self>) {
        let max = self.config.max_completed_tasks;
        loop {
            let victim = {
                let mut state = self.state.lock().await;
                if state.eviction_queue.len() <= max {
                    None
                } else {
                    state.eviction_queue.pop_front()
                }
            };
            let Some(victim_id) = victim else { break };

            let session_id = {
                let mut state = self.state.lock().await;
                state.pending_retrieval.remove(&victim_id);
                if let Some(task) = state.tasks.get_mut(&victim_id) {
                    task.result = None;
                    task.error = None;
                }
                let session_id = state.tasks.get(&victim_id).and_then(|t| t.session_id.clone());
                if let Some(session_id) = &session_id {
                    state.by_session.remove(session_id);
                }
                state.tasks.remove(&victim_id);
                for tasks in state.by_parent.values_mut() {
                    tasks.remove(&victim_id);
                }
                session_id
            };

            if let Some(session_id) = session_id {
                if self.host.session_exists(&session_id).await {
                    let manager = Arc::clone(self);
                    tokio::spawn(async move {
                        let _ = manager.host.delete_session(&session_id, None).await;
                    });
                }
            }
        }
    }

    // ---- Pending-retrieval bookkeeping & retrieve --------------------------

    pub async fn mark_pending_retrieval(&self, task_id: &str) {
        self.state.lock().await.pending_retrieval.insert(task_id.to_owned());
    }

    /// Return the terminal task with `task_id`, clearing its
    /// pending-retrieval mark. Errors on a malformed id, an unknown task, or
    /// a task that has not yet reached a terminal status.
    pub async fn retrieve(&self, task_id: &str) -> Result<Task, ManagerError> {
        if !is_valid_task_id(task_id) {
            return Err(ManagerError::InvalidTaskId(task_id.to_owned()));
        }
        let mut state = self.state.lock().await;
        let task = state.tasks.get(task_id).ok_or_else(|| ManagerError::UnknownTask(task_id.to_owned()))?;
        if !task.status.is_terminal() {
            return Err(ManagerError::NonTerminalTask(task_id.to_owned()));
        }
        let task = task.clone();
        state.pending_retrieval.remove(task_id);
        Ok(task)
    }

    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        self.state.lock().await.tasks.get(task_id).cloned()
    }

    // ---- System-prompt injection --------------------------------------------

    /// Append the `<BackgroundTasks>` block (running + pending-retrieval
    /// tasks under `parent_session_id`) to `system`, if there is anything to
    /// report.
    pub async fn inject_background_tasks_block(&self, parent_session_id: &str, system: &mut Vec<String>) {
        let state = self.state.lock().await;
        let Some(task_ids) = state.by_parent.get(parent_session_id) else { return };
        let entries: Vec<(String, String)> = task_ids
            .iter()
            .filter_map(|id| state.tasks.get(id))
            .filter(|t| matches!(t.status, TaskStatus::Running | TaskStatus::Starting) || state.pending_retrieval.contains(&t.id))
            .map(|t| (t.id.clone(), t.description.clone()))
            .collect();
        let refs: Vec<(&str, &str)> = entries.iter().map(|(id, description)| (id.as_str(), description.as_str())).collect();
        append_background_tasks_block(system, refs.into_iter());
    }

    // ---- Graceful shutdown ---------------------------------------------------

    pub async fn pause(&self) {
        self.state.lock().await.paused = true;
    }

    pub async fn resume(&self) {
        self.state.lock().await.paused = false;
    }

    pub async fn is_paused(&self) -> bool {
        self.state.lock().await.paused
    }

    /// Poll `running ∪ starting` once a second until empty, or fail once
    /// `timeout` has elapsed.
    pub async fn drain(&self, timeout: Duration) -> Result<(), ManagerError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let still_active = {
                let state = self.state.lock().await;
                state.tasks.values().any(|t| matches!(t.status, TaskStatus::Running | TaskStatus::Starting))
            };
            if !still_active {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ManagerError::HostTransport(anyhow::anyhow!("drain timed out with tasks still running")));
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    pub async fn save_state(&self) -> Result<(), ManagerError> {
        let tasks: Vec<Task> = { self.state.lock().await.tasks.values().cloned().collect() };
        self.persistence.save(&tasks).await?;
        Ok(())
    }

    /// Reload the task table from disk, rebuilding every index. Intended for
    /// process startup, before the admission queue or orphan sweep have been
    /// started.
    pub async fn load_state(&self) -> Result<(), ManagerError> {
        let tasks = self.persistence.load().await?;
        let mut state = self.state.lock().await;
        state.tasks.clear();
        state.by_session.clear();
        state.by_parent.clear();
        state.admission_queue.clear();
        state.queue_set.clear();
        state.eviction_queue.clear();

        for mut task in tasks {
            task.config = Some(Arc::clone(&self.config));
            if let Some(session_id) = &task.session_id {
                state.by_session.insert(session_id.clone(), task.id.clone());
            }
            state.by_parent.entry(task.parent_session_id.clone()).or_default().insert(task.id.clone());
            if task.status == TaskStatus::Pending {
                state.admission_queue.push_back(task.id.clone());
                state.queue_set.insert(task.id.clone());
            }
            if task.status.is_terminal() {
                state.eviction_queue.push_back(task.id.clone());
            }
            state.tasks.insert(task.id.clone(), task);
        }
        Ok(())
    }

    // ---- Health snapshot -----------------------------------------------------

    pub async fn health(&self) -> HealthSnapshot {
        let state = self.state.lock().await;
        let models: HashSet<String> = state.tasks.values().map(|t| t.model.clone()).collect();
        let active_permits_by_model = models.into_iter().map(|model| { let count = self.limiter.active_count(&model); (model, count) }).collect();

        HealthSnapshot {
            counts_by_status: counts_by_status(state.tasks.values()),
            oldest_non_terminal_age_ms: oldest_non_terminal_age_ms(state.tasks.values(), now_epoch_ms(), parse_iso8601_ms),
            notification_breaker_open: self.notifications.is_breaker_open(),
            admission_queue_depth: state.admission_queue.len(),
            active_permits_by_model,
        }
    }
}

/// Require at least one assistant message with non-whitespace text content,
/// then extract it.
fn validate_and_extract(messages: &[crate::host::SessionMessage]) -> Result<String, String> {
    let last_assistant = messages.iter().rev().find(|m| m.info.role == "assistant").ok_or_else(|| "no assistant message found".to_owned())?;
    let has_content = last_assistant
        .parts
        .iter()
        .any(|part| matches!(part.kind.as_str(), "text" | "reasoning") && part.text.as_deref().map(|t| !t.trim().is_empty()).unwrap_or(false));
    if !has_content {
        return Err("assistant message had no non-whitespace content".to_owned());
    }
    Ok(crate::host::extract_last_assistant_message(messages).unwrap_or_else(|| "(No output)".to_owned()))
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
