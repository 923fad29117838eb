//! Server-side jobs followed by a poll loop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use view_parser::ViewCountParser;

use super::{TaskOutcome, finalize};
use crate::client::{CreateJobRequest, Job, JobClient, JobTask, RemoteTaskStatus, TaskTarget};
use crate::domain::{RequiredInput, ScrapeTask, Session, TaskStatus};
use crate::persister::ReportPersister;
use crate::tracker::SessionTracker;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct PollingExecutorConfig {
    /// Delay between two job polls.
    pub poll_interval: Duration,
}

impl Default for PollingExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5000),
        }
    }
}

/// Last known state of one remote task.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedTask {
    pub job_id: String,
    pub task: JobTask,
}

/// `collaboration id -> remote task` cache fed by the poll loop.
///
/// Statuses only move forward along `pending -> processing -> terminal`.
/// Stale responses are ignored; [`TaskStatusCache::reset`] is the only way
/// back to `pending`.
#[derive(Debug, Default)]
pub struct TaskStatusCache {
    entries: HashMap<String, CachedTask>,
}

impl TaskStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, collaboration_id: &str) -> Option<&CachedTask> {
        self.entries.get(collaboration_id)
    }

    pub fn status(&self, collaboration_id: &str) -> Option<RemoteTaskStatus> {
        self.entries.get(collaboration_id).map(|c| c.task.status)
    }

    /// Apply every job fetched in one tick. Returns the collaboration ids
    /// whose entry changed.
    pub fn apply_tick(&mut self, jobs: Vec<(String, Job)>) -> Vec<String> {
        let mut changed = Vec::new();

        for (job_id, job) in jobs {
            for task in job.tasks {
                let collaboration_id = task.metadata.collaboration_id.clone();
                if collaboration_id.is_empty() {
                    warn!(job_id = %job_id, task_id = %task.id, "Remote task has no collaboration id");
                    continue;
                }

                let replace = match self.entries.get(&collaboration_id) {
                    Some(current) => Self::is_newer(current, &job_id, &task),
                    None => true,
                };
                if !replace {
                    continue;
                }

                self.entries.insert(
                    collaboration_id.clone(),
                    CachedTask {
                        job_id: job_id.clone(),
                        task,
                    },
                );
                changed.push(collaboration_id);
            }
        }

        changed
    }

    fn is_newer(current: &CachedTask, job_id: &str, incoming: &JobTask) -> bool {
        let (old, new) = (current.task.status, incoming.status);
        if new.rank() < old.rank() {
            debug!(
                task_id = %incoming.id,
                "Ignoring stale status {} (cached {})", new, old
            );
            return false;
        }
        if !old.is_active() && new != old {
            return false;
        }
        current.job_id != job_id || &current.task != incoming
    }

    /// Number of cached tasks in `job_ids` the backend is still working on.
    pub fn active_tasks(&self, job_ids: &[String]) -> usize {
        self.entries
            .values()
            .filter(|c| job_ids.contains(&c.job_id) && c.task.status.is_active())
            .count()
    }

    /// Find a cached entry by remote task id.
    pub fn find_remote(&self, remote_task_id: &str) -> Option<(&str, &CachedTask)> {
        self.entries
            .iter()
            .find(|(_, c)| c.task.id == remote_task_id)
            .map(|(collab, c)| (collab.as_str(), c))
    }

    /// Put a rerun task back to `pending`.
    pub fn reset(&mut self, remote_task_id: &str) -> bool {
        match self
            .entries
            .values_mut()
            .find(|c| c.task.id == remote_task_id)
        {
            Some(cached) => {
                cached.task.status = RemoteTaskStatus::Pending;
                cached.task.result = None;
                cached.task.error_message = None;
                true
            }
            None => false,
        }
    }
}

struct Poller {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Submits sessions as server-side jobs and follows them with a single poll
/// loop.
///
/// At most one poll loop is alive per executor. Starting a new one first
/// tears down the previous loop, and dropping the executor aborts it.
pub struct PollingExecutor {
    jobs: Arc<dyn JobClient>,
    persister: Option<ReportPersister>,
    parser: ViewCountParser,
    config: PollingExecutorConfig,
    cache: Arc<RwLock<TaskStatusCache>>,
    poller: Mutex<Option<Poller>>,
}

impl PollingExecutor {
    pub fn new(jobs: Arc<dyn JobClient>, config: PollingExecutorConfig) -> Self {
        Self {
            jobs,
            persister: None,
            parser: ViewCountParser::default(),
            config,
            cache: Arc::new(RwLock::new(TaskStatusCache::new())),
            poller: Mutex::new(None),
        }
    }

    pub fn with_persister(mut self, persister: ReportPersister) -> Self {
        self.persister = Some(persister);
        self
    }

    pub fn with_parser(mut self, parser: ViewCountParser) -> Self {
        self.parser = parser;
        self
    }

    /// Last known remote state of a collaboration.
    pub fn cached(&self, collaboration_id: &str) -> Option<CachedTask> {
        self.cache.read().get(collaboration_id).cloned()
    }

    /// Whether a poll loop is currently alive.
    pub fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .as_ref()
            .is_some_and(|p| !p.handle.is_finished())
    }

    /// Create one job per workflow for the pending tasks of the session.
    ///
    /// Tasks of a job that could not be created are marked failed. Returns the
    /// ids of the jobs that were accepted.
    pub async fn submit_jobs(&self, tracker: &SessionTracker) -> Vec<String> {
        self.cache.write().clear();
        let session = tracker.snapshot();

        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        for (index, task) in session.tasks.iter().enumerate() {
            if task.status != TaskStatus::Pending {
                continue;
            }
            let Some(workflow_id) = task.workflow_id.as_deref() else {
                continue;
            };
            match groups.iter_mut().find(|(id, _)| id == workflow_id) {
                Some((_, indices)) => indices.push(index),
                None => groups.push((workflow_id.to_string(), vec![index])),
            }
        }

        let mut job_ids = Vec::with_capacity(groups.len());
        for (workflow_id, indices) in groups {
            let request = CreateJobRequest {
                project_id: session.project_id.clone(),
                workflow_id: workflow_id.clone(),
                targets: indices
                    .iter()
                    .map(|&i| target_for(&session.tasks[i], session.report_date))
                    .collect(),
            };

            match self.jobs.create_job(&request).await {
                Ok(job_id) => {
                    info!(
                        session_id = %tracker.session_id(),
                        job_id = %job_id,
                        workflow_id = %workflow_id,
                        "Submitted job with {} tasks",
                        indices.len()
                    );
                    tracker.update_tasks(|session| {
                        for &i in &indices {
                            session.tasks[i].job_id = Some(job_id.clone());
                        }
                        indices.clone()
                    });
                    job_ids.push(job_id);
                }
                Err(e) => {
                    error!(
                        session_id = %tracker.session_id(),
                        workflow_id = %workflow_id,
                        "Failed to submit job: {}", e
                    );
                    tracker.update_tasks(|session| {
                        indices
                            .iter()
                            .copied()
                            .filter(|&i| {
                                let task = &mut session.tasks[i];
                                task.mark_running().is_ok()
                                    && TaskOutcome::from_error(&e).apply(task).is_ok()
                            })
                            .collect()
                    });
                }
            }
        }

        tracker.set_job_ids(job_ids.clone());
        job_ids
    }

    /// Start polling `job_ids`, replacing any running poll loop.
    ///
    /// The loop stops on its own once no polled task is pending or
    /// processing, and finishes the session. Cancelling `session_cancel`
    /// stops it and finishes the session as cancelled.
    pub async fn start_polling(
        &self,
        job_ids: Vec<String>,
        tracker: Arc<SessionTracker>,
        session_cancel: &CancellationToken,
    ) {
        self.stop_polling().await;

        let token = session_cancel.child_token();
        let poll = PollLoop {
            jobs: self.jobs.clone(),
            cache: self.cache.clone(),
            tracker,
            persister: self.persister.clone(),
            parser: self.parser.clone(),
            interval: self.config.poll_interval,
            job_ids,
            token: token.clone(),
            session_cancel: session_cancel.clone(),
        };
        let handle = tokio::spawn(poll.run());

        if let Some(previous) = self.poller.lock().replace(Poller { token, handle }) {
            previous.token.cancel();
            previous.handle.abort();
        }
    }

    /// Persist and finish a session that has nothing left to poll.
    pub async fn complete(&self, tracker: &SessionTracker, cancelled: bool) -> Session {
        finalize(tracker, self.persister.as_ref(), cancelled).await
    }

    /// Stop observing without touching the session. Remote jobs keep running.
    pub async fn stop_polling(&self) {
        let poller = self.poller.lock().take();
        if let Some(poller) = poller {
            poller.token.cancel();
            if let Err(e) = poller.handle.await
                && !e.is_cancelled()
            {
                warn!("Poll loop ended abnormally: {}", e);
            }
        }
    }

    /// Rerun failed remote tasks in place and resume polling their jobs.
    ///
    /// No new job is created. Returns the job ids now being polled.
    pub async fn rerun(
        &self,
        remote_task_ids: &[String],
        tracker: Arc<SessionTracker>,
        session_cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let targets = {
            let cache = self.cache.read();
            remote_task_ids
                .iter()
                .map(|id| {
                    cache
                        .find_remote(id)
                        .map(|(collab, cached)| RerunEntry {
                            remote_task_id: id.clone(),
                            job_id: cached.job_id.clone(),
                            collaboration_id: collab.to_string(),
                        })
                        .ok_or_else(|| Error::not_found("Remote task", id.clone()))
                })
                .collect::<Result<Vec<_>>>()?
        };

        let mut accepted = Vec::with_capacity(targets.len());
        let mut last_error = None;
        for target in targets {
            match self.jobs.rerun_task(&target.remote_task_id).await {
                Ok(()) => accepted.push(target),
                Err(e) => {
                    warn!(
                        task_id = %target.remote_task_id,
                        "Failed to rerun remote task: {}", e
                    );
                    last_error = Some(e);
                }
            }
        }
        if accepted.is_empty() {
            return Err(last_error.unwrap_or_else(|| Error::validation("no tasks to rerun")));
        }

        self.stop_polling().await;

        {
            let mut cache = self.cache.write();
            for target in &accepted {
                cache.reset(&target.remote_task_id);
            }
        }
        tracker.update_tasks(|session| {
            accepted
                .iter()
                .filter_map(|target| {
                    let index = session.position_of(&target.collaboration_id)?;
                    session.tasks[index].reset_for_rerun().ok().map(|_| index)
                })
                .collect()
        });
        tracker.resume();

        let mut job_ids: Vec<String> = Vec::new();
        for target in &accepted {
            if !job_ids.contains(&target.job_id) {
                job_ids.push(target.job_id.clone());
            }
        }
        {
            let cache = self.cache.read();
            for job_id in tracker.snapshot().job_ids {
                if !job_ids.contains(&job_id) && cache.active_tasks(std::slice::from_ref(&job_id)) > 0 {
                    job_ids.push(job_id);
                }
            }
        }

        info!(
            session_id = %tracker.session_id(),
            "Rerunning {} remote tasks, polling {} jobs",
            accepted.len(),
            job_ids.len()
        );
        self.start_polling(job_ids.clone(), tracker, session_cancel)
            .await;
        Ok(job_ids)
    }
}

impl Drop for PollingExecutor {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.get_mut().take() {
            poller.token.cancel();
            poller.handle.abort();
        }
    }
}

struct RerunEntry {
    remote_task_id: String,
    job_id: String,
    collaboration_id: String,
}

fn target_for(task: &ScrapeTask, report_date: NaiveDate) -> TaskTarget {
    let (video_id, task_id) = match task.required_input {
        Some(RequiredInput::VideoId) => (task.input_value.clone(), None),
        _ => (None, task.input_value.clone()),
    };
    TaskTarget {
        collaboration_id: task.collaboration_id.clone(),
        nickname: task.talent_name.clone(),
        report_date,
        video_id,
        task_id,
    }
}

/// Bring a session task in line with its cached remote state.
fn sync_task(task: &mut ScrapeTask, cached: &CachedTask, parser: &ViewCountParser) -> bool {
    if task.status == TaskStatus::Skipped {
        return false;
    }

    let mut changed = false;
    if task.remote_task_id.as_deref() != Some(cached.task.id.as_str()) {
        task.remote_task_id = Some(cached.task.id.clone());
        changed = true;
    }
    if task.job_id.as_deref() != Some(cached.job_id.as_str()) {
        task.job_id = Some(cached.job_id.clone());
        changed = true;
    }

    match cached.task.status {
        RemoteTaskStatus::Pending => {}
        RemoteTaskStatus::Processing => {
            if task.status == TaskStatus::Pending && task.mark_running().is_ok() {
                changed = true;
            }
        }
        status @ (RemoteTaskStatus::Completed | RemoteTaskStatus::Failed) => {
            if task.status == TaskStatus::Pending && task.mark_running().is_ok() {
                changed = true;
            }
            if task.status == TaskStatus::Running {
                let outcome = if status == RemoteTaskStatus::Completed {
                    TaskOutcome::from_result(parser, cached.task.result.clone())
                } else {
                    TaskOutcome::failure(
                        cached.task.error_message.clone(),
                        cached.task.result.clone(),
                    )
                };
                if outcome.apply(task).is_ok() {
                    changed = true;
                }
            }
        }
    }

    changed
}

struct PollLoop {
    jobs: Arc<dyn JobClient>,
    cache: Arc<RwLock<TaskStatusCache>>,
    tracker: Arc<SessionTracker>,
    persister: Option<ReportPersister>,
    parser: ViewCountParser,
    interval: Duration,
    job_ids: Vec<String>,
    token: CancellationToken,
    session_cancel: CancellationToken,
}

impl PollLoop {
    async fn run(self) {
        debug!(
            session_id = %self.tracker.session_id(),
            jobs = ?self.job_ids,
            "Poll loop started"
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut seen: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                fetched = self.fetch() => fetched,
            };
            seen.extend(fetched.iter().map(|(id, _)| id.clone()));

            if self.apply(fetched, &seen) {
                info!(session_id = %self.tracker.session_id(), "All polled tasks finished");
                finalize(&self.tracker, self.persister.as_ref(), false).await;
                return;
            }
        }

        if self.session_cancel.is_cancelled() {
            info!(session_id = %self.tracker.session_id(), "Polling cancelled");
            finalize(&self.tracker, self.persister.as_ref(), true).await;
        } else {
            debug!(session_id = %self.tracker.session_id(), "Poll loop superseded");
        }
    }

    async fn fetch(&self) -> Vec<(String, Job)> {
        let results = join_all(self.job_ids.iter().map(|id| self.jobs.get_job(id))).await;

        self.job_ids
            .iter()
            .zip(results)
            .filter_map(|(job_id, result)| match result {
                Ok(job) => Some((job_id.clone(), job)),
                Err(e) => {
                    warn!(job_id = %job_id, "Failed to poll job: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Apply one tick to the cache and the session. Returns whether every
    /// polled job has been seen and none of its tasks is left unfinished,
    /// counting tasks the backend has not listed yet.
    fn apply(&self, fetched: Vec<(String, Job)>, seen: &HashSet<String>) -> bool {
        let (changed, active) = {
            let mut cache = self.cache.write();
            let changed: Vec<CachedTask> = cache
                .apply_tick(fetched)
                .iter()
                .filter_map(|collab| cache.get(collab).cloned())
                .collect();
            (changed, cache.active_tasks(&self.job_ids))
        };

        if !changed.is_empty() {
            let parser = &self.parser;
            self.tracker.update_tasks(|session| {
                changed
                    .iter()
                    .filter_map(|cached| {
                        let index = session.position_of(&cached.task.metadata.collaboration_id)?;
                        sync_task(&mut session.tasks[index], cached, parser).then_some(index)
                    })
                    .collect()
            });
        }

        let active = active.max(self.tracker.unfinished_in_jobs(&self.job_ids));
        let all_done = active == 0 && self.job_ids.iter().all(|id| seen.contains(id));
        self.tracker.publish_tick(&self.job_ids, active, all_done);
        all_done
    }
}
