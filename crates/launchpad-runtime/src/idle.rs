use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use anyhow::{anyhow, bail, Context, Result};

use crate::host::HostDocument;
use crate::transaction::with_transaction;

const IDLE_THREAD_NAME: &str = "launchpad-idle";

pub type IdleWork = Box<dyn FnOnce(&mut IdleScope<'_>) -> Result<()> + Send>;
pub type CompletionCallback = Box<dyn FnOnce(TaskOutcome) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "idle-task-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Scheduled,
    Completed,
    Faulted,
}

#[derive(Debug)]
pub struct TaskOutcome {
    pub id: TaskId,
    pub result: Result<()>,
}

impl TaskOutcome {
    pub fn state(&self) -> TaskState {
        if self.result.is_ok() {
            TaskState::Completed
        } else {
            TaskState::Faulted
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStatus {
    Keep,
    Unsubscribe,
}

/// Callback run on every idle event until it unsubscribes.
pub trait IdleHook: Send {
    fn on_idle(&mut self, scope: &mut IdleScope<'_>) -> HookStatus;
}

impl<F> IdleHook for F
where
    F: FnMut(&mut IdleScope<'_>) -> HookStatus + Send,
{
    fn on_idle(&mut self, scope: &mut IdleScope<'_>) -> HookStatus {
        self(scope)
    }
}

/// Access to host state granted to work running in the idle context.
pub struct IdleScope<'a> {
    document: &'a mut dyn HostDocument,
}

impl IdleScope<'_> {
    pub fn document(&mut self) -> &mut dyn HostDocument {
        &mut *self.document
    }

    pub fn transaction<T, F>(&mut self, name: &str, run: F) -> Result<T>
    where
        F: FnOnce(&mut dyn HostDocument) -> Result<T>,
    {
        with_transaction(&mut *self.document, name, run)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdlePassReport {
    pub tasks: Vec<(TaskId, TaskState)>,
    pub hooks_run: usize,
    pub hooks_removed: usize,
}

struct DeferredTask {
    id: TaskId,
    state: TaskState,
    work: Option<IdleWork>,
    on_complete: Option<CompletionCallback>,
}

impl DeferredTask {
    // The submitter already learned the task was refused; nothing to report.
    fn disarm(&mut self) {
        self.work = None;
        self.on_complete = None;
    }
}

impl Drop for DeferredTask {
    // A task dropped before it ran is faulted, never lost silently.
    fn drop(&mut self) {
        if self.work.take().is_none() {
            return;
        }
        let id = self.id;
        let Some(callback) = self.on_complete.take() else {
            tracing::warn!(task = %id, "idle task discarded before the host went idle");
            return;
        };
        let outcome = TaskOutcome {
            id,
            result: Err(anyhow!("idle context stopped before {id} ran")),
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(outcome))) {
            tracing::error!(
                task = %id,
                panic = %panic_message(payload.as_ref()),
                "idle task completion callback panicked"
            );
        }
    }
}

enum IdleMessage {
    Submit(DeferredTask),
    RegisterHook(Box<dyn IdleHook>),
    Idle(Option<Sender<IdlePassReport>>),
    Shutdown,
}

/// Submission side of the idle context. Cheap to clone.
#[derive(Clone)]
pub struct IdleHandle {
    sender: Sender<IdleMessage>,
    next_id: Arc<AtomicU64>,
    accepting: Arc<AtomicBool>,
    idle_thread: ThreadId,
}

impl IdleHandle {
    pub fn submit<W>(&self, work: W) -> Result<TaskId>
    where
        W: FnOnce(&mut IdleScope<'_>) -> Result<()> + Send + 'static,
    {
        self.enqueue(Box::new(work), None)
    }

    pub fn submit_with_completion<W, C>(&self, work: W, on_complete: C) -> Result<TaskId>
    where
        W: FnOnce(&mut IdleScope<'_>) -> Result<()> + Send + 'static,
        C: FnOnce(TaskOutcome) + Send + 'static,
    {
        self.enqueue(Box::new(work), Some(Box::new(on_complete)))
    }

    fn enqueue(&self, work: IdleWork, on_complete: Option<CompletionCallback>) -> Result<TaskId> {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.send(IdleMessage::Submit(DeferredTask {
            id,
            state: TaskState::Pending,
            work: Some(work),
            on_complete,
        }))?;
        tracing::trace!(task = %id, "queued idle task");
        Ok(id)
    }

    pub fn register_idle_hook<H>(&self, hook: H) -> Result<()>
    where
        H: IdleHook + 'static,
    {
        self.send(IdleMessage::RegisterHook(Box::new(hook)))
    }

    /// Signals that the host is idle without waiting for the pass to finish.
    pub fn notify_idle(&self) -> Result<()> {
        self.send(IdleMessage::Idle(None))
    }

    /// Signals that the host is idle and blocks until queued work and hooks
    /// have run. Must not be called from the idle context itself.
    pub fn notify_idle_and_wait(&self) -> Result<IdlePassReport> {
        if thread::current().id() == self.idle_thread {
            bail!("cannot wait for an idle pass from inside the idle context");
        }
        let (reply, report) = mpsc::channel();
        self.send(IdleMessage::Idle(Some(reply)))?;
        report
            .recv()
            .context("idle context stopped before finishing the idle pass")
    }

    pub fn idle_thread_id(&self) -> ThreadId {
        self.idle_thread
    }

    fn send(&self, message: IdleMessage) -> Result<()> {
        if !self.accepting.load(Ordering::SeqCst) {
            refuse(message);
            bail!("idle context is shutting down");
        }
        self.sender.send(message).map_err(|mpsc::SendError(message)| {
            refuse(message);
            anyhow!("idle context is no longer running")
        })
    }
}

fn refuse(message: IdleMessage) {
    if let IdleMessage::Submit(mut task) = message {
        task.disarm();
    }
}

/// Owns the idle context thread and the host document it works on.
pub struct IdleScheduler {
    handle: IdleHandle,
    thread: Option<JoinHandle<()>>,
}

impl IdleScheduler {
    pub fn spawn<D>(document: D) -> Result<Self>
    where
        D: HostDocument + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let document: Box<dyn HostDocument + Send> = Box::new(document);
        let thread = thread::Builder::new()
            .name(IDLE_THREAD_NAME.to_string())
            .spawn(move || run_idle_loop(document, receiver))
            .context("failed to start idle context thread")?;

        let handle = IdleHandle {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
            accepting: Arc::new(AtomicBool::new(true)),
            idle_thread: thread.thread().id(),
        };
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> IdleHandle {
        self.handle.clone()
    }

    /// Stops the idle context without another idle pass. Tasks still queued
    /// never run; each is faulted through its completion callback. Registered
    /// hooks are dropped unrun, and later submissions fail.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.handle.accepting.store(false, Ordering::SeqCst);
        // A failed send means the loop has already exited.
        let _ = self.handle.sender.send(IdleMessage::Shutdown);
        thread.join().map_err(|payload| {
            anyhow!("idle context panicked: {}", panic_message(payload.as_ref()))
        })
    }
}

impl Drop for IdleScheduler {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::error!(error = %format!("{err:#}"), "idle context did not stop cleanly");
        }
    }
}

fn run_idle_loop(mut document: Box<dyn HostDocument + Send>, receiver: Receiver<IdleMessage>) {
    let mut pending: VecDeque<DeferredTask> = VecDeque::new();
    let mut hooks: Vec<Box<dyn IdleHook>> = Vec::new();

    for message in receiver.iter() {
        match message {
            IdleMessage::Submit(task) => pending.push_back(task),
            IdleMessage::RegisterHook(hook) => hooks.push(hook),
            IdleMessage::Idle(reply) => {
                let report = run_idle_pass(document.as_mut(), &mut pending, &mut hooks);
                if let Some(reply) = reply {
                    let _ = reply.send(report);
                }
            }
            IdleMessage::Shutdown => break,
        }
    }

    // The host never declared idle again, so nothing queued may touch it now.
    pending.extend(receiver.try_iter().filter_map(|message| match message {
        IdleMessage::Submit(task) => Some(task),
        _ => None,
    }));
    if !pending.is_empty() || !hooks.is_empty() {
        tracing::warn!(
            tasks = pending.len(),
            hooks = hooks.len(),
            "idle context stopped with work that never saw an idle event"
        );
    }
    drop(pending);
    drop(hooks);
    tracing::debug!("idle context stopped");
}

fn run_idle_pass(
    document: &mut dyn HostDocument,
    pending: &mut VecDeque<DeferredTask>,
    hooks: &mut Vec<Box<dyn IdleHook>>,
) -> IdlePassReport {
    let mut report = IdlePassReport::default();

    while let Some(task) = pending.pop_front() {
        let id = task.id;
        let state = run_task(&mut *document, task);
        report.tasks.push((id, state));
    }

    let mut retained = Vec::with_capacity(hooks.len());
    for mut hook in hooks.drain(..) {
        report.hooks_run += 1;
        let mut scope = IdleScope {
            document: &mut *document,
        };
        let status = panic::catch_unwind(AssertUnwindSafe(|| hook.on_idle(&mut scope)))
            .unwrap_or_else(|payload| {
                tracing::error!(
                    panic = %panic_message(payload.as_ref()),
                    "idle hook panicked; unsubscribing it"
                );
                HookStatus::Unsubscribe
            });
        match status {
            HookStatus::Keep => retained.push(hook),
            HookStatus::Unsubscribe => report.hooks_removed += 1,
        }
    }
    *hooks = retained;

    report
}

fn run_task(document: &mut dyn HostDocument, mut task: DeferredTask) -> TaskState {
    debug_assert_eq!(task.state, TaskState::Pending);
    task.state = TaskState::Scheduled;
    let id = task.id;
    tracing::trace!(task = %id, state = ?task.state, "running idle task");
    let on_complete = task.on_complete.take();
    let Some(work) = task.work.take() else {
        return TaskState::Faulted;
    };

    let mut scope = IdleScope { document };
    let result = match panic::catch_unwind(AssertUnwindSafe(|| work(&mut scope))) {
        Ok(result) => result,
        Err(payload) => Err(anyhow!(
            "idle task panicked: {}",
            panic_message(payload.as_ref())
        )),
    };

    let outcome = TaskOutcome { id, result };
    let state = outcome.state();
    match on_complete {
        Some(callback) => {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(outcome))) {
                tracing::error!(
                    task = %id,
                    panic = %panic_message(payload.as_ref()),
                    "idle task completion callback panicked"
                );
            }
        }
        None => {
            if let Err(err) = &outcome.result {
                tracing::error!(task = %id, error = %format!("{err:#}"), "idle task faulted");
            }
        }
    }
    state
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
