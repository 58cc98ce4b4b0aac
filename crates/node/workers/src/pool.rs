//! The [`WorkerPool`] and the actor behind it.

use crate::{ParentMessage, PoolEvent, Spawner, TaskFailure, WorkerError, WorkerMessage, log};
use futures::future::join_all;
use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
    time::Duration,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

/// How long [`WorkerPool::end`] waits for workers to stop before killing them.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(1);

const EVENT_CAPACITY: usize = 1024;

type Reply<Resp> = oneshot::Sender<Result<Resp, WorkerError>>;

/// A snapshot of the pool's workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatus {
    /// Workers that have not exited.
    pub live: usize,
    /// Workers that announced readiness.
    pub ready: usize,
    /// Workers with a task in flight.
    pub busy: usize,
}

enum Command<Req, Resp> {
    Schedule { request: Req, target: Option<usize>, reply: Reply<Resp> },
    Workers { reply: oneshot::Sender<Vec<usize>> },
    End { reply: oneshot::Sender<()> },
}

/// A fixed set of workers running one task at a time each.
///
/// Tasks go to the next idle worker or wait in a queue until one frees up, so the number of
/// tasks in flight never exceeds the number of workers. A worker that exits fails its task with
/// [`WorkerError::Exited`] and leaves the pool for good.
pub struct WorkerPool<Req, Resp> {
    commands: mpsc::UnboundedSender<Command<Req, Resp>>,
    status: watch::Receiver<PoolStatus>,
    events: broadcast::Sender<PoolEvent>,
    size: usize,
}

impl<Req, Resp> Clone for WorkerPool<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            status: self.status.clone(),
            events: self.events.clone(),
            size: self.size,
        }
    }
}

impl<Req, Resp> fmt::Debug for WorkerPool<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

impl<Req, Resp> WorkerPool<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Starts `size` workers with the [`DEFAULT_GRACE`] shutdown timeout.
    pub fn spawn<S>(spawner: &S, size: usize) -> Result<Self, WorkerError>
    where
        S: Spawner<Request = Req, Response = Resp>,
    {
        Self::spawn_with_grace(spawner, size, DEFAULT_GRACE)
    }

    /// Starts `size` workers. [`WorkerPool::end`] kills workers still running after `grace`.
    pub fn spawn_with_grace<S>(spawner: &S, size: usize, grace: Duration) -> Result<Self, WorkerError>
    where
        S: Spawner<Request = Req, Response = Resp>,
    {
        let (messages_tx, messages) = mpsc::unbounded_channel();
        let mut slots = BTreeMap::new();
        for id in 0..size {
            let link = match spawner.spawn(id) {
                Ok(link) => link,
                Err(err) => {
                    slots.values().for_each(|slot: &Slot<Req, Resp>| slot.kill.cancel());
                    return Err(err);
                }
            };
            let mut inbound = link.inbound;
            let forward = messages_tx.clone();
            tokio::spawn(async move {
                while let Some(message) = inbound.recv().await {
                    if forward.send((id, Some(message))).is_err() {
                        return;
                    }
                }
                let _ = forward.send((id, None));
            });
            slots.insert(
                id,
                Slot {
                    outbound: link.outbound,
                    kill: link.kill,
                    ready: false,
                    current: None,
                    pinned: VecDeque::new(),
                },
            );
        }
        drop(messages_tx);

        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status) =
            watch::channel(PoolStatus { live: size, ..Default::default() });
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let actor = PoolActor {
            slots,
            queue: VecDeque::new(),
            messages,
            commands: commands_rx,
            status: status_tx,
            events: events.clone(),
            grace,
        };
        tokio::spawn(actor.run());
        info!(target: "workers", size, "Started worker pool");

        Ok(Self { commands, status, events, size })
    }

    /// Waits until every live worker announced readiness.
    pub async fn wait_ready(&self) -> Result<(), WorkerError> {
        let mut status = self.status.clone();
        let live = status
            .wait_for(|status| status.live == 0 || status.ready == status.live)
            .await
            .map_err(|_| WorkerError::Ended)?
            .live;
        if live == 0 {
            return Err(WorkerError::NoWorkers);
        }
        Ok(())
    }

    /// Runs `request` on the next idle worker.
    pub async fn schedule(&self, request: Req) -> Result<Resp, WorkerError> {
        self.submit(request, None).await
    }

    /// Runs `request` once on every live worker, returning the results in worker id order.
    pub async fn schedule_all(&self, request: Req) -> Vec<Result<Resp, WorkerError>>
    where
        Req: Clone,
    {
        let (reply, workers) = oneshot::channel();
        if self.commands.send(Command::Workers { reply }).is_err() {
            return Vec::new();
        }
        let Ok(workers) = workers.await else {
            return Vec::new();
        };
        join_all(workers.into_iter().map(|id| self.submit(request.clone(), Some(id)))).await
    }

    async fn submit(&self, request: Req, target: Option<usize>) -> Result<Resp, WorkerError> {
        let (reply, result) = oneshot::channel();
        self.commands
            .send(Command::Schedule { request, target, reply })
            .map_err(|_| WorkerError::Ended)?;
        result.await.map_err(|_| WorkerError::Ended)?
    }

    /// Stops every worker.
    ///
    /// Queued tasks fail with [`WorkerError::Ended`]. Tasks in flight may finish within the grace
    /// period; after it the remaining workers are killed and their tasks fail with
    /// [`WorkerError::Exited`].
    pub async fn end(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::End { reply }).is_ok() {
            let _ = done.await;
        }
    }
}

impl<Req, Resp> WorkerPool<Req, Resp> {
    /// Subscribes to worker logs, statistics and exits.
    pub fn events(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    /// The number of workers the pool was started with.
    pub const fn size(&self) -> usize {
        self.size
    }

    /// The current worker counts.
    pub fn status(&self) -> PoolStatus {
        *self.status.borrow()
    }
}

struct Slot<Req, Resp> {
    outbound: mpsc::UnboundedSender<ParentMessage<Req>>,
    kill: CancellationToken,
    ready: bool,
    current: Option<Reply<Resp>>,
    pinned: VecDeque<(Req, Reply<Resp>)>,
}

struct PoolActor<Req, Resp> {
    slots: BTreeMap<usize, Slot<Req, Resp>>,
    queue: VecDeque<(Req, Reply<Resp>)>,
    messages: mpsc::UnboundedReceiver<(usize, Option<WorkerMessage<Resp>>)>,
    commands: mpsc::UnboundedReceiver<Command<Req, Resp>>,
    status: watch::Sender<PoolStatus>,
    events: broadcast::Sender<PoolEvent>,
    grace: Duration,
}

impl<Req, Resp> PoolActor<Req, Resp> {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::End { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        return;
                    }
                    Some(command) => self.on_command(command),
                    None => {
                        self.shutdown().await;
                        return;
                    }
                },
                Some((id, message)) = self.messages.recv() => self.on_message(id, message),
            }
            self.dispatch();
            self.publish();
        }
    }

    fn on_command(&mut self, command: Command<Req, Resp>) {
        match command {
            Command::Schedule { request, target, reply } => {
                if self.slots.is_empty() {
                    let _ = reply.send(Err(WorkerError::NoWorkers));
                    return;
                }
                match target {
                    None => self.queue.push_back((request, reply)),
                    Some(id) => match self.slots.get_mut(&id) {
                        Some(slot) => slot.pinned.push_back((request, reply)),
                        None => {
                            let _ = reply.send(Err(WorkerError::Exited(id)));
                        }
                    },
                }
            }
            Command::Workers { reply } => {
                let _ = reply.send(self.slots.keys().copied().collect());
            }
            Command::End { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn on_message(&mut self, id: usize, message: Option<WorkerMessage<Resp>>) {
        let Some(message) = message else {
            self.remove(id);
            return;
        };
        match message {
            WorkerMessage::Ready => {
                if let Some(slot) = self.slots.get_mut(&id) {
                    debug!(target: "workers", worker = id, "Worker ready");
                    slot.ready = true;
                }
            }
            WorkerMessage::Log(record) => {
                log::emit(id, &record);
                let _ = self.events.send(PoolEvent::Log { worker: id, record });
            }
            WorkerMessage::Stats(record) => {
                trace!(target: "workers", worker = id, name = %record.name, value = record.value, "Worker stat");
                let _ = self.events.send(PoolEvent::Stats { worker: id, record });
            }
            WorkerMessage::Result(response) => self.answer(id, Ok(response)),
            WorkerMessage::Error(TaskFailure { reason, fatal }) => {
                self.answer(id, Err(WorkerError::Task { worker: id, reason, fatal }))
            }
        }
    }

    fn answer(&mut self, id: usize, result: Result<Resp, WorkerError>) {
        match self.slots.get_mut(&id).and_then(|slot| slot.current.take()) {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => warn!(target: "workers", worker = id, "Dropping answer with no task in flight"),
        }
    }

    fn remove(&mut self, id: usize) {
        let Some(slot) = self.slots.remove(&id) else {
            return;
        };
        if slot.current.is_some() {
            warn!(target: "workers", worker = id, "Worker exited with a task in flight");
        } else {
            debug!(target: "workers", worker = id, "Worker exited");
        }
        if let Some(reply) = slot.current {
            let _ = reply.send(Err(WorkerError::Exited(id)));
        }
        for (_, reply) in slot.pinned {
            let _ = reply.send(Err(WorkerError::Exited(id)));
        }
        let _ = self.events.send(PoolEvent::Exited { worker: id });

        if self.slots.is_empty() {
            for (_, reply) in self.queue.drain(..) {
                let _ = reply.send(Err(WorkerError::NoWorkers));
            }
        }
    }

    fn dispatch(&mut self) {
        for (id, slot) in self.slots.iter_mut() {
            if !slot.ready || slot.current.is_some() {
                continue;
            }
            let mut from_pinned;
            let next = loop {
                from_pinned = !slot.pinned.is_empty();
                let next =
                    if from_pinned { slot.pinned.pop_front() } else { self.queue.pop_front() };
                match next {
                    // The caller stopped waiting.
                    Some((_, reply)) if reply.is_closed() => continue,
                    next => break next,
                }
            };
            let Some((request, reply)) = next else {
                continue;
            };
            match slot.outbound.send(ParentMessage::Execute(request)) {
                Ok(()) => {
                    trace!(target: "workers", worker = id, "Dispatched task");
                    slot.current = Some(reply);
                }
                Err(mpsc::error::SendError(message)) => {
                    slot.ready = false;
                    if let ParentMessage::Execute(request) = message {
                        if from_pinned {
                            slot.pinned.push_front((request, reply));
                        } else {
                            self.queue.push_front((request, reply));
                        }
                    }
                }
            }
        }
    }

    fn publish(&self) {
        let status = PoolStatus {
            live: self.slots.len(),
            ready: self.slots.values().filter(|slot| slot.ready).count(),
            busy: self.slots.values().filter(|slot| slot.current.is_some()).count(),
        };
        self.status.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }

    async fn shutdown(&mut self) {
        info!(target: "workers", live = self.slots.len(), queued = self.queue.len(), "Ending worker pool");
        for (_, reply) in self.queue.drain(..) {
            let _ = reply.send(Err(WorkerError::Ended));
        }
        for slot in self.slots.values_mut() {
            for (_, reply) in slot.pinned.drain(..) {
                let _ = reply.send(Err(WorkerError::Ended));
            }
            let _ = slot.outbound.send(ParentMessage::End);
        }

        let deadline = tokio::time::sleep(self.grace);
        tokio::pin!(deadline);
        while !self.slots.is_empty() {
            tokio::select! {
                message = self.messages.recv() => match message {
                    Some((id, message)) => self.on_message(id, message),
                    None => break,
                },
                _ = &mut deadline => {
                    for (id, slot) in std::mem::take(&mut self.slots) {
                        warn!(target: "workers", worker = id, "Worker did not stop in time, killing");
                        slot.kill.cancel();
                        if let Some(reply) = slot.current {
                            let _ = reply.send(Err(WorkerError::Exited(id)));
                        }
                    }
                }
            }
        }
        self.slots.clear();
        self.publish();
    }
}
