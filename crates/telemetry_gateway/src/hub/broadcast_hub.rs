use common::domain::{DomainError, DomainResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque handle identifying one connected observer
pub type ObserverId = Uuid;

/// Receiving end of an observer's bounded outbound queue.
///
/// Yields `None` once the hub has unregistered the observer.
pub type Mailbox = mpsc::Receiver<Arc<str>>;

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Pending messages an observer may hold before it is evicted
    pub mailbox_capacity: usize,
    /// Pending register/unregister/count requests before callers wait
    pub control_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
            control_buffer: 64,
        }
    }
}

enum HubCommand {
    Register {
        id: ObserverId,
        mailbox: mpsc::Sender<Arc<str>>,
        ack: oneshot::Sender<bool>,
    },
    Unregister(ObserverId),
    ObserverCount(oneshot::Sender<usize>),
}

struct Observer {
    mailbox: mpsc::Sender<Arc<str>>,
    /// Set once an eviction has been scheduled so it is only scheduled once
    evicting: bool,
}

/// Single owner of the observer registry.
///
/// All registry access goes through [`HubHandle`]; the registry itself only
/// lives inside [`BroadcastHub::run`].
pub struct BroadcastHub {
    commands: mpsc::Receiver<HubCommand>,
    publishes: mpsc::UnboundedReceiver<Arc<str>>,
    evictions: mpsc::WeakSender<HubCommand>,
    observers: HashMap<ObserverId, Observer>,
}

impl BroadcastHub {
    pub fn new(config: HubConfig) -> (Self, HubHandle) {
        let (command_tx, command_rx) = mpsc::channel(config.control_buffer.max(1));
        // Publishes are never refused; a full observer mailbox is the only drop point
        let (publish_tx, publish_rx) = mpsc::unbounded_channel();

        let hub = Self {
            commands: command_rx,
            publishes: publish_rx,
            evictions: command_tx.downgrade(),
            observers: HashMap::new(),
        };

        let handle = HubHandle {
            commands: command_tx,
            publishes: publish_tx,
            mailbox_capacity: config.mailbox_capacity.max(1),
        };

        (hub, handle)
    }

    /// Run the hub loop until cancelled or every handle is dropped.
    ///
    /// Control requests take priority over publishes. On exit every remaining
    /// mailbox is sealed.
    pub async fn run(mut self, ctx: CancellationToken) -> anyhow::Result<()> {
        info!("broadcast hub started");

        loop {
            tokio::select! {
                biased;

                _ = ctx.cancelled() => {
                    debug!("broadcast hub cancellation received");
                    break;
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                message = self.publishes.recv() => match message {
                    Some(message) => self.publish(message),
                    None => break,
                },
            }
        }

        let remaining = self.observers.len();
        self.observers.clear();
        info!(observers = remaining, "broadcast hub stopped");
        Ok(())
    }

    fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register { id, mailbox, ack } => {
                let registered = self.register(id, mailbox);
                let _ = ack.send(registered);
            }
            HubCommand::Unregister(id) => self.unregister(id),
            HubCommand::ObserverCount(reply) => {
                let _ = reply.send(self.observers.len());
            }
        }
    }

    fn register(&mut self, id: ObserverId, mailbox: mpsc::Sender<Arc<str>>) -> bool {
        if self.observers.contains_key(&id) {
            warn!(observer_id = %id, "observer already registered, ignoring");
            return false;
        }

        self.observers.insert(
            id,
            Observer {
                mailbox,
                evicting: false,
            },
        );
        info!(observer_id = %id, observers = self.observers.len(), "observer registered");
        true
    }

    fn unregister(&mut self, id: ObserverId) {
        // Dropping the sender seals the mailbox
        if self.observers.remove(&id).is_some() {
            info!(observer_id = %id, observers = self.observers.len(), "observer unregistered");
        } else {
            debug!(observer_id = %id, "unregister for unknown observer");
        }
    }

    fn publish(&mut self, message: Arc<str>) {
        let mut overflowed = Vec::new();

        for (id, observer) in self.observers.iter_mut() {
            if observer.evicting {
                continue;
            }

            match observer.mailbox.try_send(Arc::clone(&message)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(observer_id = %id, "observer mailbox full, dropping message and evicting");
                    observer.evicting = true;
                    overflowed.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(observer_id = %id, "observer mailbox closed, evicting");
                    observer.evicting = true;
                    overflowed.push(*id);
                }
            }
        }

        for id in overflowed {
            self.schedule_eviction(id);
        }
    }

    /// Queue an unregister behind the current step instead of removing inline.
    fn schedule_eviction(&self, id: ObserverId) {
        let Some(commands) = self.evictions.upgrade() else {
            // All handles are gone; the loop is about to exit and seal everything
            return;
        };

        tokio::spawn(async move {
            let _ = commands.send(HubCommand::Unregister(id)).await;
        });
    }
}

/// Cloneable entry point to a running [`BroadcastHub`]
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
    publishes: mpsc::UnboundedSender<Arc<str>>,
    mailbox_capacity: usize,
}

impl HubHandle {
    /// Register an observer and return its mailbox.
    ///
    /// Resolves once the hub has added the observer, so any later `unregister`
    /// or `publish` from this caller is processed after it.
    pub async fn register(&self, id: ObserverId) -> DomainResult<Mailbox> {
        let (mailbox_tx, mailbox_rx) = mpsc::channel(self.mailbox_capacity);
        let (ack_tx, ack_rx) = oneshot::channel();

        self.commands
            .send(HubCommand::Register {
                id,
                mailbox: mailbox_tx,
                ack: ack_tx,
            })
            .await
            .map_err(|_| DomainError::HubUnavailable("hub loop has stopped".to_string()))?;

        let registered = ack_rx
            .await
            .map_err(|_| DomainError::HubUnavailable("hub loop has stopped".to_string()))?;

        if !registered {
            return Err(DomainError::ValidationError(format!(
                "observer {} is already registered",
                id
            )));
        }

        Ok(mailbox_rx)
    }

    /// Remove an observer; unknown or already-removed observers are ignored.
    pub async fn unregister(&self, id: ObserverId) -> DomainResult<()> {
        self.commands
            .send(HubCommand::Unregister(id))
            .await
            .map_err(|_| DomainError::HubUnavailable("hub loop has stopped".to_string()))
    }

    /// Hand a serialized message to the hub without waiting.
    ///
    /// Every accepted message is offered to every observer registered when the
    /// hub gets to it; only an observer's own full mailbox drops it.
    pub fn publish(&self, message: impl Into<Arc<str>>) -> DomainResult<()> {
        self.publishes
            .send(message.into())
            .map_err(|_| DomainError::HubUnavailable("hub loop has stopped".to_string()))
    }

    pub async fn observer_count(&self) -> DomainResult<usize> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.commands
            .send(HubCommand::ObserverCount(reply_tx))
            .await
            .map_err(|_| DomainError::HubUnavailable("hub loop has stopped".to_string()))?;

        reply_rx
            .await
            .map_err(|_| DomainError::HubUnavailable("hub loop has stopped".to_string()))
    }
}
