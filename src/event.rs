use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::migrator::ActivationOutcome;
use crate::request::AssetRequest;
use crate::router::Routing;
use crate::worker::ServiceWorker;

/// Lifecycle signals delivered by the host
#[derive(Debug)]
pub enum Event {
  Install(oneshot::Sender<Result<usize>>),
  Activate(oneshot::Sender<Result<ActivationOutcome>>),
  /// Intercepted request; handled concurrently with other fetches
  Fetch(AssetRequest, oneshot::Sender<Result<Routing>>),
  /// Out-of-band message; fire and forget
  Message(String),
}

/// Dispatches host events to a worker.
///
/// Install and activate run one at a time in arrival order. Fetch and
/// message handlers are spawned and may overlap.
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  task: JoinHandle<()>,
}

impl EventHandler {
  pub fn new(worker: Arc<ServiceWorker>) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(dispatch(worker, rx));
    Self { tx, task }
  }

  pub async fn install(&self) -> Result<usize> {
    let (reply, rx) = oneshot::channel();
    self.send(Event::Install(reply))?;
    rx.await.map_err(|_| eyre!("Install handler dropped"))?
  }

  pub async fn activate(&self) -> Result<ActivationOutcome> {
    let (reply, rx) = oneshot::channel();
    self.send(Event::Activate(reply))?;
    rx.await.map_err(|_| eyre!("Activate handler dropped"))?
  }

  pub async fn fetch(&self, request: AssetRequest) -> Result<Routing> {
    let (reply, rx) = oneshot::channel();
    self.send(Event::Fetch(request, reply))?;
    rx.await.map_err(|_| eyre!("Fetch handler dropped"))?
  }

  pub fn post_message(&self, message: impl Into<String>) -> Result<()> {
    self.send(Event::Message(message.into()))
  }

  /// Stop accepting events and wait for in-flight handlers to finish.
  pub async fn shutdown(self) -> Result<()> {
    drop(self.tx);
    self
      .task
      .await
      .map_err(|e| eyre!("Event dispatcher failed: {}", e))
  }

  fn send(&self, event: Event) -> Result<()> {
    self
      .tx
      .send(event)
      .map_err(|_| eyre!("Event dispatcher is not running"))
  }
}

async fn dispatch(worker: Arc<ServiceWorker>, mut rx: mpsc::UnboundedReceiver<Event>) {
  let mut handlers = JoinSet::new();

  loop {
    tokio::select! {
      event = rx.recv() => match event {
        Some(Event::Install(reply)) => {
          let _ = reply.send(worker.install().await);
        }
        Some(Event::Activate(reply)) => {
          let _ = reply.send(worker.activate().await);
        }
        Some(Event::Fetch(request, reply)) => {
          let worker = Arc::clone(&worker);
          handlers.spawn(async move {
            let _ = reply.send(worker.fetch(&request).await);
          });
        }
        Some(Event::Message(message)) => {
          let worker = Arc::clone(&worker);
          handlers.spawn(async move {
            match worker.message(&message).await {
              Ok(outcome) => info!(message = %message, ?outcome, "message handled"),
              Err(e) => warn!(message = %message, error = %format!("{:#}", e), "message failed"),
            }
          });
        }
        None => break,
      },
      Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
        if let Err(e) = joined {
          warn!(error = %e, "event handler panicked");
        }
      }
    }
  }

  while let Some(joined) = handlers.join_next().await {
    if let Err(e) = joined {
      warn!(error = %e, "event handler panicked");
    }
  }
  debug!("event dispatcher stopped");
}
