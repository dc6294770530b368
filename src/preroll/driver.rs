use crate::ad::vast::AdDecision;
use crate::ad::DecisionClient;
use crate::error::{PrerollError, Result};
use crate::player::{HostPlayer, PlayerSignal};
use crate::preroll::session::PrerollSession;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

type DecisionFuture = Pin<Box<dyn Future<Output = Result<Option<AdDecision>>> + Send>>;

/// Operations the embedding application may call
#[derive(Debug)]
pub enum Control {
    Suspend,
    Resume,
    SetDecisionUrl(String),
    Dispose,
    IsActive(oneshot::Sender<bool>),
}

#[derive(Debug)]
pub enum Input {
    Signal(PlayerSignal),
    Control(Control),
}

/// Create a driver input channel
pub fn channel() -> (PrerollHandle, mpsc::UnboundedReceiver<Input>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PrerollHandle { tx }, rx)
}

/// Clonable handle into a running [`PrerollDriver`]
///
/// The driver stops once every handle is dropped.
#[derive(Clone, Debug)]
pub struct PrerollHandle {
    tx: mpsc::UnboundedSender<Input>,
}

impl PrerollHandle {
    /// Deliver a host player signal; returns false once the driver is gone
    pub fn signal(&self, signal: PlayerSignal) -> bool {
        self.tx.send(Input::Signal(signal)).is_ok()
    }

    pub fn suspend(&self) -> bool {
        self.control(Control::Suspend)
    }

    pub fn resume(&self) -> bool {
        self.control(Control::Resume)
    }

    pub fn set_decision_url(&self, url: impl Into<String>) -> bool {
        self.control(Control::SetDecisionUrl(url.into()))
    }

    pub fn dispose(&self) -> bool {
        self.control(Control::Dispose)
    }

    pub async fn is_active(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        if !self.control(Control::IsActive(tx)) {
            return Err(PrerollError::Internal("pre-roll driver stopped".to_string()));
        }
        rx.await
            .map_err(|_| PrerollError::Internal("pre-roll driver dropped request".to_string()))
    }

    fn control(&self, control: Control) -> bool {
        self.tx.send(Input::Control(control)).is_ok()
    }
}

/// Runs a session on one task, with at most one decision fetch in flight
pub struct PrerollDriver<P: HostPlayer> {
    session: PrerollSession<P>,
    client: Arc<dyn DecisionClient>,
    inputs: mpsc::UnboundedReceiver<Input>,
}

impl<P: HostPlayer> PrerollDriver<P> {
    pub fn new(
        session: PrerollSession<P>,
        client: Arc<dyn DecisionClient>,
        inputs: mpsc::UnboundedReceiver<Input>,
    ) -> Self {
        Self {
            session,
            client,
            inputs,
        }
    }

    /// Drive the session until every handle is dropped, then hand it back
    ///
    /// A decision fetch still in flight at that point is awaited first.
    pub async fn run(mut self) -> PrerollSession<P> {
        let mut in_flight: Option<DecisionFuture> = None;
        let mut open = true;

        loop {
            if let Some(url) = self.session.take_decision_request() {
                if in_flight.is_some() {
                    debug!("Replacing in-flight ad decision request");
                }
                let client = Arc::clone(&self.client);
                in_flight = Some(Box::pin(async move { client.fetch(&url).await }));
            }
            if !open && in_flight.is_none() {
                break;
            }

            tokio::select! {
                input = self.inputs.recv(), if open => match input {
                    Some(Input::Signal(signal)) => {
                        self.session.handle(signal);
                    }
                    Some(Input::Control(control)) => self.control(control),
                    None => open = false,
                },
                Some(decision) = poll_decision(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    self.session.on_decision(decision);
                }
                else => break,
            }
        }

        info!(state = ?self.session.state(), "Pre-roll driver stopped");
        self.session
    }

    fn control(&mut self, control: Control) {
        match control {
            Control::Suspend => self.session.suspend(),
            Control::Resume => self.session.resume(),
            Control::SetDecisionUrl(url) => self.session.set_decision_url(url),
            Control::Dispose => self.session.dispose(),
            Control::IsActive(reply) => {
                let _ = reply.send(self.session.is_active());
            }
        }
    }
}

async fn poll_decision(in_flight: &mut Option<DecisionFuture>) -> Option<Result<Option<AdDecision>>> {
    match in_flight.as_mut() {
        Some(fetch) => Some(fetch.await),
        None => None,
    }
}
