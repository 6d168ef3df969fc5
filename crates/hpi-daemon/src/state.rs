//! Application state and event dispatch
//!
//! Handlers run as independent tasks and push their events into one queue.
//! A single dispatcher drains it into the registry and hands refused events
//! back to the handler that reported them.

use anyhow::{anyhow, Result};
use hpi_core::{DomainId, EventSource, HpiEvent, Registry, UidTable};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::simulator::Simulator;

/// An event tagged with the domain it is meant for
#[derive(Debug)]
pub struct Envelope {
    pub domain: DomainId,
    pub event: HpiEvent,
    /// Return path for the event if the registry refuses it
    pub refused: Option<mpsc::UnboundedSender<HpiEvent>>,
}

/// Refused events waiting to be handed back to one handler
pub struct Refusals {
    tx: mpsc::UnboundedSender<HpiEvent>,
    rx: mpsc::UnboundedReceiver<HpiEvent>,
}

impl Refusals {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Tell `source` about everything refused since the last call
    fn deliver(&mut self, source: &mut dyn EventSource) -> usize {
        let mut count = 0;
        while let Ok(event) = self.rx.try_recv() {
            source.rejected(&event);
            count += 1;
        }
        count
    }
}

impl Default for Refusals {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared application state
pub struct AppState {
    pub registry: Registry,
    pub config: Config,
}

impl AppState {
    /// Restore persisted UIDs and create the configured domains
    pub fn new(config: Config) -> Result<Self> {
        let uids = match &config.daemon.uid_map {
            Some(path) => UidTable::load_or_create(path)?,
            None => UidTable::new(),
        };
        info!(uids = uids.len(), "UID table ready");

        let registry = Registry::with_uids(uids);
        for domain in config.domains() {
            registry.create_domain(domain)?;
        }

        Ok(Self { registry, config })
    }

    /// Instantiate every configured handler with its target domain
    pub fn handlers(&self) -> Result<Vec<(DomainId, Simulator)>> {
        let first = self
            .registry
            .domain_ids()
            .first()
            .copied()
            .ok_or_else(|| anyhow!("no domains configured"))?;

        self.config
            .handlers
            .iter()
            .map(|handler| {
                let domain = match &handler.domain {
                    Some(tag) => self
                        .registry
                        .find_domain(tag)
                        .ok_or_else(|| anyhow!("unknown domain '{}'", tag))?,
                    None => first,
                };
                Ok((domain, Simulator::new(&handler.name, &handler.inventory)))
            })
            .collect()
    }

    pub fn uid_map(&self) -> Option<&PathBuf> {
        self.config.daemon.uid_map.as_ref()
    }

    /// Persist the UID table if a map file is configured
    pub fn save_uids(&self) -> Result<()> {
        if let Some(path) = self.uid_map() {
            self.registry.save_uid_map(path)?;
        }
        Ok(())
    }
}

/// Run one discovery pass of `source` and queue its events
///
/// Events refused since the previous pass go back to `source` first, so the
/// pass reports them again.
pub async fn run_once(
    source: &mut dyn EventSource,
    domain: DomainId,
    tx: &mpsc::Sender<Envelope>,
    refusals: &mut Refusals,
) -> Result<usize> {
    let refused = refusals.deliver(source);
    if refused > 0 {
        debug!(handler = %source.name(), refused, "Requeueing refused events");
    }

    let events = source.discover()?;
    let count = events.len();
    for event in events {
        let envelope = Envelope {
            domain,
            event,
            refused: Some(refusals.tx.clone()),
        };
        tx.send(envelope)
            .await
            .map_err(|_| anyhow!("dispatcher stopped"))?;
    }
    Ok(count)
}

/// Rescan `source` every `period` until the dispatcher goes away
pub fn spawn_handler<S>(
    mut source: S,
    domain: DomainId,
    period: Duration,
    tx: mpsc::Sender<Envelope>,
) -> JoinHandle<()>
where
    S: EventSource + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        let mut refusals = Refusals::new();
        info!(handler = %source.name(), domain = %domain, "Handler started");
        loop {
            ticker.tick().await;
            if tx.is_closed() {
                break;
            }
            if let Err(e) = run_once(&mut source, domain, &tx, &mut refusals).await {
                warn!(handler = %source.name(), error = %e, "Discovery pass failed");
            }
        }
    })
}

/// Apply queued events until every sender is dropped; returns how many applied
pub fn spawn_dispatcher(registry: Registry, mut rx: mpsc::Receiver<Envelope>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut applied = 0;
        while let Some(Envelope {
            domain,
            event,
            refused,
        }) = rx.recv().await
        {
            let kind = event.kind();
            let retry = refused.as_ref().map(|_| event.clone());
            match registry.apply_event(domain, event) {
                Ok(outcome) => {
                    applied += 1;
                    debug!(domain = %domain, kind, ?outcome, "Applied event");
                }
                Err(e) => {
                    warn!(domain = %domain, kind, error = %e, "Event rejected");
                    if let (Some(refused), Some(event)) = (refused, retry) {
                        // The handler may already be gone
                        let _ = refused.send(event);
                    }
                }
            }
        }
        applied
    })
}
