use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::discovery::{self, DiscoveryConfig};
use crate::{Error, HashRing, Node};

/// Membership change event, broadcast after a new snapshot is installed.
#[derive(Debug, Clone, PartialEq)]
pub enum MembershipEvent {
    Joined(Node),
    Left(Node),
}

/// Routes cache keys to cluster nodes, kept current by a background
/// discovery poller.
///
/// The active membership snapshot lives behind an atomically swapped
/// pointer: lookups load it with a single atomic operation and never take a
/// lock or touch the network. A rebuild constructs the replacement ring
/// completely before the swap, so a reader either sees the old snapshot or
/// the new one, never a partial ring; lookups already under way finish
/// against the snapshot they loaded.
pub struct NodeSelector {
    ring: Arc<ArcSwapOption<HashRing>>,
    config: DiscoveryConfig,
    cancel_token: CancellationToken,
    task_handle: Option<tokio::task::JoinHandle<()>>,
    event_tx: broadcast::Sender<MembershipEvent>,
}

impl NodeSelector {
    /// Start the selector and its discovery poller.
    ///
    /// One discovery attempt fires immediately, then one per configured
    /// poll interval. Startup itself never fails: a failed attempt is
    /// logged and retried at the next tick, and lookups return
    /// [`Error::NoActiveMembership`] until an attempt succeeds.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: DiscoveryConfig) -> Self {
        let ring = Arc::new(ArcSwapOption::from(None));
        let cancel_token = CancellationToken::new();
        // 16 is enough capacity for membership-change bursts
        let (event_tx, _) = broadcast::channel(16);

        let task_handle = Self::spawn_poller(
            config.clone(),
            ring.clone(),
            cancel_token.clone(),
            event_tx.clone(),
        );

        Self {
            ring,
            config,
            cancel_token,
            task_handle: Some(task_handle),
            event_tx,
        }
    }

    fn spawn_poller(
        config: DiscoveryConfig,
        ring: Arc<ArcSwapOption<HashRing>>,
        cancel_token: CancellationToken,
        event_tx: broadcast::Sender<MembershipEvent>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.poll_interval);

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        tracing::debug!("discovery poller shutting down");
                        break;
                    }

                    _ = ticker.tick() => {
                        // Cancellation is only observed between ticks; an
                        // attempt under way always completes or fails on
                        // its own.
                        if let Err(e) = poll_once(&config, &ring, &event_tx).await {
                            tracing::warn!(
                                cluster = %config.cluster_address,
                                "discovery attempt failed: {}",
                                e
                            );
                        }
                    }
                }
            }
        })
    }

    /// Route `key` to its owning node.
    ///
    /// Lock-free: one atomic snapshot load, no I/O.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveMembership`] until the first discovery
    /// attempt succeeds.
    pub fn pick_server(&self, key: impl AsRef<[u8]>) -> Result<Node, Error> {
        match self.ring.load_full() {
            Some(ring) => ring.pick(key).map(|node| node.clone()),
            None => Err(Error::NoActiveMembership),
        }
    }

    /// Visit every node of the active snapshot in ring order, stopping at
    /// the first visitor error and propagating it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveMembership`] (converted into `E`) when no
    /// snapshot has been installed yet, or the first error `visit` reports.
    pub fn each<E, F>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(&Node) -> Result<(), E>,
        E: From<Error>,
    {
        let ring = self.ring.load_full().ok_or(Error::NoActiveMembership)?;
        for node in ring.nodes() {
            visit(node)?;
        }
        Ok(())
    }

    /// Nodes of the active snapshot in ring order; empty before the first
    /// successful discovery.
    pub fn nodes(&self) -> Vec<Node> {
        match self.ring.load_full() {
            Some(ring) => ring.nodes().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Number of nodes in the active snapshot (zero before the first
    /// successful discovery).
    pub fn node_count(&self) -> usize {
        self.ring.load().as_ref().map_or(0, |ring| ring.len())
    }

    /// Subscribe to membership change events.
    ///
    /// Events are broadcast after the ring has been updated, so a
    /// subscriber observing an event already sees the new membership.
    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.event_tx.subscribe()
    }

    /// Run one discovery cycle now instead of waiting for the next tick.
    ///
    /// # Errors
    ///
    /// Returns that cycle's error; the active snapshot is left untouched on
    /// failure.
    pub async fn refresh(&self) -> Result<(), Error> {
        poll_once(&self.config, &self.ring, &self.event_tx).await
    }

    /// Stop the discovery poller and wait for it to finish.
    ///
    /// An attempt already in flight completes or fails naturally; only
    /// future ticks are cancelled.
    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
        tracing::debug!("selector shut down");
    }
}

/// One poll cycle: fetch the membership, decide whether the snapshot must
/// be rebuilt, and install the replacement atomically.
async fn poll_once(
    config: &DiscoveryConfig,
    ring: &ArcSwapOption<HashRing>,
    event_tx: &broadcast::Sender<MembershipEvent>,
) -> Result<(), Error> {
    let discovered = discovery::fetch_nodes(config).await?;

    let current = ring.load_full();
    if !needs_rebuild(current.as_deref(), &discovered, config.rebuild_on_departure) {
        tracing::trace!(count = discovered.len(), "poll: membership unchanged");
        return Ok(());
    }

    let next = Arc::new(HashRing::build(&discovered)?);
    let previous: Vec<Node> = current
        .map(|snapshot| snapshot.nodes().cloned().collect())
        .unwrap_or_default();

    ring.store(Some(next.clone()));
    tracing::debug!(count = next.len(), "membership changed, ring rebuilt");

    // Events fire after the swap so subscribers already see the new ring.
    let previous_addrs: HashSet<&str> = previous.iter().map(Node::addr).collect();
    for node in next.nodes() {
        if !previous_addrs.contains(node.addr()) {
            let _ = event_tx.send(MembershipEvent::Joined(node.clone()));
        }
    }
    for node in &previous {
        if !next.contains(node.addr()) {
            let _ = event_tx.send(MembershipEvent::Left(node.clone()));
        }
    }

    Ok(())
}

/// Rebuild policy: rebuild when there is no snapshot yet, or when a
/// discovered address is not represented in the current one. Departures
/// alone trigger a rebuild only when `on_departure` is set; by default a
/// node that has left keeps its ring point until the next arrival forces a
/// rebuild.
fn needs_rebuild(current: Option<&HashRing>, discovered: &[Node], on_departure: bool) -> bool {
    let current = match current {
        Some(ring) => ring,
        None => return true,
    };

    if discovered.iter().any(|node| !current.contains(node.addr())) {
        return true;
    }

    on_departure
        && current
            .nodes()
            .any(|node| !discovered.iter().any(|d| d.addr() == node.addr()))
}
