//! The long-running control loop.
//!
//! One task multiplexes the connect stream, the disconnect stream and a
//! ticker.  Each input is handled to completion before the next is
//! polled, so registry calls never overlap.

use std::future;
use std::time::Duration;

use anyhow::Result;
use futures_util::stream::StreamExt;
use log::{debug, info, warn};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::agent::Agent;
use crate::error::{report, report_all, SyncError};
use crate::registry::ServiceRegistry;
use crate::runtime::{ContainerRuntime, EventStream};
use crate::types::{NetworkAction, NetworkEvent};

impl<R, S> Agent<R, S>
where
    R: ContainerRuntime,
    S: ServiceRegistry,
{
    /// Keep the registry in sync until the process exits.
    ///
    /// Runs one reconciliation pass immediately, then another every
    /// `interval`.  A subscription that ends is dropped and re-opened on the
    /// next tick; until then the ticker alone keeps the registry current.
    pub async fn run(&self, interval: Duration) {
        let mut connect = Some(self.runtime.network_events(NetworkAction::Connect));
        let mut disconnect = Some(self.runtime.network_events(NetworkAction::Disconnect));

        report_all(&self.check_registrations().await);

        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                item = next_event(&mut connect) => {
                    if !self.on_stream_item(NetworkAction::Connect, item).await {
                        connect = None;
                    }
                }
                item = next_event(&mut disconnect) => {
                    if !self.on_stream_item(NetworkAction::Disconnect, item).await {
                        disconnect = None;
                    }
                }
                _ = ticker.tick() => {
                    if connect.is_none() {
                        info!("Resubscribing to network connect events");
                        connect = Some(self.runtime.network_events(NetworkAction::Connect));
                    }
                    if disconnect.is_none() {
                        info!("Resubscribing to network disconnect events");
                        disconnect = Some(self.runtime.network_events(NetworkAction::Disconnect));
                    }
                    report_all(&self.check_registrations().await);
                }
            }
        }
    }

    /// Returns `false` once the stream has ended.
    async fn on_stream_item(
        &self,
        action: NetworkAction,
        item: Option<Result<NetworkEvent>>,
    ) -> bool {
        match item {
            Some(Ok(event)) => {
                self.handle_event(event).await;
                true
            }
            Some(Err(e)) => {
                report(&SyncError::Stream {
                    action,
                    source: e.into(),
                });
                true
            }
            None => {
                warn!(
                    "Docker network {} event stream ended, polling only until next tick",
                    action
                );
                false
            }
        }
    }

    /// Register on connect, deregister on disconnect.  Errors are reported.
    pub async fn handle_event(&self, event: NetworkEvent) {
        debug!(
            "network {} event: container={:?} network={:?}",
            event.action, event.container, event.network
        );
        let Some(id) = event.container.as_deref() else {
            warn!("Network {} event without container id, ignoring", event.action);
            return;
        };

        let result = match event.action {
            NetworkAction::Connect => self.register(id).await,
            NetworkAction::Disconnect => self.deregister(id).await,
        };
        if let Err(e) = result {
            report(&e);
        }
    }
}

/// Next item of `stream`, or never if there is no stream.
async fn next_event(stream: &mut Option<EventStream<'_>>) -> Option<Result<NetworkEvent>> {
    match stream {
        Some(s) => s.next().await,
        None => future::pending().await,
    }
}
