//! Push transport, pull loop and sequencer wired into one running service.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use positions::{Provider, RawUpdate, Sequencer};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};
use transport::{CloseCode, Connector, Handler, SocketError, Transport};

use crate::config::Config;

/// Close codes that restart the push connection rather than ending it.
const KNOWN_CLOSE_CODES: [u16; 9] = [
    CloseCode::NORMAL,
    CloseCode::GOING_AWAY,
    CloseCode::NO_STATUS,
    CloseCode::ABNORMAL,
    CloseCode::INTERNAL_ERROR,
    CloseCode::SERVICE_RESTART,
    CloseCode::TRY_AGAIN_LATER,
    CloseCode::RESTART,
    CloseCode::SHUTDOWN,
];

/// Upgrade statuses worth retrying after a longer back-off.
const RETRYABLE_UPGRADE_STATUSES: [u16; 4] = [429, 502, 503, 504];

/// Whether a close code from the push feed is recoverable.
#[must_use]
pub fn is_known_close(code: u16) -> bool {
    KNOWN_CLOSE_CODES.contains(&code)
}

/// Push feed callbacks. Decoded reports are forwarded to the service loop.
#[derive(Debug)]
pub struct FeedHandler {
    updates: UnboundedSender<RawUpdate>,
    greeting: Option<Bytes>,
    upgrade_retry_delay: Duration,
}

impl FeedHandler {
    #[must_use]
    pub fn new(updates: UnboundedSender<RawUpdate>, config: &Config) -> Self {
        Self {
            updates,
            greeting: config.greeting.clone().map(Bytes::from),
            upgrade_retry_delay: config.upgrade_retry_delay,
        }
    }
}

#[async_trait]
impl Handler for FeedHandler {
    async fn on_open(&mut self) -> Option<Bytes> {
        self.greeting.clone()
    }

    async fn on_message(&mut self, data: Bytes) {
        match RawUpdate::from_push(&data) {
            Ok(update) => {
                if self.updates.send(update).is_err() {
                    debug!("service loop has stopped, dropping update");
                }
            }
            Err(e) => warn!(monotonic_counter.malformed_push = 1, "dropping malformed push message: {e}"),
        }
    }

    async fn on_close(&mut self, code: u16, reason: &str) -> transport::Result<Option<Duration>> {
        if is_known_close(code) {
            return Ok(None);
        }
        Err(transport::Error::UnexpectedClose { code, reason: reason.to_string() })
    }

    async fn on_error(&mut self, error: &SocketError) -> Option<Duration> {
        match error {
            SocketError::Upgrade { status } if RETRYABLE_UPGRADE_STATUSES.contains(status) => {
                Some(self.upgrade_retry_delay)
            }
            _ => None,
        }
    }
}

/// Vehicle positions service: the push feed and the periodic pull both feed
/// one sequencer.
pub struct Service<P, C> {
    config: Config,
    provider: P,
    connector: C,
}

impl<P: Provider, C: Connector> Service<P, C> {
    #[must_use]
    pub const fn new(config: Config, provider: P, connector: C) -> Self {
        Self { config, provider, connector }
    }

    /// Run until the push session ends.
    ///
    /// # Errors
    ///
    /// Returns an error when the push feed closes with an unrecognized code.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` resolves or the push session ends.
    ///
    /// # Errors
    ///
    /// Returns an error when the push feed closes with an unrecognized code.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let Self { config, provider, connector } = self;

        let (tx, mut updates) = mpsc::unbounded_channel();
        let handler = FeedHandler::new(tx, &config);
        let mut transport =
            Transport::open(config.push_feed_url(), connector, handler, config.transport);
        let mut sequencer = Sequencer::new(provider, config.sequencer);

        let pull_url = config.pull_feed_url();
        let start = Instant::now();
        let mut pull = interval_at(start, config.pull_interval);
        pull.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep = interval_at(start + config.sweep_interval, config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(pull_enabled = config.pull_enabled, "vehicle positions service started");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!("shutting down");
                    transport.terminate(CloseCode::SHUTDOWN, Some("shutdown"));
                    transport.closed().await?;
                    return Ok(());
                }

                Some(update) = updates.recv() => apply(&mut sequencer, update).await,

                result = transport.closed() => {
                    if let Err(e) = &result {
                        error!(monotonic_counter.push_feed_fatal = 1, "push feed ended: {e}");
                    }
                    return result.map_err(Into::into);
                }

                _ = pull.tick(), if config.pull_enabled => {
                    match positions::fetch(sequencer.provider(), &pull_url).await {
                        Ok(pulled) => {
                            debug!(count = pulled.len(), "pulled vehicle positions");
                            for update in pulled {
                                apply(&mut sequencer, update).await;
                            }
                        }
                        Err(e) => warn!(monotonic_counter.pull_failed = 1, "pull failed: {e}"),
                    }
                }

                _ = sweep.tick() => {
                    sequencer.sweep();
                }
            }
        }
    }
}

async fn apply<P: Provider>(sequencer: &mut Sequencer<P>, update: RawUpdate) {
    let source = update.source();
    // rejections are logged by the sequencer
    if let Err(e) = sequencer.process(update).await {
        warn!(monotonic_counter.malformed_update = 1, %source, "dropping malformed update: {e}");
    }
}
