use std::sync::Arc;
use std::time::{Duration, Instant};

use redis::aio::MultiplexedConnection;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamPendingId, StreamReadOptions,
    StreamReadReply,
};
use redis::AsyncCommands;
use tokio::sync::broadcast;

use crate::config::BrokerConfig;
use crate::metrics::ConsumerMetrics;

use super::{handle_entry, AckDecision, ConsumerStatus, EventHandler, PAYLOAD_FIELD, ROUTING_KEY_FIELD};

/// Redis stream consumer bound to one consumer group.
pub struct StreamConsumer {
    config: BrokerConfig,
    handler: Arc<dyn EventHandler>,
    status: Arc<ConsumerStatus>,
    shutdown: broadcast::Sender<()>,
}

impl StreamConsumer {
    pub fn new(config: BrokerConfig, handler: Arc<dyn EventHandler>) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            config,
            handler,
            status: Arc::new(ConsumerStatus::new()),
            shutdown,
        }
    }

    /// Get a shutdown signal sender
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Connection state, for health reporting
    pub fn status(&self) -> Arc<ConsumerStatus> {
        self.status.clone()
    }

    /// Run until shutdown. Any broker failure tears the session down and the
    /// setup routine is re-entered after `reconnect_delay_seconds`.
    pub async fn start(&self) -> anyhow::Result<()> {
        tracing::info!(
            stream = %self.config.stream,
            group = %self.config.group,
            consumer = %self.config.consumer,
            routing_key = %self.config.routing_key,
            "Starting event consumer"
        );

        let delay = Duration::from_secs(self.config.reconnect_delay_seconds);
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            match self.run_consumer_loop().await {
                Ok(()) => {
                    tracing::info!("Event consumer stopped gracefully");
                    break;
                }
                Err(e) => {
                    self.status.set_reconnecting();
                    tracing::error!(
                        error = %e,
                        delay_seconds = self.config.reconnect_delay_seconds,
                        "Event consumer error, reconnecting"
                    );
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            tracing::info!("Shutdown requested while waiting to reconnect");
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.status.set_stopped();
        Ok(())
    }

    /// One broker session: bind the group, then read and handle entries until
    /// shutdown (`Ok`) or a broker error (`Err`).
    async fn run_consumer_loop(&self) -> anyhow::Result<()> {
        let client = redis::Client::open(self.config.url.as_str())?;
        let mut conn = client.get_multiplexed_tokio_connection().await?;

        self.ensure_group(&mut conn).await?;
        self.status.set_connected();
        tracing::info!("Event consumer bound to stream");

        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_interval = Duration::from_millis(self.config.claim_idle_ms);
        let mut last_claim = Instant::now();
        let mut cursor = ReadCursor::Pending;

        loop {
            if last_claim.elapsed() >= claim_interval {
                last_claim = Instant::now();
                cursor = cursor.after_claim(self.claim_idle(&mut conn).await?);
            }

            let entries = tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Received shutdown signal");
                    return Ok(());
                }
                entries = self.read(&mut conn, cursor.start_id()) => entries?,
            };

            let read = entries.len();
            let mut requeued = false;
            for entry in entries {
                // Unhandled entries stay pending for the next session
                if shutdown_requested(&mut shutdown_rx) {
                    tracing::info!("Received shutdown signal mid-batch");
                    return Ok(());
                }

                let decision = self.process(&entry).await;
                if decision.acknowledges() {
                    let _: i64 = conn
                        .xack(&self.config.stream, &self.config.group, &[entry.id.as_str()])
                        .await?;
                } else {
                    requeued = true;
                    break;
                }
            }
            cursor = cursor.after_batch(read, requeued);

            if requeued {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Received shutdown signal while waiting to redeliver");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(Duration::from_millis(self.config.requeue_delay_ms)) => {}
                }
            }
        }
    }

    /// XGROUP CREATE ... MKSTREAM, tolerating an existing group.
    async fn ensure_group(&self, conn: &mut MultiplexedConnection) -> redis::RedisResult<()> {
        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.config.stream, &self.config.group, "$")
            .await;

        match created {
            Ok(()) => {
                tracing::info!(group = %self.config.group, "Created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn read(
        &self,
        conn: &mut MultiplexedConnection,
        start_id: &str,
    ) -> redis::RedisResult<Vec<StreamId>> {
        let mut options = StreamReadOptions::default()
            .group(&self.config.group, &self.config.consumer)
            .count(self.config.batch_size.max(1));
        if start_id == ">" {
            options = options.block(self.config.block_ms as usize);
        }

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.config.stream], &[start_id], &options)
            .await?;

        Ok(reply
            .map(|reply| reply.keys.into_iter().flat_map(|key| key.ids).collect())
            .unwrap_or_default())
    }

    async fn process(&self, entry: &StreamId) -> AckDecision {
        ConsumerMetrics::record_received();

        let routing_key: Option<String> = entry.get(ROUTING_KEY_FIELD);
        let payload: Option<String> = entry.get(PAYLOAD_FIELD);

        let decision = handle_entry(
            self.handler.as_ref(),
            &self.config.routing_key,
            routing_key.as_deref(),
            payload.as_deref(),
        )
        .await;

        ConsumerMetrics::record_outcome(decision.as_str());
        tracing::debug!(entry_id = %entry.id, decision = decision.as_str(), "Entry handled");
        decision
    }

    /// Take over entries left pending on other consumers for longer than
    /// `claim_idle_ms`. Returns how many were claimed.
    async fn claim_idle(&self, conn: &mut MultiplexedConnection) -> redis::RedisResult<usize> {
        let scan = self.config.batch_size.max(1) * 10;
        let pending: StreamPendingCountReply = conn
            .xpending_count(&self.config.stream, &self.config.group, "-", "+", scan)
            .await?;

        let ids = claimable(pending.ids, &self.config.consumer, self.config.claim_idle_ms);

        if ids.is_empty() {
            return Ok(0);
        }

        let claimed: StreamClaimReply = conn
            .xclaim(
                &self.config.stream,
                &self.config.group,
                &self.config.consumer,
                self.config.claim_idle_ms,
                &ids,
            )
            .await?;

        let count = claimed.ids.len();
        if count > 0 {
            ConsumerMetrics::record_claimed(count as u64);
            tracing::info!(claimed = count, "Claimed idle entries from other consumers");
        }
        Ok(count)
    }
}

/// Where the next XREADGROUP starts.
///
/// `Pending` re-reads this consumer's delivered but unacknowledged entries
/// (id `0`) in order; `New` blocks for fresh entries (id `>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadCursor {
    Pending,
    New,
}

impl ReadCursor {
    fn start_id(self) -> &'static str {
        match self {
            ReadCursor::Pending => "0",
            ReadCursor::New => ">",
        }
    }

    /// Cursor after handling a batch of `read` entries. A requeued entry
    /// keeps it on the pending list; an empty pending read moves on to new
    /// entries.
    fn after_batch(self, read: usize, requeued: bool) -> Self {
        if requeued {
            ReadCursor::Pending
        } else if self == ReadCursor::Pending && read == 0 {
            ReadCursor::New
        } else {
            self
        }
    }

    fn after_claim(self, claimed: usize) -> Self {
        if claimed > 0 {
            ReadCursor::Pending
        } else {
            self
        }
    }
}

/// Ids pending on other consumers for at least `idle_ms`.
fn claimable(pending: Vec<StreamPendingId>, consumer: &str, idle_ms: u64) -> Vec<String> {
    pending
        .into_iter()
        .filter(|p| p.consumer != consumer && p.last_delivered_ms as u64 >= idle_ms)
        .map(|p| p.id)
        .collect()
}

fn shutdown_requested(rx: &mut broadcast::Receiver<()>) -> bool {
    !matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty))
}
