use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_postgres::{AsyncMessage, NoTls};
use tracing::{debug, error, info, warn};

use crate::feed::{ChangeHub, OrderChange};

/// Channel the `orders` trigger publishes on.
pub const ORDER_CHANGES_CHANNEL: &str = "order_changes";

/// Dedicated `LISTEN` connection feeding database notifications into a [`ChangeHub`].
///
/// The connection is not re-established when it drops; subscribers simply stop
/// receiving changes.
pub struct OrderChangeListener {
    database_url: String,
    channel: String,
}

impl OrderChangeListener {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            channel: ORDER_CHANGES_CHANNEL.to_string(),
        }
    }

    /// Connects and starts `LISTEN`ing. Returns the task relaying notifications.
    pub async fn start(self, hub: ChangeHub) -> Result<JoinHandle<()>> {
        let (client, mut connection) = tokio_postgres::connect(&self.database_url, NoTls)
            .await
            .context("Failed to connect the order change listener")?;

        let mut messages = futures::stream::poll_fn(move |cx| connection.poll_message(cx));

        let channel = self.channel;
        let listen_sql = format!("LISTEN {channel}");

        // The connection only makes progress while its messages are polled, so
        // drive both until LISTEN has been acknowledged.
        {
            let listen = client.batch_execute(&listen_sql);
            tokio::pin!(listen);

            loop {
                tokio::select! {
                    result = &mut listen => {
                        result.with_context(|| format!("Failed to LISTEN on {channel}"))?;
                        break;
                    }
                    message = messages.next() => match message {
                        Some(Ok(_)) => debug!("Ignoring message received before LISTEN"),
                        Some(Err(err)) => {
                            return Err(err).context("Order change listener connection failed");
                        }
                        None => anyhow::bail!("Order change listener connection closed"),
                    },
                }
            }
        }

        info!("Listening for order changes on {}", channel);

        Ok(tokio::spawn(async move {
            // Keeps the session (and its LISTEN) alive for as long as the task runs.
            let _client = client;

            while let Some(message) = messages.next().await {
                match message {
                    Ok(AsyncMessage::Notification(notification)) => {
                        relay(&hub, notification.payload());
                    }
                    Ok(AsyncMessage::Notice(notice)) => debug!("Database notice: {}", notice),
                    Ok(_) => {}
                    Err(err) => {
                        error!("Order change listener connection failed: {}", err);
                        break;
                    }
                }
            }

            warn!("Order change listener stopped, live order updates are paused");
        }))
    }
}

fn relay(hub: &ChangeHub, payload: &str) {
    match OrderChange::decode(payload) {
        Ok(change) => {
            let delivered = hub.publish(change);
            debug!("Relayed order change to {} subscribers", delivered);
        }
        Err(err) => warn!("Dropping undecodable order change: {}", err),
    }
}
