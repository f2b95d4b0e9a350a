//! MQTT adapter: forwards publishes to the engine and publishes LED blinks.
//!
//! Subscriptions are re-issued on every ConnAck, so a broker restart or a
//! dropped connection never leaves the watchdog deaf. Connection errors are
//! logged and retried after `reconnect_delay`; they never stop the daemon.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use vigil_core::Outbound;
use vigil_core::config::BusConfig;
use vigil_engine::BusMessage;

const BLINK_OFF_AFTER: Duration = Duration::from_millis(100);
const REQUEST_CAPACITY: usize = 64;

/// Build the client options from `[bus]`.
pub fn mqtt_options(config: &BusConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    // The client refuses keep-alives below one second.
    options.set_keep_alive(config.keep_alive().max(Duration::from_secs(1)));
    options.set_clean_session(true);
    options
}

pub struct BusAdapter {
    client: AsyncClient,
    eventloop: EventLoop,
    subscriptions: Vec<String>,
    reconnect_delay: Duration,
}

impl BusAdapter {
    pub fn new(config: &BusConfig) -> Self {
        let (client, eventloop) = AsyncClient::new(mqtt_options(config), REQUEST_CAPACITY);
        Self {
            client,
            eventloop,
            subscriptions: config.subscriptions(),
            reconnect_delay: config.reconnect_delay(),
        }
    }

    fn subscribe_all(&self) {
        for topic in &self.subscriptions {
            match self.client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                Ok(()) => debug!(%topic, "subscribed"),
                Err(e) => error!(%topic, error = %e, "subscribe failed"),
            }
        }
    }

    fn blink(&self, topic: String) {
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.publish(topic.as_str(), QoS::AtMostOnce, false, "1").await {
                warn!(%topic, error = %e, "blink on failed");
                return;
            }
            tokio::time::sleep(BLINK_OFF_AFTER).await;
            if let Err(e) = client.publish(topic.as_str(), QoS::AtMostOnce, false, "0").await {
                warn!(%topic, error = %e, "blink off failed");
            }
        });
    }

    /// Drive the connection until `stop` fires or the engine drops its
    /// outbound sender, which it does only after cancelling its timers.
    pub async fn run(
        mut self,
        messages: mpsc::Sender<BusMessage>,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
        mut stop: watch::Receiver<bool>,
    ) {
        info!(topics = self.subscriptions.len(), "bus adapter started");

        loop {
            tokio::select! {
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to broker");
                        self.subscribe_all();
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = BusMessage::new(publish.topic, publish.payload.to_vec());
                        if messages.send(message).await.is_err() {
                            debug!("engine gone, stopping bus adapter");
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, delay = ?self.reconnect_delay, "broker connection lost");
                        tokio::select! {
                            _ = tokio::time::sleep(self.reconnect_delay) => {}
                            _ = stop.changed() => break,
                        }
                    }
                },
                out = outbound.recv() => match out {
                    Some(Outbound::Blink { topic }) => self.blink(topic),
                    None => {
                        debug!("engine stopped, stopping bus adapter");
                        break;
                    }
                },
                _ = stop.changed() => break,
            }
        }

        self.disconnect().await;
        info!("bus adapter stopped");
    }

    async fn disconnect(&mut self) {
        if self.client.try_disconnect().is_err() {
            return;
        }
        // Let the event loop flush the DISCONNECT packet.
        let flush = async {
            while let Ok(event) = self.eventloop.poll().await {
                if matches!(event, Event::Outgoing(rumqttc::Outgoing::Disconnect)) {
                    break;
                }
            }
        };
        if tokio::time::timeout(Duration::from_secs(1), flush).await.is_err() {
            debug!("disconnect not flushed in time");
        }
    }
}
