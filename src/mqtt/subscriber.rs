/// MQTT subscription to the Zigbee2MQTT device topic
use log::{debug, error, info, warn};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use tokio::time::Duration;

use crate::config::MonitorConfig;
use crate::monitor::Monitor;

// Zigbee2MQTT publishes device state under this prefix
const TOPIC_PREFIX: &str = "zigbee2mqtt/";
const KEEP_ALIVE_SECS: u64 = 60;
const REQUEST_CHANNEL_CAPACITY: usize = 10;
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Topic carrying telemetry for `device`
pub fn topic_for(device: &str) -> String {
    format!("{}{}", TOPIC_PREFIX, device)
}

/// Single-attempt MQTT subscriber feeding a [`Monitor`]
///
/// The broker connection is attempted once. If it fails, or drops later,
/// the subscriber stops polling and simply waits to be cancelled.
pub struct Subscriber {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    endpoint: String,
    connected: bool,
}

impl Subscriber {
    pub fn new(config: &MonitorConfig) -> Self {
        let client_id = format!("power-monitor-{}-{}", config.device, std::process::id());
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(KEEP_ALIVE_SECS));

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        Subscriber {
            client,
            eventloop,
            topic: topic_for(&config.device),
            endpoint: format!("{}:{}", config.host, config.port),
            connected: false,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Drive the connection and hand every payload on the topic to `monitor`.
    ///
    /// Never returns; the caller stops it by dropping the future on shutdown.
    /// Payloads are applied inline, so once this future is dropped no further
    /// accumulator updates can happen.
    pub async fn run(&mut self, monitor: &Monitor) {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        error!("Failed to connect, return code {:?}", ack.code);
                        break;
                    }
                    self.connected = true;
                    info!("Connected to MQTT broker at {}", self.endpoint);

                    if let Err(e) = self.client.subscribe(&self.topic, QoS::AtMostOnce).await {
                        error!("Failed to subscribe to {}: {}", self.topic, e);
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    info!("Subscribed to {}", self.topic);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if publish.topic == self.topic {
                        monitor.handle_message(&publish.payload);
                    } else {
                        debug!("Ignoring message on {}", publish.topic);
                    }
                }
                Ok(event) => {
                    debug!("MQTT event: {:?}", event);
                }
                Err(e) => {
                    if self.connected {
                        error!("Connection to {} lost: {}", self.endpoint, e);
                    } else {
                        error!("Failed to connect to {}: {}", self.endpoint, e);
                    }
                    self.connected = false;
                    break;
                }
            }
        }

        // No reconnection: idle until the shutdown signal cancels us
        warn!("No longer receiving messages. Press Ctrl+C to stop.");
        std::future::pending::<()>().await;
    }

    /// Send DISCONNECT and drain the event loop for a bounded time.
    ///
    /// Publishes still in flight are dropped without touching the monitor.
    pub async fn close(mut self) {
        if !self.connected {
            return;
        }

        if let Err(e) = self.client.disconnect().await {
            warn!("Failed to request disconnect: {}", e);
            return;
        }

        let eventloop = &mut self.eventloop;
        let drain = async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("Event loop closed: {}", e);
                        break;
                    }
                }
            }
        };

        match tokio::time::timeout(DISCONNECT_TIMEOUT, drain).await {
            Ok(()) => info!("Disconnected from {}", self.endpoint),
            Err(_) => warn!("Timed out disconnecting from {}", self.endpoint),
        }
    }
}
