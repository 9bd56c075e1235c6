//! MQTT transport over rumqttc
//!
//! `connect` drives the event loop until the broker answers with CONNACK so
//! that an unreachable broker is reported to the caller. After that the event
//! loop runs in its own task and only pushes received publishes into the
//! [`Inbox`].
//!
//! The session is persistent (`clean_session = false`) so the broker keeps
//! subscriptions across reconnects. Subscriptions are also recorded locally
//! and sent again whenever a CONNACK reports no stored session.

use async_trait::async_trait;
use bytes::Bytes;
use marionette_core::QoS;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS as MqttQoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{BusConfig, LastWill};
use crate::error::{BusError, Result};
use crate::transport::{BusTransport, Inbox};

/// Delay before polling the event loop again after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// MQTT 3.1.1 bus transport
pub struct MqttTransport {
    config: BusConfig,
    client: Mutex<Option<AsyncClient>>,
    connected: Arc<AtomicBool>,
    subscriptions: Subscriptions,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

/// Topic filters subscribed so far, in subscription order
type Subscriptions = Arc<Mutex<Vec<(String, MqttQoS)>>>;

impl MqttTransport {
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            event_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    fn options(&self, will: Option<LastWill>) -> MqttOptions {
        let mut options = MqttOptions::new(
            &self.config.client_id,
            &self.config.broker_host,
            self.config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs as u64));
        // rumqttc refuses a persistent session without a client id
        options.set_clean_session(self.config.client_id.is_empty());

        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            options.set_credentials(user, pass);
        }

        if let Some(will) = will {
            options.set_last_will(rumqttc::LastWill::new(
                will.topic,
                will.payload.into_bytes(),
                MqttQoS::AtLeastOnce,
                will.retain,
            ));
        }

        options
    }

    fn client(&self) -> Result<AsyncClient> {
        self.client.lock().clone().ok_or(BusError::NotConnected)
    }
}

/// Map a bus QoS onto the MQTT one
pub fn mqtt_qos(qos: QoS) -> MqttQoS {
    match qos {
        QoS::AtMostOnce => MqttQoS::AtMostOnce,
        QoS::AtLeastOnce => MqttQoS::AtLeastOnce,
        QoS::ExactlyOnce => MqttQoS::ExactlyOnce,
    }
}

async fn await_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(BusError::ConnectionFailed(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )))
                };
            }
            Ok(_) => continue,
            Err(e) => return Err(BusError::ConnectionFailed(e.to_string())),
        }
    }
}

fn restore_subscriptions(client: &AsyncClient, subscriptions: &Subscriptions) {
    let topics = subscriptions.lock().clone();
    for (topic, qos) in topics {
        match client.try_subscribe(topic.as_str(), qos) {
            Ok(()) => debug!("MQTT resubscribed to {}", topic),
            Err(e) => error!("MQTT resubscribe to {} failed: {}", topic, e),
        }
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    inbox: Inbox,
    connected: Arc<AtomicBool>,
    subscriptions: Subscriptions,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(
                    "MQTT received: {} ({} bytes)",
                    publish.topic,
                    publish.payload.len()
                );
                inbox.push(publish.topic, publish.payload);
            }
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!("MQTT reconnected to broker");
                connected.store(true, Ordering::SeqCst);
                if !ack.session_present {
                    restore_subscriptions(&client, &subscriptions);
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("MQTT disconnected by broker");
                connected.store(false, Ordering::SeqCst);
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT error: {}", e);
                connected.store(false, Ordering::SeqCst);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[async_trait]
impl BusTransport for MqttTransport {
    async fn connect(&self, inbox: Inbox, will: Option<LastWill>) -> Result<()> {
        if self.client.lock().is_some() {
            return Err(BusError::AlreadyConnected);
        }

        info!(
            "MQTT connecting to {}:{} as {}",
            self.config.broker_host, self.config.broker_port, self.config.client_id
        );

        let (client, mut eventloop) =
            AsyncClient::new(self.options(will), self.config.request_capacity);

        await_connack(&mut eventloop).await?;
        info!("MQTT connected");

        self.connected.store(true, Ordering::SeqCst);
        *self.client.lock() = Some(client.clone());

        let task = tokio::spawn(run_event_loop(
            eventloop,
            client,
            inbox,
            self.connected.clone(),
            self.subscriptions.clone(),
        ));
        *self.event_task.lock() = Some(task);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS, retain: bool) -> Result<()> {
        let client = self.client()?;
        client
            .publish(topic, mqtt_qos(qos), retain, payload.to_vec())
            .await
            .map_err(|e| BusError::PublishFailed(e.to_string()))
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<()> {
        let client = self.client()?;
        client
            .subscribe(topic, mqtt_qos(qos))
            .await
            .map_err(|e| BusError::SubscribeFailed(e.to_string()))?;

        let mut subscriptions = self.subscriptions.lock();
        match subscriptions.iter_mut().find(|(t, _)| t == topic) {
            Some(entry) => entry.1 = mqtt_qos(qos),
            None => subscriptions.push((topic.to_string(), mqtt_qos(qos))),
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Some(task) = self.event_task.lock().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn test_qos_mapping() {
        assert_eq!(mqtt_qos(QoS::AtMostOnce), MqttQoS::AtMostOnce);
        assert_eq!(mqtt_qos(QoS::AtLeastOnce), MqttQoS::AtLeastOnce);
        assert_eq!(mqtt_qos(QoS::ExactlyOnce), MqttQoS::ExactlyOnce);
    }

    #[tokio::test]
    async fn test_publish_before_connect_fails() {
        let transport = MqttTransport::new(BusConfig::default());
        assert!(!transport.is_connected());
        let result = transport
            .publish("a/b", Bytes::from_static(b"x"), QoS::AtMostOnce, false)
            .await;
        assert!(matches!(result, Err(BusError::NotConnected)));
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = MqttTransport::new(BusConfig {
            broker_host: "127.0.0.1".to_string(),
            broker_port: port,
            ..Default::default()
        });
        let result = transport.connect(Inbox::new(), None).await;
        assert!(matches!(result, Err(BusError::ConnectionFailed(_))));
        assert!(!transport.is_connected());
    }

    // Minimal MQTT 3.1.1 broker side, enough for CONNECT and SUBSCRIBE

    async fn read_packet(stream: &mut TcpStream) -> (u8, Vec<u8>) {
        let first = stream.read_u8().await.unwrap();
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let byte = stream.read_u8().await.unwrap();
            len |= ((byte & 0x7F) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.unwrap();
        (first, body)
    }

    async fn read_until(stream: &mut TcpStream, kind: u8) -> Vec<u8> {
        loop {
            let (first, body) = read_packet(stream).await;
            if first >> 4 == kind {
                return body;
            }
        }
    }

    fn subscribed_topic(body: &[u8]) -> String {
        // packet id (2), topic length (2), topic
        let len = u16::from_be_bytes([body[2], body[3]]) as usize;
        String::from_utf8(body[4..4 + len].to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_subscriptions_restored_after_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let broker = tokio::spawn(async move {
            // First session: accept, then drop the connection after SUBSCRIBE
            let (mut conn, _) = listener.accept().await.unwrap();
            let connect = read_until(&mut conn, 1).await;
            // protocol name (6), level (1), flags
            let clean_session = connect[7] & 0x02 != 0;
            conn.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();
            let first = subscribed_topic(&read_until(&mut conn, 8).await);
            drop(conn);

            // Second session: no stored session on the broker side
            let (mut conn, _) = listener.accept().await.unwrap();
            read_until(&mut conn, 1).await;
            conn.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();
            let second = subscribed_topic(&read_until(&mut conn, 8).await);
            (clean_session, first, second)
        });

        let transport = MqttTransport::new(BusConfig {
            broker_host: "127.0.0.1".to_string(),
            broker_port: port,
            client_id: "node-test".to_string(),
            ..Default::default()
        });
        transport.connect(Inbox::new(), None).await.unwrap();
        transport
            .subscribe("puppet/mouth/write", QoS::AtLeastOnce)
            .await
            .unwrap();

        let (clean_session, first, second) =
            tokio::time::timeout(Duration::from_secs(10), broker)
                .await
                .unwrap()
                .unwrap();
        assert!(!clean_session);
        assert_eq!(first, "puppet/mouth/write");
        assert_eq!(second, "puppet/mouth/write");
    }
}
