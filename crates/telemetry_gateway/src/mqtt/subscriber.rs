use crate::domain::StatusIngestionService;
use crate::mqtt::status_subscription;
use anyhow::anyhow;
use common::domain::{DomainError, DomainResult};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Span};

/// Broker connection settings for status ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSubscriberConfig {
    pub broker_url: String,
    pub client_id: String,
    /// Namespace segment of `<prefix>/<vehicle_id>/status`
    pub topic_prefix: String,
    pub keep_alive_secs: u64,
    pub retry_delay_secs: u64,
    /// Consecutive failed connections tolerated before giving up; 0 retries forever
    pub max_retry_attempts: u32,
}

impl Default for MqttSubscriberConfig {
    fn default() -> Self {
        Self {
            broker_url: "mqtt://localhost:1883".to_string(),
            client_id: "patrol-telemetry-gateway".to_string(),
            topic_prefix: "vehicles".to_string(),
            keep_alive_secs: 30,
            retry_delay_secs: 5,
            max_retry_attempts: 0,
        }
    }
}

impl MqttSubscriberConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Requests buffered between client handles and the event loop
const REQUEST_CAPACITY: usize = 100;

/// Build the broker client and its event loop.
///
/// The client is shared by status ingestion and command publishing. Nothing
/// connects until [`run_mqtt_subscriber`] polls the event loop.
pub fn mqtt_connection(config: &MqttSubscriberConfig) -> DomainResult<(AsyncClient, EventLoop)> {
    let (host, port) = parse_broker_url(&config.broker_url)?;

    let mut mqtt_options = MqttOptions::new(&config.client_id, host, port);
    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    mqtt_options.set_clean_session(true);

    Ok(AsyncClient::new(mqtt_options, REQUEST_CAPACITY))
}

/// Drive the shared MQTT connection until cancelled.
///
/// Subscribes to `<prefix>/+/status` at QoS 1 on every connection and hands
/// each message to the ingestion service. The event loop reconnects on the
/// next poll after an error; the retry budget is reset whenever a connection
/// is acknowledged.
#[instrument(
    name = "mqtt_subscriber",
    skip_all,
    fields(broker_url = %config.broker_url, client_id = %config.client_id)
)]
pub async fn run_mqtt_subscriber(
    config: MqttSubscriberConfig,
    client: AsyncClient,
    mut eventloop: EventLoop,
    ingestion: &StatusIngestionService,
    ctx: CancellationToken,
) -> anyhow::Result<()> {
    let subscribe_topic = status_subscription(&config.topic_prefix);
    info!(topic_prefix = %config.topic_prefix, "starting MQTT subscriber");

    let mut retry_count: u32 = 0;
    let mut subscribe_pending = false;

    loop {
        if ctx.is_cancelled() {
            debug!("MQTT subscriber cancelled");
            let _ = client.try_disconnect();
            break;
        }

        // Clean sessions lose their subscriptions on every reconnect
        if subscribe_pending {
            match client.try_subscribe(&subscribe_topic, QoS::AtLeastOnce) {
                Ok(()) => {
                    subscribe_pending = false;
                    info!(topic = %subscribe_topic, "subscribing to MQTT topic");
                }
                Err(e) => debug!(error = %e, "client queue full, subscription deferred"),
            }
        }

        let event = tokio::select! {
            biased;
            _ = ctx.cancelled() => continue,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                handle_mqtt_message(&publish.topic, &publish.payload, ingestion);
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("connected to MQTT broker");
                retry_count = 0;
                subscribe_pending = true;
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                debug!("subscription acknowledged");
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "MQTT connection error");

                retry_count += 1;
                if config.max_retry_attempts > 0 && retry_count >= config.max_retry_attempts {
                    error!(
                        max_retries = config.max_retry_attempts,
                        "max retry attempts reached, stopping MQTT subscriber"
                    );
                    return Err(anyhow!(
                        "MQTT broker unreachable after {} attempts: {}",
                        retry_count,
                        e
                    ));
                }

                warn!(
                    attempt = retry_count,
                    max_attempts = config.max_retry_attempts,
                    "retrying MQTT connection"
                );

                tokio::select! {
                    _ = ctx.cancelled() => {}
                    _ = tokio::time::sleep(config.retry_delay()) => {}
                }
            }
        }
    }

    info!("MQTT subscriber stopped");
    Ok(())
}

/// Handle an incoming MQTT message
///
/// Creates a new independent trace for each message (not nested under the subscriber trace).
pub(crate) fn handle_mqtt_message(topic: &str, payload: &[u8], ingestion: &StatusIngestionService) {
    let span = info_span!(
        parent: Span::none(),
        "status_message",
        topic = %topic,
        payload_size = payload.len(),
        vehicle_id = tracing::field::Empty,
    );
    let _guard = span.enter();

    match ingestion.ingest(topic, payload) {
        Ok(vehicle_id) => {
            Span::current().record("vehicle_id", vehicle_id.as_str());
            debug!("status dispatched");
        }
        Err(e) if e.is_malformed_input() => {
            warn!(error = %e, "dropping malformed status message");
        }
        Err(e) => {
            error!(error = %e, "failed to ingest status message");
        }
    }
}

/// Parse broker URL in format mqtt://host:port or tcp://host:port or host:port
pub fn parse_broker_url(url: &str) -> DomainResult<(&str, u16)> {
    let url = url.trim_start_matches("mqtt://");
    let url = url.trim_start_matches("tcp://");

    let parts: Vec<&str> = url.split(':').collect();
    match parts.as_slice() {
        [host] if !host.is_empty() => Ok((*host, 1883)),
        [host, port] if !host.is_empty() => {
            let port = port.parse::<u16>().map_err(|_| {
                DomainError::InvalidBrokerUrl(format!("Invalid port in broker URL: {}", port))
            })?;
            Ok((*host, port))
        }
        _ => Err(DomainError::InvalidBrokerUrl(format!(
            "Invalid broker URL format: {}",
            url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{BroadcastHub, HubConfig};
    use common::domain::MockVehicleStatusRepository;
    use std::sync::Arc;
    use uuid::Uuid;

    #[test]
    fn test_parse_broker_url_with_port() {
        let (host, port) = parse_broker_url("mqtt://localhost:1883").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 1883);
    }

    #[test]
    fn test_parse_broker_url_without_scheme() {
        let (host, port) = parse_broker_url("emqx.example.com:8883").unwrap();
        assert_eq!(host, "emqx.example.com");
        assert_eq!(port, 8883);
    }

    #[test]
    fn test_parse_broker_url_default_port() {
        let (host, port) = parse_broker_url("mqtt://broker.local").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);
    }

    #[test]
    fn test_parse_broker_url_tcp_scheme() {
        let (host, port) = parse_broker_url("tcp://mqtt.example.com:1883").unwrap();
        assert_eq!(host, "mqtt.example.com");
        assert_eq!(port, 1883);
    }

    #[test]
    fn test_parse_broker_url_invalid() {
        assert!(matches!(
            parse_broker_url("mqtt://broker:notaport"),
            Err(DomainError::InvalidBrokerUrl(_))
        ));
        assert!(matches!(
            parse_broker_url(""),
            Err(DomainError::InvalidBrokerUrl(_))
        ));
    }

    #[test]
    fn test_default_config_retries_forever() {
        assert_eq!(MqttSubscriberConfig::default().max_retry_attempts, 0);
    }

    #[test]
    fn test_mqtt_connection_rejects_invalid_url() {
        let config = MqttSubscriberConfig {
            broker_url: "mqtt://broker:99999".to_string(),
            ..Default::default()
        };

        assert!(matches!(
            mqtt_connection(&config),
            Err(DomainError::InvalidBrokerUrl(_))
        ));
    }

    fn unreachable_broker(max_retry_attempts: u32) -> MqttSubscriberConfig {
        MqttSubscriberConfig {
            broker_url: "mqtt://127.0.0.1:1".to_string(),
            retry_delay_secs: 0,
            max_retry_attempts,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cancelled_subscriber_returns_ok() {
        let (_hub, handle) = BroadcastHub::new(HubConfig::default());
        let service = StatusIngestionService::new(handle, Arc::new(MockVehicleStatusRepository::new()));
        let config = MqttSubscriberConfig::default();
        let (client, eventloop) = mqtt_connection(&config).unwrap();
        let ctx = CancellationToken::new();
        ctx.cancel();

        let result = run_mqtt_subscriber(config, client, eventloop, &service, ctx).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_default_subscriber_keeps_retrying_unreachable_broker() {
        let (_hub, handle) = BroadcastHub::new(HubConfig::default());
        let service = StatusIngestionService::new(handle, Arc::new(MockVehicleStatusRepository::new()));
        let config = unreachable_broker(MqttSubscriberConfig::default().max_retry_attempts);
        let (client, eventloop) = mqtt_connection(&config).unwrap();
        let ctx = CancellationToken::new();

        let outcome = tokio::time::timeout(
            Duration::from_millis(500),
            run_mqtt_subscriber(config, client, eventloop, &service, ctx.clone()),
        )
        .await;

        assert!(outcome.is_err(), "subscriber gave up: {:?}", outcome);
    }

    #[tokio::test]
    async fn test_bounded_retry_budget_stops_subscriber() {
        let (_hub, handle) = BroadcastHub::new(HubConfig::default());
        let service = StatusIngestionService::new(handle, Arc::new(MockVehicleStatusRepository::new()));
        let config = unreachable_broker(2);
        let (client, eventloop) = mqtt_connection(&config).unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            run_mqtt_subscriber(config, client, eventloop, &service, CancellationToken::new()),
        )
        .await
        .unwrap();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("after 2 attempts"));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_retry_loop() {
        let (_hub, handle) = BroadcastHub::new(HubConfig::default());
        let service = StatusIngestionService::new(handle, Arc::new(MockVehicleStatusRepository::new()));
        let config = MqttSubscriberConfig {
            retry_delay_secs: 60,
            ..unreachable_broker(0)
        };
        let (client, eventloop) = mqtt_connection(&config).unwrap();
        let ctx = CancellationToken::new();

        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_mqtt_subscriber(config, client, eventloop, &service, ctx),
        )
        .await
        .unwrap();

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_handle_mqtt_message_dispatches() {
        let (hub, handle) = BroadcastHub::new(HubConfig::default());
        tokio::spawn(hub.run(CancellationToken::new()));
        let mut mailbox = handle.register(Uuid::new_v4()).await.unwrap();

        let mut repository = MockVehicleStatusRepository::new();
        repository
            .expect_update_current_status()
            .times(1)
            .returning(|_, _| Ok(()));
        repository
            .expect_append_history_entry()
            .times(1)
            .returning(|_| Ok(()));
        let service = StatusIngestionService::new(handle, Arc::new(repository));

        handle_mqtt_message(
            "vehicles/veh-9/status",
            br#"{"timestamp":1,"position":{"lat":0.5,"lng":0.25},"battery":10.0,"state":"charging"}"#,
            &service,
        );

        let message = mailbox.recv().await.unwrap();
        assert!(message.contains("\"vehicle_id\":\"veh-9\""));
        service.drain().await;
    }

    #[tokio::test]
    async fn test_handle_mqtt_message_invalid_topic() {
        let (_hub, handle) = BroadcastHub::new(HubConfig::default());

        let mut repository = MockVehicleStatusRepository::new();
        repository.expect_update_current_status().times(0);
        repository.expect_append_history_entry().times(0);
        let service = StatusIngestionService::new(handle, Arc::new(repository));

        handle_mqtt_message("invalid-topic-format", b"{}", &service);
        service.drain().await;
    }
}
