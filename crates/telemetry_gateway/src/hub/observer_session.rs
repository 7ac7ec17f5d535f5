use crate::hub::{HubHandle, Mailbox, ObserverId};
use axum::extract::ws::Message;
use common::domain::DomainResult;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use tracing::{debug, info, instrument, warn};

/// Bridge one transport connection to the hub.
///
/// Registers `observer_id`, then runs the outbound delivery loop as a task and
/// the inbound liveness loop inline. Whichever side ends first ends the
/// session; the observer is unregistered and the delivery loop is awaited so
/// the transport is closed before this returns.
#[instrument(name = "observer_session", skip_all, fields(observer_id = %observer_id))]
pub async fn run_observer_session<S, R, E>(
    hub: HubHandle,
    observer_id: ObserverId,
    sink: S,
    stream: R,
) -> DomainResult<()>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mailbox = hub.register(observer_id).await?;
    info!("observer connected");

    let mut delivery = tokio::spawn(deliver(mailbox, sink, observer_id));

    let delivery_finished = tokio::select! {
        _ = watch_liveness(stream) => false,
        _ = &mut delivery => true,
    };

    if let Err(e) = hub.unregister(observer_id).await {
        warn!(error = %e, "failed to unregister observer");
    }

    if !delivery_finished {
        // Unregister seals the mailbox, which ends delivery and closes the sink
        let _ = delivery.await;
    }

    info!("observer disconnected");
    Ok(())
}

/// Read until the peer goes away. Message content is ignored.
async fn watch_liveness<R, E>(mut stream: R)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(_)) => {
                debug!("observer sent close frame");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "observer read failed");
                return;
            }
        }
    }
    debug!("observer stream ended");
}

/// Drain the mailbox in order onto the sink, closing the sink when done.
async fn deliver<S>(mut mailbox: Mailbox, mut sink: S, observer_id: ObserverId)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(message) = mailbox.recv().await {
        if let Err(e) = sink.send(Message::Text(message.to_string())).await {
            debug!(observer_id = %observer_id, error = %e, "observer write failed");
            break;
        }
    }

    let _ = sink.close().await;
}
