//! Plumbing shared by the device channels

use bytes::Bytes;
use marionette_bus::PubSubClient;
use marionette_core::QoS;
use std::future::Future;
use std::sync::{Arc, Weak};
use tracing::warn;

use crate::error::Result;

/// QoS used for device subscriptions and state broadcasts
pub const DEVICE_QOS: QoS = QoS::AtLeastOnce;

/// Subscribe `on_message` to `topic` on behalf of `target`.
///
/// The handler holds only a weak reference, so a dropped channel stops
/// reacting instead of being kept alive by the router.
pub(crate) async fn bind<T, F, Fut>(
    bus: &PubSubClient,
    topic: &str,
    target: &Arc<T>,
    on_message: F,
) -> Result<()>
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let weak: Weak<T> = Arc::downgrade(target);
    bus.subscribe(
        topic,
        move |_topic, payload| {
            let pending = weak.upgrade().map(|target| on_message(target, payload));
            async move {
                match pending {
                    Some(fut) => fut.await,
                    None => Ok(()),
                }
            }
        },
        DEVICE_QOS,
    )
    .await?;
    Ok(())
}

/// Parse a payload, logging and swallowing malformed input
pub(crate) fn parse_or_drop<T>(
    topic: &str,
    payload: &[u8],
    parse: impl FnOnce(&[u8]) -> marionette_core::Result<T>,
) -> Option<T> {
    match parse(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Dropping malformed payload on '{}': {}", topic, e);
            None
        }
    }
}
