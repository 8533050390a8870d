//! Live pipeline progress, fanned out per asset.
//!
//! Subscribers register interest in one asset id and receive every stage the
//! pipeline publishes for it. Channels are created on first subscribe and
//! dropped together with their last subscriber, so finished uploads never
//! leave entries behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Orchestrator states, in the order they are reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PipelineStage {
    Allocated,
    SourceSaved,
    DimensionsProbed { width: u32, height: u32 },
    LadderPlanned { tiers: Vec<String> },
    TierReady { tier: String },
    TierSkipped { tier: String, reason: String },
    DefaultPosterReady,
    ManifestReady,
    Aborted { reason: String },
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStage::ManifestReady | PipelineStage::Aborted { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageEvent {
    pub asset_id: String,
    pub stage: PipelineStage,
    pub at: DateTime<Utc>,
}

type Channels = Mutex<HashMap<String, broadcast::Sender<StageEvent>>>;

#[derive(Debug, Clone, Default)]
pub struct StatusHub {
    channels: Arc<Channels>,
}

impl StatusHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, asset_id: &str) -> StatusSubscription {
        let mut channels = self.channels.lock().unwrap();
        let receiver = channels
            .entry(asset_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        StatusSubscription {
            asset_id: asset_id.to_string(),
            receiver: Some(receiver),
            channels: Arc::clone(&self.channels),
        }
    }

    /// Delivers `stage` to current subscribers of `asset_id`. Publishing for
    /// an asset nobody watches does nothing.
    pub fn publish(&self, asset_id: &str, stage: PipelineStage) {
        let channels = self.channels.lock().unwrap();
        if let Some(sender) = channels.get(asset_id) {
            let event = StageEvent {
                asset_id: asset_id.to_string(),
                stage,
                at: Utc::now(),
            };
            let _ = sender.send(event);
        }
    }

    /// Number of assets that currently have at least one subscriber.
    pub fn tracked(&self) -> usize {
        self.channels.lock().unwrap().len()
    }
}

#[derive(Debug)]
pub struct StatusSubscription {
    asset_id: String,
    receiver: Option<broadcast::Receiver<StageEvent>>,
    channels: Arc<Channels>,
}

impl StatusSubscription {
    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    /// Waits for the next stage. Returns `None` once the hub is gone.
    /// Events missed because the subscriber lagged are skipped.
    pub async fn next(&mut self) -> Option<StageEvent> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_next(&mut self) -> Option<StageEvent> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        drop(self.receiver.take());
        let Ok(mut channels) = self.channels.lock() else {
            return;
        };
        let unused = channels
            .get(&self.asset_id)
            .is_some_and(|sender| sender.receiver_count() == 0);
        if unused {
            channels.remove(&self.asset_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_stages() {
        let hub = StatusHub::new();
        let mut sub = hub.subscribe("asset-1");
        hub.publish("asset-1", PipelineStage::Allocated);
        hub.publish("asset-2", PipelineStage::Allocated);
        hub.publish("asset-1", PipelineStage::ManifestReady);

        let first = sub.next().await.unwrap();
        assert_eq!(first.asset_id, "asset-1");
        assert_eq!(first.stage, PipelineStage::Allocated);
        let second = sub.next().await.unwrap();
        assert!(second.stage.is_terminal());
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn entries_are_removed_with_last_subscriber() {
        let hub = StatusHub::new();
        let first = hub.subscribe("asset-1");
        let second = hub.subscribe("asset-1");
        assert_eq!(hub.tracked(), 1);
        drop(first);
        assert_eq!(hub.tracked(), 1);
        drop(second);
        assert_eq!(hub.tracked(), 0);
    }

    #[test]
    fn stages_serialize_with_a_tag() {
        let stage = PipelineStage::TierSkipped {
            tier: "480p".into(),
            reason: "transcode failed".into(),
        };
        let json = serde_json::to_value(&stage).unwrap();
        assert_eq!(json["stage"], "tier_skipped");
        assert_eq!(json["tier"], "480p");
    }

    #[test]
    fn publishing_without_subscribers_creates_nothing() {
        let hub = StatusHub::new();
        hub.publish("ghost", PipelineStage::SourceSaved);
        assert_eq!(hub.tracked(), 0);
    }
}
