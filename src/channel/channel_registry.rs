use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use super::{channel_error::ChannelError, media_channel::MediaChannel, media_event::CloseReason};

/// Live channels keyed by call id.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, Arc<MediaChannel>>>,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, channel: Arc<MediaChannel>) -> Result<(), ChannelError> {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        let call_id = channel.call_id().to_string();
        if channels.contains_key(&call_id) {
            return Err(ChannelError::DuplicateCallId(call_id));
        }
        channels.insert(call_id, channel);
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, call_id: &str) -> bool {
        self.channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(call_id)
    }

    #[must_use]
    pub fn get(&self, call_id: &str) -> Option<Arc<MediaChannel>> {
        self.channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(call_id)
            .cloned()
    }

    pub fn remove(&self, call_id: &str) -> Option<Arc<MediaChannel>> {
        self.channels
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(call_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn call_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Drops entries whose channel closed itself. Returns how many went.
    pub fn prune_closed(&self) -> usize {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        let before = channels.len();
        channels.retain(|_, c| !c.is_channel_closed());
        before - channels.len()
    }

    /// Empties the registry, closing every channel outside the lock.
    pub fn close_all(&self, reason: &CloseReason) {
        let drained: Vec<Arc<MediaChannel>> = self
            .channels
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, c)| c)
            .collect();
        for channel in drained {
            channel.close(reason.clone());
        }
    }
}
