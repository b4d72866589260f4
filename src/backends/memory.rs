// In-memory collaborators: settings store and channel

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::components::PushResult;
use crate::components::platform::ChannelService;
use crate::components::settings::KeyValueStore;

/// Process-lifetime settings store
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: &str, value: Value) -> PushResult<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> PushResult<()> {
        self.values.remove(key);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ChannelState {
    channel_id: Option<String>,
    tags: Vec<String>,
    opt_in: bool,
    background: bool,
}

/// Channel kept in memory, used when no remote channel service is wired in
#[derive(Debug, Default)]
pub struct MemoryChannel {
    state: RwLock<ChannelState>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel_id(channel_id: impl Into<String>) -> Self {
        let channel = Self::default();
        channel.state.write().channel_id = Some(channel_id.into());
        channel
    }

    pub fn set_channel_id(&self, channel_id: Option<String>) {
        self.state.write().channel_id = channel_id;
    }

    pub fn opt_in(&self) -> bool {
        self.state.read().opt_in
    }

    pub fn background(&self) -> bool {
        self.state.read().background
    }
}

impl ChannelService for MemoryChannel {
    fn channel_id(&self) -> Option<String> {
        self.state.read().channel_id.clone()
    }

    fn tags(&self) -> Vec<String> {
        self.state.read().tags.clone()
    }

    fn add_tags(&self, tags: &[String]) {
        let mut state = self.state.write();
        for tag in tags {
            if !state.tags.contains(tag) {
                state.tags.push(tag.clone());
            }
        }
    }

    fn update_push_flags(&self, opt_in: bool, background: bool) {
        let mut state = self.state.write();
        state.opt_in = opt_in;
        state.background = background;
    }
}
