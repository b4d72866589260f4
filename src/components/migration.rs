// One-time transfer of push-era tags into the channel tag set

use parking_lot::Mutex;

use super::platform::ChannelService;
use super::settings::PushSettings;

/// Longest tag the channel accepts
pub const MAX_TAG_LENGTH: usize = 127;

/// Trim tags, drop empty and oversized ones, and remove duplicates keeping first occurrence
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let trimmed = tag.trim();
        if trimmed.is_empty() || trimmed.chars().count() > MAX_TAG_LENGTH {
            tracing::warn!(tag = %tag, "Dropping invalid tag");
            continue;
        }
        if !normalized.iter().any(|existing| existing == trimmed) {
            normalized.push(trimmed.to_string());
        }
    }
    normalized
}

/// Moves legacy tags onto the channel at most once per install
pub struct TagMigrator {
    settings: PushSettings,
    guard: Mutex<()>,
}

impl TagMigrator {
    pub fn new(settings: PushSettings) -> Self {
        Self {
            settings,
            guard: Mutex::new(()),
        }
    }

    pub fn is_migrated(&self) -> bool {
        self.settings.tags_migrated()
    }

    /// Add `legacy_tags` to the channel unless migration already ran.
    /// Returns true when this call performed the migration.
    pub fn migrate_if_needed(&self, legacy_tags: &[String], channel: &dyn ChannelService) -> bool {
        let _guard = self.guard.lock();
        if self.settings.tags_migrated() {
            tracing::debug!("Legacy tags already migrated");
            return false;
        }

        if !legacy_tags.is_empty() {
            tracing::info!(count = legacy_tags.len(), "Migrating legacy tags to channel");
            channel.add_tags(legacy_tags);
        }

        self.settings.set_tags_migrated(true);
        true
    }

    /// Migrate the tags stored under the legacy key, then drop the key
    pub fn migrate_from_settings(&self, channel: &dyn ChannelService) -> bool {
        let legacy_tags = normalize_tags(&self.settings.legacy_tags());
        let migrated = self.migrate_if_needed(&legacy_tags, channel);
        if migrated {
            self.settings.remove_legacy_tags();
        }
        migrated
    }
}
