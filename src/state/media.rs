//! Per-round media manifest and client preload progress.
//!
//! Progress is advisory: it is reported to the host and players but never holds back a
//! phase transition.

use std::time::SystemTime;

use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::pack::Round;

/// Estimated size of an image asset, in bytes.
pub const MEDIA_SIZE_IMAGE: u64 = 500_000;
/// Estimated size of an audio asset, in bytes.
pub const MEDIA_SIZE_AUDIO: u64 = 3_000_000;
/// Estimated size of a video asset, in bytes.
pub const MEDIA_SIZE_VIDEO: u64 = 10_000_000;
/// Estimated size of any other asset, in bytes.
pub const MEDIA_SIZE_DEFAULT: u64 = 100_000;
/// Percentage reported by a client that loaded everything.
pub const PERCENT_COMPLETE: u8 = 100;

/// Board position a media asset belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct QuestionRef {
    /// Index of the theme inside the round.
    pub theme_index: usize,
    /// Pack price of the question.
    pub price: i32,
}

/// One asset clients should preload for the round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MediaItem {
    /// Synthetic identifier used by `START_MEDIA`.
    pub id: String,
    /// Media kind.
    #[serde(rename = "type")]
    pub media_type: String,
    /// Asset location.
    pub url: String,
    /// Estimated size in bytes.
    pub size: u64,
    /// Question the asset belongs to.
    pub question_ref: QuestionRef,
}

/// Preload state reported by one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLoadStatus {
    /// Reporting player.
    pub user_id: Uuid,
    /// Assets loaded so far.
    pub loaded: u32,
    /// Assets the client expects to load.
    pub total: u32,
    /// Bytes loaded so far.
    pub bytes_loaded: u64,
    /// Completion percentage.
    pub percent: u8,
    /// Whether the client finished preloading.
    pub complete: bool,
    /// Last report time.
    pub updated_at: SystemTime,
}

impl MediaLoadStatus {
    fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            loaded: 0,
            total: 0,
            bytes_loaded: 0,
            percent: 0,
            complete: false,
            updated_at: SystemTime::now(),
        }
    }
}

/// Aggregate preload progress of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct MediaProgress {
    /// Mean completion percentage across registered clients.
    pub percent: u8,
    /// Clients done preloading.
    pub clients_ready: usize,
    /// Registered clients.
    pub total_clients: usize,
}

/// Tracks the manifest of the current round and each client's preload state.
#[derive(Debug, Default)]
pub struct MediaTracker {
    round_number: usize,
    manifest: Vec<MediaItem>,
    total_size: u64,
    clients: IndexMap<Uuid, MediaLoadStatus>,
}

impl MediaTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Round the manifest was built for.
    pub fn round_number(&self) -> usize {
        self.round_number
    }

    /// Forget the manifest and every client for a new round.
    pub fn reset(&mut self, round_number: usize) {
        self.round_number = round_number;
        self.manifest.clear();
        self.total_size = 0;
        self.clients.clear();
    }

    /// Enumerate the non-text media of `round`.
    pub fn build_manifest(&mut self, round: &Round) {
        self.manifest.clear();
        self.total_size = 0;

        for (theme_index, theme) in round.themes.iter().enumerate() {
            for question in theme.questions.iter().filter(|q| q.has_media()) {
                let item = MediaItem {
                    id: Uuid::new_v4().to_string(),
                    media_type: question.media_type.clone(),
                    url: question.media_url.clone(),
                    size: estimate_media_size(&question.media_type),
                    question_ref: QuestionRef {
                        theme_index,
                        price: question.price,
                    },
                };
                self.total_size += item.size;
                self.manifest.push(item);
            }
        }
    }

    /// Assets of the round.
    pub fn manifest(&self) -> &[MediaItem] {
        &self.manifest
    }

    /// Sum of the estimated asset sizes.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Whether the round has anything to preload.
    pub fn has_media(&self) -> bool {
        !self.manifest.is_empty()
    }

    /// Start tracking a client. With an empty manifest the client is immediately complete.
    pub fn register_client(&mut self, user_id: Uuid) {
        let mut status = MediaLoadStatus::empty(user_id);
        status.total = u32::try_from(self.manifest.len()).unwrap_or(u32::MAX);
        status.complete = self.manifest.is_empty();
        if status.complete {
            status.percent = PERCENT_COMPLETE;
        }
        self.clients.insert(user_id, status);
    }

    /// Record a progress report. Returns `false` for clients that were never registered.
    pub fn update_progress(
        &mut self,
        user_id: Uuid,
        loaded: u32,
        total: u32,
        bytes_loaded: u64,
        percent: u8,
    ) -> bool {
        let Some(status) = self.clients.get_mut(&user_id) else {
            return false;
        };
        status.loaded = loaded;
        status.total = total;
        status.bytes_loaded = bytes_loaded;
        status.percent = percent.min(PERCENT_COMPLETE);
        status.updated_at = SystemTime::now();
        true
    }

    /// Record that a client finished preloading. Returns `false` for unregistered clients.
    pub fn mark_complete(&mut self, user_id: Uuid, loaded_count: u32) -> bool {
        let Some(status) = self.clients.get_mut(&user_id) else {
            return false;
        };
        status.loaded = loaded_count;
        status.complete = true;
        status.percent = PERCENT_COMPLETE;
        status.updated_at = SystemTime::now();
        true
    }

    /// Whether every registered client is complete. True without clients.
    pub fn all_clients_ready(&self) -> bool {
        self.clients.values().all(|status| status.complete)
    }

    /// Clients still preloading, in registration order.
    pub fn pending_clients(&self) -> Vec<Uuid> {
        self.clients
            .values()
            .filter(|status| !status.complete)
            .map(|status| status.user_id)
            .collect()
    }

    /// Mean percentage, ready clients and registered clients.
    pub fn overall_progress(&self) -> MediaProgress {
        let total_clients = self.clients.len();
        if total_clients == 0 {
            return MediaProgress {
                percent: PERCENT_COMPLETE,
                clients_ready: 0,
                total_clients: 0,
            };
        }

        let percent_sum: usize = self
            .clients
            .values()
            .map(|status| usize::from(status.percent))
            .sum();
        let clients_ready = self.clients.values().filter(|s| s.complete).count();
        MediaProgress {
            percent: u8::try_from(percent_sum / total_clients).unwrap_or(PERCENT_COMPLETE),
            clients_ready,
            total_clients,
        }
    }

    /// Manifest entry of the question at `theme_index` priced `price` in the pack.
    pub fn find_media_by_question(&self, theme_index: usize, price: i32) -> Option<&MediaItem> {
        self.manifest.iter().find(|item| {
            item.question_ref.theme_index == theme_index && item.question_ref.price == price
        })
    }
}

/// Size estimate for a media kind.
pub fn estimate_media_size(media_type: &str) -> u64 {
    match media_type {
        "image" => MEDIA_SIZE_IMAGE,
        "audio" => MEDIA_SIZE_AUDIO,
        "video" => MEDIA_SIZE_VIDEO,
        _ => MEDIA_SIZE_DEFAULT,
    }
}
