use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Idle,
    Queued,
    Processing,
    Done,
    Failed,
}

/// Predicted gain of re-encoding an item at the configured per-height rate.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ratio {
    pub target_bytes: i64,
    pub savings_bytes: i64,
    pub savings_pct: f64,
}

/// Metadata extracted by the external prober. Applied onto an [`Item`] after
/// scans and successful transcodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaMetadata {
    pub duration_sec: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub video_codec: Option<String>,
    pub audio_codecs: Vec<String>,
    pub subtitle_langs: Vec<String>,
    pub encoded_by: String,
    pub encoded_by_spacesaver: bool,
}

/// One tracked media file, owned by exactly one [`super::Entry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub entry_id: String,
    pub path: String,
    pub size_bytes: u64,
    /// File modification time in whole seconds since the epoch.
    pub mtime: i64,
    #[serde(default)]
    pub duration_sec: f64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub fps: f64,
    #[serde(default)]
    pub video_codec: Option<String>,
    #[serde(default)]
    pub audio_codecs: Vec<String>,
    #[serde(default)]
    pub subtitle_langs: Vec<String>,
    #[serde(default)]
    pub encoded_by: String,
    #[serde(default)]
    pub encoded_by_spacesaver: bool,
    /// Set once the item has been probed at least once. Items with a stale
    /// fingerprint or no `scanAt` are re-probed on the next scan.
    #[serde(default)]
    pub scan_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub last_job_id: Option<String>,
    #[serde(default)]
    pub last_error: String,
    #[serde(default)]
    pub last_transcode_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transcode_count: u32,
    /// `"{sizeBytes}:{mtime}"`, the cheap content-state identity.
    pub source_fingerprint: String,
    #[serde(default)]
    pub ratio: Ratio,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

impl Item {
    /// A freshly discovered, never-probed item.
    pub fn discovered(
        id: String,
        entry_id: String,
        path: String,
        size_bytes: u64,
        mtime: i64,
        fingerprint: String,
    ) -> Self {
        Self {
            id,
            entry_id,
            path,
            size_bytes,
            mtime,
            duration_sec: 0.0,
            width: 0,
            height: 0,
            fps: 0.0,
            video_codec: None,
            audio_codecs: Vec::new(),
            subtitle_langs: Vec::new(),
            encoded_by: String::new(),
            encoded_by_spacesaver: false,
            scan_at: None,
            ready: false,
            status: ItemStatus::Idle,
            last_job_id: None,
            last_error: String::new(),
            last_transcode_at: None,
            transcode_count: 0,
            source_fingerprint: fingerprint,
            ratio: Ratio::default(),
            extras: Map::new(),
        }
    }

    pub fn apply_metadata(&mut self, meta: &MediaMetadata) {
        self.duration_sec = meta.duration_sec;
        self.width = meta.width;
        self.height = meta.height;
        self.fps = meta.fps;
        self.video_codec = meta.video_codec.clone();
        self.audio_codecs = meta.audio_codecs.clone();
        self.subtitle_langs = meta.subtitle_langs.clone();
        self.encoded_by = meta.encoded_by.clone();
        self.encoded_by_spacesaver = meta.encoded_by_spacesaver;
    }
}
