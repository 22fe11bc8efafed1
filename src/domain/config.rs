use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_BASELINE_ARGS: &str = "-f av_mkv -e x265_10bit --encoder-preset medium -q 20 \
     --audio-lang-list eng --first-audio -E copy --subtitle-lang-list eng --first-subtitle \
     --crop 0:0:0:0";

/// Coordinator-wide encoder configuration.
///
/// Height keys in the target maps are stored as strings (`"1080"`) to match
/// the persisted document; [`crate::catalog::compute_ratio`] parses them when
/// selecting a bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_baseline_args")]
    pub baseline_args: String,
    #[serde(default)]
    pub ffprobe_path: String,
    #[serde(default = "default_target_mb_per_min")]
    pub target_mb_per_min_by_height: BTreeMap<String, f64>,
    #[serde(default)]
    pub target_samples_by_height: BTreeMap<String, Vec<f64>>,
    #[serde(default = "default_lang_list")]
    pub audio_lang_list: Vec<String>,
    #[serde(default = "default_lang_list")]
    pub subtitle_lang_list: Vec<String>,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

fn default_baseline_args() -> String {
    DEFAULT_BASELINE_ARGS.to_string()
}

pub fn default_target_mb_per_min() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("480".to_string(), 6.0),
        ("720".to_string(), 10.0),
        ("1080".to_string(), 16.0),
        ("2160".to_string(), 32.0),
    ])
}

fn default_lang_list() -> Vec<String> {
    vec!["eng".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            baseline_args: default_baseline_args(),
            ffprobe_path: String::new(),
            target_mb_per_min_by_height: default_target_mb_per_min(),
            target_samples_by_height: BTreeMap::new(),
            audio_lang_list: default_lang_list(),
            subtitle_lang_list: default_lang_list(),
            extras: Map::new(),
        }
    }
}

impl ServerConfig {
    /// Back-fill fields a hand-edited or legacy document may have blanked.
    pub fn backfill(&mut self) {
        if self.baseline_args.trim().is_empty() {
            self.baseline_args = default_baseline_args();
        }
        if self.target_mb_per_min_by_height.is_empty() {
            self.target_mb_per_min_by_height = default_target_mb_per_min();
        }
    }
}

/// Argument tokens the encoder invocation reserves for itself. Baseline and
/// per-entry fragments carrying any of these would fight the worker over
/// input/output placement, so they are rejected at configuration time.
const RESERVED_ARG_TOKENS: [&str; 4] = ["-i", "--input", "-o", "--output"];

pub fn find_reserved_arg_token(args: &str) -> Option<&'static str> {
    args.split_whitespace()
        .find_map(|tok| RESERVED_ARG_TOKENS.into_iter().find(|r| tok == *r))
}
