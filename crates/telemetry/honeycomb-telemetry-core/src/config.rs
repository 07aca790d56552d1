//! Configuration for telemetry playback and prefetch.
//!
//! Everything is passed explicitly: a [`SessionConfig`] is built once by the viewer
//! and handed down to animators and loaders, which may apply their own overrides.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::interp::RotationMap;

/// Options recognised by [`crate::TelemetryAnimator`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AnimatorConfig {
    /// Interpolate between the bracketing frames when time falls strictly between them.
    pub interpolate: bool,
    /// Accumulate state across frames. When false, only the frames at the cursor time contribute.
    pub continuous: bool,
    /// Quaternion field groups that are slerped instead of lerped component-wise.
    pub rotation_maps: Vec<RotationMap>,
    /// Opaque passthrough describing the time units of the store.
    pub time_format: Option<String>,
    /// Forward steps merged one by one before falling back to binary search + rebuild.
    pub max_forward_scan: usize,
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self {
            interpolate: true,
            continuous: true,
            rotation_maps: Vec::new(),
            time_format: None,
            max_forward_scan: 64,
        }
    }
}

/// Window and concurrency tunables for [`crate::LookaheadAnimator`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LookaheadConfig {
    /// Time units ahead of the playhead whose payloads are loaded eagerly.
    pub look_ahead: f64,
    /// Time units behind the playhead whose payloads stay resident.
    pub look_back: f64,
    /// Concurrent payload loads.
    pub max_jobs: usize,
}

impl Default for LookaheadConfig {
    fn default() -> Self {
        Self {
            look_ahead: 5000.0,
            look_back: 1000.0,
            max_jobs: 6,
        }
    }
}

/// How payload loaders reach their data.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchOptions {
    /// Directory that relative payload references are resolved against.
    pub base_dir: Option<PathBuf>,
    /// Per-request timeout.
    #[serde(with = "duration_ms")]
    pub timeout: Option<Duration>,
    /// Extra key/value pairs forwarded to custom loaders (auth tokens, headers).
    pub headers: Vec<(String, String)>,
}

impl FetchOptions {
    /// Apply a per-loader override on top of session-wide options.
    /// Fields set in `other` win; headers are appended and replace same-named entries.
    pub fn with_override(&self, other: &FetchOptions) -> FetchOptions {
        let mut headers = self.headers.clone();
        for (name, value) in &other.headers {
            match headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
                Some(slot) => slot.1 = value.clone(),
                None => headers.push((name.clone(), value.clone())),
            }
        }
        FetchOptions {
            base_dir: other.base_dir.clone().or_else(|| self.base_dir.clone()),
            timeout: other.timeout.or(self.timeout),
            headers,
        }
    }
}

/// Top-level configuration owned by the viewer session.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub animator: AnimatorConfig,
    pub lookahead: LookaheadConfig,
    pub fetch: FetchOptions,
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn animator_defaults() {
        let cfg = AnimatorConfig::default();
        assert!(cfg.interpolate);
        assert!(cfg.continuous);
        assert!(cfg.rotation_maps.is_empty());
    }

    #[test]
    fn session_config_from_partial_json() {
        let cfg: SessionConfig = serde_json::from_str(
            r#"{ "animator": { "interpolate": false, "timeFormat": "sclk" },
                 "fetch": { "timeout": 2500 } }"#,
        )
        .unwrap();
        assert!(!cfg.animator.interpolate);
        assert_eq!(cfg.animator.time_format.as_deref(), Some("sclk"));
        assert_eq!(cfg.fetch.timeout, Some(Duration::from_millis(2500)));
        assert_eq!(cfg.lookahead, LookaheadConfig::default());
    }

    #[test]
    fn fetch_override_wins_per_field() {
        let session = FetchOptions {
            base_dir: Some("/data".into()),
            timeout: Some(Duration::from_secs(5)),
            headers: vec![("Authorization".into(), "a".into())],
        };
        let loader = FetchOptions {
            base_dir: None,
            timeout: Some(Duration::from_secs(1)),
            headers: vec![
                ("authorization".into(), "b".into()),
                ("X-Mission".into(), "m2020".into()),
            ],
        };
        let merged = session.with_override(&loader);
        assert_eq!(merged.base_dir, Some(PathBuf::from("/data")));
        assert_eq!(merged.timeout, Some(Duration::from_secs(1)));
        assert_eq!(
            merged.headers,
            vec![
                ("Authorization".to_string(), "b".to_string()),
                ("X-Mission".to_string(), "m2020".to_string())
            ]
        );
    }
}
