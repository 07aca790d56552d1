use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::{sort_frames, TelemetryLoader};
use crate::error::LoadError;
use crate::frames::{Frame, FrameMetadata, FrameSet};
use honeycomb_api_core::StateRecord;

/// Frame documents of the form
/// `{ "timeFormat": "...", "frames": [{ "time": 0, "state": { ... } }] }`.
#[derive(Clone, Debug, Default)]
pub struct JsonFrameLoader {
    /// Recorded as [`FrameMetadata::source`].
    pub source: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    time_format: Option<String>,
    frames: Vec<RawFrame>,
}

#[derive(Deserialize)]
struct RawFrame {
    time: f64,
    state: JsonValue,
}

impl JsonFrameLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
        }
    }
}

impl TelemetryLoader for JsonFrameLoader {
    fn parse(&self, raw: &str) -> Result<FrameSet, LoadError> {
        let doc: RawDocument = serde_json::from_str(raw)
            .map_err(|e| LoadError::parse(e.line(), e.to_string()))?;
        let time_format = doc.time_format.ok_or_else(|| LoadError::MissingHeader {
            field: "timeFormat".into(),
        })?;

        let mut frames = Vec::with_capacity(doc.frames.len());
        for (index, raw) in doc.frames.into_iter().enumerate() {
            if !raw.time.is_finite() {
                return Err(LoadError::InvalidFrame {
                    index,
                    reason: format!("non-finite time {}", raw.time),
                });
            }
            let state = StateRecord::from_json(raw.state)
                .map_err(|reason| LoadError::InvalidFrame { index, reason })?;
            frames.push(Frame::new(raw.time, state));
        }
        sort_frames(&mut frames);

        Ok(FrameSet {
            frames,
            metadata: FrameMetadata {
                time_format: Some(time_format),
                source: self.source.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_sorts_frames() {
        let set = JsonFrameLoader::with_source("rover.json")
            .parse(
                r#"{ "timeFormat": "ms", "frames": [
                    { "time": 20, "state": { "a": 2 } },
                    { "time": 10, "state": { "a": 1, "pose": { "x": 0.5 } } },
                    { "time": 20, "state": { "b": true } }
                ] }"#,
            )
            .unwrap();
        let times: Vec<f64> = set.frames.iter().map(|f| f.time).collect();
        assert_eq!(times, vec![10.0, 20.0, 20.0]);
        assert_eq!(set.frames[1].state.number("a"), Some(2.0));
        assert!(set.frames[2].state.contains_key("b"));
        assert_eq!(set.metadata.time_format.as_deref(), Some("ms"));
        assert_eq!(set.metadata.source.as_deref(), Some("rover.json"));
    }

    #[test]
    fn time_format_is_mandatory() {
        let err = JsonFrameLoader::new()
            .parse(r#"{ "frames": [] }"#)
            .unwrap_err();
        assert_eq!(
            err,
            LoadError::MissingHeader {
                field: "timeFormat".into()
            }
        );
    }

    #[test]
    fn malformed_documents_are_rejected() {
        let loader = JsonFrameLoader::new();
        assert!(matches!(
            loader.parse("{ \"timeFormat\": \"ms\",\n \"frames\": [ { \"time\": 1 } ] }"),
            Err(LoadError::Parse { line: 2, .. })
        ));
        assert!(matches!(
            loader.parse(r#"{ "timeFormat": "ms", "frames": [ { "time": 1, "state": 3 } ] }"#),
            Err(LoadError::InvalidFrame { index: 0, .. })
        ));
    }
}
