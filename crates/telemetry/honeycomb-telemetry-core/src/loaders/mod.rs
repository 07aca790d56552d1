//! Telemetry loaders: raw text in, time-sorted [`FrameSet`] out.

mod csv;
mod json;
mod rksml;

pub use csv::CsvChannelLoader;
pub use json::JsonFrameLoader;
pub use rksml::RksmlLoader;

use crate::error::LoadError;
use crate::frames::{merge_frame_sets, Frame, FrameSet, FrameStore};

pub trait TelemetryLoader {
    /// Parse one source. Fails instead of returning partially parsed data.
    fn parse(&self, raw: &str) -> Result<FrameSet, LoadError>;

    /// Parse and build the frame store in one step.
    fn load_store(&self, raw: &str) -> Result<FrameStore, LoadError> {
        Ok(self.parse(raw)?.into_store()?)
    }

    /// Parse several sources of the same stream and merge them by time.
    fn parse_all(&self, sources: &[&str]) -> Result<FrameSet, LoadError> {
        let sets = sources
            .iter()
            .map(|raw| self.parse(raw))
            .collect::<Result<Vec<_>, _>>()?;
        merge_frame_sets(sets)
    }
}

/// Stable sort by time; frames sharing a timestamp keep their source order.
pub(crate) fn sort_frames(frames: &mut [Frame]) {
    frames.sort_by(|a, b| a.time.total_cmp(&b.time));
}
