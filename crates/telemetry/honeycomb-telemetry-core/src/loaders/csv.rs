//! Channel-based telemetry: one `time,channel,value` sample per row.

use super::TelemetryLoader;
use crate::error::LoadError;
use crate::frames::{Frame, FrameMetadata, FrameSet};
use honeycomb_api_core::{FieldPath, StateRecord, StateValue};

const HEADER: [&str; 3] = ["time", "channel", "value"];

/// Groups samples sharing a timestamp into one frame. Channels are dot paths, so
/// `arm.joint_1` lands in a nested record. Blank lines and `#` comments are skipped.
#[derive(Clone, Debug, Default)]
pub struct CsvChannelLoader {
    pub time_format: Option<String>,
}

impl CsvChannelLoader {
    pub fn new() -> Self {
        Self::default()
    }
}

fn parse_value(raw: &str) -> StateValue {
    let raw = raw.trim();
    if let Ok(number) = raw.parse::<f64>() {
        return StateValue::Number(number);
    }
    match raw {
        "true" => StateValue::Bool(true),
        "false" => StateValue::Bool(false),
        _ => StateValue::text(raw.trim_matches('"')),
    }
}

impl TelemetryLoader for CsvChannelLoader {
    fn parse(&self, raw: &str) -> Result<FrameSet, LoadError> {
        let mut rows = raw
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

        let header_ok = rows.next().is_some_and(|(_, header)| {
            header
                .split(',')
                .map(str::trim)
                .eq(HEADER.iter().copied())
        });
        if !header_ok {
            return Err(LoadError::MissingHeader {
                field: HEADER.join(","),
            });
        }

        let mut samples = Vec::new();
        for (line, row) in rows {
            let mut cols = row.splitn(3, ',');
            let (Some(time), Some(channel), Some(value)) = (cols.next(), cols.next(), cols.next())
            else {
                return Err(LoadError::parse(line, "expected 3 columns"));
            };
            let time = time
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|t| t.is_finite())
                .ok_or_else(|| LoadError::parse(line, format!("invalid time '{}'", time.trim())))?;
            let channel = FieldPath::parse(channel.trim())
                .map_err(|e| LoadError::parse(line, format!("invalid channel: {e}")))?;
            samples.push((time, channel, parse_value(value)));
        }
        // stable: samples sharing a time keep file order, so later rows win
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut frames: Vec<Frame> = Vec::new();
        for (time, channel, value) in samples {
            if frames.last().map_or(true, |frame| frame.time != time) {
                frames.push(Frame::new(time, StateRecord::new()));
            }
            if let Some(frame) = frames.last_mut() {
                frame.state.set_path(&channel, value);
            }
        }

        Ok(FrameSet {
            frames,
            metadata: FrameMetadata {
                time_format: self.time_format.clone(),
                source: None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_rows_by_time() {
        let raw = "# exported from ground tools\n\
                   time,channel,value\n\
                   2.0,arm.joint_1,0.5\n\
                   1.0,mode,DRIVE\n\
                   2.0,arm.joint_2,-0.25\n\
                   1.0,heater,true\n";
        let set = CsvChannelLoader::new().parse(raw).unwrap();
        assert_eq!(set.frames.len(), 2);
        assert_eq!(set.frames[0].time, 1.0);
        assert_eq!(set.frames[0].state.get("mode"), Some(&StateValue::text("DRIVE")));
        assert_eq!(set.frames[0].state.get("heater"), Some(&StateValue::Bool(true)));
        let arm = set.frames[1].state.get("arm").and_then(StateValue::as_record).unwrap();
        assert_eq!(arm.number("joint_1"), Some(0.5));
        assert_eq!(arm.number("joint_2"), Some(-0.25));
    }

    #[test]
    fn header_is_mandatory() {
        let err = CsvChannelLoader::new().parse("1.0,a,1\n").unwrap_err();
        assert!(matches!(err, LoadError::MissingHeader { .. }));
    }

    #[test]
    fn bad_rows_report_line_numbers() {
        let raw = "time,channel,value\n1.0,a,1\nsoon,a,2\n";
        assert!(matches!(
            CsvChannelLoader::new().parse(raw),
            Err(LoadError::Parse { line: 3, .. })
        ));
        let raw = "time,channel,value\n1.0,a\n";
        assert!(matches!(
            CsvChannelLoader::new().parse(raw),
            Err(LoadError::Parse { line: 2, .. })
        ));
    }
}
