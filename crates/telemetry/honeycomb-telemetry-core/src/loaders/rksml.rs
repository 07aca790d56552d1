//! Robot Kinematics (RKSML) reader.
//!
//! Supported subset:
//! ```text
//! <Node_Path>
//!   <Node RobotKinematicsTime="1.0">
//!     <Knot Name="ARM_1">0.25</Knot>
//!   </Node>
//! </Node_Path>
//! ```
//! Other elements and attributes are ignored but must still nest correctly.

use super::{sort_frames, TelemetryLoader};
use crate::error::LoadError;
use crate::frames::{Frame, FrameMetadata, FrameSet, FrameStore};
use honeycomb_api_core::StateRecord;

const NODE: &str = "Node";
const KNOT: &str = "Knot";
const TIME_ATTR: &str = "RobotKinematicsTime";
const NAME_ATTR: &str = "Name";

#[derive(Clone, Debug, Default)]
pub struct RksmlLoader {
    /// Prepend the backfill frame when building a store.
    pub backfill: bool,
}

impl RksmlLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backfill(backfill: bool) -> Self {
        Self { backfill }
    }
}

impl TelemetryLoader for RksmlLoader {
    fn parse(&self, raw: &str) -> Result<FrameSet, LoadError> {
        let mut parser = Parser::default();
        for (line, token) in tokenize(raw)? {
            parser.feed(line, token)?;
        }
        let mut frames = parser.finish()?;
        sort_frames(&mut frames);
        Ok(FrameSet {
            frames,
            metadata: FrameMetadata::default(),
        })
    }

    fn load_store(&self, raw: &str) -> Result<FrameStore, LoadError> {
        let store = self.parse(raw)?.into_store()?;
        Ok(if self.backfill {
            store.with_backfill()
        } else {
            store
        })
    }
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Open {
        name: &'a str,
        attrs: &'a str,
        self_closing: bool,
    },
    Close(&'a str),
    Text(&'a str),
}

fn newlines(s: &str) -> usize {
    s.bytes().filter(|b| *b == b'\n').count()
}

/// Split markup into tags and trimmed text runs, each tagged with its starting line.
fn tokenize(src: &str) -> Result<Vec<(usize, Token<'_>)>, LoadError> {
    let mut tokens = Vec::new();
    let mut rest = src;
    let mut line = 1;

    while !rest.is_empty() {
        let Some(open) = rest.find('<') else {
            let text = rest.trim();
            if !text.is_empty() {
                let leading = rest.len() - rest.trim_start().len();
                tokens.push((line + newlines(&rest[..leading]), Token::Text(text)));
            }
            break;
        };
        if open > 0 {
            let text = &rest[..open];
            let leading = newlines(&text[..text.len() - text.trim_start().len()]);
            if !text.trim().is_empty() {
                tokens.push((line + leading, Token::Text(text.trim())));
            }
            line += newlines(text);
            rest = &rest[open..];
        }

        if rest.starts_with("<!--") {
            let end = rest
                .find("-->")
                .ok_or_else(|| LoadError::parse(line, "unterminated comment"))?;
            line += newlines(&rest[..end]);
            rest = &rest[end + 3..];
            continue;
        }

        let end = rest
            .find('>')
            .ok_or_else(|| LoadError::parse(line, "unterminated tag"))?;
        let tag = &rest[1..end];
        let tag_line = line;
        line += newlines(tag);
        rest = &rest[end + 1..];

        if tag.starts_with('?') || tag.starts_with('!') {
            continue;
        }
        if let Some(name) = tag.strip_prefix('/') {
            tokens.push((tag_line, Token::Close(name.trim())));
            continue;
        }
        let (body, self_closing) = match tag.strip_suffix('/') {
            Some(body) => (body.trim(), true),
            None => (tag.trim(), false),
        };
        let name_end = body.find(char::is_whitespace).unwrap_or(body.len());
        let name = &body[..name_end];
        if name.is_empty() {
            return Err(LoadError::parse(tag_line, "empty tag name"));
        }
        tokens.push((
            tag_line,
            Token::Open {
                name,
                attrs: &body[name_end..],
                self_closing,
            },
        ));
    }
    Ok(tokens)
}

/// Look up `key` in a `name="value"` attribute list.
fn attribute<'a>(attrs: &'a str, key: &str, line: usize) -> Result<Option<&'a str>, LoadError> {
    let mut rest = attrs.trim_start();
    while !rest.is_empty() {
        let eq = rest
            .find('=')
            .ok_or_else(|| LoadError::parse(line, format!("malformed attribute '{rest}'")))?;
        let name = rest[..eq].trim();
        let value = rest[eq + 1..].trim_start();
        let quote = value
            .chars()
            .next()
            .filter(|c| *c == '"' || *c == '\'')
            .ok_or_else(|| LoadError::parse(line, format!("unquoted value for '{name}'")))?;
        let close = value[1..]
            .find(quote)
            .ok_or_else(|| LoadError::parse(line, format!("unterminated value for '{name}'")))?;
        if name == key {
            return Ok(Some(&value[1..1 + close]));
        }
        rest = value[close + 2..].trim_start();
    }
    Ok(None)
}

struct OpenKnot {
    name: String,
    line: usize,
    text: String,
}

#[derive(Default)]
struct Parser<'a> {
    stack: Vec<(&'a str, usize)>,
    node: Option<(f64, StateRecord)>,
    knot: Option<OpenKnot>,
    frames: Vec<Frame>,
}

impl<'a> Parser<'a> {
    fn feed(&mut self, line: usize, token: Token<'a>) -> Result<(), LoadError> {
        match token {
            Token::Open {
                name,
                attrs,
                self_closing,
            } => {
                self.open(name, attrs, line)?;
                if self_closing {
                    self.close(name)?;
                } else {
                    self.stack.push((name, line));
                }
            }
            Token::Close(name) => {
                let (open, open_line) = self
                    .stack
                    .pop()
                    .ok_or_else(|| LoadError::parse(line, format!("unexpected </{name}>")))?;
                if open != name {
                    return Err(LoadError::parse(
                        line,
                        format!("expected </{open}> (opened at line {open_line}), found </{name}>"),
                    ));
                }
                self.close(name)?;
            }
            Token::Text(text) => {
                if let Some(knot) = self.knot.as_mut() {
                    knot.text.push_str(text);
                }
            }
        }
        Ok(())
    }

    fn open(&mut self, name: &str, attrs: &str, line: usize) -> Result<(), LoadError> {
        match name {
            NODE => {
                if self.node.is_some() {
                    return Err(LoadError::parse(line, "nested <Node>"));
                }
                let raw = attribute(attrs, TIME_ATTR, line)?.ok_or_else(|| {
                    LoadError::parse(line, format!("<Node> without {TIME_ATTR}"))
                })?;
                let time = raw
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|t| t.is_finite())
                    .ok_or_else(|| LoadError::parse(line, format!("invalid time '{raw}'")))?;
                self.node = Some((time, StateRecord::new()));
            }
            KNOT => {
                if self.node.is_none() {
                    return Err(LoadError::parse(line, "<Knot> outside of <Node>"));
                }
                let knot_name = attribute(attrs, NAME_ATTR, line)?
                    .ok_or_else(|| LoadError::parse(line, "<Knot> without Name"))?;
                self.knot = Some(OpenKnot {
                    name: knot_name.to_string(),
                    line,
                    text: String::new(),
                });
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &str) -> Result<(), LoadError> {
        match name {
            KNOT => {
                if let (Some(knot), Some((_, state))) = (self.knot.take(), self.node.as_mut()) {
                    let value = knot.text.trim().parse::<f64>().map_err(|_| {
                        LoadError::parse(
                            knot.line,
                            format!("knot '{}' has non-numeric value '{}'", knot.name, knot.text),
                        )
                    })?;
                    state.insert(knot.name, value);
                }
            }
            NODE => {
                if let Some((time, state)) = self.node.take() {
                    self.frames.push(Frame::new(time, state));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<Frame>, LoadError> {
        if let Some((name, line)) = self.stack.last() {
            return Err(LoadError::parse(*line, format!("unclosed <{name}>")));
        }
        Ok(self.frames)
    }
}
