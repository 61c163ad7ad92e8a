//! Document encoder: values to event streams
//!
//! Walks a value and drives an [`EventSink`] with a well-formed sequence of
//! stream/document/collection/scalar events. The downstream emitter (not
//! part of this crate) turns events into text; this layer owns framing,
//! scalar text formatting, tag shortening and the anchor/tag/style
//! attributes carried by indirects.
//!
//! ## State machine
//!
//! ```text
//! fresh ──emit_document──▶ after-doc-end ──emit_document──▶ after-doc-end
//!                              │
//!                            sync
//!                              ▼
//!                            done ──emit_document──▶ error
//! ```
//!
//! Any sink failure aborts the current document and latches the encoder
//! into a failed state that refuses further documents until [`Encoder::reset`].
//! The stream is then syntactically truncated at the last valid event and
//! non-resumable for that document.

use crate::document::{DocumentState, TagDirective, VersionDirective};
use crate::error::{Error, SinkError};
use crate::packed::{NodeStyle, PackedValue, ValueKind};
use std::borrow::Cow;
use std::fmt::Write as _;
use tracing::debug;

// ============================================================================
// Events
// ============================================================================

/// Anchor/tag/style attributes attached to the next node event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeAttrs<'a> {
    pub anchor: Option<&'a str>,
    pub tag: Option<&'a str>,
    pub style: NodeStyle,
}

/// The event alphabet accepted by a sink. Attribute strings are borrowed
/// and valid for the duration of the call only.
#[derive(Debug, Clone, PartialEq)]
pub enum EmitEvent<'a> {
    StreamStart,
    StreamEnd,
    DocumentStart {
        version: Option<VersionDirective>,
        tags: &'a [TagDirective],
    },
    DocumentEnd,
    SequenceStart(NodeAttrs<'a>),
    SequenceEnd,
    MappingStart(NodeAttrs<'a>),
    MappingEnd,
    Scalar {
        attrs: NodeAttrs<'a>,
        value: &'a str,
    },
    Alias {
        anchor: &'a str,
    },
}

/// Downstream consumer of the event stream.
pub trait EventSink {
    fn on_event(&mut self, event: &EmitEvent<'_>) -> Result<(), SinkError>;
}

bitflags::bitflags! {
    /// Switches for [`Encoder::emit`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EmitFlags: u32 {
        /// Treat the value as the document root even when it looks like a
        /// directory (or a sequence of directories).
        const DISABLE_DIRECTORY = 1 << 0;
    }
}

// ============================================================================
// Scalar text formatting
// ============================================================================

/// Append the canonical scalar text of `v` to `buf`. Returns false when `v`
/// is not a scalar.
pub fn format_scalar_into(buf: &mut String, v: PackedValue) -> bool {
    match v.raw_kind() {
        ValueKind::Null => buf.push_str("null"),
        ValueKind::Bool => buf.push_str(if v.as_bool_nocheck() { "true" } else { "false" }),
        ValueKind::Int => {
            // The widened form prints unsigned-range-extended records as
            // unsigned decimal without a special case.
            let _ = write!(buf, "{}", v.as_wide_int_nocheck());
        }
        ValueKind::Float => format_float_into(buf, v.as_float_nocheck()),
        ValueKind::String => buf.push_str(&v.as_str_nocheck().to_str_lossy()),
        _ => return false,
    }
    true
}

fn format_float_into(buf: &mut String, f: f64) {
    if f.is_nan() {
        buf.push_str(".nan");
    } else if f == f64::INFINITY {
        buf.push_str(".inf");
    } else if f == f64::NEG_INFINITY {
        buf.push_str("-.inf");
    } else {
        let start = buf.len();
        if f != 0.0 && (f.abs() >= 1e16 || f.abs() < 1e-4) {
            let _ = write!(buf, "{f:e}");
        } else {
            let _ = write!(buf, "{f}");
        }
        // Keep the text recognizable as a float.
        if !buf[start..].contains(['.', 'e', 'E']) {
            buf.push_str(".0");
        }
    }
}

/// Shorten `tag` against the document's directive table: the longest
/// matching prefix wins and the tag is rewritten in handle form; otherwise
/// the tag passes through verbatim.
pub fn shorten_tag<'a>(tag: &'a str, doc: &DocumentState) -> Cow<'a, str> {
    let best = doc
        .tags
        .iter()
        .filter(|d| !d.prefix.is_empty() && tag.starts_with(d.prefix.as_str()))
        .max_by_key(|d| d.prefix.len());
    match best {
        Some(directive) => {
            let suffix = &tag[directive.prefix.len()..];
            Cow::Owned(format!("{}{}", directive.handle, suffix))
        }
        None => Cow::Borrowed(tag),
    }
}

// ============================================================================
// Encoder
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncoderState {
    Fresh,
    AfterDocEnd,
    Done,
    Failed,
}

/// Streaming document encoder over a borrowed sink.
pub struct Encoder<'s> {
    sink: &'s mut dyn EventSink,
    state: EncoderState,
    stream_open: bool,
    /// Anchors emitted so far in the current document. An alias must refer
    /// to one of these: anchored nodes come before their aliases.
    anchors_seen: Vec<String>,
}

impl<'s> Encoder<'s> {
    pub fn new(sink: &'s mut dyn EventSink) -> Self {
        Self {
            sink,
            state: EncoderState::Fresh,
            stream_open: false,
            anchors_seen: Vec::new(),
        }
    }

    /// Whether a previous failure latched the encoder.
    pub fn is_failed(&self) -> bool {
        self.state == EncoderState::Failed
    }

    /// Clear state (including stickiness) for a fresh stream.
    pub fn reset(&mut self) {
        self.state = EncoderState::Fresh;
        self.stream_open = false;
        self.anchors_seen.clear();
    }

    fn send(&mut self, event: &EmitEvent<'_>) -> Result<(), Error> {
        match self.sink.on_event(event) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.state = EncoderState::Failed;
                Err(Error::Encoder(err))
            }
        }
    }

    fn fail_invalid(&mut self, what: &'static str) -> Error {
        self.state = EncoderState::Failed;
        Error::InvalidInput(what)
    }

    /// Emit one document: `StreamStart` if not already open, the framing
    /// events, the body, then `DocumentEnd`.
    pub fn emit_document(&mut self, root: PackedValue, doc: &DocumentState) -> Result<(), Error> {
        match self.state {
            EncoderState::Failed => {
                return Err(Error::Encoder(SinkError::new(
                    "encoder is in a failed state; reset required",
                )));
            }
            EncoderState::Done => {
                return Err(Error::InvalidInput("stream already finished"));
            }
            EncoderState::Fresh | EncoderState::AfterDocEnd => {}
        }

        if !self.stream_open {
            self.send(&EmitEvent::StreamStart)?;
            self.stream_open = true;
        }
        self.anchors_seen.clear();

        let version = doc.version.filter(|_| doc.version_explicit);
        let tags: &[TagDirective] = if doc.tags_explicit { &doc.tags } else { &[] };
        self.send(&EmitEvent::DocumentStart { version, tags })?;

        self.encode_node(root, doc)?;

        self.send(&EmitEvent::DocumentEnd)?;
        self.state = EncoderState::AfterDocEnd;
        debug!(version_explicit = doc.version_explicit, "document emitted");
        Ok(())
    }

    /// Emit a value. Directories (and sequences of directories) are
    /// unwrapped into documents unless
    /// [`EmitFlags::DISABLE_DIRECTORY`] is set.
    pub fn emit(&mut self, value: PackedValue, flags: EmitFlags) -> Result<(), Error> {
        if flags.contains(EmitFlags::DISABLE_DIRECTORY) {
            return self.emit_document(value, &DocumentState::default());
        }

        let resolved = value.resolved();
        if resolved.is_sequence()
            && !resolved.sequence_items().is_empty()
            && resolved
                .sequence_items()
                .iter()
                .all(|item| DocumentState::is_directory(*item))
        {
            for item in resolved.sequence_items() {
                let (root, state) = DocumentState::from_directory(*item)?;
                self.emit_document(root, &state)?;
            }
            return Ok(());
        }

        if DocumentState::is_directory(resolved) {
            let (root, state) = DocumentState::from_directory(resolved)?;
            return self.emit_document(root, &state);
        }

        self.emit_document(value, &DocumentState::default())
    }

    /// Emit the matching `StreamEnd` if a `StreamStart` went out.
    /// Idempotent; a no-op on a fresh encoder.
    pub fn sync(&mut self) -> Result<(), Error> {
        match self.state {
            EncoderState::Failed => Err(Error::Encoder(SinkError::new(
                "encoder is in a failed state; reset required",
            ))),
            EncoderState::Done | EncoderState::Fresh => Ok(()),
            EncoderState::AfterDocEnd => {
                self.send(&EmitEvent::StreamEnd)?;
                self.state = EncoderState::Done;
                Ok(())
            }
        }
    }

    fn encode_node(&mut self, v: PackedValue, doc: &DocumentState) -> Result<(), Error> {
        if v.is_invalid() {
            return Err(self.fail_invalid("cannot encode the Invalid sentinel"));
        }

        // Indirect decorations become the next event's attributes.
        let (attrs_owned, body) = if v.raw_kind() == ValueKind::Indirect {
            let ind = v.indirect_nocheck();
            if ind.is_alias() {
                let anchor = ind.anchor.as_str_nocheck();
                let text = anchor.to_str_lossy().into_owned();
                // The anchored node must already be in this document.
                if !self.anchors_seen.iter().any(|seen| *seen == text) {
                    return Err(self.fail_invalid("alias precedes its anchor"));
                }
                return self.send(&EmitEvent::Alias { anchor: &text });
            }
            if !ind.has_value() || ind.value.raw_kind() == ValueKind::Indirect {
                return Err(self.fail_invalid("decorator wraps an undecodable value"));
            }
            let attrs = OwnedAttrs::from_indirect(&ind, doc);
            if let Some(anchor) = &attrs.anchor {
                self.anchors_seen.push(anchor.clone());
            }
            (attrs, ind.value)
        } else {
            (OwnedAttrs::default(), v)
        };

        match body.raw_kind() {
            ValueKind::Invalid => Err(self.fail_invalid("cannot encode the Invalid sentinel")),
            ValueKind::Null | ValueKind::Bool | ValueKind::Int | ValueKind::Float
            | ValueKind::String => {
                let mut text = String::new();
                format_scalar_into(&mut text, body);
                // Strings default to the unresolved "any" style so the
                // downstream classifier picks quoting; other scalars are
                // plain by construction.
                let default_style = if body.raw_kind() == ValueKind::String {
                    NodeStyle::Any
                } else {
                    NodeStyle::Plain
                };
                self.send(&EmitEvent::Scalar {
                    attrs: attrs_owned.borrowed(default_style),
                    value: &text,
                })
            }
            ValueKind::Sequence => {
                self.send(&EmitEvent::SequenceStart(
                    attrs_owned.borrowed(NodeStyle::Any),
                ))?;
                for item in body.sequence_items() {
                    self.encode_node(*item, doc)?;
                }
                self.send(&EmitEvent::SequenceEnd)
            }
            ValueKind::Mapping => {
                self.send(&EmitEvent::MappingStart(
                    attrs_owned.borrowed(NodeStyle::Any),
                ))?;
                for pair in body.mapping_pairs() {
                    self.encode_node(pair.key, doc)?;
                    self.encode_node(pair.value, doc)?;
                }
                self.send(&EmitEvent::MappingEnd)
            }
            ValueKind::Indirect | ValueKind::Alias => {
                Err(self.fail_invalid("decorator wraps an undecodable value"))
            }
        }
    }
}

/// Attribute strings materialized for the duration of one event.
#[derive(Default)]
struct OwnedAttrs {
    anchor: Option<String>,
    tag: Option<String>,
    style: NodeStyle,
}

impl OwnedAttrs {
    fn from_indirect(ind: &crate::packed::Indirect, doc: &DocumentState) -> Self {
        Self {
            anchor: ind
                .has_anchor()
                .then(|| ind.anchor.as_str_nocheck().to_str_lossy().into_owned()),
            tag: ind.has_tag().then(|| {
                let raw = ind.tag.as_str_nocheck().to_str_lossy().into_owned();
                shorten_tag(&raw, doc).into_owned()
            }),
            style: ind.style,
        }
    }

    fn borrowed(&self, default_style: NodeStyle) -> NodeAttrs<'_> {
        NodeAttrs {
            anchor: self.anchor.as_deref(),
            tag: self.tag.as_deref(),
            style: if self.style == NodeStyle::Any {
                default_style
            } else {
                self.style
            },
        }
    }
}

// ============================================================================
// Collecting sink
// ============================================================================

/// Owned mirror of [`EmitEvent`] for collection and assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedEvent {
    StreamStart,
    StreamEnd,
    DocumentStart {
        version: Option<VersionDirective>,
        tags: Vec<TagDirective>,
    },
    DocumentEnd,
    SequenceStart {
        anchor: Option<String>,
        tag: Option<String>,
        style: NodeStyle,
    },
    SequenceEnd,
    MappingStart {
        anchor: Option<String>,
        tag: Option<String>,
        style: NodeStyle,
    },
    MappingEnd,
    Scalar {
        anchor: Option<String>,
        tag: Option<String>,
        style: NodeStyle,
        value: String,
    },
    Alias {
        anchor: String,
    },
}

/// A basic sink that collects every event it sees. `fail_at` makes the
/// n-th event fail, for exercising the encoder's error path.
#[derive(Default)]
pub struct CollectingSink {
    pub events: Vec<OwnedEvent>,
    pub fail_at: Option<usize>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSink for CollectingSink {
    fn on_event(&mut self, event: &EmitEvent<'_>) -> Result<(), SinkError> {
        if self.fail_at == Some(self.events.len()) {
            return Err(SinkError::new("injected sink failure"));
        }
        let owned = match event {
            EmitEvent::StreamStart => OwnedEvent::StreamStart,
            EmitEvent::StreamEnd => OwnedEvent::StreamEnd,
            EmitEvent::DocumentStart { version, tags } => OwnedEvent::DocumentStart {
                version: *version,
                tags: tags.to_vec(),
            },
            EmitEvent::DocumentEnd => OwnedEvent::DocumentEnd,
            EmitEvent::SequenceStart(attrs) => OwnedEvent::SequenceStart {
                anchor: attrs.anchor.map(str::to_owned),
                tag: attrs.tag.map(str::to_owned),
                style: attrs.style,
            },
            EmitEvent::SequenceEnd => OwnedEvent::SequenceEnd,
            EmitEvent::MappingStart(attrs) => OwnedEvent::MappingStart {
                anchor: attrs.anchor.map(str::to_owned),
                tag: attrs.tag.map(str::to_owned),
                style: attrs.style,
            },
            EmitEvent::MappingEnd => OwnedEvent::MappingEnd,
            EmitEvent::Scalar { attrs, value } => OwnedEvent::Scalar {
                anchor: attrs.anchor.map(str::to_owned),
                tag: attrs.tag.map(str::to_owned),
                style: attrs.style,
                value: (*value).to_owned(),
            },
            EmitEvent::Alias { anchor } => OwnedEvent::Alias {
                anchor: (*anchor).to_owned(),
            },
        };
        self.events.push(owned);
        Ok(())
    }
}
