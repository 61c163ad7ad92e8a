//! Demand-driven value iterator
//!
//! Produces one event per [`EventIter::next`] call from a root value or a
//! document directory, mirroring the encoder's event shape but yielding the
//! values themselves instead of formatted text. Single-consumer, pull-based
//! and non-blocking; drop it at any step and the traversal stack goes with
//! it.
//!
//! ## State machine
//!
//! ```text
//! WaitingStreamStart → WaitingDocumentStart → Body ⇄ (collection frames)
//!                                               ↓
//!                      WaitingDocumentEnd → WaitingStreamEndOrDocumentStart
//!                                               ↓ / ↑ (next document)
//!                                            StreamEnd → Done
//! ```
//!
//! Each collection frame records `{value, index, key_done}`; mappings
//! alternate key then value and advance after the value. Leaving a
//! collection yields a [`IterEvent::CollectionEnd`] carrying the collection
//! value itself, at which point the frame pops.

use crate::document::DocumentState;
use crate::error::Error;
use crate::packed::{PackedValue, ValueKind};

/// Nesting depth the traversal stack handles without touching the heap.
/// Deeper nesting spills; both producers and consumers of event streams can
/// rely on this minimum.
pub const GUARANTEED_DEPTH: usize = 16;

bitflags::bitflags! {
    /// Which outer events the iterator generates around the body.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IterFlags: u32 {
        const STREAM_EVENTS = 1 << 0;
        const DOCUMENT_EVENTS = 1 << 1;
    }
}

impl Default for IterFlags {
    fn default() -> Self {
        Self::STREAM_EVENTS | Self::DOCUMENT_EVENTS
    }
}

/// One step of the traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterEvent {
    StreamStart,
    StreamEnd,
    DocumentStart,
    DocumentEnd,
    /// Entering a sequence or mapping.
    CollectionStart(PackedValue),
    /// Leaving a collection; carries the collection value itself.
    CollectionEnd(PackedValue),
    /// A scalar or decorated scalar value.
    Scalar(PackedValue),
    /// An alias reference.
    Alias(PackedValue),
}

// ============================================================================
// Frame stack
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Frame {
    value: PackedValue,
    index: usize,
    key_done: bool,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            value: PackedValue::INVALID,
            index: 0,
            key_done: false,
        }
    }
}

/// Traversal stack with [`GUARANTEED_DEPTH`] inline slots and heap spill
/// above that.
#[derive(Default)]
struct FrameStack {
    inline: [Frame; GUARANTEED_DEPTH],
    len: usize,
    spill: Vec<Frame>,
}

impl FrameStack {
    fn push(&mut self, frame: Frame) {
        if self.len < GUARANTEED_DEPTH {
            self.inline[self.len] = frame;
        } else {
            self.spill.push(frame);
        }
        self.len += 1;
    }

    fn pop(&mut self) -> Option<Frame> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        if self.len >= GUARANTEED_DEPTH {
            self.spill.pop()
        } else {
            Some(self.inline[self.len])
        }
    }

    fn last_mut(&mut self) -> Option<&mut Frame> {
        if self.len == 0 {
            None
        } else if self.len > GUARANTEED_DEPTH {
            self.spill.last_mut()
        } else {
            Some(&mut self.inline[self.len - 1])
        }
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }
}

// ============================================================================
// Iterator
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterState {
    WaitingStreamStart,
    WaitingDocumentStart,
    WaitingBody,
    Body,
    WaitingDocumentEnd,
    WaitingStreamEndOrDocumentStart,
    Done,
}

/// Pull-based event generator over a value or document directory.
pub struct EventIter {
    roots: Vec<PackedValue>,
    doc_index: usize,
    state: IterState,
    frames: FrameStack,
    flags: IterFlags,
    error: Option<Error>,
}

impl EventIter {
    /// Iterate `root` as a single document body.
    pub fn new(root: PackedValue, flags: IterFlags) -> Self {
        Self {
            roots: vec![root],
            doc_index: 0,
            state: IterState::WaitingStreamStart,
            frames: FrameStack::default(),
            flags,
            error: None,
        }
    }

    /// Iterate a directory, a sequence of directories, or a plain root.
    /// Directory recognition matches the encoder's.
    pub fn over(value: PackedValue, flags: IterFlags) -> Self {
        let resolved = value.resolved();
        let roots = if resolved.is_sequence()
            && !resolved.sequence_items().is_empty()
            && resolved
                .sequence_items()
                .iter()
                .all(|item| DocumentState::is_directory(*item))
        {
            resolved
                .sequence_items()
                .iter()
                .map(|item| {
                    DocumentState::from_directory(*item)
                        .map(|(root, _)| root)
                        .unwrap_or(PackedValue::INVALID)
                })
                .collect()
        } else if DocumentState::is_directory(resolved) {
            match DocumentState::from_directory(resolved) {
                Ok((root, _)) => vec![root],
                Err(_) => vec![PackedValue::INVALID],
            }
        } else {
            vec![value]
        };
        Self {
            roots,
            doc_index: 0,
            state: IterState::WaitingStreamStart,
            frames: FrameStack::default(),
            flags,
            error: None,
        }
    }

    /// The latched error, if iteration hit one.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    fn fail(&mut self, what: &'static str) -> Option<IterEvent> {
        self.error = Some(Error::Iterator(what));
        self.state = IterState::Done;
        None
    }

    /// Classify `v` and produce its entering event, pushing a frame for
    /// collections.
    fn enter(&mut self, v: PackedValue) -> Option<IterEvent> {
        match v.kind() {
            ValueKind::Invalid => self.fail("invalid value in tree"),
            ValueKind::Sequence | ValueKind::Mapping => {
                self.frames.push(Frame {
                    value: v,
                    index: 0,
                    key_done: false,
                });
                Some(IterEvent::CollectionStart(v))
            }
            ValueKind::Alias => Some(IterEvent::Alias(v)),
            ValueKind::Indirect => self.fail("decorator wraps an undecodable value"),
            _ => Some(IterEvent::Scalar(v)),
        }
    }

    /// Advance the body by one step.
    fn step_body(&mut self) -> Option<IterEvent> {
        let Some(frame) = self.frames.last_mut() else {
            // Scalar root already delivered.
            self.state = IterState::WaitingDocumentEnd;
            return self.advance();
        };
        let holder = frame.value.resolved();
        if holder.is_sequence() {
            let items = holder.sequence_items();
            if frame.index >= items.len() {
                let done = self.frames.pop()?;
                if self.frames.is_empty() {
                    self.state = IterState::WaitingDocumentEnd;
                }
                return Some(IterEvent::CollectionEnd(done.value));
            }
            let item = items[frame.index];
            frame.index += 1;
            self.enter(item)
        } else {
            let pairs = holder.mapping_pairs();
            if frame.index >= pairs.len() {
                let done = self.frames.pop()?;
                if self.frames.is_empty() {
                    self.state = IterState::WaitingDocumentEnd;
                }
                return Some(IterEvent::CollectionEnd(done.value));
            }
            let pair = pairs[frame.index];
            if frame.key_done {
                frame.key_done = false;
                frame.index += 1;
                self.enter(pair.value)
            } else {
                frame.key_done = true;
                self.enter(pair.key)
            }
        }
    }

    fn advance(&mut self) -> Option<IterEvent> {
        loop {
            match self.state {
                IterState::WaitingStreamStart => {
                    self.state = IterState::WaitingDocumentStart;
                    if self.flags.contains(IterFlags::STREAM_EVENTS) {
                        return Some(IterEvent::StreamStart);
                    }
                }
                IterState::WaitingDocumentStart => {
                    if self.doc_index >= self.roots.len() {
                        self.state = IterState::Done;
                        return None;
                    }
                    self.state = IterState::WaitingBody;
                    if self.flags.contains(IterFlags::DOCUMENT_EVENTS) {
                        return Some(IterEvent::DocumentStart);
                    }
                }
                IterState::WaitingBody => {
                    let root = self.roots[self.doc_index];
                    self.state = IterState::Body;
                    let event = self.enter(root);
                    if event.is_some() && self.frames.is_empty() {
                        // Scalar document body: one event, then framing.
                        self.state = IterState::WaitingDocumentEnd;
                    }
                    return event;
                }
                IterState::Body => {
                    if self.frames.is_empty() {
                        self.state = IterState::WaitingDocumentEnd;
                        continue;
                    }
                    return self.step_body();
                }
                IterState::WaitingDocumentEnd => {
                    self.doc_index += 1;
                    self.state = IterState::WaitingStreamEndOrDocumentStart;
                    if self.flags.contains(IterFlags::DOCUMENT_EVENTS) {
                        return Some(IterEvent::DocumentEnd);
                    }
                }
                IterState::WaitingStreamEndOrDocumentStart => {
                    if self.doc_index < self.roots.len() {
                        self.state = IterState::WaitingDocumentStart;
                        continue;
                    }
                    self.state = IterState::Done;
                    if self.flags.contains(IterFlags::STREAM_EVENTS) {
                        return Some(IterEvent::StreamEnd);
                    }
                    return None;
                }
                IterState::Done => return None,
            }
        }
    }
}

impl Iterator for EventIter {
    type Item = IterEvent;

    fn next(&mut self) -> Option<IterEvent> {
        if self.error.is_some() {
            return None;
        }
        self.advance()
    }
}
