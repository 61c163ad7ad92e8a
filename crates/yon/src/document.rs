//! Document directory and document state
//!
//! Multi-document values travel as a sequence of "directories": mappings
//! with a small set of recognized keys. Only `root` is required.
//!
//! | key                | value                                 |
//! |--------------------|---------------------------------------|
//! | `root`             | the document root value               |
//! | `version`          | mapping `{major, minor}`              |
//! | `tags`             | sequence of `{handle, prefix}` maps   |
//! | `version-explicit` | emit the version directive            |
//! | `tags-explicit`    | emit the tag directives               |
//!
//! [`DocumentState`] is the version / tag-directive context a document is
//! emitted under; the encoder shortens tags against its directive table.

use crate::builder::ValueBuilder;
use crate::error::Error;
use crate::packed::{PackedValue, Pair};
use crate::scalar::cast;

/// An explicit `%YAML` version directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionDirective {
    pub major: i64,
    pub minor: i64,
}

/// A `%TAG` directive mapping a short handle to a URI prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDirective {
    pub handle: String,
    pub prefix: String,
}

/// Version and tag-directive context for one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentState {
    pub version: Option<VersionDirective>,
    pub tags: Vec<TagDirective>,
    /// When false, `version` is ignored on emit.
    pub version_explicit: bool,
    /// When false, `tags` is ignored on emit.
    pub tags_explicit: bool,
}

impl DocumentState {
    /// Whether `v` has the directory shape: a mapping with a `root` key.
    pub fn is_directory(v: PackedValue) -> bool {
        let v = v.resolved();
        v.is_mapping() && !v.mapping_get_str("root").is_invalid()
    }

    /// Split a directory into its root value and document state.
    ///
    /// Missing explicit flags default to "present implies explicit": a
    /// directory that carries a version without `version-explicit` meant to
    /// emit it.
    pub fn from_directory(dir: PackedValue) -> Result<(PackedValue, DocumentState), Error> {
        let dir = dir.resolved();
        if !dir.is_mapping() {
            return Err(Error::InvalidInput("document directory is not a mapping"));
        }
        let root = dir.mapping_get_str("root");
        if root.is_invalid() {
            return Err(Error::InvalidInput("document directory has no root"));
        }

        let mut state = DocumentState::default();

        let version = dir.mapping_get_str("version").resolved();
        if version.is_mapping() {
            state.version = Some(VersionDirective {
                major: cast(version.mapping_get_str("major"), 1),
                minor: cast(version.mapping_get_str("minor"), 1),
            });
        }

        let tags = dir.mapping_get_str("tags").resolved();
        if tags.is_sequence() {
            for entry in tags.sequence_items() {
                let entry = entry.resolved();
                let handle = entry.mapping_get_str("handle");
                let prefix = entry.mapping_get_str("prefix");
                if !handle.is_string() || !prefix.is_string() {
                    return Err(Error::InvalidInput("malformed tag directive"));
                }
                state.tags.push(TagDirective {
                    handle: handle.as_str_nocheck().to_str_lossy().into_owned(),
                    prefix: prefix.as_str_nocheck().to_str_lossy().into_owned(),
                });
            }
        }

        state.version_explicit =
            cast(dir.mapping_get_str("version-explicit"), state.version.is_some());
        state.tags_explicit =
            cast(dir.mapping_get_str("tags-explicit"), !state.tags.is_empty());

        Ok((root, state))
    }

    /// Build a directory value carrying `root` under this state.
    pub fn to_directory(&self, gb: &ValueBuilder<'_>, root: PackedValue) -> PackedValue {
        let mut pairs = vec![Pair {
            key: gb.string("root"),
            value: root,
        }];

        if let Some(version) = self.version {
            let version_map = gb.mapping(&[
                Pair { key: gb.string("major"), value: gb.int(version.major) },
                Pair { key: gb.string("minor"), value: gb.int(version.minor) },
            ]);
            pairs.push(Pair { key: gb.string("version"), value: version_map });
            pairs.push(Pair {
                key: gb.string("version-explicit"),
                value: gb.boolean(self.version_explicit),
            });
        }

        if !self.tags.is_empty() {
            let mut entries = Vec::with_capacity(self.tags.len());
            for tag in &self.tags {
                entries.push(gb.mapping(&[
                    Pair { key: gb.string("handle"), value: gb.string(&tag.handle) },
                    Pair { key: gb.string("prefix"), value: gb.string(&tag.prefix) },
                ]));
            }
            pairs.push(Pair { key: gb.string("tags"), value: gb.sequence(&entries) });
            pairs.push(Pair {
                key: gb.string("tags-explicit"),
                value: gb.boolean(self.tags_explicit),
            });
        }

        gb.mapping(&pairs)
    }
}
