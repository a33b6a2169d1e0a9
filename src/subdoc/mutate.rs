use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{SubdocCommandKind, XattrOrdered, check_command_count, finalize_commands, path_flags};
use crate::codec::{CodecError, JsonSerializer};
use crate::core::{Identifier, KvError, Result};

/// Server-expanded values usable in xattr mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutateInMacro {
    Cas,
    SeqNo,
    ValueCrc32c,
}

impl MutateInMacro {
    pub fn value(&self) -> &'static str {
        match self {
            MutateInMacro::Cas => "${Mutation.CAS}",
            MutateInMacro::SeqNo => "${Mutation.seqno}",
            MutateInMacro::ValueCrc32c => "${Mutation.value_crc32c}",
        }
    }
}

/// One path-level write as it goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdocMutateCommand {
    pub kind: SubdocCommandKind,
    pub path: String,
    pub fragment: Vec<u8>,
    pub create_path: bool,
    pub xattr: bool,
    pub expand_macro: bool,
    pub original_index: u32,
}

impl SubdocMutateCommand {
    pub fn path_flags(&self) -> u8 {
        let mut flags = 0;
        if self.create_path {
            flags |= path_flags::CREATE_PATH;
        }
        if self.xattr {
            flags |= path_flags::XATTR;
        }
        if self.expand_macro {
            flags |= path_flags::EXPAND_MACROS;
        }
        flags
    }
}

impl XattrOrdered for SubdocMutateCommand {
    fn is_xattr(&self) -> bool {
        self.xattr
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Fragment {
    Empty,
    Single(Value),
    Multi(Vec<Value>),
    Delta(i64),
}

/// Caller-facing description of a mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutateInSpec {
    kind: SubdocCommandKind,
    path: String,
    fragment: Fragment,
    xattr: bool,
    create_path: bool,
    expand_macro: bool,
}

impl MutateInSpec {
    fn new(kind: SubdocCommandKind, path: impl Into<String>, fragment: Fragment) -> Self {
        Self {
            kind,
            path: path.into(),
            fragment,
            xattr: false,
            create_path: false,
            expand_macro: false,
        }
    }

    /// Adds a value at a path that must not exist yet.
    pub fn insert(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(SubdocCommandKind::DictAdd, path, Fragment::Single(value.into()))
    }

    pub fn upsert(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(SubdocCommandKind::DictUpsert, path, Fragment::Single(value.into()))
    }

    /// Replaces a path; the empty path replaces the whole body.
    pub fn replace(path: impl Into<String>, value: impl Into<Value>) -> Self {
        let path = path.into();
        let kind = if path.is_empty() {
            SubdocCommandKind::SetDoc
        } else {
            SubdocCommandKind::Replace
        };
        Self::new(kind, path, Fragment::Single(value.into()))
    }

    /// Removes a path; the empty path removes the whole document.
    pub fn remove(path: impl Into<String>) -> Self {
        let path = path.into();
        let kind = if path.is_empty() {
            SubdocCommandKind::DeleteDoc
        } else {
            SubdocCommandKind::Delete
        };
        Self::new(kind, path, Fragment::Empty)
    }

    pub fn array_append(path: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(SubdocCommandKind::ArrayPushLast, path, Fragment::Multi(values))
    }

    pub fn array_prepend(path: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(SubdocCommandKind::ArrayPushFirst, path, Fragment::Multi(values))
    }

    pub fn array_insert(path: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(SubdocCommandKind::ArrayInsert, path, Fragment::Multi(values))
    }

    pub fn array_add_unique(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(
            SubdocCommandKind::ArrayAddUnique,
            path,
            Fragment::Single(value.into()),
        )
    }

    pub fn increment(path: impl Into<String>, delta: u32) -> Self {
        Self::new(SubdocCommandKind::Counter, path, Fragment::Delta(i64::from(delta)))
    }

    pub fn decrement(path: impl Into<String>, delta: u32) -> Self {
        Self::new(SubdocCommandKind::Counter, path, Fragment::Delta(-i64::from(delta)))
    }

    pub fn upsert_macro(path: impl Into<String>, mutate_macro: MutateInMacro) -> Self {
        Self::new(
            SubdocCommandKind::DictUpsert,
            path,
            Fragment::Single(Value::String(mutate_macro.value().to_string())),
        )
        .with_macro()
    }

    pub fn insert_macro(path: impl Into<String>, mutate_macro: MutateInMacro) -> Self {
        Self::new(
            SubdocCommandKind::DictAdd,
            path,
            Fragment::Single(Value::String(mutate_macro.value().to_string())),
        )
        .with_macro()
    }

    fn with_macro(mut self) -> Self {
        self.xattr = true;
        self.expand_macro = true;
        self
    }

    pub fn xattr(mut self) -> Self {
        self.xattr = true;
        self
    }

    /// Create missing intermediate paths.
    pub fn create_path(mut self) -> Self {
        self.create_path = true;
        self
    }

    pub fn kind(&self) -> SubdocCommandKind {
        self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn encode(
        &self,
        serializer: &dyn JsonSerializer,
        index: u32,
    ) -> std::result::Result<SubdocMutateCommand, CodecError> {
        let fragment = match &self.fragment {
            Fragment::Empty => Vec::new(),
            Fragment::Single(value) => serializer.serialize(value)?,
            Fragment::Multi(values) => {
                // multiple values travel as one comma-separated run, no brackets
                let mut joined = Vec::new();
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        joined.push(b',');
                    }
                    joined.extend(serializer.serialize(value)?);
                }
                joined
            }
            Fragment::Delta(delta) => delta.to_string().into_bytes(),
        };

        Ok(SubdocMutateCommand {
            kind: self.kind,
            path: self.path.clone(),
            fragment,
            create_path: self.create_path,
            xattr: self.xattr,
            expand_macro: self.expand_macro,
            original_index: index,
        })
    }
}

/// Checks cardinality, encodes each spec at its submission index and sorts
/// the result xattrs first.
pub fn encode_mutate_specs(
    specs: &[MutateInSpec],
    serializer: &dyn JsonSerializer,
    id: &Identifier,
) -> Result<Vec<SubdocMutateCommand>> {
    check_command_count(specs.len(), id)?;

    let mut commands = Vec::with_capacity(specs.len());
    for (index, spec) in specs.iter().enumerate() {
        let command = spec
            .encode(serializer, index as u32)
            .map_err(|err| KvError::encoding(err, id))?;
        commands.push(command);
    }
    finalize_commands(&mut commands);
    Ok(commands)
}
