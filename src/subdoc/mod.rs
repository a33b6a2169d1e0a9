//! Subdocument command encoding.
//!
//! Lookups and mutations address paths inside a document. Both share the same
//! wire invariants: at most [`SUBDOC_MAX_FIELDS`] commands per request and
//! extended-attribute (xattr) commands strictly before body commands.

pub mod lookup;
pub mod mutate;
pub(crate) mod paths;

use serde::{Deserialize, Serialize};

use crate::core::{Identifier, KvError, Result};

pub use lookup::{LookupInSpec, SubdocGetCommand, lookup_in_commands, projection_commands};
pub use mutate::{MutateInMacro, MutateInSpec, SubdocMutateCommand, encode_mutate_specs};

/// Server ceiling on commands in one subdocument request.
pub const SUBDOC_MAX_FIELDS: usize = 16;

/// Per-path flags.
pub mod path_flags {
    pub const CREATE_PATH: u8 = 0x01;
    pub const XATTR: u8 = 0x04;
    pub const EXPAND_MACROS: u8 = 0x10;
}

/// Per-document flags.
pub mod doc_flags {
    pub const MKDOC: u8 = 0x01;
    pub const ADD: u8 = 0x02;
    pub const ACCESS_DELETED: u8 = 0x04;
    pub const CREATE_AS_DELETED: u8 = 0x08;
}

/// Virtual xattr paths computed by the server.
pub mod lookup_macros {
    pub const DOCUMENT: &str = "$document";
    pub const EXPIRY_TIME: &str = "$document.exptime";
    pub const FLAGS: &str = "$document.flags";
    pub const CAS: &str = "$document.CAS";
    pub const SEQ_NO: &str = "$document.seqno";
    pub const LAST_MODIFIED: &str = "$document.last_modified";
    pub const IS_DELETED: &str = "$document.deleted";
    pub const VALUE_SIZE_BYTES: &str = "$document.value_bytes";
    pub const REV_ID: &str = "$document.revid";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubdocCommandKind {
    Get,
    Exists,
    Count,
    GetDoc,
    SetDoc,
    DeleteDoc,
    DictAdd,
    DictUpsert,
    Delete,
    Replace,
    ArrayPushLast,
    ArrayPushFirst,
    ArrayInsert,
    ArrayAddUnique,
    Counter,
}

impl SubdocCommandKind {
    pub fn opcode(&self) -> u8 {
        match self {
            SubdocCommandKind::GetDoc => 0x00,
            SubdocCommandKind::SetDoc => 0x01,
            SubdocCommandKind::DeleteDoc => 0x04,
            SubdocCommandKind::Get => 0xc5,
            SubdocCommandKind::Exists => 0xc6,
            SubdocCommandKind::DictAdd => 0xc7,
            SubdocCommandKind::DictUpsert => 0xc8,
            SubdocCommandKind::Delete => 0xc9,
            SubdocCommandKind::Replace => 0xca,
            SubdocCommandKind::ArrayPushLast => 0xcb,
            SubdocCommandKind::ArrayPushFirst => 0xcc,
            SubdocCommandKind::ArrayInsert => 0xcd,
            SubdocCommandKind::ArrayAddUnique => 0xce,
            SubdocCommandKind::Counter => 0xcf,
            SubdocCommandKind::Count => 0xd2,
        }
    }
}

/// A command that takes part in the xattr-first ordering.
pub trait XattrOrdered {
    fn is_xattr(&self) -> bool;
}

/// Moves xattr commands ahead of body commands.
///
/// The sort is stable, so commands keep their submission order inside each
/// partition.
pub fn finalize_commands<C: XattrOrdered>(commands: &mut [C]) {
    commands.sort_by_key(|command| !command.is_xattr());
}

pub(crate) fn check_command_count(count: usize, id: &Identifier) -> Result<()> {
    if count == 0 {
        return Err(KvError::NoCommands(id.into()));
    }
    if count > SUBDOC_MAX_FIELDS {
        return Err(KvError::TooManyCommands {
            max: SUBDOC_MAX_FIELDS,
            context: id.into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Cmd(u32, bool);

    impl XattrOrdered for Cmd {
        fn is_xattr(&self) -> bool {
            self.1
        }
    }

    #[test]
    fn finalize_is_stable_within_partitions() {
        let mut cmds = vec![
            Cmd(0, false),
            Cmd(1, true),
            Cmd(2, false),
            Cmd(3, true),
            Cmd(4, false),
        ];
        finalize_commands(&mut cmds);
        assert_eq!(
            cmds,
            vec![
                Cmd(1, true),
                Cmd(3, true),
                Cmd(0, false),
                Cmd(2, false),
                Cmd(4, false)
            ]
        );
    }

    #[test]
    fn command_count_bounds() {
        let id = Identifier::new("b", "s", "c", "k");
        assert!(matches!(check_command_count(0, &id), Err(KvError::NoCommands(_))));
        assert!(check_command_count(1, &id).is_ok());
        assert!(check_command_count(16, &id).is_ok());
        assert!(matches!(
            check_command_count(17, &id),
            Err(KvError::TooManyCommands { max: 16, .. })
        ));
    }
}
