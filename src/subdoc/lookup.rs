use serde::{Deserialize, Serialize};

use super::{
    SUBDOC_MAX_FIELDS, SubdocCommandKind, XattrOrdered, check_command_count, finalize_commands,
    lookup_macros, path_flags,
};
use crate::core::{Identifier, KvError, Result};

/// One path-level read as it goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdocGetCommand {
    pub kind: SubdocCommandKind,
    pub path: String,
    pub xattr: bool,
    /// Position in the caller's submission, kept across the xattr sort.
    pub original_index: u32,
}

impl SubdocGetCommand {
    pub fn new(kind: SubdocCommandKind, path: impl Into<String>, xattr: bool, index: u32) -> Self {
        Self {
            kind,
            path: path.into(),
            xattr,
            original_index: index,
        }
    }

    pub fn path_flags(&self) -> u8 {
        if self.xattr { path_flags::XATTR } else { 0 }
    }
}

impl XattrOrdered for SubdocGetCommand {
    fn is_xattr(&self) -> bool {
        self.xattr
    }
}

/// Caller-facing description of a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupInSpec {
    kind: SubdocCommandKind,
    path: String,
    xattr: bool,
}

impl LookupInSpec {
    /// Fetches a path; the empty path fetches the whole document.
    pub fn get(path: impl Into<String>) -> Self {
        let path = path.into();
        let kind = if path.is_empty() {
            SubdocCommandKind::GetDoc
        } else {
            SubdocCommandKind::Get
        };
        Self {
            kind,
            path,
            xattr: false,
        }
    }

    pub fn exists(path: impl Into<String>) -> Self {
        Self {
            kind: SubdocCommandKind::Exists,
            path: path.into(),
            xattr: false,
        }
    }

    pub fn count(path: impl Into<String>) -> Self {
        Self {
            kind: SubdocCommandKind::Count,
            path: path.into(),
            xattr: false,
        }
    }

    /// Addresses the path in the extended attributes instead of the body.
    pub fn xattr(mut self) -> Self {
        self.xattr = true;
        self
    }

    pub fn kind(&self) -> SubdocCommandKind {
        self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn export(&self, index: u32) -> SubdocGetCommand {
        SubdocGetCommand::new(self.kind, self.path.clone(), self.xattr, index)
    }
}

/// Commands for a projected and/or expiry-inclusive fetch.
///
/// With no projections the body is fetched whole through one `GetDoc`. When
/// the expiry is requested its macro takes the first slot, which lowers the
/// projection ceiling to 15; without projections the flags macro follows it
/// so the reader can restore the document format. Projections imply JSON and
/// skip the flags macro.
pub fn projection_commands(
    projections: &[String],
    with_expiry: bool,
    id: &Identifier,
) -> Result<Vec<SubdocGetCommand>> {
    let limit = if with_expiry {
        SUBDOC_MAX_FIELDS - 1
    } else {
        SUBDOC_MAX_FIELDS
    };
    if projections.len() > limit {
        let message = if with_expiry {
            "Only a maximum of 16 fields can be projected per request due to a server limitation (includes the expiration macro as one field)"
        } else {
            "Only a maximum of 16 fields can be projected per request due to a server limitation"
        };
        return Err(KvError::invalid_argument(message, id));
    }

    let mut commands = Vec::with_capacity(SUBDOC_MAX_FIELDS);
    if projections.is_empty() {
        commands.push(SubdocGetCommand::new(SubdocCommandKind::GetDoc, "", false, 0));
    } else {
        for (index, path) in projections.iter().enumerate() {
            commands.push(SubdocGetCommand::new(
                SubdocCommandKind::Get,
                path.clone(),
                false,
                index as u32,
            ));
        }
    }

    if with_expiry {
        let next = commands.len() as u32;
        commands.insert(
            0,
            SubdocGetCommand::new(SubdocCommandKind::Get, lookup_macros::EXPIRY_TIME, true, next),
        );
        if projections.is_empty() {
            commands.insert(
                1,
                SubdocGetCommand::new(SubdocCommandKind::Get, lookup_macros::FLAGS, true, next + 1),
            );
        }
    }

    finalize_commands(&mut commands);
    Ok(commands)
}

/// Commands for an explicit lookup, exported in submission order then sorted
/// xattrs first.
pub fn lookup_in_commands(specs: &[LookupInSpec], id: &Identifier) -> Result<Vec<SubdocGetCommand>> {
    check_command_count(specs.len(), id)?;

    let mut commands = specs
        .iter()
        .enumerate()
        .map(|(index, spec)| spec.export(index as u32))
        .collect::<Vec<_>>();
    finalize_commands(&mut commands);
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> Identifier {
        Identifier::new("b", "_default", "_default", "doc")
    }

    fn paths(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("field{}", i)).collect()
    }

    #[test]
    fn plain_projection_keeps_order() {
        let cmds = projection_commands(&paths(3), false, &id()).unwrap();
        assert_eq!(cmds.len(), 3);
        for (i, cmd) in cmds.iter().enumerate() {
            assert_eq!(cmd.kind, SubdocCommandKind::Get);
            assert_eq!(cmd.path, format!("field{}", i));
            assert!(!cmd.xattr);
        }
    }

    #[test]
    fn expiry_without_projections_adds_both_macros() {
        let cmds = projection_commands(&[], true, &id()).unwrap();
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds[0].path, lookup_macros::EXPIRY_TIME);
        assert_eq!(cmds[1].path, lookup_macros::FLAGS);
        assert!(cmds[0].xattr && cmds[1].xattr);
        assert_eq!(cmds[2].kind, SubdocCommandKind::GetDoc);
        assert!(!cmds[2].xattr);
    }

    #[test]
    fn expiry_with_projections_adds_only_expiry_macro() {
        let cmds = projection_commands(&paths(2), true, &id()).unwrap();
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds.iter().filter(|c| c.xattr).count(), 1);
        assert_eq!(cmds[0].path, lookup_macros::EXPIRY_TIME);
        assert_eq!(cmds[0].original_index, 2);
    }

    #[test]
    fn expiry_macro_consumes_a_slot() {
        assert_eq!(projection_commands(&paths(15), true, &id()).unwrap().len(), 16);
        assert!(projection_commands(&paths(16), true, &id()).unwrap_err().is_validation());
        assert_eq!(projection_commands(&paths(16), false, &id()).unwrap().len(), 16);
        assert!(projection_commands(&paths(17), false, &id()).is_err());
    }

    #[test]
    fn lookup_in_sorts_xattrs_first() {
        let specs = vec![
            LookupInSpec::get("a"),
            LookupInSpec::get("meta").xattr(),
            LookupInSpec::count("list"),
            LookupInSpec::exists(lookup_macros::CAS).xattr(),
        ];
        let cmds = lookup_in_commands(&specs, &id()).unwrap();
        let order = cmds.iter().map(|c| c.original_index).collect::<Vec<_>>();
        assert_eq!(order, vec![1, 3, 0, 2]);
    }

    #[test]
    fn empty_path_fetches_whole_document() {
        assert_eq!(LookupInSpec::get("").kind(), SubdocCommandKind::GetDoc);
    }
}
