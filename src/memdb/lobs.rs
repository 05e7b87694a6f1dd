//! LOB storage of the in-memory server

use super::State;
use crate::{Error, Result, err::{ORA_INCONSISTENT_TYPES, ORA_NONEXISTENT_LOB, ORA_NUMERIC_OR_VALUE}, server::Locator, types::LobKind};

/// LOB content. CLOBs are stored as text, offsets count characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LobData {
    Char(String),
    Binary(Vec<u8>),
}

fn byte_index(txt: &str, char_pos: usize) -> usize {
    txt.char_indices().nth(char_pos).map_or(txt.len(), |(idx, _)| idx)
}

impl LobData {
    pub(crate) fn empty(kind: LobKind) -> Self {
        match kind {
            LobKind::Clob => LobData::Char(String::new()),
            LobKind::Blob => LobData::Binary(Vec::new()),
        }
    }

    pub(crate) fn kind(&self) -> LobKind {
        match self {
            LobData::Char(_)   => LobKind::Clob,
            LobData::Binary(_) => LobKind::Blob,
        }
    }

    /// Length in characters (CLOB) or bytes (BLOB)
    pub(crate) fn len(&self) -> u64 {
        match self {
            LobData::Char(txt)   => txt.chars().count() as u64,
            LobData::Binary(bin) => bin.len() as u64,
        }
    }

    pub(crate) fn read(&self, offset: u64, amount: usize) -> Vec<u8> {
        let offset = offset as usize;
        match self {
            LobData::Char(txt) => {
                let start = byte_index(txt, offset);
                let end = start + byte_index(&txt[start..], amount);
                txt[start..end].as_bytes().to_vec()
            }
            LobData::Binary(bin) => {
                let start = offset.min(bin.len());
                let end = start.saturating_add(amount).min(bin.len());
                bin[start..end].to_vec()
            }
        }
    }

    /// Overwrites the content at `offset`. A gap past the end is filled with spaces (CLOB) or zeros (BLOB).
    pub(crate) fn write(&mut self, offset: u64, data: &[u8]) -> Result<u64> {
        let offset = offset as usize;
        match self {
            LobData::Char(txt) => {
                let piece = std::str::from_utf8(data)
                    .map_err(|err| Error::oracle(ORA_NUMERIC_OR_VALUE, format_args!("invalid character data: {}", err)))?;
                let len = txt.chars().count();
                if offset >= len {
                    txt.extend(std::iter::repeat(' ').take(offset - len));
                    txt.push_str(piece);
                } else {
                    let start = byte_index(txt, offset);
                    let end = start + byte_index(&txt[start..], piece.chars().count());
                    txt.replace_range(start..end, piece);
                }
                Ok( piece.chars().count() as u64 )
            }
            LobData::Binary(bin) => {
                if bin.len() < offset {
                    bin.resize(offset, 0);
                }
                let end = offset + data.len();
                if bin.len() < end {
                    bin.resize(end, 0);
                }
                bin[offset..end].copy_from_slice(data);
                Ok( data.len() as u64 )
            }
        }
    }
}

fn nonexistent(loc: &Locator) -> Error {
    Error::oracle(ORA_NONEXISTENT_LOB, format_args!("nonexistent LOB value (locator {})", loc.id))
}

impl State {
    fn next_lob_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Creates a temporary LOB. It has no client references until one is granted.
    pub(crate) fn new_temp(&mut self, data: LobData) -> Locator {
        let id = self.next_lob_id();
        let kind = data.kind();
        self.temps.insert(id, data);
        Locator { id, kind }
    }

    /// Creates a LOB that lives in the transactional state.
    pub(crate) fn new_persistent(&mut self, data: LobData) -> Locator {
        let id = self.next_lob_id();
        let kind = data.kind();
        self.working.lobs.insert(id, data);
        Locator { id, kind }
    }

    pub(crate) fn is_temp(&self, loc: &Locator) -> bool {
        self.temps.contains_key(&loc.id)
    }

    pub(crate) fn lob(&self, loc: &Locator) -> Result<&LobData> {
        let data = self.temps.get(&loc.id)
            .or_else(|| self.working.lobs.get(&loc.id))
            .ok_or_else(|| nonexistent(loc))?;
        if data.kind() != loc.kind {
            return Err( Error::oracle(ORA_INCONSISTENT_TYPES, "inconsistent datatypes: locator does not match the LOB type") );
        }
        Ok(data)
    }

    pub(crate) fn lob_mut(&mut self, loc: &Locator) -> Result<&mut LobData> {
        let data = match self.temps.get_mut(&loc.id) {
            Some(data) => data,
            None => self.working.lobs.get_mut(&loc.id).ok_or_else(|| nonexistent(loc))?,
        };
        if data.kind() != loc.kind {
            return Err( Error::oracle(ORA_INCONSISTENT_TYPES, "inconsistent datatypes: locator does not match the LOB type") );
        }
        Ok(data)
    }

    /// Gives a client a reference to the LOB.
    pub(crate) fn grant(&mut self, loc: &Locator) {
        *self.refs.entry(loc.id).or_insert(0) += 1;
    }

    /// Drops a client reference. Temporary LOBs without references are freed.
    pub(crate) fn release(&mut self, loc: &Locator) {
        let remaining = match self.refs.get_mut(&loc.id) {
            Some(cnt) => {
                *cnt -= 1;
                *cnt
            }
            None => return,
        };
        if remaining == 0 {
            self.refs.remove(&loc.id);
            if self.temps.remove(&loc.id).is_some() {
                tracing::trace!(id = loc.id, "temporary LOB freed");
            }
        }
    }

    pub(crate) fn references(&self) -> usize {
        self.refs.values().sum()
    }

    /// Frees the temporary LOB unless a client holds a reference to it.
    pub(crate) fn free_unreferenced_temp(&mut self, id: u64) {
        if !self.refs.contains_key(&id) {
            self.temps.remove(&id);
        }
    }

    /// Drops persistent LOBs that are neither stored in a table nor referenced by a client.
    pub(crate) fn collect_garbage(&mut self) {
        let mut stored = std::collections::HashSet::new();
        for table in self.working.tables.values() {
            for row in &table.rows {
                for val in row {
                    if let crate::server::ServerValue::Locator(loc) = val {
                        stored.insert(loc.id);
                    }
                }
            }
        }
        let refs = &self.refs;
        self.working.lobs.retain(|id, _| stored.contains(id) || refs.contains_key(id));
    }
}
