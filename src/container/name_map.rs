use std::collections::HashMap;

use log::debug;

use crate::{
    container::PstFile,
    types::{
        NAMED_PROPERTY_BASE, NID_NAME_TO_ID_MAP, PropertyId, TAG_NAMEID_ENTRIES,
        TAG_NAMEID_STRINGS,
        error::Result,
        value::utf16le_to_string,
    },
    utils::bytes::{slice_at, u16_at, u32_at},
};

/// Key half of a named-property registration: a numeric id or a name
/// resolved out of the string stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NameKey {
    Id(u32),
    Name(String),
}

/// Per-container registry mapping (guid-set index, key) to a property tag.
/// Built once at open from node 97, read-only afterwards, dropped with the
/// container.
#[derive(Debug, Default)]
pub struct NameToIdMap {
    entries: HashMap<(u16, NameKey), PropertyId>,
}

impl NameToIdMap {
    /// `Ok(None)` when the container carries no registry node.
    pub fn build(file: &mut PstFile) -> Result<Option<NameToIdMap>> {
        if file.node_entry(NID_NAME_TO_ID_MAP)?.is_none() {
            return Ok(None);
        }
        let props = file.properties(NID_NAME_TO_ID_MAP)?;
        let records = props.get_binary(TAG_NAMEID_ENTRIES, &[]);
        let strings = props.get_binary(TAG_NAMEID_STRINGS, &[]);

        let mut entries = HashMap::new();
        for record in records.chunks_exact(8) {
            let key_dword = u32_at(record, 0)?;
            let guid_word = u16_at(record, 4)?;
            let prop_index = u16_at(record, 6)?;
            let tag = NAMED_PROPERTY_BASE.wrapping_add(prop_index);
            let guid_set = guid_word >> 1;

            let key = if guid_word & 1 == 0 {
                NameKey::Id(key_dword)
            } else {
                // String keys index into the string stream: a length
                // prefix, then that many UTF-16 bytes.
                let offset = key_dword as usize;
                let len = u32_at(&strings, offset)? as usize;
                NameKey::Name(utf16le_to_string(slice_at(&strings, offset + 4, len)?))
            };
            entries.insert((guid_set, key), tag);
        }
        debug!("name-to-id map holds {} entries", entries.len());
        Ok(Some(NameToIdMap { entries }))
    }

    pub fn lookup(&self, key: &NameKey, guid_set: u16) -> Option<PropertyId> {
        self.entries.get(&(guid_set, key.clone())).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
