use std::collections::BTreeMap;

use crate::{
    table::{
        CLIENT_SIG_PROPERTY,
        bth::BthHeader,
        heap::{self, Heap, Hnid},
    },
    types::{
        PropertyId,
        error::{PstError, Result},
        value::{PropertyType, PropertyValue},
    },
    utils::bytes::{u16_at, u32_at},
};

/// Flat tag -> value map of one node: a BTH with 2-byte property-id keys
/// and 6-byte (type, value-or-reference) entries.
///
/// Values living outside the heap stay as `PropertyValue::External`; the
/// container chases those through the node's subnode tree.
#[derive(Debug, Default)]
pub struct PropertyContext {
    props: BTreeMap<PropertyId, PropertyValue>,
}

impl PropertyContext {
    pub fn parse(heap: &Heap) -> Result<PropertyContext> {
        if heap.client_sig != CLIENT_SIG_PROPERTY {
            return Err(PstError::SignatureMismatch {
                expected: CLIENT_SIG_PROPERTY,
                actual: heap.client_sig,
            });
        }
        let bth = BthHeader::parse(heap, heap.user_root)?;
        if bth.key_size != 2 || bth.value_size != 6 {
            return Err(PstError::TableDecode {
                reason: format!(
                    "property index with {}-byte keys and {}-byte entries",
                    bth.key_size, bth.value_size
                ),
            });
        }

        let mut props = BTreeMap::new();
        for (key, value) in bth.records(heap)? {
            let id = u16_at(&key, 0)?;
            let kind = PropertyType::from_u16(u16_at(&value, 0)?);
            let raw = u32_at(&value, 2)?;
            props.insert(id, decode_value(heap, kind, raw)?);
        }
        Ok(PropertyContext { props })
    }

    pub fn get(&self, id: PropertyId) -> Option<&PropertyValue> {
        self.props.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropertyId, &PropertyValue)> {
        self.props.iter()
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Replace an external reference once the container has fetched it.
    pub fn put(&mut self, id: PropertyId, value: PropertyValue) {
        self.props.insert(id, value);
    }

    pub fn into_map(self) -> BTreeMap<PropertyId, PropertyValue> {
        self.props
    }
}

fn decode_value(heap: &Heap, kind: PropertyType, raw: u32) -> Result<PropertyValue> {
    if kind.is_inline() {
        return Ok(PropertyValue::decode_inline(kind, raw));
    }
    match heap::classify(raw) {
        Hnid::Empty => Ok(PropertyValue::Null),
        Hnid::Heap(hid) => Ok(PropertyValue::decode_buffer(kind, heap.resolve(hid)?)),
        Hnid::Node(node) => Ok(PropertyValue::External { node, kind }),
    }
}
