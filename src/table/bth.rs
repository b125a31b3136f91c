use crate::{
    table::{
        BTH_SIGNATURE,
        heap::{Heap, Hid},
    },
    types::{
        error::{PstError, Result},
    },
    utils::bytes::{u8_at, u32_at},
};

/// The sorted key/value index both table readers share: key size, value
/// size, levels-to-leaf, and the root heap reference.
#[derive(Debug, Clone, Copy)]
pub struct BthHeader {
    pub key_size: usize,
    pub value_size: usize,
    pub levels: u8,
    pub root: Hid,
}

impl BthHeader {
    pub fn parse(heap: &Heap, hid: Hid) -> Result<BthHeader> {
        let bytes = heap.resolve(hid)?;
        let sig = u8_at(&bytes, 0)?;
        if sig != BTH_SIGNATURE {
            return Err(PstError::SignatureMismatch {
                expected: BTH_SIGNATURE,
                actual: sig,
            });
        }
        Ok(BthHeader {
            key_size: u8_at(&bytes, 1)? as usize,
            value_size: u8_at(&bytes, 2)? as usize,
            levels: u8_at(&bytes, 3)?,
            root: u32_at(&bytes, 4)?,
        })
    }

    /// All leaf records in key order.
    pub fn records(&self, heap: &Heap) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        self.collect(heap, self.root, self.levels, &mut out)?;
        Ok(out)
    }

    /// Point lookup by key; `None` when the key is absent.
    pub fn lookup(&self, heap: &Heap, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut hid = self.root;
        let mut level = self.levels;
        loop {
            if hid == 0 {
                return Ok(None);
            }
            let bytes = heap.resolve(hid)?;
            if level == 0 {
                let width = self.key_size + self.value_size;
                for record in bytes.chunks_exact(width) {
                    if compare_keys(&record[..self.key_size], key) == std::cmp::Ordering::Equal {
                        return Ok(Some(record[self.key_size..].to_vec()));
                    }
                }
                return Ok(None);
            }
            // Branch records: key + child heap id; follow the last one
            // whose key is <= the target.
            let width = self.key_size + 4;
            let mut child = 0;
            for record in bytes.chunks_exact(width) {
                if compare_keys(&record[..self.key_size], key) == std::cmp::Ordering::Greater {
                    break;
                }
                child = u32_at(record, self.key_size)?;
            }
            if child == 0 {
                return Ok(None);
            }
            hid = child;
            level -= 1;
        }
    }

    fn collect(
        &self,
        heap: &Heap,
        hid: Hid,
        level: u8,
        out: &mut Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<()> {
        if hid == 0 {
            return Ok(());
        }
        let bytes = heap.resolve(hid)?;
        if level == 0 {
            let width = self.key_size + self.value_size;
            for record in bytes.chunks_exact(width) {
                out.push((
                    record[..self.key_size].to_vec(),
                    record[self.key_size..].to_vec(),
                ));
            }
            return Ok(());
        }
        let width = self.key_size + 4;
        for record in bytes.chunks_exact(width) {
            let child = u32_at(record, self.key_size)?;
            self.collect(heap, child, level - 1, out)?;
        }
        Ok(())
    }
}

/// Keys are little-endian unsigned integers of the declared size.
fn compare_keys(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    debug_assert_eq!(a.len(), b.len());
    a.iter().rev().cmp(b.iter().rev())
}
