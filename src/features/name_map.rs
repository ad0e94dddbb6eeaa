use bstr::{BStr, BString, ByteSlice};

use fnv::FnvHashMap;

/// Bidirectional map between contig labels and the dense integer
/// ids used by the binning core. Ids are handed out in insertion
/// order, starting at 0.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NameMap {
    pub(crate) name_map: FnvHashMap<BString, usize>,
    pub(crate) inverse_map: Vec<BString>,
}

impl NameMap {
    pub fn new() -> Self {
        Default::default()
    }

    /// Insert a label and return its new id, or `None` if the label
    /// is already present.
    pub fn insert<N: AsRef<[u8]>>(&mut self, name: N) -> Option<usize> {
        let name = name.as_ref().as_bstr();
        if self.name_map.contains_key(name) {
            return None;
        }
        let id = self.inverse_map.len();
        self.name_map.insert(BString::from(name), id);
        self.inverse_map.push(BString::from(name));
        Some(id)
    }

    pub fn map_name<N: AsRef<[u8]>>(&self, name: N) -> Option<usize> {
        self.name_map.get(name.as_ref().as_bstr()).copied()
    }

    pub fn inverse_map_name(&self, id: usize) -> Option<&'_ BStr> {
        self.inverse_map.get(id).map(|bs| bs.as_bstr())
    }

    pub fn len(&self) -> usize {
        self.inverse_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inverse_map.is_empty()
    }

    /// Iterate over `(id, label)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &'_ BStr)> {
        self.inverse_map
            .iter()
            .enumerate()
            .map(|(id, name)| (id, name.as_bstr()))
    }
}
