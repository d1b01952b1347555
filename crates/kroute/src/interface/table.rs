//! Interface table keyed by name and by kernel index.

use std::collections::{BTreeMap, HashMap};

use serde::ser::{Serialize, SerializeSeq, Serializer};

use super::{AddressKey, ConnectedAddress, Interface};

#[derive(Debug, Clone, serde::Serialize)]
struct Entry {
    #[serde(flatten)]
    iface: Interface,
    addresses: Vec<ConnectedAddress>,
}

/// Every interface seen since startup.
///
/// Entries are never removed: a deleted interface stays as an inactive entry.
/// Only active entries are reachable by index, and an index resolves to at
/// most one of them.
#[derive(Debug, Clone, Default)]
pub struct InterfaceTable {
    by_name: BTreeMap<String, Entry>,
    by_index: HashMap<u32, String>,
}

/// Serializes as a list of interfaces, each with its addresses.
impl Serialize for InterfaceTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.by_name.len()))?;
        for entry in self.by_name.values() {
            seq.serialize_element(entry)?;
        }
        seq.end()
    }
}

impl InterfaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an interface by name, active or not.
    pub fn get(&self, name: &str) -> Option<&Interface> {
        self.by_name.get(name).map(|e| &e.iface)
    }

    /// Look up the active interface bound to `index`.
    pub fn by_index(&self, index: u32) -> Option<&Interface> {
        let name = self.by_index.get(&index)?;
        self.get(name)
    }

    /// All interfaces in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.by_name.values().map(|e| &e.iface)
    }

    /// Active interfaces in name order.
    pub fn active(&self) -> impl Iterator<Item = &Interface> {
        self.iter().filter(|i| i.active)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Addresses configured on `name`.
    pub fn addresses(&self, name: &str) -> &[ConnectedAddress] {
        self.by_name
            .get(name)
            .map(|e| e.addresses.as_slice())
            .unwrap_or(&[])
    }

    /// Get the entry for `name`, creating an inactive one if needed.
    pub(crate) fn entry(&mut self, name: &str) -> &mut Interface {
        &mut self
            .by_name
            .entry(name.to_string())
            .or_insert_with(|| Entry {
                iface: Interface::new(name),
                addresses: Vec::new(),
            })
            .iface
    }

    /// Mark `name` active under `index`.
    ///
    /// The caller has already evicted any other interface holding `index`.
    pub(crate) fn bind(&mut self, name: &str, index: u32) {
        let Some(entry) = self.by_name.get_mut(name) else {
            return;
        };
        if entry.iface.active && entry.iface.index != index {
            self.by_index.remove(&entry.iface.index);
        }
        entry.iface.index = index;
        entry.iface.active = true;
        self.by_index.insert(index, name.to_string());
    }

    /// Mark `name` inactive and release its index. Its addresses are
    /// forgotten. Returns the entry as it was just before.
    pub(crate) fn deactivate(&mut self, name: &str) -> Option<Interface> {
        let entry = self.by_name.get_mut(name)?;
        if !entry.iface.active {
            return None;
        }
        let before = entry.iface.clone();
        entry.iface.active = false;
        entry.addresses.clear();
        if self.by_index.get(&before.index).map(String::as_str) == Some(name) {
            self.by_index.remove(&before.index);
        }
        Some(before)
    }

    pub(crate) fn find_address(&self, name: &str, key: &AddressKey) -> Option<&ConnectedAddress> {
        self.addresses(name).iter().find(|a| a.key() == *key)
    }

    pub(crate) fn insert_address(&mut self, addr: ConnectedAddress) {
        if let Some(entry) = self.by_name.get_mut(&addr.ifname) {
            entry.addresses.push(addr);
        }
    }

    pub(crate) fn remove_address(&mut self, name: &str, key: &AddressKey) -> Option<ConnectedAddress> {
        let entry = self.by_name.get_mut(name)?;
        let pos = entry.addresses.iter().position(|a| a.key() == *key)?;
        Some(entry.addresses.remove(pos))
    }
}
