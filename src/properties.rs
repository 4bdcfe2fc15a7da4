//! Window property bag and the well-known keys the server interprets.
//!
//! Values travel as opaque byte vectors. Primitive values (booleans, integers,
//! ids) use an 8-byte little-endian encoding.

use std::collections::BTreeMap;

use crate::ids::WindowId;

pub const ALWAYS_ON_TOP: &str = "prop:always_on_top";
pub const WINDOW_TYPE: &str = "prop:window_type";
/// Transport-encoded id of the container a new top-level should be parented to.
pub const CONTAINER_ID: &str = "prop:container_id";
pub const NAME: &str = "prop:name";

pub fn encode_primitive(value: i64) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn decode_primitive(bytes: &[u8]) -> Option<i64> {
    let array: [u8; 8] = bytes.try_into().ok()?;
    Some(i64::from_le_bytes(array))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: BTreeMap<String, Vec<u8>>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.values.get(key).map(Vec::as_slice)
    }

    /// Sets or clears `key`. Returns true if the stored value changed.
    pub fn set(&mut self, key: impl Into<String>, value: Option<Vec<u8>>) -> bool {
        let key = key.into();
        match value {
            Some(value) => self.values.insert(key, value.clone()).as_ref() != Some(&value),
            None => self.values.remove(&key).is_some(),
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(decode_primitive).map(|v| v != 0)
    }

    pub fn set_bool(&mut self, key: &str, value: bool) -> bool {
        self.set(key, Some(encode_primitive(value as i64)))
    }

    pub fn get_window_id(&self, key: &str) -> Option<WindowId> {
        self.get(key)
            .and_then(decode_primitive)
            .map(|v| WindowId::from_transport(v as u64))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn merge(&mut self, other: &Properties) {
        for (key, value) in other.iter() {
            self.values.insert(key.to_string(), value.to_vec());
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<u8>)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, Vec<u8>)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Kind of top-level a client asks for. Carried in [`WINDOW_TYPE`] as a UTF-8
/// name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    Normal,
    Panel,
    Popup,
    Menu,
    Tooltip,
    Bubble,
    Drag,
}

impl WindowType {
    pub fn as_str(self) -> &'static str {
        match self {
            WindowType::Normal => "normal",
            WindowType::Panel => "panel",
            WindowType::Popup => "popup",
            WindowType::Menu => "menu",
            WindowType::Tooltip => "tooltip",
            WindowType::Bubble => "bubble",
            WindowType::Drag => "drag",
        }
    }

    pub fn from_property(bytes: &[u8]) -> Option<Self> {
        let name = std::str::from_utf8(bytes).ok()?;
        Some(match name {
            "normal" => WindowType::Normal,
            "panel" => WindowType::Panel,
            "popup" => WindowType::Popup,
            "menu" => WindowType::Menu,
            "tooltip" => WindowType::Tooltip,
            "bubble" => WindowType::Bubble,
            "drag" => WindowType::Drag,
            _ => return None,
        })
    }

    pub fn to_property(self) -> Vec<u8> {
        self.as_str().as_bytes().to_vec()
    }
}
