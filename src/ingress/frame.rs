//! Bus frame shapes.
//!
//! A frame is one JSON object per line:
//!
//! ```json
//! {"type":"chat","body":[{"name":"perf","children":[{"name":"host","text":"srv1"}]}]}
//! {"type":"items","items":[{"kind":"item","payload":[...]},{"kind":"retract"}]}
//! ```

use serde::{Deserialize, Serialize};

use crate::ingress::IngressError;

/// A named child of a payload element, read as a name/text pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child {
    pub name: String,
    #[serde(default)]
    pub text: String,
}

/// A payload element (`perf` for metrics).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    #[serde(default)]
    pub children: Vec<Child>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Append a child element.
    pub fn child(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.children.push(Child {
            name: name.into(),
            text: text.into(),
        });
        self
    }

    /// Text of the first child with this name.
    pub fn text_of(&self, name: &str) -> Option<&str> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.text.as_str())
    }
}

/// One entry of an item-notification batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ItemEntry {
    /// A published item; its payload is forwarded.
    Item {
        #[serde(default)]
        payload: Vec<Element>,
    },
    /// An item removal; ignored.
    Retract,
    /// Any other entry kind; ignored.
    #[serde(other)]
    Other,
}

/// A frame delivered by the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Direct message whose body holds payload elements.
    Chat {
        #[serde(default)]
        body: Vec<Element>,
    },
    /// Publish/subscribe notification batch.
    Items { items: Vec<ItemEntry> },
}

impl Frame {
    /// Parse one line of the wire format.
    pub fn from_line(line: &str) -> Result<Self, IngressError> {
        Ok(serde_json::from_str(line.trim())?)
    }

    /// Payload elements to forward, in arrival order. Entries other than
    /// items are skipped.
    pub fn elements(&self) -> Vec<&Element> {
        match self {
            Self::Chat { body } => body.iter().collect(),
            Self::Items { items } => items
                .iter()
                .flat_map(|entry| match entry {
                    ItemEntry::Item { payload } => payload.iter().collect::<Vec<_>>(),
                    ItemEntry::Retract | ItemEntry::Other => Vec::new(),
                })
                .collect(),
        }
    }
}
