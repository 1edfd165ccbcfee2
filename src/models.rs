use serde::{Deserialize, Serialize};

use crate::sender;

/// A single message header as returned by Gmail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Content container of a fetched message. Only headers are ever requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub headers: Vec<Header>,
}

/// Message summary fetched from Gmail: its id and, when Gmail returned one,
/// the header payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub payload: Option<MessagePayload>,
}

impl Message {
    /// Build a message with a payload holding `headers`
    pub fn with_headers(id: impl Into<String>, headers: Vec<Header>) -> Self {
        Self {
            id: id.into(),
            payload: Some(MessagePayload { headers }),
        }
    }

    /// Build a message that has no payload at all
    pub fn without_payload(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: None,
        }
    }

    /// Whether the message carries enough structure for rule evaluation
    pub fn is_structurally_valid(&self) -> bool {
        self.payload.is_some()
    }

    /// Value of the first header named `name` (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Bare sender address taken from the `From` header
    pub fn sender(&self) -> Option<String> {
        self.header("From").and_then(sender::extract_address)
    }

    /// Lower-cased domain of the sender address
    pub fn sender_domain(&self) -> Option<String> {
        let address = self.sender()?;
        sender::domain_of(&address).map(|d| d.to_ascii_lowercase())
    }
}

/// Label info returned from Gmail API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// One page of a message listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}
