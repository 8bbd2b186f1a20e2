//! Bolt protocol response messages.
//!
//! Response messages are sent from the server to the client.

use std::fmt;

use super::tag;
use crate::bolt::packstream::{PackStreamError, PackStreamMap, PackStreamStructure, PackStreamValue};

/// All Bolt response messages.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltResponse {
    /// SUCCESS - Operation completed successfully
    Success(SuccessMessage),
    /// RECORD - Query result record
    Record(RecordMessage),
    /// FAILURE - Operation failed
    Failure(FailureMessage),
    /// IGNORED - Message was ignored (connection in FAILED state)
    Ignored,
}

impl BoltResponse {
    /// Get the message tag.
    pub fn tag(&self) -> u8 {
        match self {
            BoltResponse::Success(_) => tag::SUCCESS,
            BoltResponse::Record(_) => tag::RECORD,
            BoltResponse::Failure(_) => tag::FAILURE,
            BoltResponse::Ignored => tag::IGNORED,
        }
    }

    /// Get message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BoltResponse::Success(_) => "SUCCESS",
            BoltResponse::Record(_) => "RECORD",
            BoltResponse::Failure(_) => "FAILURE",
            BoltResponse::Ignored => "IGNORED",
        }
    }

    /// Check if this message ends a response (anything but RECORD).
    pub fn is_summary(&self) -> bool {
        !matches!(self, BoltResponse::Record(_))
    }

    /// Parse from PackStream structure.
    pub fn from_structure(s: PackStreamStructure) -> Result<Self, PackStreamError> {
        match s.tag {
            tag::SUCCESS => Ok(BoltResponse::Success(SuccessMessage {
                metadata: first_map(s.fields)?,
            })),
            tag::RECORD => {
                let fields = match s.fields.into_iter().next() {
                    Some(PackStreamValue::List(list)) => list,
                    Some(_) => {
                        return Err(PackStreamError::InvalidStructure(
                            "RECORD fields must be list".to_string(),
                        ))
                    }
                    None => Vec::new(),
                };
                Ok(BoltResponse::Record(RecordMessage { fields }))
            }
            tag::FAILURE => Ok(BoltResponse::Failure(FailureMessage {
                metadata: first_map(s.fields)?,
            })),
            tag::IGNORED => Ok(BoltResponse::Ignored),
            _ => Err(PackStreamError::InvalidStructure(format!(
                "Unknown response message tag: 0x{:02X}",
                s.tag
            ))),
        }
    }
}

/// Log form. RECORD contents are not rendered.
impl fmt::Display for BoltResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoltResponse::Success(msg) => {
                write!(f, "SUCCESS ")?;
                crate::bolt::packstream::types::fmt_map(&msg.metadata, f)
            }
            BoltResponse::Record(msg) => write!(f, "RECORD [{} values]", msg.fields.len()),
            BoltResponse::Failure(msg) => {
                write!(f, "FAILURE ")?;
                crate::bolt::packstream::types::fmt_map(&msg.metadata, f)
            }
            BoltResponse::Ignored => write!(f, "IGNORED"),
        }
    }
}

fn first_map(fields: Vec<PackStreamValue>) -> Result<PackStreamMap, PackStreamError> {
    match fields.into_iter().next() {
        Some(PackStreamValue::Map(map)) => Ok(map),
        None => Ok(PackStreamMap::new()),
        Some(other) => Err(PackStreamError::InvalidStructure(format!(
            "Expected metadata map, received {}",
            other.type_name()
        ))),
    }
}

/// SUCCESS message - Operation completed successfully.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SuccessMessage {
    /// Response metadata
    pub metadata: PackStreamMap,
}

impl SuccessMessage {
    /// Create a SUCCESS message with metadata.
    pub fn with_metadata(metadata: PackStreamMap) -> Self {
        Self { metadata }
    }

    /// Get metadata entry.
    pub fn get(&self, key: &str) -> Option<&PackStreamValue> {
        self.metadata.get(key)
    }

    /// Get server agent.
    pub fn server(&self) -> Option<&str> {
        self.get("server").and_then(|v| v.as_str())
    }

    /// Get connection ID.
    pub fn connection_id(&self) -> Option<&str> {
        self.get("connection_id").and_then(|v| v.as_str())
    }

    /// Get configuration hints from HELLO success.
    pub fn hints(&self) -> Option<&PackStreamMap> {
        self.get("hints").and_then(|v| v.as_map())
    }

    /// Get field names from RUN success.
    pub fn fields(&self) -> Option<Vec<String>> {
        self.get("fields").and_then(|v| v.as_list()).map(|list| {
            list.iter()
                .filter_map(|item| item.as_str().map(|s| s.to_string()))
                .collect()
        })
    }

    /// Check if there are more results.
    pub fn has_more(&self) -> bool {
        self.get("has_more")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Get bookmark.
    pub fn bookmark(&self) -> Option<&str> {
        self.get("bookmark").and_then(|v| v.as_str())
    }

    /// Get database name.
    pub fn db(&self) -> Option<&str> {
        self.get("db").and_then(|v| v.as_str())
    }

    /// Get query ID.
    pub fn qid(&self) -> Option<i64> {
        self.get("qid").and_then(|v| v.as_int())
    }

    /// Get the routing table row of a ROUTE success.
    pub fn rt(&self) -> Option<&PackStreamMap> {
        self.get("rt").and_then(|v| v.as_map())
    }
}

/// RECORD message - Query result record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordMessage {
    /// Field values
    pub fields: Vec<PackStreamValue>,
}

impl RecordMessage {
    /// Create a new RECORD message.
    pub fn new(fields: Vec<PackStreamValue>) -> Self {
        Self { fields }
    }

    /// Get field count.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if record is empty.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Get field at index.
    pub fn get(&self, index: usize) -> Option<&PackStreamValue> {
        self.fields.get(index)
    }
}

/// FAILURE message - Operation failed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FailureMessage {
    /// Failure metadata (`code`, `message`, ...)
    pub metadata: PackStreamMap,
}

impl FailureMessage {
    /// Create a FAILURE with code and message.
    pub fn new(code: &str, message: &str) -> Self {
        let mut metadata = PackStreamMap::new();
        metadata.insert("code".to_string(), code.into());
        metadata.insert("message".to_string(), message.into());
        Self { metadata }
    }

    /// Status code, if the server sent one.
    pub fn code(&self) -> Option<&str> {
        self.metadata.get("code").and_then(|v| v.as_str())
    }

    /// Error message, if the server sent one.
    pub fn message(&self) -> Option<&str> {
        self.metadata.get("message").and_then(|v| v.as_str())
    }
}

impl fmt::Display for FailureMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.code().unwrap_or("<no code>"),
            self.message().unwrap_or("<no message>")
        )
    }
}
