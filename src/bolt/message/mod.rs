//! Bolt protocol message types.
//!
//! Request messages for versions 4.0 through 5.2, the four response
//! messages, and the metadata carried in them.

pub mod metadata;
pub mod request;
pub mod response;

pub use metadata::*;
pub use request::*;
pub use response::*;

/// Bolt message signatures (structure tags).
#[allow(missing_docs)]
pub mod tag {
    // Requests
    pub const HELLO: u8 = 0x01;
    pub const GOODBYE: u8 = 0x02;
    pub const RESET: u8 = 0x0F;
    pub const RUN: u8 = 0x10;
    pub const BEGIN: u8 = 0x11;
    pub const COMMIT: u8 = 0x12;
    pub const ROLLBACK: u8 = 0x13;
    pub const DISCARD: u8 = 0x2F;
    pub const PULL: u8 = 0x3F;
    /// Bolt 4.3+
    pub const ROUTE: u8 = 0x66;
    /// Bolt 5.1+
    pub const LOGON: u8 = 0x6A;

    // Responses
    pub const SUCCESS: u8 = 0x70;
    pub const RECORD: u8 = 0x71;
    pub const IGNORED: u8 = 0x7E;
    pub const FAILURE: u8 = 0x7F;

    /// Message name for a signature, for logs and assertions.
    pub fn name(tag: u8) -> Option<&'static str> {
        Some(match tag {
            HELLO => "HELLO",
            GOODBYE => "GOODBYE",
            RESET => "RESET",
            RUN => "RUN",
            BEGIN => "BEGIN",
            COMMIT => "COMMIT",
            ROLLBACK => "ROLLBACK",
            DISCARD => "DISCARD",
            PULL => "PULL",
            ROUTE => "ROUTE",
            LOGON => "LOGON",
            SUCCESS => "SUCCESS",
            RECORD => "RECORD",
            IGNORED => "IGNORED",
            FAILURE => "FAILURE",
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::tag;

    #[test]
    fn test_tag_names() {
        assert_eq!(tag::name(tag::PULL), Some("PULL"));
        assert_eq!(tag::name(0x3F), Some("PULL"));
        assert_eq!(tag::name(tag::FAILURE), Some("FAILURE"));
        // LOGOFF and TELEMETRY are not spoken
        assert_eq!(tag::name(0x6B), None);
        assert_eq!(tag::name(0x54), None);
    }
}
