//! Bolt protocol version definitions.

use std::fmt;

/// Bolt protocol versions.
///
/// The discriminant is `major << 8 | minor`, which orders versions
/// naturally. On the wire a version is 4 bytes `[0x00, range, minor, major]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum BoltVersion {
    /// Bolt 4.0
    V4_0 = 0x0400,
    /// Bolt 4.1 - routing context in HELLO
    V4_1 = 0x0401,
    /// Bolt 4.2
    V4_2 = 0x0402,
    /// Bolt 4.3 - ROUTE message, connection hints
    V4_3 = 0x0403,
    /// Bolt 4.4 - impersonation
    V4_4 = 0x0404,
    /// Bolt 5.0
    V5_0 = 0x0500,
    /// Bolt 5.1 - LOGON
    V5_1 = 0x0501,
    /// Bolt 5.2 - notification filters
    V5_2 = 0x0502,
}

/// Optional protocol features, per version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// HELLO carries the routing context
    pub routing_in_hello: bool,
    /// HELLO SUCCESS carries configuration hints
    pub hints: bool,
    /// HELLO requests the `utc` patch
    pub utc_patch: bool,
    /// Routing tables come from the ROUTE message, not a procedure call
    pub route_message: bool,
    /// ROUTE carries a `{db, imp_user}` map instead of a database name
    pub route_db_context: bool,
    /// RUN/BEGIN/ROUTE accept `imp_user`
    pub impersonation: bool,
    /// Credentials are sent with LOGON instead of HELLO
    pub logon: bool,
    /// HELLO/RUN/BEGIN accept notification filters
    pub notification_filters: bool,
}

const V4_0_CAPS: Capabilities = Capabilities {
    routing_in_hello: false,
    hints: false,
    utc_patch: false,
    route_message: false,
    route_db_context: false,
    impersonation: false,
    logon: false,
    notification_filters: false,
};

const V4_1_CAPS: Capabilities = Capabilities {
    routing_in_hello: true,
    ..V4_0_CAPS
};

const V4_3_CAPS: Capabilities = Capabilities {
    hints: true,
    utc_patch: true,
    route_message: true,
    ..V4_1_CAPS
};

const V4_4_CAPS: Capabilities = Capabilities {
    route_db_context: true,
    impersonation: true,
    ..V4_3_CAPS
};

const V5_0_CAPS: Capabilities = Capabilities {
    utc_patch: false,
    ..V4_4_CAPS
};

const V5_1_CAPS: Capabilities = Capabilities {
    logon: true,
    ..V5_0_CAPS
};

const V5_2_CAPS: Capabilities = Capabilities {
    notification_filters: true,
    ..V5_1_CAPS
};

impl BoltVersion {
    /// All supported versions in order of preference (newest first).
    pub const ALL: [BoltVersion; 8] = [
        BoltVersion::V5_2,
        BoltVersion::V5_1,
        BoltVersion::V5_0,
        BoltVersion::V4_4,
        BoltVersion::V4_3,
        BoltVersion::V4_2,
        BoltVersion::V4_1,
        BoltVersion::V4_0,
    ];

    /// Look up a version by major/minor.
    pub fn new(major: u8, minor: u8) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.major() == major && v.minor() == minor)
    }

    /// Get the major version number.
    pub fn major(self) -> u8 {
        ((self as u16) >> 8) as u8
    }

    /// Get the minor version number.
    pub fn minor(self) -> u8 {
        ((self as u16) & 0xFF) as u8
    }

    /// Wire form with a zero range: `[0x00, 0x00, minor, major]`.
    pub fn to_bytes(self) -> [u8; 4] {
        [0x00, 0x00, self.minor(), self.major()]
    }

    /// Parse a version from a 4-byte handshake reply.
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        Self::new(bytes[3], bytes[2])
    }

    /// Feature table for this version.
    pub fn capabilities(self) -> &'static Capabilities {
        match self {
            BoltVersion::V4_0 => &V4_0_CAPS,
            BoltVersion::V4_1 | BoltVersion::V4_2 => &V4_1_CAPS,
            BoltVersion::V4_3 => &V4_3_CAPS,
            BoltVersion::V4_4 => &V4_4_CAPS,
            BoltVersion::V5_0 => &V5_0_CAPS,
            BoltVersion::V5_1 => &V5_1_CAPS,
            BoltVersion::V5_2 => &V5_2_CAPS,
        }
    }
}

impl fmt::Display for BoltVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_major_minor() {
        assert_eq!(BoltVersion::V4_3.major(), 4);
        assert_eq!(BoltVersion::V4_3.minor(), 3);
        assert_eq!(BoltVersion::V5_2.major(), 5);
        assert_eq!(BoltVersion::V5_2.minor(), 2);
    }

    #[test]
    fn test_version_bytes() {
        assert_eq!(BoltVersion::V4_3.to_bytes(), [0x00, 0x00, 0x03, 0x04]);
        assert_eq!(
            BoltVersion::from_bytes([0x00, 0x00, 0x02, 0x05]),
            Some(BoltVersion::V5_2)
        );
        assert_eq!(BoltVersion::from_bytes([0x00, 0x00, 0x00, 0x03]), None);
        assert_eq!(BoltVersion::from_bytes([0x00; 4]), None);
    }

    #[test]
    fn test_version_ordering() {
        assert!(BoltVersion::V5_0 > BoltVersion::V4_4);
        assert!(BoltVersion::V5_2 > BoltVersion::V5_1);
        assert!(BoltVersion::V4_1 > BoltVersion::V4_0);
        let mut sorted = BoltVersion::ALL;
        sorted.sort();
        sorted.reverse();
        assert_eq!(sorted, BoltVersion::ALL);
    }

    #[test]
    fn test_version_display() {
        assert_eq!(BoltVersion::V4_0.to_string(), "4.0");
        assert_eq!(BoltVersion::V5_1.to_string(), "5.1");
    }

    #[test]
    fn test_capability_table() {
        assert!(!BoltVersion::V4_0.capabilities().routing_in_hello);
        assert!(BoltVersion::V4_2.capabilities().routing_in_hello);
        assert!(!BoltVersion::V4_2.capabilities().route_message);
        assert!(BoltVersion::V4_3.capabilities().route_message);
        assert!(!BoltVersion::V4_3.capabilities().route_db_context);
        assert!(BoltVersion::V4_4.capabilities().impersonation);
        assert!(BoltVersion::V4_4.capabilities().utc_patch);
        assert!(!BoltVersion::V5_0.capabilities().utc_patch);
        assert!(!BoltVersion::V5_0.capabilities().logon);
        assert!(BoltVersion::V5_1.capabilities().logon);
        assert!(!BoltVersion::V5_1.capabilities().notification_filters);
        assert!(BoltVersion::V5_2.capabilities().notification_filters);
    }
}
