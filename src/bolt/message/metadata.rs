//! Bolt protocol metadata types.
//!
//! Structured views over maps carried in messages: routing table rows and
//! notification filter values.

use std::fmt;

use crate::bolt::packstream::{PackStreamError, PackStreamMap, PackStreamValue};

/// Server role in routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerRole {
    /// Route server (answers routing requests)
    Route,
    /// Read server
    Read,
    /// Write server
    Write,
}

impl ServerRole {
    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerRole::Route => "ROUTE",
            ServerRole::Read => "READ",
            ServerRole::Write => "WRITE",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ROUTE" => Some(ServerRole::Route),
            "READ" => Some(ServerRole::Read),
            "WRITE" => Some(ServerRole::Write),
            _ => None,
        }
    }
}

/// One `servers` entry of a routing row.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingServer {
    /// Server role
    pub role: ServerRole,
    /// `host:port` strings as sent by the server
    pub addresses: Vec<String>,
}

/// A routing table row: `{ttl, servers, db?}`.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingInfo {
    /// Time to live in seconds
    pub ttl: i64,
    /// Servers with a known role. Unknown roles are dropped.
    pub servers: Vec<RoutingServer>,
    /// Database the table belongs to (Bolt 4.4+)
    pub db: Option<String>,
}

impl RoutingInfo {
    /// Parse a routing row.
    pub fn from_row(row: &PackStreamMap) -> Result<Self, PackStreamError> {
        let ttl = row
            .get("ttl")
            .and_then(|v| v.as_int())
            .ok_or_else(|| invalid("routing row requires an integer ttl"))?;

        let entries = row
            .get("servers")
            .and_then(|v| v.as_list())
            .ok_or_else(|| invalid("routing row requires a servers list"))?;

        let mut servers = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry = entry
                .as_map()
                .ok_or_else(|| invalid("routing server entry must be a map"))?;
            let role = entry
                .get("role")
                .and_then(|v| v.as_str())
                .ok_or_else(|| invalid("routing server entry requires a role"))?;
            let addresses = entry
                .get("addresses")
                .and_then(|v| v.as_list())
                .ok_or_else(|| invalid("routing server entry requires addresses"))?
                .iter()
                .map(|a| {
                    a.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| invalid("routing address must be a string"))
                })
                .collect::<Result<Vec<_>, _>>()?;

            if let Some(role) = ServerRole::parse(role) {
                servers.push(RoutingServer { role, addresses });
            }
        }

        let db = row.get("db").and_then(|v| v.as_str()).map(str::to_string);

        Ok(Self { ttl, servers, db })
    }

    /// Build a routing row from the columns of a procedure result.
    pub fn from_record(fields: &[String], values: Vec<PackStreamValue>) -> Result<Self, PackStreamError> {
        let row: PackStreamMap = fields.iter().cloned().zip(values).collect();
        Self::from_row(&row)
    }

    /// Addresses listed for a role.
    pub fn addresses(&self, role: ServerRole) -> impl Iterator<Item = &str> {
        self.servers
            .iter()
            .filter(move |s| s.role == role)
            .flat_map(|s| s.addresses.iter().map(String::as_str))
    }
}

fn invalid(msg: &str) -> PackStreamError {
    PackStreamError::InvalidStructure(msg.to_string())
}

/// Minimum severity of notifications the server should send (Bolt 5.2+).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationMinimumSeverity {
    /// No notifications
    Off,
    /// Warnings only
    Warning,
    /// Warnings and information
    Information,
}

impl NotificationMinimumSeverity {
    /// Wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationMinimumSeverity::Off => "OFF",
            NotificationMinimumSeverity::Warning => "WARNING",
            NotificationMinimumSeverity::Information => "INFORMATION",
        }
    }
}

/// Notification category the server should not send (Bolt 5.2+).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationCategory {
    /// `HINT`
    Hint,
    /// `UNRECOGNIZED`
    Unrecognized,
    /// `UNSUPPORTED`
    Unsupported,
    /// `PERFORMANCE`
    Performance,
    /// `DEPRECATION`
    Deprecation,
    /// `GENERIC`
    Generic,
    /// `SECURITY`
    Security,
    /// `TOPOLOGY`
    Topology,
    /// `SCHEMA`
    Schema,
}

impl NotificationCategory {
    /// Wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::Hint => "HINT",
            NotificationCategory::Unrecognized => "UNRECOGNIZED",
            NotificationCategory::Unsupported => "UNSUPPORTED",
            NotificationCategory::Performance => "PERFORMANCE",
            NotificationCategory::Deprecation => "DEPRECATION",
            NotificationCategory::Generic => "GENERIC",
            NotificationCategory::Security => "SECURITY",
            NotificationCategory::Topology => "TOPOLOGY",
            NotificationCategory::Schema => "SCHEMA",
        }
    }
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(role: &str, addresses: &[&str]) -> PackStreamValue {
        let mut map = PackStreamMap::new();
        map.insert("role".to_string(), role.into());
        map.insert(
            "addresses".to_string(),
            PackStreamValue::List(addresses.iter().map(|a| PackStreamValue::from(*a)).collect()),
        );
        PackStreamValue::Map(map)
    }

    fn row() -> PackStreamMap {
        let mut row = PackStreamMap::new();
        row.insert("ttl".to_string(), PackStreamValue::Integer(300));
        row.insert(
            "servers".to_string(),
            PackStreamValue::List(vec![
                server("ROUTE", &["a:7687", "b:7687"]),
                server("READ", &["b:7687"]),
                server("WRITE", &["a:7687"]),
                server("ARBITER", &["z:7687"]),
            ]),
        );
        row.insert("db".to_string(), "neo4j".into());
        row
    }

    #[test]
    fn test_routing_info_from_row() {
        let info = RoutingInfo::from_row(&row()).unwrap();
        assert_eq!(info.ttl, 300);
        assert_eq!(info.db.as_deref(), Some("neo4j"));
        assert_eq!(info.servers.len(), 3);
        assert_eq!(
            info.addresses(ServerRole::Route).collect::<Vec<_>>(),
            vec!["a:7687", "b:7687"]
        );
        assert_eq!(info.addresses(ServerRole::Write).collect::<Vec<_>>(), vec!["a:7687"]);
    }

    #[test]
    fn test_routing_info_from_record() {
        let r = row();
        let fields = vec!["ttl".to_string(), "servers".to_string()];
        let values = vec![r["ttl"].clone(), r["servers"].clone()];
        let info = RoutingInfo::from_record(&fields, values).unwrap();
        assert_eq!(info.ttl, 300);
        assert!(info.db.is_none());
    }

    #[test]
    fn test_routing_info_missing_ttl() {
        let mut r = row();
        r.shift_remove("ttl");
        assert!(RoutingInfo::from_row(&r).is_err());
    }

    #[test]
    fn test_server_role() {
        assert_eq!(ServerRole::Read.as_str(), "READ");
        assert_eq!(ServerRole::parse("WRITE"), Some(ServerRole::Write));
        assert_eq!(ServerRole::parse("write"), None);
    }

    #[test]
    fn test_notification_values() {
        assert_eq!(NotificationMinimumSeverity::Off.as_str(), "OFF");
        assert_eq!(NotificationCategory::Deprecation.to_string(), "DEPRECATION");
    }
}
