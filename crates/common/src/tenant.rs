use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies the isolation boundary every message and saga belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TenantId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A tenant: one game region running one client version.
///
/// The id alone decides isolation; region and version travel with it so
/// downstream services can pick version-specific behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: TenantId,
    pub region: String,
    pub major_version: u16,
    pub minor_version: u16,
}

impl Tenant {
    pub fn new(id: TenantId, region: impl Into<String>, major_version: u16, minor_version: u16) -> Self {
        Self {
            id,
            region: region.into(),
            major_version,
            minor_version,
        }
    }

    /// Returns true if both values name the same tenant.
    pub fn same_as(&self, other: &Tenant) -> bool {
        self.id == other.id
    }
}

impl std::fmt::Display for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{} v{}.{}]",
            self.id, self.region, self.major_version, self.minor_version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_serializes_camel_case() {
        let tenant = Tenant::new(TenantId::new(), "GMS", 83, 1);
        let json = serde_json::to_value(&tenant).unwrap();
        assert_eq!(json["region"], "GMS");
        assert_eq!(json["majorVersion"], 83);
        assert_eq!(json["minorVersion"], 1);
    }

    #[test]
    fn same_as_compares_ids_only() {
        let id = TenantId::new();
        let a = Tenant::new(id, "GMS", 83, 1);
        let b = Tenant::new(id, "GMS", 87, 1);
        let c = Tenant::new(TenantId::new(), "GMS", 83, 1);
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
    }

    #[test]
    fn display_includes_region_and_version() {
        let tenant = Tenant::new(TenantId::new(), "JMS", 185, 1);
        assert!(tenant.to_string().ends_with("[JMS v185.1]"));
    }
}
