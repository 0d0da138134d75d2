//! Tenant identity carried in record headers.

use std::collections::BTreeMap;

use common::{Tenant, TenantId};
use uuid::Uuid;

use crate::codec::CodecError;

pub const TENANT_ID_HEADER: &str = "TENANT_ID";
pub const REGION_HEADER: &str = "REGION";
pub const MAJOR_VERSION_HEADER: &str = "MAJOR_VERSION";
pub const MINOR_VERSION_HEADER: &str = "MINOR_VERSION";
pub const SPAN_ID_HEADER: &str = "SPAN_ID";

/// Record headers, kept ordered so encoded records compare deterministically.
pub type Headers = BTreeMap<String, String>;

/// Writes the tenant headers.
pub fn write_tenant(headers: &mut Headers, tenant: &Tenant) {
    headers.insert(TENANT_ID_HEADER.to_string(), tenant.id.to_string());
    headers.insert(REGION_HEADER.to_string(), tenant.region.clone());
    headers.insert(
        MAJOR_VERSION_HEADER.to_string(),
        tenant.major_version.to_string(),
    );
    headers.insert(
        MINOR_VERSION_HEADER.to_string(),
        tenant.minor_version.to_string(),
    );
}

/// Reads the tenant headers. Every one of them is mandatory.
pub fn read_tenant(headers: &Headers) -> Result<Tenant, CodecError> {
    let id = required(headers, TENANT_ID_HEADER)?;
    let id = Uuid::parse_str(id).map_err(|_| CodecError::InvalidHeader {
        name: TENANT_ID_HEADER,
        value: id.to_string(),
    })?;

    Ok(Tenant::new(
        TenantId::from_uuid(id),
        required(headers, REGION_HEADER)?,
        version(headers, MAJOR_VERSION_HEADER)?,
        version(headers, MINOR_VERSION_HEADER)?,
    ))
}

fn required<'a>(headers: &'a Headers, name: &'static str) -> Result<&'a str, CodecError> {
    headers
        .get(name)
        .map(String::as_str)
        .ok_or(CodecError::MissingHeader(name))
}

fn version(headers: &Headers, name: &'static str) -> Result<u16, CodecError> {
    let raw = required(headers, name)?;
    raw.parse().map_err(|_| CodecError::InvalidHeader {
        name,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_headers_roundtrip() {
        let tenant = Tenant::new(TenantId::new(), "GMS", 83, 1);
        let mut headers = Headers::new();
        write_tenant(&mut headers, &tenant);

        assert_eq!(read_tenant(&headers).unwrap(), tenant);
    }

    #[test]
    fn missing_tenant_id_is_reported_by_name() {
        let mut headers = Headers::new();
        write_tenant(&mut headers, &Tenant::new(TenantId::new(), "GMS", 83, 1));
        headers.remove(TENANT_ID_HEADER);

        assert!(matches!(
            read_tenant(&headers),
            Err(CodecError::MissingHeader(TENANT_ID_HEADER))
        ));
    }

    #[test]
    fn non_numeric_version_is_invalid() {
        let mut headers = Headers::new();
        write_tenant(&mut headers, &Tenant::new(TenantId::new(), "GMS", 83, 1));
        headers.insert(MAJOR_VERSION_HEADER.to_string(), "v83".to_string());

        assert!(matches!(
            read_tenant(&headers),
            Err(CodecError::InvalidHeader { name: MAJOR_VERSION_HEADER, .. })
        ));
    }
}
