//! Vendor-Specific attribute (type 26) payloads, RFC 2865 Section 5.26
//!
//! ```text
//! | Type=26 | Length | Vendor-Id (4 octets) | Vendor-Type | Vendor-Length | Value ...
//! ```

use crate::attributes::{Attribute, AttributeType};
use crate::packet::PacketError;

/// One sub-attribute carried inside a Vendor-Specific attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorAttribute {
    pub vendor_id: u32,
    pub vendor_type: u8,
    pub value: Vec<u8>,
}

impl VendorAttribute {
    pub fn new(vendor_id: u32, vendor_type: u8, value: impl Into<Vec<u8>>) -> Self {
        VendorAttribute {
            vendor_id,
            vendor_type,
            value: value.into(),
        }
    }

    pub fn as_lossy_string(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }

    /// Wrap in a Vendor-Specific attribute
    pub fn to_attribute(&self) -> Result<Attribute, PacketError> {
        let sub_len = self.value.len() + 2;
        if sub_len > u8::MAX as usize {
            return Err(PacketError::AttributeError(format!(
                "Vendor sub-attribute too long: {} bytes",
                self.value.len()
            )));
        }

        let mut value = Vec::with_capacity(4 + sub_len);
        value.extend_from_slice(&self.vendor_id.to_be_bytes());
        value.push(self.vendor_type);
        value.push(sub_len as u8);
        value.extend_from_slice(&self.value);
        Attribute::new(AttributeType::VendorSpecific.as_u8(), value)
    }
}

/// Split a Vendor-Specific attribute into its sub-attributes.
///
/// Fails when the attribute is not type 26, is shorter than a vendor id, or
/// a sub-attribute length runs past the end of the value.
pub fn decode_vendor_specific(attribute: &Attribute) -> Result<Vec<VendorAttribute>, PacketError> {
    if attribute.attr_type != AttributeType::VendorSpecific.as_u8() {
        return Err(PacketError::AttributeError(format!(
            "Not a Vendor-Specific attribute: type {}",
            attribute.attr_type
        )));
    }
    if attribute.value.len() < 4 {
        return Err(PacketError::AttributeError(
            "Vendor-Specific attribute shorter than vendor id".to_string(),
        ));
    }

    let vendor_id = u32::from_be_bytes([
        attribute.value[0],
        attribute.value[1],
        attribute.value[2],
        attribute.value[3],
    ]);

    let mut subs = Vec::new();
    let mut rest = &attribute.value[4..];
    while !rest.is_empty() {
        if rest.len() < 2 {
            return Err(PacketError::AttributeError(
                "Truncated vendor sub-attribute header".to_string(),
            ));
        }
        let sub_len = rest[1] as usize;
        if sub_len < 2 || sub_len > rest.len() {
            return Err(PacketError::AttributeError(format!(
                "Invalid vendor sub-attribute length: {}",
                sub_len
            )));
        }
        subs.push(VendorAttribute {
            vendor_id,
            vendor_type: rest[0],
            value: rest[2..sub_len].to_vec(),
        });
        rest = &rest[sub_len..];
    }

    Ok(subs)
}
