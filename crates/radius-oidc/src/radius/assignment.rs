//! Extraction of the reply attribute that carries a user's classes

use crate::config::{AssignmentConfig, ConfigError};
use radius_proto::{decode_vendor_specific, AttributeType, Packet};
use regex::Regex;

/// Where in an Access-Accept the class list is found. Chosen once from
/// configuration.
#[derive(Debug, Clone)]
pub enum AssignmentAttribute {
    /// Every instance of a standard attribute
    Standard(u8),
    /// Matching Vendor-Specific sub-attributes
    VendorSpecific {
        vendor_id: u32,
        vendor_type: u8,
        pattern: Option<Regex>,
    },
}

impl Default for AssignmentAttribute {
    fn default() -> Self {
        AssignmentAttribute::Standard(AttributeType::Class.as_u8())
    }
}

impl AssignmentAttribute {
    pub fn from_config(config: &AssignmentConfig) -> Result<Self, ConfigError> {
        Ok(match config {
            AssignmentConfig::Standard { attribute_type } => {
                AssignmentAttribute::Standard(*attribute_type)
            }
            AssignmentConfig::VendorSpecific {
                vendor_id,
                vendor_type,
                pattern,
            } => AssignmentAttribute::VendorSpecific {
                vendor_id: *vendor_id,
                vendor_type: *vendor_type,
                pattern: pattern
                    .as_deref()
                    .map(Regex::new)
                    .transpose()
                    .map_err(|e| ConfigError::Invalid(format!("Invalid assignment pattern: {}", e)))?,
            },
        })
    }

    /// Value of the assignment attribute, if the reply carries one.
    ///
    /// Multiple instances are joined with `,`.
    pub fn extract(&self, packet: &Packet) -> Option<String> {
        let values: Vec<String> = match self {
            AssignmentAttribute::Standard(attr_type) => packet
                .find_all_attributes(*attr_type)
                .into_iter()
                .map(|attr| attr.as_lossy_string())
                .collect(),
            AssignmentAttribute::VendorSpecific {
                vendor_id,
                vendor_type,
                pattern,
            } => packet
                .find_all_attributes(AttributeType::VendorSpecific.as_u8())
                .into_iter()
                .filter_map(|attr| decode_vendor_specific(attr).ok())
                .flatten()
                .filter(|sub| sub.vendor_id == *vendor_id && sub.vendor_type == *vendor_type)
                .filter_map(|sub| {
                    let value = sub.as_lossy_string();
                    match pattern {
                        None => Some(value),
                        Some(re) => re.captures(&value).map(|caps| {
                            caps.get(1)
                                .or_else(|| caps.get(0))
                                .map(|m| m.as_str().to_string())
                                .unwrap_or_default()
                        }),
                    }
                })
                .collect(),
        };

        let values: Vec<String> = values.into_iter().filter(|v| !v.is_empty()).collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(","))
        }
    }
}
