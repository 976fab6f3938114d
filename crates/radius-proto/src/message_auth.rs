//! Message-Authenticator Support (RFC 2869 Section 5.14, RFC 3579 Section 3.2)
//!
//! HMAC-MD5 keyed with the shared secret, computed over the whole packet with
//! the Message-Authenticator value set to zeros. On requests the header holds
//! the Request Authenticator; on replies the Request Authenticator of the
//! matching request is substituted before the HMAC is computed.

use crate::attributes::AttributeType;
use crate::packet::{Packet, PacketError, PacketHeader};
use hmac::{Hmac, Mac};
use md5_digest::Md5;
use subtle::ConstantTimeEq;

type HmacMd5 = Hmac<Md5>;

/// Length of the Message-Authenticator value
pub const MESSAGE_AUTHENTICATOR_LENGTH: usize = 16;

/// Outcome of checking the Message-Authenticator on a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageAuthCheck {
    Absent,
    Valid,
    Invalid,
}

/// HMAC-MD5 over `packet_bytes` keyed with `secret`
pub fn calculate_message_authenticator(
    packet_bytes: &[u8],
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    let mut mac = HmacMd5::new_from_slice(secret)
        .map_err(|e| PacketError::AttributeError(format!("HMAC key: {}", e)))?;
    mac.update(packet_bytes);
    let bytes = mac.finalize().into_bytes();

    let mut output = [0u8; 16];
    output.copy_from_slice(&bytes);
    Ok(output)
}

/// Where a Message-Authenticator sits in a datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Absent,
    /// Type 80 present with a length other than 18
    Malformed,
    At(usize),
}

fn locate(datagram: &[u8]) -> Location {
    let Ok(header) = PacketHeader::parse(datagram) else {
        return Location::Absent;
    };
    let mut offset = Packet::MIN_PACKET_SIZE;
    while offset + 2 <= header.length {
        let attr_type = datagram[offset];
        let attr_len = datagram[offset + 1] as usize;
        if attr_type == AttributeType::MessageAuthenticator.as_u8() {
            return if attr_len == 2 + MESSAGE_AUTHENTICATOR_LENGTH
                && offset + attr_len <= header.length
            {
                Location::At(offset + 2)
            } else {
                Location::Malformed
            };
        }
        if attr_len < 2 || offset + attr_len > header.length {
            return Location::Absent;
        }
        offset += attr_len;
    }
    Location::Absent
}

/// Offset of the Message-Authenticator value (after type and length) inside
/// `datagram`, if the attribute is present and well-formed
pub fn find_message_authenticator(datagram: &[u8]) -> Option<usize> {
    match locate(datagram) {
        Location::At(offset) => Some(offset),
        Location::Absent | Location::Malformed => None,
    }
}

/// Fill in the Message-Authenticator of an encoded request in place.
///
/// The request must already carry a zeroed Message-Authenticator attribute.
pub fn sign_request(datagram: &mut [u8], secret: &[u8]) -> Result<(), PacketError> {
    let offset = find_message_authenticator(datagram).ok_or_else(|| {
        PacketError::AttributeError("Message-Authenticator attribute missing".to_string())
    })?;
    let end = offset + MESSAGE_AUTHENTICATOR_LENGTH;
    let length = PacketHeader::parse(datagram)?.length;

    datagram[offset..end].fill(0);
    let mac = calculate_message_authenticator(&datagram[..length], secret)?;
    datagram[offset..end].copy_from_slice(&mac);
    Ok(())
}

/// Fill in the Message-Authenticator of an encoded reply in place.
///
/// Computed with `request_authenticator` in the header; the header keeps
/// whatever authenticator it held on entry.
pub fn sign_response(
    datagram: &mut [u8],
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<(), PacketError> {
    let offset = find_message_authenticator(datagram).ok_or_else(|| {
        PacketError::AttributeError("Message-Authenticator attribute missing".to_string())
    })?;
    let end = offset + MESSAGE_AUTHENTICATOR_LENGTH;
    let length = PacketHeader::parse(datagram)?.length;

    let mut scratch = datagram[..length].to_vec();
    scratch[4..20].copy_from_slice(request_authenticator);
    scratch[offset..end].fill(0);
    let mac = calculate_message_authenticator(&scratch, secret)?;
    datagram[offset..end].copy_from_slice(&mac);
    Ok(())
}

/// Check the Message-Authenticator carried on a request
pub fn check_request(datagram: &[u8], secret: &[u8]) -> MessageAuthCheck {
    check(datagram, None, secret)
}

/// Check the Message-Authenticator carried on a reply to a request that used
/// `request_authenticator`
pub fn check_response(
    datagram: &[u8],
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> MessageAuthCheck {
    check(datagram, Some(request_authenticator), secret)
}

fn check(
    datagram: &[u8],
    request_authenticator: Option<&[u8; 16]>,
    secret: &[u8],
) -> MessageAuthCheck {
    let offset = match locate(datagram) {
        Location::At(offset) => offset,
        Location::Absent => return MessageAuthCheck::Absent,
        Location::Malformed => return MessageAuthCheck::Invalid,
    };
    let Ok(header) = PacketHeader::parse(datagram) else {
        return MessageAuthCheck::Invalid;
    };
    let end = offset + MESSAGE_AUTHENTICATOR_LENGTH;

    let mut scratch = datagram[..header.length].to_vec();
    if let Some(authenticator) = request_authenticator {
        scratch[4..20].copy_from_slice(authenticator);
    }
    scratch[offset..end].fill(0);

    match calculate_message_authenticator(&scratch, secret) {
        Ok(expected) if bool::from(expected.ct_eq(&datagram[offset..end])) => {
            MessageAuthCheck::Valid
        }
        _ => MessageAuthCheck::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attribute;
    use crate::packet::Code;

    fn request_with_ma() -> Vec<u8> {
        let mut packet = Packet::new(Code::AccessRequest, 3, [5u8; 16]);
        packet.add_attribute(Attribute::string(1, "alice").unwrap());
        packet.add_attribute(Attribute::new(80, vec![0u8; 16]).unwrap());
        packet.encode().unwrap()
    }

    #[test]
    fn test_calculate_message_authenticator_is_deterministic() {
        let packet = vec![0u8; 20];
        let a = calculate_message_authenticator(&packet, b"testing123").unwrap();
        let b = calculate_message_authenticator(&packet, b"testing123").unwrap();
        let c = calculate_message_authenticator(&packet, b"other").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_find_message_authenticator_offset() {
        let datagram = request_with_ma();
        // header + User-Name(2 + 5) + MA type/len
        assert_eq!(find_message_authenticator(&datagram), Some(20 + 7 + 2));

        let plain = Packet::new(Code::AccessRequest, 1, [0u8; 16]).encode().unwrap();
        assert_eq!(find_message_authenticator(&plain), None);
    }

    #[test]
    fn test_sign_and_check_request() {
        let mut datagram = request_with_ma();
        sign_request(&mut datagram, b"secret").unwrap();
        assert_eq!(check_request(&datagram, b"secret"), MessageAuthCheck::Valid);
        assert_eq!(check_request(&datagram, b"wrong"), MessageAuthCheck::Invalid);
    }

    #[test]
    fn test_sign_and_check_response() {
        let request_auth = [8u8; 16];
        let mut packet = Packet::new(Code::AccessAccept, 3, [0u8; 16]);
        packet.add_attribute(Attribute::new(80, vec![0u8; 16]).unwrap());
        let mut datagram = packet.encode().unwrap();

        sign_response(&mut datagram, &request_auth, b"secret").unwrap();
        assert_eq!(
            check_response(&datagram, &request_auth, b"secret"),
            MessageAuthCheck::Valid
        );
        assert_eq!(
            check_response(&datagram, &[9u8; 16], b"secret"),
            MessageAuthCheck::Invalid
        );
    }

    #[test]
    fn test_check_without_attribute() {
        let datagram = Packet::new(Code::AccessReject, 1, [0u8; 16]).encode().unwrap();
        assert_eq!(
            check_response(&datagram, &[0u8; 16], b"secret"),
            MessageAuthCheck::Absent
        );
    }

    #[test]
    fn test_wrong_length_attribute_is_invalid() {
        let mut packet = Packet::new(Code::AccessAccept, 1, [0u8; 16]);
        packet.add_attribute(Attribute::new(80, vec![0xAA]).unwrap());
        let datagram = packet.encode().unwrap();

        assert_eq!(find_message_authenticator(&datagram), None);
        assert_eq!(
            check_response(&datagram, &[0u8; 16], b"secret"),
            MessageAuthCheck::Invalid
        );
    }

    #[test]
    fn test_sign_request_requires_attribute() {
        let mut datagram = Packet::new(Code::AccessRequest, 1, [0u8; 16]).encode().unwrap();
        assert!(sign_request(&mut datagram, b"secret").is_err());
    }
}
