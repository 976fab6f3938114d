use super::Code;
use crate::attributes::Attribute;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Invalid packet length: {0}")]
    InvalidLength(usize),
    #[error("Truncated packet: header declares {declared} bytes, buffer holds {actual}")]
    Truncated { declared: usize, actual: usize },
    #[error("Invalid packet code: {0}")]
    InvalidCode(u8),
    #[error("Attribute error: {0}")]
    AttributeError(String),
    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),
}

/// Fixed 20-byte RADIUS header, parsed without touching the attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub code: u8,
    pub identifier: u8,
    /// Value of the Length field; always <= the buffer it was parsed from
    pub length: usize,
    pub authenticator: [u8; 16],
}

impl PacketHeader {
    /// Parse and bounds-check the header of a datagram.
    ///
    /// Octets beyond `length` are padding (RFC 2865 Section 3) and are ignored
    /// by callers; a buffer shorter than `length` is rejected.
    pub fn parse(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Packet::MIN_PACKET_SIZE {
            return Err(PacketError::InvalidLength(data.len()));
        }

        let length = u16::from_be_bytes([data[2], data[3]]) as usize;
        if !(Packet::MIN_PACKET_SIZE..=Packet::MAX_PACKET_SIZE).contains(&length) {
            return Err(PacketError::InvalidLength(length));
        }
        if data.len() < length {
            return Err(PacketError::Truncated {
                declared: length,
                actual: data.len(),
            });
        }

        let mut authenticator = [0u8; 16];
        authenticator.copy_from_slice(&data[4..20]);

        Ok(PacketHeader {
            code: data[0],
            identifier: data[1],
            length,
            authenticator,
        })
    }
}

/// RADIUS Packet structure as defined in RFC 2865 Section 3
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Code      |  Identifier   |            Length             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// |                         Authenticator                         |
/// |                                                               |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Attributes ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub code: Code,
    /// Matches a response to its request
    pub identifier: u8,
    /// Request Authenticator on requests, Response Authenticator on replies
    pub authenticator: [u8; 16],
    pub attributes: Vec<Attribute>,
}

impl Packet {
    /// 1 code + 1 id + 2 length + 16 authenticator
    pub const MIN_PACKET_SIZE: usize = 20;
    /// RFC 2865 upper bound
    pub const MAX_PACKET_SIZE: usize = 4096;

    pub fn new(code: Code, identifier: u8, authenticator: [u8; 16]) -> Self {
        Packet {
            code,
            identifier,
            authenticator,
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    /// Encode packet to bytes
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let total_length = self.length();
        if total_length > Self::MAX_PACKET_SIZE {
            return Err(PacketError::PacketTooLarge(total_length));
        }

        let mut buffer = Vec::with_capacity(total_length);
        buffer.push(self.code.as_u8());
        buffer.push(self.identifier);
        buffer.extend_from_slice(&(total_length as u16).to_be_bytes());
        buffer.extend_from_slice(&self.authenticator);
        for attr in &self.attributes {
            attr.encode_into(&mut buffer)?;
        }

        Ok(buffer)
    }

    /// Decode a packet, failing on any length inconsistency
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let header = PacketHeader::parse(data)?;
        let code = Code::from_u8(header.code).ok_or(PacketError::InvalidCode(header.code))?;

        let mut attributes = Vec::new();
        let mut rest = &data[Self::MIN_PACKET_SIZE..header.length];
        while !rest.is_empty() {
            let attr = Attribute::decode(rest)?;
            rest = &rest[attr.encoded_length()..];
            attributes.push(attr);
        }

        Ok(Packet {
            code,
            identifier: header.identifier,
            authenticator: header.authenticator,
            attributes,
        })
    }

    /// Length of the encoded packet
    pub fn length(&self) -> usize {
        Self::MIN_PACKET_SIZE
            + self
                .attributes
                .iter()
                .map(Attribute::encoded_length)
                .sum::<usize>()
    }

    /// Find first attribute by type
    pub fn find_attribute(&self, attr_type: u8) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.attr_type == attr_type)
    }

    /// Find all attributes by type
    pub fn find_all_attributes(&self, attr_type: u8) -> Vec<&Attribute> {
        self.attributes
            .iter()
            .filter(|a| a.attr_type == attr_type)
            .collect()
    }
}
