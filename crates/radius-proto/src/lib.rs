//! RADIUS client-side protocol codec
//!
//! Packet and attribute encoding per RFC 2865, PAP User-Password hiding,
//! Request/Response Authenticators, Message-Authenticator (RFC 2869) and
//! Vendor-Specific attribute decoding. Everything here is synchronous and
//! free of I/O; transport lives with the caller.
//!
//! # Example
//!
//! ```rust
//! use radius_proto::{AccessRequest, AccessResponse, Attribute, Code, build_access_response};
//! use std::net::Ipv4Addr;
//!
//! let secret = b"testing123";
//! let request = AccessRequest::pap("alice", b"password", Ipv4Addr::LOCALHOST, secret).unwrap();
//!
//! // What a RADIUS server would send back
//! let reply = build_access_response(
//!     Code::AccessAccept,
//!     request.identifier,
//!     &request.authenticator,
//!     vec![Attribute::string(25, "ops").unwrap()],
//!     secret,
//!     true,
//! )
//! .unwrap();
//!
//! match request.classify(&reply, secret, true).unwrap() {
//!     AccessResponse::Accept(packet) => {
//!         assert_eq!(packet.find_attribute(25).unwrap().as_lossy_string(), "ops");
//!     }
//!     AccessResponse::Reject(reason) => panic!("rejected: {:?}", reason),
//! }
//! ```

pub mod access;
pub mod attributes;
pub mod auth;
pub mod message_auth;
pub mod packet;
pub mod vsa;

pub use access::{
    build_access_response, classify_response, pap_credentials, AccessRequest, AccessResponse,
    RejectReason,
};
pub use attributes::{Attribute, AttributeType};
pub use auth::{
    calculate_response_authenticator, decrypt_user_password, encrypt_user_password,
    generate_request_authenticator, verify_response_authenticator,
};
pub use message_auth::{calculate_message_authenticator, MessageAuthCheck};
pub use packet::{Code, Packet, PacketError, PacketHeader};
pub use vsa::{decode_vendor_specific, VendorAttribute};
