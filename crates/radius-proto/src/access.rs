//! PAP Access-Request construction and Access-Accept/Reject classification

use crate::attributes::{Attribute, AttributeType};
use crate::auth::{
    calculate_response_authenticator, decrypt_user_password, encrypt_user_password,
    generate_identifier, generate_request_authenticator, verify_response_authenticator,
};
use crate::message_auth::{self, MessageAuthCheck, MESSAGE_AUTHENTICATOR_LENGTH};
use crate::packet::{Code, Packet, PacketError, PacketHeader};
use std::net::Ipv4Addr;

/// An encoded Access-Request plus what is needed to match and verify its reply
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub identifier: u8,
    pub authenticator: [u8; 16],
    pub datagram: Vec<u8>,
}

impl AccessRequest {
    /// Build a signed PAP Access-Request with a fresh identifier and
    /// Request Authenticator.
    ///
    /// Carries User-Name, User-Password, NAS-IP-Address and a
    /// Message-Authenticator.
    pub fn pap(
        username: &str,
        password: &[u8],
        nas_ip: Ipv4Addr,
        secret: &[u8],
    ) -> Result<Self, PacketError> {
        let identifier = generate_identifier();
        let authenticator = generate_request_authenticator();

        let mut packet = Packet::new(Code::AccessRequest, identifier, authenticator);
        packet.add_attribute(Attribute::new(
            AttributeType::UserName.as_u8(),
            username.as_bytes().to_vec(),
        )?);
        packet.add_attribute(Attribute::new(
            AttributeType::UserPassword.as_u8(),
            encrypt_user_password(password, secret, &authenticator)?,
        )?);
        packet.add_attribute(Attribute::ipv4(AttributeType::NasIpAddress.as_u8(), nas_ip)?);
        packet.add_attribute(Attribute::new(
            AttributeType::MessageAuthenticator.as_u8(),
            vec![0u8; MESSAGE_AUTHENTICATOR_LENGTH],
        )?);

        let mut datagram = packet.encode()?;
        message_auth::sign_request(&mut datagram, secret)?;

        Ok(AccessRequest {
            identifier,
            authenticator,
            datagram,
        })
    }

    /// Whether `datagram` carries this request's identifier.
    ///
    /// Replies that fail this check belong to some other exchange.
    pub fn matches(&self, datagram: &[u8]) -> bool {
        datagram.len() >= 2 && datagram[1] == self.identifier
    }

    /// Classify a reply to this request
    pub fn classify(
        &self,
        datagram: &[u8],
        secret: &[u8],
        require_message_authenticator: bool,
    ) -> Result<AccessResponse, PacketError> {
        classify_response(
            datagram,
            &self.authenticator,
            secret,
            require_message_authenticator,
        )
    }
}

/// Verdict on a reply datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessResponse {
    /// Authenticators verified and code is Access-Accept
    Accept(Packet),
    /// Access-Reject, Access-Challenge, or any reply that failed verification
    Reject(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    AccessReject,
    Challenge,
    AuthenticatorMismatch,
    MessageAuthenticatorMismatch,
    MessageAuthenticatorMissing,
}

/// Classify a reply against the Request Authenticator it answers.
///
/// Malformed datagrams are returned as errors. Anything that does not verify
/// is a [`AccessResponse::Reject`], never an accept.
pub fn classify_response(
    datagram: &[u8],
    request_authenticator: &[u8; 16],
    secret: &[u8],
    require_message_authenticator: bool,
) -> Result<AccessResponse, PacketError> {
    let header = PacketHeader::parse(datagram)?;
    let packet = Packet::decode(datagram)?;
    if !packet.code.is_access_response() {
        return Err(PacketError::InvalidCode(header.code));
    }

    if !verify_response_authenticator(datagram, request_authenticator, secret) {
        return Ok(AccessResponse::Reject(RejectReason::AuthenticatorMismatch));
    }

    match message_auth::check_response(datagram, request_authenticator, secret) {
        MessageAuthCheck::Invalid => {
            return Ok(AccessResponse::Reject(
                RejectReason::MessageAuthenticatorMismatch,
            ))
        }
        MessageAuthCheck::Absent
            if require_message_authenticator && packet.code == Code::AccessAccept =>
        {
            return Ok(AccessResponse::Reject(
                RejectReason::MessageAuthenticatorMissing,
            ))
        }
        _ => {}
    }

    Ok(match packet.code {
        Code::AccessAccept => AccessResponse::Accept(packet),
        Code::AccessChallenge => AccessResponse::Reject(RejectReason::Challenge),
        _ => AccessResponse::Reject(RejectReason::AccessReject),
    })
}

/// Encode a signed reply to a request, as a RADIUS server would.
///
/// With `message_authenticator` set, a Message-Authenticator is appended and
/// signed before the Response Authenticator is computed.
pub fn build_access_response(
    code: Code,
    identifier: u8,
    request_authenticator: &[u8; 16],
    attributes: Vec<Attribute>,
    secret: &[u8],
    message_authenticator: bool,
) -> Result<Vec<u8>, PacketError> {
    let mut packet = Packet::new(code, identifier, *request_authenticator);
    packet.attributes = attributes;
    if message_authenticator {
        packet.add_attribute(Attribute::new(
            AttributeType::MessageAuthenticator.as_u8(),
            vec![0u8; MESSAGE_AUTHENTICATOR_LENGTH],
        )?);
    }

    let mut datagram = packet.encode()?;
    if message_authenticator {
        message_auth::sign_response(&mut datagram, request_authenticator, secret)?;
    }

    let signed = Packet::decode(&datagram)?;
    let response_auth = calculate_response_authenticator(&signed, request_authenticator, secret)?;
    datagram[4..20].copy_from_slice(&response_auth);
    Ok(datagram)
}

/// User-Name and recovered User-Password of a PAP Access-Request.
///
/// Trailing zero padding is stripped from the password.
pub fn pap_credentials(packet: &Packet, secret: &[u8]) -> Result<(String, Vec<u8>), PacketError> {
    let username = packet
        .find_attribute(AttributeType::UserName.as_u8())
        .ok_or_else(|| PacketError::AttributeError("User-Name missing".to_string()))?
        .as_lossy_string();
    let hidden = packet
        .find_attribute(AttributeType::UserPassword.as_u8())
        .ok_or_else(|| PacketError::AttributeError("User-Password missing".to_string()))?;

    let mut password = decrypt_user_password(&hidden.value, secret, &packet.authenticator)?;
    while password.last() == Some(&0) {
        password.pop();
    }
    Ok((username, password))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"testing123";

    fn request() -> AccessRequest {
        AccessRequest::pap("alice", b"password", Ipv4Addr::new(10, 0, 0, 9), SECRET).unwrap()
    }

    #[test]
    fn test_pap_request_layout() {
        let req = request();
        let packet = Packet::decode(&req.datagram).unwrap();
        assert_eq!(packet.code, Code::AccessRequest);
        assert_eq!(packet.identifier, req.identifier);
        assert_eq!(packet.authenticator, req.authenticator);

        assert_eq!(packet.find_attribute(1).unwrap().value, b"alice");
        assert_eq!(packet.find_attribute(2).unwrap().value.len(), 16);
        assert_eq!(packet.find_attribute(4).unwrap().value, vec![10, 0, 0, 9]);
        assert_eq!(
            message_auth::check_request(&req.datagram, SECRET),
            MessageAuthCheck::Valid
        );

        let (user, password) = pap_credentials(&packet, SECRET).unwrap();
        assert_eq!(user, "alice");
        assert_eq!(password, b"password");
    }

    #[test]
    fn test_pap_request_rejects_long_password() {
        let password = vec![b'x'; 129];
        assert!(AccessRequest::pap("bob", &password, Ipv4Addr::LOCALHOST, SECRET).is_err());
    }

    #[test]
    fn test_classify_accept_with_class() {
        let req = request();
        let reply = build_access_response(
            Code::AccessAccept,
            req.identifier,
            &req.authenticator,
            vec![Attribute::string(25, "ops").unwrap()],
            SECRET,
            true,
        )
        .unwrap();

        match req.classify(&reply, SECRET, true).unwrap() {
            AccessResponse::Accept(packet) => {
                assert_eq!(packet.find_attribute(25).unwrap().as_lossy_string(), "ops")
            }
            other => panic!("expected accept, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_reject() {
        let req = request();
        let reply = build_access_response(
            Code::AccessReject,
            req.identifier,
            &req.authenticator,
            vec![],
            SECRET,
            false,
        )
        .unwrap();
        assert_eq!(
            req.classify(&reply, SECRET, true).unwrap(),
            AccessResponse::Reject(RejectReason::AccessReject)
        );
    }

    #[test]
    fn test_accept_with_wrong_secret_is_rejected() {
        let req = request();
        let reply = build_access_response(
            Code::AccessAccept,
            req.identifier,
            &req.authenticator,
            vec![],
            b"not-the-secret",
            false,
        )
        .unwrap();
        assert_eq!(
            req.classify(&reply, SECRET, false).unwrap(),
            AccessResponse::Reject(RejectReason::AuthenticatorMismatch)
        );
    }

    #[test]
    fn test_bad_message_authenticator_is_rejected() {
        let req = request();
        let mut reply = build_access_response(
            Code::AccessAccept,
            req.identifier,
            &req.authenticator,
            vec![],
            SECRET,
            true,
        )
        .unwrap();

        // Corrupt the MA value, then re-sign the header so only the MA fails
        let offset = message_auth::find_message_authenticator(&reply).unwrap();
        reply[offset] ^= 0xFF;
        let packet = Packet::decode(&reply).unwrap();
        let auth = calculate_response_authenticator(&packet, &req.authenticator, SECRET).unwrap();
        reply[4..20].copy_from_slice(&auth);

        assert_eq!(
            req.classify(&reply, SECRET, false).unwrap(),
            AccessResponse::Reject(RejectReason::MessageAuthenticatorMismatch)
        );
    }

    #[test]
    fn test_missing_message_authenticator_when_required() {
        let req = request();
        let reply = build_access_response(
            Code::AccessAccept,
            req.identifier,
            &req.authenticator,
            vec![],
            SECRET,
            false,
        )
        .unwrap();
        assert_eq!(
            req.classify(&reply, SECRET, true).unwrap(),
            AccessResponse::Reject(RejectReason::MessageAuthenticatorMissing)
        );
        assert!(matches!(
            req.classify(&reply, SECRET, false).unwrap(),
            AccessResponse::Accept(_)
        ));
    }

    #[test]
    fn test_truncated_message_authenticator_is_rejected() {
        let req = request();
        let reply = build_access_response(
            Code::AccessAccept,
            req.identifier,
            &req.authenticator,
            vec![Attribute::new(80, vec![0xAA]).unwrap()],
            SECRET,
            false,
        )
        .unwrap();

        assert_eq!(
            req.classify(&reply, SECRET, false).unwrap(),
            AccessResponse::Reject(RejectReason::MessageAuthenticatorMismatch)
        );
    }

    #[test]
    fn test_challenge_is_rejected() {
        let req = request();
        let reply = build_access_response(
            Code::AccessChallenge,
            req.identifier,
            &req.authenticator,
            vec![],
            SECRET,
            false,
        )
        .unwrap();
        assert_eq!(
            req.classify(&reply, SECRET, false).unwrap(),
            AccessResponse::Reject(RejectReason::Challenge)
        );
    }

    #[test]
    fn test_malformed_reply_is_an_error() {
        let req = request();
        let reply = build_access_response(
            Code::AccessAccept,
            req.identifier,
            &req.authenticator,
            vec![],
            SECRET,
            false,
        )
        .unwrap();

        assert!(req.classify(&reply[..12], SECRET, false).is_err());

        let mut lying = reply.clone();
        lying[3] = 60;
        assert!(req.classify(&lying, SECRET, false).is_err());
    }

    #[test]
    fn test_matches_identifier() {
        let req = request();
        let mut reply = vec![2, req.identifier, 0, 20];
        assert!(req.matches(&reply));
        reply[1] = req.identifier.wrapping_add(1);
        assert!(!req.matches(&reply));
    }
}
