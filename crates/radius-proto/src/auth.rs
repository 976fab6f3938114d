use crate::packet::{Packet, PacketError, PacketHeader};
use rand::Rng;
use subtle::ConstantTimeEq;

/// RFC 2865 Section 5.2: User-Password is at most 128 octets
pub const MAX_PASSWORD_LENGTH: usize = 128;

const BLOCK: usize = 16;

/// Generate a random Request Authenticator (16 bytes) per RFC 2865 Section 3
pub fn generate_request_authenticator() -> [u8; 16] {
    let mut authenticator = [0u8; 16];
    rand::rng().fill(&mut authenticator);
    authenticator
}

/// Random packet identifier
pub fn generate_identifier() -> u8 {
    rand::rng().random()
}

/// MD5(secret + previous) keystream block used by the PAP hiding scheme
fn keystream_block(secret: &[u8], previous: &[u8]) -> [u8; 16] {
    let mut ctx = md5::Context::new();
    ctx.consume(secret);
    ctx.consume(previous);
    ctx.compute().0
}

/// Obscure a User-Password per RFC 2865 Section 5.2
///
/// The password is zero-padded to a multiple of 16 bytes (an empty password
/// becomes one block), then each block is XORed with
/// MD5(secret + request_authenticator) for the first block and
/// MD5(secret + previous ciphertext block) for the rest.
pub fn encrypt_user_password(
    password: &[u8],
    secret: &[u8],
    authenticator: &[u8; 16],
) -> Result<Vec<u8>, PacketError> {
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(PacketError::AttributeError(format!(
            "User-Password too long: {} bytes (max {})",
            password.len(),
            MAX_PASSWORD_LENGTH
        )));
    }

    let padded_len = password.len().div_ceil(BLOCK).max(1) * BLOCK;
    let mut output = password.to_vec();
    output.resize(padded_len, 0);

    let mut previous: [u8; 16] = *authenticator;
    for chunk in output.chunks_mut(BLOCK) {
        let key = keystream_block(secret, &previous);
        for (byte, k) in chunk.iter_mut().zip(key.iter()) {
            *byte ^= k;
        }
        previous.copy_from_slice(chunk);
    }

    Ok(output)
}

/// Reverse of [`encrypt_user_password`]; returns the zero-padded plaintext
pub fn decrypt_user_password(
    encrypted: &[u8],
    secret: &[u8],
    authenticator: &[u8; 16],
) -> Result<Vec<u8>, PacketError> {
    if encrypted.is_empty() || encrypted.len() % BLOCK != 0 {
        return Err(PacketError::AttributeError(format!(
            "Invalid User-Password length: {}",
            encrypted.len()
        )));
    }

    let mut output = Vec::with_capacity(encrypted.len());
    let mut previous: &[u8] = authenticator;
    for chunk in encrypted.chunks(BLOCK) {
        let key = keystream_block(secret, previous);
        output.extend(chunk.iter().zip(key.iter()).map(|(c, k)| c ^ k));
        previous = chunk;
    }

    Ok(output)
}

/// Response Authenticator over a raw reply datagram, RFC 2865 Section 3:
/// MD5(Code + ID + Length + RequestAuth + Attributes + Secret)
///
/// Only the first `Length` octets of `datagram` take part; padding is ignored.
pub fn response_authenticator_for(
    datagram: &[u8],
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    let header = PacketHeader::parse(datagram)?;
    let mut ctx = md5::Context::new();
    ctx.consume(&datagram[..4]);
    ctx.consume(request_authenticator);
    ctx.consume(&datagram[Packet::MIN_PACKET_SIZE..header.length]);
    ctx.consume(secret);
    Ok(ctx.compute().0)
}

/// Response Authenticator for a packet about to be sent
pub fn calculate_response_authenticator(
    packet: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    response_authenticator_for(&packet.encode()?, request_authenticator, secret)
}

/// Constant-time check of the Response Authenticator carried in `datagram`.
///
/// Malformed datagrams never verify.
pub fn verify_response_authenticator(
    datagram: &[u8],
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> bool {
    match response_authenticator_for(datagram, request_authenticator, secret) {
        Ok(expected) => bool::from(expected.ct_eq(&datagram[4..20])),
        Err(_) => false,
    }
}
