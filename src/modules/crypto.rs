use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use std::io::{Read, Write};

/// Serial numbers are 128-bit random values.
pub const SERIAL_NUMBER_BYTES: usize = 16;

/// Upper bound on a decompressed certificate, guards against zlib bombs.
pub const MAX_DECOMPRESSED_SIZE: u64 = 1024 * 1024;

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Generate a random 128-bit serial number, hex encoded.
pub fn random_serial_number() -> String {
    let mut serial = [0u8; SERIAL_NUMBER_BYTES];
    OsRng.fill_bytes(&mut serial);
    hex::encode(serial)
}

/// Generate a random 32-byte secret.
pub fn random_secret() -> [u8; 32] {
    let mut secret = [0u8; 32];
    OsRng.fill_bytes(&mut secret);
    secret
}

/// zlib-compress `data` at the default level.
///
/// The output is deterministic for a given input, which the issuer signature
/// relies on when a raw structure is re-encoded.
pub fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Inflate zlib `data`, failing on checksum errors or oversize output.
pub fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data).take(MAX_DECOMPRESSED_SIZE + 1);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    if out.len() as u64 > MAX_DECOMPRESSED_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "decompressed certificate exceeds size limit",
        ));
    }
    Ok(out)
}

/// Base64 encode data using standard encoding
pub fn base64_encode(data: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    STANDARD.encode(data)
}

/// Base64 decode data using standard encoding
pub fn base64_decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    STANDARD.decode(data)
}
