//! Pulls the RSA modulus and exponent out of an X.509 certificate's
//! `SubjectPublicKeyInfo`, for feeding into the pairing secret digest.
//!
//! Works on both the client's own certificate and the TV's captured leaf
//! certificate — both are RSA-2048 under this protocol.

use openssl::x509::X509;

use crate::error::{ProtocolError, Result};

/// `(modulus, exponent)`, big-endian, with the modulus's ASN.1 sign byte
/// stripped. The exponent is typically 3 bytes (65537); the modulus is
/// 256 bytes for RSA-2048.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicParams {
    pub modulus: Vec<u8>,
    pub exponent: Vec<u8>,
}

/// Extracts `RsaPublicParams` from the DER bytes of an X.509 certificate.
pub fn extract_rsa_params(cert_der: &[u8]) -> Result<RsaPublicParams> {
    let cert = X509::from_der(cert_der)
        .map_err(|e| ProtocolError::CryptoExtract(format!("not a valid X.509 certificate: {e}")))?;

    let pkey = cert
        .public_key()
        .map_err(|e| ProtocolError::CryptoExtract(format!("no public key in certificate: {e}")))?;

    let rsa = pkey
        .rsa()
        .map_err(|e| ProtocolError::CryptoExtract(format!("public key is not RSA: {e}")))?;

    let modulus = strip_leading_sign_byte(rsa.n().to_vec());
    let exponent = rsa.e().to_vec();

    Ok(RsaPublicParams { modulus, exponent })
}

/// `BigNum::to_vec` produces the big-endian two's complement magnitude,
/// which for a positive integer whose high bit is set comes back with an
/// extra leading `0x00` sign byte. Strip exactly one, if present.
fn strip_leading_sign_byte(mut bytes: Vec<u8>) -> Vec<u8> {
    if bytes.first() == Some(&0x00) && bytes.len() > 1 {
        bytes.remove(0);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ClientIdentity;
    use tempfile::TempDir;

    #[test]
    fn extracted_modulus_first_byte_is_non_zero() {
        let dir = TempDir::new().unwrap();
        let identity = ClientIdentity::load_or_create("test-device", dir.path()).unwrap();
        let params = extract_rsa_params(&identity.certificate_der).unwrap();
        assert_ne!(params.modulus.first(), Some(&0x00));
        assert_eq!(params.modulus.len(), 256);
    }

    #[test]
    fn malformed_certificate_is_a_crypto_extract_error() {
        let err = extract_rsa_params(b"not a certificate").unwrap_err();
        assert!(matches!(err, ProtocolError::CryptoExtract(_)));
    }

    #[test]
    fn strip_leading_sign_byte_removes_exactly_one() {
        assert_eq!(strip_leading_sign_byte(vec![0x00, 0xFF, 0x01]), vec![0xFF, 0x01]);
        assert_eq!(strip_leading_sign_byte(vec![0x7F, 0x01]), vec![0x7F, 0x01]);
        assert_eq!(strip_leading_sign_byte(vec![0x00]), vec![0x00]);
    }
}
