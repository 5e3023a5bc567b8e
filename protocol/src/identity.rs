//! Client identity: an RSA-2048 key pair wrapped in a self-signed X.509
//! certificate, persisted across process restarts.
//!
//! The pairing handshake binds this certificate to the TV; every control
//! session afterwards must present the byte-identical identity, so this
//! module's only real job is "generate once, then always load the same
//! bytes back."

use std::fs;
use std::path::{Path, PathBuf};

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509Name, X509};
use tracing::{debug, info};

use crate::error::Result;

/// Certificate validity period.
const CERT_VALIDITY_YEARS: u32 = 10;

/// Fixed serial number; uniqueness doesn't matter for a self-signed,
/// single-purpose leaf certificate.
const CERT_SERIAL: u32 = 1000;

/// An RSA-2048 key pair plus a self-signed X.509 certificate. Subject and
/// SAN common name are both the stable `label` passed to
/// `load_or_create`.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    /// DER-encoded certificate.
    pub certificate_der: Vec<u8>,
    /// DER-encoded PKCS#8 private key.
    pub private_key_der: Vec<u8>,
}

impl ClientIdentity {
    /// Loads the identity from `storage_dir` if present, otherwise
    /// generates a fresh one and persists it there. Successive calls with
    /// the same `storage_dir` always return the same identity.
    pub fn load_or_create(label: &str, storage_dir: &Path) -> Result<Self> {
        let cert_path = storage_dir.join("client.pem");
        let key_path = storage_dir.join("client-key.pem");

        if cert_path.exists() && key_path.exists() {
            debug!(?cert_path, "loading existing client identity");
            return Self::load(&cert_path, &key_path);
        }

        info!(label, "generating new client identity");
        let identity = Self::generate(label)?;
        identity.save(&cert_path, &key_path)?;
        Ok(identity)
    }

    /// Deletes the persisted cert/key pair. The spec allows destroying
    /// the identity "only on explicit reset" — callers drive that policy,
    /// this just performs the deletion.
    pub fn reset(storage_dir: &Path) -> Result<()> {
        for name in ["client.pem", "client-key.pem"] {
            let path = storage_dir.join(name);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn generate(label: &str) -> Result<Self> {
        let rsa = Rsa::generate(2048)?;
        let pkey = PKey::from_rsa(rsa)?;

        let mut builder = X509::builder()?;
        builder.set_version(2)?;

        let serial = BigNum::from_u32(CERT_SERIAL)?.to_asn1_integer()?;
        builder.set_serial_number(&serial)?;

        let mut name = X509Name::builder()?;
        name.append_entry_by_text("CN", label)?;
        let name = name.build();
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;

        let not_before = Asn1Time::days_from_now(0)?;
        let not_after = Asn1Time::days_from_now(CERT_VALIDITY_YEARS * 365)?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;

        builder.set_pubkey(&pkey)?;
        builder.append_extension(BasicConstraints::new().ca().build()?)?;
        builder.append_extension(
            SubjectAlternativeName::new()
                .dns(label)
                .build(&builder.x509v3_context(None, None))?,
        )?;

        builder.sign(&pkey, MessageDigest::sha256())?;
        let cert = builder.build();

        Ok(ClientIdentity {
            certificate_der: cert.to_der()?,
            private_key_der: pkey.private_key_to_der()?,
        })
    }

    fn save(&self, cert_path: &Path, key_path: &Path) -> Result<()> {
        if let Some(parent) = cert_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let cert = X509::from_der(&self.certificate_der)?;
        fs::write(cert_path, cert.to_pem()?)?;

        let pkey = PKey::private_key_from_der(&self.private_key_der)?;
        fs::write(key_path, pkey.private_key_to_pem_pkcs8()?)?;
        Ok(())
    }

    fn load(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let cert = X509::from_pem(&fs::read(cert_path)?)?;
        let pkey = PKey::private_key_from_pem(&fs::read(key_path)?)?;
        Ok(ClientIdentity {
            certificate_der: cert.to_der()?,
            private_key_der: pkey.private_key_to_der()?,
        })
    }
}

/// Default location for the client identity: `<data_dir>/atvremote/identity`.
pub fn default_storage_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("atvremote")
        .join("identity")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_or_create_persists_the_same_identity_across_calls() {
        let dir = TempDir::new().unwrap();
        let first = ClientIdentity::load_or_create("atvremote", dir.path()).unwrap();
        let second = ClientIdentity::load_or_create("atvremote", dir.path()).unwrap();
        assert_eq!(first.certificate_der, second.certificate_der);
        assert_eq!(first.private_key_der, second.private_key_der);
    }

    #[test]
    fn reset_forces_a_fresh_identity() {
        let dir = TempDir::new().unwrap();
        let first = ClientIdentity::load_or_create("atvremote", dir.path()).unwrap();
        ClientIdentity::reset(dir.path()).unwrap();
        let second = ClientIdentity::load_or_create("atvremote", dir.path()).unwrap();
        assert_ne!(first.certificate_der, second.certificate_der);
    }
}
