use std::{fs, sync::Arc};

use openssl::{
    asn1::Asn1Time,
    bn::{BigNum, MsbOption},
    ec::{EcGroup, EcKey},
    error::ErrorStack,
    hash::MessageDigest,
    nid::Nid,
    pkey::{PKey, Private},
    ssl::SslContextBuilder,
    x509::{X509, X509NameBuilder, X509Ref},
};

use crate::{
    config::GatewayConfig, dtls::dtls_error::DtlsError, log::log_sink::LogSink, sink_debug,
    sink_info,
};

const SELF_SIGNED_CN: &str = "rustygate";
const SELF_SIGNED_DAYS: u32 = 30;

/// Local DTLS certificate and key, plus the SHA-256 fingerprint advertised
/// in SDP (`a=fingerprint:sha-256 ...`).
pub struct DtlsIdentity {
    certificate: X509,
    private_key: PKey<Private>,
    fingerprint: String,
}

impl std::fmt::Debug for DtlsIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DtlsIdentity")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl DtlsIdentity {
    /// Loads a PEM certificate (first of the chain) and PEM private key.
    pub fn from_pem_files(cert_path: &str, key_path: &str) -> Result<Self, DtlsError> {
        let certificate = X509::from_pem(&fs::read(cert_path)?)?;
        let private_key = PKey::private_key_from_pem(&fs::read(key_path)?)?;
        Self::from_parts(certificate, private_key)
    }

    /// Creates an ephemeral self-signed ECDSA P-256 certificate.
    pub fn generate() -> Result<Self, DtlsError> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
        let private_key = PKey::from_ec_key(EcKey::generate(&group)?)?;

        let mut name = X509NameBuilder::new()?;
        name.append_entry_by_nid(Nid::COMMONNAME, SELF_SIGNED_CN)?;
        let name = name.build();

        let serial = {
            let mut bn = BigNum::new()?;
            bn.rand(64, MsbOption::MAYBE_ZERO, false)?;
            bn.to_asn1_integer()?
        };

        let mut builder = X509::builder()?;
        builder.set_version(2)?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;
        builder.set_pubkey(&private_key)?;
        let not_before = Asn1Time::days_from_now(0)?;
        let not_after = Asn1Time::days_from_now(SELF_SIGNED_DAYS)?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;
        builder.sign(&private_key, MessageDigest::sha256())?;

        Self::from_parts(builder.build(), private_key)
    }

    /// Uses `[TLS] dtls_cert`/`dtls_key` when both are configured, otherwise
    /// generates an ephemeral identity.
    pub fn from_config(config: &GatewayConfig, logger: &Arc<dyn LogSink>) -> Result<Self, DtlsError> {
        match (&config.dtls_cert_path, &config.dtls_key_path) {
            (Some(cert), Some(key)) => {
                sink_debug!(
                    logger,
                    "[DTLS] Loading identity (chain {} and key {})",
                    cert,
                    key
                );
                Self::from_pem_files(cert, key)
            }
            _ => {
                let identity = Self::generate()?;
                sink_info!(
                    logger,
                    "[DTLS] Generated ephemeral certificate {}",
                    identity.fingerprint
                );
                Ok(identity)
            }
        }
    }

    fn from_parts(certificate: X509, private_key: PKey<Private>) -> Result<Self, DtlsError> {
        let fingerprint = fingerprint_of(&certificate)?;
        Ok(Self {
            certificate,
            private_key,
            fingerprint,
        })
    }

    /// Uppercase colon-separated SHA-256 digest of the DER certificate.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub(crate) fn apply(&self, builder: &mut SslContextBuilder) -> Result<(), DtlsError> {
        builder.set_certificate(&self.certificate)?;
        builder.set_private_key(&self.private_key)?;
        builder
            .check_private_key()
            .map_err(|e| DtlsError::Ssl(format!("Private key does not match certificate: {}", e)))
    }
}

pub fn fingerprint_of(cert: &X509Ref) -> Result<String, ErrorStack> {
    let digest = cert.digest(MessageDigest::sha256())?;
    Ok(digest
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<String>>()
        .join(":"))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn generated_fingerprint_is_sha256_hex() {
        let id = DtlsIdentity::generate().unwrap();
        let fp = id.fingerprint();
        assert_eq!(fp.split(':').count(), 32);
        assert!(fp.chars().all(|c| c == ':' || (c.is_ascii_hexdigit() && !c.is_ascii_lowercase())));
    }

    #[test]
    fn each_generated_identity_is_distinct() {
        let a = DtlsIdentity::generate().unwrap();
        let b = DtlsIdentity::generate().unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn missing_pem_files_are_io_errors() {
        let err = DtlsIdentity::from_pem_files("/nonexistent/cert.pem", "/nonexistent/key.pem")
            .unwrap_err();
        assert!(matches!(err, DtlsError::Io(_)));
    }
}
