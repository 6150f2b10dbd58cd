//! Security credential encryption.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use openssl::{
    pkey::{PKey, Public},
    rsa::Padding,
    x509::X509,
};
use tracing::debug;
use zeroize::Zeroizing;

use crate::{
    config::Config,
    error::{MpesaError, Result},
};

/// Encrypts initiator passwords into provider security credentials.
///
/// The certificate is chosen in this order:
///
/// 1. a path passed to [`compute_with`](Self::compute_with)
/// 2. the `certificate_path` config key
/// 3. `sandbox_certificate_path` or `production_certificate_path`, by environment
///
/// A missing certificate is always an error. Sending a request without a valid credential
/// fails at the provider without a useful message.
#[derive(Debug, Clone)]
pub struct SecurityCredentialCipher {
    config: Arc<Config>,
}

impl SecurityCredentialCipher {
    /// Creates a cipher reading certificate locations from `config`.
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Returns the certificate path that would be used, given an optional override.
    #[must_use]
    pub fn certificate_path(&self, override_path: Option<&Path>) -> PathBuf {
        if let Some(path) = override_path {
            return path.to_path_buf();
        }
        let key = if self.config.is_sandbox() {
            "sandbox_certificate_path"
        } else {
            "production_certificate_path"
        };
        self.config
            .get_str("certificate_path")
            .filter(|path| !path.is_empty())
            .or_else(|| self.config.get_str(key))
            .map(PathBuf::from)
            .unwrap_or_default()
    }

    /// Encrypts `initiator_password` with the configured certificate.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the certificate cannot be read or parsed, or the
    /// password is too long for the key.
    pub fn compute(&self, initiator_password: &str) -> Result<String> {
        self.compute_with(initiator_password, None)
    }

    /// Encrypts `initiator_password`, optionally with a caller-supplied certificate.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the certificate cannot be read or parsed, or the
    /// password is too long for the key.
    pub fn compute_with(
        &self,
        initiator_password: &str,
        certificate: Option<&Path>,
    ) -> Result<String> {
        let path = self.certificate_path(certificate);
        if path.as_os_str().is_empty() || !path.is_file() {
            return Err(MpesaError::configuration(format!(
                "certificate file not found: {}",
                path.display()
            )));
        }
        let bytes = fs::read(&path).map_err(|e| {
            MpesaError::configuration(format!("cannot read certificate {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "encrypting security credential");
        encrypt(&bytes, initiator_password)
    }

    /// Returns the security credential for a config section.
    ///
    /// A precomputed `security_credential` is used verbatim. Otherwise `initiator_password`
    /// is encrypted. Both are looked up in `section` first, then at the top level.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if neither value is configured, or encryption fails.
    pub fn for_section(&self, section: &str) -> Result<String> {
        if let Some(credential) = self.config.section_str(section, "security_credential") {
            return Ok(credential);
        }
        let password = self
            .config
            .section_str(section, "initiator_password")
            .map(Zeroizing::new)
            .ok_or_else(|| {
                MpesaError::configuration(format!(
                    "initiator password is not configured for '{section}'"
                ))
            })?;
        self.compute(&password)
    }
}

/// Encrypts `plaintext` with RSA PKCS#1 v1.5 and returns it base64-encoded.
///
/// `certificate` may be an X.509 certificate in PEM or DER form, or a PEM public key.
///
/// # Errors
///
/// Returns a configuration error if no public key can be read from `certificate` or the
/// plaintext does not fit the key.
pub fn encrypt(certificate: &[u8], plaintext: &str) -> Result<String> {
    let key = public_key(certificate)?;
    let rsa = key
        .rsa()
        .map_err(|e| MpesaError::configuration(format!("certificate key is not RSA: {e}")))?;
    let mut buf = vec![0; key.size()];
    let len = rsa
        .public_encrypt(plaintext.as_bytes(), &mut buf, Padding::PKCS1)
        .map_err(|e| MpesaError::configuration(format!("cannot encrypt credential: {e}")))?;
    buf.truncate(len);
    Ok(STANDARD.encode(buf))
}

fn public_key(certificate: &[u8]) -> Result<PKey<Public>> {
    let from_cert = X509::from_pem(certificate)
        .or_else(|_| X509::from_der(certificate))
        .and_then(|cert| cert.public_key());
    from_cert.or_else(|_| PKey::public_key_from_pem(certificate)).map_err(|e| {
        MpesaError::configuration(format!("certificate does not contain a public key: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use openssl::{
        asn1::Asn1Time,
        hash::MessageDigest,
        pkey::Private,
        rsa::Rsa,
        x509::{X509Builder, X509NameBuilder},
    };
    use serde_json::json;

    use super::*;

    fn key_pair() -> PKey<Private> {
        PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
    }

    fn certificate(key: &PKey<Private>) -> X509 {
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "sandbox.test").unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(key).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
        builder.sign(key, MessageDigest::sha256()).unwrap();
        builder.build()
    }

    fn decrypt(key: &PKey<Private>, credential: &str) -> String {
        let rsa = key.rsa().unwrap();
        let cipher = STANDARD.decode(credential).unwrap();
        let mut buf = vec![0; key.size()];
        let len = rsa.private_decrypt(&cipher, &mut buf, Padding::PKCS1).unwrap();
        String::from_utf8(buf[..len].to_vec()).unwrap()
    }

    #[test]
    fn test_encrypt_accepts_pem_der_and_public_key() {
        let key = key_pair();
        let cert = certificate(&key);

        for source in [
            cert.to_pem().unwrap(),
            cert.to_der().unwrap(),
            key.public_key_to_pem().unwrap(),
        ] {
            let credential = encrypt(&source, "Safaricom999!*!").unwrap();
            assert_eq!(decrypt(&key, &credential), "Safaricom999!*!");
        }
    }

    #[test]
    fn test_encrypt_rejects_garbage() {
        let err = encrypt(b"not a certificate", "pw").unwrap_err();
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn test_certificate_selected_by_environment() {
        let sandbox = SecurityCredentialCipher::new(Arc::new(
            Config::from_value(json!({"sandbox_certificate_path": "/s.cer"})).unwrap(),
        ));
        assert_eq!(sandbox.certificate_path(None), PathBuf::from("/s.cer"));

        let production = SecurityCredentialCipher::new(Arc::new(
            Config::from_value(json!({
                "is_sandbox": false,
                "production_certificate_path": "/p.cer"
            }))
            .unwrap(),
        ));
        assert_eq!(production.certificate_path(None), PathBuf::from("/p.cer"));
        assert_eq!(
            production.certificate_path(Some(Path::new("/override.cer"))),
            PathBuf::from("/override.cer")
        );
    }

    #[test]
    fn test_missing_certificate_is_configuration_error() {
        let cipher = SecurityCredentialCipher::new(Arc::new(
            Config::from_value(json!({"certificate_path": "/definitely/missing.cer"})).unwrap(),
        ));
        let err = cipher.compute("pw").unwrap_err();
        assert_eq!(err.status_code(), 422);
        assert!(err.to_string().contains("/definitely/missing.cer"));
    }

    #[test]
    fn test_compute_reads_certificate_file() {
        let dir = tempfile::tempdir().unwrap();
        let key = key_pair();
        let path = dir.path().join("cert.cer");
        fs::write(&path, certificate(&key).to_pem().unwrap()).unwrap();

        let cipher = SecurityCredentialCipher::new(Arc::new(
            Config::from_value(json!({"certificate_path": path.to_str().unwrap()})).unwrap(),
        ));
        assert_eq!(decrypt(&key, &cipher.compute("secret").unwrap()), "secret");
    }

    #[test]
    fn test_precomputed_credential_is_used_verbatim() {
        let cipher = SecurityCredentialCipher::new(Arc::new(
            Config::from_value(json!({
                "b2c": { "security_credential": "precomputed" },
                "certificate_path": "/missing.cer"
            }))
            .unwrap(),
        ));
        assert_eq!(cipher.for_section("b2c").unwrap(), "precomputed");
        assert_eq!(cipher.for_section("b2b").unwrap_err().status_code(), 422);
    }
}
