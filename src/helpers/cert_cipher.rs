use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose, Engine as _};

const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("encryption key must be 32 bytes, got {0}")]
    InvalidKey(usize),
    #[error("b64 decode error {0}")]
    Encoding(String),
    #[error("cipher error {0}")]
    Crypto(String),
}

/// AES-256-GCM for cert material at rest. Output is base64 of
/// `nonce || ciphertext`, with a fresh 96-bit nonce per message.
#[derive(Clone)]
pub struct CertCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CertCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CertCipher")
    }
}

impl CertCipher {
    pub fn new(key: &str) -> Result<Self, CipherError> {
        let key = key.as_bytes();
        if key.len() != 32 {
            return Err(CipherError::InvalidKey(key.len()));
        }
        let key: &Key<Aes256Gcm> = Key::<Aes256Gcm>::from_slice(key);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    pub fn encrypt(&self, plain: &[u8]) -> Result<String, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let cipher_vec = self
            .cipher
            .encrypt(&nonce, plain)
            .map_err(|e| CipherError::Crypto(format!("{:?}", e)))?;

        let mut out = nonce.to_vec();
        out.extend_from_slice(&cipher_vec);
        Ok(general_purpose::STANDARD.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, CipherError> {
        let bytes = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| CipherError::Encoding(e.to_string()))?;
        if bytes.len() <= NONCE_LEN {
            return Err(CipherError::Crypto("ciphertext too short".to_string()));
        }

        let (nonce, cipher_text) = bytes.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), cipher_text)
            .map_err(|e| CipherError::Crypto(format!("{:?}", e)))
    }
}
