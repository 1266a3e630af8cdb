//! API key revision data is sealed with AES-256-GCM. The stored form is the 12-byte nonce
//! followed by the ciphertext and its authentication tag.

use ring::{
    aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN},
    rand::{SecureRandom, SystemRandom},
};
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};
use subtle::ConstantTimeEq;

const KEY_LEN: usize = 32;

/// The process-wide key used to open API key revisions.
#[derive(Clone)]
pub struct DecryptionKey(Arc<LessSafeKey>);

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("failed to read decryption key from {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decryption key is not hex-encoded: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("decryption key must be {KEY_LEN} bytes, got {0}")]
    Length(usize),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecryptError {
    #[error("sealed data is too short")]
    Truncated,

    #[error("sealed data failed authentication")]
    Unauthenticated,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to seal data")]
pub struct SealError(());

// === impl DecryptionKey ===

impl DecryptionKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != KEY_LEN {
            return Err(KeyError::Length(bytes.len()));
        }
        let key = UnboundKey::new(&AES_256_GCM, bytes).map_err(|_| KeyError::Length(bytes.len()))?;
        Ok(Self(Arc::new(LessSafeKey::new(key))))
    }

    /// Parses a hex-encoded key. Surrounding whitespace is ignored.
    pub fn from_hex(encoded: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(encoded.trim())?;
        Self::from_bytes(&bytes)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, KeyError> {
        let path = path.as_ref();
        let encoded = std::fs::read_to_string(path).map_err(|source| KeyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_hex(&encoded)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, DecryptError> {
        if sealed.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(DecryptError::Truncated);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce =
            Nonce::try_assume_unique_for_key(nonce).map_err(|_| DecryptError::Truncated)?;
        let mut buf = ciphertext.to_vec();
        let len = self
            .0
            .open_in_place(nonce, Aad::empty(), &mut buf)
            .map_err(|_| DecryptError::Unauthenticated)?
            .len();
        buf.truncate(len);
        Ok(buf)
    }

    /// Seals `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, SealError> {
        let mut nonce = [0u8; NONCE_LEN];
        SystemRandom::new()
            .fill(&mut nonce)
            .map_err(|_| SealError(()))?;

        let mut buf = plaintext.to_vec();
        self.0
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::empty(),
                &mut buf,
            )
            .map_err(|_| SealError(()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + buf.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&buf);
        Ok(sealed)
    }

    /// Opens `sealed` and compares it with `presented` in constant time.
    pub fn verify(&self, sealed: &[u8], presented: &[u8]) -> Result<bool, DecryptError> {
        let secret = self.decrypt(sealed)?;
        Ok(secret.ct_eq(presented).into())
    }
}

impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DecryptionKey(..)")
    }
}
