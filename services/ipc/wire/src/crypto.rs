//! AEAD sealing and the key agreement backing it.
//!
//! One `SessionCipher` is derived per physical connection during the
//! type-0 handshake and shared read-only by the reader and writer for the
//! lifetime of that connection. Sealed bodies are laid out as
//! `nonce ‖ ciphertext ‖ tag` with a fresh random nonce per frame.

use crate::error::FrameError;
use bytes::Bytes;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use x25519_dalek::{EphemeralSecret, PublicKey};

/// AEAD nonce size in bytes
pub const NONCE_SIZE: usize = 12;

/// AEAD authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Key and public-key size in bytes
pub const KEY_SIZE: usize = 32;

/// Per-frame size overhead of the encryption layer
pub const CRYPTO_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// Authenticated-encryption state for one physical connection
pub struct SessionCipher {
    cipher: ChaCha20Poly1305,
}

impl SessionCipher {
    /// Create a cipher from a 32-byte shared key
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Seal a frame body, returning `nonce ‖ ciphertext ‖ tag`
    pub fn seal(&self, plaintext: &[u8]) -> Result<Bytes, FrameError> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| FrameError::Crypto)?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(Bytes::from(sealed))
    }

    /// Open a sealed frame body
    pub fn open(&self, sealed: &[u8]) -> Result<Bytes, FrameError> {
        if sealed.len() < CRYPTO_OVERHEAD {
            return Err(FrameError::Crypto);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| FrameError::Crypto)?;

        Ok(Bytes::from(plaintext))
    }
}

impl fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCipher").finish_non_exhaustive()
    }
}

/// One side of the x25519 key agreement performed during the handshake.
///
/// The secret is consumed when the peer's public key arrives, so a key
/// exchange instance covers exactly one connection attempt.
pub struct KeyExchange {
    secret: EphemeralSecret,
    public: PublicKey,
}

impl KeyExchange {
    /// Generate a fresh keypair
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public key bytes to send to the peer
    pub fn public_key(&self) -> [u8; KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Complete the agreement with the peer's public key and derive the
    /// connection cipher
    pub fn into_cipher(self, peer_public: &[u8; KEY_SIZE]) -> SessionCipher {
        let shared = self.secret.diffie_hellman(&PublicKey::from(*peer_public));
        SessionCipher::new(shared.as_bytes())
    }
}

impl fmt::Debug for KeyExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyExchange")
            .field("public", &self.public.to_bytes())
            .finish_non_exhaustive()
    }
}
