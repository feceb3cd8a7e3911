//! Cryptographic primitives for DropKey
//!
//! - **Identity & Authentication**: an Ed25519 keypair (`SecretKey`/`PublicKey`)
//!   is the user's identity. The public half is the handle the paste service
//!   knows them by; the secret half signs authentication challenges.
//! - **Content Encryption**: every paste is sealed with its own
//!   ChaCha20-Poly1305 `Secret`, generated on the authoring machine and never
//!   transmitted.
//!
//! The server only ever sees public keys, signatures and ciphertext.

mod keys;
mod secret;

pub use ed25519_dalek::Signature;
pub use keys::{KeyError, PublicKey, SecretKey, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};
pub use secret::{Secret, SecretError, NONCE_SIZE, SECRET_SIZE, TAG_SIZE};
