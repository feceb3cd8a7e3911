/**
 * Paste encryption engine.
 *  Seals and opens paste bodies with content keys
 *  looked up by paste id, and extracts display titles.
 */
pub mod cipher;
/**
 * Cryptographic types and operations.
 *  - Ed25519 identity keys
 *  - ChaCha20-Poly1305 content secrets
 */
pub mod crypto;
/**
 * Local custody of the identity key and the
 *  per-paste content key table.
 */
pub mod keystore;
/**
 * Challenge/response session state machine
 *  and the signed challenge wire type.
 */
pub mod session;

pub mod prelude {
    pub use crate::cipher::{CipherError, Envelope, PasteBody, PasteCipher, TitleError};
    pub use crate::crypto::{PublicKey, Secret, SecretKey};
    pub use crate::keystore::{KeyStore, KeyStoreError};
    pub use crate::session::{
        Session, SessionError, SessionHandle, SessionState, SessionToken, SignedChallenge,
    };
}
