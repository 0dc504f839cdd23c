//! Inkwell core: the offline half of threshold-encrypted content retrieval.
//!
//! Content is encrypted once under a random data key. The data key is split
//! with Shamir's scheme and every share is wrapped for one key server with
//! identity-based encryption over BLS12-381, so a reader needs user keys
//! from `threshold` distinct servers to rebuild it. Servers only release a
//! user key after an on-chain policy call proves the reader's capability.
//!
//! Nothing in this crate touches the network:
//! - [`encrypt`] / [`verify`]: AES-256-CTR data encryption and integrity tags
//! - [`ibe`]: key-server master keys, user-key extraction and share wrapping
//! - [`shares`]: Shamir split/combine of the 32-byte data key
//! - [`object`]: the encrypted object format, [`object::seal`] and [`object::open`]
//! - [`session`]: wallet-signed, time-boxed session credentials
//! - [`policy`]: transaction builder and the owner/subscriber policy calls
//! - [`batch`]: key-retrieval batching constants

pub mod batch;
pub mod encrypt;
pub mod error;
pub mod ibe;
pub mod object;
pub mod policy;
pub mod session;
pub mod shares;
pub mod verify;

pub use batch::{KEY_BATCH_SIZE, KEY_THRESHOLD};
pub use error::{CryptoError, ObjectError, SessionError};
pub use object::{EncryptedObject, ObjectId};
pub use policy::{OwnerPolicy, PolicyCall, PolicyProof, SubscriberPolicy, TransactionBuilder};
pub use session::{SessionCertificate, SessionCredential, WalletSignature};
