//! Authentication capabilities: password digests, session tokens and the
//! bearer-token extractor.

pub mod extractor;
pub mod password;
pub mod tokens;

pub use extractor::CurrentActor;
pub use password::{Argon2Hasher, PasswordHasher};
pub use tokens::{SessionTokens, TokenKind};
