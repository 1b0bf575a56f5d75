/// Bearer token issuance and verification
///
/// Tokens are HS256 JWTs carrying the username (`sub`), `user_id`,
/// `is_admin`, `iat` and `exp`. Validity depends only on the signature and
/// the embedded expiry; nothing is looked up in the store, so verification
/// can run on any number of requests in parallel.
///
/// # Security
///
/// - **Algorithm**: HS256 (HMAC with SHA-256)
/// - **Expiration**: `issued_at + ttl`, default 30 minutes, no leeway
/// - **Secret**: at least 32 bytes; when none is configured a random key is
///   generated at startup and tokens die with the process
///
/// # Example
///
/// ```
/// use chrono::Duration;
/// use modelgate_shared::auth::jwt::TokenAuthority;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let authority = TokenAuthority::new(b"0123456789abcdef0123456789abcdef", Duration::minutes(30));
/// let user_id = Uuid::new_v4();
///
/// let token = authority.issue(user_id, "alice", false, None)?;
/// let claims = authority.verify(&token)?;
///
/// assert_eq!(claims.user_id, user_id);
/// assert_eq!(claims.sub, "alice");
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Default token lifetime in minutes
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 30;

/// Minimum accepted length of a configured signing secret
pub const MIN_SECRET_LEN: usize = 32;

/// Error type for token operations
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Failed to sign token: {0}")]
    Signing(String),

    /// Bad signature, malformed token, or unexpected claims
    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Token has expired")]
    Expired,
}

/// Claims embedded in every bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,

    pub user_id: Uuid,

    pub is_admin: bool,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, username: impl Into<String>, is_admin: bool, ttl: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: username.into(),
            user_id,
            is_admin,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    /// A token is expired from its `exp` second onwards.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Remaining lifetime, or `None` once expired
    pub fn time_until_expiration(&self) -> Option<Duration> {
        let remaining = self.exp - Utc::now().timestamp();
        (remaining > 0).then(|| Duration::seconds(remaining))
    }
}

/// Signs and verifies bearer tokens with one process-wide key.
#[derive(Clone)]
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    default_ttl: Duration,
    ephemeral: bool,
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("default_ttl", &self.default_ttl)
            .field("ephemeral", &self.ephemeral)
            .finish_non_exhaustive()
    }
}

impl TokenAuthority {
    pub fn new(secret: &[u8], default_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            default_ttl,
            ephemeral: false,
        }
    }

    /// Uses the configured secret, or generates a random one when absent.
    ///
    /// A generated key is logged as a warning: tokens will not survive a
    /// restart and cannot be verified by other instances.
    pub fn from_secret(secret: Option<&str>, default_ttl: Duration) -> Self {
        match secret {
            Some(secret) => Self::new(secret.as_bytes(), default_ttl),
            None => {
                warn!(
                    "JWT_SECRET is not set; using a randomly generated signing key. \
                     Issued tokens will not survive a restart and are not valid across instances"
                );
                let key = generate_signing_key();
                Self {
                    ephemeral: true,
                    ..Self::new(key.as_bytes(), default_ttl)
                }
            }
        }
    }

    /// Whether the signing key was generated at startup
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issues a token for the given identity; `ttl` falls back to the default.
    pub fn issue(
        &self,
        user_id: Uuid,
        username: &str,
        is_admin: bool,
        ttl: Option<Duration>,
    ) -> Result<String, TokenError> {
        let claims = Claims::new(user_id, username, is_admin, ttl.unwrap_or(self.default_ttl));
        self.sign(&claims)
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verifies signature and expiry, returning the embedded claims.
    ///
    /// # Errors
    ///
    /// - `TokenError::Invalid` for a bad signature or malformed token
    /// - `TokenError::Expired` once the current time reaches `exp`
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below with zero leeway.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;

        if data.claims.is_expired() {
            return Err(TokenError::Expired);
        }

        Ok(data.claims)
    }
}

/// 32 random bytes from the OS, hex encoded.
pub fn generate_signing_key() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret-key-at-least-32-bytes-long";

    fn authority() -> TokenAuthority {
        TokenAuthority::new(SECRET, Duration::minutes(DEFAULT_TOKEN_TTL_MINUTES))
    }

    #[test]
    fn test_issue_and_verify_returns_same_identity() {
        let user_id = Uuid::new_v4();
        let token = authority().issue(user_id, "alice", true, None).unwrap();

        let claims = authority().verify(&token).unwrap();
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.sub, "alice");
        assert!(claims.is_admin);
        assert_eq!(claims.exp - claims.iat, DEFAULT_TOKEN_TTL_MINUTES * 60);
    }

    #[test]
    fn test_custom_ttl() {
        let token = authority()
            .issue(Uuid::new_v4(), "bob", false, Some(Duration::hours(2)))
            .unwrap();

        let claims = authority().verify(&token).unwrap();
        assert_eq!(claims.exp - claims.iat, 7200);
        assert!(claims.time_until_expiration().is_some());
    }

    #[test]
    fn test_expired_token() {
        let token = authority()
            .issue(Uuid::new_v4(), "carol", false, Some(Duration::seconds(-5)))
            .unwrap();

        assert!(matches!(authority().verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_token_expires_at_exact_expiry() {
        let token = authority()
            .issue(Uuid::new_v4(), "dave", false, Some(Duration::zero()))
            .unwrap();

        assert!(matches!(authority().verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_altered_signature_is_invalid() {
        let token = authority().issue(Uuid::new_v4(), "erin", false, None).unwrap();
        let (head, signature) = token.rsplit_once('.').unwrap();

        for index in [0, signature.len() / 2, signature.len() - 1] {
            let mut bytes = signature.as_bytes().to_vec();
            bytes[index] = if bytes[index] == b'A' { b'B' } else { b'A' };
            let tampered = format!("{}.{}", head, String::from_utf8(bytes).unwrap());

            assert!(
                matches!(authority().verify(&tampered), Err(TokenError::Invalid(_))),
                "signature byte {} altered",
                index
            );
        }
    }

    #[test]
    fn test_altered_claims_are_invalid() {
        let authority = authority();
        let token = authority.issue(Uuid::new_v4(), "frank", false, None).unwrap();
        let forged = authority
            .issue(Uuid::new_v4(), "frank", true, None)
            .unwrap();

        // Admin payload spliced onto the original signature
        let parts: Vec<&str> = token.split('.').collect();
        let forged_parts: Vec<&str> = forged.split('.').collect();
        let spliced = format!("{}.{}.{}", parts[0], forged_parts[1], parts[2]);

        assert!(matches!(authority.verify(&spliced), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let token = authority().issue(Uuid::new_v4(), "grace", false, None).unwrap();
        let other = TokenAuthority::new(b"another-secret-key-at-least-32-bytes", Duration::minutes(30));

        assert!(matches!(other.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_garbage_is_invalid() {
        assert!(matches!(authority().verify("not.a.jwt"), Err(TokenError::Invalid(_))));
        assert!(matches!(authority().verify(""), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_generated_key_is_ephemeral() {
        let authority = TokenAuthority::from_secret(None, Duration::minutes(30));
        assert!(authority.is_ephemeral());

        let token = authority.issue(Uuid::new_v4(), "heidi", false, None).unwrap();
        assert!(authority.verify(&token).is_ok());

        let configured = TokenAuthority::from_secret(
            Some("configured-secret-key-of-32-bytes!!"),
            Duration::minutes(30),
        );
        assert!(!configured.is_ephemeral());
        assert!(matches!(configured.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_generate_signing_key() {
        let a = generate_signing_key();
        let b = generate_signing_key();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}
