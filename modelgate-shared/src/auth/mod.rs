/// Authentication and authorization
///
/// - [`password`]: Argon2id hashing and verification
/// - [`jwt`]: the token authority (HS256 bearer tokens)
/// - [`middleware`]: bearer extraction and the Axum auth middleware
/// - [`authorization`]: admin / ownership checks
/// - [`credentials`]: registration, login and account management
///
/// # Example
///
/// ```
/// use chrono::Duration;
/// use modelgate_shared::auth::jwt::TokenAuthority;
/// use modelgate_shared::auth::password::{hash_password, verify_password};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password")?;
/// assert!(verify_password("user_password", &hash));
///
/// let authority = TokenAuthority::from_secret(None, Duration::minutes(30));
/// let token = authority.issue(Uuid::new_v4(), "alice", false, None)?;
/// assert_eq!(authority.verify(&token)?.sub, "alice");
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod credentials;
pub mod jwt;
pub mod middleware;
pub mod password;
