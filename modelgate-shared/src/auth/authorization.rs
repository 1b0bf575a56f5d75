/// Privilege checks
///
/// Two roles exist: ordinary users and administrators (`is_admin`). Users
/// act on their own records; administrators act on anyone's, except that
/// nobody may delete their own account.
///
/// # Example
///
/// ```
/// use modelgate_shared::auth::authorization::{require_admin, require_self_or_admin};
/// use modelgate_shared::auth::middleware::AuthContext;
/// use uuid::Uuid;
///
/// let me = AuthContext::new(Uuid::new_v4(), "alice", false);
///
/// assert!(require_self_or_admin(&me, me.user_id).is_ok());
/// assert!(require_self_or_admin(&me, Uuid::new_v4()).is_err());
/// assert!(require_admin(&me).is_err());
/// ```

use uuid::Uuid;

use super::middleware::AuthContext;

/// Error type for authorization checks
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    #[error("Administrator privileges required")]
    AdminRequired,

    /// Acting on someone else's record without admin rights
    #[error("Not authorized to access this resource")]
    NotOwner,

    #[error("Only administrators can change admin or active status")]
    PrivilegeEscalation,

    #[error("Cannot delete your own account")]
    SelfDeletion,
}

pub fn require_admin(actor: &AuthContext) -> Result<(), AuthzError> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(AuthzError::AdminRequired)
    }
}

pub fn require_self_or_admin(actor: &AuthContext, user_id: Uuid) -> Result<(), AuthzError> {
    if actor.is_self_or_admin(user_id) {
        Ok(())
    } else {
        Err(AuthzError::NotOwner)
    }
}

/// Checks an update to `target`; `changes_privileged` is whether `is_admin`
/// or `is_active` is touched.
///
/// Tokens outlive deactivation, so a deactivated user must not be able to
/// flip `is_active` back with a token issued before.
pub fn require_can_update(
    actor: &AuthContext,
    target: Uuid,
    changes_privileged: bool,
) -> Result<(), AuthzError> {
    require_self_or_admin(actor, target)?;

    if changes_privileged && !actor.is_admin {
        return Err(AuthzError::PrivilegeEscalation);
    }

    Ok(())
}

/// Admin only, and never the caller's own account.
pub fn require_can_delete(actor: &AuthContext, target: Uuid) -> Result<(), AuthzError> {
    require_admin(actor)?;

    if actor.user_id == target {
        return Err(AuthzError::SelfDeletion);
    }

    Ok(())
}
