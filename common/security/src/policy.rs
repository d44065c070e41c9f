use std::fmt;

use common_auth::AuthContext;
use tracing::warn;
use uuid::Uuid;

use crate::SecurityError;

/// Identity facts the evaluator needs from a verified caller.
pub trait Principal {
    fn principal_id(&self) -> Uuid;
    fn is_admin(&self) -> bool;
}

impl Principal for AuthContext {
    fn principal_id(&self) -> Uuid {
        self.user_id()
    }

    fn is_admin(&self) -> bool {
        AuthContext::is_admin(self)
    }
}

/// User-management operations subject to authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    ReadSelf,
    Read { target: Uuid },
    List,
    Update { target: Uuid },
    AssignRoles { target: Uuid },
    Delete { target: Uuid },
    Create,
}

impl UserAction {
    pub fn name(&self) -> &'static str {
        match self {
            UserAction::ReadSelf => "read_self",
            UserAction::Read { .. } => "read",
            UserAction::List => "list",
            UserAction::Update { .. } => "update",
            UserAction::AssignRoles { .. } => "assign_roles",
            UserAction::Delete { .. } => "delete",
            UserAction::Create => "create",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    AdminOnly,
    NotOwner,
    SelfDeletion,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            DenyReason::AdminOnly => "This operation requires administrator rights",
            DenyReason::NotOwner => "You do not have permission to modify this user",
            DenyReason::SelfDeletion => "You do not have permission to delete yourself",
        };
        f.write_str(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Pure decision over caller identity and target; no I/O, no state.
pub fn evaluate<P: Principal + ?Sized>(caller: &P, action: UserAction) -> Decision {
    let caller_id = caller.principal_id();
    let admin = caller.is_admin();

    match action {
        UserAction::ReadSelf => Decision::Allow,
        UserAction::Read { target } if target == caller_id => Decision::Allow,
        UserAction::Read { .. } | UserAction::List | UserAction::Create => {
            if admin {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::AdminOnly)
            }
        }
        UserAction::Update { target } => {
            if admin || target == caller_id {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::NotOwner)
            }
        }
        // Role changes are admin-only even on one's own record.
        UserAction::AssignRoles { .. } => {
            if admin {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::AdminOnly)
            }
        }
        UserAction::Delete { target } => {
            if !admin {
                Decision::Deny(DenyReason::AdminOnly)
            } else if target == caller_id {
                Decision::Deny(DenyReason::SelfDeletion)
            } else {
                Decision::Allow
            }
        }
    }
}

/// Evaluate and log denials. Must run before any data is touched.
pub fn authorize<P: Principal + ?Sized>(caller: &P, action: UserAction) -> Result<(), SecurityError> {
    match evaluate(caller, action) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            warn!(
                caller_id = %caller.principal_id(),
                action = action.name(),
                target = ?action_target(action),
                reason = ?reason,
                "authorization_denied"
            );
            Err(SecurityError::Forbidden(reason))
        }
    }
}

fn action_target(action: UserAction) -> Option<Uuid> {
    match action {
        UserAction::Read { target }
        | UserAction::Update { target }
        | UserAction::AssignRoles { target }
        | UserAction::Delete { target } => Some(target),
        UserAction::ReadSelf | UserAction::List | UserAction::Create => None,
    }
}

/// Who may call the user-creation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationPolicy {
    /// Anyone, including unauthenticated callers, may register.
    Open,
    /// Only administrators may create accounts.
    AdminOnly,
}

pub fn authorize_registration<P: Principal + ?Sized>(
    policy: RegistrationPolicy,
    caller: Option<&P>,
) -> Result<(), SecurityError> {
    match (policy, caller) {
        (RegistrationPolicy::Open, _) => Ok(()),
        (RegistrationPolicy::AdminOnly, None) => Err(SecurityError::Unauthenticated),
        (RegistrationPolicy::AdminOnly, Some(caller)) => authorize(caller, UserAction::Create),
    }
}
