//! Roles and moderation permission checks.
//!
//! Roles are totally ordered `User < Mod < Admin < Owner`. An actor may only
//! act on targets strictly below its own role, and may only grant roles
//! strictly below its own. Owners can never be targeted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ChatError, ChatResult};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Mod,
    Admin,
    Owner,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Mod => "mod",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "mod" | "moderator" => Ok(Self::Mod),
            "admin" => Ok(Self::Admin),
            "owner" => Ok(Self::Owner),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Role-gated operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Kick,
    Mute,
    Ban,
    DeleteMessage,
    ClearChannel,
    SetTopic,
    DeleteChannel,
    AssignRole,
}

impl Action {
    pub fn required_role(self) -> Role {
        match self {
            Self::Kick | Self::Mute | Self::DeleteMessage | Self::SetTopic => Role::Mod,
            Self::Ban | Self::ClearChannel | Self::DeleteChannel | Self::AssignRole => Role::Admin,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Self::Kick => "kick users",
            Self::Mute => "mute users",
            Self::Ban => "ban users",
            Self::DeleteMessage => "delete messages",
            Self::ClearChannel => "clear channels",
            Self::SetTopic => "set topics",
            Self::DeleteChannel => "delete channels",
            Self::AssignRole => "assign roles",
        }
    }
}

/// Check that `actor` may perform `action` at all.
pub fn authorize(actor: Role, action: Action) -> ChatResult<()> {
    if actor >= action.required_role() {
        Ok(())
    } else {
        Err(ChatError::forbidden(format!(
            "You do not have permission to {}",
            action.verb()
        )))
    }
}

/// Check that `actor` may perform `action` on a user holding `target`.
pub fn authorize_against(actor: Role, target: Role, action: Action) -> ChatResult<()> {
    authorize(actor, action)?;
    if target == Role::Owner {
        return Err(ChatError::forbidden("The owner cannot be moderated"));
    }
    if target >= actor {
        return Err(ChatError::forbidden(
            "You cannot moderate a user with an equal or higher role",
        ));
    }
    Ok(())
}

/// Check a role change of a user currently holding `current` to `new_role`.
pub fn authorize_role_change(actor: Role, current: Role, new_role: Role) -> ChatResult<()> {
    authorize_against(actor, current, Action::AssignRole)?;
    if new_role >= actor {
        return Err(ChatError::forbidden(
            "You cannot assign a role equal to or higher than your own",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_ordered() {
        assert!(Role::User < Role::Mod);
        assert!(Role::Mod < Role::Admin);
        assert!(Role::Admin < Role::Owner);
    }

    #[test]
    fn role_parse_and_display() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("moderator".parse::<Role>().unwrap(), Role::Mod);
        assert!("king".parse::<Role>().is_err());
        assert_eq!(Role::Owner.to_string(), "owner");
    }

    #[test]
    fn kick_requires_mod() {
        assert!(authorize_against(Role::User, Role::User, Action::Kick).is_err());
        assert!(authorize_against(Role::Mod, Role::User, Action::Kick).is_ok());
    }

    #[test]
    fn cannot_kick_equal_or_higher() {
        let err = authorize_against(Role::Mod, Role::Mod, Action::Kick).unwrap_err();
        assert!(matches!(err, ChatError::Forbidden(_)));
        assert!(authorize_against(Role::Mod, Role::Admin, Action::Kick).is_err());
    }

    #[test]
    fn ban_requires_admin() {
        assert!(authorize_against(Role::Mod, Role::User, Action::Ban).is_err());
        assert!(authorize_against(Role::Admin, Role::Mod, Action::Ban).is_ok());
    }

    #[test]
    fn owner_is_immutable() {
        assert!(authorize_against(Role::Owner, Role::Owner, Action::Ban).is_err());
        assert!(authorize_role_change(Role::Owner, Role::Owner, Role::User).is_err());
    }

    #[test]
    fn role_assignment_bounds() {
        assert!(authorize_role_change(Role::Admin, Role::User, Role::Mod).is_ok());
        assert!(authorize_role_change(Role::Admin, Role::User, Role::Admin).is_err());
        assert!(authorize_role_change(Role::Owner, Role::Mod, Role::Admin).is_ok());
        assert!(authorize_role_change(Role::Mod, Role::User, Role::User).is_err());
    }
}
