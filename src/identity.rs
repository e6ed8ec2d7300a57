//! The caller identity injected by the upstream authentication layer.
//!
//! Nothing here authenticates anyone. The gateway in front of this server
//! has already done that and forwards the result as two headers, which are
//! parsed into an [`Identity`] and handed explicitly to every operation.

use std::{fmt, str::FromStr};

use async_graphql::Enum;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub(crate) const USER_ID_HEADER: &str = "x-user-id";
pub(crate) const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Enum, Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Role {
    #[default]
    Buyer,
    Seller,
    Admin,
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buyer" | "user" => Ok(Self::Buyer),
            "seller" | "agent" => Ok(Self::Seller),
            "admin" => Ok(Self::Admin),
            other => Err(AppError::validation(format!("unknown role `{other}`"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
            Role::Admin => "admin",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Identity {
    pub(crate) user_id: u64,
    pub(crate) role: Role,
}

impl Identity {
    pub(crate) fn new(user_id: u64, role: Role) -> Self {
        Self { user_id, role }
    }

    pub(crate) fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub(crate) fn require_admin(&self) -> AppResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::forbidden("admin access required"))
        }
    }

    pub(crate) fn require_seller(&self) -> AppResult<()> {
        match self.role {
            Role::Seller | Role::Admin => Ok(()),
            Role::Buyer => Err(AppError::forbidden("only sellers can list properties")),
        }
    }

    /// Owners and admins may act on a resource.
    pub(crate) fn require_owner_or_admin(&self, owner_id: u64, what: &str) -> AppResult<()> {
        if self.user_id == owner_id || self.is_admin() {
            Ok(())
        } else {
            Err(AppError::forbidden(format!("not authorized to modify this {what}")))
        }
    }
}
