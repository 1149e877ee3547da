//! Authorization context supplied by the (external) session layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Role of the calling user inside a business
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    #[default]
    Seller,
    /// Read-only access
    Viewer,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Seller => "seller",
            Self::Viewer => "viewer",
        }
    }

    #[must_use]
    pub const fn can_write(self) -> bool {
        !matches!(self, Self::Viewer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "seller" => Ok(Self::Seller),
            "viewer" => Ok(Self::Viewer),
            other => Err(Error::validation(format!("unknown role '{other}'"))),
        }
    }
}

/// Opaque caller context carried on every call: business, user, role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub business_id: String,
    pub user_id: String,
    pub role: Role,
}

impl AuthContext {
    pub fn new(
        business_id: impl Into<String>,
        user_id: impl Into<String>,
        role: Role,
    ) -> Result<Self> {
        let business_id = business_id.into().trim().to_string();
        let user_id = user_id.into().trim().to_string();
        if business_id.is_empty() {
            return Err(Error::validation("business id must not be empty"));
        }
        if user_id.is_empty() {
            return Err(Error::validation("user id must not be empty"));
        }
        Ok(Self {
            business_id,
            user_id,
            role,
        })
    }

    /// Fails with `Forbidden` unless the role may mutate data.
    pub fn require_write(&self) -> Result<()> {
        if self.role.can_write() {
            Ok(())
        } else {
            Err(Error::forbidden(format!(
                "role '{}' cannot modify data",
                self.role
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_cannot_write() {
        let ctx = AuthContext::new("biz", "u1", Role::Viewer).unwrap();
        let error = ctx.require_write().unwrap_err();
        assert_eq!(error.code(), "FORBIDDEN");

        let seller = AuthContext::new("biz", "u1", Role::Seller).unwrap();
        assert!(seller.require_write().is_ok());
    }

    #[test]
    fn rejects_blank_business() {
        assert!(AuthContext::new("  ", "u1", Role::Owner).is_err());
    }

    #[test]
    fn parses_roles_case_insensitively() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("root".parse::<Role>().is_err());
    }
}
