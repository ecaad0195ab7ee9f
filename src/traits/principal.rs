//! Principals and their impersonation policy.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Identifier of a principal: an integer key or a string key.
///
/// Serialized untagged so that it is stored in the session as a plain JSON
/// number or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrincipalId {
    Int(i64),
    Str(String),
}

impl PrincipalId {
    /// Read an identifier back from a raw session value.
    ///
    /// Anything that is not an integer or a string (floats, booleans, objects)
    /// is not an identifier.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(id) => Value::from(*id),
            Self::Str(id) => Value::from(id.as_str()),
        }
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{}", id),
            Self::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for PrincipalId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<&str> for PrincipalId {
    fn from(id: &str) -> Self {
        Self::Str(id.to_string())
    }
}

impl From<String> for PrincipalId {
    fn from(id: String) -> Self {
        Self::Str(id)
    }
}

/// An authenticated identity known to a guard.
///
/// The two policy methods default to `true`: a principal type opts out of
/// impersonation by overriding them, it never has to opt in. Principals are
/// handled as trait objects, so every concrete type carries its own policy.
///
/// # Example
///
/// ```rust
/// use tideway_impersonation::{Principal, PrincipalId};
///
/// #[derive(Debug)]
/// struct Admin {
///     id: i64,
/// }
///
/// impl Principal for Admin {
///     fn id(&self) -> PrincipalId {
///         PrincipalId::Int(self.id)
///     }
///
///     // Admins can never be impersonated.
///     fn can_be_impersonated(&self) -> bool {
///         false
///     }
/// }
/// ```
pub trait Principal: Send + Sync + fmt::Debug {
    fn id(&self) -> PrincipalId;

    fn email(&self) -> Option<&str> {
        None
    }

    /// Whether this principal may start impersonating others.
    fn can_impersonate(&self) -> bool {
        true
    }

    /// Whether others may impersonate this principal.
    fn can_be_impersonated(&self) -> bool {
        true
    }
}

/// Shared handle to a principal of any concrete type.
pub type SharedPrincipal = Arc<dyn Principal>;
