// ── Lifecycle and navigation types ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumDiscriminants, IntoStaticStr};

/// Where the console is in the stack's session lifecycle.
///
/// Only the controller's dispatch loop changes this, and only in reaction
/// to a stack notification.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Booting,
    NeedsAuthentication,
    Running,
    Stopped,
}

impl LifecycleState {
    /// States in which the stack may still be asking for credentials.
    pub fn is_pre_auth(self) -> bool {
        matches!(self, Self::Booting | Self::NeedsAuthentication)
    }
}

/// A top-level UI surface. At most one is mounted at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, EnumDiscriminants)]
#[strum_discriminants(name(SurfaceKind))]
#[strum_discriminants(derive(Display, Hash, Serialize, Deserialize))]
#[serde(tag = "surface", rename_all = "snake_case")]
pub enum Surface {
    /// Shown while the stack boots.
    Loading,
    /// Authentication pending. `auth_url` is set once the stack hands out
    /// an out-of-band login URL.
    Login { auth_url: Option<String> },
    /// The authenticated application.
    App,
    /// Shown after the session stopped (user logged out).
    LoggedOut,
    /// Unrecoverable error. Nothing else will be mounted afterwards.
    Fatal { detail: String },
}

impl Surface {
    pub fn kind(&self) -> SurfaceKind {
        SurfaceKind::from(self)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::App)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ToastLevel {
    Info,
    Warning,
    Error,
}

/// Non-blocking user-visible message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

impl Toast {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Error,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_kinds_ignore_payload() {
        assert_eq!(
            Surface::Login { auth_url: None }.kind(),
            Surface::Login {
                auth_url: Some("https://login.example.net/a/1".into())
            }
            .kind()
        );
        assert_eq!(SurfaceKind::LoggedOut.to_string(), "LoggedOut");
        assert!(Surface::App.is_authenticated());
        assert!(!Surface::Loading.is_authenticated());
    }

    #[test]
    fn lifecycle_names() {
        assert_eq!(LifecycleState::NeedsAuthentication.to_string(), "needs_authentication");
        assert!(LifecycleState::Booting.is_pre_auth());
        assert!(!LifecycleState::Stopped.is_pre_auth());
    }
}
