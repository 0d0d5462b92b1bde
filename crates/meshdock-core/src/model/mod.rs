// ── Console domain model ──
//
// Canonical types consumers (CLI, UI bridges) depend on. Wire shapes from
// the stack live in `meshdock_api`; everything here is decoded and typed.

pub mod lifecycle;
pub mod netmap;
pub mod profile;

// ── Re-exports ──────────────────────────────────────────────────────

pub use lifecycle::{LifecycleState, Surface, SurfaceKind, Toast, ToastLevel};
pub use netmap::{NetworkMap, Peer, SelfNode, User};
pub use profile::{Profile, ProfileId, ProfileIdentity, ProfilePrefs, ProfileSet, UserProfile};
