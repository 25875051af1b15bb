//! Authentication and role-based access control.
//!
//! Bearer tokens come in three purposes: short-lived access tokens checked
//! statelessly on every request, refresh tokens bound to the user row (one
//! valid refresh token per user, rotated on every use), and email
//! verification tokens redeemed through a link.

mod bearer;
mod errors;
mod extractors;
mod guard;
mod ip;
mod session;
mod state;
mod verification;

pub use bearer::get_bearer_token;
pub use errors::AuthError;
pub use extractors::{AdminOnly, AnyRole, Auth, BearerToken, RoleConstraint, StaffOnly};
pub use guard::{AccessGuard, AuthContext};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use session::{SessionManager, TokenPair};
pub use state::HasAuthState;
pub use verification::{LogMailer, MailDispatcher, Redemption, VerificationFlow};
