//! Authentication state trait and macro.

use super::guard::AccessGuard;

/// Trait for router state types that can authenticate requests.
pub trait HasAuthState {
    fn guard(&self) -> &AccessGuard;
}

/// Macro to implement `HasAuthState` for state structs with a `guard: AccessGuard` field.
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_state;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub db: Database,
///     pub guard: AccessGuard,
/// }
///
/// impl_has_auth_state!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_state {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthState for $state_type {
            fn guard(&self) -> &$crate::auth::AccessGuard {
                &self.guard
            }
        }
    };
}
