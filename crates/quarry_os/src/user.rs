#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};

/// Identity of the user on whose behalf the current invocation runs.
pub trait CurrentUserProvider<K>: Send + Sync {
    /// The service user while service-user mode is on, otherwise the authenticated user.
    fn current_user_id(&self) -> Option<K>;
    fn enable_service_user_mode(&self);
    fn disable_service_user_mode(&self);
    fn is_service_user_mode(&self) -> bool;
}

/// Per-invocation provider over a fixed authenticated user.
#[derive(Debug)]
pub struct ScopedCurrentUser<K> {
    user_id: Option<K>,
    service_user_id: K,
    service_user_mode: AtomicBool,
}

impl<K> ScopedCurrentUser<K> {
    pub fn new(user_id: Option<K>, service_user_id: K) -> Self {
        Self {
            user_id,
            service_user_id,
            service_user_mode: AtomicBool::new(false),
        }
    }
}

impl<K> CurrentUserProvider<K> for ScopedCurrentUser<K>
where
    K: Clone + Send + Sync,
{
    fn current_user_id(&self) -> Option<K> {
        if self.is_service_user_mode() {
            Some(self.service_user_id.clone())
        } else {
            self.user_id.clone()
        }
    }

    fn enable_service_user_mode(&self) {
        self.service_user_mode.store(true, Ordering::SeqCst);
    }

    fn disable_service_user_mode(&self) {
        self.service_user_mode.store(false, Ordering::SeqCst);
    }

    fn is_service_user_mode(&self) -> bool {
        self.service_user_mode.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_user_mode_swaps_identity() {
        let provider = ScopedCurrentUser::new(Some(42u32), 1);
        assert_eq!(provider.current_user_id(), Some(42));
        provider.enable_service_user_mode();
        assert_eq!(provider.current_user_id(), Some(1));
        provider.disable_service_user_mode();
        assert_eq!(provider.current_user_id(), Some(42));
    }

    #[test]
    fn anonymous_invocation_has_no_user_until_service_mode() {
        let provider = ScopedCurrentUser::new(None, 1u32);
        assert_eq!(provider.current_user_id(), None);
        provider.enable_service_user_mode();
        assert!(provider.is_service_user_mode());
        assert_eq!(provider.current_user_id(), Some(1));
    }
}
