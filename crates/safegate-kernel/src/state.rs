//! [`SafetyState`] – the global actuation flags.
//!
//! There is exactly one `SafetyState` per gateway. It is owned by
//! [`SafetyGateway`][crate::gateway::SafetyGateway] and lent to the active
//! policy on every hook call: `init` receives `&mut SafetyState`, every other
//! hook receives `&SafetyState`. That split is what guarantees no hook other
//! than `init` can flip `controls_allowed`.

use safegate_types::SafetyLifecycle;

/// Process-wide actuation flags.
///
/// # Example
///
/// ```
/// use safegate_kernel::SafetyState;
/// use safegate_types::SafetyLifecycle;
///
/// let mut state = SafetyState::new();
/// assert!(!state.controls_allowed());
/// assert_eq!(state.lifecycle(), SafetyLifecycle::Uninitialized);
///
/// state.set_controls_allowed(true);
/// state.reset_relay_malfunction();
/// assert!(state.controls_allowed());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafetyState {
    controls_allowed: bool,
    relay_malfunction: bool,
    initialized: bool,
}

impl SafetyState {
    /// Fresh, uninitialised state: actuation not permitted, no fault.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether actuation is currently permitted.
    pub fn controls_allowed(&self) -> bool {
        self.controls_allowed
    }

    /// Whether the relay malfunction fault is latched.
    pub fn relay_malfunction(&self) -> bool {
        self.relay_malfunction
    }

    /// Whether a policy `init` has run since construction.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Set `controls_allowed`. Only reachable through `&mut`, i.e. from a
    /// policy's `init`.
    pub fn set_controls_allowed(&mut self, allowed: bool) {
        self.controls_allowed = allowed;
    }

    /// Clear the relay malfunction flag. Idempotent.
    pub fn reset_relay_malfunction(&mut self) {
        self.relay_malfunction = false;
    }

    /// Latch the relay malfunction flag. Returns `true` when the flag was
    /// not already set.
    pub(crate) fn latch_relay_malfunction(&mut self) -> bool {
        let newly = !self.relay_malfunction;
        self.relay_malfunction = true;
        newly
    }

    pub(crate) fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    /// Lifecycle view of the flags. A latched malfunction wins over every
    /// other state.
    pub fn lifecycle(&self) -> SafetyLifecycle {
        if self.relay_malfunction {
            SafetyLifecycle::Faulted
        } else if !self.initialized {
            SafetyLifecycle::Uninitialized
        } else if self.controls_allowed {
            SafetyLifecycle::Permitted
        } else {
            SafetyLifecycle::Restricted
        }
    }
}
