//! Active View Switch
//!
//! The process-wide control that grants one domain elevated (write)
//! access to its memory for the duration of a critical section.
//!
//! # Design
//! - Two states: `Idle` and `Elevated(domain)`
//! - `activate` hands back an RAII guard; dropping the guard deactivates
//! - There is no unguarded deactivate, so an unmatched activation cannot
//!   outlive its scope even on error paths
//!
//! # Security Properties
//! - At most one domain is elevated at a time per switch
//! - Activating while elevated fails loudly and changes nothing
//! - The state is behind a lock, so elevation is serialized across threads

use core::fmt;

use log::trace;
use spin::Mutex;

use crate::domain::DomainId;

/// Error type for view switch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewError {
    /// A domain view is already elevated; nesting is not supported.
    AlreadyElevated(DomainId),
    /// The operation requires the owning domain's view to be elevated.
    NotElevated,
}

impl fmt::Display for ViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyElevated(current) => {
                write!(f, "view already elevated for {}", current)
            }
            Self::NotElevated => write!(f, "operation requires an elevated view"),
        }
    }
}

/// Elevation state of the execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    /// No domain has elevated access.
    Idle,
    /// Exactly one domain has elevated access.
    Elevated(DomainId),
}

/// The switch controlling which domain, if any, is elevated.
pub struct ViewSwitch {
    state: Mutex<ViewState>,
}

impl ViewSwitch {
    /// Create a switch in the `Idle` state.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(ViewState::Idle),
        }
    }

    /// Elevate access for `domain`.
    ///
    /// Returns a guard that restores `Idle` when dropped. Fails with
    /// `AlreadyElevated` if any domain is currently elevated; the elevated
    /// domain is left unchanged in that case.
    pub fn activate(&self, domain: DomainId) -> Result<ViewGuard<'_>, ViewError> {
        let mut state = self.state.lock();
        match *state {
            ViewState::Idle => {
                *state = ViewState::Elevated(domain);
                trace!("view elevated for {}", domain);
                Ok(ViewGuard {
                    switch: self,
                    domain,
                })
            }
            ViewState::Elevated(current) => Err(ViewError::AlreadyElevated(current)),
        }
    }

    /// The currently elevated domain, if any.
    pub fn current(&self) -> Option<DomainId> {
        match *self.state.lock() {
            ViewState::Idle => None,
            ViewState::Elevated(domain) => Some(domain),
        }
    }

    /// Check whether `domain` is the currently elevated one.
    #[inline]
    pub fn is_elevated_for(&self, domain: DomainId) -> bool {
        self.current() == Some(domain)
    }
}

impl Default for ViewSwitch {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for an elevated view.
///
/// Holding the guard is the proof of elevation; dropping it (or calling
/// `deactivate`) restores the `Idle` state on every exit path.
#[must_use = "dropping the guard immediately deactivates the view"]
pub struct ViewGuard<'a> {
    switch: &'a ViewSwitch,
    domain: DomainId,
}

impl ViewGuard<'_> {
    /// Domain this guard elevates.
    #[inline]
    pub fn domain(&self) -> DomainId {
        self.domain
    }

    /// Explicitly end the critical section.
    pub fn deactivate(self) {
        // Drop does the work.
    }
}

impl Drop for ViewGuard<'_> {
    fn drop(&mut self) {
        *self.switch.state.lock() = ViewState::Idle;
        trace!("view restored to idle from {}", self.domain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(index: u16) -> DomainId {
        DomainId::new(index).unwrap()
    }

    #[test]
    fn activate_then_drop_restores_idle() {
        let switch = ViewSwitch::new();
        {
            let guard = switch.activate(domain(1)).unwrap();
            assert_eq!(switch.current(), Some(domain(1)));
            assert_eq!(guard.domain(), domain(1));
        }
        assert_eq!(switch.current(), None);
    }

    #[test]
    fn reactivation_after_deactivate_succeeds() {
        let switch = ViewSwitch::new();
        switch.activate(domain(1)).unwrap().deactivate();
        let guard = switch.activate(domain(2)).unwrap();
        assert_eq!(switch.current(), Some(domain(2)));
        drop(guard);
    }

    #[test]
    fn nested_activation_fails_without_state_change() {
        let switch = ViewSwitch::new();
        let _guard = switch.activate(domain(1)).unwrap();

        assert_eq!(
            switch.activate(domain(2)).err(),
            Some(ViewError::AlreadyElevated(domain(1)))
        );
        // The original elevation is untouched.
        assert!(switch.is_elevated_for(domain(1)));
    }

    #[test]
    fn guard_releases_on_early_return() {
        let switch = ViewSwitch::new();

        fn bails_out(switch: &ViewSwitch, domain: DomainId) -> Result<(), ViewError> {
            let _guard = switch.activate(domain)?;
            Err(ViewError::NotElevated) // any error path
        }

        assert!(bails_out(&switch, domain(3)).is_err());
        assert_eq!(switch.current(), None);
    }
}
