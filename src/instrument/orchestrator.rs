//! Role resolution for a pair of identical Starlight units.
//!
//! Both controllers attach to "whichever unit answers first", so the physical unit
//! behind each controller is only known after connecting. The orchestrator connects
//! both, compares the reported serial numbers against the serials expected for
//! role A and role B, and either keeps the binding, swaps it, or gives up. Callers
//! then address devices by [`Role`] and never by connection order.
//!
//! ```text
//! Uninitialized --(both connect)--> IdentityCheck --> Resolved
//!       |                                        \--> Failed
//!       \--(a connect fails)-----------------------> Failed
//! ```
//!
//! `Failed` is sticky until [`DeviceOrchestrator::reconnect`] runs a new cycle.

use super::controller::DeviceController;
use crate::error::{DeviceError, DeviceResult, Operation};
use crate::types::{DetectorReading, Role};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Serial numbers expected for each role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSerials {
    /// Serial number of the unit addressed as role A
    pub a: String,
    /// Serial number of the unit addressed as role B
    pub b: String,
}

impl RoleSerials {
    /// Expect `a` for role A and `b` for role B.
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
        }
    }

    /// Serial number expected for `role`.
    pub fn get(&self, role: Role) -> &str {
        match role {
            Role::A => &self.a,
            Role::B => &self.b,
        }
    }
}

/// Orchestrator lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupState {
    /// No connect cycle has run yet.
    Uninitialized,
    /// Both controllers connected; serials are being compared.
    IdentityCheck,
    /// Roles are bound and addressable.
    Resolved,
    /// Setup gave up; role-addressed calls fail until reconnect.
    Failed {
        /// Diagnostic for the failure
        reason: String,
    },
}

/// How the connected controllers map onto roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// First controller is role A, second is role B.
    AsConnected,
    /// First controller is role B, second is role A.
    Swapped,
}

/// Decide the role binding from the serials the two controllers reported.
///
/// Anything other than an exact match in one of the two orders is an error; the
/// orchestrator never guesses.
pub fn resolve_binding(
    expected: &RoleSerials,
    first: Option<&str>,
    second: Option<&str>,
) -> Result<Binding, String> {
    let (a, b) = (expected.a.as_str(), expected.b.as_str());
    match (first, second) {
        (Some(f), Some(s)) if f == a && s == b => Ok(Binding::AsConnected),
        (Some(f), Some(s)) if f == b && s == a => Ok(Binding::Swapped),
        _ => Err(format!(
            "expected serials {{{}, {}}} but devices reported {{{}, {}}}",
            a,
            b,
            first.unwrap_or("none"),
            second.unwrap_or("none")
        )),
    }
}

/// Owns the two controllers and exposes them by role.
#[derive(Debug)]
pub struct DeviceOrchestrator {
    /// Index 0 is role A once resolved
    controllers: [DeviceController; 2],
    expected: RoleSerials,
    state: SetupState,
}

impl DeviceOrchestrator {
    /// Take ownership of two unconnected controllers. Their order is irrelevant.
    pub fn new(first: DeviceController, second: DeviceController, expected: RoleSerials) -> Self {
        Self {
            controllers: [first, second],
            expected,
            state: SetupState::Uninitialized,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &SetupState {
        &self.state
    }

    /// Serials the roles are bound against.
    pub fn expected(&self) -> &RoleSerials {
        &self.expected
    }

    /// `true` once both roles are bound.
    pub fn is_resolved(&self) -> bool {
        self.state == SetupState::Resolved
    }

    /// Connect both controllers and bind them to roles.
    ///
    /// Runs once per connect cycle: a resolved orchestrator returns `Ok` without
    /// touching the devices, a failed one keeps failing until [`Self::reconnect`].
    pub async fn setup(&mut self) -> DeviceResult<()> {
        match &self.state {
            SetupState::Resolved => return Ok(()),
            SetupState::Failed { reason } => {
                return Err(DeviceError::SetupFailed {
                    reason: reason.clone(),
                })
            }
            SetupState::Uninitialized | SetupState::IdentityCheck => {}
        }

        for index in 0..self.controllers.len() {
            if !self.controllers[index].connect().await {
                let reason = format!(
                    "device '{}' could not connect",
                    self.controllers[index].label()
                );
                return Err(self.fail(reason));
            }
        }

        self.state = SetupState::IdentityCheck;
        let binding = resolve_binding(
            &self.expected,
            self.controllers[0].serial_number(),
            self.controllers[1].serial_number(),
        );

        match binding {
            Ok(Binding::AsConnected) => {}
            Ok(Binding::Swapped) => {
                info!("Devices connected in reverse order, swapping roles");
                self.controllers.swap(0, 1);
            }
            Err(reason) => return Err(self.fail(reason)),
        }

        self.state = SetupState::Resolved;
        info!(
            role_a = %self.controllers[0].identity(),
            role_b = %self.controllers[1].identity(),
            "Starlight devices resolved"
        );
        Ok(())
    }

    /// Disconnect both controllers and run a fresh [`Self::setup`].
    pub async fn reconnect(&mut self) -> DeviceResult<()> {
        for controller in self.controllers.iter_mut() {
            controller.disconnect().await;
        }
        self.state = SetupState::Uninitialized;
        self.setup().await
    }

    /// Controller bound to `role`.
    ///
    /// Fails with `SetupFailed` if the controller has since re-attached to a unit
    /// other than the one expected for `role`.
    pub fn device(&self, role: Role) -> DeviceResult<&DeviceController> {
        self.ensure_resolved()?;
        self.check_binding(role)
            .map_err(|reason| DeviceError::SetupFailed { reason })?;
        Ok(&self.controllers[Self::index(role)])
    }

    /// Mutable controller bound to `role`, for commands.
    ///
    /// A controller found attached to the wrong unit moves the orchestrator to
    /// `Failed`; only [`Self::reconnect`] restores role addressing.
    pub fn device_mut(&mut self, role: Role) -> DeviceResult<&mut DeviceController> {
        self.ensure_resolved()?;
        if let Err(reason) = self.check_binding(role) {
            return Err(self.fail(reason));
        }
        Ok(&mut self.controllers[Self::index(role)])
    }

    /// Serial number of the unit bound to `role`.
    pub fn serial_number(&self, role: Role) -> DeviceResult<&str> {
        self.device(role)?
            .serial_number()
            .ok_or(DeviceError::NotConnected {
                operation: Operation::ReadRole { role },
            })
    }

    /// Read the detector of the unit bound to `role`.
    pub async fn read(&mut self, role: Role) -> DeviceResult<DetectorReading> {
        self.device_mut(role)?.read_detector_value().await
    }

    fn ensure_resolved(&self) -> DeviceResult<()> {
        match &self.state {
            SetupState::Resolved => Ok(()),
            SetupState::Failed { reason } => Err(DeviceError::SetupFailed {
                reason: reason.clone(),
            }),
            SetupState::Uninitialized | SetupState::IdentityCheck => {
                Err(DeviceError::SetupFailed {
                    reason: "device roles not resolved yet, run setup() first".to_string(),
                })
            }
        }
    }

    /// A disconnected controller is still bound; a connected one must carry the
    /// role's serial.
    fn check_binding(&self, role: Role) -> Result<(), String> {
        let expected = self.expected.get(role);
        match self.controllers[Self::index(role)].serial_number() {
            Some(serial) if serial != expected => Err(format!(
                "role {} expects serial {} but its device re-attached to {}",
                role, expected, serial
            )),
            _ => Ok(()),
        }
    }

    fn fail(&mut self, reason: String) -> DeviceError {
        error!("Cannot bring up Starlight devices: {}", reason);
        if self.controllers.iter().any(DeviceController::is_connected) {
            warn!("Connected devices stay unaddressable until reconnect");
        }
        self.state = SetupState::Failed {
            reason: reason.clone(),
        };
        DeviceError::SetupFailed { reason }
    }

    fn index(role: Role) -> usize {
        match role {
            Role::A => 0,
            Role::B => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected() -> RoleSerials {
        RoleSerials::new("0105", "1266")
    }

    #[test]
    fn binding_keeps_matching_order() {
        assert_eq!(
            resolve_binding(&expected(), Some("0105"), Some("1266")),
            Ok(Binding::AsConnected)
        );
    }

    #[test]
    fn binding_swaps_reversed_order() {
        assert_eq!(
            resolve_binding(&expected(), Some("1266"), Some("0105")),
            Ok(Binding::Swapped)
        );
    }

    #[test]
    fn binding_rejects_unknown_duplicate_and_missing() {
        assert!(resolve_binding(&expected(), Some("0105"), Some("9999")).is_err());
        assert!(resolve_binding(&expected(), Some("1266"), Some("1266")).is_err());
        assert!(resolve_binding(&expected(), None, Some("1266")).is_err());
        let reason = resolve_binding(&expected(), Some("7"), Some("8")).unwrap_err();
        assert!(reason.contains("{7, 8}"));
    }

    #[test]
    fn role_serials_lookup() {
        let serials = expected();
        assert_eq!(serials.get(Role::A), "0105");
        assert_eq!(serials.get(Role::B), "1266");
    }
}
