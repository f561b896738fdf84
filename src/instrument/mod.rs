//! Starlight instrument control: one controller per physical unit, and the
//! orchestrator that binds the pair to stable roles.

pub mod controller;
pub mod orchestrator;

pub use controller::DeviceController;
pub use orchestrator::{resolve_binding, Binding, DeviceOrchestrator, RoleSerials, SetupState};
