//! Record permission gate
//!
//! Consulted once per recording start attempt. The controller awaits the answer
//! on its control context without a deadline and never caches it.

/// Answers whether audio capture is authorized
pub trait PermissionGate: Send {
    fn request_record_permission(&self) -> bool;
}

/// Fixed answer, for headless runs and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticPermission(pub bool);

impl StaticPermission {
    pub fn granted() -> Self {
        Self(true)
    }

    pub fn denied() -> Self {
        Self(false)
    }
}

impl PermissionGate for StaticPermission {
    fn request_record_permission(&self) -> bool {
        self.0
    }
}

impl<F> PermissionGate for F
where
    F: Fn() -> bool + Send,
{
    fn request_record_permission(&self) -> bool {
        self()
    }
}
