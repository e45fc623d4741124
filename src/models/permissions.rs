use serde::{Deserialize, Serialize};

/// Capabilities reported by the engine's `checkPermissions`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionState {
    pub usage: bool,
    pub overlay: bool,
}

impl PermissionState {
    pub fn all_granted(&self) -> bool {
        PermissionStep::ORDER.iter().all(|step| step.is_granted(self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionStep {
    /// Usage access: lets the engine see which app is in the foreground.
    Usage,
    /// Draw-over-apps: lets the engine show the pause screen.
    Overlay,
}

impl PermissionStep {
    /// Usage comes first; without detection nothing can trigger the overlay.
    pub const ORDER: [PermissionStep; 2] = [PermissionStep::Usage, PermissionStep::Overlay];

    pub fn is_granted(&self, state: &PermissionState) -> bool {
        match self {
            PermissionStep::Usage => state.usage,
            PermissionStep::Overlay => state.overlay,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            PermissionStep::Usage => 0,
            PermissionStep::Overlay => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionStep::Usage => "usage",
            PermissionStep::Overlay => "overlay",
        }
    }
}

/// First permission in the fixed order that is still missing.
pub fn current_step(state: &PermissionState) -> Option<PermissionStep> {
    PermissionStep::ORDER
        .into_iter()
        .find(|step| !step.is_granted(state))
}
