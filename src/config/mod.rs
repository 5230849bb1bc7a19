pub mod schema;
pub mod store;

pub use schema::{
    AutonomyLevel, HeartbeatConfig, IntegrationCredentials, Limits, RuntimeSettings,
    SecuritySwitches, ToolCategory, ToolPermissions,
};
pub use store::{PatchOutcome, RequiredConfirmation, SettingsStore};
