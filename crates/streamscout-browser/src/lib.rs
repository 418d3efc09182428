pub mod chromium;
pub mod profiles;

pub use chromium::{ChromiumFactory, ChromiumSession};
pub use profiles::{ProfileDef, ProfilesFile, ScriptedProfile, load_registry};
