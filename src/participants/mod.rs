mod registry;

pub use registry::{ParticipantRegistry, RegistryError, TabRemoval};
