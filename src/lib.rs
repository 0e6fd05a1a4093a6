pub mod bridge;
pub mod checkpoint;
pub mod errors;
pub mod fileset;
pub mod session;
pub mod store;
pub mod typings;

pub use bridge::SandboxBridge;
pub use checkpoint::CheckpointService;
pub use fileset::{EditDebouncer, FileSet};
pub use session::{Coordinator, SessionMode};
pub use store::{DbHandle, LessonDb};
