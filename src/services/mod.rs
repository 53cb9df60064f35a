pub mod command;
pub mod credentials;
pub mod dispatch;
pub mod github;
pub mod lease;
pub mod lifecycle;
pub mod render;
pub mod scheduler;

pub use command::{CommandOutput, CommandRunner, CommandSpec, RecordingRunner, ShellRunner};
pub use dispatch::{branch_name_from_ref, EventDispatcher, Outcome};
pub use github::StatusNotifier;
pub use lease::LeaseMap;
pub use lifecycle::LifecycleOrchestrator;
pub use render::ConfigRenderer;
pub use scheduler::JobScheduler;
