//! Contains subcommands for the gateway.

mod doctor;
pub use doctor::DoctorCommand;

mod sync;
pub use sync::SyncCommand;

mod worker;
pub use worker::WorkerCommand;
