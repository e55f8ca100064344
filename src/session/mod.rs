//! Session infrastructure: the per-match actor, its command protocol, the
//! player binding index and the registry/manager that owns them all.

mod actor;
mod binding;
mod command;
mod handle;
mod manager;
mod models;

pub use actor::{ActorConfig, ActorContext, SessionActor};
pub use binding::{Binding, PlayerSessionIndex};
pub use command::{JoinResponse, SessionCommand};
pub use handle::SessionHandle;
pub use manager::SessionManager;
pub use models::{ActiveSessionSnapshot, CommandResult, JoinResult, TouchResult};
