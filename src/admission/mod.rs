//! Session admission: per-mode capacity plus multi-key fixed-window rate
//! limits, decided atomically per creation attempt.

mod gate;
mod limiter;
mod window;

pub use gate::{AdmissionPermit, ClientIdentity, SessionAdmissionGate};
pub use limiter::{ActiveSessionLimiter, CapacityPermit};
pub use window::{AdmissionDenial, LimitEntry, WindowCounterRegistry};
