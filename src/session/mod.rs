//! The interview session: state machine, snapshots and the loop driving them.

pub mod machine;
pub mod runner;
pub mod state;

pub use machine::SessionStateMachine;
pub use runner::{SessionHandle, spawn_session};
pub use state::{
    BannerKind, SessionSnapshot, SessionStatus, StatusBanner, TurnState, format_elapsed,
};
