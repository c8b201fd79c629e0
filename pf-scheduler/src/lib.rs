//! Clock & activity scheduler, human-like action controller, and mode
//! manager: the pacing layer that decides *when* the agent is allowed
//! to act and how aggressively.

pub mod clock;
pub mod human_like;
pub mod mode;

pub use clock::{ActivityScheduler, ActivityState};
pub use human_like::{ActionKind, HumanLikeController};
pub use mode::{AgentMode, ModeManager};
