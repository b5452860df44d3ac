//! Debate coordinators: the research (bull/bear) and risk (three-stance)
//! turn-taking state machines.

mod research;
mod risk;

pub use research::{DebateOutcome, ResearchDebateCoordinator};
pub use risk::{RiskDebateCoordinator, RiskOutcome};
