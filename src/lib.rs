pub mod config;
pub mod physics;
pub mod policy;
pub mod sim;
pub mod sonar;
pub mod stats;

pub use config::Config;
pub use sim::{Action, Phase, Simulation, StepOutcome};
