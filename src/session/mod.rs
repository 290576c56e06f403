mod scheduler;
mod state;
#[cfg(test)]
mod tests;

pub use scheduler::{cycle_delay, first_cycle_delay, DetectionScheduler, DetectionSchedulerBuilder};
pub use state::{DetectionSession, SessionStatus, StatsReport};
