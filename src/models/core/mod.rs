pub mod approval_gate;
pub mod candidate;
pub mod job;
pub mod pipeline;
pub mod pipeline_step;
pub mod run;
pub mod scheduler_state;
pub mod vote;
