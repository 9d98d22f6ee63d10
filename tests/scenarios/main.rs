//! Scenario tests driving workflows through the scheduler with a mock runner

mod helpers;

mod checkout;
mod env_propagation;
mod failure_handling;
mod history;
mod matrix_runs;
mod shell_end_to_end;
mod trigger_filtering;
