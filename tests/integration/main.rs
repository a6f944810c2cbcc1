//! Integration tests

mod config_test;
mod exercise_test;
mod lifecycle_test;
mod scenario_test;
