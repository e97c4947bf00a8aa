pub mod retention;

pub use retention::{RetentionSweeper, SweepStats};
