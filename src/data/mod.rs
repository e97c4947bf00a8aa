pub mod observation;

pub use observation::Observation;
