pub mod detect;
pub mod rules;

pub use detect::{Detection, Detector, Validation};
