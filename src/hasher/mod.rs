pub mod fingerprint;

pub use fingerprint::{Fingerprint, FingerprintMode};
