pub mod mappings;
pub mod normalizer;
pub mod policy;
pub mod stitch;

pub use crate::domain::model::{NormalizedParamSet, RawParamSet, StitchOutcome};
pub use crate::domain::ports::{ClientProvider, ComputeClient};
pub use crate::utils::error::Result;
pub use stitch::StitchEngine;
