mod types;

pub use types::{ScaleAction, ScalerConfig};
