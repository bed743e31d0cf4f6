pub mod denormalise;
pub mod tessellate;

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("invalid tessellation options: {0}")]
        InvalidOptions(String),
        #[error("invalid spline: {reason}")]
        InvalidSpline { reason: String },
    }
}
