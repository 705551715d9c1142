//! Classifier and calibration
//!
//! - Preprocessing: median imputation and standard scaling
//! - Logistic regression with L2 penalty (Newton solver)
//! - Sigmoid and isotonic recalibration

pub mod calibration;
pub mod logistic;
pub mod pipeline;
pub mod preprocess;

pub use calibration::{CalibrationVariant, Calibrator};
pub use logistic::{LogisticConfig, LogisticRegression};
pub use pipeline::{Coefficient, ModelPipeline};
pub use preprocess::Preprocessor;
