//! Prediction and inference
//!
//! Load the trained pipeline and score upcoming games.

pub mod inference;

pub use inference::{format_pick, FuturePick, Predictor};
