//! trieq DSP - Digital Signal Processing Module
//!
//! This crate provides the filter building blocks for trieq:
//! - Second-order IIR sections (biquads) with RBJ cookbook designs for
//!   low/high-pass, low/high-shelf, band-pass, band-stop, peak/notch and all-pass
//! - Variable-order cascades that can grow or shrink while audio is running
//!
//! # Architecture
//!
//! Nothing in here locks or allocates on the processing path. Sections are
//! plain values; the owner (a cascade, or the render stage in `trieq_core`)
//! decides how they are shared between threads.

mod cascade;
mod error;
mod section;

pub use biquad::Coefficients;
pub use cascade::{Cascade, Section, MAX_ORDER, MIN_ORDER};
pub use error::DspError;
pub use section::{
    coefficients_to_array, BiquadSection, DelayLine, Design, FilterShape, IDENTITY,
    MIN_LINEAR_GAIN,
};
