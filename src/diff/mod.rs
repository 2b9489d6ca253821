//! Differentiable operations (backward passes).
//!
//! This module implements gradient computation for the forward operations.
//! Each submodule corresponds to a forward operation in `render`.

pub mod background;
pub mod integrate_grad;

pub use background::{composite_background, composite_background_backward};
pub use integrate_grad::integrate_rays_backward;
