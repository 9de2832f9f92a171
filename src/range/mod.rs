//! Plot-range resolution and overlay sampling.
//!
//! No global plotting state is consulted: the visible axis limits arrive in
//! an explicit `RenderContext`.

pub mod overlay;
pub mod resolve;

pub use overlay::{build_overlay, Curve, Overlay, OVERLAY_SAMPLES};
pub use resolve::{linspace, resolve_range, Endpoint, PlotRange, CROSS_SAMPLES};
