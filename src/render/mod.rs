//! Overlay rendering: layout, text, compositor, and frame delivery.

pub mod canvas;
pub mod compositor;
pub mod font;
pub mod layout;
pub mod palette;
pub mod scheduler;
pub mod surface;
pub mod text;

pub use compositor::{Compositor, RenderState};
pub use font::CosmicTypesetter;
pub use layout::LayoutMetrics;
pub use scheduler::{FrameSource, RenderLoop, RenderLoopHandle, RenderStats, TickOutcome};
pub use surface::{Frame, Orientation, OverlaySurface, PngSurface};
pub use text::{BlockTypesetter, TextStyle, Typesetter};
