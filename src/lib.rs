//! trailview - 3D terrain and route viewer.
//!
//! Renders a pathfinding server's JSON payloads as a displaced heightfield
//! with a draped texture, an extruded route tube, and a pointer-tracking
//! marker. Scene state lives in [`view::TerrainView`] and is fully testable
//! without a GPU; [`renderer::Renderer`] owns every wgpu object.

pub mod input;
pub mod picking;
pub mod renderer;
pub mod response;
pub mod scene;
pub mod terrain;
pub mod ui;
pub mod view;

// Re-export commonly used types
pub use response::{load_response, TerrainResponse};
pub use view::TerrainView;
