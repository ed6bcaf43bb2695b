//! trailview - 3D terrain and route viewer.
//!
//! Main entry point for the application.

use anyhow::Result;
use clap::Parser;
use noise::{NoiseFn, Perlin};
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use trailview::input::InputController;
use trailview::renderer::Renderer;
use trailview::response::{load_response, TerrainResponse};
use trailview::view::TerrainView;

#[derive(Parser, Debug)]
#[command(name = "trailview")]
#[command(about = "3D terrain and route viewer")]
struct Args {
    /// Path to a JSON payload to display
    payload: Option<String>,

    /// Synthesize a terrain instead of reading a payload file
    #[arg(long)]
    demo: bool,

    /// Seed for the synthesized terrain
    #[arg(long, default_value = "42")]
    seed: u64,
}

/// Payload stand-in for `--demo`: summed Perlin octaves with the amplitude
/// tied to the sampling period, plus a diagonal route across the grid.
fn demo_response(seed: u64) -> TerrainResponse {
    const NX: u32 = 64;
    const NY: u32 = 64;

    let perlin = Perlin::new(seed as u32);
    let z = (seed % 977) as f64 * 0.113;
    let mut elev = vec![0.0f32; (NX * NY) as usize];
    let mut quality = 1.0f64;
    for _ in 0..4 {
        for (k, sample) in elev.iter_mut().enumerate() {
            let x = (k as u32 % NX) as f64;
            let y = (k as u32 / NX) as f64;
            *sample += (perlin.get([x / quality, y / quality, z]) * quality * 1.75).abs() as f32;
        }
        quality *= 5.0;
    }

    let cells: Vec<u32> = (0..NX.min(NY)).step_by(3).flat_map(|c| [c, c]).collect();

    TerrainResponse {
        nx: NX,
        ny: NY,
        long_dist: 8000.0,
        lat_dist: 8000.0,
        elev,
        result: 1,
        image_url: None,
        tex_scale_x: None,
        tex_scale_y: None,
        tex_shift_x: None,
        tex_shift_y: None,
        path: Some(cells),
    }
}

struct App {
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    view: TerrainView,
    controller: InputController,
    payload_path: Option<String>,
}

impl App {
    /// Re-read the payload file and rebuild the scene from it.
    fn reload(&mut self) {
        let Some(path) = self.payload_path.clone() else {
            log::warn!("No payload file to reload");
            return;
        };
        match load_response(&path) {
            Ok(response) => self.apply_response(&response),
            Err(err) => log::warn!("Reload of {path} failed: {err}"),
        }
    }

    /// Swap in a new payload: rebuild the view's scene, push it to the
    /// GPU and refit the orbit bounds. A rejected payload leaves the
    /// current scene untouched.
    fn apply_response(&mut self, response: &TerrainResponse) {
        match self.view.update(response) {
            Ok(()) => {
                if let (Some(renderer), Some(scene)) = (self.renderer.as_mut(), self.view.scene())
                {
                    renderer.upload_scene(scene);
                }
                if let Some(scene) = self.view.scene() {
                    self.controller.config.bound_zoom(scene.min_zoom());
                }
            }
            Err(err) => log::error!("Payload rejected: {err}"),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let window_attrs = Window::default_attributes().with_title("trailview");
            let window = Arc::new(event_loop.create_window(window_attrs).unwrap());

            let renderer = pollster::block_on(Renderer::new(window.clone())).unwrap();

            let size = window.inner_size();
            self.view.resized(size.width, size.height);

            self.window = Some(window);
            self.renderer = Some(renderer);

            // Upload the initial scene to the GPU
            if let (Some(renderer), Some(scene)) = (self.renderer.as_mut(), self.view.scene()) {
                renderer.upload_scene(scene);
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(window) = self.window.clone() else {
            return;
        };

        // egui gets first refusal on pointer events
        let consumed = match self.renderer.as_mut() {
            Some(renderer) => renderer.handle_window_event(&window, &event),
            None => false,
        };

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        ..
                    },
                ..
            } => match code {
                KeyCode::Escape if state == ElementState::Pressed => {
                    event_loop.exit();
                }
                KeyCode::KeyL if state == ElementState::Pressed => {
                    self.reload();
                }
                _ => {
                    let home = *self.view.home();
                    self.controller
                        .handle_keyboard(code, state, &mut self.view.camera, &home);
                }
            },
            WindowEvent::Resized(physical_size) => {
                self.view.resized(physical_size.width, physical_size.height);
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(physical_size);
                }
            }
            WindowEvent::MouseInput { button, state, .. } if !consumed => {
                self.controller.handle_mouse_button(button, state);
            }
            WindowEvent::MouseWheel { delta, .. } if !consumed => {
                self.controller.handle_scroll(delta, &mut self.view.camera);
            }
            WindowEvent::CursorMoved { position, .. } if !consumed => {
                let (x, y) = (position.x as f32, position.y as f32);
                self.controller.handle_mouse_move(x, y, &mut self.view.camera);
                self.view.pointer_moved(x, y);
            }
            WindowEvent::RedrawRequested => {
                // Hand a finished async texture load to the GPU
                if let Some(image) = self.view.poll_texture() {
                    if let Some(renderer) = self.renderer.as_mut() {
                        renderer.upload_drape(&image);
                    }
                }

                let mut reload_requested = false;
                if let Some(renderer) = self.renderer.as_mut() {
                    match renderer.render(&mut self.view, &window) {
                        Ok(ui) => reload_requested = ui.reload_requested,
                        Err(wgpu::SurfaceError::Lost) => renderer.resize(renderer.size),
                        Err(wgpu::SurfaceError::OutOfMemory) => event_loop.exit(),
                        Err(e) => log::warn!("Render error: {e:?}"),
                    }
                }
                if reload_requested {
                    self.reload();
                }

                window.request_redraw();
            }
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let response = match &args.payload {
        Some(path) => load_response(path)?,
        None if args.demo => demo_response(args.seed),
        None => anyhow::bail!("provide a payload file or pass --demo"),
    };

    println!(
        "Loaded terrain: {}x{} over {:.0} x {:.0}",
        response.nx, response.ny, response.long_dist, response.lat_dist
    );

    let mut view = TerrainView::new(1280, 720);
    view.update(&response)?;
    if let Some(scene) = view.scene() {
        println!(
            "Generated mesh: {} vertices, {} indices",
            scene.terrain.vertices.len(),
            scene.terrain.indices.len()
        );
    }

    let mut controller = InputController::new();
    if let Some(scene) = view.scene() {
        controller.config.bound_zoom(scene.min_zoom());
    }

    // Create window and run
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App {
        window: None,
        renderer: None,
        view,
        controller,
        payload_path: args.payload,
    };

    event_loop.run_app(&mut app)?;

    Ok(())
}
