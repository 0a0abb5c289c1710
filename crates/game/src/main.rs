//! Invaders - a small fixed-camera shooter on a wgpu forward renderer

mod bullet;
mod config;
mod enemy;
mod level;
mod player;

use std::sync::Arc;

use anyhow::Result;
use engine_core::Engine;
use rand::rngs::StdRng;
use rand::SeedableRng;
use renderer::{Renderer, WgpuDevice};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use config::GameConfig;
use level::{Level, Outcome, Session};

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.02,
    b: 0.05,
    a: 1.0,
};

/// Window, device and the running engine.
struct GameState {
    gpu: WgpuDevice,
    engine: Engine<Session>,
    renderer: Renderer,
    announced: bool,
}

impl GameState {
    async fn new(window: Arc<Window>, config: &GameConfig) -> Result<Self> {
        let mut gpu = WgpuDevice::new(window, config.vsync).await?;
        let level = Level::new(config, &mut gpu, StdRng::from_entropy())?;

        let mut engine = Engine::new(Session::new(level, gpu.dimensions()));
        engine.clock_mut().set_max_step(config.max_frame_step);
        engine.on_update(Session::on_tick);
        engine.start();

        Ok(Self {
            gpu,
            engine,
            renderer: Renderer::new(),
            announced: false,
        })
    }

    /// Returns true when the app should exit.
    fn handle_window_event(&mut self, event: WindowEvent) -> bool {
        match event {
            WindowEvent::CloseRequested => return true,
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state,
                        ..
                    },
                ..
            } => {
                if key == KeyCode::Escape && state == ElementState::Pressed {
                    return true;
                }
                self.engine.state_mut().input.process_keyboard(key, state);
            }
            WindowEvent::Focused(false) => self.engine.state_mut().input.release_all(),
            WindowEvent::Resized(size) => {
                self.gpu.resize(size);
                self.engine.state_mut().viewport = self.gpu.dimensions();
            }
            WindowEvent::RedrawRequested => {
                self.frame();
                self.gpu.window.request_redraw();
            }
            _ => {}
        }
        false
    }

    /// Tick, release what the tick destroyed, then draw. Once the game is
    /// decided the last frame keeps being shown.
    fn frame(&mut self) {
        self.gpu.begin_frame();
        self.engine.tick();

        let level = &mut self.engine.state_mut().level;
        level.prune(&mut self.gpu);
        self.renderer.render(&mut level.scene, &mut self.gpu);

        if let (false, Some(outcome)) = (self.announced, level.outcome()) {
            let title = match outcome {
                Outcome::Victory => "Invaders - cleared! (Esc to quit)",
                Outcome::Defeat => "Invaders - destroyed (Esc to quit)",
            };
            self.gpu.window.set_title(title);
            self.announced = true;
        }

        if let Err(e) = self.gpu.present(CLEAR_COLOR) {
            log::error!("Present failed: {:#}", e);
        }
    }
}

#[derive(Default)]
struct App {
    state: Option<GameState>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_none() {
            let config = GameConfig::load();
            let window_attrs = Window::default_attributes()
                .with_title("Invaders")
                .with_inner_size(winit::dpi::LogicalSize::new(config.window_width, config.window_height));

            let window = match event_loop.create_window(window_attrs) {
                Ok(w) => Arc::new(w),
                Err(e) => {
                    log::error!("Failed to create window: {}", e);
                    event_loop.exit();
                    return;
                }
            };

            match pollster::block_on(GameState::new(window.clone(), &config)) {
                Ok(s) => {
                    self.state = Some(s);
                    window.request_redraw();
                }
                Err(e) => {
                    log::error!("Failed to initialize game: {:#}", e);
                    event_loop.exit();
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(state) = &mut self.state {
            if state.handle_window_event(event) {
                event_loop.exit();
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting Invaders: arrows to move, space to fire, escape to quit");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::default();
    event_loop.run_app(&mut app)?;

    Ok(())
}
