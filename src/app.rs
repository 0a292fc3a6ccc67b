//! Window and event loop around a [`Viewer`].

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::KeyCode;
use winit::window::{Window, WindowAttributes, WindowId};

use crate::camera::CameraController;
use crate::config::ViewerConfig;
use crate::error::ViewerError;
use crate::gpu::GpuContext;
use crate::input::Input;
use crate::view::ViewType;
use crate::viewer::{LoadStatus, Viewer};

type SetupFn = Box<dyn FnOnce(&mut Viewer)>;

/// Open a window and show the scenes in `config` until it is closed.
pub fn run(config: ViewerConfig) -> Result<(), ViewerError> {
    run_with(config, |_| {})
}

/// Like [`run`], with a hook that sees the viewer before the first scene
/// loads. Subscribe to events there.
pub fn run_with<S>(config: ViewerConfig, setup: S) -> Result<(), ViewerError>
where
    S: FnOnce(&mut Viewer) + 'static,
{
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App {
        state: AppState::Pending {
            config: Some(config),
            setup: Some(Box::new(setup)),
        },
        failure: None,
    };
    event_loop.run_app(&mut app)?;

    match app.failure {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Next view in the keyboard cycle.
fn next_view(view: ViewType) -> ViewType {
    match view {
        ViewType::Rectilinear => ViewType::GoPro,
        ViewType::GoPro => ViewType::Flat,
        ViewType::Flat => ViewType::Rectilinear,
    }
}

const LAYOUT_KEYS: [(KeyCode, &str); 3] = [
    (KeyCode::Digit1, "single"),
    (KeyCode::Digit2, "vr"),
    (KeyCode::Digit3, "grid"),
];

enum AppState {
    Pending {
        config: Option<ViewerConfig>,
        setup: Option<SetupFn>,
    },
    Running {
        window: Arc<Window>,
        viewer: Viewer,
        input: Input,
        controller: CameraController,
        last_frame: Instant,
    },
}

struct App {
    state: AppState,
    failure: Option<ViewerError>,
}

impl App {
    fn start(
        event_loop: &ActiveEventLoop,
        config: ViewerConfig,
        setup: Option<SetupFn>,
    ) -> Result<AppState, ViewerError> {
        let attrs = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height));
        let window = Arc::new(event_loop.create_window(attrs)?);
        let gpu = GpuContext::new(window.clone())?;

        let mut viewer = Viewer::new(gpu, config);
        if let Some(setup) = setup {
            setup(&mut viewer);
        }
        match viewer.load_initial() {
            Some(status) => info!(?status, "initial scene requested"),
            None => warn!("no scenes configured"),
        }

        window.request_redraw();
        Ok(AppState::Running {
            window,
            viewer,
            input: Input::new(),
            controller: CameraController::new(),
            last_frame: Instant::now(),
        })
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let AppState::Pending { config, setup } = &mut self.state else {
            return;
        };
        let Some(config) = config.take() else {
            return;
        };
        match App::start(event_loop, config, setup.take()) {
            Ok(state) => self.state = state,
            Err(err) => {
                error!(error = %err, "viewer failed to start");
                self.failure = Some(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let AppState::Running {
            window,
            viewer,
            input,
            controller,
            last_frame,
        } = &mut self.state
        else {
            return;
        };

        input.handle_event(&event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => viewer.resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let dt = now.duration_since(*last_frame).as_secs_f32();
                *last_frame = now;

                handle_keys(event_loop, viewer, input);

                let limits = viewer.fov_limits();
                if let Some(camera) = viewer.camera_mut() {
                    controller.update(camera, input.drag(), input.scroll(), dt, limits);
                }

                if let Some(pointer) = input.click() {
                    if let Some(pick) = viewer.pointer_pick(pointer) {
                        if let Some(status) = viewer.follow_hotspot(&pick) {
                            info!(hotspot = %pick.hotspot_id, ?status, "hotspot followed");
                        }
                    }
                }

                viewer.frame(now);
                input.begin_frame();
                window.request_redraw();
            }
            _ => {}
        }
    }
}

fn handle_keys(event_loop: &ActiveEventLoop, viewer: &mut Viewer, input: &Input) {
    if input.key_pressed(KeyCode::Escape) {
        event_loop.exit();
    }
    let step = if input.key_pressed(KeyCode::ArrowRight) {
        1
    } else if input.key_pressed(KeyCode::ArrowLeft) {
        -1
    } else {
        0
    };
    if step != 0 {
        if let Some(status) = viewer.load_neighbour(step) {
            if status != LoadStatus::Started {
                info!(?status, "scene switch ignored");
            }
        }
    }
    if input.key_pressed(KeyCode::KeyB) {
        viewer.toggle_fx_bypass();
    }
    if input.key_pressed(KeyCode::KeyV) {
        viewer.set_view(next_view(viewer.view_type()));
    }
    for (key, layout) in LAYOUT_KEYS {
        if input.key_pressed(key) {
            viewer.set_layout(layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_cycle_visits_every_view() {
        let mut view = ViewType::Rectilinear;
        let mut seen = Vec::new();
        for _ in 0..3 {
            view = next_view(view);
            seen.push(view);
        }
        assert_eq!(seen, [ViewType::GoPro, ViewType::Flat, ViewType::Rectilinear]);
    }
}
