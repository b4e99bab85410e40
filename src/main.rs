use rand::prelude::*;
use rand_pcg::Pcg64;
use rapier2d::prelude::*;
use raylib::prelude::*;

use sonar_car::{
    config::{self, Config, ConfigWatcher, PolicyKind},
    policy::{ModelConfig, Policy, RandomPolicy},
    sim::{Action, Simulation},
    stats::PlaybackStats,
};

type Backend = burn::backend::Wgpu<f32, i32>;

fn main() {
    pretty_env_logger::init();
    let config_path = Config::default_path();
    let init_config = Config::load(&config_path).expect("failed to load config");
    let watcher = ConfigWatcher::new(&config_path, init_config.clone())
        .expect("failed to watch config file");

    let (mut rl, thread) = raylib::init()
        .log_level(raylib::consts::TraceLogLevel::LOG_WARNING)
        .size(init_config.sim.width as i32, init_config.sim.height as i32)
        .resizable()
        .title("Sonar Car")
        .vsync()
        .build();
    rl.set_target_fps(init_config.viewer.target_fps);

    let mut viewer = init_config.viewer;
    let mut driver = init_config.driver;

    let mut sim = Simulation::new(&init_config);
    let mut rng = match init_config.sim.seed {
        Some(seed) => Pcg64::seed_from_u64(seed.wrapping_add(1)),
        None => Pcg64::from_entropy(),
    };

    let device = Default::default();
    let mut network = ModelConfig::new(driver.hidden_size)
        .with_epsilon(driver.epsilon)
        .init::<Backend>(&device);
    log::debug!("Loaded network: {:#?}", network.network);
    let mut random = RandomPolicy;

    let mut stats = PlaybackStats::new(driver.report_every, driver.reward_window);
    let mut human_control = driver.policy == PolicyKind::Keyboard;

    let debug_render_mode = DebugRenderMode::COLLIDER_SHAPES;
    let debug_render_style = DebugRenderStyle::default();
    let mut debug_render_pipeline = DebugRenderPipeline::new(debug_render_style, debug_render_mode);

    // Get an initial state by driving forward once.
    let mut state = sim.step(Action::Forward.index()).state;

    while !rl.window_should_close() {
        if let Some(config) = watcher.latest() {
            viewer = config.viewer;
            driver = config.driver;
            rl.set_target_fps(viewer.target_fps);
            network.set_epsilon(driver.epsilon);
            stats.set_report_every(driver.report_every);
            human_control = driver.policy == PolicyKind::Keyboard;
        }

        use raylib::consts::KeyboardKey::*;
        if rl.is_key_pressed(KEY_SPACE) {
            human_control = !human_control;
            log::info!("Human control: {}", human_control);
        }

        for _ in 0..viewer.steps_per_frame {
            // Penalty ticks are shown one per frame.
            if sim.is_recovering() {
                sim.penalty_tick();
                break;
            }

            let action = if human_control {
                keyboard_action(&rl)
            } else {
                match driver.policy {
                    PolicyKind::Network => network.act(&state, &mut rng),
                    PolicyKind::Random | PolicyKind::Keyboard => random.act(&state, &mut rng),
                }
            };

            let outcome = sim.step(action);
            state = outcome.state;
            if let Some(distance) = stats.record(&outcome) {
                log::info!(
                    "Current distance: {} frames (mean reward {:.1}, {} crashes)",
                    distance,
                    stats.mean_reward(),
                    stats.crashes
                );
            }
        }

        let fps = rl.get_fps().to_string();
        let width = rl.get_screen_width();
        let height = rl.get_screen_height();
        let mut d = rl.begin_drawing(&thread);

        // Red is scary!
        let background = if sim.is_recovering() {
            Color::RED
        } else {
            Color::BLACK
        };
        d.clear_background(background);

        if viewer.draw_screen {
            let mut render_backend = DebugRaylibRender::new(&mut d, width, height, sim.config());
            sim.world()
                .render(&mut debug_render_pipeline, &mut render_backend);
            if viewer.show_sensors {
                render_backend.draw_probes(&sim.probe_points());
            }
        }

        let status = format!(
            "distance {}  best {}  crashes {}",
            stats.distance, stats.best_distance, stats.crashes
        );
        d.draw_text(&status, 10, 10, 20, Color::LINEN.alpha(0.5));
        d.draw_text(&fps, width - 35, 10, 20, Color::LINEN.alpha(0.5));
    }
}

fn keyboard_action(rl: &RaylibHandle) -> u32 {
    use raylib::consts::KeyboardKey::*;
    let action = if rl.is_key_down(KEY_LEFT) {
        Action::TurnLeft
    } else if rl.is_key_down(KEY_RIGHT) {
        Action::TurnRight
    } else if rl.is_key_down(KEY_UP) {
        Action::Forward
    } else {
        Action::Noop
    };
    action.index()
}

/// Draws rapier debug shapes from the y-up arena onto the top-left-origin window.
struct DebugRaylibRender<'a, 'b> {
    d: &'a mut RaylibDrawHandle<'b>,
    scale_w: f32,
    scale_h: f32,
    arena_height: f32,
}

impl<'a, 'b> DebugRaylibRender<'a, 'b> {
    fn new(
        d: &'a mut RaylibDrawHandle<'b>,
        screen_width: i32,
        screen_height: i32,
        config: &Config,
    ) -> Self {
        let sim: &config::Sim = &config.sim;
        Self {
            d,
            scale_w: screen_width as f32 / sim.width,
            scale_h: screen_height as f32 / sim.height,
            arena_height: sim.height,
        }
    }

    /// Arena point to window pixels.
    fn scale_point(&self, point: Point<f32>) -> Vector2 {
        Vector2::new(
            point.x * self.scale_w,
            (self.arena_height - point.y) * self.scale_h,
        )
    }

    /// Probes are already in screen space; only scaling is left.
    fn draw_probes(&mut self, probes: &[Point<f32>]) {
        for p in probes {
            let at = Vector2::new(p.x * self.scale_w, p.y * self.scale_h);
            self.d.draw_circle_v(at, 2.0, Color::WHITE);
        }
    }
}

impl DebugRenderBackend for DebugRaylibRender<'_, '_> {
    fn draw_line(
        &mut self,
        _object: DebugRenderObject<'_>,
        a: Point<f32>,
        b: Point<f32>,
        color: [f32; 4],
    ) {
        let a = self.scale_point(a);
        let b = self.scale_point(b);
        let c = Color::color_from_normalized(Vector4::new(color[0], color[1], color[2], color[3]));
        self.d.draw_line_ex(a, b, 2.0, c);
    }
}
