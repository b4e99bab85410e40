use rand::prelude::*;
use rand_pcg::Pcg64;
use rapier2d::prelude::*;

use crate::config::{Config, RecoveryMode};
use crate::physics::PhysicsWorld;
use crate::sonar::{self, Readings, Sonar, State};

pub const CRASH_REWARD: i32 = -500;
/// Paid every tick the agent survives, offset by its speed.
pub const TICK_COST: i32 = -100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    TurnLeft,
    TurnRight,
    Forward,
    Noop,
}

impl Action {
    pub const COUNT: usize = 4;

    /// Unknown indices fall back to [`Action::Noop`].
    pub fn from_index(index: u32) -> Self {
        match index {
            0 => Action::TurnLeft,
            1 => Action::TurnRight,
            2 => Action::Forward,
            3 => Action::Noop,
            _ => {
                log::debug!("Treating unknown action {} as a no-op", index);
                Action::Noop
            }
        }
    }

    pub fn index(self) -> u32 {
        match self {
            Action::TurnLeft => 0,
            Action::TurnRight => 1,
            Action::Forward => 2,
            Action::Noop => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    /// Penalty ticks still owed after a crash. The agent is held at spawn.
    Recovering { remaining: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub reward: i32,
    pub state: State,
    pub readings: Readings,
    pub crashed: bool,
}

/// The car-avoids-obstacles environment.
pub struct Simulation {
    config: Config,
    world: PhysicsWorld,
    sonar: Sonar,
    agent: RigidBodyHandle,
    obstacles: Vec<RigidBodyHandle>,
    decoys: Vec<RigidBodyHandle>,
    rng: Pcg64,
    num_steps: u64,
    crashed: bool,
    phase: Phase,
}

impl Simulation {
    /// Builds the arena described by `config`.
    ///
    /// The config is expected to have passed [`Config::validate`]; debug builds
    /// panic otherwise.
    pub fn new(config: &Config) -> Self {
        if cfg!(debug_assertions) {
            if let Err(e) = config.validate() {
                panic!("{e}");
            }
        }
        let rng = match config.sim.seed {
            Some(seed) => Pcg64::seed_from_u64(seed),
            None => Pcg64::from_entropy(),
        };
        let mut world = PhysicsWorld::new(config.sim.width, config.sim.height, config.sim.damping);

        let [x, y] = config.agent.spawn;
        let heading = config.agent.heading;
        let agent = world.add_ball(x, y, heading, config.agent.radius, config.agent.mass);
        // Start rolling.
        world.apply_impulse(agent, direction(heading), point![x, y]);

        let obstacles = config
            .obstacles
            .bodies
            .iter()
            .map(|c| world.add_ball(c.x, c.y, 0.0, c.radius, config.obstacles.mass))
            .collect();
        let decoys = config
            .decoys
            .positions
            .iter()
            .map(|&[x, y]| world.add_ball(x, y, 0.0, config.decoys.radius, config.decoys.mass))
            .collect();

        Self {
            config: config.clone(),
            world,
            sonar: Sonar::new(config.sim.width, config.sim.height),
            agent,
            obstacles,
            decoys,
            rng,
            num_steps: 0,
            crashed: false,
            phase: Phase::Running,
        }
    }

    /// Advances one tick with `action` and returns the reward and the sensed state.
    ///
    /// A crash resets the agent before returning. Under [`RecoveryMode::Deferred`]
    /// the penalty ticks are left for [`Simulation::penalty_tick`]; otherwise they
    /// run here. Leftover penalty ticks are drained before the action is applied.
    pub fn step(&mut self, action: u32) -> StepOutcome {
        if self.is_recovering() {
            self.recover();
        }

        self.apply(Action::from_index(action));

        if self.num_steps % self.config.sim.obstacle_period == 0 {
            self.move_obstacles();
        }
        if self.num_steps % self.config.sim.decoy_period == 0 {
            self.move_decoys();
        }

        self.world.advance(self.config.sim.timestep);

        let readings = self.readings();
        let state = sonar::normalize(&readings);
        let crashed = sonar::is_crash(&readings);
        let reward = if crashed {
            self.crashed = true;
            log::debug!("step {}: crashed with readings {:?}", self.num_steps, readings);
            self.begin_recovery();
            if self.config.sim.recovery == RecoveryMode::Blocking {
                self.recover();
            }
            CRASH_REWARD
        } else {
            TICK_COST + self.world.velocity(self.agent).norm().floor() as i32
        };

        self.num_steps += 1;

        StepOutcome {
            reward,
            state,
            readings,
            crashed,
        }
    }

    fn apply(&mut self, action: Action) {
        let heading = self.agent_heading();
        match action {
            Action::TurnLeft => self.world.set_heading(self.agent, heading - self.config.agent.turn),
            Action::TurnRight => self.world.set_heading(self.agent, heading + self.config.agent.turn),
            Action::Forward => {
                let at = self.agent_position();
                let impulse = direction(heading) * self.config.agent.impulse;
                self.world.apply_impulse(self.agent, impulse, at);
            }
            Action::Noop => {}
        }
    }

    /// Sends every obstacle drifting roughly along the agent's heading.
    fn move_obstacles(&mut self) {
        let heading = self.agent_heading();
        let cfg = &self.config.obstacles;
        for &obstacle in &self.obstacles {
            let speed = self.rng.gen_range(cfg.min_speed..=cfg.max_speed) as f32;
            let delta = self.rng.gen_range(-cfg.spread..=cfg.spread) as f32;
            self.world
                .set_velocity(obstacle, direction(heading + delta) * speed);
        }
        log::debug!("step {}: moved obstacles", self.num_steps);
    }

    /// Jitters each decoy's heading and kicks it forward.
    fn move_decoys(&mut self) {
        for &decoy in &self.decoys {
            let heading = self.world.heading(decoy) - self.rng.gen_range(-1..=1) as f32;
            self.world.set_heading(decoy, heading);
            let at = self.world.position(decoy);
            self.world
                .apply_impulse(decoy, direction(heading) * self.config.decoys.impulse, at);
        }
    }

    /// Puts the agent back at spawn, clears the crash and owes the penalty ticks.
    pub fn begin_recovery(&mut self) {
        self.hold_at_spawn();
        self.crashed = false;
        self.phase = match self.config.sim.penalty_ticks {
            0 => Phase::Running,
            remaining => Phase::Recovering { remaining },
        };
    }

    /// Runs one penalty tick, if any are owed, and returns the phase afterwards.
    pub fn penalty_tick(&mut self) -> Phase {
        if let Phase::Recovering { remaining } = self.phase {
            self.world.advance(self.config.sim.timestep);
            self.hold_at_spawn();
            self.phase = match remaining - 1 {
                0 => Phase::Running,
                remaining => Phase::Recovering { remaining },
            };
        }
        self.phase
    }

    /// Resets the agent and runs all penalty ticks before returning.
    pub fn recover(&mut self) {
        if !self.is_recovering() {
            self.begin_recovery();
        }
        while self.penalty_tick() != Phase::Running {}
    }

    fn hold_at_spawn(&mut self) {
        let [x, y] = self.config.agent.spawn;
        let heading = self.agent_heading();
        self.world.set_pose(self.agent, x, y, heading);
        self.world.set_velocity(self.agent, vector![0.0, 0.0]);
    }

    /// Moves the agent without touching the tick counter. Velocity is cleared.
    pub fn place_agent(&mut self, x: f32, y: f32, heading: f32) {
        self.world.set_pose(self.agent, x, y, heading);
        self.world.set_velocity(self.agent, vector![0.0, 0.0]);
    }

    /// Sonar readings at the agent's current pose.
    pub fn readings(&self) -> Readings {
        let at = self.agent_position();
        self.sonar.sense(at.x, at.y, self.agent_heading(), |p| {
            self.world.is_occupied(p, Some(self.agent))
        })
    }

    /// Clear sonar samples around the agent, in screen space.
    pub fn probe_points(&self) -> Vec<Point<f32>> {
        let at = self.agent_position();
        let mut probes = Vec::with_capacity(sonar::ARM_COUNT * sonar::SAMPLES_PER_ARM as usize);
        self.sonar.sense_with_probes(
            at.x,
            at.y,
            self.agent_heading(),
            |p| self.world.is_occupied(p, Some(self.agent)),
            |p| probes.push(self.sonar.to_screen(p)),
        );
        probes
    }

    pub fn agent_position(&self) -> Point<f32> {
        self.world.position(self.agent)
    }

    pub fn agent_heading(&self) -> f32 {
        self.world.heading(self.agent)
    }

    pub fn agent_velocity(&self) -> Vector<f32> {
        self.world.velocity(self.agent)
    }

    pub fn num_steps(&self) -> u64 {
        self.num_steps
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_crashed(&self) -> bool {
        self.crashed
    }

    pub fn is_recovering(&self) -> bool {
        matches!(self.phase, Phase::Recovering { .. })
    }

    pub fn obstacle_positions(&self) -> Vec<Point<f32>> {
        self.obstacles.iter().map(|&h| self.world.position(h)).collect()
    }

    pub fn decoy_positions(&self) -> Vec<Point<f32>> {
        self.decoys.iter().map(|&h| self.world.position(h)).collect()
    }

    pub fn obstacle_velocities(&self) -> Vec<Vector<f32>> {
        self.obstacles.iter().map(|&h| self.world.velocity(h)).collect()
    }

    pub fn decoy_velocities(&self) -> Vec<Vector<f32>> {
        self.decoys.iter().map(|&h| self.world.velocity(h)).collect()
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn direction(angle: f32) -> Vector<f32> {
    let (sin, cos) = angle.sin_cos();
    vector![cos, sin]
}
