use rand::prelude::*;
use rand_pcg::Pcg64;
use rapier2d::prelude::*;

use sonar_car::config::Config;
use sonar_car::sim::{Phase, Simulation, CRASH_REWARD, TICK_COST};
use sonar_car::sonar::{ARM_COUNT, CLEAR, SAMPLES_PER_ARM};

fn empty_arena(width: f32, height: f32) -> Config {
    let mut config = Config::default();
    config.sim.width = width;
    config.sim.height = height;
    config.sim.seed = Some(11);
    config.obstacles.bodies.clear();
    config.decoys.positions.clear();
    config
}

fn seeded_default(seed: u64) -> Config {
    let mut config = Config::default();
    config.sim.seed = Some(seed);
    config
}

#[test]
fn test_shipped_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml");
    let config = Config::load(path).unwrap();
    assert_eq!(config.obstacles.bodies.len(), 3);
    assert_eq!(config.decoys.positions.len(), 3);
    assert_eq!(config.agent.spawn, [100.0, 100.0]);
}

#[test]
fn test_open_space_reads_clear_for_any_heading() {
    let mut sim = Simulation::new(&empty_arena(2000.0, 2000.0));
    for k in 0..24 {
        let heading = k as f32 * std::f32::consts::TAU / 24.0;
        sim.place_agent(1000.0, 1000.0, heading);
        assert_eq!(sim.readings(), [CLEAR; ARM_COUNT], "heading {heading}");
    }
}

#[test]
fn test_rightmost_arm_measures_wall_distance() {
    let mut sim = Simulation::new(&empty_arena(1000.0, 700.0));
    for d in [30.0f32, 40.0, 45.0, 95.0, 100.0, 200.0, 212.0, 387.0] {
        sim.place_agent(1000.0 - d, 350.0, 1.8);
        let expected = (((d - 20.0) / 10.0).floor() as u32 + 1).clamp(1, SAMPLES_PER_ARM);
        assert_eq!(sim.readings()[ARM_COUNT - 1], expected, "d = {d}");
    }
}

#[test]
fn test_same_seed_same_trajectory() {
    let mut a = Simulation::new(&seeded_default(42));
    let mut b = Simulation::new(&seeded_default(42));
    let mut actions = Pcg64::seed_from_u64(5);
    for _ in 0..300 {
        let action = actions.gen_range(0..4);
        assert_eq!(a.step(action), b.step(action));
    }
    assert_eq!(a.agent_position(), b.agent_position());
    assert_eq!(a.obstacle_positions(), b.obstacle_positions());
    assert_eq!(a.decoy_positions(), b.decoy_positions());
}

#[test]
fn test_reward_matches_crash_and_speed() {
    let mut sim = Simulation::new(&seeded_default(7));
    let mut actions = Pcg64::seed_from_u64(8);
    let mut crashes = 0;
    for _ in 0..1500 {
        // Lean towards driving forward so the car actually hits things.
        let action = if actions.gen_bool(0.6) { 2 } else { actions.gen_range(0..4) };
        let outcome = sim.step(action);
        assert!(!sim.is_crashed());
        assert_eq!(sim.phase(), Phase::Running);
        assert_eq!(outcome.reward == CRASH_REWARD, outcome.crashed);
        if outcome.crashed {
            crashes += 1;
            assert!(outcome.readings.contains(&1));
            assert_eq!(sim.agent_position(), point![100.0, 100.0]);
        } else {
            assert!(!outcome.readings.contains(&1));
            let speed = sim.agent_velocity().norm();
            assert_eq!(outcome.reward, TICK_COST + speed.floor() as i32);
            assert!(outcome.reward > CRASH_REWARD);
        }
        for (n, r) in outcome.state.iter().zip(outcome.readings) {
            assert_eq!(*n, (r as f32 - 20.0) / 20.0);
            assert!((-0.95..=0.95).contains(n));
        }
    }
    assert!(crashes > 0, "expected at least one crash in a cluttered arena");
}

#[test]
fn test_driving_away_from_spawn_increases_distance() {
    let mut sim = Simulation::new(&empty_arena(1000.0, 700.0));
    let spawn = point![100.0, 100.0];
    assert!((sim.agent_heading() - 0.5).abs() < 1e-6);

    let mut last = 0.0;
    for action in [2, 2, 2, 0, 2] {
        let outcome = sim.step(action);
        assert!(!outcome.crashed);
        let distance = (sim.agent_position() - spawn).norm();
        assert!(distance > last, "{distance} <= {last}");
        last = distance;
    }
}
