use rapier2d::parry::query::PointQuery;
use rapier2d::prelude::*;

/// Half thickness of the boundary walls. They sit just outside the arena.
const WALL_HALF_THICKNESS: f32 = 5.0;

/// Rigid body world: the arena walls plus every circular body in it.
///
/// Positions are in a y-up frame with the arena spanning `[0, width] x [0, height]`.
pub struct PhysicsWorld {
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    walls: Vec<ColliderHandle>,
    linear_damping: f32,

    gravity: Vector<f32>,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
}

/// Converts "fraction of velocity kept per second" into rapier's damping coefficient.
pub fn damping_coefficient(retained_per_second: f32) -> f32 {
    -retained_per_second.ln()
}

impl PhysicsWorld {
    pub fn new(width: f32, height: f32, damping: f32) -> Self {
        let mut collider_set = ColliderSet::new();

        let t = WALL_HALF_THICKNESS;
        let mut walls = vec![];
        // Bottom and top.
        for y in [-t, height + t] {
            walls.push(
                collider_set.insert(
                    ColliderBuilder::cuboid(width / 2.0 + 2.0 * t, t)
                        .translation(vector![width / 2.0, y])
                        .restitution(1.0)
                        .friction(0.0)
                        .build(),
                ),
            );
        }
        // Left and right.
        for x in [-t, width + t] {
            walls.push(
                collider_set.insert(
                    ColliderBuilder::cuboid(t, height / 2.0 + 2.0 * t)
                        .translation(vector![x, height / 2.0])
                        .restitution(1.0)
                        .friction(0.0)
                        .build(),
                ),
            );
        }

        Self {
            bodies: RigidBodySet::new(),
            colliders: collider_set,
            walls,
            linear_damping: damping_coefficient(damping),
            gravity: vector![0.0, 0.0],
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
        }
    }

    /// Adds a dynamic ball. Rotation is locked so the heading only changes when set explicitly.
    pub fn add_ball(
        &mut self,
        x: f32,
        y: f32,
        heading: f32,
        radius: f32,
        mass: f32,
    ) -> RigidBodyHandle {
        let rigid_body = RigidBodyBuilder::dynamic()
            .translation(vector![x, y])
            .rotation(heading)
            .linear_damping(self.linear_damping)
            .angular_damping(self.linear_damping)
            .lock_rotations()
            .can_sleep(false)
            .build();
        let handle = self.bodies.insert(rigid_body);
        let collider = ColliderBuilder::ball(radius)
            .mass(mass)
            .restitution(1.0)
            .friction(0.0)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        log::trace!("Placed ball at ({}, {}) with radius {}", x, y, radius);
        handle
    }

    pub fn walls(&self) -> &[ColliderHandle] {
        &self.walls
    }

    /// Integrates every body forward by `dt` seconds.
    pub fn advance(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
    }

    /// Applies a world-space impulse at a world-space point.
    pub fn apply_impulse(&mut self, body: RigidBodyHandle, impulse: Vector<f32>, at: Point<f32>) {
        self.bodies[body].apply_impulse_at_point(impulse, at, true);
    }

    pub fn position(&self, body: RigidBodyHandle) -> Point<f32> {
        Point::from(*self.bodies[body].translation())
    }

    pub fn heading(&self, body: RigidBodyHandle) -> f32 {
        self.bodies[body].rotation().angle()
    }

    pub fn velocity(&self, body: RigidBodyHandle) -> Vector<f32> {
        *self.bodies[body].linvel()
    }

    pub fn set_pose(&mut self, body: RigidBodyHandle, x: f32, y: f32, heading: f32) {
        self.bodies[body].set_position(Isometry::new(vector![x, y], heading), true);
    }

    pub fn set_heading(&mut self, body: RigidBodyHandle, heading: f32) {
        let at = self.position(body);
        self.set_pose(body, at.x, at.y, heading);
    }

    pub fn set_velocity(&mut self, body: RigidBodyHandle, velocity: Vector<f32>) {
        self.bodies[body].set_linvel(velocity, true);
    }

    /// True when `point` lies inside any body's collider, skipping bodies attached to `exclude`.
    ///
    /// Walls are not bodies and are never reported; the arena bounds stand in for them.
    /// Colliders are tested at their body's current pose, so this is exact right after a
    /// pose change and before the next `advance`.
    pub fn is_occupied(&self, point: &Point<f32>, exclude: Option<RigidBodyHandle>) -> bool {
        self.colliders.iter().any(|(_, collider)| match collider.parent() {
            Some(parent) if Some(parent) == exclude => false,
            Some(parent) => {
                let pose = self.bodies[parent].position()
                    * collider
                        .position_wrt_parent()
                        .copied()
                        .unwrap_or_else(Isometry::identity);
                collider.shape().contains_point(&pose, point)
            }
            None => false,
        })
    }

    pub fn render(&self, pipeline: &mut DebugRenderPipeline, backend: &mut impl DebugRenderBackend) {
        pipeline.render(
            backend,
            &self.bodies,
            &self.colliders,
            &self.impulse_joint_set,
            &self.multibody_joint_set,
            &self.narrow_phase,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_changes_velocity_by_impulse_over_mass() {
        let mut world = PhysicsWorld::new(1000.0, 700.0, 0.8);
        let ball = world.add_ball(500.0, 350.0, 0.0, 25.0, 50.0);
        world.apply_impulse(ball, vector![200.0, 0.0], point![500.0, 350.0]);
        let v = world.velocity(ball);
        assert!((v.x - 4.0).abs() < 1e-3, "{v:?}");
        assert!(v.y.abs() < 1e-6);
    }

    #[test]
    fn no_gravity_and_damping_slows_bodies() {
        let mut world = PhysicsWorld::new(1000.0, 700.0, 0.8);
        let resting = world.add_ball(200.0, 200.0, 0.0, 10.0, 1.0);
        let moving = world.add_ball(600.0, 350.0, 0.0, 10.0, 1.0);
        world.set_velocity(moving, vector![10.0, 0.0]);
        for _ in 0..10 {
            world.advance(0.1);
        }
        assert!(world.velocity(resting).norm() < 1e-6);
        assert!((world.position(resting) - point![200.0, 200.0]).norm() < 1e-4);
        let speed = world.velocity(moving).norm();
        // One simulated second keeps roughly 80% of the speed.
        assert!(speed < 10.0 && speed > 7.0, "speed {speed}");
        assert!(world.position(moving).x > 600.0);
    }

    #[test]
    fn occupancy_sees_balls_but_not_excluded_body() {
        let mut world = PhysicsWorld::new(1000.0, 700.0, 0.8);
        let a = world.add_ball(100.0, 100.0, 0.0, 25.0, 50.0);
        let b = world.add_ball(300.0, 100.0, 0.0, 30.0, 30.0);
        assert!(world.is_occupied(&point![100.0, 110.0], None));
        assert!(!world.is_occupied(&point![100.0, 110.0], Some(a)));
        assert!(world.is_occupied(&point![320.0, 100.0], Some(a)));
        assert!(!world.is_occupied(&point![320.0, 100.0], Some(b)));
        assert!(!world.is_occupied(&point![500.0, 350.0], None));
    }

    #[test]
    fn occupancy_follows_pose_changes_before_advance() {
        let mut world = PhysicsWorld::new(1000.0, 700.0, 0.8);
        let ball = world.add_ball(100.0, 100.0, 0.0, 25.0, 50.0);
        world.set_pose(ball, 800.0, 500.0, 1.0);
        assert!(world.is_occupied(&point![800.0, 510.0], None));
        assert!(!world.is_occupied(&point![100.0, 100.0], None));
        assert!((world.heading(ball) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn walls_are_left_to_the_bounds_check() {
        let world = PhysicsWorld::new(1000.0, 700.0, 0.8);
        assert_eq!(world.walls().len(), 4);
        // Points on or past the wall faces are never reported as bodies.
        assert!(!world.is_occupied(&point![-1.0, 350.0], None));
        assert!(!world.is_occupied(&point![1000.0, 350.0], None));
        assert!(!world.is_occupied(&point![500.0, 701.0], None));
    }

    #[test]
    fn slow_bodies_keep_drifting() {
        let mut world = PhysicsWorld::new(1000.0, 700.0, 0.8);
        let ball = world.add_ball(500.0, 350.0, 0.0, 10.0, 1.0);
        world.set_velocity(ball, vector![0.05, 0.0]);
        for _ in 0..100 {
            world.advance(0.1);
        }
        assert!(world.velocity(ball).x > 0.0);
    }

    #[test]
    fn damping_coefficient_of_full_retention_is_zero() {
        assert_eq!(damping_coefficient(1.0), 0.0);
        assert!((damping_coefficient(0.8) - 0.22314).abs() < 1e-4);
    }
}
