//! Ball physics: wall bounces, paddle hits and goal detection

use glam::DVec2;
use rand::Rng;

use crate::config::GameConfig;

use super::arena::{Arena, SeatFrame};

/// Determinants below this are treated as parallel lines
const PARALLEL_EPSILON: f64 = 1e-6;
/// Ball steps shorter than this on both axes are treated as stationary
const STEP_EPSILON: f64 = 1e-6;
/// Squared paddle length below which the paddle is treated as a point
const POINT_PADDLE_EPSILON: f64 = 1e-9;

/// The ball (authoritative)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    pub position: DVec2,
    pub velocity: DVec2,
}

impl Ball {
    /// Ball at rest in the centre of the arena
    pub fn centered() -> Self {
        Self {
            position: DVec2::ZERO,
            velocity: DVec2::ZERO,
        }
    }

    pub fn speed(&self) -> f64 {
        self.velocity.length()
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.velocity.is_finite()
    }
}

/// A paddle as seen by the collision engine, indexed by seat
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paddle {
    /// Cartesian paddle centre
    pub center: DVec2,
    /// Lateral velocity along the seat, position units per second
    pub drag: f64,
}

/// What the ball ran into this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contact {
    /// Bounced off a side wall (two-player field only)
    Wall,
    /// Returned by the paddle on this seat
    PaddleHit { seat: usize },
    /// Got past the paddle on this seat
    Goal { seat: usize },
}

/// Intersection of the ball's path with a paddle line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    pub point: DVec2,
    /// Fraction of the ball step at which the lines meet
    pub t: f64,
}

/// Physics system for moving the ball and resolving contacts
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Resolve at most one contact for the ball's next step.
    ///
    /// On `Wall` and `PaddleHit` the ball has already been repositioned and its
    /// velocity renormalised; on `Goal` and `None` it is left untouched.
    pub fn resolve_contact<R: Rng>(
        ball: &mut Ball,
        arena: &Arena,
        paddles: &[Paddle],
        config: &GameConfig,
        rng: &mut R,
    ) -> Option<Contact> {
        if paddles.len() != arena.seat_count() {
            return None;
        }

        let next = ball.position + ball.velocity * config.tick_delta();
        if arena.is_duel() {
            Self::duel_contact(ball, next, arena, paddles, config, rng)
        } else {
            Self::polygon_contact(ball, next, arena, paddles, config, rng)
        }
    }

    /// Advance the ball by one tick when nothing was hit
    pub fn integrate(ball: &mut Ball, dt: f64) {
        ball.position += ball.velocity * dt;
    }

    /// Two-player field: walls first, then whichever goal line the ball crosses
    fn duel_contact<R: Rng>(
        ball: &mut Ball,
        next: DVec2,
        arena: &Arena,
        paddles: &[Paddle],
        config: &GameConfig,
        rng: &mut R,
    ) -> Option<Contact> {
        let goal_x = config.goal_x();
        let half_height = config.field_half_height;

        if next.x.abs() < goal_x && next.y.abs() >= half_height {
            ball.velocity.y = -ball.velocity.y;
            ball.velocity = renormalize(ball.velocity, config.ball_speed);
            ball.position.y = next.y.signum() * (half_height - config.contact_nudge);
            return Some(Contact::Wall);
        }

        let (seat, line_x) = if next.x <= -goal_x {
            (0, -goal_x)
        } else if next.x >= goal_x {
            (1, goal_x)
        } else {
            return None;
        };

        let frame = arena.seat(seat)?;
        let paddle = paddles.get(seat)?;

        let dx = next.x - ball.position.x;
        let t = if dx.abs() > STEP_EPSILON {
            ((line_x - ball.position.x) / dx).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let cross_y = ball.position.y + t * (next.y - ball.position.y);

        if (cross_y - paddle.center.y).abs() <= config.paddle_half_width {
            let impact = DVec2::new(frame.center.x, cross_y);
            Self::bounce_off_paddle(ball, frame, paddle, impact, arena, config, rng);
            Some(Contact::PaddleHit { seat })
        } else {
            Some(Contact::Goal { seat })
        }
    }

    /// Polygon arena: the seat whose paddle line the ball crosses earliest
    /// within this step decides the outcome.
    fn polygon_contact<R: Rng>(
        ball: &mut Ball,
        next: DVec2,
        arena: &Arena,
        paddles: &[Paddle],
        config: &GameConfig,
        rng: &mut R,
    ) -> Option<Contact> {
        let half_width = config.paddle_half_width;
        let step = next - ball.position;
        let mut earliest: Option<(usize, Intersection, bool)> = None;

        for (seat, (frame, paddle)) in arena.seats().iter().zip(paddles).enumerate() {
            // Only a ball heading out through a seat can score on it
            if step.dot(frame.normal) >= 0.0 {
                continue;
            }

            let right = paddle.center + frame.tangent * half_width;
            let left = paddle.center - frame.tangent * half_width;

            let Some(hit) = segment_intersection(ball.position, next, left, right) else {
                continue;
            };

            // Ties keep the lower seat index
            if earliest.map_or(true, |(_, best, _)| hit.t < best.t) {
                let u = paddle_parameter(hit.point, left, right, paddle.center, half_width);
                earliest = Some((seat, hit, (0.0..=1.0).contains(&u)));
            }
        }

        let (seat, hit, on_paddle) = earliest?;
        if on_paddle {
            Self::bounce_off_paddle(
                ball,
                &arena.seats()[seat],
                &paddles[seat],
                hit.point,
                arena,
                config,
                rng,
            );
            Some(Contact::PaddleHit { seat })
        } else {
            Some(Contact::Goal { seat })
        }
    }

    /// Reflect off a paddle, add spin from the paddle's drag, restore the
    /// constant speed and keep the ball out of corners
    fn bounce_off_paddle<R: Rng>(
        ball: &mut Ball,
        frame: &SeatFrame,
        paddle: &Paddle,
        impact: DVec2,
        arena: &Arena,
        config: &GameConfig,
        rng: &mut R,
    ) {
        let mut normal = frame.normal;
        if normal.dot(impact) > 0.0 {
            normal = -normal;
        }

        let reflected = reflect(ball.velocity, normal);
        let spun = reflected + frame.tangent * paddle.drag * config.spin_factor;
        // Spin may bend the return, never turn it back out of the arena
        let outgoing = if spun.dot(normal) > 0.0 { spun } else { reflected };

        let velocity = renormalize(outgoing, config.ball_speed);
        ball.velocity = avoid_vertices(
            velocity,
            impact,
            arena.vertices(),
            config.vertex_avoid_angle,
            rng,
        );
        ball.position = impact + normal * config.contact_nudge;
        if !arena.is_duel() {
            // Near a corner the nudge can cross the neighbouring seat line
            ball.position = arena.contain(ball.position, config.contact_nudge);
        }
    }
}

/// `v' = v − 2(v·n)n` for a unit normal `n`
pub fn reflect(velocity: DVec2, normal: DVec2) -> DVec2 {
    velocity - 2.0 * velocity.dot(normal) * normal
}

/// Scale to `speed`, leaving a zero vector alone
pub fn renormalize(velocity: DVec2, speed: f64) -> DVec2 {
    let direction = velocity.normalize_or_zero();
    if direction == DVec2::ZERO {
        velocity
    } else {
        direction * speed
    }
}

/// Intersect the ball step `from → to` with the line through `left`/`right`.
///
/// Lines are written as `ax + by + c = 0` and solved with Cramer's rule.
/// Returns `None` for near-parallel lines, a stationary ball, or an
/// intersection outside the step.
pub fn segment_intersection(
    from: DVec2,
    to: DVec2,
    left: DVec2,
    right: DVec2,
) -> Option<Intersection> {
    let a1 = to.y - from.y;
    let b1 = -(to.x - from.x);
    let c1 = to.x * from.y - from.x * to.y;

    let a2 = right.y - left.y;
    let b2 = -(right.x - left.x);
    let c2 = right.x * left.y - left.x * right.y;

    let det = a1 * b2 - a2 * b1;
    if det.abs() < PARALLEL_EPSILON {
        return None;
    }

    let point = DVec2::new((-c1 * b2 + c2 * b1) / det, (-a1 * c2 + a2 * c1) / det);

    let step = to - from;
    let t = if step.x.abs() > STEP_EPSILON {
        (point.x - from.x) / step.x
    } else if step.y.abs() > STEP_EPSILON {
        (point.y - from.y) / step.y
    } else {
        return None;
    };

    (0.0..=1.0)
        .contains(&t)
        .then_some(Intersection { point, t })
}

/// Where `point` falls along the paddle: 0 at `left`, 1 at `right`.
///
/// A paddle with no length is treated as a disc of radius `half_width`
/// around its centre: 0.5 inside, -1 outside.
pub fn paddle_parameter(
    point: DVec2,
    left: DVec2,
    right: DVec2,
    center: DVec2,
    half_width: f64,
) -> f64 {
    let span = right - left;
    let length_sq = span.length_squared();
    if length_sq > POINT_PADDLE_EPSILON {
        span.dot(point - left) / length_sq
    } else if point.distance_squared(center) < half_width * half_width {
        0.5
    } else {
        -1.0
    }
}

/// Rotate `velocity` slightly if it is aimed within `threshold` radians of any
/// arena corner as seen from `origin`. The rotation turns away from the corner
/// by a random amount in `[threshold, 2·threshold]`; speed is unchanged.
pub fn avoid_vertices<R: Rng>(
    velocity: DVec2,
    origin: DVec2,
    vertices: &[DVec2],
    threshold: f64,
    rng: &mut R,
) -> DVec2 {
    if threshold <= 0.0 || velocity == DVec2::ZERO {
        return velocity;
    }

    for vertex in vertices {
        let to_vertex = *vertex - origin;
        if to_vertex.length_squared() < POINT_PADDLE_EPSILON {
            continue;
        }

        let offset = velocity.perp_dot(to_vertex).atan2(velocity.dot(to_vertex));
        if offset.abs() < threshold {
            let magnitude = rng.gen_range(threshold..=threshold * 2.0);
            let turn = if offset >= 0.0 { -magnitude } else { magnitude };
            return DVec2::from_angle(turn).rotate(velocity);
        }
    }

    velocity
}
