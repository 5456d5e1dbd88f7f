//! Arena geometry: seats, paddle coordinates and arena corners

use glam::DVec2;
use std::f64::consts::{FRAC_PI_2, TAU};

use crate::config::GameConfig;

/// Placement of one seat on the arena perimeter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeatFrame {
    /// Middle of the seat (paddle centre at position 0.5)
    pub center: DVec2,
    /// Unit vector along the seat, towards increasing position
    pub tangent: DVec2,
    /// Unit vector pointing into the arena
    pub normal: DVec2,
}

/// Seat layout for a given number of active players.
///
/// Two players get the rectangular field with seats facing each other on the x
/// axis. Three or more sit on a regular polygon with unit-length sides whose
/// apothem is `0.5 / tan(π / n)`.
#[derive(Debug, Clone)]
pub struct Arena {
    seats: Vec<SeatFrame>,
    vertices: Vec<DVec2>,
    /// Largest offset of a paddle centre from its seat centre (duel only)
    offset_limit: Option<f64>,
}

impl Arena {
    /// Build the layout for `count` active players. Returns `None` when fewer
    /// than two players remain, there is nothing to lay out then.
    pub fn new(count: usize, config: &GameConfig) -> Option<Self> {
        if count < 2 {
            return None;
        }

        let seats = (0..count)
            .map(|index| seat_frame(index, count, config))
            .collect();

        let (vertices, offset_limit) = if count == 2 {
            let gx = config.goal_x();
            let hy = config.field_half_height;
            (
                vec![
                    DVec2::new(-gx, -hy),
                    DVec2::new(gx, -hy),
                    DVec2::new(gx, hy),
                    DVec2::new(-gx, hy),
                ],
                Some((config.field_half_height - config.paddle_half_width).max(0.0)),
            )
        } else {
            (polygon_vertices(count), None)
        };

        Some(Self {
            seats,
            vertices,
            offset_limit,
        })
    }

    pub fn is_duel(&self) -> bool {
        self.seats.len() == 2
    }

    pub fn seat_count(&self) -> usize {
        self.seats.len()
    }

    pub fn seats(&self) -> &[SeatFrame] {
        &self.seats
    }

    pub fn seat(&self, index: usize) -> Option<&SeatFrame> {
        self.seats.get(index)
    }

    /// Arena corners, used to keep the ball from being aimed into one
    pub fn vertices(&self) -> &[DVec2] {
        &self.vertices
    }

    /// Pull `point` straight towards the centre until it sits at least
    /// `margin` inside every seat line
    pub fn contain(&self, point: DVec2, margin: f64) -> DVec2 {
        let mut scale: f64 = 1.0;
        for seat in &self.seats {
            let outward = -point.dot(seat.normal);
            if outward > 0.0 {
                let apothem = -seat.center.dot(seat.normal);
                scale = scale.min(((apothem - margin) / outward).max(0.0));
            }
        }
        point * scale
    }

    /// Cartesian paddle centre for a scalar seat position
    pub fn paddle_center(&self, seat: usize, position: f64) -> Option<DVec2> {
        let frame = self.seats.get(seat)?;
        let mut offset = position - 0.5;
        if let Some(limit) = self.offset_limit {
            offset = offset.clamp(-limit, limit);
        }
        Some(frame.center + frame.tangent * offset)
    }
}

/// Seat frame for seat `index` of `count`.
///
/// The two-player case is the degenerate polygon: the apothem formula collapses
/// to zero, so both seats are pushed out to the field's paddle lines while
/// keeping the same tangent direction (+y) for increasing position.
pub fn seat_frame(index: usize, count: usize, config: &GameConfig) -> SeatFrame {
    if count == 2 {
        let side = if index == 0 { -1.0 } else { 1.0 };
        return SeatFrame {
            center: DVec2::new(side * config.field_half_width, 0.0),
            tangent: DVec2::Y,
            normal: DVec2::new(-side, 0.0),
        };
    }

    let alpha = TAU / count as f64;
    let height = 0.5 / (alpha / 2.0).tan();
    let beta = alpha * index as f64;
    let gamma = beta - FRAC_PI_2;

    let tangent = DVec2::from_angle(beta);
    SeatFrame {
        center: DVec2::from_angle(gamma) * height,
        tangent,
        normal: tangent.perp(),
    }
}

/// Corners of the regular polygon with unit sides, one between each pair of
/// neighbouring seats
fn polygon_vertices(count: usize) -> Vec<DVec2> {
    let alpha = TAU / count as f64;
    let radius = 0.5 / (alpha / 2.0).sin();
    (0..count)
        .map(|i| {
            let gamma = alpha * i as f64 - FRAC_PI_2;
            DVec2::from_angle(gamma + alpha / 2.0) * radius
        })
        .collect()
}
