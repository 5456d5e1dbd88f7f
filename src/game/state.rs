//! Match state and phase transitions (owned by the session worker)

use glam::DVec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use tracing::{debug, info};

use crate::config::{GameConfig, LaunchAngle};
use crate::protocol::{GameResult, ResultPlayer, ResultState, RosterEntry};

use super::arena::Arena;
use super::physics::{Ball, Contact, Paddle, PhysicsSystem};
use super::{PlayerId, RoomId};

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Ball held in the centre before a serve
    Countdown,
    /// Ball in play
    Playing,
    /// One player left
    Finished,
}

/// Player state in a match (authoritative)
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub username: String,

    /// Paddle centre along the seat, 0..1
    pub position: f64,
    /// Position at the start of the previous tick, for drag measurement
    prev_position: f64,
    /// Lateral paddle velocity, position units per second
    pub drag: f64,
    pub x: f64,
    pub y: f64,

    pub is_active: bool,
    pub place: Option<u32>,
    pub players_kicked: u32,
}

impl Player {
    pub fn new(id: PlayerId, username: String) -> Self {
        Self {
            id,
            username,
            position: 0.5,
            prev_position: 0.5,
            drag: 0.0,
            x: 0.0,
            y: 0.0,
            is_active: true,
            place: None,
            players_kicked: 0,
        }
    }

    fn recenter(&mut self) {
        self.position = 0.5;
        self.prev_position = 0.5;
        self.drag = 0.0;
    }
}

/// What a single tick changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Countdown running or ball moving freely
    Continued,
    /// Countdown expired, ball launched
    Served,
    /// Ball bounced off a wall or paddle
    Bounced(Contact),
    /// A player was knocked out and at least two remain
    Eliminated(PlayerId),
    /// A player was knocked out and the match is over
    Finished { last_eliminated: PlayerId },
    /// Nothing to simulate
    Idle,
}

/// Runtime faults detected inside a tick
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    #[error("ball state is not finite: position {position:?}, velocity {velocity:?}")]
    NonFinite { position: DVec2, velocity: DVec2 },
}

/// Match state
pub struct MatchState {
    pub room_id: RoomId,
    pub phase: MatchPhase,
    pub tick: u64,
    pub players: Vec<Player>,
    pub ball: Ball,
    /// Last player whose paddle touched the ball in the current rally
    pub who_hit_the_ball: Option<PlayerId>,
    countdown_ticks: u32,
    config: GameConfig,
    rng: ChaCha8Rng,
}

impl MatchState {
    pub fn new(room_id: RoomId, roster: &[RosterEntry], config: GameConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        let mut state = Self {
            room_id,
            phase: MatchPhase::Countdown,
            tick: 0,
            players: roster
                .iter()
                .map(|entry| Player::new(entry.id, entry.username.clone()))
                .collect(),
            ball: Ball::centered(),
            who_hit_the_ball: None,
            countdown_ticks: config.countdown_ticks(),
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
        };
        state.recompute_geometry();
        state
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Seconds left before the serve
    pub fn countdown_seconds(&self) -> f64 {
        if self.phase == MatchPhase::Countdown {
            self.countdown_ticks as f64 * self.config.tick_delta()
        } else {
            0.0
        }
    }

    /// Count active players
    pub fn active_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_active).count()
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == *id)
    }

    /// Shift a paddle by a raw pointer delta, clamped to the seat.
    /// Returns false if the player is unknown or already out.
    pub fn move_player(&mut self, id: &PlayerId, delta: f64) -> bool {
        let scaled = delta * self.config.mouse_sensitivity;
        let (min, max) = self.config.position_bounds();
        match self.players.iter_mut().find(|p| p.id == *id) {
            Some(player) if player.is_active && scaled.is_finite() => {
                player.position = (player.position + scaled).clamp(min, max);
                true
            }
            _ => false,
        }
    }

    /// Run a single simulation tick
    pub fn tick(&mut self) -> Result<TickOutcome, SimulationError> {
        if self.phase == MatchPhase::Finished {
            return Ok(TickOutcome::Idle);
        }

        self.tick += 1;
        self.measure_drag();
        let Some(arena) = self.recompute_geometry() else {
            return Ok(TickOutcome::Idle);
        };

        let outcome = match self.phase {
            MatchPhase::Countdown => self.run_countdown(),
            MatchPhase::Playing => self.run_playing(&arena),
            MatchPhase::Finished => TickOutcome::Idle,
        };

        if !self.ball.is_finite() {
            return Err(SimulationError::NonFinite {
                position: self.ball.position,
                velocity: self.ball.velocity,
            });
        }

        Ok(outcome)
    }

    /// Lay out active players on the arena. Returns `None` when fewer than two
    /// are active, leaving their coordinates untouched.
    pub fn recompute_geometry(&mut self) -> Option<Arena> {
        let count = self.active_count();
        let arena = Arena::new(count, &self.config)?;

        for (seat, player) in self.players.iter_mut().filter(|p| p.is_active).enumerate() {
            if let Some(center) = arena.paddle_center(seat, player.position) {
                player.x = center.x;
                player.y = center.y;
            }
        }

        Some(arena)
    }

    fn measure_drag(&mut self) {
        let fps = self.config.fps as f64;
        for player in &mut self.players {
            player.drag = (player.position - player.prev_position) * fps;
            player.prev_position = player.position;
        }
    }

    fn run_countdown(&mut self) -> TickOutcome {
        self.countdown_ticks = self.countdown_ticks.saturating_sub(1);
        if self.countdown_ticks > 0 {
            return TickOutcome::Continued;
        }

        let angle = match self.config.launch_angle {
            LaunchAngle::Random => self.rng.gen_range(0.0..TAU),
            LaunchAngle::Fixed(angle) => angle,
        };
        self.ball.velocity = DVec2::from_angle(angle) * self.config.ball_speed;
        self.phase = MatchPhase::Playing;

        debug!(room_id = %self.room_id, angle, "Ball served");
        TickOutcome::Served
    }

    fn run_playing(&mut self, arena: &Arena) -> TickOutcome {
        let seated: Vec<usize> = self
            .players
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_active)
            .map(|(index, _)| index)
            .collect();

        let paddles: Vec<Paddle> = seated
            .iter()
            .map(|&index| {
                let p = &self.players[index];
                Paddle {
                    center: DVec2::new(p.x, p.y),
                    drag: p.drag,
                }
            })
            .collect();

        let contact = PhysicsSystem::resolve_contact(
            &mut self.ball,
            arena,
            &paddles,
            &self.config,
            &mut self.rng,
        );

        match contact {
            None => {
                PhysicsSystem::integrate(&mut self.ball, self.config.tick_delta());
                TickOutcome::Continued
            }
            Some(Contact::Wall) => TickOutcome::Bounced(Contact::Wall),
            Some(Contact::PaddleHit { seat }) => {
                if let Some(&index) = seated.get(seat) {
                    self.who_hit_the_ball = Some(self.players[index].id);
                }
                TickOutcome::Bounced(Contact::PaddleHit { seat })
            }
            Some(Contact::Goal { seat }) => match seated.get(seat) {
                Some(&index) => self.eliminate(index),
                None => TickOutcome::Continued,
            },
        }
    }

    /// Knock out the player at `index` and either start the next rally or
    /// finish the match
    fn eliminate(&mut self, index: usize) -> TickOutcome {
        let remaining_before = self.active_count() as u32;
        let victim_id = {
            let victim = &mut self.players[index];
            victim.is_active = false;
            victim.place = Some(remaining_before);
            victim.id
        };

        if let Some(hitter_id) = self.who_hit_the_ball.take() {
            if hitter_id != victim_id {
                if let Some(hitter) = self.players.iter_mut().find(|p| p.id == hitter_id) {
                    hitter.players_kicked += 1;
                }
            }
        }

        info!(
            room_id = %self.room_id,
            player_id = %victim_id,
            place = remaining_before,
            "Player eliminated"
        );

        if self.active_count() < 2 {
            if let Some(winner) = self.players.iter_mut().find(|p| p.is_active) {
                winner.place = Some(1);
            }
            self.phase = MatchPhase::Finished;
            self.ball.velocity = DVec2::ZERO;
            return TickOutcome::Finished {
                last_eliminated: victim_id,
            };
        }

        self.reset_rally();
        TickOutcome::Eliminated(victim_id)
    }

    fn reset_rally(&mut self) {
        self.phase = MatchPhase::Countdown;
        self.countdown_ticks = self.config.countdown_ticks();
        self.ball = Ball::centered();
        self.who_hit_the_ball = None;
        for player in self.players.iter_mut().filter(|p| p.is_active) {
            player.recenter();
        }
        self.recompute_geometry();
    }

    /// Final result for persistence; scores are filled in by the scorer
    pub fn result(&self, fee: u64) -> GameResult {
        GameResult {
            players: self
                .players
                .iter()
                .map(|p| ResultPlayer {
                    id: p.id,
                    username: p.username.clone(),
                    place: p.place,
                    players_kicked: p.players_kicked,
                    is_active: p.is_active,
                    score: 0,
                })
                .collect(),
            state: if self.phase == MatchPhase::Finished {
                ResultState::Finished
            } else {
                ResultState::Aborted
            },
            fee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn roster(n: usize) -> Vec<RosterEntry> {
        (0..n)
            .map(|i| RosterEntry::new(Uuid::new_v4(), format!("player{i}")))
            .collect()
    }

    fn seeded(n: usize, config: GameConfig) -> MatchState {
        let config = GameConfig {
            seed: Some(42),
            ..config
        };
        MatchState::new(Uuid::new_v4(), &roster(n), config)
    }

    fn run_countdown(state: &mut MatchState) {
        while state.phase == MatchPhase::Countdown {
            state.tick().unwrap();
        }
    }

    /// Serve, then send the ball from the centre at the first active seat,
    /// well away from its paddle, and tick until someone is knocked out
    fn score_on_first_seat(state: &mut MatchState) -> TickOutcome {
        run_countdown(state);
        let arena = Arena::new(state.active_count(), state.config()).unwrap();
        let seat = arena.seat(0).unwrap();
        let target = seat.center + seat.tangent * 0.35;

        state.ball.position = DVec2::ZERO;
        state.ball.velocity = target.normalize() * state.config().ball_speed;

        for _ in 0..10_000 {
            match state.tick().unwrap() {
                outcome @ (TickOutcome::Eliminated(_) | TickOutcome::Finished { .. }) => {
                    return outcome
                }
                _ => {}
            }
        }
        panic!("ball never reached the goal");
    }

    #[test]
    fn new_match_starts_in_countdown_with_centered_paddles() {
        let state = seeded(3, GameConfig::default());
        assert_eq!(state.phase, MatchPhase::Countdown);
        assert!((state.countdown_seconds() - 5.0).abs() < 1e-9);
        assert!(state
            .players
            .iter()
            .all(|p| p.is_active && p.position == 0.5 && p.place.is_none()));
        assert_eq!(state.ball, Ball::centered());
    }

    #[test]
    fn countdown_lasts_exactly_seconds_times_fps_ticks() {
        let mut state = seeded(2, GameConfig::default());
        let expected = 5 * 60;

        for _ in 0..expected - 1 {
            assert_eq!(state.tick().unwrap(), TickOutcome::Continued);
            assert_eq!(state.phase, MatchPhase::Countdown);
            assert_eq!(state.ball.speed(), 0.0);
        }

        assert_eq!(state.tick().unwrap(), TickOutcome::Served);
        assert_eq!(state.phase, MatchPhase::Playing);
        assert!((state.ball.speed() - 0.5).abs() < 1e-9);
        assert_eq!(state.tick, expected as u64);

        assert_ne!(state.tick().unwrap(), TickOutcome::Served);
    }

    #[test]
    fn fixed_launch_angle_is_respected() {
        let mut state = seeded(
            2,
            GameConfig {
                launch_angle: LaunchAngle::Fixed(0.0),
                countdown_secs: 0.0,
                ..GameConfig::default()
            },
        );

        assert_eq!(state.tick().unwrap(), TickOutcome::Served);
        assert!((state.ball.velocity - DVec2::new(0.5, 0.0)).length() < 1e-12);
    }

    #[test]
    fn moves_are_scaled_and_clamped() {
        let mut state = seeded(2, GameConfig::default());
        let id = state.players[0].id;

        assert!(state.move_player(&id, 100.0));
        assert!((state.players[0].position - 0.6).abs() < 1e-12);

        assert!(state.move_player(&id, 10_000.0));
        assert!((state.players[0].position - 0.9).abs() < 1e-12);

        assert!(state.move_player(&id, -10_000.0));
        assert!((state.players[0].position - 0.1).abs() < 1e-12);

        assert!(!state.move_player(&Uuid::new_v4(), 1.0));
    }

    #[test]
    fn two_player_left_goal_eliminates_left_and_credits_hitter() {
        let mut state = seeded(2, GameConfig::default());
        let left = state.players[0].id;
        let right = state.players[1].id;
        run_countdown(&mut state);

        // Right player returned the ball last; left paddle sits at the top
        state.who_hit_the_ball = Some(right);
        state.move_player(&left, 300.0);
        state.ball.position = DVec2::new(-1.015, -0.2);
        state.ball.velocity = DVec2::new(-0.5, 0.0);

        let outcome = state.tick().unwrap();

        assert_eq!(outcome, TickOutcome::Finished { last_eliminated: left });
        let left_player = state.player(&left).unwrap();
        assert!(!left_player.is_active);
        assert_eq!(left_player.place, Some(2));
        let right_player = state.player(&right).unwrap();
        assert_eq!(right_player.players_kicked, 1);
        assert_eq!(right_player.place, Some(1));
        assert_eq!(state.phase, MatchPhase::Finished);
    }

    #[test]
    fn goal_without_hitter_credits_nobody() {
        let mut state = seeded(3, GameConfig::default());
        let outcome = score_on_first_seat(&mut state);

        assert!(matches!(outcome, TickOutcome::Eliminated(_)));
        assert!(state.players.iter().all(|p| p.players_kicked == 0));
    }

    #[test]
    fn elimination_resets_the_rally() {
        let mut state = seeded(3, GameConfig::default());
        let mover = state.players[1].id;
        run_countdown(&mut state);
        state.move_player(&mover, 200.0);
        state.who_hit_the_ball = Some(mover);

        let outcome = score_on_first_seat(&mut state);
        let TickOutcome::Eliminated(victim) = outcome else {
            panic!("expected an elimination, got {outcome:?}");
        };

        assert_eq!(state.player(&victim).unwrap().place, Some(3));
        assert_eq!(state.phase, MatchPhase::Countdown);
        assert_eq!(state.ball, Ball::centered());
        assert_eq!(state.who_hit_the_ball, None);
        assert!((state.countdown_seconds() - 5.0).abs() < 1e-9);
        assert!(state
            .players
            .iter()
            .filter(|p| p.is_active)
            .all(|p| p.position == 0.5));

        // Two left: the survivors now sit on the duel seats
        let xs: Vec<f64> = state
            .players
            .iter()
            .filter(|p| p.is_active)
            .map(|p| p.x)
            .collect();
        assert_eq!(xs, vec![-1.0, 1.0]);
    }

    #[test]
    fn finished_match_assigns_every_place_once() {
        for n in 2..7 {
            let mut state = seeded(n, GameConfig::default());
            let mut outcomes = 0;
            while state.phase != MatchPhase::Finished {
                score_on_first_seat(&mut state);
                outcomes += 1;
            }
            assert_eq!(outcomes, n - 1);

            let mut places: Vec<u32> = state.players.iter().filter_map(|p| p.place).collect();
            places.sort_unstable();
            assert_eq!(places, (1..=n as u32).collect::<Vec<_>>());

            assert_eq!(state.tick().unwrap(), TickOutcome::Idle);
        }
    }

    #[test]
    fn speed_stays_constant_while_playing() {
        let mut state = seeded(
            5,
            GameConfig {
                countdown_secs: 0.0,
                ..GameConfig::default()
            },
        );
        let ids: Vec<PlayerId> = state.players.iter().map(|p| p.id).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        for _ in 0..20_000 {
            if state.phase == MatchPhase::Finished {
                break;
            }
            let id = ids[rng.gen_range(0..ids.len())];
            state.move_player(&id, rng.gen_range(-40.0..40.0));

            state.tick().unwrap();
            if state.phase == MatchPhase::Playing {
                assert!((state.ball.speed() - 0.5).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn non_finite_ball_is_a_fault() {
        let mut state = seeded(2, GameConfig::default());
        run_countdown(&mut state);
        state.ball.velocity = DVec2::new(f64::NAN, 0.0);

        assert!(matches!(
            state.tick(),
            Err(SimulationError::NonFinite { .. })
        ));
    }

    #[test]
    fn result_mirrors_players() {
        let mut state = seeded(2, GameConfig::default());
        assert_eq!(state.result(10).state, ResultState::Aborted);

        while state.phase != MatchPhase::Finished {
            score_on_first_seat(&mut state);
        }
        let result = state.result(10);
        assert_eq!(result.state, ResultState::Finished);
        assert_eq!(result.fee, 10);
        assert_eq!(result.players.len(), 2);
        assert!(result.players.iter().all(|p| p.place.is_some()));
    }
}
