//! Prize pool split by final place

use crate::protocol::GameResult;

/// One whole pool in basis points
const POOL_BP: u128 = 10_000;

/// Basis points shared by places 4 and below in matches of four or more
const TAIL_BP: u128 = 1_000;

/// Podium shares in basis points, indexed by place - 1
fn podium(count: usize) -> &'static [u128] {
    match count {
        2 => &[9_000, 1_000],
        3 => &[8_500, 1_000, 500],
        _ => &[7_000, 1_500, 500],
    }
}

/// `num / den` rounded to the nearest integer, halves rounded up
fn round_div(num: u128, den: u128) -> u128 {
    (2 * num + den) / (2 * den)
}

/// Prize for finishing at `place` out of `count` players sharing `pool`.
/// Places outside `1..=count` win nothing.
pub fn prize_for_place(pool: u64, count: usize, place: u32) -> u64 {
    if count < 2 || place == 0 || place as usize > count {
        return 0;
    }

    let pool = pool as u128;
    let rank = place as usize;
    let shares = podium(count);

    let prize = if rank <= shares.len() {
        round_div(pool * shares[rank - 1], POOL_BP)
    } else {
        // Tail weight is N - place + 1, summing to (N - 3)(N - 2) / 2
        let n = count as u128;
        let weight = n - rank as u128 + 1;
        let total_weight = (n - 3) * (n - 2) / 2;
        round_div(pool * TAIL_BP * weight, POOL_BP * total_weight)
    };

    u64::try_from(prize).unwrap_or(u64::MAX)
}

/// Fill in every player's score from their place. Only `score` is touched, so
/// calling it twice yields the same result.
pub fn assign_scores(result: &mut GameResult) {
    let count = result.players.len();
    let pool = result.pool();

    for player in &mut result.players {
        player.score = player
            .place
            .map(|place| prize_for_place(pool, count, place))
            .unwrap_or(0);
    }
}
