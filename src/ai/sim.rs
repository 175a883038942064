//! Monte-Carlo evaluation of candidate moves by multi-threaded
//! rollouts.

use crate::{
    ai::movegen::{generate_moves, MoveRecord},
    error::{GameError, GameResult},
    game::{
        play::{Move, MoveList, MoveSort},
        rack::Rack,
        Game,
    },
    util::{stats::Stat, win_pct::WinPct},
};
use log::{debug, warn};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

/// When to stop early: never, or once the leader's one-sided
/// confidence bound clears every other candidate's at the given level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    /// Run to the iteration cap.
    None,
    /// 90% one-sided confidence.
    Confidence90,
    /// 95% one-sided confidence.
    Confidence95,
    /// 98% one-sided confidence.
    Confidence98,
    /// 99% one-sided confidence.
    Confidence99,
}

impl StopCondition {
    fn z(self) -> Option<f64> {
        match self {
            StopCondition::None => None,
            StopCondition::Confidence90 => Some(1.282),
            StopCondition::Confidence95 => Some(1.645),
            StopCondition::Confidence98 => Some(2.054),
            StopCondition::Confidence99 => Some(2.326),
        }
    }
}

/// Simulation controls.
#[derive(Debug, Clone)]
pub struct SimParams {
    /// Half-moves to play out after each candidate.
    pub plies: usize,
    /// Iterations per candidate at the cap.
    pub max_iterations: usize,
    /// Iterations every candidate must reach before the stop rule may
    /// fire.
    pub min_plays: usize,
    /// The early-stopping rule.
    pub stop: StopCondition,
    /// Master seed; every rollout derives its own generator from it.
    pub seed: u64,
    /// Worker thread count.
    pub threads: usize,
    /// Work items a thread processes between master combines.
    pub status_interval: usize,
    /// The opponent's rack when inference has pinned it down.
    pub known_opponent_rack: Option<Rack>,
    /// Wall-clock budget enforced by a watchdog.
    pub max_time: Option<Duration>,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            plies: 2,
            max_iterations: 1000,
            min_plays: 20,
            stop: StopCondition::None,
            seed: 0,
            threads: thread::available_parallelism().map_or(1, |n| n.get()),
            status_interval: 32,
            known_opponent_rack: None,
            max_time: None,
        }
    }
}

/// One candidate's accumulated statistics.
#[derive(Debug, Clone)]
pub struct SimmedPlay {
    /// The candidate move.
    pub mv: Move,
    /// Rollout equity: spread plus static leftover, or final spread
    /// when the rollout reached the end of the game.
    pub equity_stat: Stat,
    /// Estimated win probability per rollout.
    pub win_pct_stat: Stat,
    /// Raw score of the best reply at each ply depth.
    pub score_stats: Vec<Stat>,
}

impl SimmedPlay {
    fn new(mv: Move, plies: usize) -> Self {
        Self {
            mv,
            equity_stat: Stat::new(),
            win_pct_stat: Stat::new(),
            score_stats: vec![Stat::new(); plies],
        }
    }

    fn absorb(&mut self, result: &ItemResult) {
        self.equity_stat.push(result.equity);
        self.win_pct_stat.push(result.win);
        for (ply, &score) in result.scores.iter().enumerate() {
            self.score_stats[ply].push(score);
        }
    }
}

/// The outcome of a simulation run.
#[derive(Debug, Clone)]
pub struct SimResults {
    /// Candidates ordered best first by mean rollout equity.
    pub plays: Vec<SimmedPlay>,
    /// Total rollouts completed.
    pub iterations: usize,
    /// Whether the stop rule fired before the caps did.
    pub converged: bool,
}

/// One finished rollout.
#[derive(Debug, Clone)]
struct ItemResult {
    item: usize,
    equity: f64,
    win: f64,
    scores: Vec<f64>,
}

struct Master {
    /// Every finished rollout, folded in item order at the end so the
    /// reported statistics do not depend on thread scheduling.
    results: Vec<ItemResult>,
    /// Incremental per-candidate stats fed by shadow combines, used
    /// only by the stop rule.
    progress: Vec<SimmedPlay>,
    converged: bool,
}

struct Shared {
    next_item: AtomicUsize,
    halt: AtomicBool,
    master: Mutex<Master>,
}

/// Re-ranks `candidates` by playing each one and rolling the game
/// forward, across `params.threads` worker threads. Workers pull
/// `(iteration, candidate)` items off an atomic counter, seed each
/// rollout from the master seed and the item index, and keep
/// per-thread shadow statistics that are periodically combined into
/// the master under a single mutex, where the stop rule is evaluated.
pub fn simulate(
    game: &Game,
    candidates: &[Move],
    win_pct: Option<&WinPct>,
    params: &SimParams,
) -> GameResult<SimResults> {
    if candidates.is_empty() {
        return Err(GameError::SimNoMoves);
    }

    // The rollout template: the opponent's tiles go back in the bag
    // unless inference pinned their rack.
    let mut template = game.clone();
    let opponent = 1 - template.on_turn();
    match &params.known_opponent_rack {
        Some(rack) => template.set_rack(opponent, rack)?,
        None => template.set_rack(opponent, &Rack::new())?,
    }

    let num_candidates = candidates.len();
    let total_items = params.max_iterations * num_candidates;
    let threads = params.threads.max(1);
    let shared = Arc::new(Shared {
        next_item: AtomicUsize::new(0),
        halt: AtomicBool::new(false),
        master: Mutex::new(Master {
            results: Vec::with_capacity(total_items),
            progress: candidates
                .iter()
                .map(|&mv| SimmedPlay::new(mv, params.plies))
                .collect(),
            converged: false,
        }),
    });

    let mut handles = Vec::with_capacity(threads);
    for _ in 0..threads {
        let shared = Arc::clone(&shared);
        let template = template.clone();
        let candidates = candidates.to_vec();
        let params = params.clone();
        let win_pct = win_pct.cloned();
        handles.push(thread::spawn(move || {
            worker(&shared, template, &candidates, &params, win_pct.as_ref(), total_items);
        }));
    }

    // The watchdog sets the halt flag once the budget runs out.
    let watchdog = params.max_time.map(|budget| {
        let shared = Arc::clone(&shared);
        let deadline = Instant::now() + budget;
        thread::spawn(move || {
            while !shared.halt.load(Ordering::Relaxed) {
                if Instant::now() >= deadline {
                    shared.halt.store(true, Ordering::Relaxed);
                    break;
                }
                thread::sleep(Duration::from_millis(5));
            }
        })
    });

    for handle in handles {
        let _ = handle.join();
    }
    shared.halt.store(true, Ordering::Relaxed);
    if let Some(handle) = watchdog {
        let _ = handle.join();
    }

    let mut master = shared.master.lock().expect("workers have exited");
    let converged = master.converged;
    let mut results = std::mem::take(&mut master.results);
    drop(master);

    // Fold in item order: the report is a pure function of
    // (seed, iteration budget), not of scheduling.
    results.sort_by_key(|r| r.item);
    let iterations = results.len();
    let mut plays: Vec<SimmedPlay> = candidates
        .iter()
        .map(|&mv| SimmedPlay::new(mv, params.plies))
        .collect();
    for result in &results {
        plays[result.item % num_candidates].absorb(result);
    }

    plays.sort_by(|a, b| {
        b.equity_stat
            .mean()
            .partial_cmp(&a.equity_stat.mean())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.mv.score.cmp(&a.mv.score))
            .then(b.mv.cmp_by(&a.mv, MoveSort::Equity))
    });

    debug!(
        "simulation finished: {} rollouts, converged: {}",
        iterations, converged
    );
    Ok(SimResults {
        plays,
        iterations,
        converged,
    })
}

fn worker(
    shared: &Shared,
    template: Game,
    candidates: &[Move],
    params: &SimParams,
    win_pct: Option<&WinPct>,
    total_items: usize,
) {
    let num_candidates = candidates.len();
    let mut shadow: Vec<SimmedPlay> = candidates
        .iter()
        .map(|&mv| SimmedPlay::new(mv, params.plies))
        .collect();
    let mut batch: Vec<ItemResult> = Vec::with_capacity(params.status_interval);

    loop {
        if shared.halt.load(Ordering::Relaxed) {
            break;
        }
        let item = shared.next_item.fetch_add(1, Ordering::Relaxed);
        if item >= total_items {
            break;
        }

        let result = run_rollout(
            &template,
            &candidates[item % num_candidates],
            item,
            params,
            win_pct,
        );
        shadow[item % num_candidates].absorb(&result);
        batch.push(result);

        if batch.len() >= params.status_interval.max(1) {
            flush(shared, &mut batch, &mut shadow, params);
        }
    }
    flush(shared, &mut batch, &mut shadow, params);
}

/// Drains a thread's batch and shadow stats into the master and
/// evaluates the stop rule.
fn flush(shared: &Shared, batch: &mut Vec<ItemResult>, shadow: &mut [SimmedPlay], params: &SimParams) {
    if batch.is_empty() {
        return;
    }
    let mut master = shared.master.lock().expect("no poisoned sim threads");
    master.results.append(batch);
    for (progress, local) in master.progress.iter_mut().zip(shadow.iter_mut()) {
        progress.equity_stat.combine(&local.equity_stat);
        progress.win_pct_stat.combine(&local.win_pct_stat);
        for (m, l) in progress.score_stats.iter_mut().zip(local.score_stats.iter()) {
            m.combine(l);
        }
        local.equity_stat.reset();
        local.win_pct_stat.reset();
        local.score_stats.iter_mut().for_each(Stat::reset);
    }

    if let Some(z) = params.stop.z() {
        if stop_condition_met(&master.progress, z, params.min_plays) {
            master.converged = true;
            shared.halt.store(true, Ordering::Relaxed);
        }
    }
}

/// The leader must separate from every follower: its one-sided lower
/// bound above each follower's upper bound, once all candidates have
/// the minimum number of plays.
fn stop_condition_met(progress: &[SimmedPlay], z: f64, min_plays: usize) -> bool {
    if progress
        .iter()
        .any(|p| p.equity_stat.cardinality() < min_plays as u64)
    {
        return false;
    }
    let leader = progress
        .iter()
        .max_by(|a, b| {
            a.equity_stat
                .mean()
                .partial_cmp(&b.equity_stat.mean())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .expect("at least one candidate");
    let lower = leader.equity_stat.mean() - leader.equity_stat.stderr(z);

    progress
        .iter()
        .filter(|p| !std::ptr::eq(*p, leader))
        .all(|p| p.equity_stat.mean() + p.equity_stat.stderr(z) < lower)
}

/// Plays one candidate and `plies` best replies on a private clone of
/// the position, with randomness derived purely from (seed, item).
fn run_rollout(
    template: &Game,
    candidate: &Move,
    item: usize,
    params: &SimParams,
    win_pct: Option<&WinPct>,
) -> ItemResult {
    let mut game = template.clone();
    let sim_player = game.on_turn();
    let opponent = 1 - sim_player;
    game.bag_mut().seed(item_seed(params.seed, item));
    if params.known_opponent_rack.is_none() {
        game.draw_rack(opponent);
    }

    let mut scores = Vec::with_capacity(params.plies);
    if let Err(err) = game.play_move(candidate) {
        warn!("rollout rejected a candidate: {}", err);
        return ItemResult {
            item,
            equity: f64::MIN,
            win: 0.0,
            scores,
        };
    }

    let mut list = MoveList::new(1, MoveSort::Equity);
    for _ in 0..params.plies {
        if game.is_over() {
            break;
        }
        generate_moves(&mut game, MoveRecord::Best, &mut list);
        let best = *list.get(0);
        scores.push(best.score as f64);
        if game.play_move(&best).is_err() {
            break;
        }
    }

    if game.is_over() {
        // A finished rollout is valued by its final spread.
        let spread = game.spread(sim_player) as f64;
        let win = if spread > 0.0 {
            1.0
        } else if spread == 0.0 {
            0.5
        } else {
            0.0
        };
        ItemResult {
            item,
            equity: spread,
            win,
            scores,
        }
    } else {
        let spread = game.spread(sim_player);
        let leftover = game.klv().leave_value(game.player(sim_player).rack());
        let equity = spread as f64 + leftover;
        let win = match win_pct {
            Some(table) => table.win_pct(
                spread + leftover.round() as i32,
                game.unseen_tiles(sim_player),
            ),
            None => {
                if equity > 0.0 {
                    1.0
                } else if equity == 0.0 {
                    0.5
                } else {
                    0.0
                }
            }
        };
        ItemResult {
            item,
            equity,
            win,
            scores,
        }
    }
}

/// A splitmix-style mix of the master seed and the work-item index.
fn item_seed(seed: u64, item: usize) -> u64 {
    let mut x = seed ^ (item as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        game::tile::LetterDistribution,
        util::{klv::Klv, kwg::KwgBuilder},
    };

    fn sim_game(words: &[&str], rack: &str, seed: u64) -> Game {
        let ld = Arc::new(LetterDistribution::english());
        let mut builder = KwgBuilder::new();
        for word in words {
            builder.insert(&ld.str_to_mls(word).unwrap());
        }
        let mut game = Game::new(
            Arc::clone(&ld),
            Arc::new(builder.build()),
            Arc::new(Klv::empty()),
            seed,
        );
        let rack = Rack::from_str(&ld, rack).unwrap();
        game.set_rack(0, &rack).unwrap();
        game.draw_rack(1);
        game
    }

    fn candidates(game: &mut Game, n: usize) -> Vec<Move> {
        let mut list = MoveList::new(n, MoveSort::Equity);
        generate_moves(game, MoveRecord::Top, &mut list);
        list.moves().to_vec()
    }

    #[test]
    fn empty_candidate_list_is_an_error() {
        let game = sim_game(&["CAT"], "CATSJKQ", 1);
        let params = SimParams::default();
        assert!(matches!(
            simulate(&game, &[], None, &params),
            Err(GameError::SimNoMoves)
        ));
    }

    #[test]
    fn results_are_thread_count_independent() {
        let words = ["CAT", "CATS", "AT", "TA", "SAT", "ACT"];
        let mut game = sim_game(&words, "CATSTA?", 5);
        let moves = candidates(&mut game, 3);
        assert!(moves.len() >= 2);

        let base = SimParams {
            plies: 1,
            max_iterations: 24,
            threads: 1,
            seed: 17,
            status_interval: 4,
            ..SimParams::default()
        };
        let single = simulate(&game, &moves, None, &base).unwrap();
        let multi = simulate(
            &game,
            &moves,
            None,
            &SimParams {
                threads: 4,
                ..base.clone()
            },
        )
        .unwrap();
        let again = simulate(&game, &moves, None, &base).unwrap();

        assert_eq!(single.iterations, multi.iterations);
        for (a, b) in single.plays.iter().zip(multi.plays.iter()) {
            assert_eq!(a.mv.score, b.mv.score);
            assert_eq!(a.equity_stat.mean(), b.equity_stat.mean());
            assert_eq!(a.equity_stat.variance(), b.equity_stat.variance());
        }
        for (a, b) in single.plays.iter().zip(again.plays.iter()) {
            assert_eq!(a.equity_stat.mean(), b.equity_stat.mean());
        }
    }

    #[test]
    fn far_apart_candidates_converge_early() {
        let mut game = sim_game(&["QI", "AT"], "QIATJWV", 9);
        let moves = candidates(&mut game, 8);
        // Zero plies: each rollout's value is the candidate's own
        // score, so distinct scores separate immediately.
        let distinct: Vec<Move> = {
            let mut seen = std::collections::HashSet::new();
            moves
                .into_iter()
                .filter(|m| seen.insert(m.score))
                .take(2)
                .collect()
        };
        assert_eq!(distinct.len(), 2);
        assert_ne!(distinct[0].score, distinct[1].score);

        let params = SimParams {
            plies: 0,
            max_iterations: 1000,
            min_plays: 5,
            stop: StopCondition::Confidence99,
            threads: 2,
            status_interval: 4,
            seed: 3,
            ..SimParams::default()
        };
        let results = simulate(&game, &distinct, None, &params).unwrap();
        assert!(results.converged);
        assert!(results.iterations < 2000);
        // The higher-scoring candidate leads.
        assert!(results.plays[0].mv.score > results.plays[1].mv.score);
        // At least the minimum plays happened for each candidate.
        for play in &results.plays {
            assert!(play.equity_stat.cardinality() >= 5);
        }
    }

    #[test]
    fn close_candidates_run_to_the_cap() {
        let mut game = sim_game(&["AT", "TA"], "ATJWVXZ", 9);
        let moves = candidates(&mut game, 8);
        // Two placements with identical scores cannot separate.
        let same: Vec<Move> = moves
            .iter()
            .filter(|m| m.score == moves[0].score)
            .take(2)
            .copied()
            .collect();
        assert_eq!(same.len(), 2);

        let params = SimParams {
            plies: 0,
            max_iterations: 30,
            min_plays: 5,
            stop: StopCondition::Confidence95,
            threads: 2,
            status_interval: 4,
            seed: 3,
            ..SimParams::default()
        };
        let results = simulate(&game, &same, None, &params).unwrap();
        assert!(!results.converged);
        assert_eq!(results.iterations, 60);
    }

    #[test]
    fn win_probabilities_stay_in_range() {
        let table = "spread,0,1,2,3\n\
                     50,1.0,0.99,0.98,0.97\n\
                     49,1.0,0.98,0.97,0.96\n";
        // Collapse the table range: everything clamps.
        let wp = WinPct::from_csv(table).unwrap();
        let mut game = sim_game(&["CAT", "AT"], "CATWJVX", 2);
        let moves = candidates(&mut game, 2);
        let params = SimParams {
            plies: 1,
            max_iterations: 8,
            threads: 2,
            seed: 11,
            ..SimParams::default()
        };
        let results = simulate(&game, &moves, Some(&wp), &params).unwrap();
        for play in &results.plays {
            let mean = play.win_pct_stat.mean();
            assert!((0.0..=1.0).contains(&mean));
        }
    }
}
