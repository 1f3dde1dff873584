//! Monte-Carlo estimation of the decoding performance of a code.
//!
//! Each trial draws random data packets, encodes them, then feeds all `n`
//! packets to a decoder in a random order until every data packet is known.
//! The number of packets needed is the decoding step count of the trial; the
//! inefficiency ratio is that count divided by `k`.
//!
//! Since the full set of packets always decodes, the step counts give the
//! decoding failure rate for any number of received packets `r`: a trial
//! fails at `r` iff it needed more than `r` packets.
//!
//! Trials are independent and run in parallel. Trial `i` uses its own
//! generator seeded with `seed + i`, so a report only depends on its
//! configuration.
use std::collections::BTreeMap;

use log::debug;
use rand::{Rng, RngCore, SeedableRng, rngs::StdRng, seq::SliceRandom};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

use crate::{
    code::CodeParams,
    errors::Result,
    session::{FecSession, PacketCanvas, SessionRole},
};

/// What to simulate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Code under test
    pub params: CodeParams,
    /// Packet size in bytes
    pub block_size: usize,
    /// Number of trials
    pub trials: usize,
    /// Seed of the trial generators
    pub seed: u64,
    /// Draw a new matrix seed for every trial instead of `params.seed`
    pub vary_matrix: bool,
}

/// Decoding failure rate after receiving a given number of packets.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailurePoint {
    /// Packets received
    pub received: usize,
    /// Fraction of trials not decoded at that point
    pub failure_rate: f64,
}

/// Outcome of a simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Configuration that produced the report
    pub config: SimulationConfig,
    /// Mean number of packets needed, divided by `k`
    pub mean_inefficiency: f64,
    /// Fewest packets a trial needed
    pub min_steps: usize,
    /// Most packets a trial needed
    pub max_steps: usize,
    /// Number of trials per decoding step count
    pub steps: BTreeMap<usize, usize>,
}

impl SimulationReport {
    /// Fraction of trials that needed more than `received` packets.
    pub fn failure_rate(&self, received: usize) -> f64 {
        let trials: usize = self.steps.values().sum();
        if trials == 0 {
            return 0.0;
        }
        let failed: usize = self.steps.range(received + 1..).map(|(_, &count)| count).sum();
        failed as f64 / trials as f64
    }

    /// Failure rate for every reception count from `k` to `n`.
    pub fn failure_curve(&self) -> Vec<FailurePoint> {
        let params = &self.config.params;
        (params.data_blocks..=params.total_blocks())
            .map(|received| FailurePoint {
                received,
                failure_rate: self.failure_rate(received),
            })
            .collect()
    }
}

/// Runs a simulation.
///
/// # Errors
/// Returns `Error::Config` if the configuration is invalid, or the first
/// error a trial ran into.
pub fn simulate(config: &SimulationConfig) -> Result<SimulationReport> {
    config.params.validate()?;
    // Fail early on a bad block size.
    FecSession::new(config.params, config.block_size, SessionRole::Encoder)?;

    let steps: BTreeMap<usize, usize> = (0..config.trials)
        .into_par_iter()
        .try_fold(BTreeMap::new, |mut acc: BTreeMap<usize, usize>, trial| {
            let steps = run_trial(config, trial as u64)?;
            *acc.entry(steps).or_insert(0) += 1;
            Ok::<_, crate::errors::Error>(acc)
        })
        .try_reduce(BTreeMap::new, |mut a, b| {
            for (steps, count) in b {
                *a.entry(steps).or_insert(0) += count;
            }
            Ok(a)
        })?;

    let total_steps: usize = steps.iter().map(|(&s, &count)| s * count).sum();
    let mean_inefficiency = if config.trials == 0 {
        0.0
    } else {
        total_steps as f64 / (config.trials * config.params.data_blocks) as f64
    };
    let report = SimulationReport {
        config: *config,
        mean_inefficiency,
        min_steps: steps.keys().next().copied().unwrap_or(0),
        max_steps: steps.keys().next_back().copied().unwrap_or(0),
        steps,
    };
    debug!(
        "{} trials, mean inefficiency {:.4}",
        config.trials, report.mean_inefficiency
    );
    Ok(report)
}

/// Encodes random data and returns how many shuffled packets the decoder
/// needed.
fn run_trial(config: &SimulationConfig, trial: u64) -> Result<usize> {
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(trial));
    let mut params = config.params;
    if config.vary_matrix {
        params.seed = rng.random();
    }
    let k = params.data_blocks;
    let n = params.total_blocks();

    let slots: Vec<Option<Vec<u8>>> = (0..n)
        .map(|seq| {
            (seq < k).then(|| {
                let mut packet = vec![0; config.block_size];
                rng.fill_bytes(&mut packet);
                packet
            })
        })
        .collect();
    let mut packets = PacketCanvas::from(slots);
    let mut encoder = FecSession::new(params, config.block_size, SessionRole::Encoder)?;
    for i in 0..params.parity_blocks {
        let mut fec = vec![0; config.block_size];
        encoder.build_fec_packet(&packets.as_view(), i, &mut fec)?;
        packets.insert(k + i, fec);
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut rng);

    let mut decoder = FecSession::new(params, config.block_size, SessionRole::Decoder)?;
    let mut canvas = PacketCanvas::new(k);
    for (step, &seq) in order.iter().enumerate() {
        let Some(packet) = packets.get(seq) else {
            continue;
        };
        decoder.decode_step_copy(&mut canvas, packet, seq)?;
        if step + 1 >= k && decoder.is_decoding_complete(&canvas) {
            debug_assert!((0..k).all(|s| canvas.get(s) == packets.get(s)));
            return Ok(step + 1);
        }
    }
    Ok(n)
}
