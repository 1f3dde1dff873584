use std::{
    fs::{self, File},
    io::{self, Write},
    path::PathBuf,
};

use clap::{Args, Parser, Subcommand};
use log::{info, warn};

use ldgm_fec::{
    builder::create_pchk_matrix_with_report,
    code::{
        CodeDegrees, CodeParams, CodecVariant, DEFAULT_DATA_BLOCKS, DEFAULT_LEFT_DEGREE,
        DEFAULT_PARITY_BLOCKS, DEFAULT_SEED,
    },
    coding::{Coder, Decoder, Octets},
    errors::{Error, Result},
    serialize::write_json_lines,
    simulate::{SimulationConfig, simulate},
};

/// Parameters of the code, shared by every subcommand
#[derive(Args, Debug)]
struct CodeArgs {
    /// Number of data blocks (`k`)
    #[arg(short = 'k', long, default_value_t = DEFAULT_DATA_BLOCKS, help = "Number of data blocks k")]
    data_blocks: usize,

    /// Number of parity blocks (`m`)
    #[arg(short = 'm', long, default_value_t = DEFAULT_PARITY_BLOCKS, help = "Number of parity blocks m")]
    parity_blocks: usize,

    /// Number of checks each data block takes part in
    #[arg(short = 'l', long, default_value_t = DEFAULT_LEFT_DEGREE, help = "Left degree of data blocks")]
    left_degree: usize,

    /// Seed of the parity-check matrix, must match between coder and decoder
    #[arg(long, default_value_t = DEFAULT_SEED, help = "Matrix seed")]
    seed: u32,

    /// Wiring of the parity blocks
    #[arg(long, default_value_t = CodecVariant::Staircase, help = "ldgm, staircase or triangle")]
    variant: CodecVariant,

    /// JSON object with every code parameter, overriding the flags above.
    ///
    /// Example: `{"data_blocks": 8, "parity_blocks": 16, "left_degree": 3,
    /// "seed": 21, "variant": "staircase"}`
    #[arg(long, help = "JSON code parameters")]
    params: Option<String>,
}

impl CodeArgs {
    fn params(&self) -> Result<CodeParams> {
        let params = match &self.params {
            Some(json) => json.parse::<CodeParams>()?,
            None => CodeParams::new(
                self.data_blocks,
                self.parity_blocks,
                self.left_degree,
                self.seed,
                self.variant,
            )?,
        };
        info!("Data blocks (k): {}", params.data_blocks);
        info!("Parity blocks (m): {}", params.parity_blocks);
        info!("Left degree: {}", params.left_degree);
        info!("Seed: {}", params.seed);
        info!("Variant: {}", params.variant);
        Ok(params)
    }
}

/// Command-line interface structure
#[derive(Parser, Debug)]
#[command(about = "LDGM Staircase/Triangle erasure coding of files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for the CLI
#[derive(Subcommand, Debug)]
enum Commands {
    /// Code a file into `k + m` block files.
    ///
    /// Block `i` is written to `<stem>-<i>` with `i` on four digits. Any
    /// decodable subset of the blocks rebuilds the file.
    ///
    /// Example:
    /// ```
    /// encode -k 8 -m 16 notes.txt notes
    /// ```
    Encode {
        /// File to code
        input: PathBuf,

        /// Prefix of the block files
        stem: String,

        /// Print a hex dump of every block
        #[arg(long, help = "Dump the blocks in hexadecimal")]
        dump: bool,

        #[command(flatten)]
        code: CodeArgs,
    },
    /// Rebuild a file from whichever of its block files exist.
    ///
    /// Reads `<stem>-0000`, `<stem>-0001`, ... until the file is rebuilt, and
    /// writes it to `<stem>.recovered` unless told otherwise.
    ///
    /// Example:
    /// ```
    /// decode -k 8 -m 16 notes
    /// ```
    Decode {
        /// Prefix of the block files
        stem: String,

        /// Output file
        #[arg(short, long, help = "Output file path (default: <stem>.recovered)")]
        output: Option<PathBuf>,

        #[command(flatten)]
        code: CodeArgs,
    },
    /// Estimate decoding performance on random data.
    ///
    /// Prints a JSON report with the mean inefficiency ratio (packets needed
    /// divided by `k`) and the distribution of decoding steps, or with
    /// `--curve` the decoding failure rate for each number of received
    /// packets, one JSON object per line.
    ///
    /// Example:
    /// ```
    /// simulate -k 40 -m 20 --trials 1000 --curve
    /// ```
    Simulate {
        /// Packet size in bytes
        #[arg(short, long, default_value_t = 64, help = "Packet size in bytes")]
        block_size: usize,

        /// Number of trials
        #[arg(short, long, default_value_t = 1000, help = "Number of trials")]
        trials: usize,

        /// Seed of the trials
        #[arg(long, default_value_t = 0, help = "Seed of the trial generators")]
        trial_seed: u64,

        /// Use a new matrix for every trial
        #[arg(long, help = "Draw a new matrix seed for every trial")]
        vary_matrix: bool,

        /// Output the failure curve instead of the report
        #[arg(long, help = "Print failure rates per number of received packets")]
        curve: bool,

        /// Optional output file (JSON format)
        #[arg(short, long, help = "Output file path (JSON format)")]
        output: Option<PathBuf>,

        #[command(flatten)]
        code: CodeArgs,
    },
    /// Compute the degree distributions of the parity-check matrix.
    ///
    /// Example:
    /// ```
    /// degrees -k 40 -m 20 -l 7 --variant triangle
    /// ```
    Degrees {
        /// Also print the matrix, one row per line
        #[arg(long, help = "Print the matrix on stderr")]
        matrix: bool,

        #[command(flatten)]
        code: CodeArgs,
    },
}

fn block_path(stem: &str, seq: usize) -> String {
    format!("{}-{:04}", stem, seq)
}

fn output_writer(output: Option<PathBuf>) -> Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => {
            info!("Output file: {}", path.display());
            Box::new(File::create(path)?)
        }
        None => Box::new(io::stdout()),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::init();

    match cli.command {
        Commands::Encode {
            input,
            stem,
            dump,
            code,
        } => {
            let params = code.params()?;
            let data = fs::read(&input)?;
            info!("Input file: {} ({} bytes)", input.display(), data.len());

            let blocks = Coder::new(params).encode(&data)?;
            for (seq, block) in blocks.iter().enumerate() {
                fs::write(block_path(&stem, seq), block)?;
                if dump {
                    println!("{}:\n{}", block_path(&stem, seq), Octets(block));
                }
            }
            info!(
                "Wrote {} blocks of {} bytes to {}-NNNN",
                blocks.len(),
                blocks.block_len(),
                stem
            );
        }
        Commands::Decode { stem, output, code } => {
            let params = code.params()?;
            let mut decoder: Option<Decoder> = None;
            let mut recovered = None;
            for seq in 0..params.total_blocks() {
                let path = block_path(&stem, seq);
                let block = match fs::read(&path) {
                    Ok(block) => block,
                    Err(e) => {
                        warn!("Unable to read {}: {}", path, e);
                        continue;
                    }
                };
                if decoder.is_none() {
                    decoder = Decoder::open(params, &block)?;
                }
                let Some(decoder) = decoder.as_mut() else {
                    continue;
                };
                match decoder.push_block(&block) {
                    Ok(true) => {
                        recovered = decoder.recovered();
                        break;
                    }
                    Ok(false) => {}
                    Err(Error::Format(msg)) => warn!("Skipping {}: {}", path, msg),
                    Err(e) => return Err(e),
                }
            }

            let used = decoder.as_ref().map_or(0, Decoder::blocks_used);
            let known = decoder.as_ref().map_or(0, Decoder::data_blocks_known);
            let data = recovered.ok_or_else(|| {
                Error::format(format!(
                    "{} blocks are not enough to rebuild the file ({} of {} data blocks known)",
                    used, known, params.data_blocks
                ))
            })?;
            info!("Recovered {} bytes after reading {} blocks", data.len(), used);
            let path = output.unwrap_or_else(|| PathBuf::from(format!("{}.recovered", stem)));
            fs::write(&path, data)?;
            info!("Output file: {}", path.display());
        }
        Commands::Simulate {
            block_size,
            trials,
            trial_seed,
            vary_matrix,
            curve,
            output,
            code,
        } => {
            let config = SimulationConfig {
                params: code.params()?,
                block_size,
                trials,
                seed: trial_seed,
                vary_matrix,
            };
            info!("Block size: {}", block_size);
            info!("Trials: {}", trials);

            let report = simulate(&config)?;
            info!("Mean inefficiency ratio: {:.4}", report.mean_inefficiency);

            let mut writer = output_writer(output)?;
            if curve {
                write_json_lines(report.failure_curve().into_iter(), &mut writer)?;
            } else {
                let json_output = serde_json::to_string_pretty(&report)
                    .map_err(|e| Error::parse(format!("JSON serialization failed: {}", e)))?;
                writeln!(writer, "{}", json_output)?;
            }
        }
        Commands::Degrees { matrix, code } => {
            let params = code.params()?;
            let (pchk, report) = create_pchk_matrix_with_report(
                params.parity_blocks,
                params.total_blocks(),
                params.left_degree,
                params.seed,
                params.variant,
            )?;
            info!("Construction: {:?}", report);
            if matrix {
                eprint!("{}", pchk);
            }

            let degrees = CodeDegrees::compute_from_matrix(&pchk, params.parity_blocks);
            let json = serde_json::to_string(&degrees)
                .map_err(|e| Error::parse(format!("Failed to serialize degrees: {}", e)))?;
            println!("{}", json);
        }
    }
    Ok(())
}
