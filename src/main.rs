use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{info, warn};

use peril_pricing::error::{RequestError, Result};
use peril_pricing::request::{ErrorResponse, QuoteRequest, QuoteResponse};
use peril_pricing::sink::{NdjsonQuoteSink, QuoteSink};
use peril_pricing::tail_sim::{self, TailSimConfig};
use peril_pricing::{EngineConfig, PerilCatalog, PricingEngine, Regime, Settings};

#[derive(Parser)]
#[command(name = "peril-pricing")]
#[command(version, about = "Quote parametric peril cover from a hazard-curve catalog")]
struct Cli {
    /// Peril catalog (JSON)
    #[arg(long, default_value = "data/perils.v1.json")]
    catalog: PathBuf,

    /// Engine constants and request defaults (JSON)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Peril id to quote
    #[arg(long, required_unless_present_any = ["requests", "list"])]
    peril: Option<String>,

    #[arg(long)]
    regime: Option<Regime>,

    /// Policy limit in USD
    #[arg(long)]
    limit: Option<f64>,

    /// Attachment as a payout fraction (0..1)
    #[arg(long)]
    attachment: Option<f64>,

    #[arg(long)]
    tenor: Option<u32>,

    /// Current portfolio utilization (0..1)
    #[arg(long)]
    utilization: Option<f64>,

    /// Remaining TVaR99 headroom in USD
    #[arg(long)]
    headroom: Option<f64>,

    /// NDJSON file of quote requests, priced in parallel
    #[arg(long)]
    requests: Option<PathBuf>,

    /// Append priced quotes to this NDJSON file
    #[arg(long)]
    record: Option<PathBuf>,

    /// Replace the fixed TVaR gap with one simulated over N trials
    #[arg(long, value_name = "TRIALS")]
    simulate_gap: Option<usize>,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// List catalog peril ids and exit
    #[arg(long)]
    list: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = match &cli.settings {
        Some(path) => Settings::from_json_file(path)?,
        None => Settings::default(),
    };
    let catalog = PerilCatalog::from_json_file(&cli.catalog)?;

    if cli.list {
        for id in catalog.ids() {
            println!("{id}");
        }
        return Ok(());
    }

    let requests = match &cli.requests {
        Some(path) => read_requests(path)?,
        None => vec![QuoteRequest {
            peril_id: cli.peril.clone().unwrap_or_default(),
            regime: cli.regime,
            limit_usd: cli.limit,
            attachment_pct: cli.attachment,
            tenor_days: cli.tenor,
            utilization: cli.utilization,
            tvar99_headroom_usd: cli.headroom,
        }],
    };

    let mut resolved = Vec::with_capacity(requests.len());
    let mut failures: Vec<(usize, RequestError)> = Vec::new();
    for (i, req) in requests.iter().enumerate() {
        match req.resolve(&catalog, &settings.defaults) {
            Ok(input) => resolved.push((i, input)),
            Err(e) => {
                warn!(line = i + 1, peril = %req.peril_id, error = %e, "rejected quote request");
                failures.push((i, e));
            }
        }
    }

    let mut sink = match &cli.record {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let existing = count_lines(path)?;
            Some(NdjsonQuoteSink::starting_at(BufWriter::new(file), existing))
        }
        None => None,
    };

    let responses: Vec<(usize, QuoteResponse)> = match cli.simulate_gap {
        // the simulated gap is per cover, so each quote gets its own engine
        Some(trials) => resolved
            .into_iter()
            .map(|(i, input)| {
                let sim = TailSimConfig { trials, seed: cli.seed };
                let stats = tail_sim::estimate_tvar_gap(
                    &input.curve,
                    input.regime,
                    input.limit_usd,
                    input.attachment_pct,
                    &settings.engine,
                    &sim,
                );
                info!(peril = %input.peril_id, gap = stats.gap, tvar = stats.tvar, "using simulated TVaR gap");
                let engine = PricingEngine::with_config(EngineConfig { tvar_gap: stats.gap, ..settings.engine.clone() });
                let breakdown = engine.price(&input);
                (i, QuoteResponse { ok: true, input, breakdown })
            })
            .collect(),
        None => {
            let engine = PricingEngine::with_config(settings.engine.clone());
            let (idx, inputs): (Vec<usize>, Vec<_>) = resolved.into_iter().unzip();
            let breakdowns = engine.price_batch(&inputs);
            idx.into_iter()
                .zip(inputs.into_iter().zip(breakdowns))
                .map(|(i, (input, breakdown))| (i, QuoteResponse { ok: true, input, breakdown }))
                .collect()
        }
    };

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut responses = responses.into_iter().peekable();
    let mut failures = failures.into_iter();
    let mut first_failure: Option<RequestError> = None;
    // emit in request order, successes and failures interleaved
    for i in 0..requests.len() {
        if responses.peek().is_some_and(|(j, _)| *j == i) {
            if let Some((_, resp)) = responses.next() {
                if let Some(sink) = sink.as_mut() {
                    sink.record(&resp.input, &resp.breakdown)?;
                }
                serde_json::to_writer(&mut out, &resp)?;
            }
        } else if let Some((_, err)) = failures.next() {
            serde_json::to_writer(&mut out, &ErrorResponse::from(&err))?;
            first_failure.get_or_insert(err);
        }
        writeln!(out)?;
    }
    out.flush()?;
    if let Some(sink) = sink.as_mut() {
        sink.flush()?;
    }

    match first_failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn read_requests(path: &Path) -> Result<Vec<QuoteRequest>> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

fn count_lines(path: &Path) -> Result<u64> {
    let reader = BufReader::new(File::open(path)?);
    let mut n = 0;
    for line in reader.lines() {
        if !line?.trim().is_empty() {
            n += 1;
        }
    }
    Ok(n)
}
