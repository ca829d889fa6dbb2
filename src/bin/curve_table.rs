use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;

use peril_pricing::exceedance::annualized_exceedance_probability;
use peril_pricing::payout::payout_fraction;
use peril_pricing::{PerilCatalog, PricingEngine, Regime, Settings};

/// Dump the pricing grid of one peril as NDJSON rows on stdout, with a
/// per-regime summary on stderr.
#[derive(Parser)]
#[command(name = "curve_table")]
#[command(version, about = "Tabulate exceedance, payout and loss density over the pricing grid")]
struct Cli {
    /// Peril id
    peril: String,

    #[arg(long, default_value = "data/perils.v1.json")]
    catalog: PathBuf,

    #[arg(long)]
    settings: Option<PathBuf>,

    /// Restrict to one regime (default: every regime the peril declares)
    #[arg(long)]
    regime: Option<Regime>,
}

#[derive(Serialize)]
struct Row {
    regime: Regime,
    intensity: f64,
    exceedance: f64,
    payout: f64,
    density: f64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => Settings::from_json_file(path).unwrap_or_else(|e| fail(&e)),
        None => Settings::default(),
    };
    let catalog = PerilCatalog::from_json_file(&cli.catalog).unwrap_or_else(|e| fail(&e));
    let Some(peril) = catalog.get(&cli.peril) else {
        fail(&format!("unknown peril '{}'", cli.peril));
    };

    let engine = PricingEngine::with_config(settings.engine.clone());
    let grid = engine.intensity_grid(&peril);
    let regimes: Vec<Regime> = match cli.regime {
        Some(r) => vec![r],
        None => peril.regimes.clone(),
    };

    for &regime in &regimes {
        let mut mass = 0.0_f64;
        let mut peak = (0.0_f64, 0.0_f64);
        for w in grid.windows(2) {
            let (a, b) = (w[0], w[1]);
            mass += 0.5
                * (engine.loss_density(&peril, regime, a) + engine.loss_density(&peril, regime, b))
                * (b - a);
        }
        for &i in &grid {
            let row = Row {
                regime,
                intensity: i,
                exceedance: annualized_exceedance_probability(&peril.curve_params, regime, i, engine.config()),
                payout: payout_fraction(i, &peril.payout),
                density: engine.loss_density(&peril, regime, i),
            };
            if row.density > peak.1 {
                peak = (i, row.density);
            }
            println!("{}", serde_json::to_string(&row).expect("serialisation failed"));
        }

        let el_per_unit = engine.expected_loss(&peril, regime, 1.0, 0.0);
        eprintln!(
            "  regime={regime:<8}  points={:>4}  density_mass={mass:.4}  peak_density={:.3}@{:.4}  el_per_unit_limit={el_per_unit:.6}",
            grid.len(),
            peak.1,
            peak.0,
        );
    }

    eprintln!(
        "curve_table: {} ({}), payout={}, i_max={}",
        peril.id,
        peril.display_name,
        peril.payout.shape_name(),
        engine.intensity_max(&peril)
    );
}

fn fail(e: &dyn std::fmt::Display) -> ! {
    eprintln!("curve_table: {e}");
    std::process::exit(1);
}
