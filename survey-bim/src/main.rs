//! Point d'entrée CLI pour survey-bim

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use survey_bim::cli::{cmd_convert, Commands};
use survey_bim::pipeline::ArtifactKind;

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant ou parent
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

/// Convertir des levés topographiques CSV en modèle BIM et surface
/// machine-control
#[derive(Parser)]
#[command(name = "survey-bim")]
#[command(author, version)]
#[command(about = "Convertir des levés topographiques CSV en modèle IFC et surface LandXML")]
#[command(
    long_about = "Pipeline de conversion de points de levé: ingestion CSV, reprojection \
                  vers le CRS cible, ancrage à une origine locale, triangulation Delaunay, \
                  puis export IFC 4X3 (BIM) et LandXML 1.2 (guidage d'engins)."
)]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    // Configurer le logging
    init_logging(cli.verbose, cli.quiet);

    match &cli.command {
        Commands::Convert { args, geojson } => {
            info!(input = %args.input.display(), "Convert to BIM + machine-control");
            let mut kinds = vec![ArtifactKind::Bim, ArtifactKind::MachineControl];
            if *geojson {
                kinds.push(ArtifactKind::GeoJson);
            }
            cmd_convert(args, &kinds)?;
        }
        Commands::ToBim { args } => {
            info!(input = %args.input.display(), "Convert to BIM");
            cmd_convert(args, &[ArtifactKind::Bim])?;
        }
        Commands::ToMachine { args } => {
            info!(input = %args.input.display(), "Convert to machine-control");
            cmd_convert(args, &[ArtifactKind::MachineControl])?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
