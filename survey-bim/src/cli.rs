//! Définition et implémentation des commandes CLI
//!
//! Une commande par direction:
//! - `convert`: CSV → BIM + machine-control (fan-out complet)
//! - `to-bim`: CSV → modèle IFC seul
//! - `to-machine`: CSV → surface LandXML seule
//!
//! Code de sortie 0 en succès complet ou partiel, non nul sur erreur
//! fatale; le compte de rejets est toujours rapporté sur stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::info;

use crate::config::{CrsRegistry, RunConfig};
use crate::pipeline::{self, ArtifactKind};
use crate::report::RunStatus;
use crate::transform::OriginPolicy;
use pnezd::{DecimalSeparator, Delimiter, ParseOptions};

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a survey CSV into both BIM and machine-control artifacts
    Convert {
        #[command(flatten)]
        args: ConvertArgs,

        /// Also write the transformed points as GeoJSON (QA in GIS tools)
        #[arg(long)]
        geojson: bool,
    },

    /// Convert a survey CSV into a BIM (IFC 4X3) model only
    ToBim {
        #[command(flatten)]
        args: ConvertArgs,
    },

    /// Convert a survey CSV into a machine-control surface (LandXML) only
    ToMachine {
        #[command(flatten)]
        args: ConvertArgs,
    },
}

#[derive(Args)]
pub struct ConvertArgs {
    /// Input CSV file with survey points
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output directory for artifacts
    #[arg(short, long)]
    pub output: PathBuf,

    /// Source CRS: profile name, EPSG:nnnn or bare code
    #[arg(long, default_value = "wgs84")]
    pub source_crs: String,

    /// Target CRS: profile name, EPSG:nnnn or bare code
    #[arg(long, default_value = "sweref99_tm")]
    pub target_crs: String,

    /// Local origin policy: min, centroid or fixed
    #[arg(long, default_value = "min")]
    pub origin_policy: String,

    /// Fixed origin X (requires --origin-policy fixed)
    #[arg(long)]
    pub origin_x: Option<f64>,

    /// Fixed origin Y (requires --origin-policy fixed)
    #[arg(long)]
    pub origin_y: Option<f64>,

    /// Fixed origin Z (requires --origin-policy fixed)
    #[arg(long)]
    pub origin_z: Option<f64>,

    /// Coordinate precision (decimal places)
    #[arg(long, default_value_t = 3)]
    pub precision: u8,

    /// Column delimiter: auto, comma, semicolon
    #[arg(long, default_value = "auto")]
    pub delimiter: String,

    /// Numbers use a decimal comma (requires ';' delimiter)
    #[arg(long)]
    pub decimal_comma: bool,

    /// Path to a CRS registry JSON (overrides the embedded presets)
    #[arg(long)]
    pub crs_file: Option<PathBuf>,

    /// Project name embedded in the artifacts
    #[arg(long, default_value = "Survey Project")]
    pub project_name: String,

    /// Name of the triangulated surface
    #[arg(long, default_value = "Survey_Points_Surface")]
    pub surface_name: String,

    /// Write the run report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Exécute une commande de conversion
pub fn cmd_convert(args: &ConvertArgs, kinds: &[ArtifactKind]) -> Result<()> {
    let config = build_config(args)?;

    println!("=== Convert {} ===", args.input.display());
    println!("Output: {}", args.output.display());
    println!(
        "Source CRS: EPSG:{} ({})",
        config.source.epsg_code, config.source.name
    );
    println!(
        "Target CRS: EPSG:{} ({})",
        config.target.epsg_code, config.target.name
    );
    println!("Origin policy: {}", args.origin_policy);
    println!("Coordinate precision: {} decimals", config.precision);
    println!(
        "Artifacts: {}",
        kinds
            .iter()
            .map(|k| k.name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let (result, report) = pipeline::run(&config, &args.input, &args.output, kinds)
        .context("Pipeline run failed")?;

    report.display();

    if let Some(report_path) = &args.report {
        report
            .save_to_file(report_path)
            .context("Failed to save run report")?;
        info!(path = %report_path.display(), "Run report saved");
    }

    // Rejets toujours visibles sur stderr, même en code de sortie 0
    if !result.rejected.is_empty() {
        eprintln!(
            "{} row(s) rejected out of {} (see report for details)",
            result.rejected.len(),
            result.rejected.len() + result.accepted.len()
        );
    }

    if report.status == RunStatus::Failed {
        anyhow::bail!("Run failed: {}", report.summary());
    }

    Ok(())
}

/// Construit la configuration du run depuis les arguments CLI
fn build_config(args: &ConvertArgs) -> Result<RunConfig> {
    let registry = match &args.crs_file {
        Some(path) => CrsRegistry::load(path)?,
        None => CrsRegistry::from_env_or_embedded()?,
    };

    let source = registry.resolve(&args.source_crs)?;
    let target = registry.resolve(&args.target_crs)?;

    let origin = match args.origin_policy.as_str() {
        "min" => OriginPolicy::DeriveMin,
        "centroid" => OriginPolicy::DeriveCentroid,
        "fixed" => OriginPolicy::Fixed {
            x0: args
                .origin_x
                .context("--origin-x is required with --origin-policy fixed")?,
            y0: args
                .origin_y
                .context("--origin-y is required with --origin-policy fixed")?,
            z0: args.origin_z.unwrap_or(0.0),
        },
        other => anyhow::bail!(
            "Unknown origin policy '{}'. Use: min, centroid, fixed",
            other
        ),
    };

    let delimiter = match args.delimiter.as_str() {
        "auto" => Delimiter::Auto,
        "comma" => Delimiter::Comma,
        "semicolon" => Delimiter::Semicolon,
        other => anyhow::bail!(
            "Unknown delimiter '{}'. Use: auto, comma, semicolon",
            other
        ),
    };

    let parse = ParseOptions {
        delimiter,
        decimal: if args.decimal_comma {
            DecimalSeparator::Comma
        } else {
            DecimalSeparator::Point
        },
        ..ParseOptions::default()
    };

    Ok(RunConfig {
        source,
        target,
        origin,
        precision: args.precision,
        project_name: args.project_name.clone(),
        surface_name: args.surface_name.clone(),
        parse,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ConvertArgs {
        ConvertArgs {
            input: PathBuf::from("survey.csv"),
            output: PathBuf::from("out"),
            source_crs: "wgs84".to_string(),
            target_crs: "sweref99_tm".to_string(),
            origin_policy: "min".to_string(),
            origin_x: None,
            origin_y: None,
            origin_z: None,
            precision: 3,
            delimiter: "auto".to_string(),
            decimal_comma: false,
            crs_file: None,
            project_name: "Survey Project".to_string(),
            surface_name: "S".to_string(),
            report: None,
        }
    }

    #[test]
    fn test_build_config_defaults() {
        let config = build_config(&args()).unwrap();
        assert_eq!(config.source.epsg_code, 4326);
        assert_eq!(config.target.epsg_code, 3006);
        assert_eq!(config.origin, OriginPolicy::DeriveMin);
        assert_eq!(config.precision, 3);
    }

    #[test]
    fn test_build_config_fixed_origin_requires_components() {
        let mut a = args();
        a.origin_policy = "fixed".to_string();
        assert!(build_config(&a).is_err());

        a.origin_x = Some(157000.0);
        a.origin_y = Some(6407000.0);
        let config = build_config(&a).unwrap();
        assert_eq!(
            config.origin,
            OriginPolicy::Fixed {
                x0: 157000.0,
                y0: 6407000.0,
                z0: 0.0
            }
        );
    }

    #[test]
    fn test_build_config_unknown_policy_fails() {
        let mut a = args();
        a.origin_policy = "barycenter".to_string();
        assert!(build_config(&a).is_err());
    }

    #[test]
    fn test_build_config_unknown_delimiter_fails() {
        let mut a = args();
        a.delimiter = "tab".to_string();
        assert!(build_config(&a).is_err());
    }
}
