//! # survey-bim
//!
//! Conversion de levés topographiques CSV en deux livrables durables:
//! un modèle BIM géoréférencé (IFC 4X3) et une surface triangulée
//! consommable par le matériel de guidage d'engins (LandXML 1.2).
//!
//! ## Pipeline
//!
//! Ingestion → Transformation (reprojection EPSG + origine locale) →
//! Triangulation Delaunay 2.5D → fan-out (BIM | machine-control).
//! Les métadonnées par point (ID, description, code) traversent les
//! deux frontières de format sans altération, et `local + origine`
//! reconstruit la coordonnée monde à la précision d'arrondi près.
//!
//! ## Usage CLI
//!
//! ```bash
//! # Conversion complète (IFC + LandXML)
//! survey-bim convert --input survey.csv --output ./out --target-crs sweref99_tm
//!
//! # Une seule direction
//! survey-bim to-bim --input survey.csv --output ./out
//! survey-bim to-machine --input survey.csv --output ./out --precision 3
//! ```

pub mod bim;
pub mod cli;
pub mod config;
pub mod export;
pub mod pipeline;
pub mod report;
pub mod tin;
pub mod transform;

pub use config::{CrsDescriptor, CrsRegistry, RunConfig};
pub use pipeline::{run, ArtifactKind, FatalError, PipelineResult, WriteStatus};
pub use report::{RunReport, RunStatus};
pub use tin::Surface;
pub use transform::{LocalOrigin, OriginPolicy};
