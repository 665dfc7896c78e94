//! # pnezd
//!
//! Parser pour les tables de points topographiques exportées par les
//! stations totales et les logiciels de levé (famille PNEZD:
//! `ID,X,Y,Z,Description,Code`).
//!
//! ## Features
//!
//! - Détection automatique du délimiteur (`,` ou `;`) et support de la
//!   virgule décimale
//! - Résolution des colonnes par table d'alias (`Easting`, `Northing`,
//!   `Elev`, ...)
//! - Validation à l'ingestion: rejets non fatals par ligne, jamais de
//!   donnée silencieusement perdue
//! - Décodage UTF-8 validé avec `simdutf8`, repli Windows-1252
//! - Parsing des lignes en parallèle avec `rayon`, ordre préservé
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pnezd::{parse, ParseOptions};
//! use std::path::Path;
//!
//! let result = parse(Path::new("survey.csv"), &ParseOptions::default())?;
//! println!("{} points, {} rejets", result.records.len(), result.rejects.len());
//!
//! for reject in &result.rejects {
//!     println!("ligne {}: {}", reject.row, reject.reason);
//! }
//! ```

pub mod error;
pub mod parser;
pub mod types;

pub use error::PnezdError;
pub use types::{
    ColumnAliases, ColumnMap, DecimalSeparator, Delimiter, ParseOptions, ParseResult,
    RejectReason, RejectedRow, RowWarning, SurveyRecord,
};

use std::borrow::Cow;
use std::path::Path;

use tracing::debug;

/// Parse une table de points depuis un fichier.
///
/// # Errors
///
/// Retourne `PnezdError` si le fichier est illisible, vide, ou si
/// l'en-tête ne contient pas les colonnes obligatoires. Les lignes
/// malformées ne sont pas des erreurs: elles sont collectées dans
/// `ParseResult::rejects`.
pub fn parse(path: &Path, options: &ParseOptions) -> Result<ParseResult, PnezdError> {
    let data = std::fs::read(path)?;
    let content = decode(&data);
    debug!(
        path = %path.display(),
        bytes = data.len(),
        "Parsing survey table"
    );
    parser::parse_content(&content, options)
}

/// Parse une table de points depuis une chaîne déjà décodée
pub fn parse_str(content: &str, options: &ParseOptions) -> Result<ParseResult, PnezdError> {
    parser::parse_content(content, options)
}

/// Décode les bytes source: UTF-8 validé via SIMD, sinon Windows-1252
/// (encodage courant des exports de stations totales)
fn decode(data: &[u8]) -> Cow<'_, str> {
    match simdutf8::basic::from_utf8(data) {
        Ok(s) => Cow::Borrowed(s.strip_prefix('\u{feff}').unwrap_or(s)),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(data);
            Cow::Owned(decoded.into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8() {
        let data = "ID,X,Y\n1,2.0,3.0\n".as_bytes();
        let content = decode(data);
        assert!(content.starts_with("ID"));
    }

    #[test]
    fn test_decode_strips_bom() {
        let mut data = vec![0xEF, 0xBB, 0xBF];
        data.extend_from_slice(b"ID,X,Y\n");
        let content = decode(&data);
        assert!(content.starts_with("ID"));
    }

    #[test]
    fn test_decode_windows_1252_fallback() {
        // 0xE5 = 'å' en Windows-1252, invalide en UTF-8
        let data = b"ID,X,Y,Description\n1,2.0,3.0,br\xE5dd\n";
        let content = decode(data);
        assert!(content.contains("brådd"));
    }
}
