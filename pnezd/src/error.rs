//! Types d'erreurs pour le crate pnezd

use thiserror::Error;

/// Erreurs fatales pouvant survenir lors du parsing d'une table de points
///
/// Les lignes individuelles malformées ne passent jamais par ce type:
/// elles sont collectées comme rejets non fatals dans le `ParseResult`.
#[derive(Debug, Error)]
pub enum PnezdError {
    /// Erreur d'I/O lors de la lecture du fichier source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fichier vide ou réduit à l'en-tête
    #[error("Empty source: {0}")]
    Empty(String),

    /// En-tête illisible ou sans colonne exploitable
    #[error("Unreadable header: {0}")]
    HeaderUnreadable(String),

    /// Colonne obligatoire absente de l'en-tête
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// Combinaison d'options invalide
    #[error("Invalid parse options: {0}")]
    InvalidOptions(String),
}

impl PnezdError {
    /// Crée une erreur d'en-tête avec contexte
    pub fn header(reason: impl Into<String>) -> Self {
        Self::HeaderUnreadable(reason.into())
    }

    /// Crée une erreur d'options invalides
    pub fn options(reason: impl Into<String>) -> Self {
        Self::InvalidOptions(reason.into())
    }
}
