//! Parsing des lignes d'une table de points
//!
//! L'en-tête résout la position des colonnes via une table d'alias;
//! les lignes de données sont ensuite parsées en parallèle (l'ordre du
//! fichier est préservé), puis une passe séquentielle détecte les
//! identifiants dupliqués.

use std::collections::HashMap;

use memchr::{memchr, memchr_iter};
use rayon::prelude::*;
use tracing::debug;

use crate::types::{
    ColumnAliases, ColumnMap, DecimalSeparator, Delimiter, ParseOptions, ParseResult,
    RejectReason, RejectedRow, RowWarning, SurveyRecord,
};
use crate::PnezdError;

/// Marqueur conventionnel: le client encode parfois l'origine locale
/// comme pseudo-point avec ce code. Jamais traité comme donnée.
const ORIGIN_MARKER: &str = "ORIGIN";

/// Issue du parsing d'une ligne de données
#[derive(Debug)]
enum RowOutcome {
    Record(Box<SurveyRecord>, Option<RowWarning>),
    OriginMarker(RowWarning),
    Reject(RejectedRow),
    Blank,
}

/// Parse le contenu décodé d'une table de points
pub fn parse_content(content: &str, options: &ParseOptions) -> Result<ParseResult, PnezdError> {
    let lines = split_lines(content);

    // Première ligne non vide = en-tête
    let header = lines
        .iter()
        .find(|(_, line)| !line.trim().is_empty())
        .copied()
        .ok_or_else(|| PnezdError::Empty("no header line found".to_string()))?;
    let (header_row, header_line) = header;

    let delimiter = resolve_delimiter(header_line, options.delimiter);
    if options.decimal == DecimalSeparator::Comma && delimiter == b',' {
        return Err(PnezdError::options(
            "decimal comma requires the ';' column delimiter",
        ));
    }

    let map = resolve_columns(header_line, delimiter, &options.aliases)?;
    let delimiter_char = delimiter as char;
    debug!(
        delimiter = %delimiter_char,
        id = map.id,
        x = map.x,
        y = map.y,
        "Header resolved"
    );

    let data: Vec<(usize, &str)> = lines
        .into_iter()
        .filter(|&(row, _)| row > header_row)
        .collect();

    if data.iter().all(|(_, line)| line.trim().is_empty()) {
        return Err(PnezdError::Empty("no data rows after header".to_string()));
    }

    // Parsing parallèle; collect() préserve l'ordre des lignes
    let decimal = options.decimal;
    let outcomes: Vec<RowOutcome> = data
        .par_iter()
        .map(|&(row, line)| parse_row(row, line, delimiter, decimal, &map))
        .collect();

    // Passe séquentielle: unicité des identifiants
    let mut records = Vec::new();
    let mut rejects = Vec::new();
    let mut warnings = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (outcome, (_, line)) in outcomes.into_iter().zip(data) {
        match outcome {
            RowOutcome::Record(record, warning) => match seen.get(&record.id) {
                Some(&first_row) => rejects.push(RejectedRow {
                    row: record.row,
                    raw: line.to_string(),
                    reason: RejectReason::DuplicateId { first_row },
                }),
                None => {
                    seen.insert(record.id.clone(), record.row);
                    if let Some(w) = warning {
                        warnings.push(w);
                    }
                    records.push(*record);
                }
            },
            RowOutcome::OriginMarker(warning) => warnings.push(warning),
            RowOutcome::Reject(reject) => rejects.push(reject),
            RowOutcome::Blank => {}
        }
    }

    Ok(ParseResult {
        records,
        rejects,
        warnings,
        delimiter: delimiter as char,
        decimal,
    })
}

/// Découpe le contenu en lignes numérotées (1-based), sans le `\r` final
fn split_lines(content: &str) -> Vec<(usize, &str)> {
    let bytes = content.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut row = 1;

    for end in memchr_iter(b'\n', bytes) {
        lines.push((row, trim_cr(&content[start..end])));
        start = end + 1;
        row += 1;
    }
    if start < content.len() {
        lines.push((row, trim_cr(&content[start..])));
    }

    lines
}

fn trim_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

/// Résout le délimiteur effectif depuis l'en-tête
fn resolve_delimiter(header: &str, configured: Delimiter) -> u8 {
    match configured {
        Delimiter::Comma => b',',
        Delimiter::Semicolon => b';',
        // Le `;` gagne s'il est présent: un export à virgule décimale
        // contient des virgules dans les nombres
        Delimiter::Auto => {
            if memchr(b';', header.as_bytes()).is_some() {
                b';'
            } else {
                b','
            }
        }
    }
}

/// Résout les indices de colonnes depuis la ligne d'en-tête
fn resolve_columns(
    header: &str,
    delimiter: u8,
    aliases: &ColumnAliases,
) -> Result<ColumnMap, PnezdError> {
    let fields = split_fields(header, delimiter);
    if fields.is_empty() {
        return Err(PnezdError::header("empty header line"));
    }

    let find = |names: &[String]| -> Option<usize> {
        fields.iter().position(|field| {
            names
                .iter()
                .any(|name| field.eq_ignore_ascii_case(name.as_str()))
        })
    };

    let id = find(&aliases.id).ok_or_else(|| PnezdError::MissingColumn("ID".to_string()))?;
    let x = find(&aliases.x).ok_or_else(|| PnezdError::MissingColumn("X".to_string()))?;
    let y = find(&aliases.y).ok_or_else(|| PnezdError::MissingColumn("Y".to_string()))?;

    Ok(ColumnMap {
        id,
        x,
        y,
        z: find(&aliases.z),
        description: find(&aliases.description),
        code: find(&aliases.code),
    })
}

/// Parse une ligne de données
fn parse_row(
    row: usize,
    line: &str,
    delimiter: u8,
    decimal: DecimalSeparator,
    map: &ColumnMap,
) -> RowOutcome {
    if line.trim().is_empty() {
        return RowOutcome::Blank;
    }

    let fields = split_fields(line, delimiter);
    let required_width = map.id.max(map.x).max(map.y) + 1;
    if fields.len() < required_width {
        return RowOutcome::Reject(RejectedRow {
            row,
            raw: line.to_string(),
            reason: RejectReason::ShortRow {
                expected: required_width,
                got: fields.len(),
            },
        });
    }

    let field = |idx: Option<usize>| -> &str {
        idx.and_then(|i| fields.get(i))
            .map(String::as_str)
            .unwrap_or("")
    };

    let id = fields[map.id].trim();
    if id.is_empty() {
        return RowOutcome::Reject(RejectedRow {
            row,
            raw: line.to_string(),
            reason: RejectReason::MissingId,
        });
    }

    let code = field(map.code).trim().to_string();
    if code == ORIGIN_MARKER {
        return RowOutcome::OriginMarker(RowWarning {
            row,
            id: id.to_string(),
            message: "origin marker row skipped".to_string(),
        });
    }

    let x = match parse_coordinate(&fields[map.x], decimal) {
        Coordinate::Value(v) => v,
        Coordinate::Missing => {
            return RowOutcome::Reject(RejectedRow {
                row,
                raw: line.to_string(),
                reason: RejectReason::MissingCoordinate { column: "X" },
            })
        }
        Coordinate::Invalid(value) => {
            return RowOutcome::Reject(RejectedRow {
                row,
                raw: line.to_string(),
                reason: RejectReason::InvalidCoordinate { column: "X", value },
            })
        }
    };

    let y = match parse_coordinate(&fields[map.y], decimal) {
        Coordinate::Value(v) => v,
        Coordinate::Missing => {
            return RowOutcome::Reject(RejectedRow {
                row,
                raw: line.to_string(),
                reason: RejectReason::MissingCoordinate { column: "Y" },
            })
        }
        Coordinate::Invalid(value) => {
            return RowOutcome::Reject(RejectedRow {
                row,
                raw: line.to_string(),
                reason: RejectReason::InvalidCoordinate { column: "Y", value },
            })
        }
    };

    let mut warning = None;
    let z = match parse_coordinate(field(map.z), decimal) {
        Coordinate::Value(v) => v,
        Coordinate::Missing => {
            warning = Some(RowWarning {
                row,
                id: id.to_string(),
                message: "missing Z, defaulted to 0".to_string(),
            });
            0.0
        }
        Coordinate::Invalid(value) => {
            return RowOutcome::Reject(RejectedRow {
                row,
                raw: line.to_string(),
                reason: RejectReason::InvalidCoordinate { column: "Z", value },
            })
        }
    };

    RowOutcome::Record(
        Box::new(SurveyRecord {
            id: id.to_string(),
            x,
            y,
            z,
            description: field(map.description).trim().to_string(),
            code,
            row,
        }),
        warning,
    )
}

/// Résultat du parsing d'un champ coordonnée
enum Coordinate {
    Value(f64),
    Missing,
    Invalid(String),
}

/// Parse une coordonnée avec tolérance au `+` initial et au séparateur
/// décimal configuré
fn parse_coordinate(raw: &str, decimal: DecimalSeparator) -> Coordinate {
    let v = raw.trim().trim_start_matches('+');
    if v.is_empty() {
        return Coordinate::Missing;
    }

    let parsed = match decimal {
        DecimalSeparator::Point => fast_float::parse::<f64, _>(v).ok(),
        DecimalSeparator::Comma => fast_float::parse::<f64, _>(v.replace(',', ".")).ok(),
    };

    match parsed {
        Some(n) if n.is_finite() => Coordinate::Value(n),
        _ => Coordinate::Invalid(raw.trim().to_string()),
    }
}

/// Découpe une ligne en champs, en honorant les champs entre guillemets
/// (`""` pour un guillemet littéral)
fn split_fields(line: &str, delimiter: u8) -> Vec<String> {
    let bytes = line.as_bytes();

    // Fast path: pas de guillemet dans la ligne
    if memchr(b'"', bytes).is_none() {
        return line
            .split(delimiter as char)
            .map(|s| s.trim().to_string())
            .collect();
    }

    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            c if c as u32 == delimiter as u32 && !in_quotes => {
                fields.push(current.trim().to_string());
                current = String::new();
            }
            c => current.push(c),
        }
    }
    fields.push(current.trim().to_string());

    fields
}
