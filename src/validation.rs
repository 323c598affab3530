//! Input validation for CCS operations. Everything here runs before any
//! registry call.

use crate::errors::AppError;
use crate::models::{RelationshipQuery, RelationshipQueryParams};
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

const DATE_FORMAT: &str = "%Y-%m-%d";

// Column widths of requisicao_relacionamento_ccs.
const MAX_PROCESS_NUMBER_LEN: usize = 50;
const MAX_REASON_LEN: usize = 255;
const MAX_CASE_LABEL_LEN: usize = 255;

static DOCUMENT_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([0-9]{11}|[0-9]{14})$").ok());

/// Strips CPF/CNPJ punctuation (`.`, `-`, `/`) and whitespace.
pub fn normalize_document(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '.' | '-' | '/') && !c.is_whitespace())
        .collect()
}

/// Returns the normalized CPF (11 digits) or CNPJ (14 digits).
pub fn validate_document(raw: &str) -> Result<String, AppError> {
    let document = normalize_document(raw);
    let valid = DOCUMENT_RE
        .as_ref()
        .is_some_and(|re| re.is_match(&document));
    if !valid {
        tracing::warn!("❌ Invalid CPF/CNPJ: {}", raw);
        return Err(AppError::BadRequest(
            "cpfCnpj must be a CPF (11 digits) or CNPJ (14 digits)".to_string(),
        ));
    }
    Ok(document)
}

pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| AppError::BadRequest(format!("{} must be a date in YYYY-MM-DD format", field)))
}

fn required<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str, AppError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::BadRequest(format!("{} is required", field))),
    }
}

fn within_length<'a>(field: &str, value: &'a str, max: usize) -> Result<&'a str, AppError> {
    if value.chars().count() > max {
        return Err(AppError::BadRequest(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(value)
}

/// Validates the query string of a relationship query.
pub fn validate_relationship_query(
    params: &RelationshipQueryParams,
) -> Result<RelationshipQuery, AppError> {
    let document = validate_document(required("cpfCnpj", &params.cpf_cnpj)?)?;

    let start_raw = required("dataInicio", &params.data_inicio)?;
    let end_raw = required("dataFim", &params.data_fim)?;
    let start = parse_date("dataInicio", start_raw)?;
    let end = parse_date("dataFim", end_raw)?;
    if start > end {
        return Err(AppError::BadRequest(
            "dataInicio must not be after dataFim".to_string(),
        ));
    }

    let process_number = within_length(
        "numProcesso",
        required("numProcesso", &params.num_processo)?,
        MAX_PROCESS_NUMBER_LEN,
    )?
    .to_string();
    let reason = within_length("motivo", required("motivo", &params.motivo)?, MAX_REASON_LEN)?
        .to_string();
    let case_label = within_length(
        "caso",
        params.caso.as_deref().map(str::trim).unwrap_or_default(),
        MAX_CASE_LABEL_LEN,
    )?
    .to_string();

    Ok(RelationshipQuery {
        document,
        start_date: start.format(DATE_FORMAT).to_string(),
        end_date: end.format(DATE_FORMAT).to_string(),
        process_number,
        reason,
        case_label,
    })
}

/// Parses the `idRelacionamento` query parameter.
pub fn parse_relationship_id(raw: Option<&str>) -> Result<i32, AppError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("idRelacionamento is required".to_string()))?;

    match raw.parse::<i32>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AppError::BadRequest(format!(
            "idRelacionamento must be a positive integer, got '{}'",
            raw
        ))),
    }
}
