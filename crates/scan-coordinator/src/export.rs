use std::io::Write;
use std::path::Path;

use pmcc_core::{OptionChain, ScanResults, Symbol};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize artifact: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write CSV row: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to persist temp file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Writes `results` as JSON to `json_path` and as a flattened one-row-per-
/// opportunity table to `csv_path`. Both go through a `NamedTempFile` in the
/// target directory and `persist()` so a reader never observes a
/// partially-written artifact (§6: exported artifacts).
pub fn write_artifacts(results: &ScanResults, json_path: &Path, csv_path: &Path) -> Result<(), ExportError> {
    write_json(results, json_path)?;
    write_csv(results, csv_path)?;
    Ok(())
}

/// Optional side artifact (Open Question: `include_full_chain_in_artifact`):
/// the raw option chains retained during analysis, keyed by symbol.
/// `ScanResults` itself never carries this — it's a companion file so the
/// documented artifact shape (§6) stays exactly `ScanResults`.
pub fn write_chains_artifact(
    chains: &std::collections::HashMap<Symbol, OptionChain>,
    path: &Path,
) -> Result<(), ExportError> {
    write_json(chains, path)
}

fn write_json<T: serde::Serialize>(value: &T, path: &Path) -> Result<(), ExportError> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

fn write_csv(results: &ScanResults, path: &Path) -> Result<(), ExportError> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = csv::Writer::from_writer(&tmp);
        writer.write_record([
            "symbol",
            "underlying_price",
            "long_strike",
            "long_expiration",
            "long_delta",
            "short_strike",
            "short_expiration",
            "short_delta",
            "net_debit",
            "max_profit",
            "max_loss",
            "breakeven_price",
            "risk_reward_ratio",
            "traditional_score",
            "liquidity_score",
            "ai_score",
            "recommendation",
            "combined_score",
        ])?;

        for opp in &results.opportunities {
            let pmcc = &opp.pmcc;
            writer.write_record([
                pmcc.symbol.as_str().to_string(),
                pmcc.underlying_price.to_string(),
                pmcc.long_leaps.strike.to_string(),
                pmcc.long_leaps.expiration_date.to_string(),
                pmcc.long_leaps.delta.map(|d| d.to_string()).unwrap_or_default(),
                pmcc.short_call.strike.to_string(),
                pmcc.short_call.expiration_date.to_string(),
                pmcc.short_call.delta.map(|d| d.to_string()).unwrap_or_default(),
                pmcc.net_debit.to_string(),
                pmcc.max_profit.to_string(),
                pmcc.max_loss.to_string(),
                pmcc.breakeven_price.to_string(),
                pmcc.risk_reward_ratio.to_string(),
                pmcc.traditional_score.to_string(),
                pmcc.liquidity_score.to_string(),
                opp.ai.as_ref().map(|a| a.ai_score.to_string()).unwrap_or_default(),
                opp.ai.as_ref().map(|a| format!("{:?}", a.recommendation)).unwrap_or_default(),
                opp.combined_score.to_string(),
            ])?;
        }
        writer.flush()?;
    }
    tmp.persist(path)?;
    Ok(())
}
