use pmcc_core::ScanResults;

/// Vendor-imposed length ceiling for the primary (chat) channel body.
pub const PRIMARY_BODY_LIMIT_CHARS: usize = 1500;

/// Concise, length-capped summary: top `top_n` opportunities by
/// `combined_score`, one line each. Pure function of `ScanResults` — no I/O,
/// no side effects, so it's trivially unit-testable and reusable across
/// channels that want the short form.
pub fn format_primary(results: &ScanResults, top_n: usize) -> String {
    let mut body = format!(
        "PMCC scan {} — {} opportunities ({} screened, {} errors)\n",
        short_id(results.scan_id),
        results.opportunities.len(),
        results.stats.screened,
        results.errors.len(),
    );

    for (i, opp) in results.opportunities.iter().take(top_n).enumerate() {
        let line = format!(
            "{}. {} ${:.2} | L{} /S{} {} | debit ${:.2} maxP ${:.2} | score {:.1}\n",
            i + 1,
            opp.pmcc.symbol,
            opp.pmcc.underlying_price,
            opp.pmcc.long_leaps.strike,
            opp.pmcc.short_call.strike,
            opp.pmcc.short_call.expiration_date,
            opp.pmcc.net_debit,
            opp.pmcc.max_profit,
            opp.combined_score,
        );
        if body.len() + line.len() > PRIMARY_BODY_LIMIT_CHARS {
            body.push_str("… (truncated)\n");
            break;
        }
        body.push_str(&line);
    }

    if results.opportunities.is_empty() {
        body.push_str("No opportunities passed scoring this run.\n");
    }

    body.truncate(PRIMARY_BODY_LIMIT_CHARS);
    body
}

pub struct SecondaryPayload {
    pub subject: String,
    pub html: String,
    pub text: String,
    pub json_attachment: Vec<u8>,
}

/// Long-form rendering: full per-opportunity detail (both legs, economics,
/// AI reasoning when present), plus the complete `ScanResults` JSON as an
/// attachment.
pub fn format_secondary(results: &ScanResults) -> SecondaryPayload {
    let subject = format!(
        "PMCC scan results — {} opportunities found",
        results.opportunities.len()
    );

    let mut text = format!(
        "PMCC Scan {}\nStarted: {}\nCompleted: {}\nScreened: {}, chains analyzed: {}, candidates found: {}, AI-analyzed: {}\n\n",
        results.scan_id,
        results.started_at,
        results.completed_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "in progress".to_string()),
        results.stats.screened,
        results.stats.chains_analyzed,
        results.stats.candidates_found,
        results.stats.ai_analyzed,
    );

    let mut rows_html = String::new();
    for opp in &results.opportunities {
        text.push_str(&format!(
            "{} — combined {:.2} (traditional {:.2}{})\n  Long {} exp {} delta {} | Short {} exp {} delta {}\n  Net debit ${:.2}  Max profit ${:.2}  Max loss ${:.2}  Breakeven ${:.2}\n",
            opp.pmcc.symbol,
            opp.combined_score,
            opp.pmcc.traditional_score,
            opp.ai.as_ref().map(|a| format!(", AI {:.2}", a.ai_score)).unwrap_or_default(),
            opp.pmcc.long_leaps.strike,
            opp.pmcc.long_leaps.expiration_date,
            opp.pmcc.long_leaps.delta.map(|d| d.to_string()).unwrap_or_else(|| "n/a".to_string()),
            opp.pmcc.short_call.strike,
            opp.pmcc.short_call.expiration_date,
            opp.pmcc.short_call.delta.map(|d| d.to_string()).unwrap_or_else(|| "n/a".to_string()),
            opp.pmcc.net_debit,
            opp.pmcc.max_profit,
            opp.pmcc.max_loss,
            opp.pmcc.breakeven_price,
        ));
        if let Some(ai) = &opp.ai {
            text.push_str(&format!(
                "  Recommendation: {:?} (confidence {:.0})\n  {}\n",
                ai.recommendation, ai.confidence, ai.reasoning
            ));
        }
        text.push('\n');

        rows_html.push_str(&format!(
            r#"<tr><td style="padding:6px 10px;font-weight:600;">{symbol}</td><td style="padding:6px 10px;">${underlying_price:.2}</td><td style="padding:6px 10px;">${long_strike} / {long_exp}</td><td style="padding:6px 10px;">${short_strike} / {short_exp}</td><td style="padding:6px 10px;">${net_debit:.2}</td><td style="padding:6px 10px;">${max_profit:.2}</td><td style="padding:6px 10px;font-weight:600;">{combined:.1}</td></tr>"#,
            symbol = opp.pmcc.symbol,
            underlying_price = opp.pmcc.underlying_price,
            long_strike = opp.pmcc.long_leaps.strike,
            long_exp = opp.pmcc.long_leaps.expiration_date,
            short_strike = opp.pmcc.short_call.strike,
            short_exp = opp.pmcc.short_call.expiration_date,
            net_debit = opp.pmcc.net_debit,
            max_profit = opp.pmcc.max_profit,
            combined = opp.combined_score,
        ));
    }

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;color:#1e293b;">
<h2>PMCC Scan Results</h2>
<p>{opp_count} opportunities from {screened} screened symbols.</p>
<table style="border-collapse:collapse;width:100%;">
  <thead><tr style="background:#f1f5f9;">
    <th style="padding:6px 10px;text-align:left;">Symbol</th>
    <th style="padding:6px 10px;text-align:left;">Price</th>
    <th style="padding:6px 10px;text-align:left;">Long</th>
    <th style="padding:6px 10px;text-align:left;">Short</th>
    <th style="padding:6px 10px;text-align:left;">Debit</th>
    <th style="padding:6px 10px;text-align:left;">Max profit</th>
    <th style="padding:6px 10px;text-align:left;">Score</th>
  </tr></thead>
  <tbody>{rows_html}</tbody>
</table>
<p style="color:#64748b;font-size:12px;">Full JSON results attached. Scan {scan_id}.</p>
</body>
</html>"#,
        opp_count = results.opportunities.len(),
        screened = results.stats.screened,
        scan_id = results.scan_id,
    );

    let json_attachment = serde_json::to_vec_pretty(results).unwrap_or_default();

    SecondaryPayload {
        subject,
        html,
        text,
        json_attachment,
    }
}

fn short_id(id: uuid::Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmcc_core::ScanResults;

    #[test]
    fn primary_format_respects_length_cap() {
        let results = ScanResults::new(serde_json::Value::Null);
        let body = format_primary(&results, 10);
        assert!(body.len() <= PRIMARY_BODY_LIMIT_CHARS);
    }

    #[test]
    fn primary_format_notes_empty_results() {
        let results = ScanResults::new(serde_json::Value::Null);
        let body = format_primary(&results, 10);
        assert!(body.contains("No opportunities"));
    }
}
