//! Static HTML report generation from a confirmation-flow journal.

use gap_confirm::ReportData;
use std::io::Write;
use std::path::Path;

/// Render a static HTML report to `out_path`. Embeds the run JSON verbatim.
pub fn render_report(data: &ReportData, out_path: impl AsRef<Path>) -> Result<(), ReportError> {
    let html = build_html(data)?;
    let mut f = std::fs::File::create(out_path.as_ref()).map_err(ReportError::Io)?;
    f.write_all(html.as_bytes()).map_err(ReportError::Io)?;
    Ok(())
}

/// Build HTML string from report data (for testing or in-memory use).
pub fn build_html(data: &ReportData) -> Result<String, ReportError> {
    let json_embed = serde_json::to_string(&data).map_err(ReportError::Json)?;
    let json_escaped = escape_html(&json_embed);
    let counts = data.outcome_counts();

    let mut rows = String::new();
    for run in &data.runs {
        let uid = run.entity_uid.as_deref().unwrap_or("—");
        let tx = run.tx_hash.as_deref().unwrap_or("—");
        rows.push_str(&format!(
            r#"<tr><td>{op}</td><td>{kind}</td><td class="mono">{uid}</td><td class="mono">{tx}</td><td>{chain}</td><td class="{outcome}">{outcome}</td><td>{attempts}</td><td>{secs}s</td></tr>
"#,
            op = escape_html(&run.operation),
            kind = escape_html(&run.entity_kind),
            uid = escape_html(uid),
            tx = escape_html(tx),
            chain = run.chain_id,
            outcome = escape_html(&run.outcome),
            attempts = run.attempts,
            secs = (run.finished_utc - run.started_utc).max(0),
        ));
    }

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8"/>
<meta name="viewport" content="width=device-width,initial-scale=1"/>
<title>Attestation Confirmations</title>
<style>
:root {{ font-family: system-ui, sans-serif; background: #0f1419; color: #e6edf3; }}
body {{ max-width: 920px; margin: 0 auto; padding: 1.5rem; }}
h1 {{ font-size: 1.4rem; margin-bottom: 0.5rem; }}
h2 {{ font-size: 1.1rem; margin-top: 1.5rem; color: #8b949e; }}
.mono {{ font-family: ui-monospace, monospace; font-size: 0.85em; word-break: break-all; }}
.card {{ background: #161b22; border: 1px solid #30363d; border-radius: 6px; padding: 1rem; margin: 0.5rem 0; }}
table {{ width: 100%; border-collapse: collapse; font-size: 0.9rem; }}
th, td {{ text-align: left; padding: 0.4rem 0.6rem; border-bottom: 1px solid #30363d; }}
th {{ color: #8b949e; }}
.indexed {{ color: #3fb950; }}
.exhausted {{ color: #d29922; }}
.cancelled {{ color: #8b949e; }}
.error {{ color: #f85149; }}
.footer {{ margin-top: 2rem; font-size: 0.85rem; color: #8b949e; }}
</style>
</head>
<body>
<h1>Attestation Confirmation Report</h1>
<p>Generated: {created}</p>

<h2>At a glance</h2>
<div class="card">
  <p><span class="indexed">{indexed} indexed</span> · <span class="exhausted">{exhausted} exhausted</span> · <span class="cancelled">{cancelled} cancelled</span> · <span class="error">{error} failed</span> — {total} runs total.</p>
</div>

<h2>Runs</h2>
<div class="card">
<table>
<tr><th>Operation</th><th>Kind</th><th>UID</th><th>Tx hash</th><th>Chain</th><th>Outcome</th><th>Attempts</th><th>Took</th></tr>
{rows}</table>
</div>

<h2>Journal (embedded)</h2>
<div class="card">
  <p class="footer">The full journal slice is embedded below. Do not edit.</p>
  <script type="application/json" id="flow-journal">{json_embed}</script>
</div>

<div class="footer">
  <p>Generated by <code>gap-confirm report</code>. Read-side tool; no signing.</p>
</div>
</body>
</html>"#,
        created = escape_html(&data.generated_utc_rfc3339),
        indexed = counts.indexed,
        exhausted = counts.exhausted,
        cancelled = counts.cancelled,
        error = counts.error,
        total = data.runs.len(),
        rows = rows,
        json_embed = json_escaped,
    );
    Ok(html)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug)]
pub enum ReportError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::Io(e) => write!(f, "io: {}", e),
            ReportError::Json(e) => write!(f, "json: {}", e),
        }
    }
}

impl std::error::Error for ReportError {}
