//! Landing page
//!
//! One static page: upload form, the fingerprint uploads are checked against,
//! the caller's history, and a live feed of finished verifications.

use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::api::AuthenticatedUser;
use crate::AppState;

/// Error marker set by the upload redirect
pub const NO_FILE_ERROR: &str = "no-file";

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    pub error: Option<String>,
}

/// GET /
pub async fn index_page(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<IndexQuery>,
) -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");
    let git_hash = env!("GIT_HASH");
    let build_timestamp = env!("BUILD_TIMESTAMP");

    let error_banner = match query.error.as_deref() {
        Some(NO_FILE_ERROR) => {
            r#"<p class="error" id="upload-error">Choose a file before uploading.</p>"#.to_string()
        }
        Some(other) => format!(
            r#"<p class="error" id="upload-error">Upload failed: {}</p>"#,
            escape_html(other)
        ),
        None => String::new(),
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Packed Content Verifier</title>
    <style>
        body {{
            font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
            background-color: #1a1a1a;
            color: #e0e0e0;
            margin: 0;
            padding: 20px;
        }}
        h1 {{ color: #4a9eff; font-size: 26px; }}
        .build-info {{ color: #888; font-family: 'Courier New', monospace; font-size: 12px; }}
        .fingerprint {{ font-family: 'Courier New', monospace; color: #ffd54a; }}
        .error {{ color: #ff6b6b; }}
        table {{ border-collapse: collapse; margin-top: 20px; }}
        td, th {{ border-bottom: 1px solid #3a3a3a; padding: 6px 12px; text-align: left; }}
    </style>
</head>
<body>
    <h1>Packed Content Verifier</h1>
    <div class="build-info">v{version} ({git_hash}) built {build_timestamp}</div>
    <p>Signed in as <strong>{email}</strong></p>
    <p>Expected fingerprint: <span class="fingerprint" id="expected">{expected}</span></p>
    {error_banner}
    <form method="post" action="/upload" enctype="multipart/form-data">
        <input type="file" name="file">
        <button type="submit">Upload</button>
    </form>
    <table>
        <thead><tr><th>Submitted</th><th>Score</th><th>Fingerprint</th></tr></thead>
        <tbody id="results"></tbody>
    </table>
    <script>
        function addRow(result) {{
            const row = document.createElement('tr');
            for (const value of [result.submittedAt, result.score, result.fingerprint]) {{
                const cell = document.createElement('td');
                cell.textContent = value;
                row.appendChild(cell);
            }}
            document.getElementById('results').appendChild(row);
        }}
        fetch('/scores')
            .then(r => r.json())
            .then(results => results.forEach(addRow));
        const events = new EventSource('/events');
        events.addEventListener('VerificationCompleted', e => addRow(JSON.parse(e.data).result));
    </script>
</body>
</html>
"#,
        version = version,
        git_hash = git_hash,
        build_timestamp = build_timestamp,
        email = escape_html(&user.email),
        expected = escape_html(&state.config.pipeline.expected_fingerprint),
        error_banner = error_banner,
    );

    Html(html)
}

pub fn ui_routes() -> Router<AppState> {
    Router::new().route("/", get(index_page))
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
