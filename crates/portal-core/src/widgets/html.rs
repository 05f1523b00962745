use crate::model::{RecordStatus, priority_label};

/// Escapes the five HTML-significant characters.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            other => out.push(other),
        }
    }
    out
}

pub fn opt(text: Option<&str>) -> String {
    match text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => escape(t),
        None => "-".to_string(),
    }
}

pub fn loading(message: &str) -> String {
    format!(r#"<div class="loading-spinner">{}</div>"#, escape(message))
}

pub fn no_data(message: &str) -> String {
    format!(r#"<p class="no-data">{}</p>"#, escape(message))
}

pub fn status_badge(status: RecordStatus) -> String {
    format!(
        r#"<span class="status-badge status-{}" style="background-color: {}">{}</span>"#,
        status.as_str(),
        status.color(),
        escape(status.label())
    )
}

pub fn priority_badge(level: u8) -> String {
    format!(
        r#"<span class="priority-badge priority-{level}">{}</span>"#,
        escape(priority_label(level))
    )
}

/// Visible error panel with a manual retry button.
pub fn error_panel(title: &str, message: &str, status: Option<u16>) -> String {
    let code = status
        .map(|s| format!(r#"<p class="error-code">HTTP {s}</p>"#))
        .unwrap_or_default();
    format!(
        r#"<div class="error-container">
  <h2>{}</h2>
  <p>{}</p>
  {code}
  <button class="btn btn-primary" data-action="reload">Yeniden Dene</button>
</div>"#,
        escape(title),
        escape(message)
    )
}

/// A hidden-by-default modal shell; `open` drops the `hidden` class.
pub fn modal(id: &str, title: &str, body: &str, open: bool) -> String {
    let hidden = if open { "" } else { " hidden" };
    format!(
        r#"<div id="{id}" class="modal{hidden}">
  <div class="modal-overlay" data-action="close-modal"></div>
  <div class="modal-content">
    <div class="modal-header">
      <h2>{}</h2>
      <button class="modal-close-btn" data-action="close-modal">✕</button>
    </div>
    <div class="modal-body">{body}</div>
  </div>
</div>"#,
        escape(title)
    )
}

/// `<table class="data-table">` from pre-rendered cells.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let head = headers
        .iter()
        .map(|h| format!("<th>{}</th>", escape(h)))
        .collect::<String>();
    let body = rows
        .iter()
        .map(|cells| {
            let tds = cells
                .iter()
                .map(|c| format!("<td>{c}</td>"))
                .collect::<String>();
            format!("<tr>{tds}</tr>")
        })
        .collect::<String>();
    format!(
        r#"<table class="data-table"><thead><tr>{head}</tr></thead><tbody>{body}</tbody></table>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_and_quotes() {
        assert_eq!(
            escape(r#"<b class="x">Tom's & Jerry</b>"#),
            "&lt;b class=&quot;x&quot;&gt;Tom&#039;s &amp; Jerry&lt;/b&gt;"
        );
        assert_eq!(opt(Some("  ")), "-");
    }

    #[test]
    fn error_panel_carries_status_and_retry() {
        let html = error_panel("Sayfa yüklenemedi", "boom <script>", Some(403));
        assert!(html.contains("HTTP 403"));
        assert!(html.contains(r#"data-action="reload""#));
        assert!(html.contains("boom &lt;script&gt;"));
    }
}
