//! Fallback page shown when the app cannot be loaded

use std::fmt::Write as _;

use super::{BuildFlavor, LoadError};

/// Why the fallback page is shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackCause {
    /// Main-frame network failure
    Network(LoadError),
    /// Main-frame HTTP error status
    Http { status: u16, reason: String },
    /// The page loaded without meaningful content
    Blank,
}

impl FallbackCause {
    const fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::Network(LoadError::HostLookup | LoadError::Connect | LoadError::Timeout)
        )
    }

    fn description(&self) -> String {
        match self {
            Self::Network(LoadError::Other { description }) if !description.trim().is_empty() => {
                description.clone()
            }
            Self::Network(e) => e.to_string(),
            Self::Http { status, reason } if reason.is_empty() => format!("HTTP {status}"),
            Self::Http { status, reason } => format!("HTTP {status} {reason}"),
            Self::Blank => "Unbekannter Fehler".to_string(),
        }
    }
}

/// Escape text for interpolation into HTML element or attribute content
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Title, detail line and troubleshooting steps; all plain text
fn content(cause: &FallbackCause, flavor: BuildFlavor, server_url: &str) -> (&'static str, String, Vec<String>) {
    if cause.is_connection_failure() {
        return match flavor {
            BuildFlavor::Debug => (
                "Server nicht erreichbar",
                format!("Verbindung zu {server_url} fehlgeschlagen"),
                vec![
                    "Starten Sie den Backend-Server mit `euaitalk serve`".to_string(),
                    "Überprüfen Sie die Server-URL in den Einstellungen".to_string(),
                    "Stellen Sie sicher, dass Ihr Gerät/Emulator mit dem Netzwerk verbunden ist"
                        .to_string(),
                    "Für echte Geräte: Verwenden Sie die lokale IP-Adresse (z.B. 192.168.1.100:3000)"
                        .to_string(),
                ],
            ),
            BuildFlavor::Release => (
                "Server nicht erreichbar",
                "Die Verbindung zum Server konnte nicht hergestellt werden".to_string(),
                vec![
                    "Stellen Sie sicher, dass der Server gestartet ist".to_string(),
                    "Überprüfen Sie Ihre Internetverbindung".to_string(),
                    "Die Server-URL könnte falsch konfiguriert sein".to_string(),
                ],
            ),
        };
    }

    (
        "Fehler beim Laden",
        cause.description(),
        vec![
            "Versuchen Sie es erneut".to_string(),
            "Überprüfen Sie Ihre Internetverbindung".to_string(),
        ],
    )
}

/// Render a step, turning `backtick` spans into escaped `<code>` elements
fn render_step(step: &str) -> String {
    let mut html = String::new();
    for (i, part) in step.split('`').enumerate() {
        if i % 2 == 1 {
            let _ = write!(html, "<code>{}</code>", escape_html(part));
        } else {
            html.push_str(&escape_html(part));
        }
    }
    html
}

/// Render the full fallback document
///
/// Every interpolated value is escaped; only the fixed markup is raw.
#[must_use]
pub fn render_fallback_page(
    cause: &FallbackCause,
    flavor: BuildFlavor,
    server_url: &str,
    version: &str,
) -> String {
    let (title, details, steps) = content(cause, flavor, server_url);
    let steps: String = steps
        .iter()
        .map(|step| format!("          <li>{}</li>\n", render_step(step)))
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="de">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Verbindungsfehler</title>
  <style>
    * {{ margin: 0; padding: 0; box-sizing: border-box; }}
    body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); min-height: 100vh; display: flex; align-items: center; justify-content: center; padding: 20px; color: #333; }}
    .container {{ background: white; border-radius: 16px; padding: 30px; max-width: 500px; width: 100%; box-shadow: 0 10px 40px rgba(0, 0, 0, 0.2); }}
    .icon {{ font-size: 64px; text-align: center; margin-bottom: 20px; }}
    h1 {{ font-size: 24px; margin-bottom: 10px; text-align: center; color: #667eea; }}
    .error-details {{ background: #f5f5f5; padding: 15px; border-radius: 8px; margin-bottom: 20px; font-size: 14px; color: #666; word-break: break-word; }}
    .steps {{ margin-bottom: 20px; }}
    .steps h2 {{ font-size: 16px; margin-bottom: 10px; color: #555; }}
    .steps ul {{ padding-left: 20px; line-height: 1.6; }}
    .steps li {{ margin-bottom: 8px; color: #666; font-size: 14px; }}
    .steps code {{ background: #f0f0f0; padding: 2px 6px; border-radius: 4px; font-family: 'Courier New', monospace; font-size: 12px; }}
    .button {{ width: 100%; padding: 14px; background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); color: white; border: none; border-radius: 8px; font-size: 16px; font-weight: 600; cursor: pointer; }}
    .footer {{ margin-top: 20px; text-align: center; font-size: 12px; color: #999; }}
  </style>
</head>
<body>
  <div class="container">
    <div class="icon">⚠️</div>
    <h1>{title}</h1>
    <div class="error-details">{details}</div>
    <div class="steps">
      <h2>Was Sie tun können:</h2>
      <ul>
{steps}      </ul>
    </div>
    <button class="button" onclick="window.location.reload()">🔄 Erneut versuchen</button>
    <div class="footer">EuAiTalk v{version}</div>
  </div>
</body>
</html>
"#,
        title = escape_html(title),
        details = escape_html(&details),
        version = escape_html(version),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_all_special_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn connection_failure_debug_mentions_server_url() {
        let page = render_fallback_page(
            &FallbackCause::Network(LoadError::Connect),
            BuildFlavor::Debug,
            "http://10.0.2.2:3000",
            "1.0.0",
        );
        assert!(page.contains("<h1>Server nicht erreichbar</h1>"));
        assert!(page.contains("Verbindung zu http://10.0.2.2:3000 fehlgeschlagen"));
        assert!(page.contains("<code>euaitalk serve</code>"));
        assert!(page.contains("EuAiTalk v1.0.0"));
    }

    #[test]
    fn connection_failure_release_hides_server_url() {
        let page = render_fallback_page(
            &FallbackCause::Network(LoadError::Timeout),
            BuildFlavor::Release,
            "http://internal.example:3000",
            "1.0.0",
        );
        assert!(!page.contains("internal.example"));
        assert!(page.contains("Die Server-URL könnte falsch konfiguriert sein"));
    }

    #[test]
    fn other_errors_show_escaped_description() {
        let page = render_fallback_page(
            &FallbackCause::Network(LoadError::Other {
                description: "<script>alert('x')</script>".to_string(),
            }),
            BuildFlavor::Release,
            "http://localhost:3000",
            "1.0.0",
        );
        assert!(page.contains("<h1>Fehler beim Laden</h1>"));
        assert!(page.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
        assert!(!page.contains("<script>"));
    }

    #[test]
    fn debug_url_is_escaped() {
        let page = render_fallback_page(
            &FallbackCause::Network(LoadError::HostLookup),
            BuildFlavor::Debug,
            "http://x/\"><img src=y>",
            "<b>1</b>",
        );
        assert!(!page.contains("<img"));
        assert!(page.contains("&quot;&gt;&lt;img src=y&gt;"));
        assert!(page.contains("EuAiTalk v&lt;b&gt;1&lt;/b&gt;"));
    }

    #[test]
    fn http_and_blank_causes() {
        let page = render_fallback_page(
            &FallbackCause::Http {
                status: 502,
                reason: "Bad Gateway".to_string(),
            },
            BuildFlavor::Release,
            "http://localhost:3000",
            "1.0.0",
        );
        assert!(page.contains("HTTP 502 Bad Gateway"));

        let page = render_fallback_page(
            &FallbackCause::Blank,
            BuildFlavor::Release,
            "http://localhost:3000",
            "1.0.0",
        );
        assert!(page.contains("Unbekannter Fehler"));
        assert!(page.contains("Erneut versuchen"));
    }
}
