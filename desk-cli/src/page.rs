//! Server-rendered query form

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};

use desk_core::Persona;

/// What to show below the form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A complete markdown answer
    Answer(String),
    /// An inline error message
    Error(String),
}

/// Everything needed to render the page
#[derive(Debug, Clone, Default)]
pub struct PageView {
    pub selected: Persona,
    pub company: String,
    pub query: String,
    pub outcome: Option<Outcome>,
}

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 52rem; margin: 2rem auto; padding: 0 1rem; color: #222; }
fieldset { border: 1px solid #ddd; border-radius: 6px; margin-bottom: 1rem; }
label.option { display: block; margin: 0.25rem 0; }
.field { margin-bottom: 1rem; }
.field input[type=text], .field textarea { width: 100%; box-sizing: border-box; padding: 0.5rem; }
.error { background: #fdecea; border: 1px solid #f5c2c0; padding: 0.75rem; border-radius: 6px; }
.answer { border-top: 1px solid #eee; margin-top: 1.5rem; padding-top: 1rem; }
.subtitle { color: #555; }
.hidden { display: none; }
table { border-collapse: collapse; }
td, th { border: 1px solid #ddd; padding: 0.25rem 0.5rem; }
"#;

const SCRIPT: &str = r#"
const form = document.getElementById('ask');
const company = document.getElementById('company-field');
const queryLabel = document.getElementById('query-label');
function sync() {
  const picked = form.querySelector('input[name=persona]:checked');
  company.classList.toggle('hidden', picked.value !== 'finance');
  queryLabel.textContent = picked.dataset.queryLabel;
}
form.querySelectorAll('input[name=persona]').forEach(r => r.addEventListener('change', sync));
form.addEventListener('submit', () => {
  document.getElementById('status').textContent = 'Processing...';
  form.querySelector('button').disabled = true;
});
"#;

/// Render the full page
pub fn render_page(view: &PageView) -> String {
    let mut out = String::with_capacity(4096);

    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str("<title>AI Multi-Agent System</title>\n");
    out.push_str(&format!("<style>{}</style>\n</head>\n<body>\n", STYLE));
    out.push_str("<h1>AI Multi-Agent System</h1>\n");
    out.push_str("<p class=\"subtitle\">This system retrieves comprehensive financial details for any company you specify.</p>\n");

    out.push_str("<form id=\"ask\" method=\"post\" action=\"/ask\">\n");
    out.push_str("<fieldset>\n<legend>Select Agent</legend>\n");
    for persona in Persona::ALL {
        let checked = if persona == view.selected { " checked" } else { "" };
        out.push_str(&format!(
            "<label class=\"option\"><input type=\"radio\" name=\"persona\" value=\"{}\" data-query-label=\"{}\"{}> {}</label>\n",
            persona.id(),
            escape_html(persona.query_label()),
            checked,
            escape_html(persona.label())
        ));
    }
    out.push_str("</fieldset>\n");

    let company_class = if view.selected.requires_company() { "field" } else { "field hidden" };
    out.push_str(&format!(
        "<div id=\"company-field\" class=\"{}\">\n<label for=\"company\">Enter Company Name:</label>\n\
         <input type=\"text\" id=\"company\" name=\"company\" value=\"{}\">\n</div>\n",
        company_class,
        escape_html(&view.company)
    ));

    out.push_str(&format!(
        "<div class=\"field\">\n<label id=\"query-label\" for=\"query\">{}</label>\n\
         <textarea id=\"query\" name=\"query\" rows=\"4\">{}</textarea>\n</div>\n",
        escape_html(view.selected.query_label()),
        escape_html(&view.query)
    ));

    out.push_str("<button type=\"submit\">Ask Agent</button> <span id=\"status\"></span>\n</form>\n");

    match &view.outcome {
        Some(Outcome::Answer(markdown)) => {
            out.push_str("<div class=\"answer\">\n<h3>Response:</h3>\n");
            out.push_str(&render_markdown(markdown));
            out.push_str("</div>\n");
        }
        Some(Outcome::Error(message)) => {
            out.push_str(&format!("<div class=\"error\">{}</div>\n", escape_html(message)));
        }
        None => {}
    }

    out.push_str(&format!("<script>{}</script>\n</body>\n</html>\n", SCRIPT));
    out
}

/// Render markdown to HTML
///
/// Raw HTML is shown as text, and link or image targets with a scheme other
/// than http, https or mailto are replaced by `#`.
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    if is_allowed_url(&url) {
        url
    } else {
        CowStr::Borrowed("#")
    }
}

/// Relative URLs, or absolute ones with an http, https or mailto scheme
fn is_allowed_url(url: &str) -> bool {
    // Browsers ignore whitespace and control characters inside a scheme
    let cleaned: String = url
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .collect();

    match cleaned.find([':', '/', '?', '#']) {
        Some(i) if cleaned[i..].starts_with(':') => {
            let scheme = cleaned[..i].to_ascii_lowercase();
            matches!(scheme.as_str(), "http" | "https" | "mailto")
        }
        _ => true,
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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
