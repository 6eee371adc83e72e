//! Server-rendered HTML for the login page and the interviewer panel.
//!
//! Templates are plain HTML files with `{placeholder}` markers; every value
//! substituted into them goes through [`escape_html`].

use std::fmt::Write;

use panel_core::{
    format_timestamp, Candidate, FeedbackMapping, FeedbackRecord, FeedbackStatus, PanelConfig,
    Table,
};

const LOGIN_HTML_TEMPLATE: &str = include_str!("login.html");
const PANEL_HTML_TEMPLATE: &str = include_str!("panel.html");

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Percent-encode a value for use in a query string.
pub fn encode_query_value(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Substitute `{key}` markers in one pass over the template. Substituted
/// values are never rescanned, and braces that do not name a key (CSS, JS)
/// are kept as they are.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let value = tail.find('}').and_then(|close| {
            let key = &tail[..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn render_login(message: Option<&str>, version: &str) -> String {
    let message = message
        .map(|m| format!(r#"<p class="error">{}</p>"#, escape_html(m)))
        .unwrap_or_else(|| r#"<p class="hint">Please enter your username and password</p>"#.to_string());
    fill_template(
        LOGIN_HTML_TEMPLATE,
        &[("message", &message), ("version", &escape_html(version))],
    )
}

/// Render a table with escaped cells.
pub fn render_table(table: &Table) -> String {
    let mut html = String::from("<table>\n<thead><tr>");
    for column in &table.columns {
        let _ = write!(html, "<th>{}</th>", escape_html(column));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for row in &table.rows {
        html.push_str("<tr>");
        for cell in row {
            let _ = write!(html, "<td>{}</td>", escape_html(&cell.to_string()));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>");
    html
}

/// How the selected candidate's form is shown.
pub enum FormView {
    Editable(FeedbackRecord),
    ReadOnly(FeedbackRecord),
}

/// Everything the interviewer panel shows for one request.
pub struct PanelPage<'a> {
    pub panel: &'a PanelConfig,
    pub username: &'a str,
    pub display_name: &'a str,
    pub feedback: &'a FeedbackMapping,
    pub selected: &'a Candidate,
    pub view: FormView,
    pub version: &'a str,
}

fn candidate_selector(page: &PanelPage<'_>) -> String {
    let mut html = String::from(r#"<nav class="candidates">"#);
    for candidate in &page.panel.candidates {
        let status = page.feedback.status(page.username, &candidate.id);
        let class = if candidate.id == page.selected.id {
            "candidate selected"
        } else {
            "candidate"
        };
        let _ = write!(
            html,
            r#"<a class="{}" href="/?candidate={}">{} {}</a>"#,
            class,
            encode_query_value(&candidate.id),
            escape_html(&candidate.name),
            status.label()
        );
    }
    html.push_str("</nav>");
    html
}

fn rating_select(page: &PanelPage<'_>, field: &str, criterion: &str, current: &str) -> String {
    let scale = &page.panel.rating_options;
    // Unset or unknown values show the sentinel.
    let current = if scale.contains(current) {
        current
    } else {
        scale.sentinel()
    };
    let mut html = format!(
        r#"<select data-field="{}" data-criterion="{}">"#,
        field,
        escape_html(criterion)
    );
    for option in scale.options() {
        let selected = if option == current { " selected" } else { "" };
        let _ = write!(
            html,
            r#"<option value="{0}"{1}>{0}</option>"#,
            escape_html(option),
            selected
        );
    }
    html.push_str("</select>");
    html
}

fn notes_area(field: &str, criterion: &str, current: &str) -> String {
    format!(
        r#"<textarea data-field="{}" data-criterion="{}" rows="4">{}</textarea>"#,
        field,
        escape_html(criterion),
        escape_html(current)
    )
}

fn editable_form(page: &PanelPage<'_>, record: &FeedbackRecord) -> String {
    let candidate_id = escape_html(&page.selected.id);
    let mut html = format!(
        r#"<form class="feedback" data-candidate="{}" method="post" action="/feedback/{}/submit">"#,
        candidate_id,
        encode_query_value(&page.selected.id)
    );
    html.push_str("<h3>Overall Rating</h3>");
    html.push_str(&rating_select(page, "overall_rating", "", &record.overall_rating));
    html.push_str("<label>Overall Notes</label>");
    html.push_str(&notes_area("overall_notes", "", &record.overall_notes));

    for criterion in &page.panel.criteria {
        let _ = write!(html, "<h3>{}</h3>", escape_html(&criterion.name));
        if !criterion.prompts.is_empty() {
            html.push_str("<ul>");
            for prompt in &criterion.prompts {
                let _ = write!(html, "<li>{}</li>", escape_html(prompt));
            }
            html.push_str("</ul>");
        }
        html.push_str(r#"<div class="criterion"><div>"#);
        html.push_str(&rating_select(
            page,
            "criterion_rating",
            &criterion.name,
            record.criterion_rating(&criterion.name),
        ));
        let _ = write!(
            html,
            r#"</div><div><label>Notes for {}</label>"#,
            escape_html(&criterion.name)
        );
        html.push_str(&notes_area(
            "criterion_notes",
            &criterion.name,
            record.criterion_notes(&criterion.name),
        ));
        html.push_str("</div></div>");
    }

    html.push_str(r#"<p class="save-status" id="save-status"></p>"#);
    html.push_str(r#"<button type="submit" class="submit">Submit Feedback</button></form>"#);
    html
}

fn record_details(page: &PanelPage<'_>, record: &FeedbackRecord, panelist: &str) -> String {
    let mut html = format!(
        "<p><strong>Overall Rating:</strong> {}</p>\
         <p><strong>Overall Notes:</strong> {}</p>\
         <p><strong>Last Modified At:</strong> {}</p>",
        escape_html(&record.overall_rating),
        escape_html(&record.overall_notes),
        escape_html(&format_timestamp(&record.timestamp))
    );
    html.push_str(
        "<table><thead><tr><th>Panelist</th><th>Criteria</th><th>Rating</th><th>Notes</th></tr></thead><tbody>",
    );
    for criterion in &page.panel.criteria {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(panelist),
            escape_html(&criterion.name),
            escape_html(record.criterion_rating(&criterion.name)),
            escape_html(record.criterion_notes(&criterion.name))
        );
    }
    html.push_str("</tbody></table>");
    html
}

/// The selected candidate's feedback from everyone, once the user has
/// submitted their own.
fn shared_feedback(page: &PanelPage<'_>) -> String {
    let candidate = page.selected;
    let own = page.feedback.get(page.username, &candidate.id);
    let Some(own) = own.filter(|r| r.status() == FeedbackStatus::Submitted) else {
        return format!(
            r#"<p class="info">Submit your feedback for {} to unlock this tab.</p>"#,
            escape_html(&candidate.name)
        );
    };

    let name = escape_html(&candidate.name);
    let mut html = format!("<details open><summary>Feedback for {}</summary>", name);
    let _ = write!(html, "<h3>Your Feedback for {}</h3>", name);
    html.push_str(&record_details(page, own, page.username));

    html.push_str("<h3>Other Panelists' Feedback</h3>");
    let mut found = false;
    for (interviewer, candidate_id, record) in page.feedback.iter() {
        if interviewer == page.username || candidate_id != candidate.id || !record.submitted {
            continue;
        }
        found = true;
        let _ = write!(html, "<h4>{}</h4>", escape_html(interviewer));
        html.push_str(&record_details(page, record, interviewer));
        html.push_str("<hr>");
    }
    if !found {
        html.push_str("<p>No other feedback available yet.</p>");
    }
    html.push_str("</details>");
    html
}

pub fn render_panel(page: &PanelPage<'_>) -> String {
    let form = match &page.view {
        FormView::Editable(record) => editable_form(page, record),
        FormView::ReadOnly(record) => format!(
            r#"<p class="info">You have submitted feedback for this candidate. You cannot edit your responses.</p>{}"#,
            record_details(page, record, "")
        ),
    };

    fill_template(
        PANEL_HTML_TEMPLATE,
        &[
            ("display_name", &escape_html(page.display_name)),
            ("selector", &candidate_selector(page)),
            ("candidate_name", &escape_html(&page.selected.name)),
            ("form", &form),
            ("shared", &shared_feedback(page)),
            ("version", &escape_html(page.version)),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_panel;
    use panel_core::TableCell;

    fn submitted(overall: &str) -> FeedbackRecord {
        FeedbackRecord {
            overall_rating: overall.to_string(),
            overall_notes: "<b>bold</b>".to_string(),
            timestamp: "2025-07-01T10:00:00".to_string(),
            submitted: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_encode_query_value() {
        assert_eq!(encode_query_value("abc-1"), "abc-1");
        assert_eq!(encode_query_value("a b&c"), "a%20b%26c");
        assert_eq!(encode_query_value("é/?"), "%C3%A9%2F%3F");
    }

    #[test]
    fn test_fill_template_single_pass() {
        let template = "a {x} b {y} .c { color: red; } {unknown} {";
        let filled = fill_template(template, &[("x", "{y}"), ("y", "Y")]);
        assert_eq!(filled, "a {y} b Y .c { color: red; } {unknown} {");
    }

    #[test]
    fn test_render_table_escapes_cells() {
        let mut table = Table::new("T", vec!["<h>".to_string()]);
        table.rows.push(vec![TableCell::from("<script>")]);
        let html = render_table(&table);
        assert!(html.contains("&lt;h&gt;"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_panel_hides_others_until_submitted() {
        let panel = sample_panel();
        let mut feedback = FeedbackMapping::new();
        feedback.insert("bob", "1", submitted("Strong"));
        feedback.entry("alice", "1").overall_notes = "draft".to_string();

        let page = PanelPage {
            panel: &panel,
            username: "alice",
            display_name: "Alice",
            feedback: &feedback,
            selected: panel.candidate("1").unwrap(),
            view: FormView::Editable(feedback.get("alice", "1").unwrap().clone()),
            version: "test",
        };
        let html = render_panel(&page);
        assert!(html.contains("Anne 📝 In Progress"));
        assert!(html.contains("Maria Paula ❌ Not Started"));
        assert!(html.contains("Submit your feedback for Anne to unlock this tab."));
        assert!(!html.contains("Strong</p>"));
        assert!(html.contains(r#"<option value="I can&#39;t tell" selected>"#));
    }

    #[test]
    fn test_panel_shows_all_feedback_after_submission() {
        let panel = sample_panel();
        let mut feedback = FeedbackMapping::new();
        feedback.insert("bob", "1", submitted("Strong"));
        feedback.insert("alice", "1", submitted("Low"));

        let page = PanelPage {
            panel: &panel,
            username: "alice",
            display_name: "Alice",
            feedback: &feedback,
            selected: panel.candidate("1").unwrap(),
            view: FormView::ReadOnly(feedback.get("alice", "1").unwrap().clone()),
            version: "test",
        };
        let html = render_panel(&page);
        assert!(html.contains("You cannot edit your responses."));
        assert!(html.contains("Your Feedback for Anne"));
        assert!(html.contains("<h4>bob</h4>"));
        assert!(html.contains("<strong>Overall Rating:</strong> Strong"));
        assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;"));
        assert!(!html.contains("<select"));
    }

    #[test]
    fn test_notes_with_template_markers_render_verbatim() {
        let panel = sample_panel();
        let mut feedback = FeedbackMapping::new();
        feedback.entry("alice", "1").overall_notes = "see {version} and {shared}".to_string();

        let page = PanelPage {
            panel: &panel,
            username: "alice",
            display_name: "Alice",
            feedback: &feedback,
            selected: panel.candidate("1").unwrap(),
            view: FormView::Editable(feedback.get("alice", "1").unwrap().clone()),
            version: "v-test",
        };
        let html = render_panel(&page);
        assert!(html.contains(r#"rows="4">see {version} and {shared}</textarea>"#));
    }
}
