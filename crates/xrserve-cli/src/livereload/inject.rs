//! Injection of the live-reload client into served HTML.
//!
//! Two clients exist: the generic one (chart/data visualizations) and the DOM
//! one (`babia-html` visualizations). A page carries at most one of them;
//! injecting either removes the other. Both are idempotent.

const CLIENT_ID: &str = "__LIVE_RELOAD_CLIENT__";
const DOM_CLIENT_ID: &str = "__LIVE_RELOAD_CLIENT_HTML__";

const CLIENT_SCRIPT: &str = include_str!("../../assets/livereload/client.html");
const DOM_CLIENT_SCRIPT: &str = include_str!("../../assets/livereload/dom-client.html");

/// Inject the generic live-reload client before `</body>`.
///
/// Returns the content unchanged if the client is already present. Without a
/// closing body tag the script is appended at the end.
pub fn inject_live_reload_script(html: &str) -> String {
    inject_exclusive(html, CLIENT_ID, CLIENT_SCRIPT, DOM_CLIENT_ID)
}

/// Inject the DOM-visualization client before `</body>`.
pub fn inject_dom_live_reload_script(html: &str) -> String {
    inject_exclusive(html, DOM_CLIENT_ID, DOM_CLIENT_SCRIPT, CLIENT_ID)
}

/// Whether `html` already carries either live-reload client.
pub fn has_live_reload_script(html: &str) -> bool {
    html.contains(&opening_tag(CLIENT_ID)) || html.contains(&opening_tag(DOM_CLIENT_ID))
}

fn opening_tag(id: &str) -> String {
    format!(r#"<script id="{}">"#, id)
}

fn inject_exclusive(html: &str, id: &str, script: &str, other_id: &str) -> String {
    if html.contains(&opening_tag(id)) {
        return html.to_string();
    }

    let html = remove_script(html, other_id);

    match html.rfind("</body>") {
        Some(pos) => {
            let mut result = String::with_capacity(html.len() + script.len() + 1);
            result.push_str(&html[..pos]);
            result.push_str(script);
            if !script.ends_with('\n') {
                result.push('\n');
            }
            result.push_str(&html[pos..]);
            result
        }
        None => {
            let mut result = html;
            result.push('\n');
            result.push_str(script);
            result
        }
    }
}

/// Remove the `<script id="...">...</script>` block with the given id.
fn remove_script(html: &str, id: &str) -> String {
    let start_tag = opening_tag(id);
    let Some(start) = html.find(&start_tag) else {
        return html.to_string();
    };
    let Some(close) = html[start..].find("</script>") else {
        return html.to_string();
    };

    let mut end = start + close + "</script>".len();
    if html[end..].starts_with('\n') {
        end += 1;
    }

    let mut result = String::with_capacity(html.len() - (end - start));
    result.push_str(&html[..start]);
    result.push_str(&html[end..]);
    result
}
