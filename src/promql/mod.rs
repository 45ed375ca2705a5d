//! Query composition helpers
//!
//! Renders check templates and intersects arbitrary queries with a
//! liveness series to filter results down to specific targets.

/// Substitute the `{range}` placeholder in a check template.
///
/// Templates without the placeholder are returned unchanged.
pub fn render_template(template: &str, range_str: &str) -> String {
    if template.contains("{range}") {
        template.replace("{range}", range_str)
    } else {
        template.to_string()
    }
}

/// Escape a label value for embedding into a string literal matcher
fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Restrict a query to specific targets by intersecting it with the
/// `up` liveness series.
///
/// Rewrites the query as `(<query>) and on (<labels>) up{<matchers>}`
/// with only the supplied labels, in the fixed order instance then
/// server_name. This filters any query's results to one or more targets
/// without rewriting its internal label selectors. With no filters the
/// query is returned unchanged.
pub fn apply_target_filter(
    query: &str,
    server_name: Option<&str>,
    instance: Option<&str>,
) -> String {
    let server_name = server_name.filter(|s| !s.is_empty());
    let instance = instance.filter(|i| !i.is_empty());
    if server_name.is_none() && instance.is_none() {
        return query.to_string();
    }

    let mut matchers = Vec::new();
    let mut on_labels = Vec::new();
    if let Some(instance) = instance {
        matchers.push(format!("instance=\"{}\"", escape_label_value(instance)));
        on_labels.push("instance");
    }
    if let Some(server_name) = server_name {
        matchers.push(format!(
            "server_name=\"{}\"",
            escape_label_value(server_name)
        ));
        on_labels.push("server_name");
    }

    format!(
        "({}) and on ({}) up{{{}}}",
        query,
        on_labels.join(","),
        matchers.join(",")
    )
}
