//! IF-003: Template rendering and fragment ordering.
//!
//! Renders `{{var}}` placeholders against a flat variable context; an
//! unknown variable is an error rather than an empty substitution.
//! Orders fragments by their `depends_on` edges using Kahn's algorithm,
//! breaking ties by the order the caller listed them in.

use indexmap::IndexMap;
use std::collections::{HashMap, VecDeque};

/// Render all `{{var}}` placeholders in `template`.
pub fn render_template(template: &str, vars: &IndexMap<String, String>) -> Result<String, String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(open) = result[start..].find("{{") {
        let open = start + open;
        let close = result[open..]
            .find("}}")
            .ok_or_else(|| format!("unclosed template at position {}", open))?;
        let close = open + close + 2;
        let key = result[open + 2..close - 2].trim();

        let value = vars
            .get(key)
            .cloned()
            .ok_or_else(|| format!("unknown template variable: {}", key))?;

        result.replace_range(open..close, &value);
        start = open + value.len();
    }

    Ok(result)
}

/// Variables referenced by a template, in first-seen order.
pub fn template_variables(template: &str) -> Vec<String> {
    let mut vars: Vec<String> = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            break;
        };
        let key = after[..close].trim().to_string();
        if !vars.contains(&key) {
            vars.push(key);
        }
        rest = &after[close + 2..];
    }
    vars
}

/// Topological order over `(name, depends_on)` pairs.
///
/// Every dependency must itself appear in `nodes`; ties keep input order.
pub fn build_fragment_order(nodes: &[(&str, &[&str])]) -> Result<Vec<String>, String> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let position: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, (name, _))| (*name, i))
        .collect();

    for (name, _) in nodes {
        in_degree.insert(*name, 0);
        adjacency.insert(*name, Vec::new());
    }

    for (name, deps) in nodes {
        for dep in deps.iter() {
            let Some(neighbors) = adjacency.get_mut(dep) else {
                return Err(format!("fragment '{}' depends on unknown '{}'", name, dep));
            };
            neighbors.push(*name);
            if let Some(d) = in_degree.get_mut(name) {
                *d += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = nodes
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| in_degree.get(name).copied() == Some(0))
        .collect();

    let mut order = Vec::new();
    while let Some(current) = queue.pop_front() {
        order.push(current.to_string());

        let mut next_ready: Vec<&str> = Vec::new();
        if let Some(neighbors) = adjacency.get(current) {
            for neighbor in neighbors {
                if let Some(degree) = in_degree.get_mut(neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        next_ready.push(*neighbor);
                    }
                }
            }
        }
        next_ready.sort_by_key(|n| position.get(n).copied().unwrap_or(usize::MAX));
        queue.extend(next_ready);
    }

    if order.len() != nodes.len() {
        let cycle_members: Vec<&str> = nodes
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| !order.iter().any(|o| o == name))
            .collect();
        return Err(format!(
            "dependency cycle detected involving: {}",
            cycle_members.join(", ")
        ));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_if003_render_simple() {
        let v = vars(&[("team", "ml")]);
        assert_eq!(render_template("team = \"{{team}}\"", &v).unwrap(), "team = \"ml\"");
    }

    #[test]
    fn test_if003_render_whitespace_in_braces() {
        let v = vars(&[("region", "eastus")]);
        assert_eq!(render_template("{{ region }}", &v).unwrap(), "eastus");
    }

    #[test]
    fn test_if003_render_multiple() {
        let v = vars(&[("a", "X"), ("b", "Y")]);
        assert_eq!(render_template("{{a}}-{{b}}-{{a}}", &v).unwrap(), "X-Y-X");
    }

    #[test]
    fn test_if003_render_unknown_variable() {
        let err = render_template("{{missing}}", &IndexMap::new()).unwrap_err();
        assert!(err.contains("unknown template variable: missing"));
    }

    #[test]
    fn test_if003_render_unclosed() {
        let err = render_template("abc {{oops", &IndexMap::new()).unwrap_err();
        assert!(err.contains("unclosed"));
    }

    #[test]
    fn test_if003_render_value_not_rescanned() {
        let v = vars(&[("a", "{{b}}")]);
        assert_eq!(render_template("{{a}}", &v).unwrap(), "{{b}}");
    }

    #[test]
    fn test_if003_render_preserves_hcl_interpolation() {
        let v = vars(&[("x", "1")]);
        let out = render_template("url = \"https://${azurerm.this.url}\" n = {{x}}", &v).unwrap();
        assert_eq!(out, "url = \"https://${azurerm.this.url}\" n = 1");
    }

    #[test]
    fn test_if003_template_variables() {
        let found = template_variables("{{a}} {{ b }} {{a}} {{c}}");
        assert_eq!(found, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_if003_order_linear() {
        let nodes = [
            ("cluster", &["workspace"][..]),
            ("workspace", &["resource_group"][..]),
            ("resource_group", &[][..]),
        ];
        let order = build_fragment_order(&nodes).unwrap();
        assert_eq!(order, vec!["resource_group", "workspace", "cluster"]);
    }

    #[test]
    fn test_if003_order_ties_keep_input_order() {
        let nodes = [
            ("resource_group", &[][..]),
            ("workspace", &["resource_group"][..]),
            ("instance_pool", &["workspace"][..]),
            ("cluster", &["workspace"][..]),
        ];
        let order = build_fragment_order(&nodes).unwrap();
        assert_eq!(
            order,
            vec!["resource_group", "workspace", "instance_pool", "cluster"]
        );
    }

    #[test]
    fn test_if003_order_unknown_dependency() {
        let nodes = [("cluster", &["workspace"][..])];
        let err = build_fragment_order(&nodes).unwrap_err();
        assert!(err.contains("unknown 'workspace'"));
    }

    #[test]
    fn test_if003_order_cycle() {
        let nodes = [("a", &["b"][..]), ("b", &["a"][..])];
        let err = build_fragment_order(&nodes).unwrap_err();
        assert!(err.contains("cycle"));
    }
}
