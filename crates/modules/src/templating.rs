//! `{{key}}`-style variable substitution. Intentionally not a full
//! templating engine: unresolved keys are left in place rather than
//! erroring, and there's no support for conditionals, loops or escaping.

use std::collections::HashMap;

pub fn substitute(template: &str, variables: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match variables.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_keys() {
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Ada".to_string());
        assert_eq!(substitute("Hello {{name}}!", &vars), "Hello Ada!");
    }

    #[test]
    fn leaves_unknown_keys_untouched() {
        let vars = HashMap::new();
        assert_eq!(substitute("Hello {{name}}!", &vars), "Hello {{name}}!");
    }

    #[test]
    fn handles_multiple_placeholders() {
        let mut vars = HashMap::new();
        vars.insert("first".to_string(), "A".to_string());
        vars.insert("last".to_string(), "B".to_string());
        assert_eq!(substitute("{{first}} {{last}}", &vars), "A B");
    }
}
