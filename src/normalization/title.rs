use std::sync::OnceLock;

use regex::Regex;

fn parenthetical() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(.*\)").expect("static regex"))
}

/// Build the query string sent to the enrichment search.
///
/// Catalog titles carry language/region tags such as `(Sv)` or `(Eng)`; the
/// outermost parenthesised span is dropped and the rest trimmed.
pub fn clean_query_name(name: &str) -> String {
    parenthetical().replace_all(name, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_language_tags() {
        assert_eq!(clean_query_name("Azul (Sv)"), "Azul");
        assert_eq!(clean_query_name("Catan (Eng) "), "Catan");
        assert_eq!(clean_query_name("Carcassonne"), "Carcassonne");
    }

    #[test]
    fn greedy_span_removes_everything_between_outer_parens() {
        assert_eq!(clean_query_name("Dune (2019) Imperium (Eng)"), "Dune");
    }
}
