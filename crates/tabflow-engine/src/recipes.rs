//! Built-in recipe names: shorthand pipelines resolved case-insensitively to
//! DSL strings.

/// Name → DSL expansion table.
pub static RECIPES: &[(&str, &str)] = &[
    ("profile", "csv | stats | table"),
    ("preview", "csv | head 10 | table"),
    ("schema", "csv | stats count,distinct,sample | table"),
    ("summary", "csv | stats count,min,max,avg,stddev | table"),
    ("count", "csv | stats count | table"),
    ("cardinality", "csv | stats distinct | table"),
    ("distro", "csv | stats hist | table"),
    ("freq", "csv | frequency | table"),
    ("dedup", "csv | unique | csv"),
    ("clean", "csv repair=true | trim | csv"),
    ("sample", "csv | sample 10 | csv"),
    ("head", "csv | head 10 | csv"),
    ("tail", "csv | tail 10 | csv"),
    ("look", "csv | head 20 | table"),
    ("csv2json", "csv | jsonl"),
    ("json2csv", "jsonl | csv"),
    ("tsv2csv", "csv delimiter=tab | csv"),
    ("csv2tsv", "csv | csv delimiter=tab"),
    ("histogram", "csv | stats hist | table"),
    ("hash", "csv | hash | csv"),
    ("samples", "csv | sample 5 | table"),
];

/// Case-insensitive recipe lookup.
pub fn lookup(name: &str) -> Option<&'static str> {
    RECIPES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, dsl)| *dsl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(lookup("PROFILE"), lookup("profile"));
        assert!(lookup("profile").is_some());
        assert!(lookup("no-such-recipe").is_none());
    }

    #[test]
    fn all_recipes_compile_and_validate() {
        for (name, dsl) in RECIPES {
            let mut plan = crate::dsl::parse(dsl)
                .unwrap_or_else(|e| panic!("recipe `{name}` failed to parse: {e}"));
            plan.validate()
                .unwrap_or_else(|e| panic!("recipe `{name}` failed to validate: {e}"));
        }
    }

    #[test]
    fn twenty_one_builtins() {
        assert_eq!(RECIPES.len(), 21);
    }
}
