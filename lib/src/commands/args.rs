//! Reads typed values out of a parsed argument map (spec.md §6's three
//! shapes: boolean flag, single value, repeatable value).

use std::collections::BTreeMap;

use crate::backend::ArgValue;

pub fn get_single(args: &BTreeMap<String, ArgValue>, name: &str) -> Option<String> {
    match args.get(name)? {
        ArgValue::Single(s) => Some(s.clone()),
        ArgValue::Repeated(v) => v.first().cloned(),
        ArgValue::Bool(_) => None,
    }
}

pub fn get_bool(args: &BTreeMap<String, ArgValue>, name: &str) -> bool {
    matches!(args.get(name), Some(ArgValue::Bool(true)))
}

pub fn get_repeated(args: &BTreeMap<String, ArgValue>, name: &str) -> Vec<String> {
    match args.get(name) {
        Some(ArgValue::Repeated(v)) => v.clone(),
        Some(ArgValue::Single(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_falls_back_to_first_repeated() {
        let args = BTreeMap::from([("name".to_owned(), ArgValue::Repeated(vec!["a".into(), "b".into()]))]);
        assert_eq!(get_single(&args, "name"), Some("a".to_owned()));
    }

    #[test]
    fn missing_bool_defaults_false() {
        let args = BTreeMap::new();
        assert!(!get_bool(&args, "force"));
    }

    #[test]
    fn repeated_wraps_a_lone_single() {
        let args = BTreeMap::from([("paths".to_owned(), ArgValue::Single("a.py".into()))]);
        assert_eq!(get_repeated(&args, "paths"), vec!["a.py".to_owned()]);
    }
}
