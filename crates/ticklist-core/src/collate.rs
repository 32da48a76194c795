use std::cmp::Ordering;

use deunicode::deunicode;

/// Orders strings close to a default ICU collator on Latin text: base
/// letters first (accents and case ignored), then accents, then case with
/// lowercase before uppercase.
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    base_key(a)
        .cmp(&base_key(b))
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        .then_with(|| case_key(a).cmp(&case_key(b)))
}

fn base_key(s: &str) -> String {
    deunicode(s).to_lowercase()
}

fn case_key(s: &str) -> Vec<bool> {
    s.chars().map(char::is_uppercase).collect()
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::locale_cmp;

    fn sorted(mut words: Vec<&str>) -> Vec<&str> {
        words.sort_by(|a, b| locale_cmp(a, b));
        words
    }

    #[test]
    fn ignores_case_at_first_level() {
        assert_eq!(sorted(vec!["banana", "Apple", "cherry"]), vec!["Apple", "banana", "cherry"]);
    }

    #[test]
    fn accents_sort_next_to_their_base_letter() {
        assert_eq!(sorted(vec!["zebra", "éclair", "eclair", "Ernest"]), vec!["eclair", "éclair", "Ernest", "zebra"]);
    }

    #[test]
    fn lowercase_wins_a_case_only_tie() {
        assert_eq!(locale_cmp("apple", "Apple"), Ordering::Less);
        assert_eq!(locale_cmp("Apple", "Apple"), Ordering::Equal);
    }
}
