//! Fixed transliteration table for name parts
//!
//! Only lowercase letters are listed; uppercase input is lowercased first, so
//! `Ä` and `ä` resolve to the same entry. The table does not depend on the
//! process locale.

const TABLE: &[(char, &str)] = &[
    // German
    ('ä', "ae"),
    ('ö', "oe"),
    ('ü', "ue"),
    ('ß', "ss"),
    // French / Romance
    ('é', "e"),
    ('è', "e"),
    ('ê', "e"),
    ('ë', "e"),
    ('á', "a"),
    ('à', "a"),
    ('â', "a"),
    ('ó', "o"),
    ('ò', "o"),
    ('ô', "o"),
    ('ú', "u"),
    ('ù', "u"),
    ('û', "u"),
    ('í', "i"),
    ('ì', "i"),
    ('î', "i"),
    ('ï', "i"),
    ('ç', "c"),
    ('ñ', "n"),
    // Eastern European / Turkish
    ('ć', "c"),
    ('č', "c"),
    ('ń', "n"),
    ('ş', "s"),
    ('š', "s"),
    ('ž', "z"),
    ('ğ', "g"),
    ('ł', "l"),
    ('ř', "r"),
    ('ý', "y"),
    ('ź', "z"),
    ('ż', "z"),
    ('đ', "d"),
    ('ı', "i"),
    // Scandinavian
    ('ø', "oe"),
    ('å', "a"),
    ('æ', "ae"),
];

fn lookup(ch: char) -> Option<&'static str> {
    TABLE
        .iter()
        .find(|(from, _)| *from == ch)
        .map(|(_, to)| *to)
}

/// Lowercase, transliterate and reduce a name part to `[a-z0-9]`.
///
/// Characters with no table entry and no ASCII equivalent are dropped.
pub fn sanitize_name_part(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars().flat_map(char::to_lowercase) {
        if let Some(replacement) = lookup(ch) {
            out.push_str(replacement);
        } else if ch.is_ascii_alphanumeric() {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_german_letters() {
        assert_eq!(sanitize_name_part("Müller"), "mueller");
        assert_eq!(sanitize_name_part("Größe"), "groesse");
        assert_eq!(sanitize_name_part("ÄRGER"), "aerger");
    }

    #[test]
    fn test_other_scripts() {
        assert_eq!(sanitize_name_part("Çelik"), "celik");
        assert_eq!(sanitize_name_part("Łukasz"), "lukasz");
        assert_eq!(sanitize_name_part("Søren"), "soeren");
        assert_eq!(sanitize_name_part("Ærø"), "aeroe");
        assert_eq!(sanitize_name_part("Yıldız"), "yildiz");
    }

    #[test]
    fn test_drops_everything_else() {
        assert_eq!(sanitize_name_part(" Anne-Marie O'Neil "), "annemarieoneil");
        assert_eq!(sanitize_name_part("李"), "");
    }
}
