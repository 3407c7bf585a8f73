/// Wookiee 风格文本编码
///
/// 按固定的音节映射表逐字符转换，表外字符原样保留，
/// 因此同一输入永远得到同一输出。

fn syllable(c: char) -> Option<&'static str> {
    match c {
        'a' => Some("ra"),
        'b' => Some("rh"),
        'c' => Some("oa"),
        'd' => Some("wa"),
        'e' => Some("wo"),
        'f' => Some("ww"),
        'g' => Some("rr"),
        'h' => Some("ac"),
        'i' => Some("ah"),
        'j' => Some("sh"),
        'k' => Some("or"),
        'l' => Some("an"),
        'm' => Some("sc"),
        'n' => Some("wh"),
        'o' => Some("oo"),
        'p' => Some("ak"),
        'q' => Some("rq"),
        'r' => Some("rc"),
        's' => Some("c"),
        't' => Some("ao"),
        'u' => Some("hu"),
        'v' => Some("ho"),
        'w' => Some("oh"),
        'x' => Some("k"),
        'y' => Some("ro"),
        'z' => Some("uf"),
        ' ' => Some("waaa"),
        _ => None,
    }
}

pub fn wookiee_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        match syllable(c.to_ascii_lowercase()) {
            Some(s) => out.push_str(s),
            None => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_characters_are_mapped() {
        assert_eq!(wookiee_encode("a"), "ra");
        assert_eq!(wookiee_encode("s"), "c");
        assert_eq!(wookiee_encode(" "), "waaa");
        assert_eq!(wookiee_encode("at"), "raao");
    }

    #[test]
    fn case_is_folded_before_lookup() {
        assert_eq!(wookiee_encode("A"), wookiee_encode("a"));
        assert_eq!(wookiee_encode("Rex"), "rcwok");
    }

    #[test]
    fn unknown_characters_pass_through() {
        assert_eq!(wookiee_encode("R2-D2"), "rc2-wa2");
        assert_eq!(wookiee_encode("42"), "42");
    }

    #[test]
    fn encoding_is_deterministic() {
        let once = wookiee_encode("Mace Windu");
        let twice = wookiee_encode("Mace Windu");
        assert_eq!(once, twice);
    }
}
