//! 英文语言名 → ISO-639-1 代码（完整的 639-1 表，外加常见别名）。

const ISO_639_1: &[(&str, &str)] = &[
    ("afar", "aa"),
    ("abkhazian", "ab"),
    ("avestan", "ae"),
    ("afrikaans", "af"),
    ("akan", "ak"),
    ("amharic", "am"),
    ("aragonese", "an"),
    ("arabic", "ar"),
    ("assamese", "as"),
    ("avaric", "av"),
    ("aymara", "ay"),
    ("azerbaijani", "az"),
    ("bashkir", "ba"),
    ("belarusian", "be"),
    ("bulgarian", "bg"),
    ("bislama", "bi"),
    ("bambara", "bm"),
    ("bengali", "bn"),
    ("tibetan", "bo"),
    ("breton", "br"),
    ("bosnian", "bs"),
    ("catalan", "ca"),
    ("chechen", "ce"),
    ("chamorro", "ch"),
    ("corsican", "co"),
    ("cree", "cr"),
    ("czech", "cs"),
    ("church slavic", "cu"),
    ("chuvash", "cv"),
    ("welsh", "cy"),
    ("danish", "da"),
    ("german", "de"),
    ("dhivehi", "dv"),
    ("dzongkha", "dz"),
    ("ewe", "ee"),
    ("greek", "el"),
    ("english", "en"),
    ("esperanto", "eo"),
    ("spanish", "es"),
    ("estonian", "et"),
    ("basque", "eu"),
    ("persian", "fa"),
    ("fulah", "ff"),
    ("finnish", "fi"),
    ("fijian", "fj"),
    ("faroese", "fo"),
    ("french", "fr"),
    ("western frisian", "fy"),
    ("irish", "ga"),
    ("scottish gaelic", "gd"),
    ("galician", "gl"),
    ("guarani", "gn"),
    ("gujarati", "gu"),
    ("manx", "gv"),
    ("hausa", "ha"),
    ("hebrew", "he"),
    ("hindi", "hi"),
    ("hiri motu", "ho"),
    ("croatian", "hr"),
    ("haitian", "ht"),
    ("hungarian", "hu"),
    ("armenian", "hy"),
    ("herero", "hz"),
    ("interlingua", "ia"),
    ("indonesian", "id"),
    ("interlingue", "ie"),
    ("igbo", "ig"),
    ("sichuan yi", "ii"),
    ("inupiaq", "ik"),
    ("ido", "io"),
    ("icelandic", "is"),
    ("italian", "it"),
    ("inuktitut", "iu"),
    ("japanese", "ja"),
    ("javanese", "jv"),
    ("georgian", "ka"),
    ("kongo", "kg"),
    ("kikuyu", "ki"),
    ("kuanyama", "kj"),
    ("kazakh", "kk"),
    ("kalaallisut", "kl"),
    ("khmer", "km"),
    ("kannada", "kn"),
    ("korean", "ko"),
    ("kanuri", "kr"),
    ("kashmiri", "ks"),
    ("kurdish", "ku"),
    ("komi", "kv"),
    ("cornish", "kw"),
    ("kirghiz", "ky"),
    ("latin", "la"),
    ("luxembourgish", "lb"),
    ("ganda", "lg"),
    ("limburgan", "li"),
    ("lingala", "ln"),
    ("lao", "lo"),
    ("lithuanian", "lt"),
    ("luba-katanga", "lu"),
    ("latvian", "lv"),
    ("malagasy", "mg"),
    ("marshallese", "mh"),
    ("maori", "mi"),
    ("macedonian", "mk"),
    ("malayalam", "ml"),
    ("mongolian", "mn"),
    ("marathi", "mr"),
    ("malay", "ms"),
    ("maltese", "mt"),
    ("burmese", "my"),
    ("nauru", "na"),
    ("norwegian bokmål", "nb"),
    ("north ndebele", "nd"),
    ("nepali", "ne"),
    ("ndonga", "ng"),
    ("dutch", "nl"),
    ("norwegian nynorsk", "nn"),
    ("norwegian", "no"),
    ("south ndebele", "nr"),
    ("navajo", "nv"),
    ("nyanja", "ny"),
    ("occitan", "oc"),
    ("ojibwa", "oj"),
    ("oromo", "om"),
    ("oriya", "or"),
    ("ossetian", "os"),
    ("panjabi", "pa"),
    ("pali", "pi"),
    ("polish", "pl"),
    ("pashto", "ps"),
    ("portuguese", "pt"),
    ("quechua", "qu"),
    ("romansh", "rm"),
    ("rundi", "rn"),
    ("romanian", "ro"),
    ("russian", "ru"),
    ("kinyarwanda", "rw"),
    ("sanskrit", "sa"),
    ("sardinian", "sc"),
    ("sindhi", "sd"),
    ("northern sami", "se"),
    ("sango", "sg"),
    ("sinhala", "si"),
    ("slovak", "sk"),
    ("slovenian", "sl"),
    ("samoan", "sm"),
    ("shona", "sn"),
    ("somali", "so"),
    ("albanian", "sq"),
    ("serbian", "sr"),
    ("swati", "ss"),
    ("southern sotho", "st"),
    ("sundanese", "su"),
    ("swedish", "sv"),
    ("swahili", "sw"),
    ("tamil", "ta"),
    ("telugu", "te"),
    ("tajik", "tg"),
    ("thai", "th"),
    ("tigrinya", "ti"),
    ("turkmen", "tk"),
    ("tagalog", "tl"),
    ("tswana", "tn"),
    ("tonga", "to"),
    ("turkish", "tr"),
    ("tsonga", "ts"),
    ("tatar", "tt"),
    ("twi", "tw"),
    ("tahitian", "ty"),
    ("uighur", "ug"),
    ("ukrainian", "uk"),
    ("urdu", "ur"),
    ("uzbek", "uz"),
    ("venda", "ve"),
    ("vietnamese", "vi"),
    ("volapük", "vo"),
    ("walloon", "wa"),
    ("wolof", "wo"),
    ("xhosa", "xh"),
    ("yiddish", "yi"),
    ("yoruba", "yo"),
    ("zhuang", "za"),
    ("chinese", "zh"),
    ("zulu", "zu"),
    // 别名
    ("bokmål", "nb"),
    ("castilian", "es"),
    ("central khmer", "km"),
    ("chewa", "ny"),
    ("chichewa", "ny"),
    ("divehi", "dv"),
    ("farsi", "fa"),
    ("filipino", "tl"),
    ("flemish", "nl"),
    ("gaelic", "gd"),
    ("greenlandic", "kl"),
    ("haitian creole", "ht"),
    ("kyrgyz", "ky"),
    ("limburgish", "li"),
    ("maldivian", "dv"),
    ("modern greek", "el"),
    ("moldavian", "ro"),
    ("moldovan", "ro"),
    ("norwegian bokmal", "nb"),
    ("nynorsk", "nn"),
    ("odia", "or"),
    ("ossetic", "os"),
    ("punjabi", "pa"),
    ("pushto", "ps"),
    ("sinhalese", "si"),
    ("uyghur", "ug"),
    ("valencian", "ca"),
];

/// 按英文名查 ISO-639-1 代码，忽略大小写以及括号、分号后的限定（如 `Chinese (Simplified)`）。
pub(crate) fn iso_639_1(name: &str) -> Option<&'static str> {
    let base = name.split(['(', ';', ',']).next().unwrap_or_default();
    let key = base.trim().to_lowercase();
    if key.is_empty() {
        return None;
    }
    ISO_639_1
        .iter()
        .find(|(n, _)| *n == key)
        .map(|(_, code)| *code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_common_and_rare_languages() {
        assert_eq!(iso_639_1("English"), Some("en"));
        assert_eq!(iso_639_1(" korean "), Some("ko"));
        assert_eq!(iso_639_1("Ukrainian"), Some("uk"));
        assert_eq!(iso_639_1("Tagalog"), Some("tl"));
        assert_eq!(iso_639_1("Norwegian Bokmål"), Some("nb"));
    }

    #[test]
    fn ignores_qualifiers_and_accepts_aliases() {
        assert_eq!(iso_639_1("Chinese (Simplified)"), Some("zh"));
        assert_eq!(iso_639_1("Spanish; Castilian"), Some("es"));
        assert_eq!(iso_639_1("Filipino"), Some("tl"));
        assert_eq!(iso_639_1("Farsi"), Some("fa"));
    }

    #[test]
    fn unknown_names_give_none() {
        assert_eq!(iso_639_1(""), None);
        assert_eq!(iso_639_1("Klingon"), None);
    }
}
