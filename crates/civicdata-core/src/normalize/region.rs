//! Administrative region names.
//!
//! Providers spell the same county with 台 or 臺, with or without the 市/縣
//! suffix, in English, or under a pre-2010 name. All of them collapse to the
//! official 臺-form name.

struct Region {
    canonical: &'static str,
    /// Lower-case, 臺-form spellings.
    aliases: &'static [&'static str],
}

const REGIONS: &[Region] = &[
    Region { canonical: "臺北市", aliases: &["臺北", "taipei", "taipei city"] },
    Region { canonical: "新北市", aliases: &["新北", "臺北縣", "new taipei", "new taipei city"] },
    Region { canonical: "桃園市", aliases: &["桃園", "桃園縣", "taoyuan", "taoyuan city"] },
    Region { canonical: "臺中市", aliases: &["臺中", "臺中縣", "taichung", "taichung city"] },
    Region { canonical: "臺南市", aliases: &["臺南", "臺南縣", "tainan", "tainan city"] },
    Region { canonical: "高雄市", aliases: &["高雄", "高雄縣", "kaohsiung", "kaohsiung city"] },
    Region { canonical: "基隆市", aliases: &["基隆", "keelung", "keelung city"] },
    Region { canonical: "新竹市", aliases: &["hsinchu city"] },
    Region { canonical: "新竹縣", aliases: &["hsinchu county"] },
    Region { canonical: "苗栗縣", aliases: &["苗栗", "miaoli", "miaoli county"] },
    Region { canonical: "彰化縣", aliases: &["彰化", "changhua", "changhua county"] },
    Region { canonical: "南投縣", aliases: &["南投", "nantou", "nantou county"] },
    Region { canonical: "雲林縣", aliases: &["雲林", "yunlin", "yunlin county"] },
    Region { canonical: "嘉義市", aliases: &["chiayi city"] },
    Region { canonical: "嘉義縣", aliases: &["chiayi county"] },
    Region { canonical: "屏東縣", aliases: &["屏東", "pingtung", "pingtung county"] },
    Region { canonical: "宜蘭縣", aliases: &["宜蘭", "yilan", "yilan county"] },
    Region { canonical: "花蓮縣", aliases: &["花蓮", "hualien", "hualien county"] },
    Region { canonical: "臺東縣", aliases: &["臺東", "taitung", "taitung county"] },
    Region { canonical: "澎湖縣", aliases: &["澎湖", "penghu", "penghu county"] },
    Region { canonical: "金門縣", aliases: &["金門", "kinmen", "kinmen county"] },
    Region { canonical: "連江縣", aliases: &["連江", "馬祖", "lienchiang", "lienchiang county", "matsu"] },
];

/// Map any known spelling of a region to its canonical name.
///
/// Unknown names are returned trimmed, with 台 folded to 臺, so the function is
/// idempotent on its own output.
pub fn canonical_region(raw: &str) -> String {
    let cleaned = raw.trim().replace('台', "臺");
    let folded = cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    REGIONS
        .iter()
        .find(|r| r.canonical == cleaned || r.aliases.contains(&folded.as_str()))
        .map(|r| r.canonical.to_string())
        .unwrap_or(cleaned)
}

/// All canonical region names.
pub fn known_regions() -> impl Iterator<Item = &'static str> {
    REGIONS.iter().map(|r| r.canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_variant_maps_to_one_name() {
        let cases: &[(&str, &[&str])] = &[
            ("臺北市", &["台北市", "臺北市", "台北", "Taipei", "Taipei City", "  taipei   city "]),
            ("新北市", &["新北市", "台北縣", "New Taipei City", "新北"]),
            ("臺中市", &["台中市", "台中", "臺中縣", "Taichung"]),
            ("臺東縣", &["台東縣", "台東", "Taitung County"]),
            ("連江縣", &["馬祖", "Matsu", "連江縣"]),
        ];
        for (expected, variants) in cases {
            for variant in *variants {
                assert_eq!(canonical_region(variant), *expected, "variant {variant}");
            }
        }
    }

    #[test]
    fn test_canonical_names_are_fixed_points() {
        for name in known_regions() {
            assert_eq!(canonical_region(name), name);
            assert_eq!(canonical_region(&name.replace('臺', "台")), name);
        }
    }

    #[test]
    fn test_ambiguous_and_unknown_names_pass_through() {
        assert_eq!(canonical_region("新竹"), "新竹");
        assert_eq!(canonical_region(" 台灣 "), "臺灣");
        assert_eq!(canonical_region(&canonical_region("台灣")), "臺灣");
    }
}
