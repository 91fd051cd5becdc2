//! Genre families and cross-family mixing affinity

use crate::types::DrumPattern;

/// Broad family a declared genre belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenreFamily {
    House,
    Techno,
    Bass,
    Latin,
    Pop,
    HipHop,
    AsianPop,
    Trance,
    Breaks,
}

const FAMILY_MEMBERS: &[(GenreFamily, &[&str])] = &[
    (
        GenreFamily::House,
        &[
            "deep_house",
            "tech_house",
            "house",
            "progressive_house",
            "funky_house",
            "disco_house",
            "afro_house",
            "soulful_house",
            "jackin_house",
            "bass_house",
            "uk_garage",
        ],
    ),
    (
        GenreFamily::Techno,
        &[
            "techno",
            "minimal_techno",
            "melodic_techno",
            "hard_techno",
            "industrial_techno",
            "acid_techno",
            "detroit_techno",
            "dub_techno",
        ],
    ),
    (
        GenreFamily::Bass,
        &[
            "dubstep",
            "drum_and_bass",
            "jungle",
            "uk_bass",
            "future_bass",
            "trap",
            "grime",
        ],
    ),
    (
        GenreFamily::Latin,
        &[
            "baile_funk",
            "reggaeton",
            "dembow",
            "guaracha",
            "latin_house",
            "moombahton",
        ],
    ),
    (
        GenreFamily::Pop,
        &["pop", "dance_pop", "electro_pop", "synth_pop"],
    ),
    (
        GenreFamily::HipHop,
        &["hip_hop", "r_and_b", "jersey_club"],
    ),
    (
        GenreFamily::AsianPop,
        &["kpop", "jpop", "chinese_pop", "mandopop", "cantopop"],
    ),
    (
        GenreFamily::Trance,
        &[
            "trance",
            "progressive_trance",
            "uplifting_trance",
            "psytrance",
            "hard_trance",
        ],
    ),
    (
        GenreFamily::Breaks,
        &["breakbeat", "big_beat", "nu_skool_breaks", "electro"],
    ),
];

/// Families each family mixes well into
fn cross_compatible(family: GenreFamily) -> &'static [GenreFamily] {
    use GenreFamily::*;
    match family {
        House => &[Techno, Breaks, Latin],
        Techno => &[House, Trance, Breaks],
        Bass => &[HipHop, Breaks],
        Latin => &[House, HipHop, Pop],
        Pop => &[House, HipHop, AsianPop],
        HipHop => &[Bass, Pop, Latin],
        // vocal-led asian pop does not bridge into club families
        AsianPop => &[Pop],
        Trance => &[Techno, House],
        Breaks => &[House, Techno, Bass],
    }
}

fn normalize(genre: &str) -> String {
    genre
        .trim()
        .to_lowercase()
        .replace(['-', ' ', '&'], "_")
        .replace("__", "_")
}

/// Family for a declared genre, if known
pub fn family_of(genre: &str) -> Option<GenreFamily> {
    let normalized = normalize(genre);
    let normalized = match normalized.as_str() {
        "hiphop" | "rap" => "hip_hop".to_string(),
        "dnb" | "d_b" => "drum_and_bass".to_string(),
        "k_pop" => "kpop".to_string(),
        "j_pop" => "jpop".to_string(),
        "c_pop" | "cpop" => "chinese_pop".to_string(),
        "rnb" | "r_b" => "r_and_b".to_string(),
        _ => normalized,
    };
    FAMILY_MEMBERS
        .iter()
        .find(|(_, members)| members.contains(&normalized.as_str()))
        .map(|(family, _)| *family)
}

/// Mixing affinity between two declared genres
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenreAffinity {
    pub compatible: bool,
    /// 0-100
    pub score: f64,
}

/// Affinity between two genres, `None` when either family is unknown
pub fn affinity(a: &str, b: &str) -> Option<GenreAffinity> {
    let (family_a, family_b) = (family_of(a)?, family_of(b)?);

    let (compatible, score) = if family_a == family_b {
        (true, 100.0)
    } else if cross_compatible(family_a).contains(&family_b)
        || cross_compatible(family_b).contains(&family_a)
    {
        (true, 80.0)
    } else {
        (false, 20.0)
    };
    Some(GenreAffinity { compatible, score })
}

/// Infer a drum pattern family from genre keywords
pub fn rhythm_family_from_genre(genre: &str) -> DrumPattern {
    let lower = genre.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if has(&["trap", "dubstep", "hip hop", "hip-hop", "hiphop", "rap", "r&b", "future bass"]) {
        DrumPattern::HalfTime
    } else if has(&["break", "drum and bass", "dnb", "jungle", "garage", "electro"]) {
        DrumPattern::Breakbeat
    } else if has(&["reggaeton", "baile", "latin", "dembow", "moombahton", "guaracha", "afro"]) {
        DrumPattern::Latin
    } else if has(&["house", "techno", "trance", "disco", "edm", "dance"]) {
        DrumPattern::FourOnFloor
    } else {
        DrumPattern::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_lookup_normalizes() {
        assert_eq!(family_of("Tech House"), Some(GenreFamily::House));
        assert_eq!(family_of("drum-and-bass"), Some(GenreFamily::Bass));
        assert_eq!(family_of("Hip-Hop"), Some(GenreFamily::HipHop));
        assert_eq!(family_of("K-Pop"), Some(GenreFamily::AsianPop));
        assert_eq!(family_of("polka"), None);
    }

    #[test]
    fn test_affinity_levels() {
        let same = affinity("deep house", "tech_house").unwrap();
        assert!(same.compatible);
        assert_eq!(same.score, 100.0);

        let cross = affinity("house", "techno").unwrap();
        assert!(cross.compatible);
        assert_eq!(cross.score, 80.0);

        let clash = affinity("kpop", "techno").unwrap();
        assert!(!clash.compatible);

        assert!(affinity("house", "polka").is_none());
    }

    #[test]
    fn test_rhythm_family_keywords() {
        assert_eq!(rhythm_family_from_genre("Melodic Techno"), DrumPattern::FourOnFloor);
        assert_eq!(rhythm_family_from_genre("Festival Trap"), DrumPattern::HalfTime);
        assert_eq!(rhythm_family_from_genre("Nu Skool Breaks"), DrumPattern::Breakbeat);
        assert_eq!(rhythm_family_from_genre("Reggaeton"), DrumPattern::Latin);
        assert_eq!(rhythm_family_from_genre("Ambient"), DrumPattern::Unknown);
    }
}
