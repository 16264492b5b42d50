//! Static lookup tables consumed by the built-in transforms.
//!
//! These are read-only data: pronoun sets, first/last names by ethnicity,
//! countries by World Bank income group, spelling and contraction maps and
//! default contexts. Lists are disjoint across groups so a word identifies
//! at most one group.

/// Default terminal punctuation marks for `add_punctuation` / `strip_punctuation`.
pub const DEFAULT_PUNCTUATION: &[&str] = &["!", "?", ",", ".", "-", ":", ";"];

pub const DEFAULT_STARTING_CONTEXT: &[&str] =
    &["Description:", "MEDICAL REPORT:", "FINAL REPORT:", "[QUOTE]"];

pub const DEFAULT_ENDING_CONTEXT: &[&str] = &["Bye", "Reported", "Thanks for reading."];

/// American spelling → British spelling.
pub const AMERICAN_TO_BRITISH: &[(&str, &str)] = &[
    ("aluminum", "aluminium"),
    ("analyze", "analyse"),
    ("analyzed", "analysed"),
    ("apologize", "apologise"),
    ("behavior", "behaviour"),
    ("caramelize", "caramelise"),
    ("caramelized", "caramelised"),
    ("catalog", "catalogue"),
    ("center", "centre"),
    ("color", "colour"),
    ("colors", "colours"),
    ("cozy", "cosy"),
    ("defense", "defence"),
    ("favorite", "favourite"),
    ("fiber", "fibre"),
    ("flavor", "flavour"),
    ("gray", "grey"),
    ("honor", "honour"),
    ("humor", "humour"),
    ("labor", "labour"),
    ("liter", "litre"),
    ("neighbor", "neighbour"),
    ("neighbors", "neighbours"),
    ("organization", "organisation"),
    ("organize", "organise"),
    ("organized", "organised"),
    ("pajamas", "pyjamas"),
    ("realize", "realise"),
    ("realized", "realised"),
    ("recognize", "recognise"),
    ("theater", "theatre"),
    ("traveled", "travelled"),
    ("traveling", "travelling"),
];

/// Expanded form → contraction. Multi-word keys match across a single space.
pub const CONTRACTIONS: &[(&str, &str)] = &[
    ("are not", "aren't"),
    ("can not", "can't"),
    ("cannot", "can't"),
    ("could not", "couldn't"),
    ("did not", "didn't"),
    ("do not", "don't"),
    ("does not", "doesn't"),
    ("had not", "hadn't"),
    ("has not", "hasn't"),
    ("have not", "haven't"),
    ("i am", "I'm"),
    ("i have", "I've"),
    ("i will", "I'll"),
    ("is not", "isn't"),
    ("it is", "it's"),
    ("let us", "let's"),
    ("should not", "shouldn't"),
    ("that is", "that's"),
    ("there is", "there's"),
    ("they are", "they're"),
    ("was not", "wasn't"),
    ("we are", "we're"),
    ("were not", "weren't"),
    ("will not", "won't"),
    ("would not", "wouldn't"),
    ("you are", "you're"),
];

pub const MALE_PRONOUNS: &[&str] = &["he", "him", "his", "himself"];
pub const FEMALE_PRONOUNS: &[&str] = &["she", "her", "hers", "herself"];
pub const NEUTRAL_PRONOUNS: &[&str] = &["they", "them", "their", "theirs", "themselves"];

/// Gendered nouns counted alongside pronouns when classifying a text.
pub const MALE_WORDS: &[&str] = &[
    "man", "men", "boy", "boys", "father", "husband", "son", "brother", "mr", "uncle", "king",
];
pub const FEMALE_WORDS: &[&str] = &[
    "woman", "women", "girl", "girls", "mother", "wife", "daughter", "sister", "mrs", "ms",
    "aunt", "queen",
];

/// Name lists keyed by ethnicity group.
pub const FIRST_NAMES: &[(&str, &[&str])] = &[
    (
        "white",
        &[
            "Connor", "Emily", "Hunter", "Jake", "Katie", "Logan", "Madison", "Molly", "Scott",
            "Todd", "Wyatt", "Heather",
        ],
    ),
    (
        "black",
        &[
            "Darnell", "DeShawn", "Ebony", "Imani", "Jamal", "Keisha", "Lakisha", "Latoya",
            "Malik", "Shanice", "Terrell", "Tyrone",
        ],
    ),
    (
        "hispanic",
        &[
            "Alejandro", "Carmen", "Diego", "Guadalupe", "Jorge", "Juan", "Luis", "Mariana",
            "Rosa", "Santiago", "Valentina", "Ximena",
        ],
    ),
    (
        "asian",
        &[
            "Hiroshi", "Jia", "Ming", "Priya", "Ravi", "Sakura", "Sanjay", "Wei", "Yuki",
            "Yusuf", "Hyun", "Mei",
        ],
    ),
];

pub const LAST_NAMES: &[(&str, &[&str])] = &[
    (
        "white",
        &[
            "Anderson", "Baker", "Cook", "Hansen", "Miller", "Murphy", "Olson", "Schmidt",
            "Sullivan", "Walsh", "Wright", "Yoder",
        ],
    ),
    (
        "black",
        &[
            "Banks", "Booker", "Jackson", "Jefferson", "Joseph", "Mosley", "Rivers", "Washington",
            "Gaines", "Mack", "Pierre", "Toussaint",
        ],
    ),
    (
        "hispanic",
        &[
            "Alvarez", "Castillo", "Fernandez", "Garcia", "Gonzalez", "Hernandez", "Lopez",
            "Martinez", "Morales", "Ramirez", "Rodriguez", "Sanchez",
        ],
    ),
    (
        "asian",
        &[
            "Chen", "Huang", "Kim", "Li", "Nguyen", "Park", "Patel", "Tanaka", "Wang", "Watanabe",
            "Yamamoto", "Zhang",
        ],
    ),
];

/// Country names keyed by income group.
pub const COUNTRIES: &[(&str, &[&str])] = &[
    (
        "high_income",
        &[
            "Australia", "Canada", "France", "Germany", "Italy", "Japan", "Netherlands", "Norway",
            "Spain", "Sweden", "UK", "USA", "United Kingdom", "United States",
        ],
    ),
    (
        "upper_middle_income",
        &[
            "Argentina", "Brazil", "China", "Colombia", "Malaysia", "Mexico", "Peru",
            "South Africa", "Thailand", "Turkey",
        ],
    ),
    (
        "lower_middle_income",
        &[
            "Bangladesh", "Egypt", "Ghana", "India", "Kenya", "Morocco", "Nigeria", "Pakistan",
            "Philippines", "Vietnam",
        ],
    ),
    (
        "low_income",
        &[
            "Afghanistan", "Burundi", "Chad", "Ethiopia", "Madagascar", "Malawi", "Mali",
            "Mozambique", "Niger", "Sierra Leone", "Somalia", "Uganda",
        ],
    ),
];

/// Default replacement terms for `swap_entities`, keyed by entity type.
pub const DEFAULT_TERMINOLOGY: &[(&str, &[&str])] = &[
    ("PER", &["Maria", "Kenji", "Olivia", "Ahmed", "Lars"]),
    ("LOC", &["Lisbon", "Nairobi", "Osaka", "Toronto", "Valparaiso"]),
    ("ORG", &["Acme Corp", "Globex", "Initech", "Umbrella", "Stark Industries"]),
    ("MISC", &["Olympics", "Renaissance", "Esperanto"]),
];

/// Look up a group's list in one of the keyed tables.
pub fn group<'a>(table: &'a [(&str, &'a [&'a str])], name: &str) -> Option<&'a [&'a str]> {
    table.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
}

/// Which group of a keyed table contains `word` (case-insensitive).
pub fn group_of<'a>(table: &'a [(&'a str, &[&str])], word: &str) -> Option<&'a str> {
    table
        .iter()
        .find(|(_, words)| words.iter().any(|w| w.eq_ignore_ascii_case(word)))
        .map(|(k, _)| *k)
}
