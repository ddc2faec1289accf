//! Built-in denylist

/// Phrases that frame gender antagonistically or pull the conversation
/// away from careers. Matched as lowercase substrings.
pub(super) const DEFAULT_DENIED_PHRASES: &[&str] = &[
    // Gender-antagonistic framing
    "women are superior",
    "men are inferior",
    "gender superiority",
    "gender war",
    "feminist extremism",
    "hate men",
    "gender bias",
    "political debate",
    "controversial gender",
    "gender discrimination arguments",
    // Off-policy personal and political topics
    "dating advice",
    "relationship problems",
    "personal relationships",
    "political opinions",
    "religious debates",
    "controversial social issues",
    // Guardrails
    "are you single",
    "<script>",
    "aadhar",
    "social security",
    "joke about women",
    "illegal advice",
    "why don't women code",
    "why don\u{2019}t women code",
    "who makes better leaders",
];

/// Patterns for sweeping generalizations, matched against lowercase text
pub(super) const DEFAULT_DENIED_PATTERNS: &[&str] = &[
    r"women are (the )?best",
    r"men are (the )?worst",
    r"only women (can|should)",
    r"men can't",
    r"gender superiority",
];
