// Emoji/pictograph stripping for untrusted text fields

/// Unicode ranges removed from nicknames and message bodies.
///
/// Covers the emoji blocks plus the joiners and selectors that compose
/// them, so no residue of a stripped sequence survives a second pass.
const STRIPPED_RANGES: &[(u32, u32)] = &[
    (0x200D, 0x200D),   // zero width joiner
    (0x2300, 0x23FF),   // miscellaneous technical (watch, hourglass, ...)
    (0x2600, 0x26FF),   // miscellaneous symbols
    (0x2700, 0x27BF),   // dingbats
    (0x2B00, 0x2BFF),   // misc symbols and arrows (stars, shapes)
    (0xFE00, 0xFE0F),   // variation selectors
    (0x1F000, 0x1F0FF), // mahjong / dominoes / playing cards
    (0x1F100, 0x1F1FF), // enclosed alphanumerics, regional indicators
    (0x1F300, 0x1F5FF), // misc symbols and pictographs
    (0x1F600, 0x1F64F), // emoticons
    (0x1F680, 0x1F6FF), // transport and map symbols
    (0x1F700, 0x1F77F), // alchemical symbols
    (0x1F780, 0x1F7FF), // geometric shapes extended
    (0x1F800, 0x1F8FF), // supplemental arrows-c
    (0x1F900, 0x1F9FF), // supplemental symbols and pictographs
    (0x1FA00, 0x1FAFF), // symbols and pictographs extended-a
];

fn is_stripped(c: char) -> bool {
    let code = c as u32;
    STRIPPED_RANGES
        .iter()
        .any(|&(lo, hi)| code >= lo && code <= hi)
}

/// Remove emoji and pictographic characters from untrusted input.
///
/// Pure and idempotent: the kept character set is closed under removal,
/// so a second pass is always a no-op. Never lengthens its input.
pub fn clean(text: &str) -> String {
    text.chars().filter(|c| !is_stripped(*c)).collect()
}
