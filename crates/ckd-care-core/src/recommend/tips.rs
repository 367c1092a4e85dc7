//! The fixed four-item lifestyle tip list, per language.

use crate::models::Language;

const TIPS_EN: [&str; 4] = [
    "Stay hydrated with appropriate fluid intake",
    "Monitor blood pressure regularly",
    "Follow prescribed medication schedule",
    "Maintain regular follow-ups with healthcare provider",
];

const TIPS_KN: [&str; 4] = [
    "ಸೂಕ್ತ ದ್ರವ ಸೇವನೆಯೊಂದಿಗೆ ಜಲಯುಕ್ತವಾಗಿರಿ",
    "ರಕ್ತದೊತ್ತಡವನ್ನು ನಿಯಮಿತವಾಗಿ ಮೇಲ್ವಿಚಾರಣೆ ಮಾಡಿ",
    "ನಿರ್ದಿಷ್ಟಪಡಿಸಿದ ಔಷಧಿ ವೇಳಾಪಟ್ಟಿಯನ್ನು ಅನುಸರಿಸಿ",
    "ಆರೋಗ್ಯ ಸೇವೆ ಒದಗಿಸುವವರೊಂದಿಗೆ ನಿಯಮಿತ ಫಾಲೋ-ಅಪ್‌ಗಳನ್ನು ನಿರ್ವಹಿಸಿ",
];

/// Lifestyle tips in the requested language.
pub fn lifestyle_tips(language: Language) -> Vec<String> {
    let tips = match language {
        Language::English => &TIPS_EN,
        Language::Kannada => &TIPS_KN,
    };
    tips.iter().map(|t| t.to_string()).collect()
}
