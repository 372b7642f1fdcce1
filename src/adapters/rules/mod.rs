//! Rules engine adapters.

mod shakmaty_rules;

pub use shakmaty_rules::ShakmatyRules;
