//! Swappable lookup tables the analyzers consult when the code itself says
//! nothing: field names, helper calls, wrapper helpers and default shapes.
//!
//! Tables are plain data. The engine holds them behind an `Arc`, so a host
//! can extend or replace any of them without touching orchestration code.
pub mod defaults;
pub mod helpers;
pub mod naming;

use once_cell::sync::Lazy;

pub use defaults::DefaultShapes;
pub use helpers::{ConditionalHelper, HelperTable, WrapperCondition};
pub use naming::{NameMatch, NamingRule, NamingTable};

#[derive(Debug, Clone)]
pub struct Heuristics {
    pub naming: NamingTable,
    pub helpers: HelperTable,
    pub defaults: DefaultShapes,
}

static STANDARD: Lazy<Heuristics> = Lazy::new(|| Heuristics {
    naming: NamingTable::standard(),
    helpers: HelperTable::standard(),
    defaults: DefaultShapes::standard(),
});

impl Heuristics {
    pub fn standard() -> &'static Heuristics {
        &STANDARD
    }

    /// Standard tables with `extra` naming rules tried first.
    pub fn with_naming_rules(extra: Vec<NamingRule>) -> Heuristics {
        let mut out = STANDARD.clone();
        out.naming = out.naming.with_prepended(extra);
        out
    }
}

impl Default for Heuristics {
    fn default() -> Self {
        STANDARD.clone()
    }
}
