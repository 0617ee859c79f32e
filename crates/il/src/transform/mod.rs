//! IL-to-IL transform passes
//!
//! Every pass has the signature `fn(&mut Module)` and leaves the module
//! verifier-clean when given verifier-clean input. Passes rebuild any CFG
//! view they need internally; they never cache analysis results across
//! mutations.

pub mod constfold;
pub mod dce;
pub mod gvn;
pub mod instcombine;
pub mod licm;
pub mod mem2reg;
pub mod simplifycfg;

use crate::module::Module;

/// Name -> implementation table for pipeline wiring. Ordering matches
/// the `O2` preset superset.
pub const PASSES: &[(&str, fn(&mut Module))] = &[
    ("mem2reg", mem2reg::run),
    ("constfold", constfold::run),
    ("dce", dce::run),
    ("simplifycfg", simplifycfg::run),
    ("licm", licm::run),
    ("gvn", gvn::run),
    ("instcombine", instcombine::run),
];

/// Look up a pass implementation by name.
pub fn pass_by_name(name: &str) -> Option<fn(&mut Module)> {
    PASSES
        .iter()
        .find(|(id, _)| *id == name)
        .map(|(_, run)| *run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::pipelines;

    #[test]
    fn test_every_preset_pass_is_implemented() {
        for id in pipelines::O2 {
            assert!(pass_by_name(id).is_some(), "missing pass '{id}'");
        }
        assert!(pass_by_name("nonesuch").is_none());
    }
}
