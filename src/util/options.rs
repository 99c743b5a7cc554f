// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Analysis options.

#[derive(Clone, Debug)]
pub struct AnalysisOptions {
    /// Reserved: defer virtual callee expansion until receiver sets are
    /// populated. The current effect is conservative (same as off).
    pub on_the_fly_call_graph: bool,
    /// Solver iterations between progress notifications; 0 disables
    /// them.
    pub progress_period: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            on_the_fly_call_graph: false,
            progress_period: 10_000,
        }
    }
}
