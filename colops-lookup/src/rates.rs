/// Exchange rates fixed for the lifetime of the process.
///
/// Loaded once during startup and handed to the conversion evaluators; nothing
/// refreshes them while serving.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StaticRates {
    pub usd_to_inr: f64,
    pub usd_to_gbp: f64,
}

impl StaticRates {
    pub fn new(usd_to_inr: f64, usd_to_gbp: f64) -> Self {
        Self {
            usd_to_inr,
            usd_to_gbp,
        }
    }
}
