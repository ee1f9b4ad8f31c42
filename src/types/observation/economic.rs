use crate::types::country::Country;

/// One yearly value of one development indicator.
#[derive(Debug, PartialEq, Clone)]
pub struct EconomicObservation {
    pub country: Country,
    /// World Bank indicator code, e.g. `NY.GDP.PCAP.CD`.
    pub indicator_id: String,
    pub indicator_name: Option<String>,
    pub year: i32,
    pub value: f64,
    pub is_synthetic: bool,
}
