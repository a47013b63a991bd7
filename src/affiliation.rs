//! Access classes derived from a user's affiliation

/// Affiliations whose members book under the consortium access class
const MEMC_AFFILIATIONS: [&str; 9] =
	["wads", "nyu", "colu", "mskcc", "mssm", "cuny", "aecom", "weil", "ru"];

/// Access class of consortium members
pub const MEMC: &str = "memc";

/// Map an affiliation to its access class: consortium institutions share
/// [`MEMC`], everything else is its own class.
#[must_use]
pub fn access_for_affiliation(affiliation: &str) -> String {
	let affiliation = affiliation.trim().to_lowercase();
	if MEMC_AFFILIATIONS.contains(&affiliation.as_str()) {
		return MEMC.to_owned();
	}
	affiliation
}
