// src/fiber_typing.rs - Fiber type from thresholded marker channels

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::FiberSightError;
use crate::geometry::RegionId;

/// Default positive-area percentage a marker needs to count as expressed
pub const DEFAULT_POSITIVITY_THRESHOLD: f64 = 50.0;

/// Myosin heavy chain markers, in nearest-neighbour continuum order
/// I <-> IIa <-> IIx <-> IIb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    I,
    IIa,
    IIx,
    IIb,
}

impl Channel {
    pub const CONTINUUM: [Channel; 4] = [Channel::I, Channel::IIa, Channel::IIx, Channel::IIb];

    pub fn label(self) -> &'static str {
        match self {
            Channel::I => "I",
            Channel::IIa => "IIa",
            Channel::IIx => "IIx",
            Channel::IIb => "IIb",
        }
    }

    /// Neighbours on the continuum may legitimately co-express
    pub fn is_adjacent(self, other: Channel) -> bool {
        AdjacentPair::of(self, other).is_some()
    }
}

/// Two neighbouring channels on the continuum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdjacentPair {
    IIIa,
    IIaIIx,
    IIxIIb,
}

impl AdjacentPair {
    pub const ALL: [AdjacentPair; 3] = [AdjacentPair::IIIa, AdjacentPair::IIaIIx, AdjacentPair::IIxIIb];

    /// The pair two channels form, in either order, if they are neighbours
    pub fn of(a: Channel, b: Channel) -> Option<Self> {
        match (a.min(b), a.max(b)) {
            (Channel::I, Channel::IIa) => Some(AdjacentPair::IIIa),
            (Channel::IIa, Channel::IIx) => Some(AdjacentPair::IIaIIx),
            (Channel::IIx, Channel::IIb) => Some(AdjacentPair::IIxIIb),
            _ => None,
        }
    }

    pub fn lower(self) -> Channel {
        match self {
            AdjacentPair::IIIa => Channel::I,
            AdjacentPair::IIaIIx => Channel::IIa,
            AdjacentPair::IIxIIb => Channel::IIx,
        }
    }

    pub fn upper(self) -> Channel {
        match self {
            AdjacentPair::IIIa => Channel::IIa,
            AdjacentPair::IIaIIx => Channel::IIx,
            AdjacentPair::IIxIIb => Channel::IIb,
        }
    }

    pub fn hybrid(self) -> FiberType {
        match self {
            AdjacentPair::IIIa => FiberType::HybridIIIa,
            AdjacentPair::IIaIIx => FiberType::HybridIIaIIx,
            AdjacentPair::IIxIIb => FiberType::HybridIIxIIb,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Channel {
    type Err = FiberSightError;

    /// Accepts both `"IIa"` and `"Type IIa"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let name = trimmed.strip_prefix("Type ").unwrap_or(trimmed).trim();
        Channel::CONTINUUM
            .into_iter()
            .find(|c| c.label() == name)
            .ok_or_else(|| FiberSightError::UnknownChannel(s.to_string()))
    }
}

/// Canonical fiber type labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FiberType {
    I,
    IIa,
    IIx,
    IIb,
    #[serde(rename = "I/IIa")]
    HybridIIIa,
    #[serde(rename = "IIa/IIx")]
    HybridIIaIIx,
    #[serde(rename = "IIx/IIb")]
    HybridIIxIIb,
    /// Non-canonical co-expression
    #[serde(rename = "UND")]
    Undetermined,
    /// No marker cleared the threshold
    #[serde(rename = "UND-")]
    UndeterminedNone,
    /// Three or more markers cleared the threshold
    #[serde(rename = "UND+")]
    UndeterminedMany,
    /// A channel outside the continuum was supplied
    #[serde(rename = "Err")]
    Error,
}

impl FiberType {
    pub const ALL: [FiberType; 11] = [
        FiberType::I,
        FiberType::IIa,
        FiberType::IIx,
        FiberType::IIb,
        FiberType::HybridIIIa,
        FiberType::HybridIIaIIx,
        FiberType::HybridIIxIIb,
        FiberType::Undetermined,
        FiberType::UndeterminedNone,
        FiberType::UndeterminedMany,
        FiberType::Error,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FiberType::I => "I",
            FiberType::IIa => "IIa",
            FiberType::IIx => "IIx",
            FiberType::IIb => "IIb",
            FiberType::HybridIIIa => "I/IIa",
            FiberType::HybridIIaIIx => "IIa/IIx",
            FiberType::HybridIIxIIb => "IIx/IIb",
            FiberType::Undetermined => "UND",
            FiberType::UndeterminedNone => "UND-",
            FiberType::UndeterminedMany => "UND+",
            FiberType::Error => "Err",
        }
    }

    pub fn single(channel: Channel) -> Self {
        match channel {
            Channel::I => FiberType::I,
            Channel::IIa => FiberType::IIa,
            Channel::IIx => FiberType::IIx,
            Channel::IIb => FiberType::IIb,
        }
    }
}

impl fmt::Display for FiberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether co-expressing neighbours are reported as hybrids. When a flag is
/// off the stronger marker wins instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct HybridFlags {
    #[serde(default)]
    pub type_i_iia: bool,
    #[serde(default)]
    pub type_iia_iix: bool,
    #[serde(default)]
    pub type_iix_iib: bool,
}

impl HybridFlags {
    pub fn all() -> Self {
        Self {
            type_i_iia: true,
            type_iia_iix: true,
            type_iix_iib: true,
        }
    }

    pub fn allows(self, pair: AdjacentPair) -> bool {
        match pair {
            AdjacentPair::IIIa => self.type_i_iia,
            AdjacentPair::IIaIIx => self.type_iia_iix,
            AdjacentPair::IIxIIb => self.type_iix_iib,
        }
    }
}

/// Percent positive area per marker channel for one fiber
pub type ChannelFractions = BTreeMap<Channel, f64>;

/// Bin a fiber from the markers that already cleared the threshold.
///
/// * none -> `UND-`
/// * one -> that single type
/// * two neighbours -> hybrid if enabled, else the larger fraction (ties go
///   to the lower type)
/// * two non-neighbours -> `UND`
/// * three or more -> `UND+`
pub fn choose_fiber_type(positive: &ChannelFractions, hybrid: HybridFlags) -> FiberType {
    let marked: Vec<(Channel, f64)> = positive.iter().map(|(c, p)| (*c, *p)).collect();

    match marked.as_slice() {
        [] => FiberType::UndeterminedNone,
        [(only, _)] => FiberType::single(*only),
        [(lower, lower_pct), (upper, upper_pct)] => match AdjacentPair::of(*lower, *upper) {
            None => FiberType::Undetermined,
            Some(pair) if hybrid.allows(pair) => pair.hybrid(),
            Some(_) if lower_pct >= upper_pct => FiberType::single(*lower),
            Some(_) => FiberType::single(*upper),
        },
        _ => FiberType::UndeterminedMany,
    }
}

/// Retain the channels at or above `threshold` and bin the fiber. NaN
/// fractions count as 0 %.
pub fn classify_channels(fractions: &ChannelFractions, threshold: f64, hybrid: HybridFlags) -> FiberType {
    let positive: ChannelFractions = fractions
        .iter()
        .map(|(c, p)| (*c, if p.is_nan() { 0.0 } else { *p }))
        .filter(|(_, p)| *p >= threshold)
        .collect();
    choose_fiber_type(&positive, hybrid)
}

/// Classify from named channels. Any name outside the continuum, or a
/// channel given twice, yields the `Err` label instead of failing.
pub fn classify<'a, I>(positivity: I, threshold: f64, hybrid: HybridFlags) -> FiberType
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    let mut fractions = ChannelFractions::new();
    for (name, percent) in positivity {
        match name.parse::<Channel>() {
            Ok(channel) => {
                if fractions.insert(channel, percent).is_some() {
                    return FiberType::Error;
                }
            }
            Err(_) => return FiberType::Error,
        }
    }
    classify_channels(&fractions, threshold, hybrid)
}

/// Classify every fiber of an image from its named channel fractions
pub fn classify_fibers<'a, R, C>(records: R, threshold: f64, hybrid: HybridFlags) -> BTreeMap<RegionId, FiberType>
where
    R: IntoIterator<Item = (RegionId, C)>,
    C: IntoIterator<Item = (&'a str, f64)>,
{
    records
        .into_iter()
        .map(|(id, channels)| (id, classify(channels, threshold, hybrid)))
        .collect()
}

/// Parse named fractions, skipping names outside the continuum
pub fn known_channel_fractions<'a, I>(positivity: I) -> ChannelFractions
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    positivity
        .into_iter()
        .filter_map(|(name, percent)| name.parse::<Channel>().ok().map(|c| (c, percent)))
        .collect()
}

/// Number of fibers per type label
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FiberTypeCounts(BTreeMap<FiberType, usize>);

impl FiberTypeCounts {
    pub fn tally<I: IntoIterator<Item = FiberType>>(types: I) -> Self {
        let mut counts = BTreeMap::new();
        for fiber_type in types {
            *counts.entry(fiber_type).or_insert(0) += 1;
        }
        Self(counts)
    }

    pub fn get(&self, fiber_type: FiberType) -> usize {
        self.0.get(&fiber_type).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FiberType, usize)> + '_ {
        self.0.iter().map(|(t, n)| (*t, *n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: f64 = DEFAULT_POSITIVITY_THRESHOLD;

    #[test]
    fn single_marker_above_threshold() {
        assert_eq!(classify([("I", 80.0), ("IIa", 30.0)], T, HybridFlags::default()), FiberType::I);
    }

    #[test]
    fn adjacent_pair_hybrid_or_stronger() {
        let input = [("IIa", 60.0), ("IIx", 70.0)];
        let hybrids = HybridFlags { type_iia_iix: true, ..Default::default() };
        assert_eq!(classify(input, T, hybrids), FiberType::HybridIIaIIx);
        assert_eq!(classify(input, T, HybridFlags::default()), FiberType::IIx);
        // Other pairs' flags do not apply
        let wrong = HybridFlags { type_i_iia: true, type_iix_iib: true, ..Default::default() };
        assert_eq!(classify(input, T, wrong), FiberType::IIx);
    }

    #[test]
    fn every_neighbour_pair_has_its_own_hybrid() {
        let flags = HybridFlags::all();
        for pair in AdjacentPair::ALL {
            assert_eq!(AdjacentPair::of(pair.upper(), pair.lower()), Some(pair));
            assert!(pair.lower().is_adjacent(pair.upper()));
            assert!(flags.allows(pair));
            assert!(!HybridFlags::default().allows(pair));
            let input = [(pair.lower().label(), 70.0), (pair.upper().label(), 60.0)];
            assert_eq!(classify(input, T, flags), pair.hybrid());
            assert_eq!(classify(input, T, HybridFlags::default()), FiberType::single(pair.lower()));
        }
        assert_eq!(AdjacentPair::of(Channel::IIb, Channel::IIb), None);
        assert_eq!(AdjacentPair::of(Channel::I, Channel::IIx), None);
        assert_ne!(AdjacentPair::IIIa.hybrid(), FiberType::Error);
    }

    #[test]
    fn ties_favour_the_lower_type() {
        assert_eq!(classify([("IIx", 65.0), ("IIa", 65.0)], T, HybridFlags::default()), FiberType::IIa);
        assert_eq!(classify([("IIb", 90.0), ("IIx", 90.0)], T, HybridFlags::default()), FiberType::IIx);
    }

    #[test]
    fn non_adjacent_pairs_are_undetermined() {
        for flags in [HybridFlags::default(), HybridFlags::all()] {
            assert_eq!(classify([("I", 55.0), ("IIx", 55.0)], T, flags), FiberType::Undetermined);
            assert_eq!(classify([("I", 55.0), ("IIb", 95.0)], T, flags), FiberType::Undetermined);
            assert_eq!(classify([("IIa", 55.0), ("IIb", 55.0)], T, flags), FiberType::Undetermined);
        }
    }

    #[test]
    fn cardinality_extremes() {
        let flags = HybridFlags::all();
        assert_eq!(classify([("I", 10.0), ("IIa", 49.9)], T, flags), FiberType::UndeterminedNone);
        assert_eq!(classify(Vec::<(&str, f64)>::new(), T, flags), FiberType::UndeterminedNone);
        assert_eq!(
            classify([("I", 60.0), ("IIa", 60.0), ("IIx", 60.0)], T, flags),
            FiberType::UndeterminedMany
        );
        assert_eq!(
            classify([("I", 60.0), ("IIa", 60.0), ("IIx", 60.0), ("IIb", 60.0)], T, flags),
            FiberType::UndeterminedMany
        );
    }

    #[test]
    fn threshold_is_inclusive_and_nan_is_zero() {
        assert_eq!(classify([("IIb", 50.0)], T, HybridFlags::default()), FiberType::IIb);
        assert_eq!(classify([("IIb", f64::NAN)], T, HybridFlags::default()), FiberType::UndeterminedNone);
        assert_eq!(classify([("IIb", 20.0)], 20.0, HybridFlags::default()), FiberType::IIb);
    }

    #[test]
    fn unknown_or_repeated_channels_give_error_label() {
        assert_eq!(classify([("eMHC", 90.0)], T, HybridFlags::default()), FiberType::Error);
        assert_eq!(classify([("I", 10.0), ("DAPI", 5.0)], T, HybridFlags::default()), FiberType::Error);
        assert_eq!(classify([("I", 90.0), ("I", 10.0)], T, HybridFlags::default()), FiberType::Error);
    }

    #[test]
    fn type_prefixed_names_parse() {
        assert_eq!("Type IIa".parse::<Channel>().unwrap(), Channel::IIa);
        assert_eq!(" IIx ".parse::<Channel>().unwrap(), Channel::IIx);
        assert!(matches!("Border".parse::<Channel>(), Err(FiberSightError::UnknownChannel(_))));
        let known = known_channel_fractions([("Type I", 12.0), ("DAPI", 3.0)]);
        assert_eq!(known.len(), 1);
        assert_eq!(known.get(&Channel::I), Some(&12.0));
    }

    #[test]
    fn every_valid_input_gets_a_documented_label() {
        let values = [0.0, 49.0, 50.0, 75.0, 100.0];
        let flags = [HybridFlags::default(), HybridFlags::all()];
        for &a in &values {
            for &b in &values {
                for &c in &values {
                    for &d in &values {
                        for &f in &flags {
                            let t = classify([("I", a), ("IIa", b), ("IIx", c), ("IIb", d)], T, f);
                            assert!(FiberType::ALL.contains(&t));
                            assert_ne!(t, FiberType::Error);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn fibers_are_typed_by_id() {
        let records = vec![
            (7, vec![("Type I", 90.0)]),
            (2, vec![("Type IIa", 60.0), ("Type IIx", 60.0)]),
            (4, vec![]),
        ];
        let types = classify_fibers(records, T, HybridFlags::default());
        assert_eq!(types.get(&7), Some(&FiberType::I));
        assert_eq!(types.get(&2), Some(&FiberType::IIa));
        assert_eq!(types.get(&4), Some(&FiberType::UndeterminedNone));
    }

    #[test]
    fn counts_tally_labels() {
        let counts = FiberTypeCounts::tally([FiberType::I, FiberType::IIa, FiberType::I]);
        assert_eq!(counts.get(FiberType::I), 2);
        assert_eq!(counts.get(FiberType::IIb), 0);
        assert_eq!(counts.total(), 3);
        assert_eq!(FiberType::HybridIIaIIx.to_string(), "IIa/IIx");
    }
}
