//! PositionInfo disambiguation
//!
//! Position managers report a position's range in encodings that carry no
//! version tag: a packed uint256 with signed 24-bit tick fields at offsets
//! that differ between contract families, or a 2-3 field tuple that may hold
//! a boolean subscriber flag at either end. Tick-spacing alignment is the only
//! reliable way to tell the candidates apart.
//!
//! The response shape is fixed once into [`RawPositionInfo`]; decoding then
//! walks [`LAYOUT_CANDIDATES`] in priority order and reports how confident the
//! match is.

use super::events::DecodingError;
use ethereum_types::U256;
use ladder_amm::pool_key::{word_to_signed, TRUNCATED_POOL_ID_LEN};
use ladder_amm::{PoolId, MAX_TICK, MIN_TICK};
use tracing::{debug, warn};

/// Packed tick layout: bit offsets of the two signed 24-bit fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedLayout {
    pub name: &'static str,
    pub tick_lower_offset: u32,
    pub tick_upper_offset: u32,
}

/// Candidate layouts in priority order. The first is also the fallback.
pub const LAYOUT_CANDIDATES: [PackedLayout; 3] = [
    PackedLayout {
        name: "standard",
        tick_lower_offset: 8,
        tick_upper_offset: 32,
    },
    PackedLayout {
        name: "shifted",
        tick_lower_offset: 24,
        tick_upper_offset: 48,
    },
    PackedLayout {
        name: "top-down",
        tick_lower_offset: 232,
        tick_upper_offset: 208,
    },
];

/// Bits below the truncated pool id in the standard layout
const POOL_ID_SHIFT: usize = 56;

/// One field of a tuple-shaped info value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoField {
    Flag(bool),
    Int(i32),
}

/// Info value as it arrived from the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawPositionInfo {
    Packed(U256),
    Tuple(Vec<InfoField>),
}

impl RawPositionInfo {
    /// Classify trailing response words: one word is a packed value, two or
    /// three are a tuple of signed integers. In a triple, an edge word of 0 or
    /// 1 next to an ordered pair is read as the subscriber flag.
    pub fn from_words(words: &[U256]) -> Result<Self, DecodingError> {
        let ints = match words.len() {
            1 => return Ok(RawPositionInfo::Packed(words[0])),
            2 | 3 => words
                .iter()
                .map(|w| {
                    word_to_signed(*w)
                        .and_then(|v| i32::try_from(v).ok())
                        .ok_or_else(|| DecodingError::ValueOverflow {
                            value: w.to_string(),
                        })
                })
                .collect::<Result<Vec<i32>, _>>()?,
            n => return Err(DecodingError::UnexpectedShape { expected: 1, got: n }),
        };

        let mut fields: Vec<InfoField> = ints.iter().copied().map(InfoField::Int).collect();
        if let [a, b, c] = ints[..] {
            let is_flag = |v: i32| v == 0 || v == 1;
            if is_flag(a) && structurally_valid(b, c) {
                fields[0] = InfoField::Flag(a == 1);
            } else if is_flag(c) && structurally_valid(a, b) {
                fields[2] = InfoField::Flag(c == 1);
            }
        }
        Ok(RawPositionInfo::Tuple(fields))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeConfidence {
    /// Structurally valid and aligned to the pool's tick spacing
    Strong,
    /// Structurally valid but not aligned
    Weak,
    /// Nothing validated; default layout applied
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedTicks {
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub confidence: DecodeConfidence,
    pub layout: &'static str,
}

/// How a decoded position refers to its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolRef {
    Full(PoolId),
    Truncated([u8; TRUNCATED_POOL_ID_LEN]),
}

impl PoolRef {
    pub fn matches(&self, id: &PoolId) -> bool {
        match self {
            PoolRef::Full(full) => full == id,
            PoolRef::Truncated(prefix) => id.matches_truncated(prefix),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPositionInfo {
    pub pool: PoolRef,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
    pub confidence: DecodeConfidence,
    /// Name of the packed layout the ticks were read with
    pub layout: &'static str,
}

impl DecodedPositionInfo {
    pub fn new(pool: PoolRef, ticks: DecodedTicks, liquidity: u128) -> Self {
        Self {
            pool,
            tick_lower: ticks.tick_lower,
            tick_upper: ticks.tick_upper,
            liquidity,
            confidence: ticks.confidence,
            layout: ticks.layout,
        }
    }
}

/// Truncated pool id held in the top 200 bits of a standard packed value
pub fn truncated_pool_id(packed: U256) -> [u8; TRUNCATED_POOL_ID_LEN] {
    let mut word = [0u8; 32];
    packed.to_big_endian(&mut word);
    let mut out = [0u8; TRUNCATED_POOL_ID_LEN];
    out.copy_from_slice(&word[..TRUNCATED_POOL_ID_LEN]);
    out
}

/// Build a standard-layout packed value. Used by tests and fixtures.
pub fn pack_standard(pool_id: &PoolId, tick_lower: i32, tick_upper: i32, flags: u8) -> U256 {
    let id_part = U256::from_big_endian(&pool_id.truncated()) << POOL_ID_SHIFT;
    id_part | (int24_bits(tick_upper) << 32) | (int24_bits(tick_lower) << 8) | U256::from(flags)
}

fn int24_bits(value: i32) -> U256 {
    U256::from((value as u32) & 0x00ff_ffff)
}

fn extract_int24(packed: U256, offset: u32) -> i32 {
    let raw = ((packed >> offset as usize) & U256::from(0x00ff_ffffu32)).low_u32();
    // sign-extend from bit 23
    ((raw << 8) as i32) >> 8
}

fn structurally_valid(tick_lower: i32, tick_upper: i32) -> bool {
    (MIN_TICK..=MAX_TICK).contains(&tick_lower)
        && (MIN_TICK..=MAX_TICK).contains(&tick_upper)
        && tick_lower < tick_upper
}

fn aligned(tick_lower: i32, tick_upper: i32, spacing: i32) -> bool {
    spacing <= 0 || (tick_lower.rem_euclid(spacing) == 0 && tick_upper.rem_euclid(spacing) == 0)
}

/// Decode the tick range from a raw info value given the pool's tick spacing
pub fn decode_position_info(raw: &RawPositionInfo, tick_spacing: i32) -> Result<DecodedTicks, DecodingError> {
    match raw {
        RawPositionInfo::Packed(packed) => Ok(decode_packed(*packed, tick_spacing)),
        RawPositionInfo::Tuple(fields) => decode_tuple(fields, tick_spacing),
    }
}

fn decode_packed(packed: U256, tick_spacing: i32) -> DecodedTicks {
    let decoded: Vec<(PackedLayout, i32, i32)> = LAYOUT_CANDIDATES
        .iter()
        .map(|layout| {
            (
                *layout,
                extract_int24(packed, layout.tick_lower_offset),
                extract_int24(packed, layout.tick_upper_offset),
            )
        })
        .collect();

    if let Some((layout, lower, upper)) = decoded
        .iter()
        .find(|(_, l, u)| structurally_valid(*l, *u) && aligned(*l, *u, tick_spacing))
    {
        debug!(layout = layout.name, lower, upper, "position info strong match");
        return DecodedTicks {
            tick_lower: *lower,
            tick_upper: *upper,
            confidence: DecodeConfidence::Strong,
            layout: layout.name,
        };
    }

    if let Some((layout, lower, upper)) = decoded.iter().find(|(_, l, u)| structurally_valid(*l, *u)) {
        warn!(
            layout = layout.name,
            lower, upper, tick_spacing, "position info weak match: ticks not aligned to spacing"
        );
        return DecodedTicks {
            tick_lower: *lower,
            tick_upper: *upper,
            confidence: DecodeConfidence::Weak,
            layout: layout.name,
        };
    }

    let (layout, lower, upper) = decoded[0];
    warn!(
        layout = layout.name,
        lower, upper, "no packed layout validated, using default layout unverified"
    );
    DecodedTicks {
        tick_lower: lower,
        tick_upper: upper,
        confidence: DecodeConfidence::Default,
        layout: layout.name,
    }
}

fn decode_tuple(fields: &[InfoField], tick_spacing: i32) -> Result<DecodedTicks, DecodingError> {
    let flag_position = fields.iter().position(|f| matches!(f, InfoField::Flag(_)));
    let ints: Vec<i32> = fields
        .iter()
        .filter_map(|f| match f {
            InfoField::Int(v) => Some(*v),
            InfoField::Flag(_) => None,
        })
        .collect();

    let grade = |lower: i32, upper: i32, layout: &'static str| DecodedTicks {
        tick_lower: lower,
        tick_upper: upper,
        confidence: if aligned(lower, upper, tick_spacing) {
            DecodeConfidence::Strong
        } else {
            DecodeConfidence::Weak
        },
        layout,
    };

    match (fields.len(), flag_position) {
        (3, Some(position)) if position == 0 || position == 2 => {
            let (lower, upper) = (ints[0], ints[1]);
            if !structurally_valid(lower, upper) {
                return Err(DecodingError::Ambiguous(format!(
                    "flagged tuple carries invalid range [{lower}, {upper}]"
                )));
            }
            let layout = if position == 0 { "tuple-flag-first" } else { "tuple-flag-last" };
            Ok(grade(lower, upper, layout))
        }
        (2, None) => {
            let (a, b) = (ints[0], ints[1]);
            if structurally_valid(a, b) {
                Ok(grade(a, b, "tuple-pair"))
            } else if structurally_valid(b, a) {
                warn!(a, b, "tuple pair arrived upper-first, swapping");
                Ok(DecodedTicks {
                    confidence: DecodeConfidence::Weak,
                    ..grade(b, a, "tuple-pair-swapped")
                })
            } else {
                Err(DecodingError::Ambiguous(format!("tuple pair [{a}, {b}] is not a range")))
            }
        }
        (3, None) => {
            let candidates = [(ints[0], ints[1], "tuple-leading"), (ints[1], ints[2], "tuple-trailing")];
            if let Some((l, u, name)) = candidates
                .iter()
                .find(|(l, u, _)| structurally_valid(*l, *u) && aligned(*l, *u, tick_spacing))
            {
                return Ok(grade(*l, *u, name));
            }
            if let Some((l, u, name)) = candidates.iter().find(|(l, u, _)| structurally_valid(*l, *u)) {
                warn!(lower = l, upper = u, "tuple range chosen by ordering only");
                return Ok(DecodedTicks {
                    confidence: DecodeConfidence::Weak,
                    ..grade(*l, *u, name)
                });
            }
            Err(DecodingError::Ambiguous(format!(
                "no ordered tick pair in tuple {ints:?}"
            )))
        }
        (len, _) => Err(DecodingError::Ambiguous(format!(
            "unsupported tuple of {len} fields with flag at {flag_position:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_id() -> PoolId {
        PoolId([0xab; 32])
    }

    #[test]
    fn test_standard_packed_round_trip() {
        for (lower, upper, spacing) in [(-120, 120, 60), (-887_220, 887_220, 60), (200, 400, 200), (-10, -1, 1)] {
            let packed = pack_standard(&pool_id(), lower, upper, 0);
            let ticks = decode_position_info(&RawPositionInfo::Packed(packed), spacing).unwrap();
            assert_eq!((ticks.tick_lower, ticks.tick_upper), (lower, upper));
            assert_eq!(ticks.confidence, DecodeConfidence::Strong);
            assert_eq!(ticks.layout, "standard");
        }
    }

    #[test]
    fn test_truncated_pool_id_extracted() {
        let packed = pack_standard(&pool_id(), -60, 60, 1);
        let truncated = truncated_pool_id(packed);
        assert!(PoolRef::Truncated(truncated).matches(&pool_id()));
        assert!(!PoolRef::Truncated(truncated).matches(&PoolId([0xcd; 32])));
    }

    #[test]
    fn test_shifted_layout_found_by_alignment() {
        // ticks at offsets 24/48; the standard read sees garbage
        let packed = (int24_bits(600) << 48) | (int24_bits(-600) << 24) | U256::from(0x7fu8);
        let ticks = decode_position_info(&RawPositionInfo::Packed(packed), 200).unwrap();
        assert_eq!((ticks.tick_lower, ticks.tick_upper), (-600, 600));
        assert_eq!(ticks.layout, "shifted");
        assert_eq!(ticks.confidence, DecodeConfidence::Strong);
    }

    #[test]
    fn test_weak_match_when_unaligned() {
        let packed = pack_standard(&pool_id(), -61, 119, 0);
        let ticks = decode_position_info(&RawPositionInfo::Packed(packed), 60).unwrap();
        assert_eq!((ticks.tick_lower, ticks.tick_upper), (-61, 119));
        assert_eq!(ticks.confidence, DecodeConfidence::Weak);
    }

    #[test]
    fn test_default_when_nothing_validates() {
        let ticks = decode_position_info(&RawPositionInfo::Packed(U256::zero()), 60).unwrap();
        assert_eq!(ticks.confidence, DecodeConfidence::Default);
        assert_eq!(ticks.layout, "standard");
    }

    #[test]
    fn test_tuple_flag_positions() {
        let first = RawPositionInfo::Tuple(vec![InfoField::Flag(true), InfoField::Int(-60), InfoField::Int(60)]);
        let last = RawPositionInfo::Tuple(vec![InfoField::Int(-60), InfoField::Int(60), InfoField::Flag(false)]);
        for raw in [first, last] {
            let ticks = decode_position_info(&raw, 60).unwrap();
            assert_eq!((ticks.tick_lower, ticks.tick_upper), (-60, 60));
            assert_eq!(ticks.confidence, DecodeConfidence::Strong);
        }
    }

    #[test]
    fn test_triple_with_flag_word_is_classified() {
        // a bool-encoded subscriber flag in front of the range
        let raw = RawPositionInfo::from_words(&[U256::one(), U256::from(60u32), U256::from(120u32)]).unwrap();
        assert_eq!(
            raw,
            RawPositionInfo::Tuple(vec![InfoField::Flag(true), InfoField::Int(60), InfoField::Int(120)])
        );
        let ticks = decode_position_info(&raw, 60).unwrap();
        assert_eq!((ticks.tick_lower, ticks.tick_upper), (60, 120));
        assert_eq!(ticks.layout, "tuple-flag-first");
        assert_eq!(ticks.confidence, DecodeConfidence::Strong);

        let minus_sixty = U256::MAX - U256::from(59u32);
        let raw = RawPositionInfo::from_words(&[minus_sixty, U256::from(60u32), U256::zero()]).unwrap();
        let ticks = decode_position_info(&raw, 60).unwrap();
        assert_eq!((ticks.tick_lower, ticks.tick_upper), (-60, 60));
        assert_eq!(ticks.layout, "tuple-flag-last");
    }

    #[test]
    fn test_untyped_triple_prefers_aligned_ordered_pair() {
        // no edge looks like a flag, so alignment picks the pair
        let raw = RawPositionInfo::from_words(&[U256::from(5u32), U256::from(60u32), U256::from(120u32)]).unwrap();
        assert!(matches!(raw, RawPositionInfo::Tuple(ref f) if f.iter().all(|x| matches!(x, InfoField::Int(_)))));
        let ticks = decode_position_info(&raw, 60).unwrap();
        assert_eq!((ticks.tick_lower, ticks.tick_upper), (60, 120));
        assert_eq!(ticks.layout, "tuple-trailing");
        assert_eq!(ticks.confidence, DecodeConfidence::Strong);
    }

    #[test]
    fn test_tuple_pair_and_errors() {
        let swapped = RawPositionInfo::Tuple(vec![InfoField::Int(120), InfoField::Int(-120)]);
        let ticks = decode_position_info(&swapped, 60).unwrap();
        assert_eq!((ticks.tick_lower, ticks.tick_upper), (-120, 120));
        assert_eq!(ticks.confidence, DecodeConfidence::Weak);

        let equal = RawPositionInfo::Tuple(vec![InfoField::Int(5), InfoField::Int(5)]);
        assert!(matches!(decode_position_info(&equal, 1), Err(DecodingError::Ambiguous(_))));

        let single = RawPositionInfo::Tuple(vec![InfoField::Int(5)]);
        assert!(matches!(decode_position_info(&single, 1), Err(DecodingError::Ambiguous(_))));

        assert!(RawPositionInfo::from_words(&[U256::zero(); 4]).is_err());
    }
}
