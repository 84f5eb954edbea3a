//! Bit layouts of the PSX system registers and their semantic decoding.
//!
//! Bit positions are fixed by PSX and never computed.

use std::{
    collections::BTreeMap,
    fmt::{
        Debug,
        Display,
    },
    str::FromStr,
};

use bitflags::bitflags;

bitflags! {
    /// Main electrical system register (`Qi132`).
    ///
    /// Only the external power and shore breaker bits are named, the other
    /// bits belong to PSX and are carried through untouched.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PowerBits: u32 {
        const GEN_RUN_1 = 1 << 0;
        const GEN_RUN_2 = 1 << 3;
        const CLOSED_1 = 1 << 8;
        const CLOSED_2 = 1 << 11;
        const CLOSED_SSB = 1 << 30;

        const _ = !0;
    }
}

bitflags! {
    /// External air register (`Qi174`).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct AirBits: u32 {
        const BLEED = 1 << 0;
        const AIRCON = 1 << 1;

        const _ = !0;
    }
}

/// External power unit side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Side {
    One,
    Two,
}

impl Side {
    pub fn gen_bit(&self) -> PowerBits {
        match self {
            Self::One => PowerBits::GEN_RUN_1,
            Self::Two => PowerBits::GEN_RUN_2,
        }
    }

    pub fn closed_bit(&self) -> PowerBits {
        match self {
            Self::One => PowerBits::CLOSED_1,
            Self::Two => PowerBits::CLOSED_2,
        }
    }
}

/// State of one external power unit.
///
/// Encoded by two bits: GEN (unit running) and CLOSED (contactor closed).
/// `Connected` always has both bits set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExtPower {
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "notavail"))]
    NotAvailable,
    #[cfg_attr(feature = "serde", serde(rename = "avail"))]
    Available,
    #[cfg_attr(feature = "serde", serde(rename = "connected"))]
    Connected,
}

impl ExtPower {
    /// Decodes the (GEN, CLOSED) pair.
    ///
    /// A closed contactor without a running unit can't happen and is read as
    /// `NotAvailable`.
    pub fn from_bits(gen_run: bool, closed: bool) -> Self {
        match (gen_run, closed) {
            (true, true) => Self::Connected,
            (true, false) => Self::Available,
            (false, _) => Self::NotAvailable,
        }
    }

    /// (GEN, CLOSED)
    pub fn to_bits(&self) -> (bool, bool) {
        match self {
            Self::NotAvailable => (false, false),
            Self::Available => (true, false),
            Self::Connected => (true, true),
        }
    }
}

/// Shore power breaker.
///
/// Bit 30 set reads as `Open`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ShoreBreaker {
    Open,
    #[default]
    Closed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PowerState {
    pub ext1: ExtPower,
    pub ext2: ExtPower,
    pub ssb: ShoreBreaker,
}

impl PowerState {
    pub fn ext(&self, side: Side) -> ExtPower {
        match side {
            Side::One => self.ext1,
            Side::Two => self.ext2,
        }
    }
}

pub fn decode_power(value: u32) -> PowerState {
    let bits = PowerBits::from_bits_retain(value);
    let ext = |side: Side| ExtPower::from_bits(bits.contains(side.gen_bit()), bits.contains(side.closed_bit()));

    PowerState {
        ext1: ext(Side::One),
        ext2: ext(Side::Two),
        ssb: if bits.contains(PowerBits::CLOSED_SSB) {
            ShoreBreaker::Open
        }
        else {
            ShoreBreaker::Closed
        },
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AirState {
    pub bleed: bool,
    pub aircon: bool,
}

pub fn decode_air(value: u32) -> AirState {
    let bits = AirBits::from_bits_retain(value);
    AirState {
        bleed: bits.contains(AirBits::BLEED),
        aircon: bits.contains(AirBits::AIRCON),
    }
}

/// Doors and hatches of the 747, in register bit order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Door {
    NoseCargo = 0,
    FwdOvhd,
    MainElec,
    L1,
    UL,
    L2,
    L3,
    L4,
    SideCargo,
    L5,
    R1,
    FwdCargo,
    UR,
    R2,
    CtrElec,
    R3,
    R4,
    AftCargo,
    BulkCargo,
    R5,
}

impl Door {
    pub const COUNT: usize = 20;

    /// All doors, bit 0 first.
    pub const ALL: [Door; Self::COUNT] = [
        Self::NoseCargo,
        Self::FwdOvhd,
        Self::MainElec,
        Self::L1,
        Self::UL,
        Self::L2,
        Self::L3,
        Self::L4,
        Self::SideCargo,
        Self::L5,
        Self::R1,
        Self::FwdCargo,
        Self::UR,
        Self::R2,
        Self::CtrElec,
        Self::R3,
        Self::R4,
        Self::AftCargo,
        Self::BulkCargo,
        Self::R5,
    ];

    pub fn bit_index(&self) -> u32 {
        *self as u32
    }

    pub fn mask(&self) -> u32 {
        1 << self.bit_index()
    }

    /// Key used by the UI.
    pub fn key(&self) -> &'static str {
        match self {
            Self::NoseCargo => "noseCargo",
            Self::FwdOvhd => "fwdOvhd",
            Self::MainElec => "mainElec",
            Self::L1 => "L1",
            Self::UL => "UL",
            Self::L2 => "L2",
            Self::L3 => "L3",
            Self::L4 => "L4",
            Self::SideCargo => "sideCargo",
            Self::L5 => "L5",
            Self::R1 => "R1",
            Self::FwdCargo => "fwdCargo",
            Self::UR => "UR",
            Self::R2 => "R2",
            Self::CtrElec => "ctrElec",
            Self::R3 => "R3",
            Self::R4 => "R4",
            Self::AftCargo => "aftCargo",
            Self::BulkCargo => "bulkCargo",
            Self::R5 => "R5",
        }
    }
}

impl Display for Door {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl Debug for Door {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Door({})", self.key())
    }
}

impl FromStr for Door {
    type Err = DoorFromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|door| door.key() == s)
            .ok_or_else(|| {
                DoorFromStrError {
                    input: s.to_owned(),
                }
            })
    }
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("Invalid door: {input}")]
pub struct DoorFromStrError {
    pub input: String,
}

/// One boolean per door.
///
/// This is always the complete set of doors. Door registers are written as a
/// whole, so a door missing from a map would be written as closed (or armed).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DoorMap([bool; Door::COUNT]);

impl DoorMap {
    pub fn from_register(value: u32) -> Self {
        let mut map = Self::default();
        for door in Door::ALL {
            map.set(door, value & door.mask() != 0);
        }
        map
    }

    pub fn to_register(&self) -> u32 {
        self.iter()
            .filter(|(_, set)| *set)
            .fold(0, |value, (door, _)| value | door.mask())
    }

    pub fn get(&self, door: Door) -> bool {
        self.0[door as usize]
    }

    pub fn set(&mut self, door: Door, value: bool) {
        self.0[door as usize] = value;
    }

    pub fn with(mut self, door: Door, value: bool) -> Self {
        self.set(door, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (Door, bool)> + '_ {
        Door::ALL.into_iter().map(|door| (door, self.get(door)))
    }
}

impl Debug for DoorMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl FromIterator<(Door, bool)> for DoorMap {
    fn from_iter<T: IntoIterator<Item = (Door, bool)>>(iter: T) -> Self {
        let mut map = Self::default();
        for (door, value) in iter {
            map.set(door, value);
        }
        map
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DoorState {
    pub open: bool,
    pub manual: bool,
}

pub fn decode_doors(open: u32, manual: u32) -> BTreeMap<Door, DoorState> {
    let open = DoorMap::from_register(open);
    let manual = DoorMap::from_register(manual);
    Door::ALL
        .into_iter()
        .map(|door| {
            (
                door,
                DoorState {
                    open: open.get(door),
                    manual: manual.get(door),
                },
            )
        })
        .collect()
}

#[cfg(feature = "serde")]
mod serde_impls {
    use std::fmt::Formatter;

    use serde::{
        Deserialize,
        Deserializer,
        Serialize,
        Serializer,
        de::{
            Error as _,
            MapAccess,
            Visitor,
        },
        ser::SerializeMap,
    };

    use super::{
        Door,
        DoorMap,
    };

    impl Serialize for Door {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(self.key())
        }
    }

    impl<'de> Deserialize<'de> for Door {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let key = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
            key.parse().map_err(D::Error::custom)
        }
    }

    impl Serialize for DoorMap {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let mut map = serializer.serialize_map(Some(Door::COUNT))?;
            for (door, value) in self.iter() {
                map.serialize_entry(door.key(), &value)?;
            }
            map.end()
        }
    }

    /// Doors missing from the map are `false`, unknown doors are rejected.
    impl<'de> Deserialize<'de> for DoorMap {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            struct DoorMapVisitor;

            impl<'de> Visitor<'de> for DoorMapVisitor {
                type Value = DoorMap;

                fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
                    write!(formatter, "a map of door keys to booleans")
                }

                fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<DoorMap, A::Error> {
                    let mut map = DoorMap::default();
                    while let Some((door, value)) = access.next_entry::<Door, bool>()? {
                        map.set(door, value);
                    }
                    Ok(map)
                }
            }

            deserializer.deserialize_map(DoorMapVisitor)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::registers::{
        AirState,
        Door,
        DoorMap,
        DoorState,
        ExtPower,
        PowerBits,
        ShoreBreaker,
        decode_air,
        decode_doors,
        decode_power,
    };

    #[test]
    fn canonical_door_order_matches_the_register() {
        let keys: Vec<_> = Door::ALL.iter().map(|door| door.key()).collect();
        assert_eq!(
            keys,
            [
                "noseCargo", "fwdOvhd", "mainElec", "L1", "UL", "L2", "L3", "L4", "sideCargo",
                "L5", "R1", "fwdCargo", "UR", "R2", "ctrElec", "R3", "R4", "aftCargo",
                "bulkCargo", "R5"
            ]
        );
        for (index, door) in Door::ALL.iter().enumerate() {
            assert_eq!(door.bit_index() as usize, index);
        }
    }

    #[test]
    fn it_decodes_power() {
        let value = (PowerBits::GEN_RUN_1 | PowerBits::CLOSED_1 | PowerBits::GEN_RUN_2).bits();
        assert_eq!(decode_power(value).ext1, ExtPower::Connected);
        assert_eq!(decode_power(value).ext2, ExtPower::Available);
        assert_eq!(decode_power(value).ssb, ShoreBreaker::Closed);
        assert_eq!(decode_power(1 << 30).ssb, ShoreBreaker::Open);
        assert_eq!(decode_power(0).ext1, ExtPower::NotAvailable);
    }

    #[test]
    fn closed_without_generator_is_not_available() {
        let value = PowerBits::CLOSED_1.bits() | PowerBits::CLOSED_2.bits();
        let power = decode_power(value);
        assert_eq!(power.ext1, ExtPower::NotAvailable);
        assert_eq!(power.ext2, ExtPower::NotAvailable);
    }

    #[test]
    fn it_decodes_air() {
        assert_eq!(decode_air(0), AirState::default());
        assert_eq!(
            decode_air(0b11),
            AirState {
                bleed: true,
                aircon: true
            }
        );
        assert_eq!(
            decode_air(0b10 | 0xff00),
            AirState {
                bleed: false,
                aircon: true
            }
        );
    }

    #[test]
    fn it_decodes_doors() {
        let doors = decode_doors(1 << 3 | 1 << 19, 1 << 3);
        assert_eq!(doors.len(), Door::COUNT);
        assert_eq!(
            doors[&Door::L1],
            DoorState {
                open: true,
                manual: true
            }
        );
        assert_eq!(
            doors[&Door::R5],
            DoorState {
                open: true,
                manual: false
            }
        );
        assert_eq!(doors[&Door::NoseCargo], DoorState::default());
    }

    #[test]
    fn door_maps_ignore_unknown_bits() {
        let map = DoorMap::from_register(u32::MAX);
        assert!(map.iter().all(|(_, open)| open));
        assert_eq!(map.to_register(), (1 << 20) - 1);
    }

    #[test]
    fn it_parses_door_keys() {
        assert_eq!("bulkCargo".parse::<Door>().unwrap(), Door::BulkCargo);
        assert!("l1".parse::<Door>().is_err());
    }
}
